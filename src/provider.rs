use std::{cell::RefCell, rc::Rc};

use rustc_hash::FxHashMap;
use tracing::trace;

use crate::{
    cache::CachedResolver,
    error::Result,
    member::{MemberFlags, MemberResolver},
    object::Object,
    observer::{ObserverFlags, PathObserver, Root},
    path::MemberPath,
};

/// Settings shared by every observer a provider creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ObserverConfig {
    /// Scope and visibility every path segment is resolved with.
    pub member_flags: MemberFlags,
    /// Flags used by [`ObserverProvider::observe`].
    pub default_flags: ObserverFlags,
    /// Put a [`CachedResolver`] in front of the resolver.
    pub cache_members: bool,
    /// Memoize [`ObserverProvider::parse_path`].
    pub cache_paths: bool,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        ObserverConfig {
            member_flags: MemberFlags::default(),
            default_flags: ObserverFlags::default(),
            cache_members: true,
            cache_paths: true,
        }
    }
}

/// Creates path observers that share one resolver and one configuration.
pub struct ObserverProvider {
    resolver: Rc<dyn MemberResolver>,
    config: ObserverConfig,
    paths: RefCell<FxHashMap<Rc<str>, MemberPath>>,
}

impl ObserverProvider {
    pub fn new(resolver: impl MemberResolver + 'static, config: ObserverConfig) -> Self {
        let resolver: Rc<dyn MemberResolver> = if config.cache_members {
            Rc::new(CachedResolver::new(resolver))
        } else {
            Rc::new(resolver)
        };
        ObserverProvider {
            resolver,
            config,
            paths: RefCell::new(FxHashMap::default()),
        }
    }

    pub fn resolver(&self) -> &Rc<dyn MemberResolver> {
        &self.resolver
    }

    pub fn config(&self) -> &ObserverConfig {
        &self.config
    }

    pub fn parse_path(&self, text: &str) -> Result<MemberPath> {
        if !self.config.cache_paths {
            return MemberPath::parse(text);
        }
        if let Some(path) = self.paths.borrow().get(text) {
            return Ok(path.clone());
        }
        let path = MemberPath::parse(text)?;
        trace!(%path, "member path cached");
        self.paths.borrow_mut().insert(text.into(), path.clone());
        Ok(path)
    }

    /// Observes `path` on `target` without keeping `target` alive.
    pub fn create_path_observer(
        &self,
        target: &Object,
        path: MemberPath,
        flags: ObserverFlags,
    ) -> PathObserver {
        self.create(Root::Weak(target.downgrade()), path, flags)
    }

    /// Observes `path` on `target`; the observer owns `target`.
    pub fn create_owned_path_observer(
        &self,
        target: Object,
        path: MemberPath,
        flags: ObserverFlags,
    ) -> PathObserver {
        self.create(Root::Strong(target), path, flags)
    }

    /// Parses `path` and observes it on `target` with the default flags.
    pub fn observe(&self, target: &Object, path: &str) -> Result<PathObserver> {
        let path = self.parse_path(path)?;
        Ok(self.create_path_observer(target, path, self.config.default_flags))
    }

    fn create(&self, root: Root, path: MemberPath, flags: ObserverFlags) -> PathObserver {
        PathObserver::create(
            self.resolver.clone(),
            root,
            path,
            flags,
            self.config.member_flags,
        )
    }
}

impl std::fmt::Debug for ObserverProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverProvider")
            .field("config", &self.config)
            .field("cached_paths", &self.paths.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{MemberRegistry, Property};

    struct Named(&'static str);

    fn provider(config: ObserverConfig) -> ObserverProvider {
        let mut registry = MemberRegistry::new();
        registry.add(Property::<Named>::new("Name").get(|n| Some(Object::new(n.0.to_owned()))));
        ObserverProvider::new(registry, config)
    }

    #[test]
    fn parsed_paths_are_cached() {
        let provider = provider(ObserverConfig::default());
        let a = provider.parse_path("A.B").unwrap();
        let b = provider.parse_path("A.B").unwrap();
        assert_eq!(a, b);
        assert_eq!(provider.paths.borrow().len(), 1);
        assert!(provider.parse_path("A.").is_err());
        assert_eq!(provider.paths.borrow().len(), 1);

        let uncached = self::provider(ObserverConfig {
            cache_paths: false,
            ..ObserverConfig::default()
        });
        uncached.parse_path("A.B").unwrap();
        assert!(uncached.paths.borrow().is_empty());
    }

    #[test]
    fn observers_use_the_configured_flags() {
        let provider = provider(ObserverConfig {
            default_flags: ObserverFlags::OPTIONAL,
            ..ObserverConfig::default()
        });
        let target = Object::new(Named("ada"));
        let observer = provider.observe(&target, "Name").unwrap();
        assert_eq!(observer.flags(), ObserverFlags::OPTIONAL);
        let value = observer.value(None).unwrap().unwrap();
        assert_eq!(value.downcast_ref::<String>().map(String::as_str), Some("ada"));

        let missing = provider.observe(&target, "Age").unwrap();
        assert!(missing.value(None).unwrap().is_none());
    }

    #[test]
    fn weak_and_owned_roots() {
        let provider = provider(ObserverConfig::default());
        let target = Object::new(Named("x"));
        let flags = ObserverFlags::default();
        let weak = provider.create_path_observer(&target, MemberPath::single("Name"), flags);
        let owned = provider.create_owned_path_observer(target, MemberPath::single("Name"), flags);
        assert!(weak.is_alive());
        drop(owned);
        assert!(!weak.is_alive());
        assert!(weak.target().is_none());
    }
}
