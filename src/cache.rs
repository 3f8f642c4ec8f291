use std::{cell::RefCell, rc::Rc};

use rustc_hash::FxHashMap;

use crate::{
    member::{MemberFlags, MemberKinds, MemberResolver, ResolvedMember},
    object::ObjectType,
};

#[derive(Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    ty: ObjectType,
    name: Rc<str>,
    kinds: MemberKinds,
    flags: MemberFlags,
}

/// Memoizes another resolver, misses included.
///
/// Observers re-resolve their paths every time an intermediate value changes;
/// with this in front of the real resolver those lookups become hash hits and
/// hand back the same [`ResolvedMember`] handles every time.
pub struct CachedResolver<R> {
    inner: R,
    cache: RefCell<FxHashMap<CacheKey, Option<ResolvedMember>>>,
}

impl<R: MemberResolver> CachedResolver<R> {
    pub fn new(inner: R) -> Self {
        CachedResolver {
            inner,
            cache: RefCell::new(FxHashMap::default()),
        }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn len(&self) -> usize {
        self.cache.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.borrow().is_empty()
    }

    /// Drops every cached entry, e.g. after members were registered.
    pub fn invalidate(&self) {
        self.cache.borrow_mut().clear();
    }

    /// Drops the entries of a single type.
    pub fn invalidate_type(&self, ty: ObjectType) {
        self.cache.borrow_mut().retain(|key, _| key.ty != ty);
    }
}

impl<R: MemberResolver> MemberResolver for CachedResolver<R> {
    fn resolve(
        &self,
        ty: ObjectType,
        name: &str,
        kinds: MemberKinds,
        flags: MemberFlags,
    ) -> Option<ResolvedMember> {
        let key = CacheKey {
            ty,
            name: name.into(),
            kinds,
            flags,
        };
        if let Some(hit) = self.cache.borrow().get(&key) {
            return hit.clone();
        }
        // The borrow is released before calling out; resolvers may recurse.
        let resolved = self.inner.resolve(ty, name, kinds, flags);
        self.cache.borrow_mut().insert(key, resolved.clone());
        resolved
    }
}
