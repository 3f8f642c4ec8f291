//! Path observers.
//!
//! A [`PathObserver`] follows a [`MemberPath`] from a root object, keeps the
//! resolved member chain up to date when intermediate values change, and tells
//! its listeners about two kinds of change: the chain itself was rebuilt, or
//! only the value at the end of it changed.
//!
//! Observers are single-threaded (`!Send`): every notification arrives on the
//! thread that owns the objects being observed.

mod listeners;
mod update;

use std::{
    cell::{Cell, RefCell},
    fmt,
    panic::{self, AssertUnwindSafe},
    rc::{Rc, Weak},
};

use bitflags::bitflags;
use tracing::{debug, trace, warn};

pub use listeners::{ListenerRef, ListenerSnapshot, ObserverListener};
use listeners::{Added, Listeners, Removed};

use crate::{
    error::{BindingError, Result, panic_message},
    member::{MemberFlags, MemberListener, MemberResolver, ResolvedMember, Subscription},
    metadata::Metadata,
    object::{Object, WeakObject},
    path::MemberPath,
};

bitflags! {
    /// Per-observer options.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct ObserverFlags: u8 {
        /// A missing member ends the path quietly instead of faulting.
        const OPTIONAL = 1;
        /// The caller guarantees every segment resolves to the same member on
        /// every update, so handles and unchanged subscriptions are reused.
        const STABLE_PATH = 1 << 1;
        /// Subscribe to the terminal member while anyone is listening.
        const OBSERVE_LAST = 1 << 2;
    }
}

impl Default for ObserverFlags {
    fn default() -> Self {
        ObserverFlags::OBSERVE_LAST
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct ObserverState: u8 {
        const UPDATING = 1;
        const INITIALIZED = 1 << 1;
        const DISPOSED = 1 << 2;
    }
}

/// The resolved chain, as returned by [`PathObserver::get_members`].
#[derive(Debug, Clone)]
pub enum MemberChain {
    /// The path is broken by a null value, an optional missing member, or a
    /// dead target.
    Empty,
    Resolved {
        target: Object,
        members: Rc<[ResolvedMember]>,
    },
    Error(BindingError),
}

impl MemberChain {
    pub fn is_resolved(&self) -> bool {
        matches!(self, MemberChain::Resolved { .. })
    }
}

/// The terminal member and the object it lives on.
#[derive(Debug, Clone)]
pub enum LastMember {
    Empty,
    Resolved {
        target: Object,
        member: ResolvedMember,
    },
    Error(BindingError),
}

impl LastMember {
    pub fn is_resolved(&self) -> bool {
        matches!(self, LastMember::Resolved { .. })
    }

    pub fn member(&self) -> Option<&ResolvedMember> {
        match self {
            LastMember::Resolved { member, .. } => Some(member),
            _ => None,
        }
    }

    /// Reads the terminal value. A broken path reads as `None`.
    pub fn read(&self, metadata: Option<&Metadata>) -> Result<Option<Object>> {
        match self {
            LastMember::Empty => Ok(None),
            LastMember::Resolved { target, member } => member.read(Some(target), metadata),
            LastMember::Error(error) => Err(error.clone()),
        }
    }
}

pub(crate) enum Root {
    Weak(WeakObject),
    Strong(Object),
    Released,
}

impl Root {
    fn get(&self) -> Option<Object> {
        match self {
            Root::Weak(weak) => weak.upgrade(),
            Root::Strong(object) => Some(object.clone()),
            Root::Released => None,
        }
    }
}

#[derive(Default)]
enum Resolution {
    #[default]
    Empty,
    Resolved {
        members: Rc<[ResolvedMember]>,
        /// The object the last member lives on.
        target: WeakObject,
    },
    Faulted(BindingError),
}

/// An intermediate subscription and the object it was made on.
struct Tracked {
    target: WeakObject,
    subscription: Option<Subscription>,
}

#[derive(Default)]
struct Chain {
    resolution: Resolution,
    /// Member handles kept across updates; may be shorter than the path.
    handles: Vec<ResolvedMember>,
    /// One entry per intermediate segment walked by the last update.
    tracked: Vec<Tracked>,
}

#[derive(Clone, Copy)]
enum Notification {
    PathMembersChanged,
    LastMemberChanged,
}

pub(crate) struct ObserverInner {
    path: MemberPath,
    flags: ObserverFlags,
    member_flags: MemberFlags,
    resolver: Rc<dyn MemberResolver>,
    root: RefCell<Root>,
    state: Cell<ObserverState>,
    listeners: RefCell<Listeners>,
    chain: RefCell<Chain>,
    last_subscription: RefCell<Option<Subscription>>,
    /// Handed (weakly) to intermediate members.
    path_changed: Rc<dyn MemberListener>,
    /// Handed (weakly) to the terminal member.
    last_changed: Rc<dyn MemberListener>,
    this: Weak<ObserverInner>,
}

struct PathChanged(Weak<ObserverInner>);

impl MemberListener for PathChanged {
    fn on_member_changed(&self, _sender: Option<&Object>) -> bool {
        match self.0.upgrade() {
            Some(inner) if !inner.is_disposed() => {
                trace!(path = %inner.path, "intermediate member changed");
                inner.update(None);
                true
            }
            _ => false,
        }
    }
}

struct LastChanged(Weak<ObserverInner>);

impl MemberListener for LastChanged {
    fn on_member_changed(&self, _sender: Option<&Object>) -> bool {
        match self.0.upgrade() {
            Some(inner) if !inner.is_disposed() => {
                trace!(path = %inner.path, "last member changed");
                inner.notify(Notification::LastMemberChanged);
                true
            }
            _ => false,
        }
    }
}

impl ObserverInner {
    fn is_disposed(&self) -> bool {
        self.state.get().contains(ObserverState::DISPOSED)
    }

    fn insert_state(&self, state: ObserverState) {
        self.state.set(self.state.get().union(state));
    }

    fn root(&self) -> Option<Object> {
        self.root.borrow().get()
    }

    fn handle(&self) -> Option<PathObserver> {
        self.this.upgrade().map(|inner| PathObserver { inner })
    }

    fn has_listeners(&self) -> bool {
        self.listeners.borrow().len() > 0
    }

    fn ensure_initialized(&self, metadata: Option<&Metadata>) {
        let state = self.state.get();
        if !state.intersects(ObserverState::INITIALIZED | ObserverState::UPDATING) {
            self.update(metadata);
        }
    }

    fn set_resolution(&self, resolution: Resolution) {
        let previous = std::mem::replace(&mut self.chain.borrow_mut().resolution, resolution);
        drop(previous);
    }

    /// Drops every subscription and forgets the chain.
    fn release_chain(&self) {
        let chain = std::mem::take(&mut *self.chain.borrow_mut());
        let last = self.last_subscription.borrow_mut().take();
        drop(chain);
        drop(last);
    }

    fn notify(&self, notification: Notification) {
        let listeners = self.listeners.borrow().snapshot();
        if listeners.is_empty() {
            return;
        }
        let Some(observer) = self.handle() else {
            return;
        };
        for listener in listeners.iter() {
            let delivered = panic::catch_unwind(AssertUnwindSafe(|| match notification {
                Notification::PathMembersChanged => listener.on_path_members_changed(&observer),
                Notification::LastMemberChanged => listener.on_last_member_changed(&observer),
            }));
            if let Err(payload) = delivered {
                let error = BindingError::ListenerPanicked(panic_message(&*payload));
                debug!(path = %self.path, %error, "listener panicked");
                self.notify_error(&observer, &error);
            }
        }
    }

    fn notify_error(&self, observer: &PathObserver, error: &BindingError) {
        let listeners = self.listeners.borrow().snapshot();
        for listener in listeners.iter() {
            let delivered =
                panic::catch_unwind(AssertUnwindSafe(|| listener.on_error(observer, error)));
            if let Err(payload) = delivered {
                warn!(
                    path = %self.path,
                    panic = %panic_message(&*payload),
                    "panic in error handler swallowed"
                );
            }
        }
    }

    /// (Re)subscribes the terminal member after the first listener arrived.
    fn refresh_last_member(&self) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.subscribe_last_member(None)));
        let error = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(error)) => error,
            Err(payload) => BindingError::InternalFault(panic_message(&*payload)),
        };
        debug!(path = %self.path, %error, "subscribing the last member failed");
        self.set_resolution(Resolution::Faulted(error.clone()));
        if let Some(observer) = self.handle() {
            self.notify_error(&observer, &error);
        }
    }
}

/// Observes a member path starting at a target object.
///
/// Cloning yields another handle to the same observer. The observer and its
/// subscriptions live until [`PathObserver::dispose`] is called or the last
/// handle is dropped.
#[derive(Clone)]
pub struct PathObserver {
    inner: Rc<ObserverInner>,
}

impl PathObserver {
    /// Observes `path` on `target` without keeping `target` alive.
    pub fn new(
        resolver: Rc<dyn MemberResolver>,
        target: &Object,
        path: MemberPath,
        flags: ObserverFlags,
    ) -> Self {
        Self::create(
            resolver,
            Root::Weak(target.downgrade()),
            path,
            flags,
            MemberFlags::default(),
        )
    }

    /// Observes `path` on `target`, owning it.
    pub fn new_owned(
        resolver: Rc<dyn MemberResolver>,
        target: Object,
        path: MemberPath,
        flags: ObserverFlags,
    ) -> Self {
        Self::create(
            resolver,
            Root::Strong(target),
            path,
            flags,
            MemberFlags::default(),
        )
    }

    pub(crate) fn create(
        resolver: Rc<dyn MemberResolver>,
        root: Root,
        path: MemberPath,
        flags: ObserverFlags,
        member_flags: MemberFlags,
    ) -> Self {
        let inner = Rc::new_cyclic(|this: &Weak<ObserverInner>| ObserverInner {
            path,
            flags,
            member_flags,
            resolver,
            root: RefCell::new(root),
            state: Cell::new(ObserverState::empty()),
            listeners: RefCell::new(Listeners::Empty),
            chain: RefCell::new(Chain::default()),
            last_subscription: RefCell::new(None),
            path_changed: Rc::new(PathChanged(this.clone())),
            last_changed: Rc::new(LastChanged(this.clone())),
            this: this.clone(),
        });
        debug!(path = %inner.path, flags = ?inner.flags, "path observer created");
        PathObserver { inner }
    }

    pub fn path(&self) -> &MemberPath {
        &self.inner.path
    }

    pub fn flags(&self) -> ObserverFlags {
        self.inner.flags
    }

    /// The root object, if it is still alive and the observer not disposed.
    pub fn target(&self) -> Option<Object> {
        self.inner.root()
    }

    pub fn is_alive(&self) -> bool {
        !self.inner.is_disposed() && self.inner.root().is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.state.get().contains(ObserverState::INITIALIZED)
    }

    pub fn ptr_eq(&self, other: &PathObserver) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Re-resolves the whole path and notifies listeners.
    ///
    /// Does nothing while an update is already running on this observer or
    /// after it was disposed.
    pub fn update(&self) {
        self.inner.update(None);
    }

    pub fn get_members(&self, metadata: Option<&Metadata>) -> MemberChain {
        let inner = &self.inner;
        if inner.is_disposed() {
            return MemberChain::Empty;
        }
        inner.ensure_initialized(metadata);
        let Some(target) = inner.root() else {
            inner.release_chain();
            return MemberChain::Empty;
        };
        match &inner.chain.borrow().resolution {
            Resolution::Empty => MemberChain::Empty,
            Resolution::Resolved { members, .. } => MemberChain::Resolved {
                target,
                members: members.clone(),
            },
            Resolution::Faulted(error) => MemberChain::Error(error.clone()),
        }
    }

    pub fn get_last_member(&self, metadata: Option<&Metadata>) -> LastMember {
        let inner = &self.inner;
        if inner.is_disposed() {
            return LastMember::Empty;
        }
        inner.ensure_initialized(metadata);
        if inner.root().is_none() {
            inner.release_chain();
            return LastMember::Empty;
        }
        match &inner.chain.borrow().resolution {
            Resolution::Empty => LastMember::Empty,
            Resolution::Resolved { members, target } => match (target.upgrade(), members.last()) {
                (Some(target), Some(member)) => LastMember::Resolved {
                    target,
                    member: member.clone(),
                },
                _ => LastMember::Empty,
            },
            Resolution::Faulted(error) => LastMember::Error(error.clone()),
        }
    }

    /// The current value at the end of the path.
    pub fn value(&self, metadata: Option<&Metadata>) -> Result<Option<Object>> {
        self.get_last_member(metadata).read(metadata)
    }

    /// Adds a listener. Duplicates are kept; each registration is notified.
    ///
    /// The first listener triggers the initial resolution, or the terminal
    /// subscription if the path was already resolved. Ignored once disposed.
    pub fn add_listener(&self, listener: ListenerRef) {
        let added = self.inner.listeners.borrow_mut().add(listener);
        match added {
            Added::First => {
                let state = self.inner.state.get();
                if state.contains(ObserverState::UPDATING) {
                    return;
                }
                if state.contains(ObserverState::INITIALIZED) {
                    self.inner.refresh_last_member();
                } else {
                    self.inner.update(None);
                }
            }
            Added::More => {}
            Added::Rejected => {
                trace!(path = %self.inner.path, "listener ignored, observer disposed")
            }
        }
    }

    /// Removes one registration of `listener`. Returns whether one was found.
    pub fn remove_listener(&self, listener: &ListenerRef) -> bool {
        let removed = self.inner.listeners.borrow_mut().remove(listener);
        match removed {
            Removed::NotFound => false,
            Removed::Some => true,
            Removed::Last => {
                let last = self.inner.last_subscription.borrow_mut().take();
                drop(last);
                true
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    pub fn get_listeners(&self) -> ListenerSnapshot {
        self.inner.listeners.borrow().snapshot()
    }

    /// Releases every subscription and the target. Idempotent; listeners are
    /// dropped without being notified.
    pub fn dispose(&self) {
        let inner = &self.inner;
        if inner.is_disposed() {
            return;
        }
        inner.insert_state(ObserverState::DISPOSED);
        let listeners = std::mem::replace(&mut *inner.listeners.borrow_mut(), Listeners::Disposed);
        let root = std::mem::replace(&mut *inner.root.borrow_mut(), Root::Released);
        inner.release_chain();
        drop(listeners);
        drop(root);
        debug!(path = %inner.path, "path observer disposed");
    }
}

impl fmt::Debug for PathObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathObserver")
            .field("path", &self.inner.path)
            .field("flags", &self.inner.flags)
            .field("state", &self.inner.state.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{change::ChangeEvent, registry::{MemberRegistry, Property}};

    struct Node {
        value: RefCell<i64>,
        changed: ChangeEvent,
    }

    fn resolver() -> Rc<dyn MemberResolver> {
        let mut registry = MemberRegistry::new();
        registry.add(
            Property::<Node>::new("Value")
                .get(|node| Some(Object::new(*node.value.borrow())))
                .observe(|node| &node.changed),
        );
        Rc::new(registry)
    }

    fn node(value: i64) -> Object {
        Object::new(Node {
            value: RefCell::new(value),
            changed: ChangeEvent::new(),
        })
    }

    fn read_i64(observer: &PathObserver) -> Option<i64> {
        observer
            .value(None)
            .unwrap()
            .and_then(|value| value.downcast_ref::<i64>().copied())
    }

    #[test]
    fn queries_initialize_lazily() {
        let target = node(3);
        let observer = PathObserver::new(
            resolver(),
            &target,
            MemberPath::single("Value"),
            ObserverFlags::default(),
        );
        assert!(!observer.is_initialized());
        assert_eq!(read_i64(&observer), Some(3));
        assert!(observer.is_initialized());
    }

    #[test]
    fn empty_path_observes_the_target_itself() {
        let target = node(1);
        let observer = PathObserver::new(
            resolver(),
            &target,
            MemberPath::empty(),
            ObserverFlags::default(),
        );
        let value = observer.value(None).unwrap().unwrap();
        assert!(value.ptr_eq(&target));
    }

    #[test]
    fn owned_observer_keeps_its_target() {
        let observer = PathObserver::new_owned(
            resolver(),
            node(8),
            MemberPath::single("Value"),
            ObserverFlags::default(),
        );
        assert!(observer.is_alive());
        assert_eq!(read_i64(&observer), Some(8));
    }

    #[test]
    fn missing_member_faults_unless_optional() {
        let target = node(0);
        let strict = PathObserver::new(
            resolver(),
            &target,
            MemberPath::single("Nope"),
            ObserverFlags::default(),
        );
        assert!(matches!(
            strict.get_members(None),
            MemberChain::Error(BindingError::MissingMember { .. })
        ));

        let optional = PathObserver::new(
            resolver(),
            &target,
            MemberPath::single("Nope"),
            ObserverFlags::OPTIONAL,
        );
        assert!(matches!(optional.get_members(None), MemberChain::Empty));
    }
}
