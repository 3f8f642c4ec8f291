//! Resolved members and the resolution service that produces them.
//!
//! A [`ResolvedMember`] is what a path segment turns into once it has been
//! looked up on a concrete [`ObjectType`]. What it can do is carried by its
//! [`MemberAccess`] payload: accessors read and write values, events only
//! notify, methods are invoked. Accessors and methods may additionally support
//! change observation.

use std::{
    any::Any,
    fmt,
    rc::{Rc, Weak},
};

use bitflags::bitflags;
use floem_expr::MemberHandle;

use crate::{
    error::{BindingError, Result},
    metadata::Metadata,
    object::{Object, ObjectType},
};

bitflags! {
    /// How a member may be looked up.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct MemberFlags: u8 {
        const INSTANCE = 1;
        const STATIC = 1 << 1;
        const PUBLIC = 1 << 2;
        const NON_PUBLIC = 1 << 3;
    }
}

impl Default for MemberFlags {
    fn default() -> Self {
        MemberFlags::INSTANCE | MemberFlags::PUBLIC
    }
}

bitflags! {
    /// The kinds of member a caller is prepared to accept.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemberKinds: u8 {
        const ACCESSOR = 1;
        const EVENT = 1 << 1;
        const METHOD = 1 << 2;
    }
}

impl MemberKinds {
    /// Accepted for every segment but the last one: the engine has to read the
    /// value to keep walking and be told when it changes.
    ///
    /// An event matches too. It is subscribed like any other intermediate
    /// member, but it has no value to walk through, so the walk stops with
    /// [`BindingError::NotReadable`] and retries whenever the event fires.
    pub const INTERMEDIATE: MemberKinds = MemberKinds::ACCESSOR.union(MemberKinds::EVENT);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Accessor,
    Event,
    Method,
}

impl MemberKind {
    pub fn as_kinds(self) -> MemberKinds {
        match self {
            MemberKind::Accessor => MemberKinds::ACCESSOR,
            MemberKind::Event => MemberKinds::EVENT,
            MemberKind::Method => MemberKinds::METHOD,
        }
    }
}

/// Receives change notifications from observable members.
///
/// Sources hold listeners weakly, so a listener never keeps itself alive
/// through its own subscriptions.
pub trait MemberListener {
    /// Returns `false` when the listener no longer wants notifications; the
    /// source may then forget it.
    fn on_member_changed(&self, sender: Option<&Object>) -> bool;
}

pub type WeakMemberListener = Weak<dyn MemberListener>;

/// An exclusively owned unsubscribe token.
///
/// The unsubscribe callback runs exactly once, either on [`Subscription::dispose`]
/// or when the token is dropped.
#[derive(educe::Educe)]
#[educe(Debug)]
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    #[educe(Debug(method(fmt_active)))]
    unsubscribe: Option<Box<dyn FnOnce()>>,
}

fn fmt_active(unsubscribe: &Option<Box<dyn FnOnce()>>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", if unsubscribe.is_some() { "active" } else { "released" })
}

impl Subscription {
    pub fn new(unsubscribe: impl FnOnce() + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// A token with nothing to release.
    pub fn empty() -> Self {
        Self { unsubscribe: None }
    }

    pub fn is_active(&self) -> bool {
        self.unsubscribe.is_some()
    }

    pub fn dispose(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

pub type Getter = Rc<dyn Fn(Option<&Object>, Option<&Metadata>) -> Result<Option<Object>>>;
pub type Setter = Rc<dyn Fn(Option<&Object>, Option<Object>, Option<&Metadata>) -> Result<()>>;
pub type Observe = Rc<
    dyn Fn(Option<&Object>, WeakMemberListener, Option<&Metadata>) -> Result<Option<Subscription>>,
>;
pub type Invoke =
    Rc<dyn Fn(Option<&Object>, &[Option<Object>], Option<&Metadata>) -> Result<Option<Object>>>;

/// The capabilities of a resolved member.
#[derive(Clone)]
pub enum MemberAccess {
    Accessor {
        get: Option<Getter>,
        set: Option<Setter>,
        observe: Option<Observe>,
    },
    Event {
        subscribe: Observe,
    },
    Method {
        invoke: Invoke,
        observe: Option<Observe>,
    },
}

impl MemberAccess {
    pub fn kind(&self) -> MemberKind {
        match self {
            MemberAccess::Accessor { .. } => MemberKind::Accessor,
            MemberAccess::Event { .. } => MemberKind::Event,
            MemberAccess::Method { .. } => MemberKind::Method,
        }
    }

    fn observer(&self) -> Option<&Observe> {
        match self {
            MemberAccess::Accessor { observe, .. } | MemberAccess::Method { observe, .. } => {
                observe.as_ref()
            }
            MemberAccess::Event { subscribe } => Some(subscribe),
        }
    }
}

struct MemberInner {
    name: Rc<str>,
    declaring_type: ObjectType,
    flags: MemberFlags,
    access: MemberAccess,
}

/// A member handle returned by a [`MemberResolver`].
///
/// Cloning shares the handle; [`ResolvedMember::ptr_eq`] tells whether two
/// handles came from the same resolution.
#[derive(Clone)]
pub struct ResolvedMember(Rc<MemberInner>);

impl ResolvedMember {
    pub fn new(
        name: impl Into<Rc<str>>,
        declaring_type: ObjectType,
        flags: MemberFlags,
        access: MemberAccess,
    ) -> Self {
        ResolvedMember(Rc::new(MemberInner {
            name: name.into(),
            declaring_type,
            flags,
            access,
        }))
    }

    /// A read-only accessor whose value is the target itself. Used for empty
    /// paths.
    pub fn this(declaring_type: ObjectType) -> Self {
        let get: Getter =
            Rc::new(|target: Option<&Object>, _: Option<&Metadata>| Ok(target.cloned()));
        ResolvedMember::new(
            "",
            declaring_type,
            MemberFlags::default(),
            MemberAccess::Accessor {
                get: Some(get),
                set: None,
                observe: None,
            },
        )
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn declaring_type(&self) -> ObjectType {
        self.0.declaring_type
    }

    pub fn flags(&self) -> MemberFlags {
        self.0.flags
    }

    pub fn kind(&self) -> MemberKind {
        self.0.access.kind()
    }

    pub fn access(&self) -> &MemberAccess {
        &self.0.access
    }

    pub fn ptr_eq(&self, other: &ResolvedMember) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn can_read(&self) -> bool {
        matches!(&self.0.access, MemberAccess::Accessor { get: Some(_), .. })
    }

    pub fn can_write(&self) -> bool {
        matches!(&self.0.access, MemberAccess::Accessor { set: Some(_), .. })
    }

    pub fn can_observe(&self) -> bool {
        self.0.access.observer().is_some()
    }

    pub fn read(
        &self,
        target: Option<&Object>,
        metadata: Option<&Metadata>,
    ) -> Result<Option<Object>> {
        match &self.0.access {
            MemberAccess::Accessor { get: Some(get), .. } => get(target, metadata),
            _ => Err(BindingError::NotReadable(self.name().to_owned())),
        }
    }

    pub fn write(
        &self,
        target: Option<&Object>,
        value: Option<Object>,
        metadata: Option<&Metadata>,
    ) -> Result<()> {
        match &self.0.access {
            MemberAccess::Accessor { set: Some(set), .. } => set(target, value, metadata),
            _ => Err(BindingError::NotWritable(self.name().to_owned())),
        }
    }

    pub fn invoke(
        &self,
        target: Option<&Object>,
        args: &[Option<Object>],
        metadata: Option<&Metadata>,
    ) -> Result<Option<Object>> {
        match &self.0.access {
            MemberAccess::Method { invoke, .. } => invoke(target, args, metadata),
            _ => Err(BindingError::NotInvocable(self.name().to_owned())),
        }
    }

    /// Subscribes `listener` to changes of this member on `target`.
    ///
    /// Returns `Ok(None)` when the member cannot be observed.
    pub fn subscribe(
        &self,
        target: Option<&Object>,
        listener: WeakMemberListener,
        metadata: Option<&Metadata>,
    ) -> Result<Option<Subscription>> {
        match self.0.access.observer() {
            Some(observe) => observe(target, listener, metadata),
            None => Ok(None),
        }
    }
}

impl fmt::Debug for ResolvedMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedMember")
            .field("name", &self.0.name)
            .field("declaring_type", &self.0.declaring_type)
            .field("kind", &self.kind())
            .field("observable", &self.can_observe())
            .finish()
    }
}

impl MemberHandle for ResolvedMember {
    fn name(&self) -> &str {
        ResolvedMember::name(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The member lookup service consumed by observers.
pub trait MemberResolver {
    /// Looks up `name` on `ty`, accepting only members whose kind is in `kinds`.
    ///
    /// `None` means no such member; callers decide whether that is fatal.
    fn resolve(
        &self,
        ty: ObjectType,
        name: &str,
        kinds: MemberKinds,
        flags: MemberFlags,
    ) -> Option<ResolvedMember>;
}

impl<R: MemberResolver + ?Sized> MemberResolver for Rc<R> {
    fn resolve(
        &self,
        ty: ObjectType,
        name: &str,
        kinds: MemberKinds,
        flags: MemberFlags,
    ) -> Option<ResolvedMember> {
        (**self).resolve(ty, name, kinds, flags)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn subscription_releases_exactly_once() {
        let count = Rc::new(Cell::new(0));
        let sub = Subscription::new({
            let count = count.clone();
            move || count.set(count.get() + 1)
        });
        assert!(sub.is_active());
        sub.dispose();
        assert_eq!(count.get(), 1);

        let sub = Subscription::new({
            let count = count.clone();
            move || count.set(count.get() + 1)
        });
        drop(sub);
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn capabilities_follow_the_payload() {
        let ty = ObjectType::of::<()>();
        let this = ResolvedMember::this(ty);
        assert_eq!(this.kind(), MemberKind::Accessor);
        assert!(this.can_read());
        assert!(!this.can_write());
        assert!(!this.can_observe());

        let target = Object::new(());
        let value = this.read(Some(&target), None).unwrap().unwrap();
        assert!(value.ptr_eq(&target));
        assert_eq!(
            this.write(Some(&target), None, None),
            Err(BindingError::NotWritable(String::new()))
        );
        assert!(matches!(
            this.invoke(Some(&target), &[], None),
            Err(BindingError::NotInvocable(name)) if name.is_empty()
        ));
    }

    #[test]
    fn unobservable_member_subscribes_to_nothing() {
        struct Noop;
        impl MemberListener for Noop {
            fn on_member_changed(&self, _: Option<&Object>) -> bool {
                true
            }
        }
        let listener: Rc<dyn MemberListener> = Rc::new(Noop);
        let member = ResolvedMember::this(ObjectType::of::<()>());
        let sub = member
            .subscribe(None, Rc::downgrade(&listener), None)
            .unwrap();
        assert!(sub.is_none());
    }
}
