//! A table-driven [`MemberResolver`].
//!
//! Hosts describe the members of their types with the builders in this module
//! and register them once:
//!
//! ```rust
//! use floem_observe::{ChangeEvent, MemberRegistry, Object, Property};
//!
//! struct Person {
//!     name: std::cell::RefCell<String>,
//!     name_changed: ChangeEvent,
//! }
//!
//! let mut registry = MemberRegistry::new();
//! registry.add(
//!     Property::<Person>::new("Name")
//!         .get(|p| Some(Object::new(p.name.borrow().clone())))
//!         .observe(|p| &p.name_changed),
//! );
//! ```

use std::{any::Any, marker::PhantomData, rc::Rc};

use floem_expr::Literal;
use indexmap::IndexMap;
use rustc_hash::{FxBuildHasher, FxHashMap};

use crate::{
    change::ChangeEvent,
    error::{BindingError, Result},
    member::{
        Getter, Invoke, MemberAccess, MemberFlags, MemberKinds, MemberResolver, Observe,
        ResolvedMember, Setter, WeakMemberListener,
    },
    metadata::Metadata,
    object::{Object, ObjectType},
    path::{is_index_segment, parse_index_args},
};

fn downcast_target<'a, T: Any>(target: Option<&'a Object>, member: &str) -> Result<&'a T> {
    target
        .and_then(|target| target.downcast_ref::<T>())
        .ok_or_else(|| {
            BindingError::member(
                member,
                format_args!("target is not a {}", ObjectType::of::<T>()),
            )
        })
}

fn observe_with<T: Any>(
    name: Rc<str>,
    event: impl Fn(&T) -> &ChangeEvent + 'static,
) -> Observe {
    Rc::new(
        move |target: Option<&Object>, listener: WeakMemberListener, _: Option<&Metadata>| {
            let target = downcast_target::<T>(target, &name)?;
            Ok(Some(event(target).subscribe(listener)))
        },
    )
}

/// Describes a readable and/or writable member of `T`.
pub struct Property<T> {
    name: Rc<str>,
    flags: MemberFlags,
    get: Option<Getter>,
    set: Option<Setter>,
    observe: Option<Observe>,
    ty: PhantomData<fn(&T)>,
}

impl<T: Any> Property<T> {
    pub fn new(name: impl Into<Rc<str>>) -> Self {
        Property {
            name: name.into(),
            flags: MemberFlags::default(),
            get: None,
            set: None,
            observe: None,
            ty: PhantomData,
        }
    }

    pub fn get(self, get: impl Fn(&T) -> Option<Object> + 'static) -> Self {
        self.try_get(move |target| Ok(get(target)))
    }

    pub fn try_get(mut self, get: impl Fn(&T) -> Result<Option<Object>> + 'static) -> Self {
        let name = self.name.clone();
        self.get = Some(Rc::new(
            move |target: Option<&Object>, _: Option<&Metadata>| {
                get(downcast_target::<T>(target, &name)?)
            },
        ));
        self
    }

    pub fn set(mut self, set: impl Fn(&T, Option<Object>) -> Result<()> + 'static) -> Self {
        let name = self.name.clone();
        self.set = Some(Rc::new(
            move |target: Option<&Object>, value: Option<Object>, _: Option<&Metadata>| {
                set(downcast_target::<T>(target, &name)?, value)
            },
        ));
        self
    }

    /// Makes the member observable through the given change source.
    pub fn observe(mut self, event: impl Fn(&T) -> &ChangeEvent + 'static) -> Self {
        self.observe = Some(observe_with(self.name.clone(), event));
        self
    }

    pub fn flags(mut self, flags: MemberFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn build(self) -> ResolvedMember {
        ResolvedMember::new(
            self.name,
            ObjectType::of::<T>(),
            self.flags,
            MemberAccess::Accessor {
                get: self.get,
                set: self.set,
                observe: self.observe,
            },
        )
    }
}

/// Describes an event member of `T`.
pub struct EventMember<T> {
    name: Rc<str>,
    subscribe: Observe,
    ty: PhantomData<fn(&T)>,
}

impl<T: Any> EventMember<T> {
    pub fn new(name: impl Into<Rc<str>>, event: impl Fn(&T) -> &ChangeEvent + 'static) -> Self {
        let name = name.into();
        EventMember {
            subscribe: observe_with(name.clone(), event),
            name,
            ty: PhantomData,
        }
    }

    pub fn build(self) -> ResolvedMember {
        ResolvedMember::new(
            self.name,
            ObjectType::of::<T>(),
            MemberFlags::default(),
            MemberAccess::Event {
                subscribe: self.subscribe,
            },
        )
    }
}

/// Describes a method of `T`.
pub struct Method<T> {
    name: Rc<str>,
    invoke: Invoke,
    observe: Option<Observe>,
    ty: PhantomData<fn(&T)>,
}

impl<T: Any> Method<T> {
    pub fn new(
        name: impl Into<Rc<str>>,
        invoke: impl Fn(&T, &[Option<Object>]) -> Result<Option<Object>> + 'static,
    ) -> Self {
        let name: Rc<str> = name.into();
        let member = name.clone();
        Method {
            invoke: Rc::new(
                move |target: Option<&Object>, args: &[Option<Object>], _: Option<&Metadata>| {
                    invoke(downcast_target::<T>(target, &member)?, args)
                },
            ),
            name,
            observe: None,
            ty: PhantomData,
        }
    }

    /// Marks the method result as observable through the given change source.
    pub fn observe(mut self, event: impl Fn(&T) -> &ChangeEvent + 'static) -> Self {
        self.observe = Some(observe_with(self.name.clone(), event));
        self
    }

    pub fn build(self) -> ResolvedMember {
        ResolvedMember::new(
            self.name,
            ObjectType::of::<T>(),
            MemberFlags::default(),
            MemberAccess::Method {
                invoke: self.invoke,
                observe: self.observe,
            },
        )
    }
}

type IndexGet<T> = Rc<dyn Fn(&T, &[Literal]) -> Result<Option<Object>>>;
type IndexSet<T> = Rc<dyn Fn(&T, &[Literal], Option<Object>) -> Result<()>>;
type IndexEvent<T> = Rc<dyn Fn(&T) -> &ChangeEvent>;

/// Describes how index segments (`[0]`, `["key"]`) resolve on `T`.
pub struct Indexer<T> {
    get: IndexGet<T>,
    set: Option<IndexSet<T>>,
    event: Option<IndexEvent<T>>,
}

impl<T: Any> Indexer<T> {
    pub fn new(get: impl Fn(&T, &[Literal]) -> Result<Option<Object>> + 'static) -> Self {
        Indexer {
            get: Rc::new(get),
            set: None,
            event: None,
        }
    }

    pub fn set(
        mut self,
        set: impl Fn(&T, &[Literal], Option<Object>) -> Result<()> + 'static,
    ) -> Self {
        self.set = Some(Rc::new(set));
        self
    }

    /// Items of the indexed collection change together with this source.
    pub fn observe(mut self, event: impl Fn(&T) -> &ChangeEvent + 'static) -> Self {
        self.event = Some(Rc::new(event));
        self
    }
}

/// Type-erased so the registry can store indexers of any `T`.
trait BindIndex {
    fn bind(&self, segment: &str, args: Vec<Literal>) -> ResolvedMember;
}

impl<T: Any> BindIndex for Indexer<T> {
    fn bind(&self, segment: &str, args: Vec<Literal>) -> ResolvedMember {
        let args: Rc<[Literal]> = args.into();
        let name: Rc<str> = segment.into();

        let get: Getter = {
            let (get, args, name) = (self.get.clone(), args.clone(), name.clone());
            Rc::new(move |target: Option<&Object>, _: Option<&Metadata>| {
                get(downcast_target::<T>(target, &name)?, &args)
            })
        };
        let set: Option<Setter> = self.set.clone().map(|set| {
            let (args, name) = (args.clone(), name.clone());
            Rc::new(
                move |target: Option<&Object>, value: Option<Object>, _: Option<&Metadata>| {
                    set(downcast_target::<T>(target, &name)?, &args, value)
                },
            ) as Setter
        });
        let observe = self.event.clone().map(|event| {
            observe_with::<T>(name.clone(), move |target: &T| event(target))
        });

        ResolvedMember::new(
            name,
            ObjectType::of::<T>(),
            MemberFlags::default(),
            MemberAccess::Accessor {
                get: Some(get),
                set,
                observe,
            },
        )
    }
}

/// Resolves members from what hosts registered per type.
#[derive(Default)]
pub struct MemberRegistry {
    members: FxHashMap<ObjectType, IndexMap<Rc<str>, ResolvedMember, FxBuildHasher>>,
    indexers: FxHashMap<ObjectType, Box<dyn BindIndex>>,
}

impl MemberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a member, replacing any member with the same name on the
    /// same type.
    pub fn add(&mut self, member: impl Into<ResolvedMember>) -> &mut Self {
        let member = member.into();
        self.members
            .entry(member.declaring_type())
            .or_default()
            .insert(member.name().into(), member);
        self
    }

    pub fn add_indexer<T: Any>(&mut self, indexer: Indexer<T>) -> &mut Self {
        self.indexers.insert(ObjectType::of::<T>(), Box::new(indexer));
        self
    }

    /// The members registered for `ty`, in registration order.
    pub fn members_of(&self, ty: ObjectType) -> impl Iterator<Item = &ResolvedMember> {
        self.members.get(&ty).into_iter().flat_map(|members| members.values())
    }

    pub fn has_indexer(&self, ty: ObjectType) -> bool {
        self.indexers.contains_key(&ty)
    }
}

impl<T: Any> From<Property<T>> for ResolvedMember {
    fn from(property: Property<T>) -> Self {
        property.build()
    }
}

impl<T: Any> From<EventMember<T>> for ResolvedMember {
    fn from(event: EventMember<T>) -> Self {
        event.build()
    }
}

impl<T: Any> From<Method<T>> for ResolvedMember {
    fn from(method: Method<T>) -> Self {
        method.build()
    }
}

fn flags_match(member: MemberFlags, requested: MemberFlags) -> bool {
    let scope = MemberFlags::INSTANCE | MemberFlags::STATIC;
    let visibility = MemberFlags::PUBLIC | MemberFlags::NON_PUBLIC;
    member.intersects(requested & scope) && member.intersects(requested & visibility)
}

impl MemberResolver for MemberRegistry {
    fn resolve(
        &self,
        ty: ObjectType,
        name: &str,
        kinds: MemberKinds,
        flags: MemberFlags,
    ) -> Option<ResolvedMember> {
        if is_index_segment(name) {
            if !kinds.contains(MemberKinds::ACCESSOR) {
                return None;
            }
            let indexer = self.indexers.get(&ty)?;
            let args = parse_index_args(name).ok()?;
            return Some(indexer.bind(name, args));
        }

        let member = self.members.get(&ty)?.get(name)?;
        (kinds.contains(member.kind().as_kinds()) && flags_match(member.flags(), flags))
            .then(|| member.clone())
    }
}
