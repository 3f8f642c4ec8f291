#![allow(dead_code)]

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use floem_observe::{
    BindingError, ChangeEvent, EventMember, Indexer, ListenerRef, MemberFlags, MemberKinds,
    MemberRegistry, MemberResolver, Method, Object, ObjectType, ObserverListener, PathObserver,
    Property, ResolvedMember, expr::Literal,
};

/// A graph node. Every node type in the tests is a `Node`; paths such as
/// `A.B.C` walk `a`, then `b`, then read `c`.
#[derive(Default)]
pub struct Node {
    pub a: RefCell<Option<Object>>,
    pub a_changed: ChangeEvent,
    pub b: RefCell<Option<Object>>,
    pub b_changed: ChangeEvent,
    pub c: RefCell<Option<i64>>,
    pub c_changed: ChangeEvent,
    pub items: RefCell<Option<Object>>,
}

/// A list reachable through `Items`, indexable as `Items[0]`.
#[derive(Default)]
pub struct List {
    pub values: RefCell<Vec<i64>>,
    pub changed: ChangeEvent,
}

/// A type with no members registered.
pub struct Opaque;

pub fn node() -> Object {
    Object::new(Node::default())
}

pub fn list(values: &[i64]) -> Object {
    Object::new(List {
        values: RefCell::new(values.to_vec()),
        changed: ChangeEvent::new(),
    })
}

fn as_node(object: &Object) -> &Node {
    object.downcast_ref::<Node>().expect("not a Node")
}

pub fn set_a(owner: &Object, child: Option<Object>) {
    let node = as_node(owner);
    *node.a.borrow_mut() = child;
    node.a_changed.raise(Some(owner));
}

pub fn set_b(owner: &Object, child: Option<Object>) {
    let node = as_node(owner);
    *node.b.borrow_mut() = child;
    node.b_changed.raise(Some(owner));
}

pub fn set_c(owner: &Object, value: Option<i64>) {
    let node = as_node(owner);
    *node.c.borrow_mut() = value;
    node.c_changed.raise(Some(owner));
}

pub fn set_items(owner: &Object, items: Object) {
    *as_node(owner).items.borrow_mut() = Some(items);
}

pub fn push_item(list: &Object, value: i64) {
    let list = list.downcast_ref::<List>().expect("not a List");
    list.values.borrow_mut().push(value);
    list.changed.raise(None);
}

/// Live subscriptions held on `object`'s change events.
pub fn subscriptions(object: &Object) -> usize {
    if let Some(node) = object.downcast_ref::<Node>() {
        node.a_changed.listener_count()
            + node.b_changed.listener_count()
            + node.c_changed.listener_count()
    } else if let Some(list) = object.downcast_ref::<List>() {
        list.changed.listener_count()
    } else {
        0
    }
}

/// `root.A.B.C == c`. Returns `(root, a, b)`.
pub fn chain(c: i64) -> (Object, Object, Object) {
    let (root, a, b) = (node(), node(), node());
    *as_node(&b).c.borrow_mut() = Some(c);
    *as_node(&a).b.borrow_mut() = Some(b.clone());
    *as_node(&root).a.borrow_mut() = Some(a.clone());
    (root, a, b)
}

pub fn registry() -> MemberRegistry {
    let mut registry = MemberRegistry::new();
    registry
        .add(
            Property::<Node>::new("A")
                .get(|n| n.a.borrow().clone())
                .observe(|n| &n.a_changed),
        )
        .add(
            Property::<Node>::new("B")
                .get(|n| n.b.borrow().clone())
                .observe(|n| &n.b_changed),
        )
        .add(
            Property::<Node>::new("C")
                .get(|n| n.c.borrow().map(Object::new))
                .set(|n, value| {
                    *n.c.borrow_mut() = value.and_then(|v| v.downcast_ref::<i64>().copied());
                    n.c_changed.raise(None);
                    Ok(())
                })
                .observe(|n| &n.c_changed),
        )
        .add(Property::<Node>::new("Items").get(|n| n.items.borrow().clone()))
        .add(EventMember::<Node>::new("AChanged", |n| &n.a_changed))
        .add(Property::<Node>::new("Boom").get(|_| panic!("getter exploded")))
        .add(Method::<Node>::new("Double", |n, args| {
            let factor = match args {
                [Some(arg)] => arg.downcast_ref::<i64>().copied().unwrap_or(1),
                _ => 1,
            };
            Ok(n.c.borrow().map(|c| Object::new(c * 2 * factor)))
        }))
        // `Node["key"]` echoes its key back.
        .add_indexer(Indexer::<Node>::new(|_, args| match args {
            [Literal::Str(key)] => Ok(Some(Object::new(key.to_string()))),
            _ => Err(BindingError::member("[]", "expected one string")),
        }))
        .add(
            Property::<List>::new("Count")
                .get(|l| Some(Object::new(l.values.borrow().len() as i64)))
                .observe(|l| &l.changed),
        )
        .add(Method::<List>::new("Sum", |l, _| {
            Ok(Some(Object::new(l.values.borrow().iter().sum::<i64>())))
        }))
        .add_indexer(
            Indexer::<List>::new(|l, args| match args {
                [Literal::Int(i)] => Ok(usize::try_from(*i)
                    .ok()
                    .and_then(|i| l.values.borrow().get(i).copied())
                    .map(Object::new)),
                _ => Err(BindingError::member("[]", "expected one integer")),
            })
            .observe(|l| &l.changed),
        );
    registry
}

/// Counts calls that reach the registry.
pub struct CountingResolver {
    registry: MemberRegistry,
    pub calls: Cell<usize>,
}

impl CountingResolver {
    pub fn new() -> Rc<Self> {
        Rc::new(CountingResolver {
            registry: registry(),
            calls: Cell::new(0),
        })
    }
}

impl MemberResolver for CountingResolver {
    fn resolve(
        &self,
        ty: ObjectType,
        name: &str,
        kinds: MemberKinds,
        flags: MemberFlags,
    ) -> Option<ResolvedMember> {
        self.calls.set(self.calls.get() + 1);
        self.registry.resolve(ty, name, kinds, flags)
    }
}

/// Records everything an observer reports.
#[derive(Default)]
pub struct Recorder {
    pub path_changes: Cell<usize>,
    pub last_changes: Cell<usize>,
    pub errors: RefCell<Vec<BindingError>>,
}

impl Recorder {
    pub fn new() -> (Rc<Recorder>, ListenerRef) {
        let recorder = Rc::new(Recorder::default());
        let listener: ListenerRef = recorder.clone();
        (recorder, listener)
    }

    pub fn error_count(&self) -> usize {
        self.errors.borrow().len()
    }
}

impl ObserverListener for Recorder {
    fn on_path_members_changed(&self, _: &PathObserver) {
        self.path_changes.set(self.path_changes.get() + 1);
    }

    fn on_last_member_changed(&self, _: &PathObserver) {
        self.last_changes.set(self.last_changes.get() + 1);
    }

    fn on_error(&self, _: &PathObserver, error: &BindingError) {
        self.errors.borrow_mut().push(error.clone());
    }
}

pub fn read_i64(observer: &PathObserver) -> Option<i64> {
    observer
        .value(None)
        .expect("path faulted")
        .and_then(|value| value.downcast_ref::<i64>().copied())
}
