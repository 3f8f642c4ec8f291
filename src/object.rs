//! Type-erased handles to host objects.
//!
//! The observation engine never knows the concrete types of the objects it
//! walks through. Hosts wrap them in an [`Object`], which remembers the
//! runtime [`ObjectType`] so members can be resolved against it.

use std::{
    any::{Any, TypeId},
    fmt,
    hash::{Hash, Hasher},
    rc::{Rc, Weak},
};

/// The runtime type of an [`Object`]. Equality only looks at the `TypeId`.
#[derive(Clone, Copy)]
pub struct ObjectType {
    id: TypeId,
    name: &'static str,
}

impl ObjectType {
    pub fn of<T: Any>() -> Self {
        ObjectType {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The type name without its module path.
    pub fn short_name(&self) -> &'static str {
        let name = self.name.split('<').next().unwrap_or(self.name);
        match name.rfind("::") {
            Some(pos) => &self.name[pos + 2..],
            None => self.name,
        }
    }
}

impl PartialEq for ObjectType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ObjectType {}

impl Hash for ObjectType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// A strong, cheaply cloneable handle to a host object.
#[derive(Clone)]
pub struct Object {
    value: Rc<dyn Any>,
    ty: ObjectType,
}

impl Object {
    pub fn new<T: Any>(value: T) -> Self {
        Object::from_rc(Rc::new(value))
    }

    /// Wraps an existing allocation, sharing its identity with `value`.
    pub fn from_rc<T: Any>(value: Rc<T>) -> Self {
        Object {
            value,
            ty: ObjectType::of::<T>(),
        }
    }

    pub fn object_type(&self) -> ObjectType {
        self.ty
    }

    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    pub fn downcast_rc<T: Any>(&self) -> Option<Rc<T>> {
        self.value.clone().downcast::<T>().ok()
    }

    pub fn ptr_eq(&self, other: &Object) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.value), Rc::as_ptr(&other.value))
    }

    pub fn downgrade(&self) -> WeakObject {
        WeakObject {
            value: Rc::downgrade(&self.value),
            ty: self.ty,
        }
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object({}@{:p})", self.ty, Rc::as_ptr(&self.value))
    }
}

/// A non-owning handle to an [`Object`].
#[derive(Clone)]
pub struct WeakObject {
    value: Weak<dyn Any>,
    ty: ObjectType,
}

impl WeakObject {
    pub fn upgrade(&self) -> Option<Object> {
        self.value.upgrade().map(|value| Object { value, ty: self.ty })
    }

    pub fn is_alive(&self) -> bool {
        self.value.strong_count() > 0
    }

    pub fn object_type(&self) -> ObjectType {
        self.ty
    }

    /// Identity check against a live object, without upgrading.
    pub fn points_to(&self, object: &Object) -> bool {
        std::ptr::addr_eq(self.value.as_ptr(), Rc::as_ptr(&object.value))
    }
}

impl fmt::Debug for WeakObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakObject({}, alive: {})", self.ty, self.is_alive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Person;

    #[test]
    fn identity_follows_the_allocation() {
        let rc = Rc::new(Person);
        let a = Object::from_rc(rc.clone());
        let b = Object::from_rc(rc);
        let c = Object::new(Person);
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
        assert_eq!(a.object_type(), c.object_type());
        assert_eq!(a.object_type().short_name(), "Person");
    }

    #[test]
    fn weak_handle_dies_with_the_object() {
        let object = Object::new(5i64);
        let weak = object.downgrade();
        assert!(weak.points_to(&object));
        assert_eq!(weak.upgrade().and_then(|o| o.downcast_ref::<i64>().copied()), Some(5));
        drop(object);
        assert!(!weak.is_alive());
        assert!(weak.upgrade().is_none());
    }
}
