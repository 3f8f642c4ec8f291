use std::{any::Any, borrow::Cow};

use rustc_hash::FxHashMap;

use crate::object::Object;

/// Per-call context handed through to host accessors, events and methods.
///
/// The engine itself never reads it.
#[derive(Clone, Debug, Default)]
pub struct Metadata {
    values: FxHashMap<Cow<'static, str>, Object>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<Cow<'static, str>>, value: Object) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<Cow<'static, str>>, value: Object) -> Option<Object> {
        self.values.insert(key.into(), value)
    }

    pub fn get(&self, key: &str) -> Option<&Object> {
        self.values.get(key)
    }

    pub fn get_as<T: Any>(&self, key: &str) -> Option<&T> {
        self.get(key).and_then(|value| value.downcast_ref::<T>())
    }

    pub fn remove(&mut self, key: &str) -> Option<Object> {
        self.values.remove(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
