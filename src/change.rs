//! A change source hosts can embed in their objects to make members observable.

use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};

use smallvec::SmallVec;

use crate::{
    member::{Subscription, WeakMemberListener},
    object::Object,
};

type Slots = SmallVec<[(u64, WeakMemberListener); 4]>;

#[derive(Default)]
struct ChangeEventInner {
    next_id: u64,
    listeners: Slots,
}

/// Fans a change notification out to weakly held
/// [`MemberListener`](crate::member::MemberListener)s.
#[derive(Clone, Default)]
pub struct ChangeEvent {
    inner: Rc<RefCell<ChangeEventInner>>,
}

impl ChangeEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: WeakMemberListener) -> Subscription {
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.listeners.push((id, listener));
            id
        };
        let inner: Weak<RefCell<ChangeEventInner>> = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.borrow_mut().listeners.retain(|(slot, _)| *slot != id);
            }
        })
    }

    /// Notifies every live listener and returns how many were reached.
    pub fn raise(&self, sender: Option<&Object>) -> usize {
        // Snapshot first so listeners can subscribe or unsubscribe while
        // being notified.
        let listeners: Slots = self.inner.borrow().listeners.clone();

        let mut dead: SmallVec<[u64; 4]> = SmallVec::new();
        let mut notified = 0;
        for (id, listener) in listeners {
            match listener.upgrade() {
                Some(listener) => {
                    notified += 1;
                    if !listener.on_member_changed(sender) {
                        dead.push(id);
                    }
                }
                None => dead.push(id),
            }
        }

        if !dead.is_empty() {
            self.inner
                .borrow_mut()
                .listeners
                .retain(|(id, _)| !dead.contains(id));
        }
        notified
    }

    pub fn listener_count(&self) -> usize {
        self.inner.borrow().listeners.len()
    }

    pub fn has_listeners(&self) -> bool {
        self.listener_count() > 0
    }
}
