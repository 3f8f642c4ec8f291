use std::rc::Rc;

use crate::{error::BindingError, observer::PathObserver};

/// Receives the notifications of a [`PathObserver`].
pub trait ObserverListener {
    /// The resolved member chain was rebuilt. Sent after every update,
    /// successful or not.
    fn on_path_members_changed(&self, observer: &PathObserver);

    /// The value of the terminal member changed; the chain itself did not.
    fn on_last_member_changed(&self, observer: &PathObserver);

    /// Resolution failed or another listener panicked.
    fn on_error(&self, observer: &PathObserver, error: &BindingError);
}

pub type ListenerRef = Rc<dyn ObserverListener>;

/// Listener identity is the allocation, not the value.
pub(crate) fn same_listener(a: &ListenerRef, b: &ListenerRef) -> bool {
    std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}

/// Listener storage. Zero and one listener need no list allocation; the list
/// itself is shared with snapshots and copied on write.
#[derive(Clone, Default)]
pub(crate) enum Listeners {
    #[default]
    Empty,
    One(ListenerRef),
    Many(Rc<[ListenerRef]>),
    /// Set once by dispose; unlike `Empty` it refuses new listeners.
    Disposed,
}

pub(crate) enum Added {
    First,
    More,
    Rejected,
}

pub(crate) enum Removed {
    NotFound,
    Some,
    Last,
}

impl Listeners {
    pub(crate) fn add(&mut self, listener: ListenerRef) -> Added {
        let (next, added) = match std::mem::take(self) {
            Listeners::Disposed => (Listeners::Disposed, Added::Rejected),
            Listeners::Empty => (Listeners::One(listener), Added::First),
            Listeners::One(first) => (Listeners::Many(Rc::from([first, listener])), Added::More),
            Listeners::Many(list) => {
                let mut grown = Vec::with_capacity(list.len() + 1);
                grown.extend(list.iter().cloned());
                grown.push(listener);
                (Listeners::Many(grown.into()), Added::More)
            }
        };
        *self = next;
        added
    }

    /// Removes the first entry that is `listener`.
    pub(crate) fn remove(&mut self, listener: &ListenerRef) -> Removed {
        match self {
            Listeners::One(current) if same_listener(current, listener) => {
                *self = Listeners::Empty;
                Removed::Last
            }
            Listeners::Many(list) => {
                let Some(pos) = list.iter().position(|l| same_listener(l, listener)) else {
                    return Removed::NotFound;
                };
                *self = if list.len() == 2 {
                    Listeners::One(list[1 - pos].clone())
                } else {
                    let mut shrunk = Vec::with_capacity(list.len() - 1);
                    shrunk.extend(list[..pos].iter().cloned());
                    shrunk.extend(list[pos + 1..].iter().cloned());
                    Listeners::Many(shrunk.into())
                };
                Removed::Some
            }
            _ => Removed::NotFound,
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            Listeners::Empty | Listeners::Disposed => 0,
            Listeners::One(_) => 1,
            Listeners::Many(list) => list.len(),
        }
    }

    pub(crate) fn snapshot(&self) -> ListenerSnapshot {
        ListenerSnapshot {
            listeners: match self {
                Listeners::Disposed => Listeners::Empty,
                other => other.clone(),
            },
        }
    }
}

/// A point-in-time view of an observer's listeners.
///
/// Taking one never allocates: it shares the observer's storage.
#[derive(Clone, Default)]
pub struct ListenerSnapshot {
    listeners: Listeners,
}

impl ListenerSnapshot {
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[ListenerRef] {
        match &self.listeners {
            Listeners::One(listener) => std::slice::from_ref(listener),
            Listeners::Many(list) => list,
            Listeners::Empty | Listeners::Disposed => &[],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ListenerRef> {
        self.as_slice().iter()
    }

    pub fn contains(&self, listener: &ListenerRef) -> bool {
        self.iter().any(|l| same_listener(l, listener))
    }
}

impl std::fmt::Debug for ListenerSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSnapshot")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nop;

    impl ObserverListener for Nop {
        fn on_path_members_changed(&self, _: &PathObserver) {}
        fn on_last_member_changed(&self, _: &PathObserver) {}
        fn on_error(&self, _: &PathObserver, _: &BindingError) {}
    }

    fn nop() -> ListenerRef {
        Rc::new(Nop)
    }

    #[test]
    fn storage_compacts_back_down() {
        let (a, b, c) = (nop(), nop(), nop());
        let mut listeners = Listeners::Empty;

        assert!(matches!(listeners.add(a.clone()), Added::First));
        assert!(matches!(listeners, Listeners::One(_)));
        assert!(matches!(listeners.add(b.clone()), Added::More));
        assert!(matches!(listeners.add(c.clone()), Added::More));
        assert_eq!(listeners.len(), 3);

        assert!(matches!(listeners.remove(&b), Removed::Some));
        assert!(matches!(listeners, Listeners::Many(ref list) if list.len() == 2));
        assert!(matches!(listeners.remove(&a), Removed::Some));
        assert!(matches!(listeners, Listeners::One(ref only) if same_listener(only, &c)));
        assert!(matches!(listeners.remove(&a), Removed::NotFound));
        assert!(matches!(listeners.remove(&c), Removed::Last));
        assert!(matches!(listeners, Listeners::Empty));
    }

    #[test]
    fn duplicates_are_kept_and_removed_one_at_a_time() {
        let a = nop();
        let mut listeners = Listeners::Empty;
        listeners.add(a.clone());
        listeners.add(a.clone());
        assert_eq!(listeners.len(), 2);
        assert!(matches!(listeners.remove(&a), Removed::Some));
        assert!(matches!(listeners.remove(&a), Removed::Last));
    }

    #[test]
    fn snapshots_are_unaffected_by_later_changes() {
        let (a, b) = (nop(), nop());
        let mut listeners = Listeners::Empty;
        listeners.add(a.clone());
        listeners.add(b.clone());
        let snapshot = listeners.snapshot();
        listeners.remove(&a);
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.contains(&a));
        assert_eq!(listeners.snapshot().len(), 1);
    }

    #[test]
    fn disposed_storage_rejects_listeners() {
        let mut listeners = Listeners::Disposed;
        assert!(matches!(listeners.add(nop()), Added::Rejected));
        assert!(matches!(listeners, Listeners::Disposed));
        assert!(listeners.snapshot().is_empty());
    }
}
