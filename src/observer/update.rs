use std::{
    cell::Cell,
    panic::{self, AssertUnwindSafe},
    rc::Rc,
};

use tracing::{debug, trace};

use super::{ObserverFlags, ObserverInner, ObserverState, Resolution, Tracked};
use crate::{
    error::{BindingError, Result, panic_message},
    member::{MemberKinds, ResolvedMember},
    metadata::Metadata,
    object::Object,
};

/// Holds `UPDATING` for its lifetime, panics included.
struct Updating<'a>(&'a Cell<ObserverState>);

impl<'a> Updating<'a> {
    fn enter(state: &'a Cell<ObserverState>) -> Self {
        state.set(state.get().union(ObserverState::UPDATING));
        Updating(state)
    }
}

impl Drop for Updating<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().difference(ObserverState::UPDATING));
    }
}

impl ObserverInner {
    pub(super) fn update(&self, metadata: Option<&Metadata>) {
        if self
            .state
            .get()
            .intersects(ObserverState::UPDATING | ObserverState::DISPOSED)
        {
            trace!(path = %self.path, "update skipped");
            return;
        }
        let _updating = Updating::enter(&self.state);
        trace!(path = %self.path, "updating");

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let resolution = self.resolve(metadata)?;
            self.set_resolution(resolution);
            self.subscribe_last_member(metadata)
        }));
        if self.is_disposed() {
            // Disposed by host code while walking.
            self.release_chain();
            return;
        }
        let error = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(error)) => Some(error),
            Err(payload) => Some(BindingError::InternalFault(panic_message(&*payload))),
        };
        if let Some(error) = &error {
            debug!(path = %self.path, %error, "path resolution failed");
            self.set_resolution(Resolution::Faulted(error.clone()));
            let last = self.last_subscription.borrow_mut().take();
            drop(last);
        }
        self.insert_state(ObserverState::INITIALIZED);

        if let Some(error) = error {
            if let Some(observer) = self.handle() {
                self.notify_error(&observer, &error);
            }
        }
        self.notify(super::Notification::PathMembersChanged);
    }

    fn resolve(&self, metadata: Option<&Metadata>) -> Result<Resolution> {
        let Some(root) = self.root() else {
            trace!(path = %self.path, "target is gone");
            self.release_chain();
            return Ok(Resolution::Empty);
        };
        if self.path.is_empty() {
            return Ok(Resolution::Resolved {
                members: Rc::from([ResolvedMember::this(root.object_type())]),
                target: root.downgrade(),
            });
        }

        let stable = self.flags.contains(ObserverFlags::STABLE_PATH);
        // A single segment is always resolved against the same root type.
        let keep_handles = stable || self.path.is_single();
        let (mut handles, mut previous) = {
            let mut chain = self.chain.borrow_mut();
            (
                std::mem::take(&mut chain.handles),
                std::mem::take(&mut chain.tracked),
            )
        };
        if !keep_handles {
            handles.clear();
        }
        if !stable {
            drop(std::mem::take(&mut previous));
        }

        let mut tracked = Vec::with_capacity(self.path.len().saturating_sub(1));
        let resolution = self.walk(root, metadata, &mut handles, &mut previous, &mut tracked);
        // Whatever was not carried over unsubscribes here.
        drop(previous);
        if !keep_handles {
            handles.clear();
        }

        if self.is_disposed() {
            drop(tracked);
            return Ok(Resolution::Empty);
        }
        let mut chain = self.chain.borrow_mut();
        chain.handles = handles;
        chain.tracked = tracked;
        resolution
    }

    fn walk(
        &self,
        root: Object,
        metadata: Option<&Metadata>,
        handles: &mut Vec<ResolvedMember>,
        previous: &mut [Tracked],
        tracked: &mut Vec<Tracked>,
    ) -> Result<Resolution> {
        let names = self.path.members();
        let last = names.len() - 1;
        let mut resolved = Vec::with_capacity(names.len());
        let mut target = root;

        for (index, name) in names.iter().enumerate() {
            let member = match handles.get(index) {
                Some(member) => member.clone(),
                None => {
                    let kinds = if index == last {
                        MemberKinds::all()
                    } else {
                        MemberKinds::INTERMEDIATE
                    };
                    let ty = target.object_type();
                    match self.resolver.resolve(ty, name, kinds, self.member_flags) {
                        Some(member) => {
                            handles.push(member.clone());
                            member
                        }
                        None if self.flags.contains(ObserverFlags::OPTIONAL) => {
                            trace!(path = %self.path, segment = %name, "optional member missing");
                            return Ok(Resolution::Empty);
                        }
                        None => return Err(BindingError::missing_member(ty, &**name)),
                    }
                }
            };
            resolved.push(member.clone());

            if index == last {
                return Ok(Resolution::Resolved {
                    members: resolved.into(),
                    target: target.downgrade(),
                });
            }

            // Subscribe before reading so a change in between is not missed.
            let carried = previous
                .get_mut(index)
                .filter(|old| old.target.points_to(&target))
                .map(|old| old.subscription.take());
            let subscription = match carried {
                Some(subscription) => subscription,
                None => member.subscribe(
                    Some(&target),
                    Rc::downgrade(&self.path_changed),
                    metadata,
                )?,
            };
            tracked.push(Tracked {
                target: target.downgrade(),
                subscription,
            });

            // An event segment stays subscribed but fails here with `NotReadable`.
            match member.read(Some(&target), metadata)? {
                Some(next) => target = next,
                None => {
                    trace!(path = %self.path, segment = %name, "path broken by a null value");
                    return Ok(Resolution::Empty);
                }
            }
        }
        Ok(Resolution::Empty)
    }

    /// Subscribes the terminal member when observing it is enabled and
    /// somebody listens. Any previous terminal subscription is released first.
    pub(super) fn subscribe_last_member(&self, metadata: Option<&Metadata>) -> Result<()> {
        let previous = self.last_subscription.borrow_mut().take();
        drop(previous);
        if !self.flags.contains(ObserverFlags::OBSERVE_LAST) || !self.has_listeners() {
            return Ok(());
        }
        let (target, member) = {
            let chain = self.chain.borrow();
            let Resolution::Resolved { members, target } = &chain.resolution else {
                return Ok(());
            };
            match (target.upgrade(), members.last()) {
                (Some(target), Some(member)) => (target, member.clone()),
                _ => return Ok(()),
            }
        };
        let subscription =
            member.subscribe(Some(&target), Rc::downgrade(&self.last_changed), metadata)?;
        if !self.is_disposed() {
            *self.last_subscription.borrow_mut() = subscription;
        }
        Ok(())
    }
}
