//! # Floem Observe
//!
//! Observation of member paths such as `Order.Customer.Name` over graphs of
//! host objects, and evaluation of binding expressions built on them.
//!
//! The crate does not know how members are implemented. A host describes its
//! types through a [`MemberResolver`], usually a [`MemberRegistry`], and makes
//! members observable by raising [`ChangeEvent`]s. A [`PathObserver`] then
//! resolves a path segment by segment, subscribes to every intermediate
//! member, and re-resolves the rest of the path whenever one of them changes.
//!
//! ## Example
//!
//! ```rust
//! use std::cell::RefCell;
//!
//! use floem_observe::{
//!     BindingError, ChangeEvent, MemberRegistry, Object, ObserverConfig, ObserverProvider,
//!     Property,
//! };
//!
//! struct Person {
//!     name: String,
//! }
//!
//! struct Order {
//!     customer: RefCell<Object>,
//!     customer_changed: ChangeEvent,
//! }
//!
//! let mut registry = MemberRegistry::new();
//! registry
//!     .add(Property::<Person>::new("Name").get(|p| Some(Object::new(p.name.clone()))))
//!     .add(
//!         Property::<Order>::new("Customer")
//!             .get(|o| Some(o.customer.borrow().clone()))
//!             .observe(|o| &o.customer_changed),
//!     );
//! let provider = ObserverProvider::new(registry, ObserverConfig::default());
//!
//! let ada = Object::new(Person { name: "Ada".into() });
//! let order = Object::new(Order {
//!     customer: RefCell::new(ada),
//!     customer_changed: ChangeEvent::new(),
//! });
//!
//! let observer = provider.observe(&order, "Customer.Name")?;
//! let name = |value: Option<Object>| value.and_then(|v| v.downcast_ref::<String>().cloned());
//! assert_eq!(name(observer.value(None)?).as_deref(), Some("Ada"));
//!
//! // Swapping the customer re-resolves the rest of the path.
//! if let Some(order) = order.downcast_ref::<Order>() {
//!     *order.customer.borrow_mut() = Object::new(Person { name: "Grace".into() });
//!     order.customer_changed.raise(None);
//! }
//! assert_eq!(name(observer.value(None)?).as_deref(), Some("Grace"));
//! # Ok::<(), BindingError>(())
//! ```
//!
//! ## Ownership
//!
//! Observers hold their root weakly unless created as owned, and change
//! sources hold observers weakly. Dropping the object graph or the observer is
//! enough to tear everything down; [`PathObserver::dispose`] does it eagerly.
//!
//! ## Expressions
//!
//! [`CompiledExpression`] takes a [`floem_expr::Expr`], replaces its member
//! chains with parameters, observes each chain with its own [`PathObserver`]
//! and evaluates the remaining tree with an [`Evaluator`].

mod cache;
mod change;
mod error;
pub mod expression;
mod member;
mod metadata;
mod object;
pub mod observer;
mod path;
mod provider;
mod registry;

pub use cache::CachedResolver;
pub use change::ChangeEvent;
pub use error::{BindingError, Result};
pub use expression::{CompiledExpression, Evaluator, MemberPathCollector};
pub use floem_expr as expr;
pub use member::{
    Getter, Invoke, MemberAccess, MemberFlags, MemberKind, MemberKinds, MemberListener,
    MemberResolver, Observe, ResolvedMember, Setter, Subscription, WeakMemberListener,
};
pub use metadata::Metadata;
pub use object::{Object, ObjectType, WeakObject};
pub use observer::{
    LastMember, ListenerRef, ListenerSnapshot, MemberChain, ObserverFlags, ObserverListener,
    PathObserver,
};
pub use path::{MemberPath, is_index_segment, parse_index_args};
pub use provider::{ObserverConfig, ObserverProvider};
pub use registry::{EventMember, Indexer, MemberRegistry, Method, Property};
