//! Model routing.
//!
//! Picks which model serves each prompt. Two short circuits run before the
//! chain, then strategies are consulted in a fixed order and the first one
//! to decide wins:
//!
//! ```text
//!   forced_model? ──> Forced
//!   continuation? ──> Continuity (session's current model)
//!        |
//!        v
//!   Fallback ──> Override ──> Classifier ──> Default
//! ```
//!
//! | Rung         | Decides when                        | Model             |
//! |--------------|-------------------------------------|-------------------|
//! | `Fallback`   | session entered fallback mode       | catalog fallback  |
//! | `Override`   | user set a session override         | the override      |
//! | `Classifier` | small-model verdict, fast/reasoning | catalog by tier   |
//! | `Default`    | always                              | catalog primary   |
//!
//! [`ModelRouter::route`] never fails. Strategy errors are logged, absorbed,
//! and recorded on the winning decision's metadata.

mod classifier;
mod composite;
mod context;
mod decision;
mod strategy;

pub use classifier::ClassifierStrategy;
pub use composite::{ModelRouter, SharedModelRouter};
pub use context::{RoutingContext, TurnType};
pub use decision::{RouteMetadata, RouteSource, RoutingDecision, RoutingError};
pub use strategy::{DefaultStrategy, FallbackStrategy, OverrideStrategy, RouteStrategy};
