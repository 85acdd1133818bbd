//! Confirmation message bus.
//!
//! Decouples tool schedulers from whatever confirms tool calls. Producers
//! publish [`BusMessage`]s; the bus consults policy and either synthesizes a
//! response, rejects, or forwards to subscribers:
//!
//! ```text
//!   scheduler ──ConfirmationRequest──> MessageBus ──(AskUser)──> UI / host
//!       ^                                  |
//!       `────────ConfirmationResponse──────'
//! ```
//!
//! Each confirmation request is paired with exactly one response via its
//! correlation id. Synthesized responses come from policy (`Allow`, `Deny`,
//! or a failed check); forwarded requests wait for a subscriber to answer.

mod bus;
mod types;

pub use bus::{
    ConfirmationOutcome, FilteredReceiver, MessageBus, MessageFilter, SharedMessageBus,
    BUS_CAPACITY,
};
pub use types::{BusMessage, MessageKind, ToolCall};
