//! Message forwarding engine.
//!
//! Every decoded event flows through:
//! 1. `router::find_rule()`: first enabled rule for the event's group
//! 2. `filter::check()`: sender allow-lists and content masks
//! 3. `Composer`: send, then read receipt, then reaction

pub mod composer;
pub mod event;
pub mod filter;
pub mod router;

#[cfg(test)]
pub(crate) mod testing;

pub use composer::{Composer, recipient_id};
pub use event::InboundEvent;
pub use filter::Verdict;
pub use router::{Dispatch, DropReason, Router, find_rule};
