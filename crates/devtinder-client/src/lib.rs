//! Client-side message reconciliation.
//!
//! Pure logic, no I/O: a UI layer feeds in fetched history pages, locally
//! optimistic entries, and live gateway events, and reads back an ordered,
//! duplicate-free timeline per conversation.

pub mod state;
pub mod timeline;

pub use state::ChatState;
pub use timeline::{ConfirmedMessage, Timeline, TimelineEntry};
