//! Session context management with message and token caps
//!
//! Each session keeps a sliding window of its most recent turns. The
//! window is capped by message count and by the cumulative token cost of
//! the stored turns; the oldest turns are evicted first.

pub mod models;
pub mod store;
pub mod window;

pub use models::{checked_total_tokens, total_tokens, Role, Turn};
pub use store::{CacheContextStore, ContextStore};
pub use window::{Admission, SlidingWindow, WindowConfig, WindowError};
