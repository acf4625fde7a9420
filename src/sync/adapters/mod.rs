//! Adapter implementations for the remote tracker port.

pub mod memory;

mod retry;

pub use memory::InMemoryTracker;
pub use retry::RetryingTracker;
