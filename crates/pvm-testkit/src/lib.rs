//! Deterministic test doubles for the marketplace listener.
//!
//! No network I/O, no randomness: inbound frames are scripted, publishes and
//! notifications are recorded for assertions.

pub mod memory_broker;
pub mod notifier;
pub mod seed;

pub use memory_broker::MemoryBroker;
pub use notifier::RecordingNotifier;
