//! Domain events and the pub/sub plumbing that carries them to observers.
//!
//! Nothing here persists anything: the inventory store is the source of
//! truth, events are published after a unit of work commits.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
