//! Correlation event bus.
//!
//! Jobs are published to a [`WorkQueue`] consumed by external processors,
//! which later raise a completion event keyed by `(instance id, event name)`.
//! The owning orchestration instance suspends on that key until the event
//! arrives, the wait times out, or the instance is cancelled.

mod bus;
mod queue;
mod types;

pub use bus::CorrelationEventBus;
pub use queue::{HttpWorkQueue, WorkQueue};
pub use types::{CorrelationKey, EventBusError, JobDescriptor, ProcessingResult, QueueError};
