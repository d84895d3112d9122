//! The alert-processing front half: payload types coming off the event
//! transport, the per-sensor sustained-breach state machine, the bounded
//! breach queues, and the threshold classifier tying them together.

pub mod breach;
pub mod classifier;
pub mod queue;
pub mod reading;
pub mod state;

pub use breach::Breach;
pub use classifier::{DwellConfig, ThresholdClassifier};
pub use queue::{BreachQueue, BreachQueues, QueueFull};
pub use reading::{EventTime, OneOrMany, Reading, ReadingsEvent};
pub use state::DeviceStateManager;
