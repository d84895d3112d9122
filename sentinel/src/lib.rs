//! Service wiring: component construction, background-worker supervision,
//! and the event-bus transport client.

pub mod service;
pub mod transport;

pub use service::Service;
pub use transport::Transport;
