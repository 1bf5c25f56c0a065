//! NATS JetStream delivery of run triggers.

mod subscriber;

pub use subscriber::NatsTriggerSource;
