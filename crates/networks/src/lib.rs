pub mod direct;
pub mod health;
pub mod i2p;
pub mod registry;
mod retry;
pub mod tor;

pub use direct::DirectTransport;
pub use health::{HealthHandle, HealthManager, HealthState};
pub use i2p::I2pTransport;
pub use registry::TransportRegistry;
pub use tor::TorTransport;
