//! Runtime-reconfigurable logging over a length-prefixed TCP protocol.

pub mod config;
pub mod engine;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::schema::ConfigDocument;
pub use engine::{LogEngine, LoggingEngine};
pub use lifecycle::{setup_logging, LoggingSetup};
pub use net::{ConfigListener, ConfigSender};
