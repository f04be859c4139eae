//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! source (absent / LOG_CONFIG / file / inline text / mapping)
//!     → loader.rs (parse & deserialize, inject defaults)
//!     → validation.rs (references, destructive check)
//!     → ConfigDocument
//!     → engine apply, or sender → wire → listener → engine apply
//! ```
//!
//! # Design Decisions
//! - Defaulting is idempotent; resolved documents can be resolved again
//! - Unknown keys are preserved, not rejected
//! - Validation collects every problem instead of stopping at the first

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{resolve, ConfigError, ConfigSource};
pub use schema::{ConfigDocument, Extensions, Level, ListenerConfig, DEFAULT_LISTEN_PORT};
pub use validation::{is_destructive, DestructiveConfigRejected, ReconfigurationGuard};
