pub mod config;
pub mod error;
pub mod mail;
pub mod projection;

pub use error::{InvariantViolation, ProjectionError};
pub use projection::{ProjectionEngine, Record};
