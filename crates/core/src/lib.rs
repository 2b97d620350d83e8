pub mod config;
pub mod error;

pub use config::{Config, DuplicatePolicy, QueueConfig};
pub use error::*;
