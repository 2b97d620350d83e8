use thiserror::Error;

#[derive(Error, Debug)]
pub enum HushError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}
