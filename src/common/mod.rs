pub mod config;
pub mod errors;

pub use config::EngineConfig;
pub use errors::{DecodeError, UploadError, DEFAULT_SERVER_ERROR};
