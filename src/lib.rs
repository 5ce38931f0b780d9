pub mod config;
pub mod downloader;
pub mod logging;
pub mod server;
pub mod sweeper;

pub use config::{ConfigError, ServerConfig};
pub use server::{run, ServerError};
