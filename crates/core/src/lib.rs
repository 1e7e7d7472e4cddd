// Courier Core - Worker model & Ports
// NO infrastructure dependencies: transports, error artifacts and downstream
// actions are reached through the traits in `port`.

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use error::{AppError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
