// Courier Infrastructure - SQLite Adapter
// Implements: QueueClient

mod connection;
mod error;
mod migration;
mod queue_client;

pub use connection::create_pool;
pub use migration::run_migrations;
pub use queue_client::SqliteQueueClient;
pub use sqlx::SqlitePool;
