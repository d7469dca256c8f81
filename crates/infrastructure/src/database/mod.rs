pub mod manager;
pub mod mapping;
pub mod sqlite;

pub use manager::{run_migrations, DatabaseManager};
pub use sqlite::{SqliteProcessRepository, SqliteQueueRepository};
