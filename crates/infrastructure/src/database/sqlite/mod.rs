pub mod sqlite_process_repository;
pub mod sqlite_queue_repository;
pub mod transaction;

pub use sqlite_process_repository::SqliteProcessRepository;
pub use sqlite_queue_repository::SqliteQueueRepository;
pub use transaction::ImmediateTransaction;
