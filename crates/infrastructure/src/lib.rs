pub mod cleanup_service;
pub mod database;
pub mod observability;
pub mod process_inspector;
pub mod worker_spawner;

pub use cleanup_service::*;
pub use database::*;
pub use observability::*;
pub use process_inspector::*;
pub use worker_spawner::*;
