pub mod app_config;
pub mod crawler;
pub mod database;
pub mod observability;
pub mod supervisor;

// Re-export main types for easier imports
pub use app_config::AppConfig;
pub use crawler::CrawlerSettings;
pub use database::DatabaseConfig;
pub use observability::{LogFormat, ObservabilityConfig};
pub use supervisor::{ListingFailurePolicy, SupervisorConfig};
