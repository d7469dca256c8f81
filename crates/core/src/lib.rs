pub mod callback_registry;
pub mod config;
pub mod errors;
pub mod models;
pub mod traits;

pub use callback_registry::*;
pub use config::*;
pub use errors::*;
pub use models::*;
pub use traits::*;
