pub mod callback;
pub mod page_source;
pub mod process_inspector;
pub mod repository;
pub mod spawner;

pub use callback::*;
pub use page_source::*;
pub use process_inspector::*;
pub use repository::*;
pub use spawner::*;
