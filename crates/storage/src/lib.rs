pub mod error;
pub mod repository;
pub mod schema;
pub mod sqlite;

pub use error::StorageError;
pub use repository::PreferenceRepository;
pub use sqlite::SqliteRepository;
