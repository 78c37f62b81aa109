/// Database model definitions.
pub mod models;
/// Player and session storage operations.
pub mod score_store;
/// Storage abstraction layer for database operations.
pub mod storage;
