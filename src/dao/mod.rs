/// Persisted document shapes shared by every backend.
pub mod models;
/// Progress and settings storage backends.
pub mod progress_store;
/// Storage abstraction layer for database operations.
pub mod storage;
