//! File removal backends for hashsieve.
//!
//! The pipeline never touches storage itself. Removing a duplicate goes
//! through a [`Deleter`], so callers choose between the system trash
//! ([`TrashDeleter`]) and permanent removal ([`PermanentDeleter`]), or plug
//! in their own backend.

mod delete;
mod operation;
mod progress;

pub use delete::{DeleteError, Deleter, PermanentDeleter, TrashDeleter};
pub use operation::OperationError;
pub use progress::DeletionReport;
