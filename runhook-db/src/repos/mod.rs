//! Repository layer

pub mod notifying;
pub mod runs;

pub use notifying::{NotifyingRunRepository, RecordId, WriteOperation};
pub use runs::{PgRunRepository, RunRepository};
