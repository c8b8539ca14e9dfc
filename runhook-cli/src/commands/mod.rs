//! Command implementations for the runhook CLI

pub mod db;
pub mod runs;

pub use db::run_db;
pub use runs::run_runs;
