//! runhook-core: run record model and process settings

pub mod error;
pub mod models;
pub mod settings;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

pub use error::{CoreError, Result};
pub use models::{
    JobRun, NewRun, RunFilter, RunGraph, RunStatus, RunUpdate, RuntimeEnvironment, TaskStatus,
};
pub use settings::{load_dotenv, Settings};
