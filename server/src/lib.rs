pub mod admission;
pub mod archive;
pub mod config;
pub mod error;
pub mod fetch;
pub mod handlers;
pub mod monitor;
pub mod registry;
pub mod state;
pub mod task;
pub mod worker;

pub use config::Config;
pub use error::{ArchiveError, BuildError, FetchError};
pub use state::{AddOutcome, AppState};
