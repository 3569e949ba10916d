pub mod naming;
pub mod task;

pub use naming::{extract_filename, is_allowed_extension, parse_reference, NamingError};
pub use task::*;
