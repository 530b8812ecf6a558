pub mod errors;
pub mod operations;

pub use errors::ProcessError;
#[cfg(unix)]
pub use operations::kill_process_group;
pub use operations::{is_process_running, kill_process_tree};
