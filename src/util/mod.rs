//! Small filesystem helpers shared across the crate.

pub mod file_list;
pub mod file_size;
pub mod file_status;
pub mod temp;

pub use file_list::{collect_input_files, is_junk, InputSet};
pub use file_size::safe_file_size;
pub use file_status::{apply_file_stat, capture_file_stat, FileStat};
