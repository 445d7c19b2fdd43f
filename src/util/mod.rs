mod format;
mod path;

pub use format::{format_timestamp, is_zero_sha, short_sha};
pub use path::RepoPaths;
