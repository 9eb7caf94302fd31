mod diff;
mod runner;
mod status;

pub use diff::{parse_diff, DiffFile, FileStatus, LineType};
pub use runner::{Limits, VcsError};
pub use status::{get_repo_root_in, GitRepo};
