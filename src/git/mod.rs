mod command;
mod preflight;
#[cfg(test)]
pub(crate) mod testing;

pub use command::{changed_paths, current_branch_in, get_repo_root_in, DiffProcess, DiffSide};
pub use preflight::{collect_preflight, DiffPreflightStats};
