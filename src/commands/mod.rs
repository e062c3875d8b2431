//! CLI command implementations.
//!
//! Each submodule implements one `evo` command with pure core logic
//! separated from IO where practical.

pub mod cancel;
pub mod clean;
pub mod init;
pub mod revert;
pub mod run;
pub mod status;
pub mod submit;
