//! External Operations
//! Mission: Shell out to the server-management scripts and relay their state

pub mod files;
pub mod runner;

pub use files::{read_json_file, write_json_file};
pub use runner::{run_command, OpResult, ScriptRunner};
