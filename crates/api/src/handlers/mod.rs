pub mod config;
pub mod jobs;
pub mod process;
