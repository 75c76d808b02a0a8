//! Domain types shared by the processing engine and the HTTP service.
//!
//! Zero internal dependencies; everything here is plain data and pure
//! functions.

pub mod config_schema;
pub mod error;
pub mod job_status;
pub mod processing_config;
pub mod types;
pub mod upload;
