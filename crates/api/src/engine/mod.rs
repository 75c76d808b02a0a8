//! Job orchestration: store, admission, runner, cancellation and packaging.

pub mod admission;
pub mod cancel;
pub mod manager;
pub mod packager;
pub mod record;
pub mod runner;
pub mod store;

pub use manager::{Download, JobManager, NewJob};
pub use record::{JobView, Workspace};
