//! Local adapters for development and tests.

pub mod fs;

pub use fs::FsAdapter;
