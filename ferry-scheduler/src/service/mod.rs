//! Service Module
//!
//! Business logic layer for the scheduler.
//! Services orchestrate between the store and the domain rules.

pub mod import;
pub mod job;
pub mod librarian;
pub mod machine;
pub mod reaper;

// Re-export for convenience
pub use import as import_service;
pub use job as job_service;
pub use librarian as librarian_service;
pub use machine as machine_service;
