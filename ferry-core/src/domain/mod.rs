//! Core domain types
//!
//! This module contains the core domain structures used across Ferry services.
//! These types are shared between the scheduler (for persistence) and the
//! dispatcher/worker (which only ever see them through the scheduler API).

pub mod code_import;
pub mod event;
pub mod job;
pub mod machine;
pub mod result;
pub mod source;
