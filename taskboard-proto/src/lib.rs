//! Shared protocol definitions for the task board wire format.

pub mod protocol;
pub mod stats;
pub mod task;
pub mod validate;
