//! Small shared helpers.

pub mod filename;
pub mod fs;
