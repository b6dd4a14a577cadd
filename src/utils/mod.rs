//! Utils module - text processing and logging helpers

pub mod logging;
pub mod markdown;
pub mod split;
pub mod string;
