//! Bot core: the query pipeline and everything the user reads.

pub mod handler;
pub mod messages;
pub mod prompt;

pub use handler::{Admission, Outcome, QueryHandler};
pub use prompt::PSY_PROMPT;
