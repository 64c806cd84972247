pub mod checker;
pub mod extractor;
pub mod pacing;
pub mod search;
pub mod session;

pub use checker::*;
pub use pacing::*;
