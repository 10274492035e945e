mod core;
pub mod error;

pub use self::core::*;
pub use error::{CompletionError, user_facing_message};
