//! Request handlers.

mod pull;
mod push;

pub use pull::{handle_pull, PullQuery, PullResponse};
pub use push::{handle_push, PushRequest, PushResponse};
