//! Data models for Gmail entities

mod label;
mod message;
mod user;

pub use label::*;
pub use message::*;
pub use user::*;
