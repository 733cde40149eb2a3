//! API client module for Gmail

pub mod client;
mod labels;
mod messages;
mod profile;

pub use client::{GmailClient, GmailResult};
pub use messages::{MessageFormat, MessagePage, OutgoingEmail};
