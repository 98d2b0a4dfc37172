//! Chat platform access: send, history, channel info.

pub mod client;
pub mod http;

pub use client::*;
pub use http::{ChatConfig, HttpChatClient};
