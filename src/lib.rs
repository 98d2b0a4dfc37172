//! Marketplace chat agent: a tool-calling orchestrator over a chat platform.

pub mod agent;
pub mod channels;
pub mod config;
pub mod error;
pub mod llm;
pub mod store;
pub mod tools;

#[cfg(test)]
pub(crate) mod testing;
