//! Agent module: sessions, activity events, templates, and the agent loop.

pub mod activity;
pub mod agent_loop;
pub mod session;
pub mod template;

pub use activity::{ActivityEvent, ActivityRecorder};
pub use agent_loop::{Agent, AgentDeps, InboundMessage, LoopOutcome, StopReason};
pub use session::Session;
