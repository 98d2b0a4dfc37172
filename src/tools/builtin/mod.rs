//! Built-in marketplace tools.

pub mod end_session;
pub mod fetch_messages;
pub mod purchase_intent;
pub mod reply;

pub use end_session::{END_SESSION, EndSessionArgs, EndSessionTool};
pub use fetch_messages::{
    FETCH_MESSAGES, FetchMessagesArgs, FetchMessagesTool, MAX_FETCH_LIMIT, MIN_FETCH_LIMIT,
};
pub use purchase_intent::{PURCHASE_INTENT, PurchaseIntentArgs, PurchaseIntentTool, TRIGGER_BUY};
pub use reply::{REPLY_MESSAGE, ReplyMessageArgs, ReplyMessageTool};
