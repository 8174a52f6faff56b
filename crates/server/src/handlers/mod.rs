//! HTTP and websocket handlers

pub mod ai;
pub mod blobs;
pub mod extract;
pub mod messages;
pub mod users;
pub mod ws;

pub use crate::config::AppState;
pub use extract::CurrentUser;

pub use ai::{ai_history, send_ai_message};
pub use blobs::get_blob;
pub use messages::{get_conversation, send_message};
pub use users::{list_contacts, update_me};
pub use ws::ws_handler;
