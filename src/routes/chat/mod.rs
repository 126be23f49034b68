mod handler;
mod history;
mod model;

pub use crate::store::ChatMessage;
pub use handler::chat_socket;
pub use history::{recent_history, remember};
pub use model::{ChatEvent, GLOBAL_ROOM, Inbound, MAX_MESSAGE_LEN, handle_incoming};
