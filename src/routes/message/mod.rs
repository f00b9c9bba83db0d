mod handler;
mod model;

pub use handler::{
    delete_message, get_message, list_conversation, list_group_messages, mark_message_read,
    send_message, update_message,
};
pub use model::{Attachment, Message, MessageWithAttachments};
