pub mod alert;
pub mod command_suggestions;
pub mod message_list;
