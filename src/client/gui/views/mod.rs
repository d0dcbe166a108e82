pub mod create_group;
pub mod group_chat;
pub mod name_prompt;
