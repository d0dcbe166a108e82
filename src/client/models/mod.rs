pub mod app_state;
pub mod live_collection;
pub mod messages;
