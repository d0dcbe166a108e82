pub mod backend;
pub mod chat_service;
pub mod command_dispatcher;
pub mod memory_backend;
pub mod realtime_client;
pub mod supabase_backend;
