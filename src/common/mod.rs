pub mod error;
pub mod invite;
pub mod models;

pub use error::*;
pub use models::*;
