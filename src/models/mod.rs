pub mod auth_event;
pub mod user;

pub use auth_event::*;
pub use user::*;
