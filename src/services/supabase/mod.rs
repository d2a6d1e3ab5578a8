mod auth;
mod client;
mod events;
mod refresh;
mod storage;
mod url_session;

pub use client::{AuthOptions, SupabaseClient};
pub use events::{AuthBroadcaster, AuthSubscription};
pub use refresh::{AutoRefreshHandle, AUTO_REFRESH_TICK, AUTO_REFRESH_TICK_THRESHOLD};
pub use storage::{FileStorage, MemoryStorage, SessionStorage};
