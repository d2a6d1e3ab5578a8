mod client;
mod handle;
mod sessions;

pub use client::StripeClient;
pub use handle::*;
pub use sessions::*;
