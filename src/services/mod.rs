pub mod stripe;
pub mod supabase;

pub use stripe::StripeClient;
pub use supabase::SupabaseClient;
