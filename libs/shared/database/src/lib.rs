pub mod lock;
pub mod supabase;
