pub mod auth;
pub mod security;

pub use auth::AuthContext;
