pub mod auth;

pub use auth::{AdminPrincipal, AuthPrincipal};
