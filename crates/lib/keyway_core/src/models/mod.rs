//! Domain models shared by the core modules and the API layer.

pub mod auth;
pub mod user;
