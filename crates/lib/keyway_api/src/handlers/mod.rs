//! Request handlers.

pub mod auth;
pub mod oauth;
pub mod user;
