//! Service layer between handlers and `keyway_core`.

pub mod auth;
pub mod cookies;
pub mod oauth;
