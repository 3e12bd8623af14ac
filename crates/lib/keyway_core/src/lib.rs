//! # keyway_core
//!
//! Core authentication and identity-reconciliation logic for Keyway.
//!
//! Everything here is transport-agnostic: the HTTP surface lives in
//! `keyway_api`, which wires these pieces together.

pub mod auth;
pub mod captcha;
pub mod migrate;
pub mod models;
pub mod oauth;
pub mod users;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_not_empty() {
        assert!(!version().is_empty());
    }
}
