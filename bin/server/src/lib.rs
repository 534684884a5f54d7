//! Portal web server.
//!
//! Serves Login.gov sign-in for the customer, office and admin applications,
//! and a mutual-TLS listener for machine clients authenticated by registered
//! client certificates.

pub mod auth;
pub mod config;
pub mod mtls;
