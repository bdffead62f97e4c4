//! Domain services behind the HTTP routes and the realtime gateway.
//!
//! Each module owns its SQL and its error enum; `crate::error` maps those
//! errors onto HTTP statuses.

pub mod account;
pub mod auth;
pub mod deployment;
pub mod models;
pub mod session;
pub mod training;
