//! Business logic services for the backend.
//!
//! # Services
//!
//! - `auth` - User registration, password login and profile changes
//!
//! Catalog and order handlers talk to their repositories directly; only
//! authentication has logic (hashing, validation) worth a service layer.

pub mod auth;
