//! CheapElectra Core - Shared types library.
//!
//! This crate provides the domain types shared by the workspace:
//! - `backend` - REST API and landing page server
//! - `cli` - Migrations, data export and user management
//!
//! # Architecture
//!
//! The core crate contains only types and validation - no I/O, no database
//! access, no HTTP. Database encoding is available behind the `postgres`
//! feature.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for IDs, usernames, emails, money and order status

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
