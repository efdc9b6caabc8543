//! CheapElectra backend library.
//!
//! The REST API, landing page and export logic live here so the server
//! binary, the CLI and the tests share one implementation.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
