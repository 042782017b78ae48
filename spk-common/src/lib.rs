//! # SpoolKeeper Common Library
//!
//! Shared code for the SpoolKeeper crates:
//! - Domain records (filaments, catalog entries, tray snapshots, users)
//! - RGB colour normalisation and nearest-colour matching
//! - Bootstrap configuration loading
//! - Common error types

pub mod color;
pub mod config;
pub mod error;
pub mod models;

pub use color::Rgb;
pub use error::{Error, Result};
