//! # af-core
//!
//! Core types shared by the AttachmentFu RS crates.
//!
//! This crate provides the foundational building blocks:
//! - Field-level validation errors (`ValidationErrors`)
//! - Record identity (`Id`, `Identifiable`)
//! - Process-wide configuration (`FuConfig`), built once at startup

pub mod config;
pub mod error;
pub mod traits;

pub use config::*;
pub use error::*;
pub use traits::*;
