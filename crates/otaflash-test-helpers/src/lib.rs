//! Shared test utilities for otaflash.
//!
//! # Modules
//!
//! - [`mod@must`] - Unwrap helpers with good error messages and `#[track_caller]`
//! - [`fixtures`] - Images, keys and simulated devices
//! - [`mock`] - Scripted byte sources and a recording status pin
//! - [`prelude`] - Convenience re-exports
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! otaflash-test-helpers = { workspace = true }
//! ```
//!
//! ```rust,ignore
//! use otaflash_test_helpers::prelude::*;
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![allow(clippy::unwrap_used, clippy::panic, reason = "test support code")]

pub mod fixtures;
pub mod mock;
pub mod must;
pub mod prelude;

pub use must::*;
