//! Common types, traits, and error definitions for rust_autonav
//!
//! This module provides the foundational building blocks shared by the
//! localization, mapping, steering and arbitration components.

pub mod types;
pub mod traits;
pub mod error;

pub use types::*;
pub use traits::*;
pub use error::*;
