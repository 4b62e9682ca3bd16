//! Core types for Golden Fig.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod code;
pub mod email;
pub mod id;
pub mod username;

pub use code::{CodeError, VerificationCode};
pub use email::{Email, EmailError};
pub use id::*;
pub use username::{Username, UsernameError};
