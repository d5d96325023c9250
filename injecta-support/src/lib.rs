//! # Injecta Support
//!
//! Shared text helpers for the Injecta container.
//!
//! This crate provides:
//! - Deriving a bare type name from a Rust type path (default resolver keys)
//! - "Did you mean" suggestions for unresolved keys

pub mod rendering;
