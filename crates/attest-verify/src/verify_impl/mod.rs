//! Verification building blocks

pub mod crypto;
pub mod helpers;
pub mod merkle;
pub mod rekor;
pub mod tlog;
pub mod tsa;
