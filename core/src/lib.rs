//! Shared security-domain types for Aula admin services.
//!
//! This crate carries the vocabulary that crosses component boundaries —
//! event and block enums, the persisted model structs, and the pure helpers
//! on them (typed setting coercion, block-expiry math, remaining-time
//! formatting). It performs no I/O; persistence lives in `aula-security`.

pub mod blocks;
pub mod events;
pub mod settings;
