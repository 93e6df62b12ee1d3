//! Core types for the KeyShare key-issuing protocol.
//!
//! This crate defines the data shared by the MIB store, the wire codec, the
//! agent kernel and the CLI: the error taxonomy, typed MIB values, OID
//! helpers and configuration structs. It contains no business logic.

pub mod config;
pub mod error;
pub mod oid;
pub mod value;
