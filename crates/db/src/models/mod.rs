//! Row structs and insert DTOs.
//!
//! Each submodule contains a `FromRow` + `Serialize` struct matching the
//! database row and, where rows are created from this crate, an insert DTO.
//! Conversions into the `shopmig-core` types live beside the rows.

pub mod connection;
pub mod data;
pub mod log;
pub mod mapping;
pub mod media_file;
pub mod reference;
pub mod run;
