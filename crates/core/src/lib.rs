//! `shopmig-core`: conversion of legacy shop data into the target schema.
//!
//! Storage, gateways and media processors are reached only through the async
//! traits defined here; in-memory implementations back tests and dry runs.

pub mod context;
pub mod convert;
pub mod data_selection;
pub mod entities;
pub mod error;
pub mod fetcher;
pub mod gateway;
pub mod logging;
pub mod mapping;
pub mod media;
pub mod price;
pub mod reference;
pub mod run;
pub mod services;
pub mod types;
