//! `shopmig-worker` library crate.
//!
//! Media post-processing: polls the media download queue, groups files into
//! process-media messages and downloads them over HTTP. The binary
//! entrypoint lives in `main.rs`.

pub mod config;
pub mod download;
pub mod poller;
