#![forbid(unsafe_code)]

pub mod archive;
pub mod cache;
pub mod cli;
pub mod config;
pub mod crawl;
pub mod error;
pub mod extract;
pub mod formats;
pub mod http;
pub mod item_store;
pub mod logging;
pub mod manifest;
pub mod probe;
