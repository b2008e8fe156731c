pub mod catalog;
pub mod config;
pub mod domain;
pub mod drive;
pub mod error;
pub mod fs_util;
pub mod ingest;
pub mod output;
pub mod store;
pub mod tiles;
