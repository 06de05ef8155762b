//! Capstan Library
//!
//! Timestamped, symlink-activated releases deployed to many hosts at once,
//! with shared state linked into every release and per-host failure
//! isolation.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod exec;
pub mod filesys;
pub mod hooks;
pub mod logs;
pub mod models;
pub mod release;
pub mod remote;
pub mod source;
pub mod storage;
pub mod utils;
