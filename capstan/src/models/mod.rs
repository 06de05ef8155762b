//! Data models

pub mod release;

pub use release::{Release, Revision};
