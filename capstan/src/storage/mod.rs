//! Configuration and deploy-root layout

pub mod layout;
pub mod settings;

pub use layout::ReleaseLayout;
pub use settings::{Config, Server};
