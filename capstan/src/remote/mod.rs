//! Remote sessions

pub mod session;
pub mod ssh;

pub use session::Session;
pub use ssh::{Connector, SshConnector, SshTransport};
