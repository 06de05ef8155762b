//! Remote session with sticky-error semantics

use std::path::Path;
use std::sync::Arc;

use crate::errors::CapstanError;
use crate::exec::quote::quote_arg;
use crate::exec::{Chain, Transport};
use crate::logs::LogSink;
use crate::storage::settings::Server;

/// An open channel to one server.
///
/// Same contract as the local executor: the first failing command is
/// latched and later calls return empty output without running anything.
/// One session is opened per host per deployment attempt and closed when
/// that host's work is done.
pub struct Session {
    server: Server,
    chain: Chain<Box<dyn Transport>>,
}

impl Session {
    pub fn new(server: Server, transport: Box<dyn Transport>, sink: Arc<dyn LogSink>) -> Self {
        Self {
            server,
            chain: Chain::new(transport, sink),
        }
    }

    pub fn server(&self) -> &Server {
        &self.server
    }

    pub fn host(&self) -> &str {
        &self.server.host
    }

    pub fn sink(&self) -> &Arc<dyn LogSink> {
        self.chain.sink()
    }

    /// Run one shell command line and return its trimmed stdout
    pub async fn run(&mut self, command: &str) -> String {
        self.chain.shell(command).await
    }

    /// Run a program with arguments quoted for the remote shell
    pub async fn exec<S: AsRef<str>>(&mut self, program: &str, args: &[S]) -> String {
        self.chain.output(program, args).await
    }

    /// Whether `path` exists on the server; false once the session failed
    pub async fn exists(&mut self, path: &Path) -> bool {
        if !self.chain.is_ok() {
            return false;
        }
        let path = quote_arg(&path.display().to_string());
        let out = self
            .run(&format!("if [ -e {} ]; then printf true; fi", path))
            .await;
        out == "true"
    }

    pub fn err(&self) -> Option<&CapstanError> {
        self.chain.err()
    }

    pub fn is_ok(&self) -> bool {
        self.chain.is_ok()
    }

    /// Latch a failure raised outside a command, e.g. by a hook
    pub fn fail(&mut self, err: CapstanError) {
        self.chain.fail(err);
    }

    /// Take the latched failure, re-arming the session
    pub fn take_err(&mut self) -> Option<CapstanError> {
        self.chain.take_err()
    }

    /// Take the latched failure as a `Result`
    pub fn finish(&mut self) -> Result<(), CapstanError> {
        self.chain.finish()
    }

    /// Close the underlying connection
    pub async fn close(self) -> Result<(), CapstanError> {
        self.chain.transport().close().await
    }
}
