//! Sticky-error command chain

use std::sync::Arc;

use crate::errors::CapstanError;
use crate::exec::{chomp, Invocation, Transport};
use crate::logs::LogSink;

/// Runs commands through a transport until the first failure.
///
/// Once an error is latched every further call is a no-op that returns empty
/// output. The caller inspects the error once, after the sequence. A chain
/// belongs to one worker and is never shared between tasks.
pub struct Chain<T: Transport> {
    transport: T,
    sink: Arc<dyn LogSink>,
    err: Option<CapstanError>,
}

impl<T: Transport> Chain<T> {
    pub fn new(transport: T, sink: Arc<dyn LogSink>) -> Self {
        Self {
            transport,
            sink,
            err: None,
        }
    }

    pub fn host(&self) -> &str {
        self.transport.host()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn sink(&self) -> &Arc<dyn LogSink> {
        &self.sink
    }

    /// Run a program, discarding its output
    pub async fn run<S: AsRef<str>>(&mut self, program: &str, args: &[S]) {
        self.dispatch(Invocation::program(program, args)).await;
    }

    /// Run a program and return its trimmed stdout (empty once failed)
    pub async fn output<S: AsRef<str>>(&mut self, program: &str, args: &[S]) -> String {
        self.dispatch(Invocation::program(program, args))
            .await
            .unwrap_or_default()
    }

    /// Run a complete shell line and return its trimmed stdout
    pub async fn shell(&mut self, line: &str) -> String {
        self.dispatch(Invocation::shell(line))
            .await
            .unwrap_or_default()
    }

    async fn dispatch(&mut self, invocation: Invocation) -> Option<String> {
        if self.err.is_some() {
            return None;
        }

        let host = self.transport.host().to_string();
        self.sink.command(&host, &invocation.to_line());

        match self.transport.execute(&invocation).await {
            Ok(out) if out.success => {
                let stdout = chomp(&out.stdout);
                if !stdout.is_empty() {
                    self.sink.output(&host, &stdout);
                }
                Some(stdout)
            }
            Ok(out) => {
                self.err = Some(CapstanError::ExecutionError(
                    out.failure_message(&invocation),
                ));
                None
            }
            Err(e) => {
                self.err = Some(e);
                None
            }
        }
    }

    /// The latched failure, if any
    pub fn err(&self) -> Option<&CapstanError> {
        self.err.as_ref()
    }

    pub fn is_ok(&self) -> bool {
        self.err.is_none()
    }

    /// Latch a failure that did not come from a command. Keeps the first one.
    pub fn fail(&mut self, err: CapstanError) {
        if self.err.is_none() {
            self.err = Some(err);
        }
    }

    /// Take the latched failure, re-arming the chain
    pub fn take_err(&mut self) -> Option<CapstanError> {
        self.err.take()
    }

    /// Take the latched failure as a `Result`
    pub fn finish(&mut self) -> Result<(), CapstanError> {
        match self.err.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
