//! Application hooks run by the release pipeline

pub mod symfony;

use std::sync::Arc;

use async_trait::async_trait;

use crate::app::state::DeployContext;
use crate::errors::CapstanError;
use crate::models::Release;
use crate::remote::Session;
use crate::storage::layout::ReleaseLayout;
use crate::storage::settings::Config;

pub use symfony::SymfonyHook;

/// What a hook gets to see besides the session
#[derive(Debug, Clone)]
pub struct HookContext {
    pub ctx: Arc<DeployContext>,
    pub layout: ReleaseLayout,
}

impl HookContext {
    pub fn new(ctx: Arc<DeployContext>, layout: ReleaseLayout) -> Self {
        Self { ctx, layout }
    }

    pub fn config(&self) -> &Config {
        &self.ctx.config
    }
}

/// Application-specific steps.
///
/// Hooks issue their commands through the session so failures latch like
/// any other command; returning `Err` is equivalent.
#[async_trait]
pub trait AppHook: Send + Sync {
    fn name(&self) -> &str;

    /// Extra work for `capstan setup`
    async fn setup(&self, _session: &mut Session, _ctx: &HookContext) -> Result<(), CapstanError> {
        Ok(())
    }

    /// Runs after shared resources are linked and before activation
    async fn after_stage(
        &self,
        session: &mut Session,
        ctx: &HookContext,
        release: &Release,
    ) -> Result<(), CapstanError>;
}

/// Hook that does nothing
#[derive(Debug, Clone, Default)]
pub struct NoopHook;

#[async_trait]
impl AppHook for NoopHook {
    fn name(&self) -> &str {
        "noop"
    }

    async fn after_stage(
        &self,
        _session: &mut Session,
        _ctx: &HookContext,
        _release: &Release,
    ) -> Result<(), CapstanError> {
        Ok(())
    }
}

/// Select the hook named by the `framework` setting
pub fn hook_for(config: &Config) -> Result<Arc<dyn AppHook>, CapstanError> {
    match config.framework.as_deref() {
        None | Some("") | Some("none") => Ok(Arc::new(NoopHook)),
        Some("symfony") => Ok(Arc::new(SymfonyHook::new())),
        Some(other) => Err(CapstanError::ConfigError(format!(
            "unknown framework: {}",
            other
        ))),
    }
}
