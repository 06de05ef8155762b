//! Symfony: composer install and ACLs on writable directories

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::errors::CapstanError;
use crate::exec::quote::quote_arg;
use crate::hooks::{AppHook, HookContext};
use crate::logs::StepStatus;
use crate::models::Release;
use crate::remote::Session;

pub const COMPOSER_OPTIONS: &str =
    "--optimize-autoloader --prefer-dist --no-dev --no-interaction --no-progress";
pub const COMPOSER_OPTIONS_DEV: &str = "--prefer-dist --no-interaction --no-progress";

const COMPOSER_INSTALLER: &str = "https://getcomposer.org/installer";

#[derive(Debug, Clone, Default)]
pub struct SymfonyHook {
    /// Pinned composer version for setup, latest when unset
    composer_version: Option<String>,
}

impl SymfonyHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_composer_version(mut self, version: impl Into<String>) -> Self {
        self.composer_version = Some(version.into());
        self
    }

    /// Reuse the vendors of the live release to speed up composer
    pub async fn copy_vendors(
        &self,
        session: &mut Session,
        ctx: &HookContext,
        release: &Release,
    ) {
        let vendor = quote_arg(&ctx.layout.current_link().join("vendor").display().to_string());
        let target = quote_arg(&release.path.display().to_string());
        let line = format!(
            "if [ -d {v} ] || [ -h {v} ]; then cp -a {v} {t}; fi",
            v = vendor,
            t = target
        );
        if begin(session, "Copy vendors from previous release") {
            session.run(&line).await;
            end(session, "Copy vendors from previous release");
        }
    }

    /// Command line installing the release's composer dependencies
    pub fn composer_install_line(
        &self,
        session: &Session,
        ctx: &HookContext,
        release: &Release,
    ) -> String {
        let config = ctx.config();
        let options = if config.symfony_env == "dev" {
            COMPOSER_OPTIONS_DEV
        } else {
            COMPOSER_OPTIONS
        };
        let mut env: Vec<String> = config.env.iter().map(|e| quote_env(e)).collect();
        env.push(format!("SYMFONY_ENV={}", quote_arg(&config.symfony_env)));

        let composer = ctx.layout.shared_path("composer.phar");
        format!(
            "cd {} && env {} {} {} install {}",
            quote_arg(&release.path.display().to_string()),
            env.join(" "),
            quote_arg(&session.server().php_bin),
            quote_arg(&composer.display().to_string()),
            options
        )
    }

    pub async fn composer_install(
        &self,
        session: &mut Session,
        ctx: &HookContext,
        release: &Release,
    ) {
        let line = self.composer_install_line(session, ctx, release);
        if begin(session, "Install composer dependencies") {
            session.run(&line).await;
            end(session, "Install composer dependencies");
        }
    }

    /// Directories the web server must be able to write to
    pub fn writable_paths(&self, ctx: &HookContext, release: &Release) -> Vec<PathBuf> {
        let config = ctx.config();
        config
            .writable_dirs
            .iter()
            .map(|dir| {
                if config.is_shared_dir(dir) {
                    ctx.layout.shared_path(dir)
                } else {
                    release.path.join(dir)
                }
            })
            .collect()
    }

    /// Grant the SSH user and the web user rwX ACLs on writable dirs owned
    /// by the SSH user, unless the web user already has an rwx entry.
    pub async fn set_permissions(
        &self,
        session: &mut Session,
        ctx: &HookContext,
        release: &Release,
    ) {
        let dirs = self.writable_paths(ctx, release);
        let user = session.server().user.clone();
        let web_user = session.server().web_user.clone();
        if begin(session, "Sets permissions for writable_dirs") {
            for dir in &dirs {
                grant_acl(session, dir, &user, &web_user).await;
            }
            end(session, "Sets permissions for writable_dirs");
        }
    }

    /// Self-update composer in `shared/`, or install it there
    pub async fn fetch_composer(&self, session: &mut Session, ctx: &HookContext) {
        let shared = ctx.layout.shared_dir();
        let php = quote_arg(&session.server().php_bin);
        if !begin(session, "Gets composer and installs it") {
            return;
        }
        let dir = quote_arg(&shared.display().to_string());
        if session.exists(&shared.join("composer.phar")).await {
            let pin = self
                .composer_version
                .as_ref()
                .map(|v| format!(" {}", quote_arg(v)))
                .unwrap_or_default();
            session
                .run(&format!("cd {} && {} composer.phar self-update{}", dir, php, pin))
                .await;
        } else {
            let pin = self
                .composer_version
                .as_ref()
                .map(|v| format!(" -- --version={}", quote_arg(v)))
                .unwrap_or_default();
            session
                .run(&format!(
                    "cd {} && curl -sSL {} | {}{}",
                    dir, COMPOSER_INSTALLER, php, pin
                ))
                .await;
        }
        end(session, "Gets composer and installs it");
    }
}

/// Announce a step unless the session already failed
fn begin(session: &Session, name: &str) -> bool {
    if !session.is_ok() {
        return false;
    }
    session.sink().step(session.host(), name, StepStatus::Start);
    true
}

/// Report a step from the session's latched state
fn end(session: &Session, name: &str) {
    let host = session.host();
    match session.err() {
        None => session.sink().step(host, name, StepStatus::Ok),
        Some(e) => {
            session.sink().step(host, name, StepStatus::Failed);
            session.sink().error(host, e);
        }
    }
}

async fn grant_acl(session: &mut Session, dir: &Path, user: &str, web_user: &str) {
    let quoted = quote_arg(&dir.display().to_string());
    let owner = session.run(&format!("stat -c %U {}", quoted)).await;
    if !session.is_ok() || owner != user {
        return;
    }
    let entries = session
        .run(&format!(
            "getfacl --absolute-names --tabular {} | grep {} | wc -l",
            quoted,
            quote_arg(&format!("{}.*rwx", web_user))
        ))
        .await;
    if entries.trim() != "0" {
        return;
    }
    let acl = format!(
        "-m u:{}:rwX -m u:{}:rwX",
        quote_arg(user),
        quote_arg(web_user)
    );
    session
        .run(&format!("setfacl -R {} {}", acl, quoted))
        .await;
    session
        .run(&format!("setfacl -dR {} {}", acl, quoted))
        .await;
}

/// Quote the value of a `KEY=VALUE` pair, leaving the key bare
fn quote_env(pair: &str) -> String {
    match pair.split_once('=') {
        Some((key, value)) => format!("{}={}", key, quote_arg(value)),
        None => quote_arg(pair),
    }
}

#[async_trait]
impl AppHook for SymfonyHook {
    fn name(&self) -> &str {
        "symfony"
    }

    async fn setup(&self, session: &mut Session, ctx: &HookContext) -> Result<(), CapstanError> {
        self.fetch_composer(session, ctx).await;
        session.finish()
    }

    async fn after_stage(
        &self,
        session: &mut Session,
        ctx: &HookContext,
        release: &Release,
    ) -> Result<(), CapstanError> {
        self.copy_vendors(session, ctx, release).await;
        self.composer_install(session, ctx, release).await;
        self.set_permissions(session, ctx, release).await;
        session.finish()
    }
}
