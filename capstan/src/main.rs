//! Capstan - Entry Point
//!
//! Deploys a git revision to every configured server as a new timestamped
//! release and switches `current` to it.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use capstan::app::options::{AppOptions, Command};
use capstan::app::run::{init, load_context, run};
use capstan::logs::{init_logging, LogLevel, LogOptions, TracingSink};
use capstan::storage::settings::DEFAULT_CONFIG_PATH;
use capstan::utils::version_info;

#[derive(Parser, Debug)]
#[command(name = "capstan", about = "Multi-host release deployment", disable_version_flag = true)]
struct Cli {
    /// Stage to deploy (file under stage_dir), defaults to stage_default
    #[arg(long, short, global = true)]
    stage: Option<String>,

    /// Base configuration file
    #[arg(long, short, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level, overrides the configuration
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Print the report as JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    /// Print version information as JSON
    #[arg(long, short = 'V')]
    version: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Deploy a new release to every server
    Deploy,
    /// Create the deploy directories on every server
    Setup,
    /// Write template configuration files
    Init,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.version {
        match serde_json::to_string_pretty(&version_info()) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("{}", e),
        }
        return ExitCode::SUCCESS;
    }

    let command = match cli.command {
        Some(Commands::Deploy) => Command::Deploy,
        Some(Commands::Setup) => Command::Setup,
        Some(Commands::Init) => Command::Init,
        None => {
            eprintln!("No command given, try `capstan --help`");
            return ExitCode::from(2);
        }
    };

    let options = AppOptions {
        config_path: cli.config,
        stage: cli.stage,
        log_level: cli.log_level,
        json: cli.json,
    };

    match execute(command, options).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn execute(command: Command, options: AppOptions) -> anyhow::Result<bool> {
    if command == Command::Init {
        let _guard = init_logging(LogOptions {
            log_level: options.log_level.clone().unwrap_or_default(),
            ..Default::default()
        })?;
        let written = init(&options.config_path).await?;
        for path in written {
            println!("created {}", path.display());
        }
        return Ok(true);
    }

    let ctx = load_context(&options)
        .await
        .with_context(|| format!("loading {}", options.config_path.display()))?;

    // Keep the guard alive so buffered file logs are flushed on exit.
    let _guard = init_logging(LogOptions {
        log_level: options
            .log_level
            .clone()
            .unwrap_or_else(|| ctx.config.log_level.clone()),
        log_file: ctx.config.log_file.clone(),
        json_format: options.json,
        ..Default::default()
    })?;

    info!("Running {} with {:?}", command.as_str(), options);
    let report = run(command, ctx, Arc::new(TracingSink)).await?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.render());
    }
    Ok(report.is_success())
}
