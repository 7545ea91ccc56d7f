use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use faropt_core::{CancellationToken, FarOpt};

use crate::app_config::{AppConfig, ConfigOverrides};
use crate::commands::{job, model, recipe};
use crate::logging::init_logger;
use crate::{print_err, print_warn};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Configuration file. Defaults to `config.toml` in the user configuration directory.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Gateway endpoint, overrides `FAROPT_ENDPOINT`.
    #[arg(long, global = true)]
    pub endpoint: Option<String>,
    /// API key, overrides `FAROPT_API_KEY`.
    #[arg(long, global = true)]
    pub api_key: Option<String>,
    /// Name of the deployed stack, overrides `FAROPT_STACK`.
    #[arg(long, global = true)]
    pub stack: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Package a source directory and submit it as a new job.
    Submit(job::SubmitArgs),
    /// Show the status of a job.
    Status(job::JobArgs),
    /// Block until a job is stopped.
    Wait(job::JobArgs),
    /// Print the log events of a job.
    Logs(job::LogsArgs),
    /// Stop a running job.
    Stop(job::JobArgs),
    /// List submitted jobs.
    Jobs(job::ListArgs),
    /// Manage recipes.
    #[command(subcommand)]
    Recipe(recipe::RecipeCommand),
    /// List the files a job wrote to its output directory.
    Outputs(job::JobArgs),
    /// Download an output file of a job.
    Download(job::DownloadArgs),
    /// Print the recent datapoints of a job metric.
    Metric(job::MetricArgs),
    /// Manage ask/tell models.
    #[command(subcommand)]
    Model(model::ModelCommand),
}

impl CliArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            config_file: self.config.clone(),
            endpoint: self.endpoint.clone(),
            api_key: self.api_key.clone(),
            stack: self.stack.clone(),
        }
    }
}

/// Runs the CLI and returns the process exit code.
pub fn cli_main() -> i32 {
    init_logger();
    let args = CliArgs::parse();

    let token = CancellationToken::new();
    let handler_token = token.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
        print_warn!("Ctrl-C will not cancel waits: {e}");
    }

    match run(args, &token) {
        Ok(()) => 0,
        Err(e) => {
            print_err!("{e:#}");
            1
        }
    }
}

fn run(args: CliArgs, token: &CancellationToken) -> anyhow::Result<()> {
    let config = AppConfig::new()?
        .load(&args.overrides())
        .context("Failed to load configuration")?;
    let faropt = FarOpt::connect(config).context("Failed to connect to FarOpt")?;

    handle_command(args.command, &faropt, token)
}

fn handle_command(
    command: Commands,
    faropt: &FarOpt,
    token: &CancellationToken,
) -> anyhow::Result<()> {
    match command {
        Commands::Submit(args) => job::handle_submit(args, faropt, token),
        Commands::Status(args) => job::handle_status(args, faropt),
        Commands::Wait(args) => job::handle_wait(args, faropt, token),
        Commands::Logs(args) => job::handle_logs(args, faropt, token),
        Commands::Stop(args) => job::handle_stop(args, faropt),
        Commands::Jobs(args) => job::handle_jobs(args, faropt),
        Commands::Recipe(command) => recipe::handle_command(command, faropt, token),
        Commands::Outputs(args) => job::handle_outputs(args, faropt),
        Commands::Download(args) => job::handle_download(args, faropt),
        Commands::Metric(args) => job::handle_metric(args, faropt),
        Commands::Model(command) => model::handle_command(command, faropt),
    }
}
