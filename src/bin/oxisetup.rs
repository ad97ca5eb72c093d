// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use oxisetup::{
    path::{default_backup_root, default_config_path},
    preflight::Preflight,
    rollback::InquirePrompt,
    steps::standard_steps,
    tools::{Curl, Fetcher, Homebrew, PackageManager},
    BackupLabel, BackupLedger, Installation, Report, RunContext, SetupConfig, StepSequencer,
};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::{fs::read_dir, path::PathBuf, process::exit, rc::Rc, time::Duration};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "oxisetup [options] <command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<i32> {
        match self.command {
            Command::Run(opts) => run_setup(opts),
            Command::Restore(opts) => run_restore(opts).map(|_| 0),
            Command::Backups(opts) => run_backups(opts).map(|_| 0),
            Command::Config(opts) => run_config(opts).map(|_| 0),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Run every setup step, offering rollback on failure.
    #[command(override_usage = "oxisetup run [options]")]
    Run(RunOptions),

    /// Restore one backup from a previous run by label.
    #[command(override_usage = "oxisetup restore [options] --from <backup_dir> <label>")]
    Restore(RestoreOptions),

    /// List backup directories of previous runs.
    #[command(override_usage = "oxisetup backups [options]")]
    Backups(BackupsOptions),

    /// Print effective configuration.
    #[command(override_usage = "oxisetup config [options]")]
    Config(ConfigOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RunOptions {
    /// Path to setup configuration file.
    #[arg(short, long, value_name = "path")]
    pub config: Option<PathBuf>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RestoreOptions {
    /// Backup directory of the run to restore from.
    #[arg(short, long, required = true, value_name = "backup_dir")]
    pub from: PathBuf,

    /// Label of backup, e.g., shell-rc, terminal-config.
    #[arg(required = true, value_name = "label")]
    pub label: String,

    /// Restore somewhere other than the original path.
    #[arg(short, long, value_name = "path")]
    pub target: Option<PathBuf>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct BackupsOptions {
    /// Directory holding backup directories.
    #[arg(short, long, value_name = "path")]
    pub root: Option<PathBuf>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ConfigOptions {
    /// Path to setup configuration file.
    #[arg(short, long, value_name = "path")]
    pub config: Option<PathBuf>,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    match run() {
        Ok(code) => exit(code),
        Err(error) => {
            error!("{error:?}");
            exit(1);
        }
    }
}

fn run() -> Result<i32> {
    Cli::parse().run()
}

fn load_config(path: Option<PathBuf>) -> Result<SetupConfig> {
    let path = match path {
        Some(path) => path,
        None => default_config_path()?,
    };

    SetupConfig::load(&path).with_context(|| format!("cannot load config {:?}", path.display()))
}

fn run_setup(opts: RunOptions) -> Result<i32> {
    let config = load_config(opts.config)?;
    let report = Report::open(&config.settings.log_path)?;
    let ledger = BackupLedger::new(&config.settings.backup_root);

    let brew: Rc<dyn PackageManager> = Rc::new(Homebrew::new());
    let fetcher: Rc<dyn Fetcher> = Rc::new(Curl::new(Duration::from_secs(
        config.download.connect_timeout_secs,
    )));
    let steps = standard_steps(&config, brew, fetcher);
    let mut installation = Installation::new(
        Preflight::from_config(&config),
        StepSequencer::new(steps),
        InquirePrompt,
    );

    let mut ctx = RunContext::new(config, ledger, report);
    let outcome = installation.run(&mut ctx);

    Ok(outcome.exit_code())
}

fn run_restore(opts: RestoreOptions) -> Result<()> {
    let label: BackupLabel = opts.label.parse()?;
    let ledger = BackupLedger::open(&opts.from)?;
    let record = ledger
        .find(&label)
        .ok_or_else(|| anyhow!("no backup labeled {label} in {:?}", opts.from.display()))?;
    let target = opts.target.unwrap_or_else(|| record.original_path.clone());

    ledger.restore(&label, &target)?;
    info!("restored {label} to {:?}", target.display());

    Ok(())
}

fn run_backups(opts: BackupsOptions) -> Result<()> {
    let root = match opts.root {
        Some(root) => root,
        None => default_backup_root()?,
    };
    if !root.exists() {
        info!("no backups in {:?}", root.display());
        return Ok(());
    }

    let mut areas = read_dir(&root)
        .with_context(|| format!("cannot list {:?}", root.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect::<Vec<_>>();
    areas.sort();

    for area in areas {
        match BackupLedger::open(&area) {
            Ok(ledger) => {
                let labels = ledger
                    .records()
                    .iter()
                    .map(|record| record.label.to_string())
                    .collect::<Vec<_>>();
                info!("{}: {}", area.display(), labels.join(", "));
            }
            Err(err) => warn!("{}: unreadable backup ({err})", area.display()),
        }
    }

    Ok(())
}

fn run_config(opts: ConfigOptions) -> Result<()> {
    let config = load_config(opts.config)?;
    print!("{config}");

    Ok(())
}
