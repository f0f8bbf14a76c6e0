// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use graft::{
    backup::Backups,
    config::{GraftConfig, RootSource, TargetDefinition},
    guard::VersionCheck,
    overlay::{Outcome, Overlay, SyncReport, Target},
    path::{default_config_path, LOCAL_CONFIG_FILE},
};

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use inquire::Confirm;
use std::{
    env::current_dir,
    path::{Path, PathBuf},
    process::exit,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "graft [options] <graft-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to configuration file.
    #[arg(long, global = true, value_name = "path")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn verbose(&self) -> bool {
        match &self.command {
            Command::Install(opts) | Command::Clean(opts) | Command::Check(opts) => opts.verbose,
            Command::ReverseInstall(opts) => opts.run.verbose,
            Command::HardClean(_) => false,
        }
    }

    fn run(self) -> Result<bool> {
        let config = load_config(self.config.as_deref())?;
        match self.command {
            Command::Install(opts) => run_install(&config, opts),
            Command::Clean(opts) => run_clean(&config, opts),
            Command::ReverseInstall(opts) => run_reverse_install(&config, opts),
            Command::Check(opts) => run_check(&config, opts),
            Command::HardClean(opts) => run_hard_clean(&config, opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Install overlay files into target roots.
    #[command(override_usage = "graft install [options]")]
    Install(RunOptions),

    /// Restore target roots to their state before the latest install.
    #[command(override_usage = "graft clean [options]")]
    Clean(RunOptions),

    /// Copy changes made inside target roots back into the overlay.
    #[command(override_usage = "graft reverse-install [options]")]
    ReverseInstall(ReverseInstallOptions),

    /// Check that overlay files are installed unmodified in target roots.
    #[command(override_usage = "graft check [options]")]
    Check(RunOptions),

    /// Reset target roots to their checked out revision through Git.
    #[command(override_usage = "graft hard-clean [options]")]
    HardClean(HardCleanOptions),
}

#[derive(Args, Clone, Debug)]
struct TargetOptions {
    /// Configured targets to operate on, all of them if omitted.
    #[arg(short, long = "target", value_name = "name")]
    pub targets: Vec<String>,

    /// Explicit target root.
    #[arg(short, long, value_name = "path")]
    pub root: Option<PathBuf>,

    /// Environment variable naming the target root.
    #[arg(long, value_name = "var")]
    pub root_env: Option<String>,

    /// Correspondence table of an ad-hoc target.
    #[arg(long, value_name = "path", conflicts_with = "targets")]
    pub table: Option<PathBuf>,

    /// Required marker files of an ad-hoc target.
    #[arg(short, long = "marker", value_name = "file", requires = "table")]
    pub markers: Vec<String>,

    /// Expected revision tag of an ad-hoc target.
    #[arg(long, value_name = "tag", requires = "table")]
    pub tag: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RunOptions {
    #[command(flatten)]
    pub target: TargetOptions,

    /// Print every file level operation.
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ReverseInstallOptions {
    #[command(flatten)]
    pub run: RunOptions,

    /// Overlay working directory to copy into.
    #[arg(long, value_name = "dir")]
    pub overlay: Option<PathBuf>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct HardCleanOptions {
    #[command(flatten)]
    pub target: TargetOptions,

    /// Do not ask for confirmation.
    #[arg(short, long)]
    pub force: bool,
}

fn main() {
    let cli = Cli::parse();
    let default_filter = if cli.verbose() { "debug" } else { "info" };

    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_default();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    match cli.run() {
        Ok(true) => exit(0),
        Ok(false) => exit(1),
        Err(error) => {
            error!("{error:?}");
            exit(1);
        }
    }
}

fn run_install(config: &GraftConfig, opts: RunOptions) -> Result<bool> {
    let overlay = open_overlay(config, None)?;
    for target in resolve_targets(config, &opts.target)? {
        let outcome = overlay.install(&target, confirm_version)?;
        report(&target, &outcome, opts.verbose);
    }

    Ok(true)
}

fn run_clean(config: &GraftConfig, opts: RunOptions) -> Result<bool> {
    let overlay = open_overlay(config, None)?;
    for target in resolve_targets(config, &opts.target)? {
        let outcome = overlay.clean(&target, confirm_version)?;
        report(&target, &outcome, opts.verbose);
    }

    Ok(true)
}

fn run_reverse_install(config: &GraftConfig, opts: ReverseInstallOptions) -> Result<bool> {
    let overlay = open_overlay(config, opts.overlay.as_deref())?;
    for target in resolve_targets(config, &opts.run.target)? {
        let outcome = overlay.reverse_install(&target, confirm_version)?;
        report(&target, &outcome, opts.run.verbose);
    }

    Ok(true)
}

fn run_check(config: &GraftConfig, opts: RunOptions) -> Result<bool> {
    let overlay = open_overlay(config, None)?;
    let mut clean = true;
    for target in resolve_targets(config, &opts.target)? {
        let outcome = overlay.check(&target, confirm_version)?;
        report(&target, &outcome, opts.verbose);

        if let Some(report) = outcome.report() {
            for path in report.missing() {
                warn!("{} -- not found", path.display());
            }
            for path in report.modified() {
                warn!("{} -- modified", path.display());
            }

            if report.is_clean() {
                info!("{}: every overlay file is installed", target.name);
            } else {
                clean = false;
            }
        }
    }

    Ok(clean)
}

fn run_hard_clean(config: &GraftConfig, opts: HardCleanOptions) -> Result<bool> {
    let overlay = open_overlay(config, None)?;
    for target in resolve_targets(config, &opts.target)? {
        let message = format!(
            "hard clean {:?}? this discards every change and untracked file",
            target.root.display()
        );
        if !opts.force && !confirm(&message) {
            info!("{}: skipped hard clean", target.name);
            continue;
        }

        let report = overlay.hard_clean(&target)?;
        print_events(&report, true);
        info!("{}: {}", target.name, report.stage);
    }

    Ok(true)
}

/// Load configuration from the first location that has one.
///
/// An explicit path must exist. Otherwise the working directory is tried
/// first, then the user configuration directory. No file at all means
/// default settings with no targets.
fn load_config(path: Option<&Path>) -> Result<GraftConfig> {
    if let Some(path) = path {
        return Ok(GraftConfig::load(path)?);
    }

    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.is_file() {
        return Ok(GraftConfig::load(local)?);
    }

    match default_config_path() {
        Ok(path) if path.is_file() => Ok(GraftConfig::load(path)?),
        _ => Ok(GraftConfig::default()),
    }
}

fn open_overlay(config: &GraftConfig, workdir: Option<&Path>) -> Result<Overlay> {
    let workdir = match workdir {
        Some(workdir) => workdir.to_path_buf(),
        None => current_dir()?,
    };

    // INVARIANT: Relative backup directories live inside the overlay working directory.
    let backups = workdir.join(&config.settings.backups_dir);
    Ok(Overlay::new(workdir, Backups::new(backups)))
}

/// Turn command line options and configuration into targets with roots.
///
/// Targets without a usable root are skipped with a warning.
fn resolve_targets(config: &GraftConfig, opts: &TargetOptions) -> Result<Vec<Target>> {
    let definitions: Vec<TargetDefinition> = match &opts.table {
        Some(table) => vec![TargetDefinition {
            name: "ad-hoc".into(),
            root_env: None,
            table: table.clone(),
            markers: opts.markers.clone(),
            tag: opts.tag.clone().unwrap_or_default(),
        }],
        None => config.select(&opts.targets)?.into_iter().cloned().collect(),
    };

    if definitions.is_empty() {
        bail!(
            "no targets configured, pass --table or add a [[target]] to {:?}",
            LOCAL_CONFIG_FILE
        );
    }

    let mut targets = Vec::new();
    for definition in definitions {
        let var = opts.root_env.clone().or_else(|| definition.root_env.clone());
        match RootSource::resolve(opts.root.as_deref(), var.as_deref()) {
            RootSource::Explicit(root) => targets.push(definition.into_target(root)),
            RootSource::Environment { var, path } => {
                let message = format!(
                    "use {:?} from ${var} as root of {}?",
                    path.display(),
                    definition.name
                );
                if confirm(&message) {
                    targets.push(definition.into_target(path));
                } else {
                    info!("{}: skipped, root not confirmed", definition.name);
                }
            }
            RootSource::Unresolved => {
                warn!(
                    "{}: skipped, no root given, pass --root or set its root variable",
                    definition.name
                );
            }
        }
    }

    Ok(targets)
}

fn confirm(message: &str) -> bool {
    Confirm::new(message)
        .with_default(false)
        .prompt()
        .unwrap_or(false)
}

fn confirm_version(_: &VersionCheck) -> bool {
    confirm("continue anyway?")
}

fn report(target: &Target, outcome: &Outcome, verbose: bool) {
    match outcome {
        Outcome::Synced(report) => {
            print_events(report, verbose);
            info!("{}: {}", target.name, report.stage);
        }
        Outcome::Declined(check) => {
            info!("{}: skipped, {check}", target.name);
        }
    }
}

fn print_events(report: &SyncReport, verbose: bool) {
    if !verbose {
        return;
    }

    for event in &report.events {
        info!("{event}");
    }
}
