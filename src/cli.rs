use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::{self, CommandReport};
use crate::uploader::paths::PathOverrides;

/// Upload finished audio segments to the archive host and verify them.
#[derive(Debug, Parser)]
#[command(
    name = "uploader",
    version,
    about,
    after_help = "A recording stem that collides with a subcommand name must go through \
                  `uploader upload <RECORDING>`."
)]
struct Cli {
    /// Manifest file (defaults to UPLOADER_MANIFEST or ./uploader.json)
    #[arg(long, global = true)]
    manifest: Option<PathBuf>,

    /// Config file (defaults to UPLOADER_CONFIG_PATH or ~/.uploader/uploader.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    upload: UploadArgs,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one reconciliation pass (the default)
    Upload(UploadArgs),
    /// Show resolved paths and manifest state
    Status,
}

#[derive(Debug, Clone, Default, Args)]
struct UploadArgs {
    /// File name stem of the segment currently being recorded; it is skipped.
    /// Subcommand names take precedence at the top level
    recording: Option<String>,

    /// List pending files without contacting the remote host
    #[arg(long)]
    dry_run: bool,
}

fn print_report(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print!("{}", report.render_text());
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let overrides = PathOverrides {
        manifest: cli.manifest,
        config: cli.config,
    };

    let report = match cli.command {
        Some(Command::Status) => commands::status::run(&overrides)?,
        Some(Command::Upload(args)) => upload(args, overrides)?,
        None => upload(cli.upload, overrides)?,
    };

    print_report(&report, cli.json)?;
    if !report.ok {
        anyhow::bail!("{} reported {} issue(s)", report.command, report.issues.len());
    }
    Ok(())
}

fn upload(args: UploadArgs, paths: PathOverrides) -> Result<CommandReport> {
    commands::upload::run(&commands::upload::UploadOptions {
        recording: args.recording,
        dry_run: args.dry_run,
        paths,
    })
}
