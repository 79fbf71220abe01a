use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::error::ErrorKind;
use clap::Parser;
use notifications_migrator::{
    connect, logging, transfer, CommitMode, DbRole, ProgressCallback, Stage, StageEvent,
};

#[derive(Parser)]
#[command(
    name = "notifications-migrator",
    about = "Copy users, notification types and notifications into an empty notifications database"
)]
struct Cli {
    /// The connection URI for the source database
    #[arg(short, long, value_name = "URI")]
    source: String,

    /// The connection URI for the destination database
    #[arg(short, long, value_name = "URI")]
    dest: String,

    /// Seconds to keep retrying a busy or unreachable database
    #[arg(long, value_name = "SECS", default_value_t = 60)]
    connect_timeout: u64,

    /// Run every stage, then roll back the destination
    #[arg(long)]
    dry_run: bool,

    /// Print the row counts as one JSON line when done
    #[arg(long)]
    json_summary: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    logging::init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let timeout = Duration::from_secs(cli.connect_timeout);
    let mut source = connect(DbRole::Source, &cli.source, timeout).await?;
    let mut dest = connect(DbRole::Destination, &cli.dest, timeout).await?;

    let mode = if cli.dry_run {
        CommitMode::DryRun
    } else {
        CommitMode::Commit
    };
    let progress: ProgressCallback = Arc::new(print_progress);
    let report = transfer(&mut source, &mut dest, mode, Some(&progress)).await?;

    if cli.dry_run {
        println!("Dry run: destination changes rolled back.");
    }
    if cli.json_summary {
        println!("{}", serde_json::to_string(&report)?);
    }
    Ok(())
}

fn print_progress(event: StageEvent) {
    match event {
        StageEvent::Started(stage) => println!("Migrating {}...", plural(stage)),
        StageEvent::Finished { stage, rows } => println!("  {rows} {} migrated", plural(stage)),
    }
}

fn plural(stage: Stage) -> &'static str {
    match stage {
        Stage::Users => "users",
        Stage::NotificationTypes => "notification types",
        Stage::Notifications => "notifications",
    }
}
