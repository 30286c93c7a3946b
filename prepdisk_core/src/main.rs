/*============================================================
  Synavera Project: Prep-Disk
  Module: prepdisk_core::main
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Entry point for Prep-Disk Core. Audits an offline archive
    drive against the Kiwix mirror and drives bounded download
    plans from typed operator commands.

  Security / Safety Notes:
    Operates within user privileges. Performs HTTPS GET requests
    and writes/deletes files only inside the chosen drive root.

  Dependencies:
    clap for CLI parsing, chrono for session stamps.

  Operational Scope:
    Invoked by operators preparing a drive, either for a single
    command or through the interactive menu.

  Revision History:
    2025-11-12 COD  Authored Prep-Disk Core runtime.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Result-first error handling with deterministic exits
    - Structured logging following Synavera cadence
    - Configurable execution via CLI and config file
============================================================*/

mod catalog;
mod config;
mod error;
mod inventory;
mod listing;
mod logger;
mod mirror;
mod planner;
mod readme;
mod reconcile;
mod report;
mod transfer;
mod version;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::Utc;
use clap::{ArgAction, Args, Parser, Subcommand};

use catalog::Catalog;
use config::PrepConfig;
use error::{PrepError, Result};
use inventory::{disk_usage, Inventory};
use logger::Logger;
use mirror::MirrorClient;
use planner::{plan, PlanOutcome, SyncCommand};
use reconcile::{run_audit, Audit};
use report::{build_report, render_drive_table, render_plan, render_status_table, write_report};
use transfer::{execute_plan, HttpTransfer};

/// Command-line arguments for Prep-Disk-Core.
#[derive(Debug, Parser)]
#[command(
    name = "Prep-Disk-Core",
    version,
    author = "Synavera Systems",
    about = "Offline archive auditor and sync planner for Kiwix drives"
)]
struct Cli {
    /// Override configuration file path.
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Explicit log file path.
    #[arg(long, value_name = "PATH", global = true)]
    log: Option<PathBuf>,
    /// Enable verbose logging to stderr.
    #[arg(long, action = ArgAction::SetTrue, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive menu over a drive.
    Menu { destination: PathBuf },
    /// Audit a drive and write the JSON report.
    Audit {
        destination: PathBuf,
        /// Print the report as JSON instead of tables.
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
        /// Override report output path.
        #[arg(long, value_name = "PATH")]
        report: Option<PathBuf>,
    },
    /// Fetch missing recommended libraries that fit in free space.
    Sync {
        destination: PathBuf,
        #[command(flatten)]
        plan: PlanArgs,
    },
    /// Replace outdated libraries with the current mirror release.
    Update {
        destination: PathBuf,
        #[command(flatten)]
        plan: PlanArgs,
    },
    /// Fetch the Kiwix reader installers.
    Apps {
        destination: PathBuf,
        #[command(flatten)]
        plan: PlanArgs,
    },
    /// Fetch one library by catalog identifier.
    Fetch {
        destination: PathBuf,
        id: u32,
        #[command(flatten)]
        plan: PlanArgs,
    },
    /// Delete drive files whose name contains FRAGMENT.
    Delete {
        destination: PathBuf,
        fragment: String,
        /// Do not ask for confirmation.
        #[arg(long, action = ArgAction::SetTrue)]
        yes: bool,
    },
    /// Write the emergency README to the drive root.
    Readme { destination: PathBuf },
    /// Write the built-in configuration document.
    InitConfig {
        /// Overwrite an existing document.
        #[arg(long, action = ArgAction::SetTrue)]
        force: bool,
    },
}

#[derive(Debug, Clone, Copy, Args)]
struct PlanArgs {
    /// Do not ask for confirmation before transferring.
    #[arg(long, action = ArgAction::SetTrue)]
    yes: bool,
    /// Print the plan without transferring.
    #[arg(long, action = ArgAction::SetTrue)]
    dry_run: bool,
}

/// Keystroke choices offered by the interactive menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MenuChoice {
    Sync,
    UpdateOutdated,
    AppInstallers,
    ManualSelect,
    Delete,
    Readme,
    Exit,
}

fn parse_menu_choice(input: &str) -> Option<MenuChoice> {
    match input.trim().to_ascii_lowercase().as_str() {
        "1" => Some(MenuChoice::Sync),
        "2" => Some(MenuChoice::UpdateOutdated),
        "3" => Some(MenuChoice::AppInstallers),
        "4" => Some(MenuChoice::ManualSelect),
        "5" => Some(MenuChoice::Delete),
        "6" => Some(MenuChoice::Readme),
        "q" | "x" | "exit" => Some(MenuChoice::Exit),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("[Prep-Disk-Core] {}", err);
            err.exit_code()
        }
    }
}

async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    if let Command::InitConfig { force } = &cli.command {
        let path = match cli.config.clone() {
            Some(path) => path,
            None => PrepConfig::default_path()?,
        };
        PrepConfig::write_default(&path, *force)?;
        println!("→ Configuration written to {}", path.display());
        return Ok(ExitCode::SUCCESS);
    }

    let config = PrepConfig::load_from_optional_path(cli.config.as_deref())?;

    let session_stamp = Utc::now().format("%Y-%m-%d_%H-%M-%S").to_string();
    let log_path = cli
        .log
        .clone()
        .unwrap_or_else(|| config.log_dir().join(format!("core_{session_stamp}.log")));
    let logger = Logger::new(Some(log_path), cli.verbose)?;
    logger.info("INIT", "Prep-Disk Core awakening.");

    let outcome = dispatch(&cli.command, &config, &logger).await;
    match &outcome {
        Ok(()) => logger.info("COMPLETE", "Session closed."),
        Err(err) => logger.error("FATAL", err.to_string()),
    }
    logger.finalize()?;
    outcome.map(|()| ExitCode::SUCCESS)
}

async fn dispatch(command: &Command, config: &PrepConfig, logger: &Logger) -> Result<()> {
    match command {
        Command::InitConfig { .. } => Ok(()),
        Command::Menu { destination } => {
            Session::open(config, destination, logger)?.menu().await
        }
        Command::Audit {
            destination,
            json,
            report,
        } => {
            let session = Session::open(config, destination, logger)?;
            let audit = session.audit().await?;
            let document = build_report(&audit, &session.destination);
            if *json {
                let rendered = serde_json::to_string_pretty(&document).map_err(|err| {
                    PrepError::Serialization(format!("Failed to render report: {err}"))
                })?;
                println!("{rendered}");
            } else {
                session.print_overview(&audit)?;
            }
            let report_path = report.clone().unwrap_or_else(|| config.report_path());
            write_report(&document, &report_path)?;
            logger.info(
                "REPORT",
                format!("Audit report written to {}", report_path.display()),
            );
            Ok(())
        }
        Command::Sync { destination, plan } => {
            let session = Session::open(config, destination, logger)?;
            let audit = session.audit().await?;
            session.execute(SyncCommand::Sync, &audit, *plan).await
        }
        Command::Update { destination, plan } => {
            let session = Session::open(config, destination, logger)?;
            let audit = session.audit().await?;
            session.execute(SyncCommand::UpdateOutdated, &audit, *plan).await
        }
        Command::Apps { destination, plan } => {
            let session = Session::open(config, destination, logger)?;
            let audit = session.audit().await?;
            session.execute(SyncCommand::AppInstallers, &audit, *plan).await
        }
        Command::Fetch {
            destination,
            id,
            plan,
        } => {
            let session = Session::open(config, destination, logger)?;
            session
                .catalog
                .entry(*id)
                .ok_or(PrepError::UnknownEntry(*id))?;
            let audit = session.audit().await?;
            session.execute(SyncCommand::ManualSelect(*id), &audit, *plan).await
        }
        Command::Delete {
            destination,
            fragment,
            yes,
        } => Session::open(config, destination, logger)?.delete_matching(fragment, *yes),
        Command::Readme { destination } => {
            let session = Session::open(config, destination, logger)?;
            let path = readme::write_readme(&session.destination)?;
            println!("→ README written to {}", path.display());
            Ok(())
        }
    }
}

/// Everything one drive session needs, passed explicitly to each step.
struct Session<'a> {
    catalog: Catalog,
    mirror: MirrorClient,
    transfer: HttpTransfer,
    extension: String,
    destination: PathBuf,
    logger: &'a Logger,
}

impl<'a> Session<'a> {
    fn open(config: &PrepConfig, destination: &Path, logger: &'a Logger) -> Result<Self> {
        if !destination.is_dir() {
            return Err(PrepError::Filesystem(format!(
                "Drive not found: {}",
                destination.display()
            )));
        }
        Ok(Self {
            catalog: config.catalog(),
            mirror: MirrorClient::new(&config.mirror)?,
            transfer: HttpTransfer::new(&config.mirror)?,
            extension: config.mirror.extension.clone(),
            destination: destination.to_path_buf(),
            logger,
        })
    }

    async fn audit(&self) -> Result<Audit> {
        run_audit(
            &self.catalog,
            &self.mirror,
            &self.destination,
            &self.extension,
            self.logger,
        )
        .await
    }

    fn print_overview(&self, audit: &Audit) -> Result<()> {
        let inventory = Inventory::scan(&self.destination)?;
        let disk = disk_usage(&self.destination)?;
        println!("{}", render_drive_table(&inventory, &disk));
        println!("{}", render_status_table(audit));
        Ok(())
    }

    async fn execute(&self, command: SyncCommand, audit: &Audit, args: PlanArgs) -> Result<()> {
        let outcome = plan(
            command,
            audit,
            self.catalog.software(),
            &self.destination,
            self.logger,
        )?;
        match outcome {
            None => Ok(()),
            Some(PlanOutcome::ManualPointer { name, url }) => {
                println!(
                    "→ {name} has no automated mirror. Download it from {} and copy it to {}.",
                    url.as_deref().unwrap_or("its publisher"),
                    self.destination.display()
                );
                Ok(())
            }
            Some(PlanOutcome::Transfers(plan)) => {
                if plan.is_empty() {
                    println!("→ Nothing to download.");
                    return Ok(());
                }
                print!("{}", render_plan(&plan));
                if args.dry_run {
                    return Ok(());
                }
                let question = format!(
                    "Download {} items ({:.1} GB)?",
                    plan.len(),
                    plan.projected_gb()
                );
                if !args.yes && !confirm(&question)? {
                    self.logger.info("PLAN", "Operator declined the plan");
                    return Ok(());
                }
                let summary = execute_plan(&plan, &self.transfer, self.logger).await;
                println!(
                    "→ Transfers complete: {} succeeded, {} failed",
                    summary.completed, summary.failed
                );
                Ok(())
            }
        }
    }

    fn delete_matching(&self, fragment: &str, assume_yes: bool) -> Result<()> {
        if fragment.trim().is_empty() {
            return Err(PrepError::Runtime(
                "Refusing to delete with an empty filename fragment".into(),
            ));
        }
        let inventory = Inventory::scan(&self.destination)?;
        let matches = inventory.containing(fragment);
        if matches.is_empty() {
            println!("→ No files contain `{fragment}`.");
            return Ok(());
        }
        for file in matches {
            if !assume_yes && !confirm(&format!("Delete {}?", file.filename))? {
                continue;
            }
            std::fs::remove_file(&file.path).map_err(|err| {
                PrepError::Filesystem(format!("Failed to delete {}: {err}", file.path.display()))
            })?;
            self.logger
                .info("DELETE", format!("removed {}", file.path.display()));
        }
        Ok(())
    }

    async fn menu(&self) -> Result<()> {
        loop {
            let audit = self.audit().await?;
            println!("\n{}", "=".repeat(40));
            self.print_overview(&audit)?;
            println!("Main Menu:");
            println!("1. Sync recommended knowledge");
            println!("2. Update outdated libraries");
            println!("3. Download reader installers");
            println!("4. Fetch one library by ID");
            println!("5. Delete a file");
            println!("6. Generate README");
            println!("Q. Safe eject & exit");

            let Some(input) = prompt("\nSelect: ")? else {
                return self.eject();
            };
            let Some(choice) = parse_menu_choice(&input) else {
                println!("→ Unknown choice `{input}`.");
                continue;
            };

            let outcome = match choice {
                MenuChoice::Exit => return self.eject(),
                MenuChoice::Sync => self.execute(SyncCommand::Sync, &audit, interactive()).await,
                MenuChoice::UpdateOutdated => {
                    self.execute(SyncCommand::UpdateOutdated, &audit, interactive())
                        .await
                }
                MenuChoice::AppInstallers => {
                    self.execute(SyncCommand::AppInstallers, &audit, interactive())
                        .await
                }
                MenuChoice::ManualSelect => match prompt("Library ID: ")? {
                    Some(raw) => match raw.parse::<u32>() {
                        Ok(id) => {
                            self.execute(SyncCommand::ManualSelect(id), &audit, interactive())
                                .await
                        }
                        Err(_) => {
                            println!("→ `{raw}` is not a library ID.");
                            Ok(())
                        }
                    },
                    None => Ok(()),
                },
                MenuChoice::Delete => match prompt("Enter partial filename to delete: ")? {
                    Some(fragment) => self.delete_matching(&fragment, false),
                    None => Ok(()),
                },
                MenuChoice::Readme => readme::write_readme(&self.destination).map(|path| {
                    println!("→ README updated at {}", path.display());
                }),
            };

            if let Err(err) = outcome {
                self.logger.error("MENU", err.to_string());
            }
        }
    }

    fn eject(&self) -> Result<()> {
        readme::write_readme(&self.destination)?;
        println!("→ Buffers flushed. Disk ready for off-grid use.");
        Ok(())
    }
}

fn interactive() -> PlanArgs {
    PlanArgs {
        yes: false,
        dry_run: false,
    }
}

fn prompt(question: &str) -> Result<Option<String>> {
    print!("{question}");
    io::stdout().flush()?;
    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn confirm(question: &str) -> Result<bool> {
    let answer = prompt(&format!("{question} (y/n): "))?;
    Ok(matches!(
        answer.map(|a| a.to_ascii_lowercase()).as_deref(),
        Some("y") | Some("yes")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn menu_keystrokes_map_to_choices() {
        assert_eq!(parse_menu_choice("1"), Some(MenuChoice::Sync));
        assert_eq!(parse_menu_choice(" 2 \n"), Some(MenuChoice::UpdateOutdated));
        assert_eq!(parse_menu_choice("3"), Some(MenuChoice::AppInstallers));
        assert_eq!(parse_menu_choice("4"), Some(MenuChoice::ManualSelect));
        assert_eq!(parse_menu_choice("5"), Some(MenuChoice::Delete));
        assert_eq!(parse_menu_choice("6"), Some(MenuChoice::Readme));
        for exit in ["q", "Q", "x", "EXIT"] {
            assert_eq!(parse_menu_choice(exit), Some(MenuChoice::Exit));
        }
        assert_eq!(parse_menu_choice("sync please"), None);
        assert_eq!(parse_menu_choice(""), None);
    }

    #[test]
    fn fetch_subcommand_takes_destination_and_id() {
        let cli = Cli::try_parse_from([
            "prepdisk-core",
            "--verbose",
            "fetch",
            "/media/drive",
            "7",
            "--dry-run",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Command::Fetch {
                destination,
                id,
                plan,
            } => {
                assert_eq!(destination, PathBuf::from("/media/drive"));
                assert_eq!(id, 7);
                assert!(plan.dry_run);
                assert!(!plan.yes);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn missing_drive_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let logger = Logger::quiet();
        let err = Session::open(&PrepConfig::builtin(), &dir.path().join("F"), &logger)
            .err()
            .unwrap();
        assert!(matches!(err, PrepError::Filesystem(_)));
    }

    #[test]
    fn delete_removes_only_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("gutenberg_en_all_2024-05.zim"), b"g").unwrap();
        std::fs::write(dir.path().join("ifixit_en_all_2024-04.zim"), b"i").unwrap();
        let logger = Logger::quiet();
        let session = Session::open(&PrepConfig::builtin(), dir.path(), &logger).unwrap();

        session.delete_matching("gutenberg", true).unwrap();
        assert!(!dir.path().join("gutenberg_en_all_2024-05.zim").exists());
        assert!(dir.path().join("ifixit_en_all_2024-04.zim").exists());
        assert!(session.delete_matching("  ", true).is_err());
    }
}
