//! # snapvault CLI - Verifiable directory backups
//!
//! Thin command shell over the snapvault core. Every invocation is checked
//! against the role policy and recorded in the store's audit chain exactly
//! once, whatever the outcome.
//!
//! ## Usage
//! ```bash
//! # Initialize a store
//! snapvault --store ./store init
//!
//! # Create a snapshot
//! snapvault --store ./store backup ./project --label nightly
//!
//! # List, verify, restore
//! snapvault --store ./store list
//! snapvault --store ./store verify snap_1723651200_1a2b3c4d
//! snapvault --store ./store restore snap_1723651200_1a2b3c4d ./restored
//!
//! # Audit chain
//! snapvault --store ./store audit-verify
//! snapvault --store ./store audit-show --limit 10
//! ```

use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand};
use colored::*;
use snapvault::audit::{AuditLog, AuditStatus};
use snapvault::error::SnapvaultError;
use snapvault::policy::Policy;
use snapvault::repository::Repository;
use snapvault::utils::current_user;
use std::path::PathBuf;

/// snapvault - backup with integrity, anti-rollback and a tamper-evident audit trail
#[derive(Parser)]
#[command(name = "snapvault")]
#[command(version)]
#[command(about = "Verifiable directory backups with a content-addressed store")]
struct Cli {
    /// Path to the backup store
    #[arg(short, long, global = true, default_value = "./store")]
    store: PathBuf,

    /// Path to the policy table (built-in defaults if absent)
    #[arg(long, global = true, default_value = "policy.yaml")]
    policy: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new backup store
    Init,

    /// Create a snapshot of a directory
    Backup {
        /// Directory to back up
        source: PathBuf,

        /// Snapshot label
        #[arg(short, long, default_value = "")]
        label: String,
    },

    /// List snapshots in chain order
    #[command(alias = "ls")]
    List,

    /// Verify a snapshot's integrity end to end
    Verify {
        /// Snapshot id
        snapshot: String,
    },

    /// Restore a snapshot into a target directory
    Restore {
        /// Snapshot id
        snapshot: String,

        /// Target directory
        target: PathBuf,
    },

    /// Verify the audit chain
    AuditVerify,

    /// Show recent audit entries
    AuditShow {
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

impl Commands {
    /// Command name as it appears in the policy table and the audit log.
    fn name(&self) -> &'static str {
        match self {
            Commands::Init => "init",
            Commands::Backup { .. } => "backup",
            Commands::List => "list",
            Commands::Verify { .. } => "verify",
            Commands::Restore { .. } => "restore",
            Commands::AuditVerify => "audit-verify",
            Commands::AuditShow { .. } => "audit-show",
        }
    }

    /// Argument vector recorded (hashed) in the audit log.
    fn audit_args(&self) -> Vec<String> {
        match self {
            Commands::Init | Commands::List | Commands::AuditVerify => vec![],
            Commands::Backup { source, label } => {
                let mut args = vec![source.display().to_string()];
                if !label.is_empty() {
                    args.push(format!("--label={}", label));
                }
                args
            }
            Commands::Verify { snapshot } => vec![snapshot.clone()],
            Commands::Restore { snapshot, target } => {
                vec![snapshot.clone(), target.display().to_string()]
            }
            Commands::AuditShow { limit } => vec![format!("--limit={}", limit)],
        }
    }
}

fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .init();
    }

    std::process::exit(run(cli));
}

fn run(cli: Cli) -> i32 {
    let command = cli.command.name();
    let args = cli.command.audit_args();

    // The audit log lives inside the store; make sure its directory exists
    // before anything can fail, so even early failures leave an entry.
    if std::fs::create_dir_all(&cli.store).is_err() {
        eprintln!("{} cannot create store directory {:?}", "error:".red(), cli.store);
        return 1;
    }
    let mut audit = match AuditLog::open(&cli.store) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("{} cannot open audit log: {}", "error:".red(), e);
            return 1;
        }
    };

    let user = match current_user() {
        Ok(u) => u,
        Err(e) => {
            let _ = audit.record("unknown", command, &args, AuditStatus::Fail, Some(&e.to_string()));
            eprintln!("{} {}", "error:".red(), e);
            return 1;
        }
    };

    let policy = match Policy::load(&cli.policy) {
        Ok(p) => p,
        Err(e) => {
            let _ = audit.record(&user, command, &args, AuditStatus::Fail, Some(&e.to_string()));
            eprintln!("{} {}", "error:".red(), e);
            return 1;
        }
    };

    if !policy.allow(&user, command) {
        let denial = SnapvaultError::PermissionDenied {
            user: user.clone(),
            command: command.to_string(),
        };
        let _ = audit.record(&user, command, &args, AuditStatus::Deny, Some(&denial.to_string()));
        eprintln!("{} {}", "✗".red(), denial);
        return 1;
    }

    match execute(&cli) {
        Ok(()) => {
            let _ = audit.record(&user, command, &args, AuditStatus::Ok, None);
            0
        }
        Err(e) => {
            let _ = audit.record(&user, command, &args, AuditStatus::Fail, Some(&e.to_string()));
            match &e {
                SnapvaultError::AuditCorrupted { line, .. } => {
                    eprintln!("{} AUDIT CORRUPTED at line {}", "✗".red(), line);
                }
                _ => eprintln!("{} {}", "✗".red(), e),
            }
            1
        }
    }
}

fn execute(cli: &Cli) -> snapvault::Result<()> {
    match &cli.command {
        Commands::Init => {
            Repository::init(&cli.store)?;
            println!("{} initialized store at {}", "✓".green(), cli.store.display());
            Ok(())
        }

        Commands::Backup { source, label } => {
            let mut repo = Repository::open(&cli.store)?;
            let record = repo.backup(source, label)?;
            println!("{} snapshot created", "✓".green());
            println!("  id:          {}", record.id.bold());
            println!("  merkle root: {}...", &record.merkle_root[..16]);
            println!(
                "  files: {}, chunks: {}, sequence: {}",
                record.total_files, record.total_chunks, record.sequence
            );
            Ok(())
        }

        Commands::List => {
            let repo = Repository::open(&cli.store)?;
            let snapshots = repo.list();
            if snapshots.is_empty() {
                println!("no snapshots");
                return Ok(());
            }
            println!("{} snapshot(s):", snapshots.len());
            for record in snapshots {
                let when = Local
                    .timestamp_opt(record.created_at as i64, 0)
                    .single()
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "  [{}] {}  {}  label: {}  files: {}  chunks: {}  root: {}...",
                    record.sequence,
                    record.id.bold(),
                    when,
                    if record.label.is_empty() { "-" } else { &record.label },
                    record.total_files,
                    record.total_chunks,
                    &record.merkle_root[..16]
                );
            }
            Ok(())
        }

        Commands::Verify { snapshot } => {
            let repo = Repository::open(&cli.store)?;
            let report = repo.verify(snapshot)?;
            println!(
                "{} snapshot {} is VALID ({} files, {} chunks checked)",
                "✓".green(),
                report.snapshot_id,
                report.files_checked,
                report.chunks_checked
            );
            Ok(())
        }

        Commands::Restore { snapshot, target } => {
            let repo = Repository::open(&cli.store)?;
            let report = repo.restore(snapshot, target)?;
            println!(
                "{} restored {} files ({} bytes) to {}",
                "✓".green(),
                report.files_restored,
                report.bytes_written,
                target.display()
            );
            Ok(())
        }

        Commands::AuditVerify => {
            let audit = AuditLog::open(&cli.store)?;
            let report = audit.verify()?;
            println!(
                "{} AUDIT OK - {} entries, last hash: {}",
                "✓".green(),
                report.entries,
                report.last_hash
            );
            Ok(())
        }

        Commands::AuditShow { limit } => {
            let audit = AuditLog::open(&cli.store)?;
            let entries = audit.recent_entries(*limit)?;
            if entries.is_empty() {
                println!("no audit entries");
                return Ok(());
            }
            for entry in entries {
                let when = Local
                    .timestamp_millis_opt(entry.timestamp_ms as i64)
                    .single()
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".to_string());
                let status = match entry.status {
                    AuditStatus::Ok => "OK".green(),
                    AuditStatus::Deny => "DENY".yellow(),
                    AuditStatus::Fail => "FAIL".red(),
                };
                println!(
                    "{}  {:<10} {:<12} {}  {}",
                    when,
                    entry.user,
                    entry.command,
                    status,
                    entry.error.as_deref().unwrap_or("")
                );
            }
            Ok(())
        }
    }
}
