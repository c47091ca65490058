//! Append-only audit chain of command invocations
//!
//! Every command invocation — successful, denied, or failed — produces
//! exactly one line in `store/audit.log`:
//!
//! ```text
//! ENTRY_HASH PREV_HASH UNIX_MS USER COMMAND ARGS_SHA256 STATUS [ERROR_MSG]
//! ```
//!
//! `ENTRY_HASH` is the SHA-256 of the six tokens that follow it, joined by
//! single spaces; the error message is advisory text and deliberately
//! excluded from the hash. Each entry's `PREV_HASH` is the previous line's
//! `ENTRY_HASH`, with the `ZERO` sentinel before the first entry, so edits,
//! deletions and reorderings are all detectable by re-walking the file.

use crate::error::{Result, SnapvaultError};
use crate::utils::{append_line_durable, hash_data, unix_now_ms, ZERO_DIGEST};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Outcome recorded for an invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStatus {
    /// Command completed successfully
    Ok,
    /// Policy rejected the invocation
    Deny,
    /// Any other failure
    Fail,
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditStatus::Ok => write!(f, "OK"),
            AuditStatus::Deny => write!(f, "DENY"),
            AuditStatus::Fail => write!(f, "FAIL"),
        }
    }
}

impl FromStr for AuditStatus {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "OK" => Ok(AuditStatus::Ok),
            "DENY" => Ok(AuditStatus::Deny),
            "FAIL" => Ok(AuditStatus::Fail),
            _ => Err(()),
        }
    }
}

/// One parsed audit entry
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    /// Hash of this entry's six hashed tokens
    pub entry_hash: String,
    /// Previous entry's hash (ZERO for the first)
    pub prev_hash: String,
    /// Invocation time in unix milliseconds
    pub timestamp_ms: u64,
    /// Operating user
    pub user: String,
    /// Command name
    pub command: String,
    /// SHA-256 of the space-joined argument vector
    pub args_hash: String,
    /// Recorded outcome
    pub status: AuditStatus,
    /// Optional advisory error message (not hashed)
    pub error: Option<String>,
}

/// Result of a successful audit verification
#[derive(Debug)]
pub struct AuditReport {
    /// Number of entries walked
    pub entries: usize,
    /// Hash of the final entry, or ZERO for an empty log
    pub last_hash: String,
}

/// SHA-256 over the canonicalized argument vector: arguments joined by a
/// single space into a UTF-8 byte string.
pub fn args_digest(args: &[String]) -> String {
    hash_data(args.join(" ").as_bytes())
}

/// The append-only audit log
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    prev_hash: String,
}

impl AuditLog {
    /// Open the audit log at `<store>/audit.log`, seeding the chain from the
    /// last existing entry (or the `ZERO` genesis sentinel).
    pub fn open(store_root: &Path) -> Result<Self> {
        let path = store_root.join("audit.log");
        let prev_hash = last_entry_hash(&path)?.unwrap_or_else(|| ZERO_DIGEST.to_string());
        Ok(Self { path, prev_hash })
    }

    /// Record one command invocation; durable before return.
    ///
    /// Returns the new entry's hash. Error messages have newlines and tabs
    /// escaped so a single entry stays a single line; they are appended
    /// after the hashed tokens and do not enter the hash.
    pub fn record(
        &mut self,
        user: &str,
        command: &str,
        args: &[String],
        status: AuditStatus,
        error: Option<&str>,
    ) -> Result<String> {
        let timestamp = unix_now_ms();
        let args_hash = args_digest(args);
        let hashed = format!(
            "{} {} {} {} {} {}",
            self.prev_hash, timestamp, user, command, args_hash, status
        );
        let entry_hash = hash_data(hashed.as_bytes());

        let mut line = format!("{} {}", entry_hash, hashed);
        if let Some(msg) = error {
            if !msg.is_empty() {
                let clean = msg.replace('\n', "\\n").replace('\t', "\\t").replace('\r', "\\r");
                line.push(' ');
                line.push_str(&clean);
            }
        }

        append_line_durable(&self.path, &line)?;
        self.prev_hash = entry_hash.clone();
        debug!("audit: {} {} {}", user, command, status);
        Ok(entry_hash)
    }

    /// Walk the full chain, verifying every entry hash and every link.
    ///
    /// # Errors
    ///
    /// [`SnapvaultError::AuditCorrupted`] naming the first bad line.
    pub fn verify(&self) -> Result<AuditReport> {
        if !self.path.exists() {
            return Ok(AuditReport {
                entries: 0,
                last_hash: ZERO_DIGEST.to_string(),
            });
        }

        let content = fs::read_to_string(&self.path)?;
        let mut prev_hash = ZERO_DIGEST.to_string();
        let mut entries = 0;

        for (idx, raw) in content.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() < 7 {
                return Err(SnapvaultError::AuditCorrupted {
                    line: line_no,
                    detail: "insufficient fields".to_string(),
                });
            }

            if tokens[1] != prev_hash {
                return Err(SnapvaultError::AuditCorrupted {
                    line: line_no,
                    detail: "hash chain broken".to_string(),
                });
            }

            let computed = hash_data(tokens[1..7].join(" ").as_bytes());
            if computed != tokens[0] {
                return Err(SnapvaultError::AuditCorrupted {
                    line: line_no,
                    detail: "entry hash mismatch".to_string(),
                });
            }

            prev_hash = tokens[0].to_string();
            entries += 1;
        }

        Ok(AuditReport {
            entries,
            last_hash: prev_hash,
        })
    }

    /// Parse the most recent `limit` entries, oldest first.
    ///
    /// Unparseable lines are skipped — this is a viewing aid, not the
    /// integrity check; use [`AuditLog::verify`] for that.
    pub fn recent_entries(&self, limit: usize) -> Result<Vec<AuditEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path)?;
        let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
        let start = lines.len().saturating_sub(limit);

        let mut out = Vec::new();
        for line in &lines[start..] {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() < 7 {
                continue;
            }
            let Ok(status) = tokens[6].parse::<AuditStatus>() else {
                continue;
            };
            let Ok(timestamp_ms) = tokens[2].parse::<u64>() else {
                continue;
            };
            out.push(AuditEntry {
                entry_hash: tokens[0].to_string(),
                prev_hash: tokens[1].to_string(),
                timestamp_ms,
                user: tokens[3].to_string(),
                command: tokens[4].to_string(),
                args_hash: tokens[5].to_string(),
                status,
                error: if tokens.len() > 7 {
                    Some(tokens[7..].join(" "))
                } else {
                    None
                },
            });
        }
        Ok(out)
    }
}

/// First token of the last non-empty line, if any.
fn last_entry_hash(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .and_then(|l| l.split_whitespace().next())
        .map(String::from))
}
