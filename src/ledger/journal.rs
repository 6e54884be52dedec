//! Append-only journal of ledger changes.
//!
//! Every line is `{crc32:08x} {json}\n`. A store opened on a journal writes a
//! record (and syncs it) before the matching change becomes visible in
//! memory, so a restart rebuilds exactly what was published, including
//! pending payout intents.
//!
//! A crash can leave a torn final line. It is dropped on open and the file is
//! truncated back to the last complete record; damage anywhere else is
//! reported as corruption.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::payout::Payout;
use crate::models::wallet::WalletTransaction;
use crate::{PayvineError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum JournalRecord {
    /// Entries and payout records published by one scope.
    Commit {
        entries: Vec<WalletTransaction>,
        payouts: Vec<Payout>,
    },
    /// Payout record written outside a scope (intent or unsettled).
    Payout { payout: Payout },
    /// Pending intent dropped because the provider never acted on it.
    Discard { idempotency_key: String },
}

#[derive(Debug)]
pub(crate) struct Journal {
    path: PathBuf,
    file: Mutex<File>,
}

impl Journal {
    /// Opens (or creates) the journal at `path` and returns the records it
    /// already holds.
    pub(crate) fn open(path: &Path) -> Result<(Self, Vec<JournalRecord>)> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        let mut valid_len = 0;
        let mut rest = contents.as_str();
        let mut line_no = 0;
        while !rest.is_empty() {
            line_no += 1;
            let Some((line, tail)) = rest.split_once('\n') else {
                warn!(path = %path.display(), line = line_no, "dropping torn journal tail");
                break;
            };
            records.push(decode(line, line_no)?);
            valid_len += line.len() + 1;
            rest = tail;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        if valid_len < contents.len() {
            file.set_len(valid_len as u64)?;
        }
        Ok((
            Self {
                path: path.to_path_buf(),
                file: Mutex::new(file),
            },
            records,
        ))
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record and syncs it to disk.
    pub(crate) fn append(&self, record: &JournalRecord) -> Result<()> {
        let line = encode(record)?;
        let mut file = self.file.lock();
        file.write_all(line.as_bytes())?;
        file.sync_data()?;
        Ok(())
    }
}

fn encode(record: &JournalRecord) -> Result<String> {
    let body = serde_json::to_string(record)?;
    let checksum = crc32fast::hash(body.as_bytes());
    Ok(format!("{checksum:08x} {body}\n"))
}

fn decode(line: &str, line_no: usize) -> Result<JournalRecord> {
    let corrupt = |what: &str| PayvineError::LedgerCorrupt(format!("journal line {line_no}: {what}"));
    let (header, body) = line.split_once(' ').ok_or_else(|| corrupt("missing checksum"))?;
    let expected = u32::from_str_radix(header, 16).map_err(|_| corrupt("bad checksum"))?;
    if crc32fast::hash(body.as_bytes()) != expected {
        return Err(corrupt("checksum mismatch"));
    }
    serde_json::from_str(body).map_err(|e| corrupt(&e.to_string()))
}
