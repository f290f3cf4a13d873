//! JSONL event writer
//!
//! One timestamped fund event per line, appended to a single file.

use super::FundEvent;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// A fund event as written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLine {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: FundEvent,
}

/// Appends fund events to a JSONL file
pub struct JsonlEventWriter {
    path: PathBuf,
}

impl JsonlEventWriter {
    /// Create the writer, creating the parent directory if needed
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create event directory: {:?}", parent))?;
        }

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event stamped with the current time
    pub fn write(&self, event: &FundEvent) -> Result<()> {
        let line = EventLine {
            timestamp: Utc::now(),
            event: event.clone(),
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open event file: {:?}", self.path))?;

        let json = serde_json::to_string(&line).context("Failed to serialize fund event")?;
        writeln!(file, "{}", json)?;

        Ok(())
    }

    pub fn write_all(&self, events: &[FundEvent]) -> Result<()> {
        for event in events {
            self.write(event)?;
        }
        Ok(())
    }

    /// Read back every line in the file
    pub fn read_all(&self) -> Result<Vec<EventLine>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(&self.path)?);
        let mut lines = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if !line.trim().is_empty() {
                let parsed: EventLine = serde_json::from_str(&line)
                    .with_context(|| format!("Failed to parse event line: {}", line))?;
                lines.push(parsed);
            }
        }
        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VaultGeneration;
    use alloy::primitives::{Address, U256};
    use std::env;

    #[test]
    fn test_write_and_read_back() {
        let dir = env::temp_dir().join("basket_fund_events_test");
        let _ = fs::remove_dir_all(&dir);
        let writer = JsonlEventWriter::new(dir.join("events.jsonl")).unwrap();

        let minted = FundEvent::Minted {
            depositor: Address::repeat_byte(0xAA),
            gross_deposit: U256::from(1_000u64),
            net_deposit: U256::from(995u64),
            fee: U256::from(5u64),
            pool_tokens: U256::from(10u64),
            claim_issued: U256::from(10u64),
            vault: VaultGeneration::A,
        };
        writer.write(&minted).unwrap();
        writer.write(&minted).unwrap();

        let lines = writer.read_all().unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].event, minted);

        let _ = fs::remove_dir_all(&dir);
    }
}
