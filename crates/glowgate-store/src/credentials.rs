//! Credential store.
//!
//! Persists each remembered value as its own plain-text file under the
//! assets directory. A record is overwritten wholesale on every write and
//! read back verbatim.
//!
//! # Storage layout
//!
//! | Record | File |
//! |---|---|
//! | [`Record::OwnerKey`] | `ownerkey.txt` |
//! | [`Record::OwnerSignature`] | `ownersignature.txt` |
//! | [`Record::Network`] | `network.txt` |
//! | [`Record::Mac`] | `mac.txt` |
//! | [`Record::LastBoot`] | `lastboot.txt` |
//! | [`Record::Tngl`] | `tngl.txt` |
//!
//! Files are created owner read/write only (`0o600`) on Unix since the owner
//! key and signature authorise control of the device.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
}

// ─────────────────────────────────────────────────────────────────────────────
// Records
// ─────────────────────────────────────────────────────────────────────────────

/// One independently persisted value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Record {
    OwnerKey,
    OwnerSignature,
    Network,
    /// Address of the last successfully connected controller.
    Mac,
    LastBoot,
    /// Last TNGL program written to the device.
    Tngl,
}

impl Record {
    pub fn file_name(&self) -> &'static str {
        match self {
            Record::OwnerKey => "ownerkey.txt",
            Record::OwnerSignature => "ownersignature.txt",
            Record::Network => "network.txt",
            Record::Mac => "mac.txt",
            Record::LastBoot => "lastboot.txt",
            Record::Tngl => "tngl.txt",
        }
    }
}

/// Owner credentials as served by `GET /owner`.
#[derive(Clone, PartialEq, Eq, Serialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct OwnerInfo {
    pub owner_key: String,
    pub owner_signature: String,
    pub network: String,
}

impl fmt::Debug for OwnerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnerInfo")
            .field("owner_key", &"<redacted>")
            .field("owner_signature", &"<redacted>")
            .field("network", &self.network)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CredentialStore
// ─────────────────────────────────────────────────────────────────────────────

/// File-backed record store rooted at one directory.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    dir: PathBuf,
}

impl CredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of(&self, record: Record) -> PathBuf {
        self.dir.join(record.file_name())
    }

    /// Overwrite `record` with `value`, creating the directory if needed.
    pub async fn write(&self, record: Record, value: &str) -> Result<(), StoreError> {
        let path = self.path_of(record);
        let wrap = |source| StoreError::Write {
            path: path.clone(),
            source,
        };

        tokio::fs::create_dir_all(&self.dir).await.map_err(wrap)?;

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&path).await.map_err(wrap)?;
        file.write_all(value.as_bytes()).await.map_err(wrap)?;
        file.flush().await.map_err(wrap)?;
        debug!(record = ?record, "record written");
        Ok(())
    }

    /// Read `record` verbatim.
    pub async fn read(&self, record: Record) -> Result<String, StoreError> {
        let path = self.path_of(record);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| StoreError::Read { path, source })
    }

    /// Read all three owner records. Fails if any one is missing.
    pub async fn owner(&self) -> Result<OwnerInfo, StoreError> {
        Ok(OwnerInfo {
            owner_key: self.read(Record::OwnerKey).await?,
            owner_signature: self.read(Record::OwnerSignature).await?,
            network: self.read(Record::Network).await?,
        })
    }

    /// Stamp the boot time as RFC 3339.
    pub async fn mark_boot(&self, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.write(
            Record::LastBoot,
            &at.to_rfc3339_opts(SecondsFormat::Millis, true),
        )
        .await
    }
}
