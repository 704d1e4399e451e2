// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Destinations for classified submissions.
//!
//! The durable store itself lives outside this service; [`SubmissionSink`]
//! is the hand-off point. Records are append-only.

use crate::error::SinkError;
use crate::fields::FieldMap;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

/// A submission after classification, ready for durable storage.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedSubmission {
    pub id: Uuid,
    pub session_id: String,
    pub is_spam: bool,
    /// Business fields only; token and decoy fields are stripped
    pub fields: FieldMap,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub received_at: DateTime<Utc>,
}

#[async_trait]
pub trait SubmissionSink: Send + Sync {
    async fn record(&self, submission: ClassifiedSubmission) -> Result<(), SinkError>;
}

/// Keeps submissions in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<ClassifiedSubmission>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<ClassifiedSubmission> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl SubmissionSink for MemorySink {
    async fn record(&self, submission: ClassifiedSubmission) -> Result<(), SinkError> {
        self.records.lock().await.push(submission);
        Ok(())
    }
}

/// Appends one JSON object per line to a file.
pub struct JsonLinesSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesSink {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SubmissionSink for JsonLinesSink {
    async fn record(&self, submission: ClassifiedSubmission) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(&submission)?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}
