//! Shared event model for the file activity tracker.
//!
//! A [`FileEvent`] is the unit of transport and storage: it is built once by
//! the filesystem monitor (or the ingress boundary) and never mutated
//! afterwards. On the wire it travels as JSON with one extra transport-level
//! `timestamp` field that is added at publish time and stripped at consume
//! time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Semantic file type derived from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Image,
    Document,
    Video,
    Audio,
    Archive,
    Code,
    Executable,
    Other,
    Directory,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Image => "image",
            FileType::Document => "document",
            FileType::Video => "video",
            FileType::Audio => "audio",
            FileType::Archive => "archive",
            FileType::Code => "code",
            FileType::Executable => "executable",
            FileType::Other => "other",
            FileType::Directory => "directory",
        }
    }
}

/// Coarse category, derived from [`FileType`] in a second mapping stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Media,
    Document,
    Code,
    System,
    Other,
}

impl FileCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileCategory::Media => "media",
            FileCategory::Document => "document",
            FileCategory::Code => "code",
            FileCategory::System => "system",
            FileCategory::Other => "other",
        }
    }
}

/// What happened to the path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Created,
    Modified,
    Deleted,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Created => "created",
            EventType::Modified => "modified",
            EventType::Deleted => "deleted",
        }
    }
}

/// Classifier output attached to every event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    /// Lowercased extension including the leading dot, empty for directories
    /// and extensionless files.
    pub extension: String,
    /// MIME guess for well-known extensions, absent otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub category: FileCategory,
    pub is_directory: bool,
}

/// A single observed filesystem change.
///
/// Invariant: `eventType=deleted` events carry size 0 and watch-time
/// timestamps, since the inode is gone by the time the notification fires.
/// Consumers must never treat a delete's size or timestamps as authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEvent {
    pub host_id: String,
    pub file_path: String,
    pub file_name: String,
    pub file_type: FileType,
    pub size: u64,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub event_type: EventType,
    pub metadata: FileMetadata,
}

impl FileEvent {
    /// Parent directory of the event path, used as the directory-rollup key.
    /// Paths with no parent component map to "/".
    pub fn directory_path(&self) -> String {
        match self.file_path.rfind('/') {
            Some(0) | None => "/".to_string(),
            Some(idx) => self.file_path[..idx].to_string(),
        }
    }
}

/// Wire form of a [`FileEvent`]: the event plus the transport timestamp the
/// publisher stamps on. The timestamp is dropped on the consume side and is
/// never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireEvent {
    #[serde(flatten)]
    pub event: FileEvent,
    pub timestamp: DateTime<Utc>,
}

/// Identity of a machine feeding the pipeline. Upserted on every consumer
/// start; `id` is derived deterministically from `mac_address`, so
/// re-registration is idempotent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostInfo {
    pub id: String,
    pub mac_address: String,
    pub hostname: String,
    pub platform: String,
    pub last_seen: DateTime<Utc>,
}
