use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One uploaded file. Policy columns come from the batch row it belongs to,
/// so every record of a token carries identical policy and counter values.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize, Deserialize)]
pub struct ShareRecord {
    pub id: String,
    pub link_token: String,
    pub original_name: String,
    pub stored_name: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub one_time_view: bool,
    pub download_count: i64,
    pub size: i64,
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
}

/// Access policy shared by all files uploaded under one token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchPolicy {
    pub password_hash: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub one_time_view: bool,
}

#[derive(Debug, Clone)]
pub struct NewFile {
    pub id: String,
    pub original_name: String,
    pub stored_name: String,
    pub size: i64,
    pub mime_type: String,
}

#[derive(Debug, Clone)]
pub struct NewBatch {
    pub token: String,
    pub policy: BatchPolicy,
    pub files: Vec<NewFile>,
    pub created_at: DateTime<Utc>,
}

impl NewBatch {
    /// Records as they will read back right after insertion.
    pub fn records(&self) -> Vec<ShareRecord> {
        self.files
            .iter()
            .map(|file| ShareRecord {
                id: file.id.clone(),
                link_token: self.token.clone(),
                original_name: file.original_name.clone(),
                stored_name: file.stored_name.clone(),
                password_hash: self.policy.password_hash.clone(),
                expires_at: self.policy.expires_at,
                one_time_view: self.policy.one_time_view,
                download_count: 0,
                size: file.size,
                mime_type: file.mime_type.clone(),
                created_at: self.created_at,
            })
            .collect()
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, sqlx::FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub total_files: i64,
    pub total_downloads: i64,
    pub expired_files: i64,
    pub active_files: i64,
    pub total_size: i64,
}
