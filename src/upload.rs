use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{
    errors::{AppError, AppResult},
    gate,
    models::{BatchPolicy, NewBatch, NewFile},
    utilities::{is_valid_custom_link, link_token, read_chunk, record_id, stored_name},
    AppContext,
};

const SNIFF_BYTES: usize = 8192;
const TOKEN_ATTEMPTS: usize = 5;
const FALLBACK_MIME: &str = "application/octet-stream";

/// Form fields that set the batch policy.
#[derive(Debug, Default, Clone)]
pub struct UploadOptions {
    pub password: Option<String>,
    pub expires_at: Option<String>,
    pub one_time_view: bool,
    pub custom_link: Option<String>,
}

impl UploadOptions {
    /// Returns `false` for fields that are not options.
    pub fn set(&mut self, name: &str, value: String) -> bool {
        let value = Some(value).filter(|v| !v.trim().is_empty());
        match name {
            "password" => self.password = value,
            "expires_at" | "expired_date" => self.expires_at = value,
            "custom_link" => self.custom_link = value.map(|v| v.trim().to_string()),
            "one_time_view" => self.one_time_view = value.as_deref().is_some_and(parse_flag),
            _ => return false,
        }
        true
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "yes"
    )
}

/// RFC 3339, or a zone-less `datetime-local` style value taken as UTC.
pub fn parse_expiry(value: &str) -> AppResult<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| {
            AppError::Validation(format!(
                "I couldn't understand the expiration date '{value}'. Use something like 2030-01-31T18:00:00Z."
            ))
        })
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub token: String,
    pub share_link: String,
    pub download_url: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub one_time_view: bool,
    pub has_password: bool,
    pub files: Vec<UploadedFile>,
    pub total_files: usize,
    pub total_size: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub id: String,
    pub original_name: String,
    pub size: i64,
    pub mime_type: String,
}

/// Collects the files of one upload. Blobs are written as files arrive; the
/// records appear all at once in [`BatchBuilder::finish`], and a builder that
/// fails deletes whatever it already wrote.
pub struct BatchBuilder<'a> {
    ctx: &'a AppContext,
    files: Vec<NewFile>,
}

impl<'a> BatchBuilder<'a> {
    pub fn new(ctx: &'a AppContext) -> Self {
        Self {
            ctx,
            files: Vec::new(),
        }
    }

    pub async fn add_file(
        &mut self,
        original_name: String,
        declared_mime: Option<String>,
        body: &mut (dyn AsyncRead + Send + Unpin),
    ) -> AppResult<()> {
        if original_name.trim().is_empty() {
            return Err(AppError::InvalidFileName);
        }

        let head = read_chunk(body, SNIFF_BYTES).await?;
        let mime_type = declared_mime
            .filter(|mime| !mime.is_empty() && mime != FALLBACK_MIME)
            .or_else(|| infer::get(&head).map(|kind| kind.mime_type().to_string()))
            .unwrap_or_else(|| FALLBACK_MIME.to_string());

        let key = stored_name(&original_name);
        let mut content = head.as_slice().chain(body);
        let size = self.ctx.blobs.write(&key, &mut content).await?;

        tracing::debug!(stored_name = %key, size, "stored upload `{original_name}`");
        self.files.push(NewFile {
            id: record_id(),
            original_name,
            stored_name: key,
            size: size as i64,
            mime_type,
        });
        Ok(())
    }

    pub async fn finish(self, options: UploadOptions) -> AppResult<UploadResponse> {
        match self.insert(&options).await {
            Ok(response) => Ok(response),
            Err(why) => {
                self.discard().await;
                Err(why)
            }
        }
    }

    /// Deletes every blob written so far.
    pub async fn discard(self) {
        for file in &self.files {
            if let Err(why) = self.ctx.blobs.delete(&file.stored_name).await {
                tracing::error!("failed to remove orphaned blob `{}`: {why:?}", file.stored_name);
            }
        }
    }

    async fn insert(&self, options: &UploadOptions) -> AppResult<UploadResponse> {
        if self.files.is_empty() {
            return Err(AppError::EmptyUpload);
        }

        let now = Utc::now();
        let expires_at = match &options.expires_at {
            Some(raw) => parse_expiry(raw)?,
            None => now + Duration::days(self.ctx.cfg.lifecycle.default_expiry_days),
        };

        let password_hash = match &options.password {
            Some(password) => Some(gate::hash_password(password)?),
            None => None,
        };

        let mut batch = NewBatch {
            token: self.first_token(options.custom_link.as_deref()).await?,
            policy: BatchPolicy {
                password_hash,
                expires_at: Some(expires_at),
                one_time_view: options.one_time_view,
            },
            files: self.files.clone(),
            created_at: now,
        };

        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.ctx.records.insert_batch(&batch).await {
                Ok(()) => break,
                Err(AppError::TokenTaken) if attempts < TOKEN_ATTEMPTS => {
                    tracing::debug!(token = %batch.token, "token taken, drawing another one");
                    batch.token = link_token();
                }
                Err(why) => return Err(why),
            }
        }

        self.ctx.cache.invalidate(&batch.token).await;
        tracing::info!(
            token = %batch.token,
            files = batch.files.len(),
            one_time_view = batch.policy.one_time_view,
            protected = batch.policy.password_hash.is_some(),
            "batch created"
        );

        Ok(self.response(batch))
    }

    /// The requested custom link if it is valid and free, else a random one.
    async fn first_token(&self, custom_link: Option<&str>) -> AppResult<String> {
        let Some(custom_link) = custom_link else {
            return Ok(link_token());
        };

        if !is_valid_custom_link(custom_link) {
            return Err(AppError::Validation(
                "Custom links may only use letters, digits, '-' and '_' (up to 50 characters)."
                    .to_string(),
            ));
        }

        if self.ctx.records.token_exists(custom_link).await? {
            tracing::debug!("custom link `{custom_link}` is taken, using a random one");
            return Ok(link_token());
        }

        Ok(custom_link.to_string())
    }

    fn response(&self, batch: NewBatch) -> UploadResponse {
        let public_url = self.ctx.cfg.general.public_url.trim_end_matches('/');
        let total_size = batch.files.iter().map(|file| file.size).sum();

        UploadResponse {
            share_link: format!("{public_url}/download/{}", batch.token),
            download_url: format!("{public_url}/file/{}/download", batch.token),
            expires_at: batch.policy.expires_at,
            one_time_view: batch.policy.one_time_view,
            has_password: batch.policy.password_hash.is_some(),
            total_files: batch.files.len(),
            total_size,
            files: batch
                .files
                .into_iter()
                .map(|file| UploadedFile {
                    id: file.id,
                    original_name: file.original_name,
                    size: file.size,
                    mime_type: file.mime_type,
                })
                .collect(),
            token: batch.token,
        }
    }
}
