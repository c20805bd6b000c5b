use std::{io::Cursor, path::PathBuf, sync::Arc};

use axum::http::StatusCode;
use axum_test::{
    multipart::{MultipartForm, Part},
    TestServer,
};
use chrono::{DateTime, Utc};
use tempfile::TempDir;

use crate::{
    blobs::LocalBlobStore,
    config::Config,
    models::{BatchPolicy, NewBatch, NewFile},
    repository::MemoryRecordStore,
    router,
    upload::UploadResponse,
    AppContext,
};

pub struct TestApp {
    pub server: TestServer,
    pub ctx: AppContext,
    pub temp_dir: PathBuf,
    _dir: TempDir,
}

pub async fn test_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let temp_dir = dir.path().join("temp");

    let mut cfg = Config::default();
    cfg.general.storage_dir = dir.path().join("uploads").to_string_lossy().into_owned();
    cfg.general.temp_dir = temp_dir.to_string_lossy().into_owned();
    cfg.lifecycle.sweep_interval_secs = 0;

    let blobs = Arc::new(LocalBlobStore::open(&cfg.general.storage_dir).await.unwrap());
    tokio::fs::create_dir_all(&temp_dir).await.unwrap();

    let ctx = AppContext::new(cfg, Arc::new(MemoryRecordStore::new()), blobs);
    let server = TestServer::new(router(ctx.clone()).unwrap()).unwrap();

    TestApp {
        server,
        ctx,
        temp_dir,
        _dir: dir,
    }
}

impl TestApp {
    /// Posts `files` to the batch endpoint along with the extra form fields.
    pub async fn upload(&self, files: &[(&str, &[u8])], fields: &[(&str, &str)]) -> UploadResponse {
        let response = self
            .server
            .post("/file/upload-batch")
            .multipart(form(files, fields))
            .await;
        response.assert_status(StatusCode::CREATED);
        response.json::<UploadResponse>()
    }

    pub async fn download_count(&self, token: &str) -> i64 {
        let records = self.ctx.records.find_by_token(token).await.unwrap();
        records[0].download_count
    }

    pub fn temp_files(&self) -> usize {
        std::fs::read_dir(&self.temp_dir).unwrap().count()
    }
}

pub fn form(files: &[(&str, &[u8])], fields: &[(&str, &str)]) -> MultipartForm {
    let mut form = MultipartForm::new();
    for (name, value) in fields {
        form = form.add_text(*name, *value);
    }
    for (file_name, content) in files {
        form = form.add_part("files", Part::bytes(content.to_vec()).file_name(*file_name));
    }
    form
}

/// Inserts a batch straight into the stores. Record ids are `{token}-{i}`
/// and blobs are stored as `{token}-{i}.bin`.
pub async fn seed_batch(
    ctx: &AppContext,
    token: &str,
    expires_at: Option<DateTime<Utc>>,
    contents: &[&[u8]],
) -> NewBatch {
    seed_batch_with(
        ctx,
        token,
        BatchPolicy {
            expires_at,
            ..BatchPolicy::default()
        },
        contents,
    )
    .await
}

pub async fn seed_batch_with(
    ctx: &AppContext,
    token: &str,
    policy: BatchPolicy,
    contents: &[&[u8]],
) -> NewBatch {
    let mut files = Vec::new();
    for (i, content) in contents.iter().enumerate() {
        let stored_name = format!("{token}-{i}.bin");
        let mut body = *content;
        ctx.blobs.write(&stored_name, &mut body).await.unwrap();
        files.push(NewFile {
            id: format!("{token}-{i}"),
            original_name: format!("file{i}.txt"),
            stored_name,
            size: content.len() as i64,
            mime_type: "text/plain".to_string(),
        });
    }

    let batch = NewBatch {
        token: token.to_string(),
        policy,
        files,
        created_at: Utc::now(),
    };
    ctx.records.insert_batch(&batch).await.unwrap();
    batch
}

/// Entry names and uncompressed contents, in archive order.
pub fn read_zip(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
    (0..archive.len())
        .map(|i| {
            let mut entry = archive.by_index(i).unwrap();
            let mut content = Vec::new();
            std::io::Read::read_to_end(&mut entry, &mut content).unwrap();
            (entry.name().to_string(), content)
        })
        .collect()
}
