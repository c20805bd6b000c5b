use axum::{
    extract::{multipart::Field, Multipart},
    http::StatusCode,
    Extension, Json,
};
use futures::TryStreamExt;
use tokio::io;
use tokio_util::io::StreamReader;

use crate::{
    errors::{AppError, AppResult},
    upload::{BatchBuilder, UploadOptions, UploadResponse},
    AppContext,
};

/// Multipart field names that carry file content.
#[derive(Clone, Copy)]
enum FileFields {
    Single,
    Batch,
}

impl FileFields {
    fn accepts(self, name: &str) -> bool {
        match self {
            Self::Single => name == "file",
            Self::Batch => matches!(name, "files" | "files[]" | "file"),
        }
    }
}

#[tracing::instrument(skip_all)]
pub async fn upload_endpoint(
    ctx: Extension<AppContext>,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<UploadResponse>)> {
    let response = handle_upload(&ctx, multipart, FileFields::Single).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

#[tracing::instrument(skip_all)]
pub async fn upload_batch_endpoint(
    ctx: Extension<AppContext>,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<UploadResponse>)> {
    let response = handle_upload(&ctx, multipart, FileFields::Batch).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn handle_upload(
    ctx: &AppContext,
    multipart: Multipart,
    fields: FileFields,
) -> AppResult<UploadResponse> {
    let mut builder = BatchBuilder::new(ctx);
    let mut options = UploadOptions::default();

    if let Err(why) = read_form(&mut builder, &mut options, multipart, fields).await {
        builder.discard().await;
        return Err(why);
    }

    builder.finish(options).await
}

async fn read_form(
    builder: &mut BatchBuilder<'_>,
    options: &mut UploadOptions,
    mut multipart: Multipart,
    fields: FileFields,
) -> AppResult<()> {
    let mut files = 0;

    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if fields.accepts(&name) {
            // the single endpoint keeps only the first file
            if matches!(fields, FileFields::Single) && files > 0 {
                continue;
            }
            store_field(builder, field).await?;
            files += 1;
        } else if !options.set(&name, field.text().await?) {
            tracing::debug!("ignoring unknown form field `{name}`");
        }
    }

    Ok(())
}

async fn store_field(builder: &mut BatchBuilder<'_>, field: Field<'_>) -> AppResult<()> {
    let original_name = field
        .file_name()
        .map(str::to_string)
        .ok_or(AppError::InvalidFileName)?;
    let declared_mime = field.content_type().map(str::to_string);

    let body = field.map_err(|err| io::Error::new(io::ErrorKind::Other, err));
    let mut body_reader = StreamReader::new(body);

    builder
        .add_file(original_name, declared_mime, &mut body_reader)
        .await
}
