use std::{collections::HashSet, fs::File, io, path::Path, time::Duration};

use chrono::Utc;
use tokio_util::io::SyncIoBridge;
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

use crate::{
    blobs::{BlobReader, BlobStore},
    errors::{AppError, AppResult},
    models::ShareRecord,
    transfer::{TempPath, TransferStream},
    utilities::{friendly_id, split_extension},
};

pub struct Archive {
    pub file_name: String,
    pub size: u64,
    pub entries: Vec<String>,
    pub stream: TransferStream,
}

/// Replaces characters that could place an entry outside the archive root.
pub fn sanitize_entry_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    match cleaned.trim() {
        "" | "." | ".." => "file".to_string(),
        _ => cleaned,
    }
}

/// `report.pdf` becomes `report_1.pdf`, then `report_2.pdf`, until unused.
pub fn unique_entry_name(name: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(name) {
        return name.to_string();
    }

    let (base, ext) = split_extension(name);
    (1..)
        .map(|n| match ext {
            Some(ext) => format!("{base}_{n}.{ext}"),
            None => format!("{base}_{n}"),
        })
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| name.to_string())
}

struct PendingEntry {
    name: String,
    reader: SyncIoBridge<BlobReader>,
}

/// Zips every record whose blob still exists, in record order. Missing blobs
/// are skipped; if none are left the result is `ArchiveEmpty`.
pub async fn assemble(
    blobs: &dyn BlobStore,
    records: &[ShareRecord],
    temp_dir: &Path,
    assembly_timeout: Duration,
    stream_timeout: Duration,
) -> AppResult<Archive> {
    let Some(first) = records.first() else {
        return Err(AppError::ArchiveEmpty);
    };
    let token = first.link_token.clone();

    let mut taken = HashSet::new();
    let mut pending = Vec::with_capacity(records.len());

    for record in records {
        let reader = match open_blob(blobs, record).await? {
            Some(reader) => reader,
            None => continue,
        };

        let name = unique_entry_name(&sanitize_entry_name(&record.original_name), &taken);
        taken.insert(name.clone());
        pending.push(PendingEntry {
            name,
            reader: SyncIoBridge::new(reader),
        });
    }

    if pending.is_empty() {
        tracing::error!(token = %token, "none of the batch files exist anymore, nothing to archive");
        return Err(AppError::ArchiveEmpty);
    }

    tokio::fs::create_dir_all(temp_dir).await?;
    let file_name = format!("files_{token}_{}.zip", Utc::now().timestamp());
    let temp = TempPath::new(temp_dir.join(format!("{}_{file_name}", friendly_id(8))));

    let entries: Vec<String> = pending.iter().map(|entry| entry.name.clone()).collect();
    // The blocking job owns the temp file until it returns, so a timed-out
    // job still cleans up after itself.
    let job = tokio::task::spawn_blocking(move || write_zip(temp, pending));

    let (temp, size) = match tokio::time::timeout(assembly_timeout, job).await {
        Ok(joined) => joined.map_err(anyhow::Error::from)??,
        Err(_) => {
            tracing::error!(token = %token, "archive assembly timed out");
            return Err(AppError::Other(anyhow::anyhow!("archive assembly timed out")));
        }
    };

    let file = tokio::fs::File::open(temp.path()).await?;
    let stream = TransferStream::new(Box::new(file), stream_timeout).with_temp_file(temp);

    Ok(Archive {
        file_name,
        size,
        entries,
        stream,
    })
}

async fn open_blob(blobs: &dyn BlobStore, record: &ShareRecord) -> AppResult<Option<BlobReader>> {
    if !blobs.exists(&record.stored_name).await? {
        tracing::warn!(
            token = %record.link_token,
            record = %record.id,
            "blob `{}` not found, leaving it out of the archive",
            record.stored_name
        );
        return Ok(None);
    }

    match blobs.open_read(&record.stored_name).await {
        Ok(reader) => Ok(Some(reader)),
        Err(AppError::BlobMissing(_)) => {
            tracing::warn!(
                token = %record.link_token,
                record = %record.id,
                "blob `{}` vanished while archiving",
                record.stored_name
            );
            Ok(None)
        }
        Err(why) => Err(why),
    }
}

fn write_zip(temp: TempPath, entries: Vec<PendingEntry>) -> AppResult<(TempPath, u64)> {
    let file = File::create(temp.path())?;
    let mut zip = ZipWriter::new(file);

    for mut entry in entries {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        zip.start_file(entry.name, options)?;
        io::copy(&mut entry.reader, &mut zip)?;
    }

    let file = zip.finish()?;
    let size = file.metadata()?.len();
    Ok((temp, size))
}
