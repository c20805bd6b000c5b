use std::path::PathBuf;

use axum::async_trait;
use tokio::{
    fs::{self, File},
    io::{self, AsyncRead, AsyncWriteExt},
};

use crate::{
    errors::{AppError, AppResult},
    utilities::{read_chunk, CHUNK_SIZE},
};

pub type BlobReader = Box<dyn AsyncRead + Send + Unpin>;

/// Uploaded bytes addressed by `stored_name`. Each key is written once, read
/// any number of times and deleted once.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn exists(&self, key: &str) -> AppResult<bool>;

    /// Returns the number of bytes written.
    async fn write(&self, key: &str, body: &mut (dyn AsyncRead + Send + Unpin)) -> AppResult<u64>;

    /// Fails with `AppError::BlobMissing` when nothing is stored under `key`.
    async fn open_read(&self, key: &str) -> AppResult<BlobReader>;

    /// Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> AppResult<()>;
}

pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub async fn open(root: impl Into<PathBuf>) -> AppResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn path_of(&self, key: &str) -> AppResult<PathBuf> {
        let valid = !key.is_empty()
            && key != "."
            && key != ".."
            && !key.contains(['/', '\\', '\0']);
        if !valid {
            return Err(AppError::Other(anyhow::anyhow!("invalid blob key `{key}`")));
        }

        Ok(self.root.join(key))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn exists(&self, key: &str) -> AppResult<bool> {
        let path = self.path_of(key)?;
        Ok(fs::try_exists(path).await?)
    }

    async fn write(&self, key: &str, body: &mut (dyn AsyncRead + Send + Unpin)) -> AppResult<u64> {
        let path = self.path_of(key)?;
        let mut file = File::options()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        let mut total_bytes = 0;

        loop {
            let chunk = read_chunk(body, CHUNK_SIZE).await?;
            total_bytes += chunk.len() as u64;

            file.write_all(&chunk).await?;
            if chunk.len() < CHUNK_SIZE {
                break;
            }
        }

        file.flush().await?;
        Ok(total_bytes)
    }

    async fn open_read(&self, key: &str) -> AppResult<BlobReader> {
        let path = self.path_of(key)?;
        match File::open(&path).await {
            Ok(file) => Ok(Box::new(file)),
            Err(why) if why.kind() == io::ErrorKind::NotFound => {
                Err(AppError::BlobMissing(key.to_string()))
            }
            Err(why) => Err(why.into()),
        }
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let path = self.path_of(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(why) if why.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(why) => Err(why.into()),
        }
    }
}
