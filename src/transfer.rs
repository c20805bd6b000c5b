use std::{
    io,
    path::PathBuf,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    task::{Context, Poll, Waker},
    time::Duration,
};

use bytes::Bytes;
use futures::Stream;
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;

use crate::{blobs::BlobReader, utilities::CHUNK_SIZE};

/// Removes a transient file when dropped.
#[derive(Debug)]
pub struct TempPath(PathBuf);

impl TempPath {
    pub fn new(path: PathBuf) -> Self {
        Self(path)
    }

    pub fn path(&self) -> &std::path::Path {
        &self.0
    }
}

impl Drop for TempPath {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.0) {
            Ok(()) => tracing::debug!("removed temp file {}", self.0.display()),
            Err(why) if why.kind() == io::ErrorKind::NotFound => {}
            Err(why) => {
                tracing::warn!("failed to remove temp file ({}): {why:?}", self.0.display())
            }
        }
    }
}

struct Transfer {
    reader: ReaderStream<BlobReader>,
    _temp: Option<TempPath>,
}

enum State {
    Running(Transfer),
    TimedOut,
    Done,
}

struct Shared {
    state: State,
    waker: Option<Waker>,
}

/// Body of a download. A watchdog task owns the deadline: once it passes, the
/// reader and any backing temp file are released whether or not the body is
/// still being polled, and the next poll yields `TimedOut`.
pub struct TransferStream {
    shared: Arc<Mutex<Shared>>,
    watchdog: JoinHandle<()>,
}

impl TransferStream {
    pub fn new(reader: BlobReader, timeout: Duration) -> Self {
        let shared = Arc::new(Mutex::new(Shared {
            state: State::Running(Transfer {
                reader: ReaderStream::with_capacity(reader, CHUNK_SIZE),
                _temp: None,
            }),
            waker: None,
        }));
        let watchdog = tokio::spawn(expire_after(shared.clone(), timeout));

        Self { shared, watchdog }
    }

    pub fn with_temp_file(self, temp: TempPath) -> Self {
        let mut shared = lock(&self.shared);
        match &mut shared.state {
            State::Running(transfer) => transfer._temp = Some(temp),
            _ => drop(temp),
        }
        drop(shared);
        self
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn expire_after(shared: Arc<Mutex<Shared>>, timeout: Duration) {
    tokio::time::sleep(timeout).await;

    let (abandoned, waker) = {
        let mut shared = lock(&shared);
        if !matches!(shared.state, State::Running(_)) {
            return;
        }
        let abandoned = std::mem::replace(&mut shared.state, State::TimedOut);
        (abandoned, shared.waker.take())
    };

    tracing::warn!("transfer exceeded {}s, releasing it", timeout.as_secs());
    drop(abandoned);
    if let Some(waker) = waker {
        waker.wake();
    }
}

impl Stream for TransferStream {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut shared = lock(&self.shared);

        if matches!(shared.state, State::TimedOut) {
            shared.state = State::Done;
            return Poll::Ready(Some(Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "transfer took too long",
            ))));
        }

        let next = match &mut shared.state {
            State::Running(transfer) => Pin::new(&mut transfer.reader).poll_next(cx),
            State::TimedOut | State::Done => return Poll::Ready(None),
        };

        match &next {
            Poll::Pending => {
                let stale = shared
                    .waker
                    .as_ref()
                    .map_or(true, |waker| !waker.will_wake(cx.waker()));
                if stale {
                    shared.waker = Some(cx.waker().clone());
                }
            }
            Poll::Ready(None) | Poll::Ready(Some(Err(_))) => shared.state = State::Done,
            Poll::Ready(Some(Ok(_))) => {}
        }
        next
    }
}

impl Drop for TransferStream {
    fn drop(&mut self) {
        self.watchdog.abort();
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use tokio::io::AsyncWriteExt;

    use super::*;

    #[tokio::test]
    async fn streams_everything() {
        let payload = vec![1u8; CHUNK_SIZE * 3 + 5];
        let reader: BlobReader = Box::new(std::io::Cursor::new(payload.clone()));
        let mut stream = TransferStream::new(reader, Duration::from_secs(5));

        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(collected, payload);
    }

    #[tokio::test]
    async fn stalled_reader_times_out() {
        let (reader, mut writer) = tokio::io::duplex(64);
        writer.write_all(b"partial").await.unwrap();

        let mut stream = TransferStream::new(Box::new(reader), Duration::from_millis(50));
        assert_eq!(&stream.next().await.unwrap().unwrap()[..], b"partial");

        let err = stream.next().await.unwrap().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(stream.next().await.is_none());
        drop(writer);
    }

    #[tokio::test]
    async fn temp_file_goes_away_with_the_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archive.zip");
        tokio::fs::write(&path, b"zip bytes").await.unwrap();

        let file = tokio::fs::File::open(&path).await.unwrap();
        let stream = TransferStream::new(Box::new(file), Duration::from_secs(5))
            .with_temp_file(TempPath::new(path.clone()));

        assert!(path.exists());
        drop(stream);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn abandoned_transfer_is_released_at_the_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archive.zip");
        tokio::fs::write(&path, b"zip bytes").await.unwrap();

        let file = tokio::fs::File::open(&path).await.unwrap();
        let mut stream = TransferStream::new(Box::new(file), Duration::from_millis(50))
            .with_temp_file(TempPath::new(path.clone()));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!path.exists());

        let err = stream.next().await.unwrap().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(stream.next().await.is_none());
    }
}
