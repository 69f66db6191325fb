//! Background loading on the tokio runtime.
//!
//! A load reads the file in chunks, inflates zstd input, then decodes on the
//! blocking pool. Progress and the final result are delivered as [`LoadEvent`]s
//! through the [`LoadHandle`]. Cancelling (or dropping) the handle ends the
//! load with [`SplatError::Cancelled`]; a decode already running on the
//! blocking pool is allowed to finish and its result is discarded.

use crate::common::is_zstd_frame;
use crate::error::{Result, SplatError};
use crate::structures::{Dataset, ParseOptions};
use async_compression::tokio::bufread::ZstdDecoder;
use log::{debug, info, warn};
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, BufReader};
use tokio::sync::{mpsc, watch};

const READ_CHUNK: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStage {
    Read,
    Decode,
}

#[derive(Debug)]
pub enum LoadEvent {
    Progress { stage: LoadStage, fraction: f32 },
    /// Always the last event of a load.
    Finished(Result<Dataset>),
}

#[derive(Debug)]
pub struct LoadHandle {
    events: mpsc::UnboundedReceiver<LoadEvent>,
    cancel: watch::Sender<bool>,
}

impl LoadHandle {
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// `None` once the terminal event has been taken.
    pub async fn next_event(&mut self) -> Option<LoadEvent> {
        self.events.recv().await
    }

    /// Waits for the result, forwarding progress to `on_progress`.
    pub async fn finish_with(mut self, mut on_progress: impl FnMut(LoadStage, f32)) -> Result<Dataset> {
        while let Some(event) = self.events.recv().await {
            match event {
                LoadEvent::Progress { stage, fraction } => on_progress(stage, fraction),
                LoadEvent::Finished(result) => return result,
            }
        }
        Err(SplatError::Cancelled)
    }

    pub async fn finish(self) -> Result<Dataset> {
        self.finish_with(|_, _| {}).await
    }
}

impl Drop for LoadHandle {
    fn drop(&mut self) {
        self.cancel.send_replace(true);
    }
}

/// Starts loading `path` on the current tokio runtime.
pub fn spawn_load(path: impl Into<PathBuf>, options: ParseOptions) -> LoadHandle {
    let path = path.into();
    let (events_tx, events) = mpsc::unbounded_channel();
    let (cancel, cancel_rx) = watch::channel(false);

    tokio::spawn(async move {
        let result = run_load(&path, options, &events_tx, cancel_rx).await;
        match &result {
            Ok(dataset) => info!(
                "Loaded {} points from '{}'",
                dataset.point_count(),
                path.display()
            ),
            Err(SplatError::Cancelled) => debug!("Load of '{}' cancelled", path.display()),
            Err(e) => warn!("Load of '{}' failed: {}", path.display(), e),
        }
        let _ = events_tx.send(LoadEvent::Finished(result));
    });

    LoadHandle { events, cancel }
}

fn check_cancelled(cancel: &watch::Receiver<bool>) -> Result<()> {
    if *cancel.borrow() {
        Err(SplatError::Cancelled)
    } else {
        Ok(())
    }
}

async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    // A closed channel means the handle is gone, which also cancels.
    let _ = cancel.wait_for(|flag| *flag).await;
}

async fn run_load(
    path: &Path,
    options: ParseOptions,
    events: &mpsc::UnboundedSender<LoadEvent>,
    mut cancel: watch::Receiver<bool>,
) -> Result<Dataset> {
    check_cancelled(&cancel)?;

    let raw = tokio::select! {
        biased;
        _ = cancelled(&mut cancel) => return Err(SplatError::Cancelled),
        raw = read_chunked(path, events) => raw?,
    };

    let ply = if is_zstd_frame(&raw) {
        tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => return Err(SplatError::Cancelled),
            ply = decompress_zstd_async(&raw) => ply?,
        }
    } else {
        raw
    };
    check_cancelled(&cancel)?;

    let decode_events = events.clone();
    let dataset = tokio::task::spawn_blocking(move || {
        crate::decode_ply(&ply, &options, &mut |fraction| {
            let _ = decode_events.send(LoadEvent::Progress {
                stage: LoadStage::Decode,
                fraction,
            });
        })
    })
    .await
    .map_err(|e| SplatError::ReadFailure(io::Error::other(e)))??;

    check_cancelled(&cancel)?;
    Ok(dataset)
}

#[inline(never)]
async fn read_chunked(path: &Path, events: &mpsc::UnboundedSender<LoadEvent>) -> Result<Vec<u8>> {
    let mut file = File::open(path).await?;
    let total = file.metadata().await?.len() as usize;
    let mut raw = Vec::with_capacity(total);
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        let n = file.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        raw.extend_from_slice(&chunk[..n]);
        let fraction = if total == 0 {
            1.0
        } else {
            (raw.len() as f32 / total as f32).min(1.0)
        };
        let _ = events.send(LoadEvent::Progress {
            stage: LoadStage::Read,
            fraction,
        });
    }

    Ok(raw)
}

#[inline(never)]
async fn decompress_zstd_async(data: &[u8]) -> Result<Vec<u8>> {
    let cursor = Cursor::new(data);
    let reader = BufReader::new(cursor);
    let mut decoder = ZstdDecoder::new(reader);
    let mut decompressed = Vec::new();

    decoder
        .read_to_end(&mut decompressed)
        .await
        .map_err(|e| SplatError::Decompress(e.to_string()))?;

    Ok(decompressed)
}

/// Owns at most one in-flight load; starting another cancels it.
#[derive(Debug, Default)]
pub struct Loader {
    current: Option<LoadHandle>,
}

impl Loader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a load and returns the superseded one, already cancelled.
    pub fn start(&mut self, path: impl Into<PathBuf>, options: ParseOptions) -> Option<LoadHandle> {
        let previous = self.current.take();
        if let Some(handle) = &previous {
            handle.cancel();
            debug!("Superseding in-flight load");
        }
        self.current = Some(spawn_load(path, options));
        previous
    }

    pub fn current(&mut self) -> Option<&mut LoadHandle> {
        self.current.as_mut()
    }

    pub fn take(&mut self) -> Option<LoadHandle> {
        self.current.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn classic_ply(count: usize) -> Vec<u8> {
        let mut raw = format!(
            "ply\nformat binary_little_endian 1.0\nelement vertex {}\n\
             property float x\nproperty float y\nproperty float z\n\
             property uchar red\nproperty uchar green\nproperty uchar blue\nend_header\n",
            count
        )
        .into_bytes();
        for i in 0..count {
            for v in [i as f32, i as f32 * 0.5, 0.0] {
                raw.extend_from_slice(&v.to_le_bytes());
            }
            raw.extend_from_slice(&[255, 128, 0]);
        }
        raw
    }

    fn temp_file(name: &str, contents: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "plysplat-loader-{}-{}",
            std::process::id(),
            name
        ));
        fs::write(&path, contents).expect("failed to write temp file");
        path
    }

    #[tokio::test]
    async fn load_reports_progress_then_result() {
        let path = temp_file("progress.ply", &classic_ply(50));
        let mut handle = spawn_load(&path, ParseOptions::default());

        let mut read = Vec::new();
        let mut decode = Vec::new();
        let result = loop {
            match handle.next_event().await.expect("load ended without a result") {
                LoadEvent::Progress {
                    stage: LoadStage::Read,
                    fraction,
                } => read.push(fraction),
                LoadEvent::Progress {
                    stage: LoadStage::Decode,
                    fraction,
                } => {
                    assert_eq!(read.last(), Some(&1.0), "decode before read finished");
                    decode.push(fraction)
                }
                LoadEvent::Finished(result) => break result,
            }
        };
        let _ = fs::remove_file(&path);

        let dataset = result.expect("load failed");
        assert_eq!(dataset.point_count(), 50);
        assert_eq!(dataset.color(0), [1.0, 128.0 / 255.0, 0.0]);
        assert_eq!(decode.last(), Some(&1.0));
        assert!(decode.windows(2).all(|w| w[0] <= w[1]));
        assert!(handle.next_event().await.is_none());
    }

    #[tokio::test]
    async fn zstd_file_loads() {
        let compressed = zstd::stream::encode_all(Cursor::new(classic_ply(8)), 3).unwrap();
        let path = temp_file("compressed.ply.zst", &compressed);
        let result = spawn_load(&path, ParseOptions::default()).finish().await;
        let _ = fs::remove_file(&path);
        assert_eq!(result.expect("load failed").point_count(), 8);
    }

    #[tokio::test]
    async fn cancelled_load_reports_cancelled() {
        let path = temp_file("cancelled.ply", &classic_ply(4));
        let handle = spawn_load(&path, ParseOptions::default());
        handle.cancel();
        assert!(handle.is_cancelled());
        let result = handle.finish().await;
        let _ = fs::remove_file(&path);
        assert!(matches!(result, Err(SplatError::Cancelled)));
    }

    #[tokio::test]
    async fn missing_file_fails() {
        let result = spawn_load("/nonexistent/plysplat.ply", ParseOptions::default())
            .finish()
            .await;
        assert!(matches!(result, Err(SplatError::ReadFailure(_))));
    }

    #[tokio::test]
    async fn newer_load_supersedes_older() {
        let first = temp_file("first.ply", &classic_ply(3));
        let second = temp_file("second.ply", &classic_ply(7));
        let mut loader = Loader::new();

        assert!(loader.start(&first, ParseOptions::default()).is_none());
        let superseded = loader
            .start(&second, ParseOptions::default())
            .expect("first load should be returned");
        assert!(superseded.is_cancelled());

        let stale = superseded.finish().await;
        let fresh = loader.take().expect("current load").finish().await;
        let _ = fs::remove_file(&first);
        let _ = fs::remove_file(&second);

        assert!(matches!(stale, Err(SplatError::Cancelled)));
        assert_eq!(fresh.expect("load failed").point_count(), 7);
        assert!(loader.current().is_none());
    }
}
