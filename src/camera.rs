//! Live capture and the annotated MJPEG stream behind `GET /video`.
//!
//! A [`CaptureDevice`] opens a [`FrameSource`] per stream. [`spawn_stream`]
//! runs the capture loop as its own task: each frame is decoded, new codes
//! go through [`Inventory::record_detection`], and the annotated JPEG is sent
//! to the response as one `multipart/x-mixed-replace` part. The loop ends
//! when the source runs dry or fails, or when the client goes away and the
//! channel closes; the source is dropped with the task.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::body::Bytes;
use tokio::sync::mpsc;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use scanbook_core::DecodedBarcode;

use crate::annotate::{annotate, encode_jpeg};
use crate::config::CameraConfig;
use crate::decoder::{load_image, BarcodeDecoder};
use crate::inventory::Inventory;

pub const BOUNDARY: &str = "frame";

/// A source of encoded still frames.
#[async_trait]
pub trait FrameSource: Send {
    /// Next encoded frame, or `None` once the source is exhausted.
    async fn next_frame(&mut self) -> Result<Option<Vec<u8>>>;
}

/// Opens frame sources, one per stream.
pub trait CaptureDevice: Send + Sync {
    fn open(&self) -> Result<Box<dyn FrameSource>>;
}

/// Polls a camera's HTTP snapshot endpoint (IP webcam `/shot.jpg` style).
pub struct HttpCamera {
    config: CameraConfig,
}

impl HttpCamera {
    pub fn new(config: CameraConfig) -> Self {
        Self { config }
    }
}

impl CaptureDevice for HttpCamera {
    fn open(&self) -> Result<Box<dyn FrameSource>> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build()
            .context("Failed to build camera HTTP client")?;
        let mut ticker = interval(Duration::from_millis(self.config.interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Ok(Box::new(HttpSnapshotSource {
            client,
            url: self.config.snapshot_url.clone(),
            ticker,
        }))
    }
}

struct HttpSnapshotSource {
    client: reqwest::Client,
    url: String,
    ticker: Interval,
}

#[async_trait]
impl FrameSource for HttpSnapshotSource {
    async fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        self.ticker.tick().await;
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("Camera request failed: {}", self.url))?
            .error_for_status()?;
        let bytes = response.bytes().await?;
        Ok(Some(bytes.to_vec()))
    }
}

/// Decodes one encoded frame, returning the annotated JPEG and detections.
pub fn process_frame(
    decoder: &dyn BarcodeDecoder,
    encoded: &[u8],
    jpeg_quality: u8,
) -> Result<(Vec<u8>, Vec<DecodedBarcode>)> {
    let image = load_image(encoded)?;
    let found = decoder.decode(&image);
    let jpeg = encode_jpeg(&annotate(&image, &found), jpeg_quality)?;
    Ok((jpeg, found))
}

/// Wraps a JPEG as one part of the `boundary=frame` multipart stream.
pub fn multipart_part(jpeg: &[u8]) -> Bytes {
    let mut part = Vec::with_capacity(jpeg.len() + 64);
    part.extend_from_slice(b"--");
    part.extend_from_slice(BOUNDARY.as_bytes());
    part.extend_from_slice(b"\r\nContent-Type: image/jpeg\r\n\r\n");
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    Bytes::from(part)
}

/// Starts the capture loop and returns the receiving end of its parts.
pub fn spawn_stream(
    source: Box<dyn FrameSource>,
    inventory: Arc<Inventory>,
    decoder: Arc<dyn BarcodeDecoder>,
    jpeg_quality: u8,
) -> mpsc::Receiver<Bytes> {
    let (tx, rx) = mpsc::channel(2);
    tokio::spawn(run_capture_loop(source, inventory, decoder, jpeg_quality, tx));
    rx
}

async fn run_capture_loop(
    mut source: Box<dyn FrameSource>,
    inventory: Arc<Inventory>,
    decoder: Arc<dyn BarcodeDecoder>,
    jpeg_quality: u8,
    tx: mpsc::Sender<Bytes>,
) {
    info!("Camera stream started");
    loop {
        let next = tokio::select! {
            _ = tx.closed() => {
                debug!("Stream client disconnected");
                break;
            }
            next = source.next_frame() => next,
        };

        let encoded = match next {
            Ok(Some(encoded)) => encoded,
            Ok(None) => {
                info!("Capture source exhausted");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Capture failed, stopping stream");
                break;
            }
        };

        let frame_decoder = decoder.clone();
        let processed = tokio::task::spawn_blocking(move || {
            process_frame(frame_decoder.as_ref(), &encoded, jpeg_quality)
        })
        .await;
        let (jpeg, found) = match processed {
            Ok(Ok(frame)) => frame,
            Ok(Err(e)) => {
                debug!(error = %e, "Skipping undecodable frame");
                continue;
            }
            Err(e) => {
                warn!(error = %e, "Frame worker failed, stopping stream");
                break;
            }
        };

        let now = Instant::now();
        for barcode in &found {
            match inventory.record_detection(&barcode.code, now).await {
                Ok(_) => {}
                Err(e) if e.is_not_found() => {
                    debug!(code = %barcode.code, "No active section for detection");
                }
                Err(e) => warn!(code = %barcode.code, error = %e, "Failed to record detection"),
            }
        }

        if tx.send(multipart_part(&jpeg)).await.is_err() {
            debug!("Stream client disconnected");
            break;
        }
    }
    drop(source);
    info!("Camera stream stopped");
}
