#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use tempfile::TempDir;
use tokio::net::TcpListener;

use scanbook::camera::{CaptureDevice, FrameSource};
use scanbook::config::Config;
use scanbook::decoder::BarcodeDecoder;
use scanbook::server::{self, AppState};
use scanbook_core::{BoundingBox, DecodedBarcode};

pub struct TestApp {
    pub tmp: TempDir,
    pub base: String,
    pub state: AppState,
    pub client: reqwest::Client,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub async fn index(&self) -> serde_json::Value {
        self.client
            .get(self.url("/"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(|state| state).await
}

pub async fn spawn_app_with(customize: impl FnOnce(AppState) -> AppState) -> TestApp {
    let tmp = TempDir::new().unwrap();
    let config = Config::minimal(tmp.path());
    let state = customize(server::build_state(&config).await.unwrap());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = server::router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        tmp,
        base: format!("http://{}", addr),
        state,
        client: reqwest::Client::new(),
    }
}

/// Decoder that "finds" a fixed list of codes in any image.
pub struct FixedDecoder(pub Vec<&'static str>);

impl BarcodeDecoder for FixedDecoder {
    fn decode(&self, _image: &DynamicImage) -> Vec<DecodedBarcode> {
        self.0
            .iter()
            .map(|code| DecodedBarcode {
                code: code.to_string(),
                bounds: BoundingBox {
                    x: 2,
                    y: 2,
                    width: 8,
                    height: 8,
                },
            })
            .collect()
    }
}

/// Capture device replaying a fixed number of frames, then ending.
pub struct ReplayCamera {
    pub frames: usize,
}

struct ReplaySource {
    frames: VecDeque<Vec<u8>>,
}

#[async_trait]
impl FrameSource for ReplaySource {
    async fn next_frame(&mut self) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.frames.pop_front())
    }
}

impl CaptureDevice for ReplayCamera {
    fn open(&self) -> anyhow::Result<Box<dyn FrameSource>> {
        Ok(Box::new(ReplaySource {
            frames: (0..self.frames).map(|_| png_bytes()).collect(),
        }))
    }
}

/// Capture device that never runs out of frames. Flags `dropped` once the
/// source it handed out has been dropped.
pub struct EndlessCamera {
    pub dropped: Arc<AtomicBool>,
}

struct EndlessSource {
    dropped: Arc<AtomicBool>,
}

#[async_trait]
impl FrameSource for EndlessSource {
    async fn next_frame(&mut self) -> anyhow::Result<Option<Vec<u8>>> {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(Some(png_bytes()))
    }
}

impl Drop for EndlessSource {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

impl CaptureDevice for EndlessCamera {
    fn open(&self) -> anyhow::Result<Box<dyn FrameSource>> {
        Ok(Box::new(EndlessSource {
            dropped: self.dropped.clone(),
        }))
    }
}

pub fn png_bytes() -> Vec<u8> {
    let image = RgbImage::from_pixel(32, 32, Rgb([255, 255, 255]));
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

pub fn fixed_decoder(codes: Vec<&'static str>) -> Arc<dyn BarcodeDecoder> {
    Arc::new(FixedDecoder(codes))
}
