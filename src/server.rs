//! HTTP server.
//!
//! Exposes the section store, the upload/camera scanners and the exports as
//! a small form/JSON API. Browser-facing form posts answer with a `303`
//! redirect to `/` and leave a flash message that the next `GET /` returns.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Sections, active section, pending messages |
//! | `POST` | `/` | Create a section (`section` form field) |
//! | `POST` | `/delete_section` | Delete a section |
//! | `GET`  | `/video` | Annotated camera stream (`multipart/x-mixed-replace`) |
//! | `POST` | `/upload` | Decode an uploaded image into the active section |
//! | `POST` | `/delete_code` | Delete one code from a section |
//! | `POST` | `/scan` | Mobile submission: `{code, section?}` |
//! | `POST` | `/bulk_delete` | Delete many codes from a section |
//! | `GET`  | `/get_latest_barcodes` | History as JSON, most recent first |
//! | `GET`  | `/export_csv` | History as a CSV download |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! No authentication. CORS is open so a phone-side page on another origin
//! can post to `/scan`.

use axum::{
    body::Body,
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use futures_util::stream;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use scanbook_core::{History, InsertOutcome, Snapshot, StoreError};

use crate::camera::{self, CaptureDevice, HttpCamera};
use crate::config::Config;
use crate::db;
use crate::decoder::{load_image, BarcodeDecoder, RxingDecoder};
use crate::export::{records_to_csv, CSV_FILE_NAME};
use crate::flash::FlashMessages;
use crate::inventory::Inventory;
use crate::migrate;
use crate::snapshot::SnapshotFile;
use crate::sqlite_store::SqliteStore;

const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub inventory: Arc<Inventory>,
    pub decoder: Arc<dyn BarcodeDecoder>,
    /// `None` when no camera is configured; `/video` then answers 503.
    pub camera: Option<Arc<dyn CaptureDevice>>,
    pub flash: Arc<FlashMessages>,
}

impl AppState {
    pub fn new(config: Config, inventory: Arc<Inventory>) -> Self {
        let camera = config
            .camera
            .clone()
            .map(|c| Arc::new(HttpCamera::new(c)) as Arc<dyn CaptureDevice>);
        Self {
            config: Arc::new(config),
            inventory,
            decoder: Arc::new(RxingDecoder),
            camera,
            flash: Arc::new(FlashMessages::new()),
        }
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn BarcodeDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_camera(mut self, camera: Arc<dyn CaptureDevice>) -> Self {
        self.camera = Some(camera);
        self
    }
}

/// Opens the database, seeds it, and builds the state for `config`.
pub async fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let pool = db::connect(config).await?;
    migrate::migrate_pool(&pool, config).await?;

    let store = SqliteStore::new(pool)
        .with_snapshot_file(SnapshotFile::new(&config.storage.snapshot_path));
    store.write_snapshot().await?;

    let inventory = Inventory::open(Arc::new(store), config.scan.cooldown()).await?;
    let active = inventory.active_section().await;
    info!(
        active = active.as_deref().unwrap_or("none"),
        cooldown_secs = config.scan.cooldown_secs,
        "Inventory ready"
    );
    Ok(AppState::new(config.clone(), Arc::new(inventory)))
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_index).post(handle_create_section))
        .route("/delete_section", post(handle_delete_section))
        .route("/video", get(handle_video))
        .route("/upload", post(handle_upload))
        .route("/delete_code", post(handle_delete_code))
        .route("/scan", post(handle_scan))
        .route("/bulk_delete", post(handle_bulk_delete))
        .route("/get_latest_barcodes", get(handle_latest_barcodes))
        .route("/export_csv", get(handle_export_csv))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` and runs until Ctrl+C/SIGTERM.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = build_state(config).await?;
    let app = router(state);

    let listener = TcpListener::bind(&config.server.bind).await?;
    info!("Listening on http://{}", config.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

// ============ Error response ============

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Store(StoreError::SectionNotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Store(StoreError::DuplicateSection(_)) => StatusCode::CONFLICT,
            AppError::Store(StoreError::InvalidSectionName) => StatusCode::BAD_REQUEST,
            AppError::Store(StoreError::Storage(_)) | AppError::Internal(_) => {
                error!(error = %self, "Request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, self.to_string()).into_response()
    }
}

fn back_to_index() -> Response {
    Redirect::to("/").into_response()
}

// ============ GET / and POST / ============

#[derive(Serialize)]
struct IndexResponse {
    sections: Snapshot,
    active_section: Option<String>,
    messages: Vec<String>,
}

async fn handle_index(State(state): State<AppState>) -> Result<Json<IndexResponse>, AppError> {
    Ok(Json(IndexResponse {
        sections: state.inventory.snapshot().await?,
        active_section: state.inventory.active_section().await,
        messages: state.flash.drain(),
    }))
}

#[derive(Deserialize)]
struct SectionForm {
    section: Option<String>,
}

async fn handle_create_section(
    State(state): State<AppState>,
    Form(form): Form<SectionForm>,
) -> Result<Response, AppError> {
    let Some(raw) = form.section.filter(|s| !s.trim().is_empty()) else {
        return Ok(back_to_index());
    };

    match state.inventory.create_section(&raw).await {
        Ok(name) => state.flash.push(format!(
            "\"{}\" adlı yeni bölüm başarıyla eklendi ve aktif edildi.",
            name
        )),
        Err(StoreError::DuplicateSection(name)) => state.flash.push(format!(
            "\"{}\" adlı bölüm zaten mevcut. Lütfen farklı bir isim girin.",
            name
        )),
        Err(e) => return Err(e.into()),
    }
    Ok(back_to_index())
}

// ============ POST /delete_section ============

async fn handle_delete_section(
    State(state): State<AppState>,
    Form(form): Form<SectionForm>,
) -> Result<Response, AppError> {
    let section = form.section.unwrap_or_default();
    match state.inventory.delete_section(&section).await {
        Ok(_) => state
            .flash
            .push(format!("\"{}\" adlı bölüm silindi.", section)),
        Err(e) if e.is_not_found() => state.flash.push("Silinemedi: Bölüm bulunamadı."),
        Err(e) => return Err(e.into()),
    }
    Ok(back_to_index())
}

// ============ GET /video ============

async fn handle_video(State(state): State<AppState>) -> Result<Response, AppError> {
    let Some(camera) = state.camera.clone() else {
        return Ok((StatusCode::SERVICE_UNAVAILABLE, "Kamera yapılandırılmadı.").into_response());
    };

    let source = camera.open()?;
    let quality = state
        .config
        .camera
        .as_ref()
        .map(|c| c.jpeg_quality)
        .unwrap_or(80);
    let rx = camera::spawn_stream(
        source,
        state.inventory.clone(),
        state.decoder.clone(),
        quality,
    );

    let parts = stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|part| (Ok::<_, std::io::Error>(part), rx))
    });

    Ok((
        [
            (
                header::CONTENT_TYPE,
                format!("multipart/x-mixed-replace; boundary={}", camera::BOUNDARY),
            ),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        Body::from_stream(parts),
    )
        .into_response())
}

// ============ POST /upload ============

async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let upload = match read_image_field(&mut multipart).await {
        Ok(upload) => upload,
        Err(e) => {
            warn!(error = %e, "Malformed upload");
            state.flash.push("Yükleme okunamadı.");
            return Ok(back_to_index());
        }
    };

    let Some((file_name, bytes)) = upload else {
        state.flash.push("Dosya bulunamadı.");
        return Ok(back_to_index());
    };
    if file_name.is_empty() {
        state.flash.push("Dosya seçilmedi.");
        return Ok(back_to_index());
    }

    let saved = save_upload(&state.config.storage.upload_dir, &file_name, &bytes)?;
    info!(path = %saved.display(), size = bytes.len(), "Upload saved");

    let decoder = state.decoder.clone();
    let decoded = tokio::task::spawn_blocking(move || {
        load_image(&bytes).map(|image| decoder.decode(&image))
    })
    .await
    .map_err(|e| anyhow::anyhow!("Decode worker failed: {}", e))?;

    let found = match decoded {
        Ok(found) => found,
        Err(e) => {
            warn!(error = %e, file = %file_name, "Uploaded image could not be opened");
            state.flash.push("Görsel açılamadı.");
            return Ok(back_to_index());
        }
    };

    let codes: Vec<String> = found.into_iter().map(|b| b.code).collect();
    match state.inventory.insert_into_active(&codes).await {
        Ok(added) if !added.is_empty() => state
            .flash
            .push(format!("{} yeni barkod eklendi.", added.len())),
        Ok(_) => state
            .flash
            .push("Yeni barkod bulunamadı ya da zaten kayıtlı."),
        Err(e) if e.is_not_found() => state.flash.push("Bölüm bulunamadı."),
        Err(e) => return Err(e.into()),
    }
    Ok(back_to_index())
}

/// Returns the file name and contents of the first `image` field.
async fn read_image_field(
    multipart: &mut Multipart,
) -> Result<Option<(String, Vec<u8>)>, MultipartError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("image") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await?;
        return Ok(Some((file_name, bytes.to_vec())));
    }
    Ok(None)
}

/// Writes the upload under `dir` using a sanitized file name.
fn save_upload(dir: &Path, file_name: &str, bytes: &[u8]) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(secure_file_name(file_name));
    std::fs::write(&path, bytes)?;
    Ok(path)
}

/// Keeps ASCII letters, digits, `.`, `-` and `_` from the final path
/// component; whitespace becomes `_`. Never returns an empty or dot-leading
/// name.
pub fn secure_file_name(raw: &str) -> String {
    let last = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = last
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') => Some(c),
            c if c.is_whitespace() => Some('_'),
            _ => None,
        })
        .collect();
    let trimmed = cleaned.trim_start_matches(['.', '_']);
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

// ============ POST /delete_code ============

#[derive(Deserialize)]
struct DeleteCodeForm {
    section: Option<String>,
    code: Option<String>,
}

async fn handle_delete_code(
    State(state): State<AppState>,
    Form(form): Form<DeleteCodeForm>,
) -> Result<Response, AppError> {
    let section = form.section.unwrap_or_default();
    let code = form.code.unwrap_or_default();
    match state.inventory.delete_code(&section, &code).await {
        Ok(_) => state.flash.push(format!("{} barkodu silindi.", code)),
        Err(e) if e.is_not_found() => state.flash.push("Bölüm bulunamadı."),
        Err(e) => return Err(e.into()),
    }
    Ok(back_to_index())
}

// ============ POST /scan ============

#[derive(Deserialize)]
struct ScanRequest {
    code: Option<String>,
    section: Option<String>,
}

async fn handle_scan(
    State(state): State<AppState>,
    Json(req): Json<ScanRequest>,
) -> Result<Response, AppError> {
    let invalid = || (StatusCode::BAD_REQUEST, "INVALID SECTION").into_response();

    let Some(code) = req.code.filter(|c| !c.is_empty()) else {
        let section = match req.section {
            Some(section) => Some(section),
            None => state.inventory.active_section().await,
        };
        let known = match section {
            Some(section) => state.inventory.snapshot().await?.get(&section).is_some(),
            None => false,
        };
        if !known {
            return Ok(invalid());
        }
        return Ok((StatusCode::OK, "ALREADY EXISTS").into_response());
    };

    // Without an explicit section the active one is resolved under the same
    // lock as the insert.
    match state.inventory.insert(req.section.as_deref(), &code).await {
        Ok(InsertOutcome::Inserted) => Ok((StatusCode::OK, "OK").into_response()),
        Ok(InsertOutcome::AlreadyExists) => Ok((StatusCode::OK, "ALREADY EXISTS").into_response()),
        Err(e) if e.is_not_found() => Ok(invalid()),
        Err(e) => Err(e.into()),
    }
}

// ============ POST /bulk_delete ============

/// `section` plus repeated `codes` fields; decoded as raw pairs because
/// `serde_urlencoded` does not collect repeated keys into a `Vec`.
async fn handle_bulk_delete(
    State(state): State<AppState>,
    Form(pairs): Form<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    let section = pairs
        .iter()
        .find(|(k, _)| k == "section")
        .map(|(_, v)| v.clone())
        .unwrap_or_default();
    let codes: Vec<String> = pairs
        .into_iter()
        .filter(|(k, _)| k == "codes")
        .map(|(_, v)| v)
        .collect();

    match state.inventory.bulk_delete(&section, &codes).await {
        Ok(removed) => state.flash.push(format!("{} barkod silindi.", removed)),
        Err(e) if e.is_not_found() => state.flash.push("Bölüm bulunamadı."),
        Err(e) => return Err(e.into()),
    }
    Ok(back_to_index())
}

// ============ GET /get_latest_barcodes ============

async fn handle_latest_barcodes(State(state): State<AppState>) -> Result<Json<History>, AppError> {
    Ok(Json(state.inventory.history().await?))
}

// ============ GET /export_csv ============

async fn handle_export_csv(State(state): State<AppState>) -> Result<Response, AppError> {
    let records = state.inventory.records().await?;
    let csv = records_to_csv(&records)?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={}", CSV_FILE_NAME),
            ),
        ],
        csv,
    )
        .into_response())
}

// ============ GET /health ============

/// JSON response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: String,
    /// The crate version from `Cargo.toml`.
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_file_name() {
        assert_eq!(secure_file_name("shelf photo.jpg"), "shelf_photo.jpg");
        assert_eq!(secure_file_name("../../etc/passwd"), "passwd");
        assert_eq!(secure_file_name("C:\\Users\\me\\raf.png"), "raf.png");
        assert_eq!(secure_file_name(".hidden"), "hidden");
        assert_eq!(secure_file_name("çğş.png"), "png");
        assert_eq!(secure_file_name("///"), "upload");
    }
}
