//! HTTP router: upload page, document generation, health check.
//!
//! Generation is CPU-bound (decode, resample, JPEG encode per photo), so the
//! handler only parses the form and hands the work to the blocking pool.

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::api::error::ApiError;
use crate::config::{
    ServerConfig, APP_VERSION, DEFAULT_COLUMNS, DEFAULT_QUALITY, DEFAULT_WHITESPACE_MM,
    DOCX_MIME, OUTPUT_FILENAME,
};
use crate::pipeline::{
    generate, LayoutRequest, PhotoItem, PhotoRenderer, QualityPreset, QualityTable,
    RenderPipeline,
};

/// Response header carrying the layout warning, when there is one.
pub const LAYOUT_WARNING_HEADER: &str = "x-layout-warning";

/// Shared, read-only state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub table: Arc<QualityTable>,
    pub renderer: Arc<dyn PhotoRenderer>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let table = QualityTable::standard().with_original_reference_ppi(config.original_reference_ppi);
        Self {
            table: Arc::new(table),
            renderer: Arc::new(RenderPipeline::standard()),
            config: Arc::new(config),
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;
    Router::new()
        .route("/", get(serve_upload_page))
        .route("/generate-document", post(generate_document))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn serve_upload_page() -> Html<&'static str> {
    Html(UPLOAD_PAGE_HTML)
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub presets: Vec<&'static str>,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: APP_VERSION,
        presets: QualityPreset::ALL.iter().map(|p| p.key()).collect(),
    })
}

/// Raw form fields before validation.
#[derive(Debug, Default)]
struct GenerateForm {
    uploads: Vec<(String, Vec<u8>)>,
    captions: Vec<String>,
    image_quality: Option<String>,
    num_columns: Option<String>,
    whitespace_mm: Option<String>,
    include_captions: bool,
}

async fn read_form(mut multipart: Multipart) -> Result<GenerateForm, ApiError> {
    let mut form = GenerateForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "photos" => {
                let filename = field.file_name().unwrap_or("").to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                // Browsers send one nameless, empty part when nothing was picked.
                if filename.is_empty() {
                    continue;
                }
                form.uploads.push((filename, bytes.to_vec()));
            }
            "caption[]" => {
                let text = field.text().await.map_err(multipart_error)?;
                form.captions.push(text.trim().to_string());
            }
            "image_quality" => {
                form.image_quality = Some(field.text().await.map_err(multipart_error)?);
            }
            "num_columns" => {
                form.num_columns = Some(field.text().await.map_err(multipart_error)?);
            }
            "whitespace_mm" => {
                form.whitespace_mm = Some(field.text().await.map_err(multipart_error)?);
            }
            "include_captions" => {
                form.include_captions = field.text().await.map_err(multipart_error)? == "on";
            }
            _ => {}
        }
    }

    Ok(form)
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge
    } else {
        tracing::warn!("Failed to read multipart body: {}", err.body_text());
        ApiError::BadRequest("Malformed form data".into())
    }
}

/// Parse an optional numeric form field; blank means "use the default".
fn parse_field<T: std::str::FromStr>(
    value: Option<&str>,
    field: &str,
    default: T,
) -> Result<T, ApiError> {
    match value.map(str::trim) {
        None | Some("") => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| ApiError::BadRequest(format!("{field} is not a valid number: {raw}"))),
    }
}

/// `POST /generate-document`: lay out the uploaded photos into a `.docx`.
async fn generate_document(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let form = read_form(multipart).await?;
    if form.uploads.is_empty() {
        return Err(ApiError::NoPhotos);
    }

    let num_columns = parse_field(form.num_columns.as_deref(), "num_columns", DEFAULT_COLUMNS)?;
    let whitespace_mm = parse_field(
        form.whitespace_mm.as_deref(),
        "whitespace_mm",
        DEFAULT_WHITESPACE_MM,
    )?;
    let quality_key = form
        .image_quality
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .unwrap_or(DEFAULT_QUALITY);

    let request = LayoutRequest::new(
        quality_key,
        num_columns,
        whitespace_mm,
        form.include_captions,
        &state.table,
    )?;
    let photos = PhotoItem::pair_with_captions(form.uploads, form.captions);

    tracing::info!(
        photos = photos.len(),
        quality = %request.quality,
        columns = request.num_columns,
        whitespace_mm = request.whitespace_mm,
        captions = request.include_captions,
        "Generation requested"
    );

    let table = state.table.clone();
    let renderer = state.renderer.clone();
    let document = tokio::task::spawn_blocking(move || {
        generate(&request, photos, &table, renderer.as_ref())
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Generation task failed: {e}")))??;

    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{OUTPUT_FILENAME}\""))
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let warning = document.report.geometry_warning();

    let mut response = (StatusCode::OK, document.bytes).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(DOCX_MIME));
    headers.insert(header::CONTENT_DISPOSITION, disposition);
    if let Some(warning) = warning {
        if let Ok(value) = HeaderValue::from_str(&warning.message()) {
            headers.insert(LAYOUT_WARNING_HEADER, value);
        }
    }
    Ok(response)
}

const UPLOAD_PAGE_HTML: &str = r#"<!DOCTYPE html>
<html lang="nl">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>Fotoreportage</title>
  <style>
    * { box-sizing: border-box; }
    body {
      font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', system-ui, sans-serif;
      background: #fafaf9; color: #1c1917; max-width: 640px; margin: 0 auto; padding: 24px;
    }
    h1 { font-size: 24px; margin-bottom: 16px; }
    label { display: block; margin: 12px 0 4px; font-size: 14px; color: #44403c; }
    input, select { width: 100%; padding: 8px; font-size: 14px; }
    input[type=checkbox] { width: auto; }
    .caption { margin-top: 4px; }
    button {
      margin-top: 20px; padding: 12px 20px; font-size: 16px; border: 0;
      background: #2f5496; color: #fff; border-radius: 6px; cursor: pointer;
    }
  </style>
</head>
<body>
  <h1>Fotoreportage maken</h1>
  <form action="/generate-document" method="post" enctype="multipart/form-data">
    <label for="photos">Foto's</label>
    <input id="photos" type="file" name="photos" accept="image/*" multiple>
    <div id="captions"></div>

    <label for="image_quality">Beeldkwaliteit</label>
    <select id="image_quality" name="image_quality">
      <option value="original">Origineel</option>
      <option value="hd">HD (330 ppi)</option>
      <option value="print" selected>Print (220 ppi)</option>
      <option value="web">Web (150 ppi)</option>
      <option value="email">E-mail (96 ppi)</option>
    </select>

    <label for="num_columns">Aantal kolommen</label>
    <input id="num_columns" type="number" name="num_columns" min="1" max="20" value="2">

    <label for="whitespace_mm">Witruimte rond foto's (mm)</label>
    <input id="whitespace_mm" type="number" name="whitespace_mm" min="0" step="0.5" value="5">

    <label><input type="checkbox" name="include_captions"> Bijschriften toevoegen</label>

    <button type="submit">Document genereren</button>
  </form>
  <script>
    document.getElementById('photos').addEventListener('change', function (e) {
      var box = document.getElementById('captions');
      box.innerHTML = '';
      Array.prototype.forEach.call(e.target.files, function (file) {
        var input = document.createElement('input');
        input.type = 'text';
        input.name = 'caption[]';
        input.className = 'caption';
        input.placeholder = 'Bijschrift voor ' + file.name;
        box.appendChild(input);
      });
    });
  </script>
</body>
</html>
"#;
