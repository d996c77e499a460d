//! HTTP surface: upload and retrieval handlers

use axum::{
    body::Body,
    extract::{multipart::Field, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::{RelayError, RelayResult};
use crate::state::{content_type_for, FileRecord, RelayState};
use crate::token::generate_file_id;

/// File relay API for managing the HTTP server
#[derive(Clone)]
pub struct FileRelayApi {
    state: RelayState,
}

/// Body returned by both upload endpoints
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub id: String,
    pub url: String,
    /// Extension the file was stored under, without its leading dot
    pub extension: String,
}

/// Request body for base64 uploads
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Base64Upload {
    base64_content: Option<String>,
    file_name: Option<String>,
    mime_type: Option<String>,
}

impl FileRelayApi {
    /// Create a new file relay API
    pub fn new(state: RelayState) -> Self {
        Self { state }
    }

    /// Get the relay state
    pub fn state(&self) -> &RelayState {
        &self.state
    }

    /// Create the axum router with all routes configured
    pub fn router(&self) -> Router {
        Router::new()
            .route("/upload", post(upload_multipart))
            .route("/upload-base64", post(upload_base64))
            .route("/file/:token", get(download))
            .route("/health", get(health_check))
            .with_state(self.state.clone())
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }

    /// Start the relay server
    ///
    /// # Arguments
    /// * `host` - Host to bind to (e.g., "0.0.0.0")
    /// * `port` - Port to bind to (e.g., 3000)
    pub async fn serve(self, host: &str, port: u16) -> crate::Result<()> {
        let addr = format!("{}:{}", host, port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        tracing::info!("File relay listening on {}", addr);

        axum::serve(listener, self.router()).await?;

        Ok(())
    }
}

/// Health check endpoint
async fn health_check(State(state): State<RelayState>) -> impl IntoResponse {
    let count = state.record_count();
    (
        StatusCode::OK,
        format!("File relay running. Stored files: {}", count),
    )
}

/// Multipart upload handler
///
/// The `file` field is streamed to a staging file, then adopted into the
/// store under `<id><extension>`. A failure anywhere removes the staging
/// file and leaves no registry entry behind.
async fn upload_multipart(
    State(state): State<RelayState>,
    mut multipart: Multipart,
) -> RelayResult<Json<UploadResponse>> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| RelayError::Validation(format!("malformed multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let original_name = field.file_name().unwrap_or("upload").to_string();
        let extension = extension_of(&original_name);

        // Identifier and paths are computed before touching the registry
        let id = generate_file_id();
        let staging = state.store().stage(&id);

        if let Err(e) = write_field_to(&mut field, &staging).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(e);
        }

        let stored_name = format!("{}{}", id, extension);
        let stored_path = match state.store().adopt(&staging, &stored_name).await {
            Ok(path) => path,
            Err(e) => {
                let _ = tokio::fs::remove_file(&staging).await;
                return Err(e);
            }
        };

        state.register(FileRecord {
            id: id.clone(),
            stored_path,
            original_name: original_name.clone(),
        })?;

        let url = state.file_url(&id, &extension);
        tracing::info!("Stored {} as {}", original_name, url);

        return Ok(Json(UploadResponse {
            id,
            url,
            extension: extension.trim_start_matches('.').to_string(),
        }));
    }

    Err(RelayError::Validation("no file uploaded".to_string()))
}

/// Stream one multipart field to disk without buffering it in memory
async fn write_field_to(field: &mut Field<'_>, path: &std::path::Path) -> RelayResult<()> {
    let mut out = tokio::fs::File::create(path)
        .await
        .map_err(|e| RelayError::Storage(format!("failed to create staging file: {}", e)))?;

    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| RelayError::Validation(format!("failed to read upload stream: {}", e)))?
    {
        out.write_all(&chunk)
            .await
            .map_err(|e| RelayError::Storage(format!("failed to write upload: {}", e)))?;
    }

    out.flush()
        .await
        .map_err(|e| RelayError::Storage(format!("failed to flush upload: {}", e)))?;
    Ok(())
}

/// Base64 upload handler
///
/// Accepts `{base64Content, fileName, mimeType?}`. The extension comes from
/// the filename's suffix when present, otherwise from the MIME subtype.
async fn upload_base64(
    State(state): State<RelayState>,
    Json(req): Json<Base64Upload>,
) -> RelayResult<Json<UploadResponse>> {
    let content = req
        .base64_content
        .ok_or_else(|| RelayError::Validation("base64Content is required".to_string()))?;
    let original_name = req
        .file_name
        .ok_or_else(|| RelayError::Validation("fileName is required".to_string()))?;

    // Strip a data URL header, e.g. "data:image/png;base64,iVBOR..."
    let encoded = match content.split_once("base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => content.as_str(),
    };

    let bytes = BASE64_STANDARD
        .decode(encoded.trim())
        .map_err(|e| RelayError::Decode(format!("invalid base64 content: {}", e)))?;

    let mut extension = extension_of(&original_name);
    if extension.is_empty() {
        if let Some(mime) = req.mime_type.as_deref() {
            extension = extension_from_mime(mime);
        }
    }

    let id = generate_file_id();
    let stored_name = format!("{}{}", id, extension);
    let stored_path = state.store().save(&bytes, &stored_name).await?;

    state.register(FileRecord {
        id: id.clone(),
        stored_path,
        original_name,
    })?;

    let url = state.file_url(&id, &extension);
    tracing::info!("Stored base64 upload as {}", url);

    Ok(Json(UploadResponse {
        id,
        url,
        extension: extension.trim_start_matches('.').to_string(),
    }))
}

/// Download handler
///
/// An unknown identifier and a vanished file both answer 404; the caller
/// only learns that the link is dead.
async fn download(
    State(state): State<RelayState>,
    Path(token): Path<String>,
) -> RelayResult<Response> {
    let record = state
        .resolve(&token)
        .ok_or_else(|| RelayError::NotFound("file not found".to_string()))?;

    let file = state.store().open(&record.stored_path).await?;

    let mime_type = content_type_for(&record.original_name);
    let stream = ReaderStream::new(file);
    let body = Body::from_stream(stream);

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!(
                "attachment; filename=\"{}\"",
                disposition_filename(&record.original_name)
            ),
        )
        .body(body)
        .map_err(|e| RelayError::Storage(format!("failed to build response: {}", e)))?;

    Ok(response)
}

/// Filename safe to embed in a quoted Content-Disposition parameter.
/// Double quotes and control characters would terminate or mangle the
/// header value, so they are dropped.
fn disposition_filename(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '"' && !c.is_control())
        .collect()
}

/// Extension of a filename including its leading dot, or empty if none
fn extension_of(file_name: &str) -> String {
    std::path::Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default()
}

/// Synthesize an extension from a MIME type's subtype, e.g. image/png -> .png
fn extension_from_mime(mime: &str) -> String {
    mime.split(';')
        .next()
        .unwrap_or(mime)
        .split_once('/')
        .map(|(_, subtype)| subtype.trim())
        .filter(|subtype| !subtype.is_empty())
        .map(|subtype| format!(".{}", subtype))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::BlobStore;
    use crate::token::ID_LENGTH;
    use axum_test::multipart::{MultipartForm, Part};
    use axum_test::TestServer;
    use serde_json::{json, Value};

    async fn test_server() -> (TestServer, FileRelayApi, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path()).await.unwrap();
        let state = RelayState::new(store, "http://localhost:3000".to_string());
        let api = FileRelayApi::new(state);
        let server = TestServer::new(api.router()).unwrap();
        (server, api, dir)
    }

    #[test]
    fn test_disposition_filename() {
        assert_eq!(disposition_filename("a.txt"), "a.txt");
        assert_eq!(disposition_filename("we\"ird.txt"), "weird.txt");
        assert_eq!(disposition_filename("line\r\nbreak.txt"), "linebreak.txt");
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("a.txt"), ".txt");
        assert_eq!(extension_of("archive.tar.gz"), ".gz");
        assert_eq!(extension_of("noext"), "");
        assert_eq!(extension_of(".bashrc"), "");
    }

    #[test]
    fn test_extension_from_mime() {
        assert_eq!(extension_from_mime("image/png"), ".png");
        assert_eq!(extension_from_mime("text/plain"), ".plain");
        assert_eq!(extension_from_mime("text/plain; charset=utf-8"), ".plain");
        assert_eq!(extension_from_mime("garbage"), "");
    }

    #[tokio::test]
    async fn test_multipart_upload_round_trip() {
        let (server, _api, _dir) = test_server().await;

        let form = MultipartForm::new().add_part(
            "file",
            Part::bytes(b"hey".as_slice())
                .file_name("a.txt")
                .mime_type("text/plain"),
        );
        let response = server.post("/upload").multipart(form).await;
        response.assert_status_ok();

        let body: UploadResponse = response.json();
        assert_eq!(body.id.len(), ID_LENGTH);
        assert_eq!(body.extension, "txt");
        assert_eq!(
            body.url,
            format!("http://localhost:3000/file/{}.txt", body.id)
        );

        let download = server.get(&format!("/file/{}.txt", body.id)).await;
        download.assert_status_ok();
        assert_eq!(download.as_bytes().to_vec(), b"hey".to_vec());
        assert_eq!(download.header("content-type"), "text/plain");
        assert_eq!(
            download.header("content-disposition"),
            "attachment; filename=\"a.txt\""
        );
    }

    #[tokio::test]
    async fn test_download_with_and_without_extension() {
        let (server, _api, _dir) = test_server().await;

        let form = MultipartForm::new().add_part(
            "file",
            Part::bytes(b"pixels".as_slice()).file_name("photo.png"),
        );
        let body: UploadResponse = server.post("/upload").multipart(form).await.json();

        let bare = server.get(&format!("/file/{}", body.id)).await;
        let decorated = server.get(&format!("/file/{}.png", body.id)).await;

        bare.assert_status_ok();
        decorated.assert_status_ok();
        assert_eq!(bare.as_bytes(), decorated.as_bytes());
    }

    #[tokio::test]
    async fn test_multipart_upload_without_file_field() {
        let (server, api, _dir) = test_server().await;

        let form = MultipartForm::new().add_text("note", "not a file");
        let response = server.post("/upload").multipart(form).await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert!(body["error"].is_string());
        assert_eq!(api.state().record_count(), 0);
    }

    #[tokio::test]
    async fn test_base64_upload_round_trip() {
        let (server, _api, _dir) = test_server().await;

        let response = server
            .post("/upload-base64")
            .json(&json!({
                "base64Content": "SGVsbG8=",
                "fileName": "x",
                "mimeType": "text/plain"
            }))
            .await;
        response.assert_status_ok();

        let body: UploadResponse = response.json();
        // "x" carries no extension, so the MIME subtype supplies one
        assert_eq!(body.extension, "plain");
        assert_eq!(
            body.url,
            format!("http://localhost:3000/file/{}.plain", body.id)
        );

        let download = server.get(&format!("/file/{}.plain", body.id)).await;
        download.assert_status_ok();
        assert_eq!(download.text(), "Hello");
        assert_eq!(
            download.header("content-disposition"),
            "attachment; filename=\"x\""
        );
    }

    #[tokio::test]
    async fn test_base64_upload_with_data_url_prefix() {
        let (server, _api, _dir) = test_server().await;

        let response = server
            .post("/upload-base64")
            .json(&json!({
                "base64Content": "data:text/plain;base64,SGVsbG8=",
                "fileName": "greeting.txt"
            }))
            .await;
        response.assert_status_ok();

        let body: UploadResponse = response.json();
        assert_eq!(body.extension, "txt");

        let download = server.get(&format!("/file/{}", body.id)).await;
        assert_eq!(download.text(), "Hello");
    }

    #[tokio::test]
    async fn test_base64_upload_missing_fields() {
        let (server, api, _dir) = test_server().await;

        let missing_content = server
            .post("/upload-base64")
            .json(&json!({ "fileName": "x" }))
            .await;
        missing_content.assert_status(StatusCode::BAD_REQUEST);

        let missing_name = server
            .post("/upload-base64")
            .json(&json!({ "base64Content": "SGVsbG8=" }))
            .await;
        missing_name.assert_status(StatusCode::BAD_REQUEST);

        assert_eq!(api.state().record_count(), 0);
    }

    #[tokio::test]
    async fn test_base64_upload_malformed_content() {
        let (server, api, _dir) = test_server().await;

        let response = server
            .post("/upload-base64")
            .json(&json!({
                "base64Content": "!!! not base64 !!!",
                "fileName": "x.bin"
            }))
            .await;

        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = response.json();
        assert!(body["error"].is_string());
        assert_eq!(api.state().record_count(), 0);
    }

    #[tokio::test]
    async fn test_download_unknown_token() {
        let (server, _api, _dir) = test_server().await;

        let response = server.get("/file/doesnotexist").await;
        response.assert_status(StatusCode::NOT_FOUND);

        let body: Value = response.json();
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_download_vanished_file() {
        let (server, api, _dir) = test_server().await;

        let form = MultipartForm::new().add_part(
            "file",
            Part::bytes(b"short lived".as_slice()).file_name("gone.txt"),
        );
        let body: UploadResponse = server.post("/upload").multipart(form).await.json();

        // Delete the bytes out from under the registry
        let record = api.state().resolve(&body.id).unwrap();
        tokio::fs::remove_file(&record.stored_path).await.unwrap();

        let response = server.get(&format!("/file/{}", body.id)).await;
        response.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_upload_without_filename_extension() {
        let (server, _api, _dir) = test_server().await;

        let form = MultipartForm::new().add_part(
            "file",
            Part::bytes(b"raw".as_slice()).file_name("README"),
        );
        let response = server.post("/upload").multipart(form).await;
        response.assert_status_ok();

        let body: UploadResponse = response.json();
        assert_eq!(body.extension, "");
        assert_eq!(body.url, format!("http://localhost:3000/file/{}", body.id));

        let download = server.get(&format!("/file/{}", body.id)).await;
        download.assert_status_ok();
        assert_eq!(download.header("content-type"), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_download_quotes_in_filename_are_stripped() {
        let (server, _api, _dir) = test_server().await;

        let form = MultipartForm::new().add_part(
            "file",
            Part::bytes(b"tricky".as_slice()).file_name("we\"ird.txt"),
        );
        let body: UploadResponse = server.post("/upload").multipart(form).await.json();

        let download = server.get(&format!("/file/{}", body.id)).await;
        download.assert_status_ok();
        assert_eq!(
            download.header("content-disposition"),
            "attachment; filename=\"weird.txt\""
        );
    }

    #[tokio::test]
    async fn test_health_check() {
        let (server, _api, _dir) = test_server().await;
        let response = server.get("/health").await;
        response.assert_status_ok();
        assert!(response.text().contains("Stored files: 0"));
    }

    #[tokio::test]
    async fn test_staging_files_are_cleaned_up() {
        let (server, _api, dir) = test_server().await;

        let form = MultipartForm::new().add_part(
            "file",
            Part::bytes(b"content".as_slice()).file_name("a.txt"),
        );
        server.post("/upload").multipart(form).await.assert_status_ok();

        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            let name = entry.file_name().to_string_lossy().to_string();
            assert!(!name.ends_with(".part"), "staging file left behind: {}", name);
        }
    }
}
