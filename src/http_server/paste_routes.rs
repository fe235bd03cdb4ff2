//! Paste HTTP Routes
//!
//! `GET /` help, `POST /` upload, and `GET`/`PUT`/`DELETE /:name`.
//!
//! Form fields are read like a classic HTML form handler would: the query
//! string first, then a `application/x-www-form-urlencoded` or
//! `multipart/form-data` body whose values override it.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    async_trait,
    extract::{DefaultBodyLimit, FromRequest, Multipart, Path, Query, Request, State},
    http::{header, Method, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{delete, get, post, put},
    Form, Router,
};
use tracing::{debug, error};

use super::config::HttpServerConfig;
use crate::paste::{PasteError, PasteResult, PasteService, UploadRequest};

const INTERNAL_ERROR_BODY: &str = "500 - Something bad happened";

// ==================
// Shared State
// ==================

/// State shared across paste handlers
pub struct PasteState {
    pub service: PasteService,
    pub config: HttpServerConfig,
}

impl PasteState {
    pub fn new(service: PasteService, config: HttpServerConfig) -> Self {
        Self { service, config }
    }

    /// Body limit for a request method. Edits may be larger than uploads.
    fn body_limit(&self, method: &Method) -> usize {
        if method == Method::PUT {
            self.config.max_edit_bytes
        } else {
            self.config.max_upload_bytes
        }
    }
}

// ==================
// Form Extraction
// ==================

/// Merged query and body fields of a request.
#[derive(Debug, Default)]
pub struct PasteForm {
    fields: HashMap<String, String>,
}

impl PasteForm {
    /// Removes and returns `key`, or an empty string when absent.
    pub fn take(&mut self, key: &str) -> String {
        self.fields.remove(key).unwrap_or_default()
    }

    fn extend(&mut self, pairs: impl IntoIterator<Item = (String, String)>) {
        self.fields.extend(pairs);
    }
}

#[async_trait]
impl FromRequest<Arc<PasteState>> for PasteForm {
    type Rejection = PasteError;

    async fn from_request(req: Request, state: &Arc<PasteState>) -> Result<Self, Self::Rejection> {
        let limit = state.body_limit(req.method());
        let too_large = || PasteError::PayloadTooLarge(limit as u64);

        let declared = req
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        if declared.is_some_and(|len| len > limit as u64) {
            return Err(too_large());
        }

        let mut form = PasteForm::default();

        if req.uri().query().is_some() {
            let Query(pairs) = Query::<Vec<(String, String)>>::try_from_uri(req.uri())
                .map_err(|e| PasteError::InvalidForm(e.body_text()))?;
            form.extend(pairs);
        }

        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            let mut multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| PasteError::InvalidForm(e.body_text()))?;

            loop {
                let field = match multipart.next_field().await {
                    Ok(Some(field)) => field,
                    Ok(None) => break,
                    Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => return Err(too_large()),
                    Err(e) => return Err(PasteError::InvalidForm(e.body_text())),
                };
                let name = field.name().unwrap_or_default().to_string();
                let value = match field.text().await {
                    Ok(value) => value,
                    Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => return Err(too_large()),
                    Err(e) => return Err(PasteError::InvalidForm(e.body_text())),
                };
                form.fields.insert(name, value);
            }
        } else if content_type.starts_with("application/x-www-form-urlencoded")
            && req.method() != Method::GET
        {
            match Form::<Vec<(String, String)>>::from_request(req, state).await {
                Ok(Form(pairs)) => form.extend(pairs),
                Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => return Err(too_large()),
                Err(e) => return Err(PasteError::InvalidForm(e.body_text())),
            }
        }

        Ok(form)
    }
}

// ==================
// Error Responses
// ==================

impl IntoResponse for PasteError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if self.is_internal() {
            error!(error = %self, "request failed");
            return (status, INTERNAL_ERROR_BODY).into_response();
        }

        debug!(status = status.as_u16(), error = %self, "request rejected");
        (status, format!("{} - {}", status.as_u16(), self)).into_response()
    }
}

/// Runs a store-touching operation off the async workers.
async fn run_blocking<T, F>(f: F) -> PasteResult<T>
where
    F: FnOnce() -> PasteResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PasteError::Internal(format!("Blocking task failed: {}", e)))?
}

// ==================
// Router
// ==================

/// Create paste routes
pub fn paste_routes(state: Arc<PasteState>) -> Router {
    let upload_limit = state.config.max_upload_bytes;
    let edit_limit = state.config.max_edit_bytes;

    Router::new()
        .route("/", get(help_handler))
        .route(
            "/",
            post(upload_handler).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/:name", get(retrieve_handler))
        .route(
            "/:name",
            put(edit_handler).layer(DefaultBodyLimit::max(edit_limit)),
        )
        .route(
            "/:name",
            delete(delete_handler).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .with_state(state)
}

// ==================
// Handlers
// ==================

async fn help_handler(State(state): State<Arc<PasteState>>) -> Result<Html<String>, PasteError> {
    let path = &state.config.help_path;
    let markdown = tokio::fs::read_to_string(path).await.map_err(|e| {
        PasteError::Internal(format!("Failed to read {}: {}", path.display(), e))
    })?;

    Ok(Html(render_markdown(&markdown)))
}

fn render_markdown(markdown: &str) -> String {
    let mut html = String::with_capacity(markdown.len() * 3 / 2);
    pulldown_cmark::html::push_html(&mut html, pulldown_cmark::Parser::new(markdown));
    html
}

async fn upload_handler(
    State(state): State<Arc<PasteState>>,
    mut form: PasteForm,
) -> Result<String, PasteError> {
    let request = UploadRequest {
        data: form.take("f"),
        name: Some(form.take("name")),
        expires_in: form.take("e"),
        access_password: form.take("ap"),
        edit_password: form.take("ep"),
    };

    let service = state.service.clone();
    run_blocking(move || service.upload(request)).await
}

async fn retrieve_handler(
    State(state): State<Arc<PasteState>>,
    Path(name): Path<String>,
    mut form: PasteForm,
) -> Result<String, PasteError> {
    let access_password = form.take("ap");

    let service = state.service.clone();
    let paste = run_blocking(move || service.retrieve(&name, &access_password)).await?;
    Ok(paste.data)
}

async fn edit_handler(
    State(state): State<Arc<PasteState>>,
    Path(name): Path<String>,
    mut form: PasteForm,
) -> Result<StatusCode, PasteError> {
    let data = form.take("f");
    let edit_password = form.take("ep");

    let service = state.service.clone();
    run_blocking(move || service.edit(&name, data, &edit_password)).await?;
    Ok(StatusCode::OK)
}

async fn delete_handler(
    State(state): State<Arc<PasteState>>,
    Path(name): Path<String>,
    mut form: PasteForm,
) -> Result<StatusCode, PasteError> {
    let edit_password = form.take("ep");

    let service = state.service.clone();
    run_blocking(move || service.delete(&name, &edit_password)).await?;
    Ok(StatusCode::OK)
}
