use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::io::ErrorKind;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::admin::AdminError;
use crate::blobs::BlobError;
use crate::catalog::CatalogError;
use crate::compositor::{self, PosterText};
use crate::copywriter;
use crate::drafts::{DraftStore, DraftView};
use crate::error::PipelineError;
use crate::models::{
    BackgroundBody, ComposeBody, CopyBody, CreateDraftBody, DraftUpdate, GenerateBody, GenerationRequest,
    PhotoBody, PhotoCheck, PipelineResponse, PosterCopy, PosterTemplate, SynthesizeBody,
};
use crate::normalizer::normalize;
use crate::orchestrator::Studio;
use crate::payload::sniff_mime;
use crate::progress::StageLog;

/// Request bodies carry base64 photos, well past axum's 2 MiB default.
const BODY_LIMIT: usize = 32 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub studio: Studio,
    pub drafts: DraftStore,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Admin(#[from] AdminError),
    #[error(transparent)]
    Blob(#[from] BlobError),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    /// Generation of a stored draft failed; the draft is echoed back so the form can be restored.
    #[error("{error}")]
    DraftGeneration { error: PipelineError, draft: Box<DraftView> },
}

fn pipeline_status(err: &PipelineError) -> (StatusCode, &'static str) {
    match err {
        PipelineError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
        PipelineError::TemplateNotFound(_) => (StatusCode::NOT_FOUND, "TEMPLATE_NOT_FOUND"),
        PipelineError::TemplateDownload { .. } => (StatusCode::BAD_GATEWAY, "TEMPLATE_DOWNLOAD_FAILED"),
        PipelineError::Synthesis(_) => (StatusCode::BAD_GATEWAY, "SYNTHESIS_FAILED"),
        PipelineError::Speculative(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
    }
}

fn blob_status(err: &BlobError) -> (StatusCode, &'static str) {
    match err {
        BlobError::InvalidName(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
        BlobError::Io(e) if e.kind() == ErrorKind::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        BlobError::Io(_) | BlobError::Payload(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::Pipeline(e) | AppError::DraftGeneration { error: e, .. } => pipeline_status(e),
            AppError::Admin(AdminError::Invalid(_)) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            AppError::Admin(AdminError::Pipeline(e)) => pipeline_status(e),
            AppError::Admin(AdminError::Catalog(CatalogError::NotFound(_))) => {
                (StatusCode::NOT_FOUND, "TEMPLATE_NOT_FOUND")
            }
            AppError::Admin(AdminError::Catalog(_)) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            AppError::Admin(AdminError::Blob(e)) | AppError::Blob(e) => blob_status(e),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
        };

        if status.is_server_error() {
            tracing::error!(code, "❌ {}", self);
        } else {
            tracing::warn!(code, "⚠️ {}", self);
        }

        let mut body = json!({ "error": self.to_string(), "code": code });
        if let AppError::DraftGeneration { draft, .. } = &self {
            body["draft"] = serde_json::to_value(draft.as_ref()).unwrap_or(Value::Null);
        }
        (status, Json(body)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/templates", get(list_templates))
        .route("/api/synthesize", post(synthesize))
        .route("/api/compose", post(compose))
        .route("/api/generate", post(generate))
        .route("/api/copy", post(poster_copy))
        .route("/api/photo/validate", post(validate_photo))
        .route("/api/drafts", post(create_draft))
        .route("/api/drafts/:id", get(get_draft).patch(update_draft).delete(delete_draft))
        .route("/api/drafts/:id/generate", post(generate_draft))
        .route("/api/blobs/*name", get(serve_blob))
        .route("/admin/templates/:id/images", post(upload_template_image))
        .route("/admin/templates/:id/background", post(generate_background))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "demoMode": state.studio.config().demo_mode(),
        "templates": state.studio.templates().len(),
        "drafts": state.drafts.len(),
    }))
}

pub async fn list_templates(State(state): State<AppState>) -> Json<Vec<PosterTemplate>> {
    Json(state.studio.templates())
}

pub async fn synthesize(
    State(state): State<AppState>,
    Json(body): Json<SynthesizeBody>,
) -> Result<Json<PipelineResponse>, AppError> {
    tracing::info!("🚀 Speculative synthesis for {}", body.template_ref);
    let log = StageLog::default();
    let image = state
        .studio
        .synthesize(&body.photo, &body.template_ref, &body.costume, body.strategy, &log)
        .await?;
    Ok(Json(PipelineResponse { image, log: log.lines() }))
}

pub async fn compose(Json(body): Json<ComposeBody>) -> Json<PipelineResponse> {
    let image = compositor::compose(
        &body.base_image,
        PosterText {
            name: &body.name,
            title: &body.title,
            tagline: &body.tagline,
            plot: &body.plot,
            credits: &body.credits,
        },
    );
    Json(PipelineResponse { image, log: vec!["Composing text…".to_string()] })
}

pub async fn generate(
    State(state): State<AppState>,
    Json(body): Json<GenerateBody>,
) -> Result<Json<PipelineResponse>, AppError> {
    let GenerateBody { mut request, pre_synthesized } = body;
    tracing::info!(template_id = %request.template_id, "🚀 Full generation");
    if let Some(image) = pre_synthesized {
        state.studio.attach_presynthesized(&mut request, image)?;
    }
    let log = StageLog::default();
    let image = state.studio.full_generate(&request, &log).await?;
    Ok(Json(PipelineResponse { image, log: log.lines() }))
}

pub async fn poster_copy(
    State(state): State<AppState>,
    Json(body): Json<CopyBody>,
) -> Result<Json<PosterCopy>, AppError> {
    let template = state.studio.template(&body.template_id)?;
    let copy = copywriter::generate_poster_copy(
        state.studio.model(),
        &state.studio.config().text_model,
        &template.title,
        body.tone,
    )
    .await;
    Ok(Json(copy))
}

pub async fn validate_photo(State(state): State<AppState>, Json(body): Json<PhotoBody>) -> Json<PhotoCheck> {
    let config = state.studio.config();
    let photo = normalize(&body.photo, config.max_photo_dimension);
    Json(copywriter::validate_photo(state.studio.model(), &config.vision_model, &photo).await)
}

pub async fn create_draft(
    State(state): State<AppState>,
    Json(body): Json<CreateDraftBody>,
) -> Result<(StatusCode, Json<DraftView>), AppError> {
    let template = state.studio.template(&body.template_id)?;
    let draft = state.drafts.create(GenerationRequest::for_template(&template));
    tracing::info!(draft_id = %draft.id, template_id = %template.id, "📝 Draft created");
    Ok((StatusCode::CREATED, Json(draft.view())))
}

pub async fn get_draft(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<DraftView>, AppError> {
    state
        .drafts
        .get(&id)
        .map(|d| Json(d.view()))
        .ok_or_else(|| AppError::NotFound(format!("draft {id} not found")))
}

pub async fn update_draft(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(update): Json<DraftUpdate>,
) -> Result<Json<DraftView>, AppError> {
    let studio = state.studio.clone();
    let draft = state
        .drafts
        .modify(&id, |request| {
            update.apply(request);
            if let Err(e) = studio.prewarm(request) {
                tracing::warn!(draft_id = %id, "⚠️ Pre-generation not started: {}", e);
            }
        })
        .ok_or_else(|| AppError::NotFound(format!("draft {id} not found")))?;
    Ok(Json(draft.view()))
}

pub async fn delete_draft(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<StatusCode, AppError> {
    if state.drafts.remove(&id) {
        tracing::info!(draft_id = %id, "🗑️ Draft discarded");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("draft {id} not found")))
    }
}

pub async fn generate_draft(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<PipelineResponse>, AppError> {
    let draft = state
        .drafts
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("draft {id} not found")))?;

    tracing::info!(draft_id = %id, "🚀 Generating poster for draft");
    let log = StageLog::default();
    match state.studio.full_generate(&draft.request, &log).await {
        Ok(image) => Ok(Json(PipelineResponse { image, log: log.lines() })),
        Err(error) => {
            // a failed synthesis must not be replayed from the cached handle on retry
            let retryable = matches!(
                error,
                PipelineError::Synthesis(_) | PipelineError::TemplateDownload { .. } | PipelineError::Speculative(_)
            );
            let draft = state
                .drafts
                .modify(&id, |request| {
                    if retryable && request.speculative.as_ref().is_some_and(|h| h.is_finished()) {
                        request.speculative = None;
                    }
                })
                .unwrap_or(draft);
            Err(AppError::DraftGeneration { error, draft: Box::new(draft.view()) })
        }
    }
}

pub async fn serve_blob(Path(name): Path<String>, State(state): State<AppState>) -> Result<Response, AppError> {
    let bytes = state.studio.blobs.read(&name).await?;
    let mime = sniff_mime(&bytes);
    Ok(([(header::CONTENT_TYPE, mime)], bytes).into_response())
}

pub async fn upload_template_image(
    Path(template_id): Path<String>,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<PosterTemplate>, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let content_type = field.content_type().unwrap_or("application/octet-stream").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("could not read upload: {e}")))?;
        let template = state
            .studio
            .upload_template_image(&template_id, &content_type, &bytes)
            .await?;
        return Ok(Json(template));
    }
    Err(AppError::BadRequest("multipart field 'file' is required".into()))
}

pub async fn generate_background(
    Path(template_id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<BackgroundBody>,
) -> Result<Json<Value>, AppError> {
    tracing::info!(template_id = %template_id, "🎨 Generating template background");
    let log = StageLog::default();
    let template = state
        .studio
        .generate_background(&template_id, &body.prompt, &log)
        .await?;
    Ok(Json(json!({ "template": template, "log": log.lines() })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::tests::{fixture, serving_terminator, Fixture};
    use crate::payload::ImagePayload;
    use crate::test_support::{png_bytes, sample_photo, sample_png, ScriptedHttp, ScriptedModel};
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use pretty_assertions::assert_eq;
    use tower::ServiceExt;

    fn app(f: &Fixture) -> Router {
        router(AppState { studio: f.studio.clone(), drafts: DraftStore::default() })
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn primary_ok() -> ScriptedModel {
        ScriptedModel::new().with_image("gemini-3-pro-image-preview", Ok(sample_png(40, 60)))
    }

    #[tokio::test]
    async fn health_and_templates() {
        let f = fixture(ScriptedModel::new(), ScriptedHttp::new());
        let app = app(&f);
        let (status, body) = send(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["demoMode"], true);

        let (status, body) = send(&app, Method::GET, "/api/templates", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.as_array().unwrap().iter().any(|t| t["id"] == "terminator"));
    }

    #[tokio::test]
    async fn stateless_generate_returns_image_and_log() {
        let f = fixture(primary_ok(), serving_terminator());
        let app = app(&f);
        let (status, body) = send(&app, Method::POST, "/api/generate", Some(json!({
            "photo": sample_photo().to_string(),
            "templateId": "terminator",
            "costume": "leather jacket",
            "tone": "Action",
            "actorName": "ALEX",
            "movieTitle": "CYBORG DOOM"
        })))
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["image"].as_str().unwrap().starts_with("data:image/png;base64,"));
        let log: Vec<&str> = body["log"].as_array().unwrap().iter().filter_map(Value::as_str).collect();
        assert_eq!(log.first(), Some(&"Preparing inputs…"));
        assert_eq!(log.last(), Some(&"Composing text…"));
    }

    #[tokio::test]
    async fn generate_with_presynthesized_image_skips_synthesis() {
        let f = fixture(ScriptedModel::new(), ScriptedHttp::new());
        let app = app(&f);
        let (status, body) = send(&app, Method::POST, "/api/generate", Some(json!({
            "photo": sample_photo().to_string(),
            "templateId": "terminator",
            "actorName": "ALEX",
            "preSynthesized": sample_png(40, 60).to_string()
        })))
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(f.model.image_calls().is_empty());
        assert_eq!(body["log"][0], "Using pre-generated image…");
    }

    #[tokio::test]
    async fn unreachable_template_is_bad_gateway() {
        let f = fixture(ScriptedModel::new(), ScriptedHttp::new());
        let (status, body) = send(&app(&f), Method::POST, "/api/synthesize", Some(json!({
            "photo": sample_photo().to_string(),
            "templateRef": "https://nowhere.test/poster.jpg",
            "strategy": "parody"
        })))
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["code"], "TEMPLATE_DOWNLOAD_FAILED");
        assert!(body["error"].as_str().unwrap().contains("nowhere.test"));
    }

    #[tokio::test]
    async fn missing_name_is_bad_request() {
        let f = fixture(ScriptedModel::new(), ScriptedHttp::new());
        let (status, body) = send(&app(&f), Method::POST, "/api/generate", Some(json!({
            "photo": sample_photo().to_string(),
            "templateId": "terminator"
        })))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn compose_is_offline() {
        let f = fixture(ScriptedModel::new(), ScriptedHttp::new());
        let (status, body) = send(&app(&f), Method::POST, "/api/compose", Some(json!({
            "baseImage": sample_png(40, 60).to_string(),
            "name": "ALEX",
            "title": "CYBORG DOOM"
        })))
        .await;
        assert_eq!(status, StatusCode::OK);
        let image: ImagePayload = body["image"].as_str().unwrap().parse().unwrap();
        assert_eq!(image.mime(), "image/png");
        assert!(f.model.calls().is_empty());
    }

    #[tokio::test]
    async fn compose_draws_plot_and_credits() {
        let f = fixture(ScriptedModel::new(), ScriptedHttp::new());
        let (status, body) = send(&app(&f), Method::POST, "/api/compose", Some(json!({
            "baseImage": sample_png(40, 60).to_string(),
            "title": "CYBORG DOOM",
            "plot": "He came back. Twice.",
            "credits": "DIRECTED BY MAX POWER"
        })))
        .await;
        assert_eq!(status, StatusCode::OK);
        let image: ImagePayload = body["image"].as_str().unwrap().parse().unwrap();
        let expected = compositor::compose(
            &sample_png(40, 60),
            PosterText {
                title: "CYBORG DOOM",
                plot: "He came back. Twice.",
                credits: "DIRECTED BY MAX POWER",
                ..Default::default()
            },
        );
        assert_eq!(image.decode().unwrap(), expected.decode().unwrap());
    }

    #[tokio::test]
    async fn copy_and_photo_validation() {
        let f = fixture(ScriptedModel::new(), ScriptedHttp::new());
        let app = app(&f);
        let (status, body) = send(&app, Method::POST, "/api/copy", Some(json!({ "templateId": "matrix", "tone": "Horror" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["movieTitle"], "EPIC FAIL");

        let (status, _) = send(&app, Method::POST, "/api/copy", Some(json!({ "templateId": "nope" }))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(&app, Method::POST, "/api/photo/validate", Some(json!({ "photo": sample_photo().to_string() }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["valid"], true);
    }

    #[tokio::test]
    async fn draft_lifecycle_with_pre_generation() {
        let f = fixture(primary_ok(), serving_terminator());
        let app = app(&f);

        let (status, draft) = send(&app, Method::POST, "/api/drafts", Some(json!({ "templateId": "terminator" }))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(draft["movieTitle"], "CYBORG DOOM");
        assert_eq!(draft["preGeneration"], "idle");
        let uri = format!("/api/drafts/{}", draft["id"].as_str().unwrap());

        let (status, draft) = send(&app, Method::PATCH, &uri, Some(json!({
            "photo": sample_photo().to_string(),
            "tone": "Action"
        })))
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_ne!(draft["preGeneration"], "idle");

        let (_, _) = send(&app, Method::PATCH, &uri, Some(json!({ "actorName": "ALEX" }))).await;

        let (status, body) = send(&app, Method::POST, &format!("{uri}/generate"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["image"].as_str().unwrap().starts_with("data:image/png"));
        assert_eq!(f.model.image_calls().len(), 1);

        let (status, _) = send(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn failed_draft_generation_returns_the_draft() {
        let f = fixture(ScriptedModel::new(), ScriptedHttp::new());
        let app = app(&f);
        let (_, draft) = send(&app, Method::POST, "/api/drafts", Some(json!({ "templateId": "terminator" }))).await;
        let uri = format!("/api/drafts/{}", draft["id"].as_str().unwrap());
        send(&app, Method::PATCH, &uri, Some(json!({
            "photo": sample_photo().to_string(),
            "actorName": "ALEX",
            "tagline": "I'll be back."
        })))
        .await;

        let (status, body) = send(&app, Method::POST, &format!("{uri}/generate"), None).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["code"], "TEMPLATE_DOWNLOAD_FAILED");
        assert_eq!(body["draft"]["actorName"], "ALEX");
        assert_eq!(body["draft"]["tagline"], "I'll be back.");
        assert_eq!(body["draft"]["preGeneration"], "idle");
    }

    #[tokio::test]
    async fn multipart_upload_is_served_back() {
        let f = fixture(ScriptedModel::new(), ScriptedHttp::new());
        let app = app(&f);
        let boundary = "posterboundary";
        let png = png_bytes(12, 18);
        let mut body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"template_id\"\r\n\r\nmatrix\r\n\
             --{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"poster.png\"\r\n\
             Content-Type: image/png\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(&png);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri("/admin/templates/matrix/images")
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
            .body(Body::from(body))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let template: Value = serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap()).unwrap();
        let cover = template["coverImage"].as_str().unwrap().to_string();
        assert!(cover.starts_with("/api/blobs/templates/matrix_"));

        let response = app
            .clone()
            .oneshot(Request::builder().uri(&cover).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        assert_eq!(to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec(), png);
    }

    #[tokio::test]
    async fn missing_blob_is_not_found() {
        let f = fixture(ScriptedModel::new(), ScriptedHttp::new());
        let (status, body) = send(&app(&f), Method::GET, "/api/blobs/templates/none.png", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn background_generation_route() {
        let f = fixture(primary_ok(), ScriptedHttp::new());
        let (status, body) = send(&app(&f), Method::POST, "/admin/templates/die_hard/background", Some(json!({
            "prompt": "a burning skyscraper"
        })))
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["template"]["coverImage"].as_str().unwrap().starts_with("/api/blobs/templates/die_hard_"));
        assert_eq!(body["log"][0], "Synthesizing…");
    }
}
