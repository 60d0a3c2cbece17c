//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.
//!
//! Every handler answers with a success payload or `{ "success": false, "error": ... }`.

use crate::pipeline::{SlideRequest, StageContext};
use crate::web::{
    extract::{ApiJson, OptionalJson},
    protocol::Event,
    registry::ChannelSink,
    session::GenerationSession,
    state::AppState,
};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
};
use course_forge_core::{
    planning::{design_key, research_key},
    Checklist, MaterialStatus, MaterializationError, PlanningError, Stage,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        upload_document_handler,
        run_stage_handler,
        extract_structure_handler,
        materialize_handler,
        update_material_status_handler,
        start_slides_handler,
    ),
    components(
        schemas(
            FailureResponse,
            Event,
            UploadResponse,
            RunStageRequest,
            ExtractStructureRequest,
            StructureResponse,
            MaterializeResponse,
            UpdateStatusRequest,
            UpdateStatusResponse,
            StartSlidesRequest,
            StartSlidesResponse,
        )
    ),
    tags(
        (name = "Course Forge API", description = "Course planning and generation pipeline endpoints.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// The failure shape returned by every endpoint.
#[derive(Serialize, ToSchema)]
pub struct FailureResponse {
    success: bool,
    error: String,
}

/// An error result of a handler, rendered as [`FailureResponse`].
#[derive(Debug)]
pub struct Failure {
    status: StatusCode,
    error: String,
}

impl Failure {
    pub(crate) fn new(status: StatusCode, error: impl ToString) -> Self {
        Self {
            status,
            error: error.to_string(),
        }
    }

    fn bad_request(error: impl ToString) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error)
    }

    fn internal(error: impl ToString) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error)
    }
}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        let body = FailureResponse {
            success: false,
            error: self.error,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<PlanningError> for Failure {
    fn from(e: PlanningError) -> Self {
        let status = match &e {
            PlanningError::MissingDesign(_) | PlanningError::MissingStructure(_) => {
                StatusCode::NOT_FOUND
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e)
    }
}

impl From<MaterializationError> for Failure {
    fn from(e: MaterializationError) -> Self {
        let status = match &e {
            MaterializationError::NotFound(_) => StatusCode::NOT_FOUND,
            MaterializationError::IllegalTransition { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e)
    }
}

#[derive(Serialize, ToSchema)]
pub struct UploadResponse {
    success: bool,
    key: String,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RunStageRequest {
    #[serde(default)]
    course_name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    /// Stages whose completion starts the next stage. Defaults to the server setting.
    #[serde(default)]
    #[schema(value_type = Option<Vec<String>>)]
    auto_advance: Option<Vec<Stage>>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ExtractStructureRequest {
    #[serde(default)]
    course_name: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct StructureResponse {
    success: bool,
    /// Name of the extraction strategy whose output was accepted.
    strategy: String,
    #[schema(value_type = Object)]
    checklist: Checklist,
    rendered: String,
}

#[derive(Serialize, ToSchema)]
pub struct MaterializeResponse {
    success: bool,
    created_count: usize,
    material_ids: Vec<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    #[schema(value_type = String, example = "generating")]
    status: MaterialStatus,
}

#[derive(Serialize, ToSchema)]
pub struct UpdateStatusResponse {
    success: bool,
    #[schema(value_type = String)]
    previous: MaterialStatus,
    #[schema(value_type = String)]
    status: MaterialStatus,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct StartSlidesRequest {
    #[serde(default)]
    course_name: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct StartSlidesResponse {
    success: bool,
    session_id: String,
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Store a source document (`design` or `research`) for a course.
#[utoipa::path(
    put,
    path = "/courses/{course_id}/documents/{kind}",
    request_body(content = String, content_type = "text/plain", description = "The document text."),
    responses(
        (status = 200, description = "Document stored", body = UploadResponse),
        (status = 400, description = "Unknown document kind", body = FailureResponse),
        (status = 500, description = "Internal server error", body = FailureResponse)
    ),
    params(
        ("course_id" = String, Path, description = "The course identifier."),
        ("kind" = String, Path, description = "Either `design` or `research`.")
    )
)]
pub async fn upload_document_handler(
    State(app_state): State<Arc<AppState>>,
    Path((course_id, kind)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<UploadResponse>, Failure> {
    let key = match kind.as_str() {
        "design" => design_key(&course_id),
        "research" => research_key(&course_id),
        other => return Err(Failure::bad_request(format!("unknown document kind '{}'", other))),
    };
    let body = std::str::from_utf8(&body)
        .map_err(|_| Failure::bad_request("document body is not valid UTF-8"))?;

    let key = app_state.objects.put(&key, body).await.map_err(|e| {
        error!("Failed to store {} for course {}: {}", kind, course_id, e);
        Failure::internal(e)
    })?;

    Ok(Json(UploadResponse { success: true, key }))
}

/// Run a pipeline stage and stream its events (and those of any stage it chains into).
///
/// The response is a `text/event-stream`; every SSE `data` field is one event envelope.
#[utoipa::path(
    post,
    path = "/courses/{course_id}/stages/{stage}",
    request_body = RunStageRequest,
    responses(
        (status = 200, description = "Server-sent stream of events", body = Event, content_type = "text/event-stream"),
        (status = 400, description = "Unknown stage", body = FailureResponse)
    ),
    params(
        ("course_id" = String, Path, description = "The course identifier."),
        ("stage" = String, Path, description = "One of research, design, structure, content.")
    )
)]
pub async fn run_stage_handler(
    State(app_state): State<Arc<AppState>>,
    Path((course_id, stage)): Path<(String, String)>,
    OptionalJson(request): OptionalJson<RunStageRequest>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, axum::Error>>>, Failure> {
    let stage: Stage = stage.parse().map_err(Failure::bad_request)?;

    let auto_advance: HashSet<Stage> = match request.auto_advance {
        Some(stages) => stages.into_iter().collect(),
        None => app_state.config.auto_advance.clone(),
    };
    let ctx = StageContext {
        course_name: request.course_name.unwrap_or_else(|| course_id.clone()),
        course_id,
        description: request.description.unwrap_or_default(),
        auto_advance,
    };

    let session_id = Uuid::new_v4().to_string();
    let mut session = GenerationSession::open(app_state.registry.clone(), session_id.clone()).await;
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    app_state
        .registry
        .attach(&session_id, Arc::new(ChannelSink::new(tx)))
        .await
        .map_err(Failure::internal)?;

    info!(
        "Session {}: starting '{}' for course {}.",
        session_id, stage, ctx.course_id
    );
    let orchestrator = app_state.orchestrator.clone();
    tokio::spawn(async move {
        if let Err(e) = orchestrator.run(&mut session, stage, &ctx).await {
            warn!("Session {} ended with an error: {}", session.id(), e);
        }
        session.close().await;
    });

    let stream = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            yield SseEvent::default()
                .event(event.kind.as_str())
                .id(event.sequence.to_string())
                .json_data(&event);
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Extract and store the course structure from the stored documents.
#[utoipa::path(
    post,
    path = "/courses/{course_id}/structure",
    request_body = ExtractStructureRequest,
    responses(
        (status = 200, description = "Structure extracted", body = StructureResponse),
        (status = 404, description = "No design document stored", body = FailureResponse),
        (status = 500, description = "Extraction or persistence failed", body = FailureResponse)
    ),
    params(("course_id" = String, Path, description = "The course identifier."))
)]
pub async fn extract_structure_handler(
    State(app_state): State<Arc<AppState>>,
    Path(course_id): Path<String>,
    OptionalJson(request): OptionalJson<ExtractStructureRequest>,
) -> Result<Json<StructureResponse>, Failure> {
    let course_name = request.course_name.unwrap_or_else(|| course_id.clone());
    let structure = app_state
        .planner
        .extract_course_structure(&course_id, &course_name)
        .await
        .map_err(|e| {
            error!("Structure extraction for course {} failed: {}", course_id, e);
            Failure::from(e)
        })?;

    Ok(Json(StructureResponse {
        success: true,
        strategy: structure.strategy,
        checklist: structure.checklist,
        rendered: structure.rendered,
    }))
}

/// Create one content-material record per checklist item of the stored structure.
#[utoipa::path(
    post,
    path = "/courses/{course_id}/materials",
    responses(
        (status = 201, description = "Materials created", body = MaterializeResponse),
        (status = 404, description = "No structure extracted yet", body = FailureResponse),
        (status = 500, description = "Persistence failed part way", body = FailureResponse)
    ),
    params(("course_id" = String, Path, description = "The course identifier."))
)]
pub async fn materialize_handler(
    State(app_state): State<Arc<AppState>>,
    Path(course_id): Path<String>,
) -> Result<impl IntoResponse, Failure> {
    let report = app_state
        .planner
        .materialize_course(&course_id)
        .await
        .map_err(|e| {
            error!("Materialization for course {} failed: {}", course_id, e);
            Failure::from(e)
        })?;

    let response = MaterializeResponse {
        success: true,
        created_count: report.created_count,
        material_ids: report.material_ids,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// Move a content material along its status lifecycle.
#[utoipa::path(
    patch,
    path = "/materials/{material_id}/status",
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = UpdateStatusResponse),
        (status = 404, description = "Material not found", body = FailureResponse),
        (status = 409, description = "Transition not allowed", body = FailureResponse)
    ),
    params(("material_id" = String, Path, description = "The material identifier."))
)]
pub async fn update_material_status_handler(
    State(app_state): State<Arc<AppState>>,
    Path(material_id): Path<String>,
    ApiJson(request): ApiJson<UpdateStatusRequest>,
) -> Result<Json<UpdateStatusResponse>, Failure> {
    let previous = app_state
        .planner
        .materializer()
        .update_status(&material_id, request.status)
        .await?;

    Ok(Json(UpdateStatusResponse {
        success: true,
        previous,
        status: request.status,
    }))
}

/// Start the multi-agent slide pipeline for a course.
///
/// Generation runs in the background; follow it on `GET /ws/{session_id}`.
#[utoipa::path(
    post,
    path = "/courses/{course_id}/slides",
    request_body = StartSlidesRequest,
    responses(
        (status = 202, description = "Generation started", body = StartSlidesResponse),
        (status = 404, description = "Nothing to generate slides from", body = FailureResponse)
    ),
    params(("course_id" = String, Path, description = "The course identifier."))
)]
pub async fn start_slides_handler(
    State(app_state): State<Arc<AppState>>,
    Path(course_id): Path<String>,
    OptionalJson(request): OptionalJson<StartSlidesRequest>,
) -> Result<impl IntoResponse, Failure> {
    let design = app_state
        .objects
        .get(&design_key(&course_id))
        .await
        .map_err(Failure::internal)?;
    let rendered = match app_state.planner.load_structure(&course_id).await {
        Ok(structure) => Some(structure.rendered),
        Err(PlanningError::MissingStructure(_)) => None,
        Err(e) => return Err(Failure::from(e)),
    };

    let source = match (design, rendered) {
        (Some(design), Some(rendered)) => format!("{}\n\n{}", rendered, design),
        (Some(text), None) | (None, Some(text)) => text,
        (None, None) => {
            return Err(Failure::new(
                StatusCode::NOT_FOUND,
                format!("course {} has no design document or structure", course_id),
            ))
        }
    };
    let slide_request = SlideRequest {
        course_name: request.course_name.unwrap_or_else(|| course_id.clone()),
        course_id,
        source,
    };

    let session_id = Uuid::new_v4().to_string();
    let mut session = GenerationSession::open(app_state.registry.clone(), session_id.clone()).await;
    let pipeline = app_state.slides.clone();
    tokio::spawn(async move {
        // Errors are already reported on the session.
        let _ = pipeline.run(&mut session, &slide_request).await;
        session.close().await;
    });

    info!("Slide generation session {} started.", session_id);
    Ok((
        StatusCode::ACCEPTED,
        Json(StartSlidesResponse {
            success: true,
            session_id,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use crate::test_support::{test_app, ScriptedLlm};
    use crate::web::api_router;
    use axum::{
        body::Body,
        http::{header::CONTENT_TYPE, Request, StatusCode},
        response::Response,
        Router,
    };
    use course_forge_core::materialize::MATERIALS_COLLECTION;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    const DESIGN: &str = "# Go\n## **Module 1 — Basics**\n| **Chapter 1.1: Syntax** |\n";

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        serde_json::from_str(&body_text(response).await).unwrap()
    }

    fn request(method: &str, uri: &str, body: Body) -> Request<Body> {
        Request::builder().method(method).uri(uri).body(body).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn upload_design(app: &Router) {
        let response = app
            .clone()
            .oneshot(request("PUT", "/courses/c1/documents/design", Body::from(DESIGN)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["key"], "courses/c1/design.md");
    }

    fn assert_failure(body: &Value) {
        assert_eq!(body["success"], false);
        assert!(!body["error"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stage_run_accepts_a_missing_body_and_streams_to_completion() {
        let app = api_router(test_app(Arc::new(ScriptedLlm::new(["Go research notes"]))).state);

        let response = app
            .oneshot(request("POST", "/courses/c1/stages/research", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream"));

        let stream = body_text(response).await;
        assert!(stream.contains("event: connection_established"));
        assert!(stream.contains("Go research notes"));
        assert!(stream.contains("event: complete"));
        assert!(!stream.contains("event: error"));
    }

    #[tokio::test]
    async fn unknown_stage_is_a_failure_body() {
        let app = api_router(test_app(Arc::new(ScriptedLlm::default())).state);

        let response = app
            .oneshot(json_request("POST", "/courses/c1/stages/publish", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_failure(&body_json(response).await);
    }

    #[tokio::test]
    async fn malformed_stage_body_is_a_failure_body() {
        let app = api_router(test_app(Arc::new(ScriptedLlm::default())).state);

        let response = app
            .oneshot(request("POST", "/courses/c1/stages/research", Body::from("{not json")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_failure(&body_json(response).await);
    }

    #[tokio::test]
    async fn structure_without_body_or_design_reports_not_found() {
        let app = api_router(test_app(Arc::new(ScriptedLlm::default())).state);

        let response = app
            .oneshot(request("POST", "/courses/c1/structure", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_failure(&body_json(response).await);
    }

    #[tokio::test]
    async fn structure_then_materials_from_an_uploaded_design() {
        let test = test_app(Arc::new(ScriptedLlm::default()));
        let app = api_router(test.state.clone());
        upload_design(&app).await;

        let response = app
            .clone()
            .oneshot(request("POST", "/courses/c1/structure", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let structure = body_json(response).await;
        assert_eq!(structure["success"], true);
        assert_eq!(structure["strategy"], "heuristic");
        assert!(structure["rendered"].as_str().unwrap().contains("Basics"));

        let response = app
            .oneshot(request("POST", "/courses/c1/materials", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let report = body_json(response).await;
        let created = report["created_count"].as_u64().unwrap() as usize;
        assert!(created > 0);
        assert_eq!(test.documents.all(MATERIALS_COLLECTION).await.len(), created);
    }

    #[tokio::test]
    async fn status_update_rejections_use_the_failure_shape() {
        let app = api_router(test_app(Arc::new(ScriptedLlm::default())).state);

        let response = app
            .clone()
            .oneshot(json_request("PATCH", "/materials/x/status", json!({ "status": "bogus" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_failure(&body_json(response).await);

        let response = app
            .clone()
            .oneshot(request("PATCH", "/materials/x/status", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_failure(&body_json(response).await);

        let response = app
            .oneshot(json_request("PATCH", "/materials/x/status", json!({ "status": "generating" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_failure(&body_json(response).await);
    }

    #[tokio::test]
    async fn unknown_document_kind_is_rejected() {
        let test = test_app(Arc::new(ScriptedLlm::default()));
        let app = api_router(test.state.clone());

        let response = app
            .oneshot(request("PUT", "/courses/c1/documents/notes", Body::from("text")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_failure(&body_json(response).await);
    }

    #[tokio::test]
    async fn slides_need_a_source_and_start_in_the_background() {
        let app = api_router(test_app(Arc::new(ScriptedLlm::default())).state);

        let response = app
            .clone()
            .oneshot(request("POST", "/courses/c1/slides", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_failure(&body_json(response).await);

        upload_design(&app).await;
        let response = app
            .oneshot(request("POST", "/courses/c1/slides", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let started = body_json(response).await;
        assert_eq!(started["success"], true);
        assert!(!started["session_id"].as_str().unwrap().is_empty());
    }
}
