//! Axum Handlers for the REST API
//!
//! This module contains the logic for handling HTTP requests for learning goals
//! and diagnostic sessions. It uses `utoipa` doc comments to generate OpenAPI
//! documentation.

use axum::{
    extract::{
        FromRequestParts, Path, Request, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::{StatusCode, request::Parts},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use mentor_core::topic::TopicDraft;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    diagnostic::DiagnosticError,
    models::{
        AnswerPayload, ApiResponse, CreateGoalPayload, CreateTopicsPayload, ErrorResponse,
        FinishResponse, FirstAnswersPayload, FollowupAnswersPayload, FollowupsResponse,
        GenerateTopicsPayload, GeneratedTopicsResponse, LatestSummaryResponse, LearningGoal,
        NewGoal, NextStep, Role, SessionDetails, StartDiagnosticPayload, StartDiagnosticResponse,
        TopicsResponse, TurnResponse,
    },
    state::AppState,
};

const INTERNAL_ERROR_MESSAGE: &str = "An internal server error occurred.";

/// Debug detail of an internal error, carried as a response extension until
/// `error_detail_middleware` decides whether the client may see it.
#[derive(Debug, Clone)]
pub struct ErrorDetail(pub String);

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, detail) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message, None),
            ApiError::Unauthorized(message) => (StatusCode::UNAUTHORIZED, message, None),
            ApiError::Forbidden(message) => (StatusCode::FORBIDDEN, message, None),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message, None),
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    INTERNAL_ERROR_MESSAGE.to_string(),
                    Some(ErrorDetail(format!("{:#}", err))),
                )
            }
        };
        let body = ErrorResponse {
            success: false,
            message,
            detail: None,
        };
        let mut response = (status, Json(body)).into_response();
        if let Some(detail) = detail {
            response.extensions_mut().insert(detail);
        }
        response
    }
}

/// Adds the debug detail of internal errors to the response body, unless the
/// service runs in production.
pub async fn error_detail_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    let Some(ErrorDetail(detail)) = response.extensions_mut().remove::<ErrorDetail>() else {
        return response;
    };
    if state.config.production {
        return response;
    }

    let body = ErrorResponse {
        success: false,
        message: INTERNAL_ERROR_MESSAGE.to_string(),
        detail: Some(detail),
    };
    (response.status(), Json(body)).into_response()
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::InternalServerError(err)
    }
}

impl From<DiagnosticError> for ApiError {
    fn from(err: DiagnosticError) -> Self {
        match err {
            DiagnosticError::NotFound(message) => Self::NotFound(message),
            DiagnosticError::Validation(message) | DiagnosticError::Conflict(message) => {
                Self::BadRequest(message)
            }
            DiagnosticError::Internal(err) => Self::InternalServerError(err),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

/// The authenticated caller, taken from the `x-user-id` and `x-user-role` headers.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: String,
    pub role: Role,
}

impl Caller {
    /// The caller's id, provided they act in `role`.
    pub fn require(&self, role: Role) -> Result<&str, ApiError> {
        if self.role == role {
            Ok(&self.user_id)
        } else {
            Err(ApiError::Forbidden(format!(
                "This endpoint is only available to a {}",
                role
            )))
        }
    }
}

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header(parts, "x-user-id")
            .ok_or_else(|| ApiError::Unauthorized("x-user-id header is required".to_string()))?;
        let role = match header(parts, "x-user-role") {
            Some(role) if role.eq_ignore_ascii_case("student") => Role::Student,
            Some(role) if role.eq_ignore_ascii_case("teacher") => Role::Teacher,
            _ => {
                return Err(ApiError::Unauthorized(
                    "x-user-role header must be `student` or `teacher`".to_string(),
                ));
            }
        };

        Ok(Caller {
            user_id: user_id.to_string(),
            role,
        })
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Loads a goal visible to the caller: its teacher, or the student it is assigned to.
async fn visible_goal(
    state: &AppState,
    caller: &Caller,
    goal_id: Uuid,
) -> Result<LearningGoal, ApiError> {
    state
        .store
        .get_goal(goal_id)
        .await?
        .filter(|goal| match caller.role {
            Role::Teacher => goal.teacher_id == caller.user_id,
            Role::Student => goal.student_id == caller.user_id,
        })
        .ok_or_else(|| ApiError::NotFound("Learning goal not found".to_string()))
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up"))
)]
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Create a learning goal for a student.
#[utoipa::path(
    post,
    path = "/goals",
    request_body = CreateGoalPayload,
    responses(
        (status = 201, description = "Goal created successfully", body = LearningGoal),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 401, description = "Missing caller identity", body = ErrorResponse),
        (status = 403, description = "Caller is not a teacher", body = ErrorResponse)
    ),
    params(
        ("x-user-id" = String, Header, description = "The ID of the teacher"),
        ("x-user-role" = String, Header, description = "Must be `teacher`")
    )
)]
pub async fn create_goal(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    payload: Result<Json<CreateGoalPayload>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let teacher_id = caller.require(Role::Teacher)?;
    let Json(payload) = payload?;

    let title = payload.title.trim();
    let student_id = payload.student_id.trim();
    if title.is_empty() || student_id.is_empty() {
        return Err(ApiError::BadRequest(
            "studentId and title are required".to_string(),
        ));
    }

    let goal = state
        .store
        .create_goal(&NewGoal {
            teacher_id: teacher_id.to_string(),
            student_id: student_id.to_string(),
            title: title.to_string(),
            description: payload.description,
            language: payload
                .language
                .filter(|l| !l.trim().is_empty())
                .unwrap_or_else(|| state.config.default_language.clone()),
            diagnostic_lesson: payload.diagnostic_lesson,
        })
        .await?;

    info!(goal_id = %goal.id, %student_id, "Learning goal created");
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(goal))))
}

/// Get a learning goal.
#[utoipa::path(
    get,
    path = "/goals/{goal_id}",
    responses(
        (status = 200, description = "Goal details", body = LearningGoal),
        (status = 404, description = "Goal not found", body = ErrorResponse)
    ),
    params(
        ("goal_id" = Uuid, Path, description = "Goal ID"),
        ("x-user-id" = String, Header, description = "The ID of the caller"),
        ("x-user-role" = String, Header, description = "`teacher` or `student`")
    )
)]
pub async fn get_goal(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ApiResponse<LearningGoal>>, ApiError> {
    let Path(goal_id) = path?;
    let goal = visible_goal(&state, &caller, goal_id).await?;
    Ok(Json(ApiResponse::ok(goal)))
}

/// List the topics of a learning goal in presentation order.
#[utoipa::path(
    get,
    path = "/goals/{goal_id}/topics",
    responses(
        (status = 200, description = "Ordered topics", body = TopicsResponse),
        (status = 404, description = "Goal not found", body = ErrorResponse)
    ),
    params(
        ("goal_id" = Uuid, Path, description = "Goal ID"),
        ("x-user-id" = String, Header, description = "The ID of the caller"),
        ("x-user-role" = String, Header, description = "`teacher` or `student`")
    )
)]
pub async fn list_topics(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ApiResponse<TopicsResponse>>, ApiError> {
    let Path(goal_id) = path?;
    let goal = visible_goal(&state, &caller, goal_id).await?;
    let topics = state.store.list_topics(goal.id).await?;
    Ok(Json(ApiResponse::ok(TopicsResponse { topics })))
}

/// Append topics to a learning goal.
#[utoipa::path(
    post,
    path = "/goals/{goal_id}/topics",
    request_body = CreateTopicsPayload,
    responses(
        (status = 201, description = "Topics created", body = TopicsResponse),
        (status = 400, description = "No usable topics", body = ErrorResponse),
        (status = 404, description = "Goal not found", body = ErrorResponse)
    ),
    params(
        ("goal_id" = Uuid, Path, description = "Goal ID"),
        ("x-user-id" = String, Header, description = "The ID of the teacher"),
        ("x-user-role" = String, Header, description = "Must be `teacher`")
    )
)]
pub async fn create_topics(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<CreateTopicsPayload>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(goal_id) = path?;
    caller.require(Role::Teacher)?;
    let Json(payload) = payload?;
    let goal = visible_goal(&state, &caller, goal_id).await?;

    let drafts: Vec<TopicDraft> = payload
        .topics
        .into_iter()
        .filter_map(TopicDraft::normalized)
        .collect();
    if drafts.is_empty() {
        return Err(ApiError::BadRequest(
            "At least one topic with a title is required".to_string(),
        ));
    }

    let topics = state.store.insert_topics(goal.id, &drafts).await?;
    info!(goal_id = %goal.id, count = topics.len(), "Topics created");
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(TopicsResponse { topics })),
    ))
}

/// Start a diagnostic for a goal, or resume the active one.
#[utoipa::path(
    post,
    path = "/diagnostics/start",
    request_body = StartDiagnosticPayload,
    responses(
        (status = 200, description = "Session started or resumed", body = StartDiagnosticResponse),
        (status = 400, description = "Goal has no topics", body = ErrorResponse),
        (status = 404, description = "Goal not found", body = ErrorResponse)
    ),
    params(
        ("x-user-id" = String, Header, description = "The ID of the student"),
        ("x-user-role" = String, Header, description = "Must be `student`")
    )
)]
pub async fn start_diagnostic(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    payload: Result<Json<StartDiagnosticPayload>, JsonRejection>,
) -> Result<Json<ApiResponse<StartDiagnosticResponse>>, ApiError> {
    let student_id = caller.require(Role::Student)?;
    let Json(payload) = payload?;
    let started = state
        .diagnostics
        .start(student_id, payload.goal_id, payload.protocol)
        .await?;
    Ok(Json(ApiResponse::ok(started)))
}

/// Get a diagnostic session.
#[utoipa::path(
    get,
    path = "/diagnostics/{session_id}",
    responses(
        (status = 200, description = "Session details", body = SessionDetails),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(
        ("session_id" = Uuid, Path, description = "Session ID"),
        ("x-user-id" = String, Header, description = "The ID of the student"),
        ("x-user-role" = String, Header, description = "Must be `student`")
    )
)]
pub async fn get_diagnostic(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ApiResponse<SessionDetails>>, ApiError> {
    let Path(session_id) = path?;
    let student_id = caller.require(Role::Student)?;
    let details = state.diagnostics.get(student_id, session_id).await?;
    Ok(Json(ApiResponse::ok(details)))
}

/// Stepwise protocol: the next question, or `{done: true}`.
#[utoipa::path(
    post,
    path = "/diagnostics/{session_id}/next",
    responses(
        (status = 200, description = "Next question or done", body = NextStep),
        (status = 400, description = "Session uses the batch protocol", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(
        ("session_id" = Uuid, Path, description = "Session ID"),
        ("x-user-id" = String, Header, description = "The ID of the student"),
        ("x-user-role" = String, Header, description = "Must be `student`")
    )
)]
pub async fn next_question(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ApiResponse<NextStep>>, ApiError> {
    let Path(session_id) = path?;
    let student_id = caller.require(Role::Student)?;
    let step = state.diagnostics.next_question(student_id, session_id).await?;
    Ok(Json(ApiResponse::ok(step)))
}

/// Stepwise protocol: answer the current question.
#[utoipa::path(
    post,
    path = "/diagnostics/{session_id}/answer",
    request_body = AnswerPayload,
    responses(
        (status = 200, description = "Recorded turn", body = TurnResponse),
        (status = 400, description = "Blank answer, wrong protocol or nothing left to answer", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(
        ("session_id" = Uuid, Path, description = "Session ID"),
        ("x-user-id" = String, Header, description = "The ID of the student"),
        ("x-user-role" = String, Header, description = "Must be `student`")
    )
)]
pub async fn answer(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<AnswerPayload>, JsonRejection>,
) -> Result<Json<ApiResponse<TurnResponse>>, ApiError> {
    let Path(session_id) = path?;
    let student_id = caller.require(Role::Student)?;
    let Json(payload) = payload?;
    let turn = state
        .diagnostics
        .answer(student_id, session_id, &payload.answer)
        .await?;
    Ok(Json(ApiResponse::ok(TurnResponse { turn })))
}

/// Batch protocol: submit the answers to the first questions.
#[utoipa::path(
    post,
    path = "/diagnostics/{session_id}/first-answers",
    request_body = FirstAnswersPayload,
    responses(
        (status = 200, description = "Follow-up questions per topic", body = FollowupsResponse),
        (status = 400, description = "Invalid answers or finished session", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(
        ("session_id" = Uuid, Path, description = "Session ID"),
        ("x-user-id" = String, Header, description = "The ID of the student"),
        ("x-user-role" = String, Header, description = "Must be `student`")
    )
)]
pub async fn submit_first_answers(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<FirstAnswersPayload>, JsonRejection>,
) -> Result<Json<ApiResponse<FollowupsResponse>>, ApiError> {
    let Path(session_id) = path?;
    let student_id = caller.require(Role::Student)?;
    let Json(payload) = payload?;
    let followups = state
        .diagnostics
        .submit_first_answers(student_id, session_id, &payload.answers)
        .await?;
    Ok(Json(ApiResponse::ok(FollowupsResponse { followups })))
}

/// Batch protocol: submit the follow-up answers and finish the session.
#[utoipa::path(
    post,
    path = "/diagnostics/{session_id}/followup-answers",
    request_body = FollowupAnswersPayload,
    responses(
        (status = 200, description = "Summary and suggested roadmap", body = FinishResponse),
        (status = 400, description = "Invalid answers or finished session", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(
        ("session_id" = Uuid, Path, description = "Session ID"),
        ("x-user-id" = String, Header, description = "The ID of the student"),
        ("x-user-role" = String, Header, description = "Must be `student`")
    )
)]
pub async fn submit_followup_answers(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<FollowupAnswersPayload>, JsonRejection>,
) -> Result<Json<ApiResponse<FinishResponse>>, ApiError> {
    let Path(session_id) = path?;
    let student_id = caller.require(Role::Student)?;
    let Json(payload) = payload?;
    let finished = state
        .diagnostics
        .submit_followup_answers(student_id, session_id, &payload.items)
        .await?;
    Ok(Json(ApiResponse::ok(finished)))
}

/// Finish a diagnostic session. Calling it again returns the same report.
#[utoipa::path(
    post,
    path = "/diagnostics/{session_id}/finish",
    responses(
        (status = 200, description = "Summary and suggested roadmap", body = FinishResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(
        ("session_id" = Uuid, Path, description = "Session ID"),
        ("x-user-id" = String, Header, description = "The ID of the student"),
        ("x-user-role" = String, Header, description = "Must be `student`")
    )
)]
pub async fn finish_diagnostic(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ApiResponse<FinishResponse>>, ApiError> {
    let Path(session_id) = path?;
    let student_id = caller.require(Role::Student)?;
    let finished = state.diagnostics.finish(student_id, session_id).await?;
    Ok(Json(ApiResponse::ok(finished)))
}

/// Summary of the most recently finished diagnostic of a goal.
#[utoipa::path(
    get,
    path = "/goals/{goal_id}/diagnostics/latest-summary",
    responses(
        (status = 200, description = "Latest summary, if any", body = LatestSummaryResponse),
        (status = 404, description = "Goal not found", body = ErrorResponse)
    ),
    params(
        ("goal_id" = Uuid, Path, description = "Goal ID"),
        ("x-user-id" = String, Header, description = "The ID of the teacher"),
        ("x-user-role" = String, Header, description = "Must be `teacher`")
    )
)]
pub async fn latest_summary(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ApiResponse<LatestSummaryResponse>>, ApiError> {
    let Path(goal_id) = path?;
    let teacher_id = caller.require(Role::Teacher)?;
    let summary = state.diagnostics.latest_summary(teacher_id, goal_id).await?;
    Ok(Json(ApiResponse::ok(summary)))
}

/// Ask the AI to propose diagnostic topics for a goal. Nothing is stored.
#[utoipa::path(
    post,
    path = "/goals/{goal_id}/diagnostics/generate-topics",
    request_body = GenerateTopicsPayload,
    responses(
        (status = 200, description = "Proposed topics", body = GeneratedTopicsResponse),
        (status = 404, description = "Goal not found", body = ErrorResponse),
        (status = 500, description = "Topic generation failed", body = ErrorResponse)
    ),
    params(
        ("goal_id" = Uuid, Path, description = "Goal ID"),
        ("x-user-id" = String, Header, description = "The ID of the teacher"),
        ("x-user-role" = String, Header, description = "Must be `teacher`")
    )
)]
pub async fn generate_topics(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Option<Json<GenerateTopicsPayload>>, JsonRejection>,
) -> Result<Json<ApiResponse<GeneratedTopicsResponse>>, ApiError> {
    let Path(goal_id) = path?;
    let teacher_id = caller.require(Role::Teacher)?;
    let payload = payload?.map(|Json(p)| p).unwrap_or_default();
    let topics = state
        .diagnostics
        .generate_topics(teacher_id, goal_id, payload.count)
        .await?;
    Ok(Json(ApiResponse::ok(GeneratedTopicsResponse { topics })))
}
