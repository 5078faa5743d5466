//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API, WebSocket endpoint, and OpenAPI documentation.

use crate::{
    handlers,
    models::{
        AnswerPayload, CreateGoalPayload, CreateTopicsPayload, DiagnosticDone, DiagnosticSession,
        DiagnosticTurn, ErrorResponse, FinishResponse, FirstAnswer, FirstAnswersPayload,
        FollowupAnswersPayload, FollowupItem, FollowupsResponse, GenerateTopicsPayload,
        GeneratedTopicsResponse, InitialQuestion, LatestSummaryResponse, LearningGoal,
        NextQuestion, NextStep, QuestionAnswer, Role, SessionDetails, SessionStatus,
        StartDiagnosticPayload, StartDiagnosticResponse, Topic, TopicFollowups, TopicsResponse,
        TurnResponse,
    },
    state::AppState,
    ws::ws_handler,
};

use axum::{
    Router, middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::create_goal,
        handlers::get_goal,
        handlers::list_topics,
        handlers::create_topics,
        handlers::start_diagnostic,
        handlers::get_diagnostic,
        handlers::next_question,
        handlers::answer,
        handlers::submit_first_answers,
        handlers::submit_followup_answers,
        handlers::finish_diagnostic,
        handlers::latest_summary,
        handlers::generate_topics,
    ),
    components(
        schemas(
            LearningGoal, Topic, DiagnosticSession, DiagnosticTurn, SessionStatus, Role,
            CreateGoalPayload, CreateTopicsPayload, StartDiagnosticPayload, AnswerPayload,
            FirstAnswer, FirstAnswersPayload, QuestionAnswer, FollowupItem, FollowupAnswersPayload,
            GenerateTopicsPayload, ErrorResponse, InitialQuestion, StartDiagnosticResponse,
            SessionDetails, NextQuestion, DiagnosticDone, NextStep, TurnResponse, TopicFollowups,
            FollowupsResponse, FinishResponse, LatestSummaryResponse, GeneratedTopicsResponse,
            TopicsResponse
        )
    ),
    tags(
        (name = "Mentor API", description = "Learning goals and knowledge diagnostics")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let diagnostics = Router::new()
        .route("/start", post(handlers::start_diagnostic))
        .route("/{session_id}", get(handlers::get_diagnostic))
        .route("/{session_id}/next", post(handlers::next_question))
        .route("/{session_id}/answer", post(handlers::answer))
        .route(
            "/{session_id}/first-answers",
            post(handlers::submit_first_answers),
        )
        .route(
            "/{session_id}/followup-answers",
            post(handlers::submit_followup_answers),
        )
        .route("/{session_id}/finish", post(handlers::finish_diagnostic));

    // Group all routes that require AppState into their own router.
    let api_router = Router::new()
        .route("/health", get(handlers::health))
        .route("/goals", post(handlers::create_goal))
        .route("/goals/{goal_id}", get(handlers::get_goal))
        .route(
            "/goals/{goal_id}/topics",
            get(handlers::list_topics).post(handlers::create_topics),
        )
        .route(
            "/goals/{goal_id}/diagnostics/latest-summary",
            get(handlers::latest_summary),
        )
        .route(
            "/goals/{goal_id}/diagnostics/generate-topics",
            post(handlers::generate_topics),
        )
        .nest("/diagnostics", diagnostics)
        .route("/ws", get(ws_handler))
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            handlers::error_detail_middleware,
        ))
        // Apply the state ONLY to this group of routes.
        .with_state(app_state);

    // Create the final router that merges the stateful routes
    // with the stateless routes (like Swagger UI).
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
        .layer(TraceLayer::new_for_http())
}
