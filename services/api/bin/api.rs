//! Main Entrypoint for the Mentor API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Opening the data store (PostgreSQL with migrations, or in-memory).
//! 3. Initializing the AI collaborators (classifier, follow-ups, curriculum).
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use mentor_api::{
    config::{Config, Provider, Storage},
    db::{Db, DiagnosticStore, MemoryStore},
    diagnostic::DiagnosticService,
    router::create_router,
    state::AppState,
    ws::hub::{BroadcastHub, NotificationHub},
};
use mentor_core::{
    classifier::{CLASSIFY_PROMPT, HeuristicClassifier, KnowledgeClassifier, LLMKnowledgeClassifier},
    curriculum::{CurriculumService, GENERATE_TOPICS_PROMPT, LLMCurriculumService, MockCurriculumService},
    followup::{FOLLOWUP_PROMPT, FollowupGenerator, LLMFollowupGenerator, NoFollowupGenerator},
    llm_client::{LLMClient, OpenAICompatibleClient},
};
use sqlx::PgPool;
use std::{collections::HashMap, fs, net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

const NOTIFICATION_CAPACITY: usize = 256;

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl+C handler");
        return;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

/// A helper function to load prompts from a directory.
fn load_prompts(prompts_path: &std::path::Path) -> anyhow::Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();
    for entry in std::fs::read_dir(prompts_path)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("md") {
            let prompt_key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .context("Could not get file stem")?
                .to_string();
            let content = fs::read_to_string(&path)?;
            prompts.insert(prompt_key, content);
        }
    }
    Ok(prompts)
}

struct Collaborators {
    classifier: Arc<dyn KnowledgeClassifier>,
    followups: Arc<dyn FollowupGenerator>,
    curriculum: Arc<dyn CurriculumService>,
}

fn build_collaborators(config: &Config) -> anyhow::Result<Collaborators> {
    let (api_key, api_base) = match &config.provider {
        Provider::OpenAI => (
            config.openai_api_key.as_deref(),
            "https://api.openai.com/v1/",
        ),
        Provider::Gemini => (
            config.gemini_api_key.as_deref(),
            "https://generativelanguage.googleapis.com/v1beta/openai",
        ),
        Provider::Disabled => {
            warn!("AI provider disabled: heuristic classification, no follow-ups, canned topics.");
            return Ok(Collaborators {
                classifier: Arc::new(HeuristicClassifier),
                followups: Arc::new(NoFollowupGenerator),
                curriculum: Arc::new(MockCurriculumService),
            });
        }
    };
    let api_key = api_key.context("API key missing for the configured provider")?;
    info!(provider = ?config.provider, "Using OpenAI-compatible chat completions.");

    let prompts = load_prompts(&config.prompts_path).with_context(|| {
        format!("Failed to read prompts from {}", config.prompts_path.display())
    })?;
    for required in [CLASSIFY_PROMPT, FOLLOWUP_PROMPT, GENERATE_TOPICS_PROMPT] {
        if !prompts.contains_key(required) {
            anyhow::bail!("{}.md not found in prompts directory", required);
        }
    }
    let prompts = Arc::new(prompts);

    let openai_config = OpenAIConfig::new()
        .with_api_key(api_key)
        .with_api_base(api_base);
    let llm: Arc<dyn LLMClient> = Arc::new(OpenAICompatibleClient::new(
        openai_config,
        config.chat_model.clone(),
    ));

    Ok(Collaborators {
        classifier: Arc::new(LLMKnowledgeClassifier::new(llm.clone(), prompts.clone())),
        followups: Arc::new(LLMFollowupGenerator::new(llm.clone(), prompts.clone())),
        curriculum: Arc::new(LLMCurriculumService::new(llm, prompts)),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize Data Store ---
    let store: Arc<dyn DiagnosticStore> = match &config.storage {
        Storage::Postgres(url) => {
            let pool = PgPool::connect(url)
                .await
                .context("Failed to connect to database")?;
            let db = Db::new(pool);
            db.run_migrations().await?;
            info!("Database connection established and migrations are up-to-date.");
            Arc::new(db)
        }
        Storage::Memory => {
            warn!("Using the in-memory store; data is lost on shutdown.");
            Arc::new(MemoryStore::new())
        }
    };

    // --- 4. Initialize Shared Services ---
    let collaborators = build_collaborators(&config)?;
    let hub: Arc<dyn NotificationHub> = Arc::new(BroadcastHub::new(NOTIFICATION_CAPACITY));
    let diagnostics = Arc::new(DiagnosticService::new(
        store.clone(),
        collaborators.classifier,
        collaborators.followups,
        collaborators.curriculum,
        hub.clone(),
    ));

    let app_state = Arc::new(AppState {
        store,
        diagnostics,
        hub,
        config: Arc::new(config.clone()),
    });

    // --- 5. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 6. Start Server ---
    info!(
        provider = ?config.provider,
        model = %config.chat_model,
        bind_address = %config.bind_address,
        production = config.production,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
