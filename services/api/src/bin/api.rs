//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        DbAdapter, DocumentTransitionLog, InMemoryDocumentStore, InMemoryObjectStore,
        OpenAiLlmAdapter,
    },
    config::Config,
    error::ApiError,
    pipeline::{
        ContentStage, DesignStage, MultiAgentSlidePipeline, ResearchStage, StageOrchestrator,
        StructureStage,
    },
    web::{api_router, registry::ConnectionRegistry, rest::ApiDoc, state::AppState},
};
use async_openai::{config::OpenAIConfig, Client};
use axum::{
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        Method,
    },
    Router,
};
use course_forge_core::{
    ports::{DocumentStore, LanguageModel, ObjectStore},
    CoursePlanner, StructureExtractor,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

// Stages and agents are cooperative tasks on a single thread.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Storage & Run Migrations ---
    let (documents, objects): (Arc<dyn DocumentStore>, Arc<dyn ObjectStore>) =
        match &config.database_url {
            Some(database_url) => {
                info!("Connecting to database...");
                let db_pool = PgPoolOptions::new()
                    .max_connections(5)
                    .connect(database_url)
                    .await?;
                let db_adapter = Arc::new(DbAdapter::new(db_pool));
                info!("Running database migrations...");
                db_adapter.run_migrations().await?;
                info!("Database migrations complete.");
                let documents: Arc<dyn DocumentStore> = db_adapter.clone();
                let objects: Arc<dyn ObjectStore> = db_adapter;
                (documents, objects)
            }
            None => {
                warn!("DATABASE_URL is not set; using in-memory stores. Nothing will be persisted.");
                let documents: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
                let objects: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
                (documents, objects)
            }
        };

    // --- 3. Initialize the LLM Adapters ---
    let mut openai_config = OpenAIConfig::new().with_api_key(&config.openai_api_key);
    if let Some(base_url) = &config.openai_base_url {
        openai_config = openai_config.with_api_base(base_url);
    }
    let openai_client = Client::with_config(openai_config);

    let llm: Arc<dyn LanguageModel> = Arc::new(OpenAiLlmAdapter::new(
        openai_client.clone(),
        config.llm_model.clone(),
    ));
    let fast_llm: Arc<dyn LanguageModel> = Arc::new(OpenAiLlmAdapter::new(
        openai_client,
        config.llm_fast_model.clone(),
    ));

    // --- 4. Build the Pipelines ---
    let planner = Arc::new(CoursePlanner::new(
        objects.clone(),
        documents.clone(),
        StructureExtractor::with_models(llm.clone(), fast_llm),
    ));
    let orchestrator = StageOrchestrator::new(
        Arc::new(DocumentTransitionLog::new(documents.clone())),
        config.chain_delay,
    )
    .with_producer(Arc::new(ResearchStage::new(llm.clone(), objects.clone())))
    .with_producer(Arc::new(DesignStage::new(llm.clone(), objects.clone())))
    .with_producer(Arc::new(StructureStage::new(planner.clone())))
    .with_producer(Arc::new(ContentStage::new(planner.clone())));
    let slides = MultiAgentSlidePipeline::new(llm, documents.clone());

    // --- 5. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        config: config.clone(),
        objects,
        planner,
        orchestrator: Arc::new(orchestrator),
        slides: Arc::new(slides),
        registry: Arc::new(ConnectionRegistry::new()),
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT]);

    // --- 6. Create the Web Router ---
    let routes = api_router(app_state).layer(cors);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 7. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
