//! REST/WebSocket front end over the interaction loop: session lifecycle,
//! chat (request/response, streaming, and typed-frame WebSocket), history,
//! file ingestion, stats, graph inspection, tasks, health metrics,
//! personality, notifications, reminders, calendar, and voice config.

use axum::{
    extract::{ws::WebSocketUpgrade, Multipart, Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures_util::StreamExt;
use psycho_core::domain::DomainRegistry;
use psycho_core::store::RelationalStore;
use psycho_core::{
    CalendarEvent, Config, GraphEvolver, GraphReasoner, HealthMetric, InteractionLoop, KnowledgeExtractor,
    KnowledgeGraph, LlmProvider, LocalVectorStore, MemoryManager, MistakeTracker, OpenRouterProvider,
    PersonalityPatch, PersonalityStore, Priority, ProactiveScheduler, Recurrence, Reminder, Session, Task,
    UserConfig,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const TEXT_INGESTION_EXTENSIONS: &[&str] = &["txt", "md", "py", "js", "ts", "json", "yaml", "yml", "csv"];
const NON_TEXT_INGESTION_EXTENSIONS: &[&str] = &["pdf", "png", "jpg", "jpeg", "gif", "webp"];

struct AppState {
    interaction_loop: InteractionLoop<dyn LlmProvider>,
    llm: Arc<dyn LlmProvider>,
    graph: Arc<KnowledgeGraph>,
    evolver: Arc<GraphEvolver>,
    relational: Arc<RelationalStore>,
    scheduler: Arc<ProactiveScheduler>,
    personality: PersonalityStore,
    config: Config,
}

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[psycho-gateway] .env not loaded: {e} (using system environment)");
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into())))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let user_config = UserConfig::load();

    let relational = Arc::new(RelationalStore::new(config.relational_db_path()).expect("open relational store"));
    let vector = Arc::new(LocalVectorStore::open(config.vectors_dir()).expect("open vector store"));
    let graph = Arc::new(KnowledgeGraph::new(
        vector.clone(),
        config.graph_dir(),
        config.merge_similarity_threshold,
        config.pagerank_weight_confidence,
        config.pagerank_weight_rank,
        config.pagerank_weight_recency,
    ));
    graph.load().await.expect("load knowledge graph");

    let llm: Arc<dyn LlmProvider> = if config.uses_ollama() {
        tracing::info!("psycho-gateway: PSYCHO_LLM_PROVIDER=ollama, routing through the local Ollama endpoint");
        Arc::new(OpenRouterProvider::new(
            String::new(),
            user_config.get_llm_model(),
            "http://localhost:11434/v1/chat/completions".to_string(),
        ))
    } else {
        match OpenRouterProvider::from_env() {
            Some(provider) => Arc::new(provider),
            None => {
                let api_key = user_config.get_api_key().unwrap_or_default();
                Arc::new(OpenRouterProvider::new(api_key, user_config.get_llm_model(), user_config.get_llm_api_url()))
            }
        }
    };

    let evolver = Arc::new(GraphEvolver::new(graph.clone()));
    let mistakes = Arc::new(MistakeTracker::new(relational.clone(), vector.clone()));
    let memory = MemoryManager::new(relational.clone(), vector.clone());

    let mut domains = DomainRegistry::new();
    domains.register(Arc::new(psycho_skills::CodingHandler));
    domains.register(Arc::new(psycho_skills::HealthHandler));
    domains.register(Arc::new(psycho_skills::TasksHandler::new(relational.clone())));

    let interaction_loop = InteractionLoop::new(
        llm.clone(),
        memory,
        graph.clone(),
        evolver.clone(),
        mistakes,
        domains,
        config.max_context_memories as usize,
        config.extraction_enabled,
        config.web_search_enabled,
    );

    let scheduler = Arc::new(ProactiveScheduler::new(
        relational.clone(),
        Duration::from_secs(config.proactive_scheduler_interval_secs.max(1)),
    ));
    if config.proactive_enabled {
        let (_handle, _stop_tx) = scheduler.clone().start();
    }

    let personality = PersonalityStore::new(config.personality_path());

    let state = Arc::new(AppState {
        interaction_loop,
        llm,
        graph,
        evolver,
        relational,
        scheduler,
        personality,
        config,
    });

    let app = Router::new()
        .route("/api/sessions", post(create_session))
        .route("/api/chat", post(chat))
        .route("/api/history/:session_id", get(history))
        .route("/api/ingest", post(ingest))
        .route("/api/stats", get(stats))
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/:id/read", post(mark_notification_read))
        .route("/api/graph/summary", get(graph_summary))
        .route("/api/graph/nodes/:id", get(graph_node_detail).delete(graph_node_delete))
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/:id/complete", post(complete_task))
        .route("/api/health-metrics", get(list_health_metrics).post(create_health_metric))
        .route("/api/personality", get(get_personality).patch(patch_personality))
        .route("/api/reminders", get(list_reminders).post(create_reminder))
        .route("/api/calendar", get(list_calendar_events).post(create_calendar_event))
        .route("/api/voice/config", get(voice_config))
        .route("/api/voice/tts", post(voice_tts))
        .route("/api/voice/stt", post(voice_stt))
        .route("/ws/chat/:session_id", get(ws_chat))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = std::env::var("PSYCHO_GATEWAY_ADDR").unwrap_or_else(|_| "0.0.0.0:8787".to_string());
    tracing::info!(%addr, "psycho-gateway listening");
    let listener = tokio::net::TcpListener::bind(&addr).await.expect("bind gateway address");
    axum::serve(listener, app).await.expect("gateway server");
}

async fn create_session(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let session = Session::new(uuid::Uuid::new_v4().to_string(), "general");
    match state.relational.insert_session(&session) {
        Ok(()) => Json(serde_json::json!({"session_id": session.id})).into_response(),
        Err(e) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[derive(Deserialize)]
struct ChatRequest {
    session_id: String,
    message: String,
}

async fn chat(State(state): State<Arc<AppState>>, Json(req): Json<ChatRequest>) -> impl IntoResponse {
    match state.interaction_loop.process(&req.session_id, &req.message).await {
        Ok(turn) => Json(serde_json::json!({
            "response": turn.response,
            "domain": turn.domain,
            "interaction_id": turn.interaction_id,
            "signal": format!("{:?}", turn.signal),
        }))
        .into_response(),
        Err(e) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn history(State(state): State<Arc<AppState>>, Path(session_id): Path<String>) -> impl IntoResponse {
    match state.relational.last_interactions(&session_id, 50) {
        Ok(interactions) => Json(interactions).into_response(),
        Err(e) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

fn file_extension(name: &str) -> String {
    name.rsplit('.').next().unwrap_or("").to_ascii_lowercase()
}

/// Accepts a multipart upload of one or more supported files and extracts
/// knowledge from the text-based ones in the background; images/PDFs are
/// stored as acknowledged but not parsed (no document/vision pipeline here).
async fn ingest(State(state): State<Arc<AppState>>, mut multipart: Multipart) -> impl IntoResponse {
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(f)) => f,
            Ok(None) => break,
            Err(e) => return (axum::http::StatusCode::BAD_REQUEST, e.to_string()).into_response(),
        };
        let name = field.file_name().unwrap_or("upload").to_string();
        let ext = file_extension(&name);
        let Ok(bytes) = field.bytes().await else {
            rejected.push(name);
            continue;
        };

        if TEXT_INGESTION_EXTENSIONS.contains(&ext.as_str()) {
            let text = String::from_utf8_lossy(&bytes).to_string();
            let llm = state.llm.clone();
            let evolver = state.evolver.clone();
            let source = name.clone();
            tokio::spawn(async move {
                let extractor = KnowledgeExtractor::new(llm);
                let result = extractor.extract_from_text(&text, &source, "general").await;
                if !result.is_empty() {
                    evolver.integrate(result).await;
                }
            });
            accepted.push(name);
        } else if NON_TEXT_INGESTION_EXTENSIONS.contains(&ext.as_str()) {
            tracing::info!(file = %name, "ingest: accepted non-text file, no extraction pipeline for it");
            accepted.push(name);
        } else {
            rejected.push(name);
        }
    }

    Json(serde_json::json!({"accepted": accepted, "rejected": rejected})).into_response()
}

async fn stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let graph_stats = state.graph.stats().await;
    match state.relational.counts() {
        Ok(counts) => Json(serde_json::json!({"graph": graph_stats, "relational": counts})).into_response(),
        Err(e) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn list_notifications(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.scheduler.all().await)
}

async fn mark_notification_read(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> impl IntoResponse {
    state.scheduler.mark_read(&id).await;
    axum::http::StatusCode::NO_CONTENT
}

async fn graph_summary(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let reasoner = GraphReasoner::new(&state.graph);
    Json(serde_json::json!({"summary": reasoner.format_full_graph_summary().await}))
}

async fn graph_node_detail(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> impl IntoResponse {
    let reasoner = GraphReasoner::new(&state.graph);
    match reasoner.format_node_detail(&id).await {
        Some(detail) => Json(serde_json::json!({"detail": detail})).into_response(),
        None => axum::http::StatusCode::NOT_FOUND.into_response(),
    }
}

/// Soft-deletes a node: the graph has no hard-delete, so this deprecates it
/// the same way the evolver does when a reflection pass flags a node unreliable.
async fn graph_node_delete(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> impl IntoResponse {
    if state.graph.get_node(&id).await.is_none() {
        return axum::http::StatusCode::NOT_FOUND;
    }
    state.graph.deprecate_node(&id, "deleted via API").await;
    axum::http::StatusCode::NO_CONTENT
}

async fn list_tasks(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.relational.list_tasks(false) {
        Ok(tasks) => Json(tasks).into_response(),
        Err(e) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[derive(Deserialize)]
struct CreateTaskRequest {
    title: String,
    notes: Option<String>,
    due_timestamp: Option<i64>,
}

async fn create_task(State(state): State<Arc<AppState>>, Json(req): Json<CreateTaskRequest>) -> impl IntoResponse {
    let task = Task {
        id: uuid::Uuid::new_v4().to_string(),
        title: req.title,
        notes: req.notes,
        done: false,
        due_timestamp: req.due_timestamp,
        created_at: psycho_core::model::now_ts(),
        session_id: None,
    };
    match state.relational.insert_task(&task) {
        Ok(()) => Json(task).into_response(),
        Err(e) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn complete_task(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> impl IntoResponse {
    match state.relational.complete_task(&id) {
        Ok(()) => axum::http::StatusCode::NO_CONTENT.into_response(),
        Err(e) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn list_health_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.relational.recent_health_metrics(100) {
        Ok(metrics) => Json(metrics).into_response(),
        Err(e) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[derive(Deserialize)]
struct CreateHealthMetricRequest {
    metric: String,
    value: f64,
    unit: Option<String>,
}

async fn create_health_metric(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateHealthMetricRequest>,
) -> impl IntoResponse {
    let metric = HealthMetric {
        id: uuid::Uuid::new_v4().to_string(),
        metric: req.metric,
        value: req.value,
        unit: req.unit,
        recorded_at: psycho_core::model::now_ts(),
        session_id: None,
    };
    match state.relational.insert_health_metric(&metric) {
        Ok(()) => Json(metric).into_response(),
        Err(e) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn get_personality(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.personality.load(state.config.personality_humor))
}

async fn patch_personality(
    State(state): State<Arc<AppState>>,
    Json(patch): Json<PersonalityPatch>,
) -> impl IntoResponse {
    match state.personality.apply_patch(state.config.personality_humor, patch) {
        Ok(traits) => Json(traits).into_response(),
        Err(e) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn list_reminders(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.relational.due_reminders(i64::MAX) {
        Ok(reminders) => Json(reminders).into_response(),
        Err(e) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

fn default_recurrence() -> Recurrence {
    Recurrence::None
}
fn default_priority() -> Priority {
    Priority::Normal
}

#[derive(Deserialize)]
struct CreateReminderRequest {
    title: String,
    notes: Option<String>,
    due_timestamp: i64,
    #[serde(default = "default_recurrence")]
    recurrence: Recurrence,
    #[serde(default = "default_priority")]
    priority: Priority,
}

async fn create_reminder(State(state): State<Arc<AppState>>, Json(req): Json<CreateReminderRequest>) -> impl IntoResponse {
    let reminder = Reminder {
        id: uuid::Uuid::new_v4().to_string(),
        title: req.title,
        notes: req.notes,
        due_timestamp: req.due_timestamp,
        recurrence: req.recurrence,
        priority: req.priority,
        completed: false,
        snoozed_until: 0,
        created_at: psycho_core::model::now_ts(),
        session_id: None,
    };
    match state.relational.insert_reminder(&reminder) {
        Ok(()) => Json(reminder).into_response(),
        Err(e) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn list_calendar_events(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.relational.upcoming_events(psycho_core::model::now_ts()) {
        Ok(events) => Json(events).into_response(),
        Err(e) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[derive(Deserialize)]
struct CreateCalendarEventRequest {
    title: String,
    start_timestamp: i64,
    end_timestamp: i64,
    location: Option<String>,
    notes: Option<String>,
    #[serde(default = "default_recurrence")]
    recurrence: Recurrence,
    #[serde(default)]
    all_day: bool,
    #[serde(default)]
    reminder_minutes: i64,
}

async fn create_calendar_event(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateCalendarEventRequest>,
) -> impl IntoResponse {
    let event = CalendarEvent {
        id: uuid::Uuid::new_v4().to_string(),
        title: req.title,
        start_timestamp: req.start_timestamp,
        end_timestamp: req.end_timestamp,
        location: req.location,
        notes: req.notes,
        recurrence: req.recurrence,
        all_day: req.all_day,
        reminder_minutes: req.reminder_minutes,
        created_at: psycho_core::model::now_ts(),
    };
    match state.relational.insert_calendar_event(&event) {
        Ok(()) => Json(event).into_response(),
        Err(e) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn voice_config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({"tts_enabled": state.config.tts_enabled, "stt_enabled": state.config.stt_enabled}))
}

/// No speech-synthesis backend is wired into this build; this degrades the
/// same way an unconfigured LLM provider does — a typed "not available" error
/// rather than a crash.
async fn voice_tts(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if !state.config.tts_enabled {
        return (axum::http::StatusCode::NOT_FOUND, "tts disabled").into_response();
    }
    (axum::http::StatusCode::NOT_IMPLEMENTED, "no speech-synthesis provider configured").into_response()
}

async fn voice_stt(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if !state.config.stt_enabled {
        return (axum::http::StatusCode::NOT_FOUND, "stt disabled").into_response();
    }
    (axum::http::StatusCode::NOT_IMPLEMENTED, "no speech-recognition provider configured").into_response()
}

async fn ws_chat(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>, Path(session_id): Path<String>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_chat(socket, state, session_id))
}

async fn send_frame(socket: &mut axum::extract::ws::WebSocket, frame: serde_json::Value) -> bool {
    use axum::extract::ws::Message;
    socket.send(Message::Text(frame.to_string())).await.is_ok()
}

async fn handle_ws_chat(mut socket: axum::extract::ws::WebSocket, state: Arc<AppState>, session_id: String) {
    use axum::extract::ws::Message;
    while let Some(Ok(Message::Text(raw))) = socket.recv().await {
        if let Ok(envelope) = serde_json::from_str::<serde_json::Value>(&raw) {
            if envelope.get("type").and_then(|t| t.as_str()) == Some("ping") {
                if !send_frame(&mut socket, serde_json::json!({"type": "pong"})).await {
                    return;
                }
                continue;
            }
        }
        let user_message = raw;

        match state.interaction_loop.stream_process(&session_id, &user_message).await {
            Ok((mut stream, _assembled)) => {
                while let Some(chunk) = stream.next().await {
                    let Ok(text) = chunk else { break };
                    if !send_frame(&mut socket, serde_json::json!({"type": "token", "content": text})).await {
                        return;
                    }
                }
                let _ = send_frame(&mut socket, serde_json::json!({"type": "done"})).await;
            }
            Err(e) => {
                let _ = send_frame(&mut socket, serde_json::json!({"type": "error", "message": e.to_string()})).await;
            }
        }
    }
}
