use axum::{
    Extension, Json, Router,
    body::Body,
    extract::{DefaultBodyLimit, Multipart, State},
    http::{HeaderValue, StatusCode, header},
    middleware::from_fn_with_state,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use handlebars::Handlebars;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tokio::time::sleep;
use tower::ServiceBuilder;
use tower_http::services::ServeFile;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::Config;
use crate::downloader;
use crate::error::FlowError;
use crate::flow::Workflow;
use crate::login;
use crate::mailer::Mailer;
use crate::remote::{HttpProcessor, Processor, XLSX_MIME};
use crate::session::{FlowState, Session, SessionHandle, SessionStore};

/// How often expired sessions are swept in the background
const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: SessionStore,
    pub workflow: Workflow,
    pages: Handlebars<'static>,
}

impl AppState {
    /// Wire up the shared state around a [`Processor`].
    ///
    /// A notification mailer is attached when the configuration enables one;
    /// a mailer that fails to initialise only disables notifications.
    pub fn new(config: Config, processor: Arc<dyn Processor>) -> Result<Self, Box<dyn Error>> {
        let config = Arc::new(config);

        let mut workflow = Workflow::new(config.clone(), processor);
        if let Some(notify) = &config.notify {
            match Mailer::new(notify) {
                Ok(mailer) => {
                    log::info!("Notifications enabled for {}", notify.to);
                    workflow = workflow.with_mailer(mailer);
                }
                Err(e) => log::warn!("Notifications disabled, mailer setup failed: {}", e),
            }
        }

        let mut pages = Handlebars::new();
        pages.register_template_string("login", include_str!("./static/login.html"))?;
        pages.register_template_string("extractor", include_str!("./static/extractor.html"))?;

        Ok(AppState {
            sessions: SessionStore::new(config.session_ttl),
            config,
            workflow,
            pages,
        })
    }
}

/// What an operator (or an API client) can see of a session
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub state: FlowState,
    pub filename: Option<String>,
    pub staged_name: Option<String>,
    pub error: Option<String>,
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub download_name: Option<String>,
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        let result = session.result.as_ref();
        SessionView {
            state: session.state,
            filename: session.artifact.as_ref().map(|a| a.original_name.clone()),
            staged_name: session.artifact.as_ref().map(|a| a.staged_name.clone()),
            error: session.last_error.clone(),
            columns: result.map(|r| r.table.columns.clone()).unwrap_or_default(),
            rows: result.map(|r| r.table.records()).unwrap_or_default(),
            processed_at: result.map(|r| r.processed_at),
            download_name: result.and(session.artifact.as_ref()).map(|a| {
                downloader::download_filename(&a.original_name)
            }),
        }
    }
}

/// Build the router for the extractor surface
pub fn router(state: Arc<AppState>) -> Router {
    let sample_name = state
        .config
        .sample_file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("sample.xlsx")
        .to_string();
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", sample_name))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    let sample = ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_DISPOSITION,
            disposition,
        ))
        .service(ServeFile::new(&state.config.sample_file));

    let protected = Router::new()
        .route("/", get(serve_index))
        .route("/upload", post(handle_upload))
        .route("/process", post(handle_process))
        .route("/reset", post(handle_reset))
        .route("/download", get(handle_download))
        .route("/api/session", get(get_session))
        .route("/logout", post(login::handle_logout))
        .route_service("/sample", sample)
        .route_layer(from_fn_with_state(state.clone(), login::require_auth));

    Router::new()
        .route(
            "/login",
            get(login::serve_login_page).post(login::handle_login),
        )
        .merge(protected)
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .with_state(state)
}

/// Start the extractor web server and block until shutdown
pub async fn run(config: Config) -> Result<(), Box<dyn Error>> {
    let processor = Arc::new(HttpProcessor::new(config.remote_endpoint.clone()));
    let state = Arc::new(AppState::new(config, processor)?);

    state.workflow.staging().ensure_dirs().await?;
    if !state.config.sample_file.exists() {
        log::warn!(
            "Sample file {} not found, /sample will answer 404",
            state.config.sample_file.display()
        );
    }

    log::info!(
        "Remote endpoint: {}, staging: {} / {}",
        state.config.remote_endpoint,
        state.config.upload_dir.display(),
        state.config.result_dir.display()
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(sweep_sessions(state.clone(), shutdown_rx));

    let addr = state.config.bind_addr;
    let app = router(state);

    let listener = TcpListener::bind(addr).await?;
    log::info!("Listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .await?;

    log::info!("Server shut down");
    Ok(())
}

// Expired sessions are also swept on login; this covers idle servers.
async fn sweep_sessions(state: Arc<AppState>, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = sleep(SWEEP_INTERVAL) => {
                let swept = login::sweep_expired_sessions(&state).await;
                if swept > 0 {
                    log::info!("Swept {} expired sessions", swept);
                }
            }
        }
    }
    log::debug!("Session sweeper stopped");
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Ctrl+C received, shutting down");
}

pub(crate) fn render_login(state: &AppState, status: StatusCode, error: Option<&str>) -> Response {
    render(state, "login", &json!({ "error": error }), status)
}

fn render_extractor(state: &AppState, session: &Session, status: StatusCode) -> Response {
    let result = session.result.as_ref();
    let context = json!({
        "awaiting_upload": session.state == FlowState::AwaitingUpload,
        "processing": session.state == FlowState::Processing,
        "result_ready": session.state == FlowState::ResultReady,
        "error": session.last_error,
        "filename": session.artifact.as_ref().map(|a| a.original_name.clone()),
        "accept": state
            .config
            .allowed_extensions
            .iter()
            .map(|ext| format!(".{}", ext))
            .collect::<Vec<_>>()
            .join(","),
        "columns": result.map(|r| r.table.columns.clone()).unwrap_or_default(),
        "grid": result.map(|r| r.table.display_rows()).unwrap_or_default(),
        "row_count": result.map(|r| r.table.row_count()).unwrap_or(0),
        "download_name": session
            .artifact
            .as_ref()
            .map(|a| downloader::download_filename(&a.original_name)),
    });

    render(state, "extractor", &context, status)
}

fn render(state: &AppState, template: &str, context: &Value, status: StatusCode) -> Response {
    match state.pages.render(template, context) {
        Ok(html) => (status, Html(html)).into_response(),
        Err(e) => {
            log::error!("Failed to render {}: {}", template, e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to render page").into_response()
        }
    }
}

// POST handlers answer with a redirect on success and re-render the page
// with the error otherwise.
fn after_action(state: &AppState, session: &Session, outcome: Result<(), FlowError>) -> Response {
    match outcome {
        Ok(()) => Redirect::to("/").into_response(),
        Err(e) => render_extractor(state, session, e.status_code()),
    }
}

async fn serve_index(
    State(state): State<Arc<AppState>>,
    Extension(handle): Extension<SessionHandle>,
) -> Response {
    let session = handle.lock().await;
    render_extractor(&state, &session, StatusCode::OK)
}

async fn get_session(Extension(handle): Extension<SessionHandle>) -> Json<SessionView> {
    let session = handle.lock().await;
    Json(SessionView::from(&*session))
}

async fn handle_upload(
    State(state): State<Arc<AppState>>,
    Extension(handle): Extension<SessionHandle>,
    mut multipart: Multipart,
) -> Response {
    let mut upload: Option<(String, Vec<u8>)> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return (e.status(), e.body_text()).into_response(),
        };

        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or("unnamed").to_string();
        match field.bytes().await {
            Ok(bytes) => upload = Some((filename, bytes.to_vec())),
            Err(e) => return (e.status(), e.body_text()).into_response(),
        }
    }

    let mut session = handle.lock().await;
    let outcome = match upload {
        Some((filename, bytes)) => state.workflow.submit(&mut session, &filename, &bytes).await,
        None => {
            session.last_error = Some(FlowError::MissingFile.to_string());
            Err(FlowError::MissingFile)
        }
    };

    after_action(&state, &session, outcome)
}

async fn handle_process(
    State(state): State<Arc<AppState>>,
    Extension(handle): Extension<SessionHandle>,
) -> Response {
    let mut session = handle.lock().await;
    let outcome = state.workflow.process(&mut session).await;
    after_action(&state, &session, outcome)
}

async fn handle_reset(
    State(state): State<Arc<AppState>>,
    Extension(handle): Extension<SessionHandle>,
) -> Response {
    let mut session = handle.lock().await;
    let outcome = state.workflow.reset(&mut session).await;
    after_action(&state, &session, outcome)
}

async fn handle_download(
    State(state): State<Arc<AppState>>,
    Extension(handle): Extension<SessionHandle>,
) -> Response {
    let session = handle.lock().await;

    match state.workflow.download(&session) {
        Ok((filename, bytes)) => {
            let disposition = format!("attachment; filename=\"{}\"", filename.replace('"', ""));
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, XLSX_MIME)
                .header(header::CONTENT_DISPOSITION, disposition)
                .body(Body::from(bytes))
                .unwrap_or_else(|e| {
                    log::error!("Failed to build download response: {}", e);
                    StatusCode::INTERNAL_SERVER_ERROR.into_response()
                })
        }
        Err(e) => e.into_response(),
    }
}
