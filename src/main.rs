use anyhow::Context as _;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::prelude::*;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tower_http::cors::CorsLayer;

mod capture;
mod compositor;
mod config;
mod context;
mod error;
mod geometry;
mod viewer;

#[cfg(test)]
mod test_support;

use capture::{InputEvent, Layout, Surface, SurfaceState};
use config::Config;
use context::{lock, SharedSession, SigningSession};
use error::SignError;
use viewer::PagedViewer;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web server
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Replay recorded pad events and sign a PDF with the result
    Sign {
        /// PDF to sign
        pdf: PathBuf,
        /// JSON file with the recorded events
        events: PathBuf,
        /// Where to write the signed PDF
        #[arg(short, long, default_value = "signed.pdf")]
        output: PathBuf,
    },
    /// Print page count and last page details of a PDF
    Inspect { pdf: PathBuf },
}

/// A recorded gesture sequence, as accepted by `sign`.
#[derive(Deserialize)]
struct Recording {
    #[serde(default)]
    layout: Option<Layout>,
    events: Vec<InputEvent>,
}

struct ApiError(SignError);

impl From<SignError> for ApiError {
    fn from(e: SignError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            SignError::MalformedDocument(_) | SignError::EmptyDocument | SignError::InvalidImage(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            SignError::MissingInput(_) => StatusCode::BAD_REQUEST,
            SignError::Busy => StatusCode::CONFLICT,
            SignError::Serialize(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        log::warn!("request failed: {}", self.0);
        let body = serde_json::json!({ "error": self.0.code(), "message": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SurfaceReply {
    state: SurfaceState,
    captures_touch: bool,
}

impl SurfaceReply {
    fn of(surface: &Surface) -> Self {
        SurfaceReply {
            state: surface.state(),
            captures_touch: surface.captures_touch(),
        }
    }
}

async fn get_status(State(session): State<SharedSession>) -> Json<context::SessionStatus> {
    Json(lock(&session).status())
}

async fn upload_document(
    State(session): State<SharedSession>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                let name = field.name().unwrap_or("").to_string();
                let file_name = field.file_name().unwrap_or("document.pdf").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|_| SignError::MissingInput("unreadable upload"))?;
                if name == "file" {
                    log::info!("received {} ({} bytes)", file_name, data.len());
                    let mut session = lock(&session);
                    session.load_source(data.to_vec())?;
                    return Ok(Json(session.status()).into_response());
                }
            }
            Ok(None) => break,
            Err(_) => return Err(SignError::MissingInput("malformed multipart body").into()),
        }
    }
    Err(SignError::MissingInput("no file field in upload").into())
}

async fn set_layout(State(session): State<SharedSession>, Json(layout): Json<Layout>) -> Json<context::SessionStatus> {
    let mut session = lock(&session);
    session.surface.set_layout(layout);
    Json(session.status())
}

async fn surface_event(State(session): State<SharedSession>, Json(event): Json<InputEvent>) -> Json<SurfaceReply> {
    let mut session = lock(&session);
    session.surface.handle(event);
    Json(SurfaceReply::of(&session.surface))
}

async fn clear_surface(State(session): State<SharedSession>) -> Json<SurfaceReply> {
    let mut session = lock(&session);
    session.surface.clear();
    log::debug!("signature cleared");
    Json(SurfaceReply::of(&session.surface))
}

#[derive(Deserialize)]
struct ExportParams {
    format: Option<String>, // "png" (default) or "dataurl"
}

async fn export_surface(
    State(session): State<SharedSession>,
    Query(params): Query<ExportParams>,
) -> Result<Response, ApiError> {
    let raster = lock(&session).surface.export_png()?;
    match params.format.as_deref() {
        Some("dataurl") => Ok(format!("data:image/png;base64,{}", BASE64_STANDARD.encode(&raster.png)).into_response()),
        _ => Ok(([(header::CONTENT_TYPE, "image/png")], raster.png).into_response()),
    }
}

async fn sign_document(State(session): State<SharedSession>) -> Result<Json<PagedViewer>, ApiError> {
    Ok(Json(context::sign(&session).await?))
}

#[derive(Deserialize)]
struct OutputParams {
    #[serde(default)]
    download: bool,
}

async fn get_output(
    State(session): State<SharedSession>,
    Query(params): Query<OutputParams>,
) -> Result<Response, StatusCode> {
    let output = lock(&session).output().ok_or(StatusCode::NOT_FOUND)?;
    let disposition = if params.download {
        r#"attachment; filename="signed.pdf""#
    } else {
        "inline"
    };
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf"),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        output.to_vec(),
    )
        .into_response())
}

#[derive(Deserialize)]
struct PageParams {
    page: u32,
}

async fn viewer_page(State(session): State<SharedSession>, Json(params): Json<PageParams>) -> Json<PagedViewer> {
    let mut session = lock(&session);
    session.viewer.render_page(params.page);
    Json(session.viewer)
}

async fn viewer_next(State(session): State<SharedSession>) -> Json<PagedViewer> {
    let mut session = lock(&session);
    session.viewer.next_page();
    Json(session.viewer)
}

async fn viewer_prev(State(session): State<SharedSession>) -> Json<PagedViewer> {
    let mut session = lock(&session);
    session.viewer.prev_page();
    Json(session.viewer)
}

fn router(session: SharedSession, body_limit: usize) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/document", post(upload_document))
        .route("/api/surface/layout", post(set_layout))
        .route("/api/surface/event", post(surface_event))
        .route("/api/surface/clear", post(clear_surface))
        .route("/api/surface/export", get(export_surface))
        .route("/api/sign", post(sign_document))
        .route("/api/output", get(get_output))
        .route("/api/viewer/page", post(viewer_page))
        .route("/api/viewer/next", post(viewer_next))
        .route("/api/viewer/prev", post(viewer_prev))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(session)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Some(Commands::Sign { pdf, events, output }) => sign_file(config, &pdf, &events, &output),
        Some(Commands::Inspect { pdf }) => inspect_file(&pdf),
        Some(Commands::Serve { port }) => serve(config, port).await,
        None => serve(config, None).await,
    }
}

fn sign_file(config: Config, pdf: &std::path::Path, events: &std::path::Path, output: &std::path::Path) -> anyhow::Result<()> {
    let source = std::fs::read(pdf).with_context(|| format!("reading {}", pdf.display()))?;
    let text = std::fs::read_to_string(events).with_context(|| format!("reading {}", events.display()))?;
    let recording: Recording =
        serde_json::from_str(&text).with_context(|| format!("parsing events in {}", events.display()))?;

    let mut surface = config.new_surface()?;
    if let Some(layout) = recording.layout {
        surface.set_layout(layout);
    }
    for event in recording.events {
        surface.handle(event);
    }
    if surface.is_blank() {
        return Err(SignError::MissingInput("the recorded events draw nothing").into());
    }

    let raster = surface.export_png()?;
    let signed = config.compositor().sign_last_page(&source, &raster.png)?;
    std::fs::write(output, &signed).with_context(|| format!("writing {}", output.display()))?;
    log::info!("signed {} -> {}", pdf.display(), output.display());
    Ok(())
}

fn inspect_file(pdf: &std::path::Path) -> anyhow::Result<()> {
    let bytes = std::fs::read(pdf).with_context(|| format!("reading {}", pdf.display()))?;
    let summary = compositor::summarize(&bytes)?;
    println!("Pages: {}", summary.page_count);
    println!("Last page size: {} x {}", summary.last_page_size.0, summary.last_page_size.1);
    println!("Images on last page: {}", summary.last_page_images);
    Ok(())
}

async fn serve(config: Config, port: Option<u16>) -> anyhow::Result<()> {
    let port = port.unwrap_or(config.port);
    let body_limit = config.body_limit;
    let session = SigningSession::new(config)?.shared();
    let app = router(session, body_limit);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    log::info!("Backend listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("shutting down");
        })
        .await?;
    Ok(())
}
