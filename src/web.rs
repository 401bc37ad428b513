use std::{net::SocketAddr, sync::Arc};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse},
    routing::get,
};
use tower_http::cors::{Any, CorsLayer};

use crate::{
    chart::render_svg,
    config::{ChartSource, Charts},
    page::{PAGE_TITLE, render_all, render_page},
    series::load_series,
};

#[derive(Clone)]
pub struct AppState {
    pub charts: Arc<Charts>,
}

type ApiResult<T> = Result<T, (StatusCode, String)>;

fn internal_error<E: std::fmt::Display>(e: E) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

/// Runs file-reading work off the runtime threads; a panicked task is a 500.
async fn blocking<T: Send + 'static>(f: impl FnOnce() -> T + Send + 'static) -> ApiResult<T> {
    tokio::task::spawn_blocking(f).await.map_err(internal_error)
}

fn not_found(what: &str) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, format!("no chart {}", what))
}

pub fn router(charts: Charts) -> Router {
    let state = AppState {
        charts: Arc::new(charts),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index))
        .route("/charts/{id}", get(chart_svg))
        .route("/static/media/{file}", get(media_file))
        .route("/api/charts", get(list_charts))
        .layer(cors)
        .with_state(state)
}

pub async fn serve(charts: Charts, bind: SocketAddr) -> anyhow::Result<()> {
    tracing::info!(
        media_dir = %charts.media_dir.display(),
        charts = charts.sources.len(),
        "serving charts"
    );
    let app = router(charts);

    tracing::info!("Listening on http://{}", bind);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index(State(st): State<AppState>) -> ApiResult<Html<String>> {
    let charts = st.charts.clone();
    let html = blocking(move || render_page(PAGE_TITLE, &render_all(&charts))).await?;
    Ok(Html(html))
}

async fn chart_svg(
    State(st): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = id.strip_suffix(".svg").unwrap_or(&id).to_string();
    let src = st.charts.get(&id).ok_or_else(|| not_found(&id))?;
    let path = st.charts.path_of(src);

    let series = blocking(move || load_series(&path))
        .await?
        .map_err(|e| internal_error(format!("{:#}", e)))?;

    Ok((
        [(header::CONTENT_TYPE, "image/svg+xml")],
        render_svg(&id, &series),
    ))
}

async fn media_file(
    State(st): State<AppState>,
    Path(file): Path<String>,
) -> ApiResult<impl IntoResponse> {
    // only files that back a configured chart are exposed
    let src = st.charts.by_file(&file).ok_or_else(|| not_found(&file))?;
    let path = st.charts.path_of(src);

    let body = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => not_found(&file),
        _ => internal_error(e),
    })?;

    Ok(([(header::CONTENT_TYPE, "application/json")], body))
}

async fn list_charts(State(st): State<AppState>) -> Json<Vec<ChartSource>> {
    Json(st.charts.sources.clone())
}
