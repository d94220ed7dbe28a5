use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use axum::{
    extract::{Path, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Playlist {
    pub id: Uuid,
    pub name: String,
    pub public: bool,
}

#[derive(Deserialize)]
pub struct CreatePlaylist {
    pub name: String,
    #[serde(default)]
    pub public: bool,
}

#[derive(Deserialize)]
pub struct UpdatePlaylist {
    pub name: Option<String>,
    pub public: Option<bool>,
}

/// Scripted misbehaviour for the next request to a route.
#[derive(Clone, Debug)]
pub enum Fault {
    /// Answer with this status instead of running the handler.
    Status {
        status: u16,
        retry_after: Option<String>,
    },
    /// Stall, then serve normally.
    Delay(Duration),
}

impl Fault {
    pub fn status(status: u16) -> Self {
        Fault::Status {
            status,
            retry_after: None,
        }
    }

    pub fn rate_limited(retry_after: impl Into<String>) -> Self {
        Fault::Status {
            status: 429,
            retry_after: Some(retry_after.into()),
        }
    }
}

pub type Db = Arc<RwLock<HashMap<Uuid, Playlist>>>;

/// Shared state plus the test-facing fault script and hit counters.
///
/// Routes are keyed as `"METHOD /path"`, e.g. `"GET /playlists"`.
#[derive(Clone, Default)]
pub struct Backend {
    db: Db,
    faults: Arc<Mutex<HashMap<String, VecDeque<Fault>>>>,
    hits: Arc<Mutex<HashMap<String, usize>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Backend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue faults for a route; each request consumes one.
    pub fn script(&self, route: &str, faults: impl IntoIterator<Item = Fault>) {
        lock(&self.faults)
            .entry(route.to_string())
            .or_default()
            .extend(faults);
    }

    pub fn hits(&self, route: &str) -> usize {
        lock(&self.hits).get(route).copied().unwrap_or(0)
    }

    pub fn reset(&self) {
        lock(&self.faults).clear();
        lock(&self.hits).clear();
    }

    fn record(&self, route: &str) -> Option<Fault> {
        *lock(&self.hits).entry(route.to_string()).or_default() += 1;
        lock(&self.faults).get_mut(route).and_then(VecDeque::pop_front)
    }
}

pub fn app(backend: Backend) -> Router {
    Router::new()
        .route("/playlists", get(list_playlists).post(create_playlist))
        .route(
            "/playlists/{id}",
            get(get_playlist)
                .put(update_playlist)
                .patch(update_playlist)
                .delete(delete_playlist),
        )
        .route("/ping", get(ping))
        .route("/echo", get(echo).post(echo))
        .layer(middleware::from_fn_with_state(backend.clone(), inject_faults))
        .with_state(backend)
}

pub async fn run(listener: TcpListener, backend: Backend) -> Result<(), std::io::Error> {
    axum::serve(listener, app(backend)).await
}

async fn inject_faults(State(backend): State<Backend>, request: Request, next: Next) -> Response {
    let route = format!("{} {}", request.method(), request.uri().path());
    match backend.record(&route) {
        Some(Fault::Status {
            status,
            retry_after,
        }) => {
            info!(%route, status, ?retry_after, "injecting status fault");
            let code = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let mut response = (code, format!("injected {status}")).into_response();
            if let Some(value) = retry_after.and_then(|v| HeaderValue::from_str(&v).ok()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
            response
        }
        Some(Fault::Delay(delay)) => {
            info!(%route, delay_ms = delay.as_millis() as u64, "injecting delay");
            tokio::time::sleep(delay).await;
            next.run(request).await
        }
        None => {
            debug!(%route, "serving");
            next.run(request).await
        }
    }
}

async fn list_playlists(State(backend): State<Backend>) -> Json<Vec<Playlist>> {
    let playlists = backend.db.read().await;
    Json(playlists.values().cloned().collect())
}

async fn create_playlist(
    State(backend): State<Backend>,
    Json(input): Json<CreatePlaylist>,
) -> (StatusCode, Json<Playlist>) {
    let playlist = Playlist {
        id: Uuid::new_v4(),
        name: input.name,
        public: input.public,
    };
    backend.db.write().await.insert(playlist.id, playlist.clone());
    (StatusCode::CREATED, Json(playlist))
}

async fn get_playlist(
    State(backend): State<Backend>,
    Path(id): Path<Uuid>,
) -> Result<Json<Playlist>, StatusCode> {
    let playlists = backend.db.read().await;
    playlists.get(&id).cloned().map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn update_playlist(
    State(backend): State<Backend>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdatePlaylist>,
) -> Result<Json<Playlist>, StatusCode> {
    let mut playlists = backend.db.write().await;
    let playlist = playlists.get_mut(&id).ok_or(StatusCode::NOT_FOUND)?;
    if let Some(name) = input.name {
        playlist.name = name;
    }
    if let Some(public) = input.public {
        playlist.public = public;
    }
    Ok(Json(playlist.clone()))
}

async fn delete_playlist(
    State(backend): State<Backend>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, StatusCode> {
    let mut playlists = backend.db.write().await;
    playlists
        .remove(&id)
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn ping() -> &'static str {
    "pong"
}

/// Reflects the headers the client attached.
async fn echo(headers: HeaderMap) -> Json<serde_json::Value> {
    let value = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);
    Json(json!({
        "authorization": value("authorization"),
        "request_id": value("x-request-id"),
    }))
}
