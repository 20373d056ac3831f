use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use doc_store::{Database, Document, ReplaceOutcome, StoreError};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

const PLAYERS: &str = "players";
const WORLD: &str = "world";

const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Shared handle to the document store. Cloneable; injected into each
/// repository at construction. When a persistence path is set, every
/// successful write snapshots the whole database back to that file.
#[derive(Clone)]
pub struct Store {
    db: Arc<RwLock<Database>>,
    persist_path: Option<PathBuf>,
}

impl Store {
    pub fn in_memory() -> Self {
        Self::from_db(Database::new(), None)
    }

    /// Open a store backed by `path`, loading a previous snapshot if one
    /// exists there.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let db = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<Database>(&bytes) {
                Ok(db) => db,
                Err(err) => {
                    tracing::warn!(
                        "ignoring unreadable snapshot at {}: {err}",
                        path.display()
                    );
                    Database::new()
                }
            },
            Err(_) => Database::new(),
        };
        Self::from_db(db, Some(path))
    }

    fn from_db(mut db: Database, persist_path: Option<PathBuf>) -> Self {
        // Production index: player names are unique across the collection.
        db.collection_mut(PLAYERS).create_unique_index("player_name");
        Self {
            db: Arc::new(RwLock::new(db)),
            persist_path,
        }
    }

    /// Availability probe for the health endpoint. A persisted store is
    /// connected when its snapshot location is reachable; an in-memory
    /// store always is.
    pub async fn ping(&self) -> Result<(), std::io::Error> {
        if let Some(path) = &self.persist_path {
            let dir = match path.parent() {
                Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
                _ => PathBuf::from("."),
            };
            tokio::fs::metadata(dir).await?;
        }
        Ok(())
    }

    async fn persist(&self) {
        if let Some(path) = &self.persist_path {
            let snapshot = {
                let db = self.db.read().await;
                serde_json::to_vec_pretty(&*db)
            };
            match snapshot {
                Ok(json) => {
                    if let Err(err) = tokio::fs::write(path, json).await {
                        tracing::error!("persist error: {err}");
                    }
                }
                Err(err) => tracing::error!("persist error: {err}"),
            }
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RepoError {
    #[error("player_name is required")]
    MissingPlayerName,
    #[error("player_name already exists")]
    DuplicateName,
    #[error("player not found")]
    NotFound,
}

impl IntoResponse for RepoError {
    fn into_response(self) -> Response {
        let status = match self {
            RepoError::MissingPlayerName => StatusCode::BAD_REQUEST,
            RepoError::DuplicateName => StatusCode::CONFLICT,
            RepoError::NotFound => StatusCode::NOT_FOUND,
        };
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// CRUD over the `players` collection. Player documents are open field
/// bags; `player_id` and `player_name` are ordinary fields inside them.
#[derive(Clone)]
pub struct PlayerRepository {
    store: Store,
}

impl PlayerRepository {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Create a player with a freshly generated id. `player_name` must be a
    /// non-empty string; any caller-supplied `player_id` is overwritten.
    /// Name uniqueness is enforced by the store's constraint at insert, not
    /// by a separate lookup, so concurrent creates cannot both win.
    pub async fn create(&self, mut fields: Document) -> Result<Document, RepoError> {
        let has_name = fields
            .get("player_name")
            .and_then(Value::as_str)
            .is_some_and(|n| !n.is_empty());
        if !has_name {
            return Err(RepoError::MissingPlayerName);
        }

        let player_id = Uuid::new_v4().to_string();
        fields.insert("player_id".to_string(), Value::String(player_id));

        let inserted = {
            let mut db = self.store.db.write().await;
            db.collection_mut(PLAYERS).insert_one(fields.clone())
        };
        match inserted {
            Ok(()) => {
                self.store.persist().await;
                Ok(fields)
            }
            Err(StoreError::DuplicateKey { .. }) => Err(RepoError::DuplicateName),
        }
    }

    /// Lenient lookup: a missing name is `None`, never an error.
    pub async fn get_by_name(&self, name: &str) -> Option<Document> {
        let db = self.store.db.read().await;
        db.collection(PLAYERS)?
            .find_one("player_name", &Value::String(name.to_string()))
            .cloned()
    }

    pub async fn exists_by_name(&self, name: &str) -> bool {
        self.get_by_name(name).await.is_some()
    }

    /// Id-addressed lookup; a miss is an error, unlike `get_by_name`.
    pub async fn get_by_id(&self, id: &str) -> Result<Document, RepoError> {
        let db = self.store.db.read().await;
        db.collection(PLAYERS)
            .and_then(|c| c.find_one("player_id", &Value::String(id.to_string())))
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    /// Replace the whole document addressed by `id`, creating it when
    /// absent. Returns whether a new document was created. The stored
    /// `player_id` is always the addressed id, whatever the body says.
    /// Name uniqueness is not re-checked here; only `create` enforces it.
    pub async fn upsert(&self, id: &str, mut fields: Document) -> bool {
        fields.insert("player_id".to_string(), Value::String(id.to_string()));
        let outcome = {
            let mut db = self.store.db.write().await;
            db.collection_mut(PLAYERS).replace_one(
                "player_id",
                &Value::String(id.to_string()),
                fields,
                true,
            )
        };
        self.store.persist().await;
        outcome == ReplaceOutcome::Upserted
    }

    pub async fn delete_by_id(&self, id: &str) -> Result<(), RepoError> {
        let deleted = {
            let mut db = self.store.db.write().await;
            db.collection_mut(PLAYERS)
                .delete_one("player_id", &Value::String(id.to_string()))
        };
        if !deleted {
            return Err(RepoError::NotFound);
        }
        self.store.persist().await;
        Ok(())
    }
}

/// Whole-document access to the singleton `world` collection.
#[derive(Clone)]
pub struct WorldRepository {
    store: Store,
}

impl WorldRepository {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn get(&self) -> Option<Document> {
        let db = self.store.db.read().await;
        db.collection(WORLD)?.find_first().cloned()
    }

    /// Replace the world document wholesale, creating it on first write.
    /// Fields absent from `fields` are dropped, never merged.
    pub async fn replace(&self, fields: Document) {
        {
            let mut db = self.store.db.write().await;
            db.collection_mut(WORLD).replace_first(fields);
        }
        self.store.persist().await;
    }
}

#[derive(Clone)]
pub struct AppState {
    players: PlayerRepository,
    world: WorldRepository,
    store: Store,
}

impl AppState {
    pub fn new(store: Store) -> Self {
        Self {
            players: PlayerRepository::new(store.clone()),
            world: WorldRepository::new(store.clone()),
            store,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Store::in_memory())
    }

    pub async fn with_persistence(path: impl Into<PathBuf>) -> Self {
        Self::new(Store::open(path).await)
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/players", post(create_player))
        .route("/api/players/by-name/:name", get(get_player_by_name))
        .route("/api/players/by-name/:name/exists", get(player_exists))
        .route(
            "/api/players/:id",
            get(get_player).put(upsert_player).delete(delete_player),
        )
        .route("/api/world", get(get_world).put(replace_world))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    db: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct AckResponse {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    upserted: Option<bool>,
}

#[derive(Serialize)]
struct ExistsResponse {
    exists: bool,
}

async fn health(State(state): State<AppState>) -> Response {
    match state.store.ping().await {
        Ok(()) => Json(HealthResponse {
            status: "ok",
            db: "connected",
            error: None,
        })
        .into_response(),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "error",
                db: "disconnected",
                error: Some(err.to_string()),
            }),
        )
            .into_response(),
    }
}

async fn create_player(
    State(state): State<AppState>,
    Json(fields): Json<Document>,
) -> Result<impl IntoResponse, RepoError> {
    let doc = state.players.create(fields).await?;
    Ok((StatusCode::CREATED, Json(Value::Object(doc))))
}

async fn get_player_by_name(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Json<Value> {
    let doc = state.players.get_by_name(&name).await.unwrap_or_default();
    Json(Value::Object(doc))
}

async fn player_exists(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Json<ExistsResponse> {
    let exists = state.players.exists_by_name(&name).await;
    Json(ExistsResponse { exists })
}

async fn get_player(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, RepoError> {
    let doc = state.players.get_by_id(&id).await?;
    Ok(Json(Value::Object(doc)))
}

async fn upsert_player(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(fields): Json<Document>,
) -> Json<AckResponse> {
    let upserted = state.players.upsert(&id, fields).await;
    Json(AckResponse {
        ok: true,
        upserted: upserted.then_some(true),
    })
}

async fn delete_player(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AckResponse>, RepoError> {
    state.players.delete_by_id(&id).await?;
    Ok(Json(AckResponse {
        ok: true,
        upserted: None,
    }))
}

async fn get_world(State(state): State<AppState>) -> Json<Value> {
    let doc = state.world.get().await.unwrap_or_default();
    Json(Value::Object(doc))
}

async fn replace_world(
    State(state): State<AppState>,
    Json(fields): Json<Document>,
) -> Json<AckResponse> {
    state.world.replace(fields).await;
    Json(AckResponse {
        ok: true,
        upserted: None,
    })
}
