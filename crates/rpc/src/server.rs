use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use namereg_registry::{
    CreateRequest, IdentityRegistry, LookupEngine, LookupMode, LookupReply, RegistryError,
    UpdateOutcome, UpdateRequest,
};
use namereg_types::{is_valid_address, IdentityRecord};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<IdentityRegistry>,
    pub lookups: Arc<LookupEngine>,
    pub node_id: String,
    pub start_time: Instant,
    pub req_count: Arc<AtomicUsize>,
}

impl AppState {
    fn record_request(&self) -> u64 {
        self.req_count.fetch_add(1, Ordering::Relaxed) as u64 + 1
    }

    fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

type SharedState = Arc<AppState>;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    node_id: String,
    uptime_secs: u64,
    req_total: u64,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new<S: Into<String>>(status: StatusCode, message: S) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        let status = match &err {
            RegistryError::AddressParse(_)
            | RegistryError::InvalidName(_)
            | RegistryError::ImmutableField { .. } => StatusCode::BAD_REQUEST,
            RegistryError::NameTaken { .. } | RegistryError::DuplicateRegistration { .. } => {
                StatusCode::CONFLICT
            }
            RegistryError::NotFound { .. } => StatusCode::NOT_FOUND,
            RegistryError::Storage(_)
            | RegistryError::Serialization(_)
            | RegistryError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let payload = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, payload).into_response()
    }
}

/// Query contract of the lookup endpoint. Exactly one of the keys is
/// expected; they are checked in the order existing clients rely on.
#[derive(Debug, Default, Deserialize)]
struct LookupParams {
    #[serde(default)]
    lookup: Option<String>,
    #[serde(default)]
    lookup2: Option<String>,
    #[serde(default)]
    by_telegram: Option<String>,
    #[serde(default)]
    by_order: Option<String>,
    #[serde(default)]
    all_delegations: Option<String>,
}

impl LookupParams {
    /// Map the query onto a lookup mode. A bare `lookup` key is an address
    /// when it parses as one, otherwise an exact name.
    fn classify(self) -> Option<(String, LookupMode)> {
        if let Some(key) = self.lookup {
            let mode = if is_valid_address(&key) {
                LookupMode::Address
            } else {
                LookupMode::NameExact
            };
            return Some((key, mode));
        }
        if let Some(key) = self.lookup2 {
            return Some((key, LookupMode::NameList));
        }
        if let Some(key) = self.by_telegram {
            return Some((key, LookupMode::Telegram));
        }
        if let Some(key) = self.by_order {
            return Some((key, LookupMode::OrderHash));
        }
        if self.all_delegations.is_some() {
            return Some((String::new(), LookupMode::AllDelegations));
        }
        None
    }
}

pub async fn start_server(state: AppState, addr: &str) -> Result<()> {
    let shared = Arc::new(state);
    let app = build_router(shared);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind RPC listener on {addr}"))?;
    info!("RPC listening on {addr}");
    axum::serve(listener, app)
        .await
        .context("RPC server terminated unexpectedly")
}

fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/identity", post(handle_create))
        .route("/identity/update", post(handle_update))
        .route("/lookup", get(handle_lookup))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let req_total = state.record_request();
    Json(HealthResponse {
        status: "ok",
        node_id: state.node_id.clone(),
        uptime_secs: state.uptime_seconds(),
        req_total,
    })
}

async fn handle_create(
    State(state): State<SharedState>,
    Json(request): Json<CreateRequest>,
) -> Result<Json<IdentityRecord>, ApiError> {
    state.record_request();
    let record = state.registry.create(request)?;
    Ok(Json(record))
}

async fn handle_update(
    State(state): State<SharedState>,
    Json(request): Json<UpdateRequest>,
) -> Result<Json<UpdateOutcome>, ApiError> {
    state.record_request();
    let outcome = state.registry.update(request)?;
    Ok(Json(outcome))
}

async fn handle_lookup(
    State(state): State<SharedState>,
    Query(params): Query<LookupParams>,
) -> Result<Json<LookupReply>, ApiError> {
    state.record_request();
    let (key, mode) = params.classify().ok_or_else(|| {
        ApiError::new(StatusCode::BAD_REQUEST, "missing or invalid query parameter")
    })?;
    let reply = state.lookups.lookup(&key, mode)?;
    Ok(Json(reply))
}

#[cfg(test)]
mod tests {
    use super::*;
    use namereg_registry::RegistrySettings;
    use namereg_storage::{KeyLocks, KvStore, MemoryKvStore};
    use namereg_types::{encode_address, NetworkDef, ADDRESS_VERSION};

    const NET_ID: u64 = 0x0404_2022_0000_0000;

    fn wallet(seed: u8) -> String {
        encode_address(ADDRESS_VERSION, NET_ID, 2, &[seed; 32])
    }

    fn state() -> SharedState {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let locks = Arc::new(KeyLocks::default());
        let settings = Arc::new(RegistrySettings {
            networks: vec![NetworkDef {
                name: "backbone".into(),
                net_id: NET_ID,
            }],
            disallowed_names: Vec::new(),
        });
        Arc::new(AppState {
            registry: Arc::new(IdentityRegistry::new(
                store.clone(),
                locks,
                settings.clone(),
            )),
            lookups: Arc::new(LookupEngine::new(store, settings)),
            node_id: "namereg-test".into(),
            start_time: Instant::now(),
            req_count: Arc::new(AtomicUsize::new(0)),
        })
    }

    #[tokio::test]
    async fn create_then_lookup_roundtrip() {
        let state = state();

        let created = handle_create(
            State(state.clone()),
            Json(CreateRequest {
                name: "alice".into(),
                wallet: wallet(1),
                tx_hash: None,
            }),
        )
        .await
        .expect("create");
        assert!(created.0.registered_names.contains_key("alice"));

        let reply = handle_lookup(
            State(state),
            Query(LookupParams {
                lookup: Some("alice".into()),
                ..LookupParams::default()
            }),
        )
        .await
        .expect("lookup");
        match reply.0 {
            LookupReply::Record(view) => {
                assert_eq!(view.wallet_addresses["backbone"], wallet(1))
            }
            other => panic!("expected record reply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn wallet_lookup_key_is_classified_as_address() {
        let state = state();
        handle_create(
            State(state.clone()),
            Json(CreateRequest {
                name: "alice".into(),
                wallet: wallet(1),
                tx_hash: None,
            }),
        )
        .await
        .expect("create");

        let reply = handle_lookup(
            State(state),
            Query(LookupParams {
                lookup: Some(wallet(1)),
                ..LookupParams::default()
            }),
        )
        .await
        .expect("lookup");
        assert!(matches!(reply.0, LookupReply::Record(_)));
    }

    #[tokio::test]
    async fn conflicts_map_to_409_and_misses_to_404() {
        let state = state();
        handle_create(
            State(state.clone()),
            Json(CreateRequest {
                name: "alice".into(),
                wallet: wallet(1),
                tx_hash: None,
            }),
        )
        .await
        .expect("create");

        let conflict = handle_create(
            State(state.clone()),
            Json(CreateRequest {
                name: "alice".into(),
                wallet: wallet(2),
                tx_hash: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(conflict.status, StatusCode::CONFLICT);

        let miss = handle_lookup(
            State(state),
            Query(LookupParams {
                lookup: Some("nobody".into()),
                ..LookupParams::default()
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(miss.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn update_with_guuid_is_a_bad_request() {
        let state = state();
        handle_create(
            State(state.clone()),
            Json(CreateRequest {
                name: "alice".into(),
                wallet: wallet(1),
                tx_hash: None,
            }),
        )
        .await
        .expect("create");

        let err = handle_update(
            State(state),
            Json(UpdateRequest {
                wallet: wallet(1),
                guuid: Some("other".into()),
                ..UpdateRequest::default()
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_query_parameter_is_rejected() {
        let state = state();
        let err = handle_lookup(State(state), Query(LookupParams::default()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }
}
