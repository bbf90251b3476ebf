use crate::collectors::processes::{filter_processes, sort_processes, ProcessSort};
use crate::collectors::ProcessRecord;
use crate::context::AgentContext;
use crate::metrics::Metrics;
use crate::poll::{RefreshTrigger, ViewKind};
use crate::state::State as AgentState;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header::CONTENT_TYPE, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone)]
pub struct HttpAppState {
    pub metrics: Arc<Metrics>,
    pub ctx: Arc<AgentContext>,
    pub triggers: Arc<HashMap<ViewKind, RefreshTrigger>>,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiState {
    pub persist_enabled: bool,
    pub database_connected: bool,
    pub session_id: Option<String>,
    #[serde(flatten)]
    pub state: AgentState,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProcessQuery {
    #[serde(default)]
    pub filter: String,
    #[serde(default)]
    pub sort: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PersistRequest {
    pub enabled: bool,
}

pub fn build_router(state: HttpAppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler))
        .route("/api/state", get(state_handler))
        .route("/api/processes", get(processes_handler))
        .route("/api/persist", post(persist_handler))
        .route("/api/refresh/:view", post(refresh_handler))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn metrics_handler(State(state): State<HttpAppState>) -> Response {
    state.metrics.inc_scrape_count();
    match state.metrics.encode_metrics() {
        Ok(encoded) => {
            let mut response = Response::new(Body::from(encoded));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("ошибка кодирования метрик: {err}"),
        )
            .into_response(),
    }
}

async fn state_handler(State(state): State<HttpAppState>) -> impl IntoResponse {
    let guard = state.ctx.state.read().await;
    Json(ApiState {
        persist_enabled: state.ctx.persist_enabled(),
        database_connected: state.ctx.writer.is_some(),
        session_id: state.session_id.clone(),
        state: guard.clone(),
    })
}

async fn processes_handler(
    State(state): State<HttpAppState>,
    Query(query): Query<ProcessQuery>,
) -> Response {
    let sort = match query.sort.as_deref().map(str::parse::<ProcessSort>) {
        None => ProcessSort::default(),
        Some(Ok(sort)) => sort,
        Some(Err(err)) => return (StatusCode::BAD_REQUEST, Json(err)).into_response(),
    };
    let guard = state.ctx.state.read().await;
    let Some(processes) = guard.processes.as_deref() else {
        return Json(Vec::<ProcessRecord>::new()).into_response();
    };
    let mut list = filter_processes(processes, &query.filter);
    drop(guard);
    sort_processes(&mut list, sort);
    Json(list).into_response()
}

async fn persist_handler(
    State(state): State<HttpAppState>,
    Json(body): Json<PersistRequest>,
) -> Response {
    match state.ctx.set_persist(body.enabled) {
        Ok(()) => Json(serde_json::json!({ "enabled": state.ctx.persist_enabled() }))
            .into_response(),
        Err(err) => (StatusCode::CONFLICT, Json(err.to_string())).into_response(),
    }
}

async fn refresh_handler(
    State(state): State<HttpAppState>,
    Path(view): Path<String>,
) -> Response {
    let Some((kind, trigger)) = view
        .parse::<ViewKind>()
        .ok()
        .and_then(|kind| state.triggers.get(&kind).map(|t| (kind, t)))
    else {
        return (StatusCode::NOT_FOUND, Json(format!("unknown view '{view}'"))).into_response();
    };
    let accepted = trigger.request();
    if !accepted {
        state.metrics.inc_refresh_debounced(kind.as_str());
    }
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "view": kind, "accepted": accepted })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::poll::{spawn_view, PhaseReporter, ViewCycle};
    use axum::body::to_bytes;
    use axum::http::Request;
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;
    use tokio::sync::{watch, RwLock};
    use tower::ServiceExt;

    fn app_state(triggers: HashMap<ViewKind, RefreshTrigger>) -> HttpAppState {
        let metrics = Metrics::new().expect("инициализация метрик");
        let ctx = AgentContext::new(
            Config::default(),
            Arc::new(RwLock::new(AgentState::new(10))),
            metrics.clone(),
            None,
            false,
        );
        HttpAppState {
            metrics,
            ctx,
            triggers: Arc::new(triggers),
            session_id: Some("test-session".to_string()),
        }
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, String) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn healthz_returns_ok() {
        let app = build_router(app_state(HashMap::new()));
        let (status, body) = send(app, get_req("/healthz")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn metrics_contains_uptime() {
        let state = app_state(HashMap::new());
        state.metrics.update_from_state(&AgentState::new(0));
        let (status, body) = send(build_router(state), get_req("/metrics")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("inventory_uptime_seconds"));
    }

    #[tokio::test]
    async fn api_state_returns_json() {
        let app = build_router(app_state(HashMap::new()));
        let (status, body) = send(app, get_req("/api/state")).await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["persist_enabled"], false);
        assert_eq!(json["session_id"], "test-session");
        assert_eq!(json["started_at_unix"], 10);
        assert!(json["hardware"].is_object());
    }

    #[tokio::test]
    async fn processes_are_filtered_and_sorted() {
        let state = app_state(HashMap::new());
        let record = |pid: u32, name: &str, cpu: f64| ProcessRecord {
            pid,
            name: name.to_string(),
            cpu_percent: cpu,
            memory_percent: 0.0,
            memory_bytes: 0,
            status: "Run".to_string(),
            user: "root".to_string(),
            command: format!("/usr/bin/{name}"),
        };
        state.ctx.state.write().await.update_processes(
            1,
            Some(vec![
                record(1, "systemd", 0.1),
                record(20, "sshd", 0.5),
                record(30, "sshd-session", 2.0),
            ]),
        );

        let app = build_router(state);
        let (status, body) = send(app.clone(), get_req("/api/processes?filter=SSH&sort=pid")).await;
        assert_eq!(status, StatusCode::OK);
        let list: Vec<serde_json::Value> = serde_json::from_str(&body).unwrap();
        let pids: Vec<u64> = list.iter().map(|p| p["pid"].as_u64().unwrap()).collect();
        assert_eq!(pids, vec![30, 20]);

        let (status, _) = send(app, get_req("/api/processes?sort=size")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn persist_without_database_conflicts() {
        let app = build_router(app_state(HashMap::new()));
        let (status, _) = send(app.clone(), post_json("/api/persist", r#"{"enabled":true}"#)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        let (status, body) = send(app, post_json("/api/persist", r#"{"enabled":false}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("\"enabled\":false"));
    }

    struct Noop;

    impl ViewCycle for Noop {
        fn run<'a>(
            &'a mut self,
            _phase: &'a PhaseReporter,
        ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
            Box::pin(async {})
        }
    }

    #[tokio::test]
    async fn refresh_routes_to_known_views() {
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = spawn_view(ViewKind::Servers, Duration::from_secs(3600), Noop, stop_rx);
        let mut triggers = HashMap::new();
        triggers.insert(ViewKind::Servers, handle.trigger.clone());
        let app = build_router(app_state(triggers));

        let (status, body) = send(app.clone(), post_json("/api/refresh/servers", "")).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(body.contains("\"view\":\"servers\""));

        let (status, _) = send(app.clone(), post_json("/api/refresh/printers", "")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(app, post_json("/api/refresh/hardware", "")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        stop_tx.send(true).unwrap();
        handle.task.await.unwrap();
    }
}
