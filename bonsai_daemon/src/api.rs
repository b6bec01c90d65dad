use crate::stream;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bonsai_core::control::{
    ControllerStatus, ErrorResponse, EventRequest, EventResponse, LoadRequest, LoadingResults,
    StateMachineController, StatesResponse,
};
use bonsai_core::error::{BonsaiError, BonsaiResult};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<StateMachineController>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/states", get(states))
        .route("/states/stream", get(stream::stream_states))
        .route("/load", post(load))
        .route("/start", post(start))
        .route("/stop", post(stop))
        .route("/pause", post(pause))
        .route("/resume", post(resume))
        .route("/events", post(fire_event))
        .with_state(state)
}

/// Controller error rendered as `{"error": ..}` with a matching status code.
pub struct ApiError(BonsaiError);

impl From<BonsaiError> for ApiError {
    fn from(err: BonsaiError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = match &self.0 {
            BonsaiError::NotLoaded | BonsaiError::StateId(_) => StatusCode::NOT_FOUND,
            BonsaiError::InvalidState(_) => StatusCode::CONFLICT,
            _ => StatusCode::BAD_REQUEST,
        };
        let body = ErrorResponse {
            error: self.0.to_string(),
        };
        (code, Json(body)).into_response()
    }
}

/// Run a controller call off the async workers; stop and load may block.
async fn blocking<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&StateMachineController) -> BonsaiResult<T> + Send + 'static,
{
    let controller = Arc::clone(&state.controller);
    tokio::task::spawn_blocking(move || f(&controller))
        .await
        .map_err(|e| ApiError(BonsaiError::internal(format!("controller task failed: {}", e))))?
        .map_err(ApiError)
}

async fn health() -> &'static str {
    "OK"
}

async fn status(State(state): State<AppState>) -> Json<ControllerStatus> {
    Json(state.controller.status())
}

async fn states(State(state): State<AppState>) -> Json<StatesResponse> {
    Json(StatesResponse {
        current_states: state.controller.current_states(),
    })
}

async fn load(
    State(state): State<AppState>,
    Json(request): Json<LoadRequest>,
) -> Result<Json<LoadingResults>, ApiError> {
    let results = blocking(&state, move |c| Ok(c.load(&request.source))).await?;
    if results.success() {
        tracing::info!("Behavior loaded ({} warnings)", results.warnings.len());
    } else {
        tracing::warn!("Behavior rejected with {} errors", results.errors.len());
    }
    Ok(Json(results))
}

async fn command(
    state: AppState,
    name: &'static str,
    f: fn(&StateMachineController) -> BonsaiResult<()>,
) -> Result<Json<ControllerStatus>, ApiError> {
    blocking(&state, move |c| {
        f(c)?;
        Ok(c.status())
    })
    .await
    .map(|status| {
        tracing::debug!("{} -> {:?}", name, status.current_states);
        Json(status)
    })
}

async fn start(State(state): State<AppState>) -> Result<Json<ControllerStatus>, ApiError> {
    command(state, "start", StateMachineController::start).await
}

async fn stop(State(state): State<AppState>) -> Result<Json<ControllerStatus>, ApiError> {
    command(state, "stop", StateMachineController::stop).await
}

async fn pause(State(state): State<AppState>) -> Result<Json<ControllerStatus>, ApiError> {
    command(state, "pause", StateMachineController::pause).await
}

async fn resume(State(state): State<AppState>) -> Result<Json<ControllerStatus>, ApiError> {
    command(state, "resume", StateMachineController::resume).await
}

async fn fire_event(
    State(state): State<AppState>,
    Json(request): Json<EventRequest>,
) -> Json<EventResponse> {
    Json(EventResponse {
        accepted: state.controller.fire_event(&request.event),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use bonsai_core::communication::CoreObjects;
    use bonsai_core::config::ControllerConfig;
    use bonsai_core::core::SkillRegistry;
    use bonsai_core::memory::WorkingMemory;
    use serde::de::DeserializeOwned;
    use tower::ServiceExt;

    const BEHAVIOR: &str = r#"<scxml initial="A">
        <state id="A"><transition event="next" target="B"/></state>
        <state id="B"/>
    </scxml>"#;

    fn app() -> Router {
        let controller = StateMachineController::new(
            ControllerConfig::testing(),
            SkillRegistry::with_builtins(),
            CoreObjects::new(),
            WorkingMemory::new(),
        )
        .unwrap();
        router(AppState {
            controller: Arc::new(controller),
        })
    }

    async fn call<T: DeserializeOwned>(
        app: &Router,
        method: &str,
        uri: &str,
        body: serde_json::Value,
    ) -> (StatusCode, T) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn lifecycle_over_http() {
        let app = app();

        let (code, err): (_, ErrorResponse) =
            call(&app, "POST", "/start", serde_json::json!({})).await;
        assert_eq!(code, StatusCode::NOT_FOUND);
        assert!(err.error.contains("No state machine loaded"));

        let (code, results): (_, LoadingResults) =
            call(&app, "POST", "/load", serde_json::json!({ "source": BEHAVIOR })).await;
        assert_eq!(code, StatusCode::OK);
        assert!(results.success());

        let (code, status): (_, ControllerStatus) =
            call(&app, "POST", "/start", serde_json::json!({})).await;
        assert_eq!(code, StatusCode::OK);
        assert!(status.running);

        let (_, again): (_, ErrorResponse) =
            call(&app, "POST", "/start", serde_json::json!({})).await;
        assert!(again.error.contains("cannot start"));

        let (_, event): (_, EventResponse) =
            call(&app, "POST", "/events", serde_json::json!({ "event": "next" })).await;
        assert!(event.accepted);

        let mut current = Vec::new();
        for _ in 0..200 {
            let (_, states): (_, StatesResponse) =
                call(&app, "GET", "/states", serde_json::Value::Null).await;
            current = states.current_states;
            if current == ["B"] {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(current, vec!["B".to_string()]);

        let (code, status): (_, ControllerStatus) =
            call(&app, "POST", "/stop", serde_json::json!({})).await;
        assert_eq!(code, StatusCode::OK);
        assert!(!status.running);
    }

    #[tokio::test]
    async fn misuse_maps_to_conflict() {
        let app = app();
        call::<LoadingResults>(&app, "POST", "/load", serde_json::json!({ "source": BEHAVIOR }))
            .await;

        let (code, _): (_, ErrorResponse) =
            call(&app, "POST", "/resume", serde_json::json!({})).await;
        assert_eq!(code, StatusCode::CONFLICT);

        let (code, results): (_, LoadingResults) =
            call(&app, "POST", "/load", serde_json::json!({ "source": "<scxml><oops" })).await;
        assert_eq!(code, StatusCode::OK);
        assert!(!results.success());
    }
}
