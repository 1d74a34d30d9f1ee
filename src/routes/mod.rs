use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware::{self as axum_middleware},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{AuthorizationFlows, TokenManager};
use crate::config::Config;
use crate::error::GscError;
use crate::middleware;
use crate::property::{PropertyResolution, PropertyResolver, SiteProperty};

/// Application version from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub tokens: Arc<TokenManager>,
    pub flows: AuthorizationFlows,
    pub resolver: PropertyResolver,
}

#[derive(Debug, Deserialize)]
pub struct DomainQuery {
    pub domain: String,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Routes without the dashboard key: health checks and the OAuth redirect target
pub fn public_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/oauth/callback", get(oauth_callback_handler))
        .with_state(state)
}

/// Auth and property routes (dashboard key required when configured)
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/auth/start", post(start_authorization_handler))
        .route("/auth/flows/:flow_id/focus", post(focus_regained_handler))
        .route("/auth/status", get(auth_status_handler))
        .route("/auth/signout", post(sign_out_handler))
        .route("/properties", get(list_properties_handler))
        .route("/properties/find", get(find_property_handler))
        .route("/properties/detect", get(detect_property_handler))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ))
        .with_state(state)
}

/// GET / - Simple health check
async fn root_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "gsc-bridge is running",
        "version": VERSION
    }))
}

/// GET /health - Detailed health check
async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "version": VERSION,
        "pendingAuthorizations": state.flows.pending_count(),
    }))
}

/// POST /auth/start - Begin an authorization flow
///
/// Returns the consent URL for the dashboard to open in a popup. The code
/// exchange runs in the background once the redirect arrives; the dashboard
/// polls /auth/status.
async fn start_authorization_handler(
    State(state): State<AppState>,
) -> Result<Json<Value>, GscError> {
    let pending = state.flows.begin(&state.tokens)?;
    let flow_id = pending.flow_id;
    let authorization_url = pending.authorization_url.to_string();

    let tokens = state.tokens.clone();
    let timeout = state.flows.timeout();
    tokio::spawn(async move {
        let result = match pending.wait(timeout).await {
            Ok(code) => tokens.exchange_code_for_tokens(&code).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::warn!(flow_id = %flow_id, "Authorization flow ended without a session: {}", e);
        }
    });

    Ok(Json(json!({
        "flowId": flow_id,
        "authorizationUrl": authorization_url,
    })))
}

/// GET /oauth/callback - Redirect target of the consent page
async fn oauth_callback_handler(
    State(state): State<AppState>,
    Query(params): Query<CallbackQuery>,
) -> Response {
    let Some(flow_id) = params.state.as_deref().and_then(|s| Uuid::parse_str(s).ok()) else {
        return (
            StatusCode::BAD_REQUEST,
            Html(callback_page("Missing or invalid state parameter.")),
        )
            .into_response();
    };

    let delivered = match (params.code, params.error) {
        (_, Some(error)) => state.flows.fail(flow_id, error),
        (Some(code), None) => state.flows.complete(flow_id, code),
        (None, None) => state.flows.fail(flow_id, "missing_code".to_string()),
    };

    if delivered {
        Html(callback_page("Authorization received. You can close this window.")).into_response()
    } else {
        (
            StatusCode::GONE,
            Html(callback_page(
                "This authorization request has expired. Please start again from the dashboard.",
            )),
        )
            .into_response()
    }
}

fn callback_page(message: &str) -> String {
    format!(
        "<!doctype html><html><head><title>gsc-bridge</title></head><body><p>{}</p></body></html>",
        message
    )
}

/// POST /auth/flows/:flow_id/focus - Initiating window regained focus
async fn focus_regained_handler(
    State(state): State<AppState>,
    Path(flow_id): Path<Uuid>,
) -> Json<Value> {
    let cancelled = state.flows.focus_regained(flow_id);
    Json(json!({ "cancelled": cancelled }))
}

/// GET /auth/status
async fn auth_status_handler(State(state): State<AppState>) -> Json<Value> {
    let authenticated = state.tokens.is_authenticated().await;
    let expires_at = state.tokens.expires_at().await.map(|dt| dt.to_rfc3339());
    Json(json!({
        "authenticated": authenticated,
        "expiresAt": expires_at,
    }))
}

/// POST /auth/signout - Always succeeds
async fn sign_out_handler(State(state): State<AppState>) -> Json<Value> {
    state.tokens.sign_out().await;
    Json(json!({ "signedOut": true }))
}

/// GET /properties
async fn list_properties_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<SiteProperty>>, GscError> {
    Ok(Json(state.resolver.list_properties().await?))
}

/// GET /properties/find?domain=
async fn find_property_handler(
    State(state): State<AppState>,
    Query(query): Query<DomainQuery>,
) -> Result<Json<Value>, GscError> {
    let site_url = state.resolver.find_property_for_domain(&query.domain).await?;
    Ok(Json(json!({
        "domain": query.domain,
        "siteUrl": site_url,
    })))
}

/// GET /properties/detect?domain=
async fn detect_property_handler(
    State(state): State<AppState>,
    Query(query): Query<DomainQuery>,
) -> Json<PropertyResolution> {
    Json(state.resolver.detect_primary_property(&query.domain).await)
}


#[cfg(test)]
mod tests {
    use super::test_support::{test_state, test_state_with};
    use super::*;
    use crate::auth::TokenState;
    use axum::body::Body;
    use axum::http::Request;
    use tower::util::ServiceExt;

    fn app(state: AppState) -> Router {
        Router::new()
            .merge(public_routes(state.clone()))
            .merge(api_routes(state))
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_start_then_callback_completes_flow() {
        let state = test_state("http://127.0.0.1:9", None);
        let flows = state.flows.clone();
        let app = app(state);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/auth/start")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        let flow_id = body["flowId"].as_str().unwrap().to_string();
        assert!(body["authorizationUrl"]
            .as_str()
            .unwrap()
            .contains(&format!("state={}", flow_id)));
        assert_eq!(flows.pending_count(), 1);

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/oauth/callback?code=abc&state={}", flow_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(flows.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_callback_for_unknown_flow_is_gone() {
        let app = app(test_state("http://127.0.0.1:9", None));
        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/oauth/callback?code=abc&state={}", Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::GONE);
    }

    #[tokio::test]
    async fn test_callback_without_state_is_bad_request() {
        let app = app(test_state("http://127.0.0.1:9", None));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/oauth/callback?code=abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_status_when_signed_out() {
        let app = app(test_state("http://127.0.0.1:9", None));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/auth/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let body = json_body(response).await;
        assert_eq!(body["authenticated"], false);
        assert!(body["expiresAt"].is_null());
    }

    #[tokio::test]
    async fn test_status_and_signout_with_stored_session() {
        let expires_at = Utc::now() + chrono::Duration::hours(1);
        let state = test_state_with(
            "http://127.0.0.1:9",
            None,
            TokenState {
                access_token: Some("token".to_string()),
                refresh_token: Some("refresh".to_string()),
                expires_at: Some(expires_at),
            },
        );
        let tokens = state.tokens.clone();
        let app = app(state);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/auth/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["authenticated"], true);
        assert!(body["expiresAt"].is_string());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/auth/signout")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!tokens.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_properties_require_session() {
        let app = app(test_state("http://127.0.0.1:9", None));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/properties")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(response).await;
        assert_eq!(body["error"]["type"], "no_refresh_token");
    }
}
