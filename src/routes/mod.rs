//! Router assembly: HTTP endpoints, WebSocket upgrade, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws`
/// - REST-ish API under `/api/v1/...`
/// - Static SPA from `./static` with index fallback
/// - CORS (allow any origin/method/headers); adjust for production if needed
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_upgrade))
        // HTTP API
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/run", post(http::http_run))
        .route("/api/v1/sessions", post(http::http_create_session))
        .route("/api/v1/sessions/restore", post(http::http_restore))
        .route("/api/v1/sessions/:id", get(http::http_get_session).delete(http::http_delete_session))
        .route("/api/v1/sessions/:id/start", post(http::http_start))
        .route("/api/v1/sessions/:id/discussion", post(http::http_discuss))
        .route("/api/v1/sessions/:id/coding", post(http::http_begin_coding))
        .route("/api/v1/sessions/:id/code", put(http::http_put_code))
        .route("/api/v1/sessions/:id/hint", post(http::http_hint))
        .route("/api/v1/sessions/:id/run", post(http::http_run_session))
        .route("/api/v1/sessions/:id/assessment", post(http::http_submit_code))
        .route("/api/v1/sessions/:id/answers", post(http::http_submit_answers))
        .route("/api/v1/sessions/:id/review", get(http::http_review))
        .route("/api/v1/sessions/:id/record", get(http::http_get_record))
        .route("/api/v1/sessions/:id/reset", post(http::http_reset))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Frontend fallback
        .fallback_service(static_service)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::config::Prompts;
    use crate::execution::testing::CannedRunner;
    use crate::flows::{testing::ScriptedLlm, CompletionService, FlowExecutor};

    fn app(llm: &Arc<ScriptedLlm>) -> Router {
        let svc: Arc<dyn CompletionService> = llm.clone();
        let runner = Arc::new(CannedRunner { reply: "hello\n".into(), ..Default::default() });
        let state = AppState::with_parts(FlowExecutor::new(Some(svc), Prompts::default()), runner);
        build_router(Arc::new(state))
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let req = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(b) => req
                .header("content-type", "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let v = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, v)
    }

    #[tokio::test]
    async fn interview_over_http() {
        let llm = ScriptedLlm::new();
        let app = app(&llm);

        let (st, v) = call(&app, "POST", "/api/v1/sessions", None).await;
        assert_eq!(st, StatusCode::CREATED);
        let id = v["sessionId"].as_str().unwrap().to_string();
        assert_eq!(v["state"]["phase"], "setup");

        let cfg = json!({
            "jobRole": "Backend Engineer", "company": "Acme", "language": "python",
            "difficulty": "medium", "timeLimitMinutes": 0
        });
        llm.push(json!({ "problemStatement": "" }));
        let (st, v) = call(&app, "POST", &format!("/api/v1/sessions/{id}/start"), Some(cfg.clone())).await;
        assert_eq!(st, StatusCode::BAD_GATEWAY);
        assert_eq!(v["retryable"], true);

        llm.push(json!({ "problemStatement": "Two sum." }));
        let (st, v) = call(&app, "POST", &format!("/api/v1/sessions/{id}/start"), Some(cfg)).await;
        assert_eq!(st, StatusCode::OK);
        assert_eq!(v["state"]["phase"], "discussing");

        let (st, _) = call(&app, "POST", &format!("/api/v1/sessions/{id}/coding"), None).await;
        assert_eq!(st, StatusCode::PRECONDITION_FAILED);

        llm.push(json!({ "answer": "Nice. Duplicates?" }));
        let (st, v) = call(
            &app,
            "POST",
            &format!("/api/v1/sessions/{id}/discussion"),
            Some(json!({ "question": "I'll use a hash map" })),
        )
        .await;
        assert_eq!(st, StatusCode::OK);
        assert_eq!(v["turn"]["answer"], "Nice. Duplicates?");

        let (st, v) = call(&app, "POST", &format!("/api/v1/sessions/{id}/coding"), None).await;
        assert_eq!(st, StatusCode::OK);
        assert_eq!(v["state"]["phase"], "coding");

        let (st, _) = call(&app, "PUT", &format!("/api/v1/sessions/{id}/code"), Some(json!({ "code": "print('hello')" }))).await;
        assert_eq!(st, StatusCode::NO_CONTENT);

        let (st, v) = call(&app, "POST", &format!("/api/v1/sessions/{id}/run"), Some(json!({ "stdin": "" }))).await;
        assert_eq!(st, StatusCode::OK);
        assert_eq!(v["output"], "hello\n");

        llm.push(json!({ "questions": ["q1", "q2", "q3"] }));
        let (st, v) = call(&app, "POST", &format!("/api/v1/sessions/{id}/assessment"), None).await;
        assert_eq!(st, StatusCode::OK);
        assert_eq!(v["questions"].as_array().unwrap().len(), 3);

        let (st, _) = call(&app, "POST", &format!("/api/v1/sessions/{id}/answers"), Some(json!({ "answers": ["a", "", "c"] }))).await;
        assert_eq!(st, StatusCode::UNPROCESSABLE_ENTITY);

        llm.push(json!({
            "efficiencyFeedback": "O(n)", "correctnessFeedback": "Correct", "styleFeedback": "Clean",
            "overallScore": 9, "insights": "Single pass"
        }));
        let (st, v) = call(&app, "POST", &format!("/api/v1/sessions/{id}/answers"), Some(json!({ "answers": ["a", "b", "c"] }))).await;
        assert_eq!(st, StatusCode::OK);
        assert_eq!(v["review"]["score"], 9.0);

        let (st, v) = call(&app, "GET", &format!("/api/v1/sessions/{id}/review"), None).await;
        assert_eq!(st, StatusCode::OK);
        assert_eq!(v["insights"], "Single pass");

        let req = Request::builder()
            .uri(format!("/api/v1/sessions/{id}/review?format=text"))
            .body(Body::empty())
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let text = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(text.to_vec()).unwrap();
        assert!(text.starts_with("Overall Score: 9/10"));
        assert!(text.contains("Key Insights:\nSingle pass"));
    }

    #[tokio::test]
    async fn unknown_session_is_404() {
        let llm = ScriptedLlm::new();
        let (st, v) = call(&app(&llm), "GET", "/api/v1/sessions/missing", None).await;
        assert_eq!(st, StatusCode::NOT_FOUND);
        assert!(v["error"].as_str().unwrap().contains("missing"));
    }

    #[tokio::test]
    async fn restore_without_problem_lands_in_setup() {
        let llm = ScriptedLlm::new();
        let (st, v) = call(&app(&llm), "POST", "/api/v1/sessions/restore?jobRole=SRE&company=Acme&language=python", None).await;
        assert_eq!(st, StatusCode::CREATED);
        assert_eq!(v["state"]["phase"], "setup");
    }

    #[tokio::test]
    async fn standalone_run() {
        let llm = ScriptedLlm::new();
        let (st, v) = call(
            &app(&llm),
            "POST",
            "/api/v1/run",
            Some(json!({ "code": "print('hello')", "language": "python" })),
        )
        .await;
        assert_eq!(st, StatusCode::OK);
        assert_eq!(v["output"], "hello\n");
    }
}
