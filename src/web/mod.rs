//! HTTP adapter.
//!
//! Every request, whatever its path, is handed to the [`Dispatcher`]; this
//! module only extracts verb, path and body and renders the envelope.

use crate::dispatcher::{Dispatcher, Response};
use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::Method;
use axum::response::IntoResponse;
use axum::routing::any;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Router sending `/` and `/*path` through `dispatcher`.
///
/// Can be nested under a prefix; the dispatcher sees the path below it.
pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/", any(handle))
        .route("/*path", any(handle))
        .with_state(dispatcher)
        .layer(TraceLayer::new_for_http())
}

async fn handle(
    State(dispatcher): State<Arc<Dispatcher>>,
    method: Method,
    path: Option<Path<String>>,
    body: Bytes,
) -> Response {
    let path = path.map(|Path(path)| path).unwrap_or_default();
    dispatcher.dispatch(&method, &path, &body).await
}

impl IntoResponse for Response {
    fn into_response(self) -> axum::response::Response {
        match self.body {
            Some(body) => (self.status, Json(body)).into_response(),
            None => self.status.into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::Application;
    use crate::config::CoreConfig;
    use crate::core::Result;
    use crate::mapper::Payload;
    use crate::registry::{Arguments, Command, StaticLocator};
    use crate::storage::StoreFactories;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use serde_json::{Value as JsonValue, json};
    use tower::ServiceExt;

    struct Echo;

    #[async_trait]
    impl Command for Echo {
        async fn execute(&self, args: Arguments) -> Result<Payload> {
            Ok(Payload::Json(json!({
                "args": args.positional(),
                "body": args.body(),
            })))
        }
    }

    fn app() -> Router {
        let locator = StaticLocator::new().command("echo", Echo);
        Application::open(CoreConfig::new(), Arc::new(locator), StoreFactories::new())
            .unwrap()
            .router()
    }

    fn request(method: Method, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn decode(response: axum::response::Response) -> JsonValue {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn command_receives_path_and_body() {
        let response = app()
            .oneshot(request(Method::POST, "/command/echo/a/b", r#"{"n": 1}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json"
        );
        assert_eq!(
            decode(response).await,
            json!({"args": ["a", "b"], "body": {"n": 1}})
        );
    }

    #[tokio::test]
    async fn faults_render_as_json() {
        let response = app()
            .oneshot(request(Method::DELETE, "/command/echo", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(decode(response).await["code"], json!("method_not_allowed"));
    }

    #[tokio::test]
    async fn root_path_is_not_found() {
        let response = app().oneshot(request(Method::GET, "/", "")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn router_can_be_nested() {
        let router = Router::new().nest("/api", app());
        let response = router
            .oneshot(request(Method::GET, "/api/command/echo/x", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(decode(response).await["args"], json!(["x"]));
    }
}
