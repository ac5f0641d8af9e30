//! Blog API demo
//!
//! Posts CRUD, a mock login and a health check, served by burrow.
//!
//! ```text
//! BURROW_PORT=3000 BURROW_ENV=development cargo run -p burrow-blog
//! ```

mod auth;
mod posts;

use burrow_core::{
    App, BodyParser, Context, Cors, ErrorHandler, LogFormat, Logger, RateLimit, ServerConfig,
};
use posts::PostStore;
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::info;

fn build_app(config: ServerConfig, store: &PostStore) -> App {
    let port = config.port;
    let started = Instant::now();
    let mut app = App::with_config(config);

    app.use_middleware(ErrorHandler::new().expose(true))
        .use_middleware(Logger::new().format(LogFormat::Combined))
        .use_middleware(
            Cors::new()
                .allow_origins([
                    format!("http://localhost:{port}"),
                    "http://localhost:8080".to_string(),
                ])
                .allow_methods(["GET", "POST", "PUT", "DELETE", "OPTIONS"])
                .credentials(true),
        )
        .use_middleware(BodyParser::new())
        .use_middleware(RateLimit::new(Duration::from_secs(15 * 60), 100));

    app.get("/", |ctx: Context| async move {
        ctx.json(&json!({
            "message": "Welcome to the burrow blog",
            "version": burrow_core::VERSION,
        }))
    });

    app.get("/health", move |ctx: Context| async move {
        ctx.json(&json!({
            "status": "ok",
            "uptime": started.elapsed().as_secs_f64(),
        }))
    });

    let s = store.clone();
    app.get("/api/posts", move |ctx| posts::list(ctx, s.clone()));
    let s = store.clone();
    app.get("/api/posts/:id", move |ctx| posts::show(ctx, s.clone()));
    let s = store.clone();
    app.post("/api/posts", move |ctx| posts::create(ctx, s.clone()));
    let s = store.clone();
    app.put("/api/posts/:id", move |ctx| posts::update(ctx, s.clone()));
    let s = store.clone();
    app.delete("/api/posts/:id", move |ctx| posts::remove(ctx, s.clone()));

    app.post("/api/auth/login", auth::login);
    app.get("/api/auth/me", auth::me);

    app
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let json_logs = std::env::var("BURROW_LOG_JSON").is_ok_and(|v| v == "1" || v == "true");
    burrow_core::init_tracing(json_logs);

    let config = ServerConfig::from_env()?;
    let app = build_app(config, &posts::seed());

    let info = app.server_info();
    info!(
        host = %info.host,
        port = info.port,
        routes = info.routes.len(),
        "API available at http://{}:{}/api",
        info.host,
        info.port
    );

    app.listen().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burrow_core::Response;
    use serde_json::Value;

    fn app() -> App {
        build_app(ServerConfig::default(), &posts::seed())
    }

    fn body(resp: &Response) -> Value {
        resp.json_body().unwrap()
    }

    const JSON: [(&str, &str); 1] = [("Content-Type", "application/json")];

    #[tokio::test]
    async fn test_home_and_health() {
        let app = app();
        let resp = app.test_request("GET", "/", &[], "").await;
        assert_eq!(resp.status, 200);
        assert_eq!(body(&resp)["version"], burrow_core::VERSION);

        let resp = app.test_request("GET", "/health", &[], "").await;
        assert_eq!(body(&resp)["status"], "ok");
        assert_eq!(resp.header("ratelimit-limit"), Some("100"));
    }

    #[tokio::test]
    async fn test_list_posts_paginates() {
        let app = app();
        let resp = app.test_request("GET", "/api/posts?page=2&limit=2", &[], "").await;
        let page = body(&resp);
        assert_eq!(page["posts"].as_array().unwrap().len(), 1);
        assert_eq!(page["posts"][0]["id"], 3);
        assert_eq!(page["pagination"], json!({"page": 2, "limit": 2, "total": 3, "pages": 2}));
    }

    #[tokio::test]
    async fn test_show_post() {
        let app = app();
        let resp = app.test_request("GET", "/api/posts/1", &[], "").await;
        assert_eq!(body(&resp)["title"], "Hello World");
        assert_eq!(body(&resp)["createdAt"], 1_704_067_200);

        let resp = app.test_request("GET", "/api/posts/99", &[], "").await;
        assert_eq!(resp.status, 404);
        assert_eq!(body(&resp), json!({"error": "Post not found"}));

        let resp = app.test_request("GET", "/api/posts/abc", &[], "").await;
        assert_eq!(resp.status, 400);
    }

    #[tokio::test]
    async fn test_create_update_delete() {
        let app = app();

        let resp = app
            .test_request("POST", "/api/posts", &JSON, r#"{"title":"New","content":"Body"}"#)
            .await;
        assert_eq!(resp.status, 201);
        assert_eq!(body(&resp)["id"], 4);

        let resp = app
            .test_request("POST", "/api/posts", &JSON, r#"{"title":"No content"}"#)
            .await;
        assert_eq!(resp.status, 400);

        let resp = app
            .test_request("PUT", "/api/posts/4", &JSON, r#"{"title":"Edited","content":"B2"}"#)
            .await;
        assert_eq!(resp.status, 200);
        assert_eq!(body(&resp)["title"], "Edited");

        let resp = app.test_request("DELETE", "/api/posts/4", &[], "").await;
        assert_eq!(resp.status, 204);

        let resp = app.test_request("DELETE", "/api/posts/4", &[], "").await;
        assert_eq!(resp.status, 404);
    }

    #[tokio::test]
    async fn test_malformed_json_is_rejected() {
        let app = app();
        let resp = app.test_request("POST", "/api/posts", &JSON, "{nope").await;
        assert_eq!(resp.status, 400);
        assert_eq!(body(&resp)["error"], "Invalid request body");
    }

    #[tokio::test]
    async fn test_login_and_me() {
        let app = app();
        let resp = app
            .test_request(
                "POST",
                "/api/auth/login",
                &JSON,
                r#"{"username":"admin","password":"password"}"#,
            )
            .await;
        assert_eq!(resp.status, 200);
        assert!(body(&resp)["token"].as_str().unwrap().starts_with("mock-jwt-token-"));

        let resp = app
            .test_request(
                "POST",
                "/api/auth/login",
                &JSON,
                r#"{"username":"admin","password":"nope"}"#,
            )
            .await;
        assert_eq!(resp.status, 401);

        let resp = app.test_request("POST", "/api/auth/login", &JSON, "{}").await;
        assert_eq!(resp.status, 400);

        let resp = app.test_request("GET", "/api/auth/me", &[], "").await;
        assert_eq!(resp.status, 401);
        let resp = app
            .test_request("GET", "/api/auth/me", &[("Authorization", "Bearer x")], "")
            .await;
        assert_eq!(body(&resp)["message"], "User authenticated");
    }

    #[tokio::test]
    async fn test_cors_preflight_and_unknown_route() {
        let app = app();
        let resp = app
            .test_request("OPTIONS", "/api/posts", &[("Origin", "http://localhost:8080")], "")
            .await;
        assert_eq!(resp.status, 204);
        assert_eq!(
            resp.header("access-control-allow-origin"),
            Some("http://localhost:8080")
        );

        let resp = app.test_request("GET", "/api/unknown", &[], "").await;
        assert_eq!(resp.status, 404);
        assert_eq!(body(&resp)["message"], "Cannot GET /api/unknown");
    }
}
