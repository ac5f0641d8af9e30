//! Mock authentication endpoints

use burrow_core::{Context, Result};
use serde_json::{json, Value};
use std::time::{SystemTime, UNIX_EPOCH};

/// `POST /api/auth/login`
pub async fn login(ctx: Context) -> Result<()> {
    let body = ctx.parse_body()?;
    let field = |name: &str| {
        body.get(name)
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let (Some(username), Some(password)) = (field("username"), field("password")) else {
        return ctx.json_with_status(
            400,
            &json!({ "error": "Username and password are required" }),
        );
    };

    if username == "admin" && password == "password" {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        ctx.json(&json!({
            "message": "Login successful",
            "token": format!("mock-jwt-token-{millis}"),
            "user": { "id": 1, "username": "admin" },
        }))
    } else {
        ctx.json_with_status(401, &json!({ "error": "Invalid credentials" }))
    }
}

/// `GET /api/auth/me`
pub async fn me(ctx: Context) -> Result<()> {
    if ctx.header("authorization").is_none() {
        return ctx.json_with_status(401, &json!({ "error": "Authorization token required" }));
    }
    ctx.json(&json!({
        "user": { "id": 1, "username": "admin" },
        "message": "User authenticated",
    }))
}
