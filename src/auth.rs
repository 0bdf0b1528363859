//! Bearer-token authentication for the HTTP transport.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::warn;

/// Accepted bearer tokens. Empty means authentication is off.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    tokens: HashSet<String>,
}

impl AuthConfig {
    /// Build from `MCP_AUTH_TOKENS` entries; blank entries are rejected.
    pub fn from_tokens(tokens: &[String]) -> Result<Self, String> {
        let mut accepted = HashSet::new();
        for token in tokens {
            let trimmed = token.trim();
            if trimmed.is_empty() {
                return Err("MCP_AUTH_TOKENS contains an empty token".to_string());
            }
            accepted.insert(trimmed.to_string());
        }
        Ok(Self { tokens: accepted })
    }

    pub fn is_enabled(&self) -> bool {
        !self.tokens.is_empty()
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    /// Compare against every configured token without short-circuiting.
    pub fn verify(&self, provided: &str) -> bool {
        self.tokens.iter().fold(false, |found, expected| {
            found | constant_time_eq(provided.as_bytes(), expected.as_bytes())
        })
    }
}

/// Rejects requests without a valid `Authorization: Bearer <token>` header.
pub async fn auth_middleware(
    State(auth): State<Arc<AuthConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let token = match extract_bearer_token(&request) {
        Ok(token) => token,
        Err(msg) => {
            warn!(reason = msg, "Authentication failed");
            return unauthorized_response(msg);
        }
    };

    if auth.verify(token) {
        next.run(request).await
    } else {
        warn!(token_prefix = %mask_token(token), "Authentication failed: unknown token");
        unauthorized_response("Invalid bearer token")
    }
}

fn extract_bearer_token(request: &Request<Body>) -> Result<&str, &'static str> {
    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or("Missing bearer token in Authorization header")?;

    let value = header_value
        .to_str()
        .map_err(|_| "Authorization header contains invalid characters")?;

    match value.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(token.trim()),
        Some(_) => Err("Bearer token is empty"),
        None => Err("Expected 'Authorization: Bearer <token>'"),
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

fn mask_token(token: &str) -> String {
    let prefix: String = token.chars().take(3).collect();
    if prefix.len() == token.len() {
        "***".to_string()
    } else {
        format!("{}***", prefix)
    }
}

fn unauthorized_response(message: &str) -> Response {
    #[derive(Serialize)]
    struct ErrorBody<'a> {
        error: &'static str,
        message: &'a str,
    }

    let body = serde_json::to_string(&ErrorBody {
        error: "unauthorized",
        message,
    })
    .unwrap_or_else(|_| r#"{"error":"unauthorized"}"#.to_string());

    (
        StatusCode::UNAUTHORIZED,
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::WWW_AUTHENTICATE, "Bearer"),
        ],
        body,
    )
        .into_response()
}
