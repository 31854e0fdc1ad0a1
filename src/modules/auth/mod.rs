use async_trait::async_trait;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shelf_authz::SessionGuard;
use shelf_http::error::AppError;
use shelf_kernel::{InitCtx, Module};
use time::OffsetDateTime;

/// Sign-in and sign-out on top of the shared session gate.
pub struct AuthModule {
    guard: SessionGuard,
}

impl AuthModule {
    pub fn new(guard: SessionGuard) -> Self {
        Self { guard }
    }
}

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SignedIn {
    pub message: &'static str,
    pub token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

async fn sign_in(
    State(guard): State<SessionGuard>,
    jar: CookieJar,
    body: Result<Json<Credentials>, JsonRejection>,
) -> Result<(CookieJar, Json<SignedIn>), AppError> {
    let Json(credentials) = body.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
    let session = guard
        .gate
        .sign_in(&credentials.username, &credentials.password)
        .await?;

    let jar = jar.add(guard.session_cookie(&session));
    Ok((
        jar,
        Json(SignedIn {
            message: "User signed in",
            token: session.token,
            expires_at: session.expires_at,
        }),
    ))
}

/// Always succeeds; a request without a session has nothing to revoke.
async fn sign_out(
    State(guard): State<SessionGuard>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<(CookieJar, Json<Value>), AppError> {
    let token = guard.session_token(&headers, &jar);
    guard.gate.sign_out(token.as_deref()).await?;

    let jar = jar.remove(guard.removal_cookie());
    Ok((jar, Json(json!({ "message": "User signed out" }))))
}

#[async_trait]
impl Module for AuthModule {
    fn name(&self) -> &'static str {
        "auth"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            cookie = %ctx.settings.auth.session_cookie_name,
            session_store = ?ctx.settings.auth.session_store,
            "auth module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/signin", post(sign_in))
            .route("/signout", post(sign_out))
            .with_state(self.guard.clone())
    }

    fn openapi(&self) -> Option<Value> {
        let error = |description: &str| {
            json!({
                "description": description,
                "content": {
                    "application/json": {
                        "schema": { "$ref": "#/components/schemas/ErrorResponse" }
                    }
                }
            })
        };
        Some(json!({
            "paths": {
                "/signin": {
                    "post": {
                        "summary": "Sign in and open a session",
                        "tags": ["Auth"],
                        "requestBody": {
                            "required": true,
                            "content": {
                                "application/json": {
                                    "schema": { "$ref": "#/components/schemas/Credentials" }
                                }
                            }
                        },
                        "responses": {
                            "200": {
                                "description": "User signed in; the session cookie is set",
                                "content": {
                                    "application/json": {
                                        "schema": { "$ref": "#/components/schemas/SignedIn" }
                                    }
                                }
                            },
                            "400": error("Invalid input"),
                            "401": error("Invalid username or password")
                        }
                    }
                },
                "/signout": {
                    "post": {
                        "summary": "Close the current session",
                        "tags": ["Auth"],
                        "responses": { "200": { "description": "User signed out" } }
                    }
                }
            },
            "components": {
                "schemas": {
                    "Credentials": {
                        "type": "object",
                        "properties": {
                            "username": { "type": "string", "example": "admin" },
                            "password": { "type": "string", "example": "password" }
                        },
                        "required": ["username", "password"]
                    },
                    "SignedIn": {
                        "type": "object",
                        "properties": {
                            "message": { "type": "string" },
                            "token": { "type": "string" },
                            "expires_at": { "type": "string", "format": "date-time" }
                        },
                        "required": ["message", "token", "expires_at"]
                    }
                }
            }
        }))
    }
}
