//! Axum glue: token extraction, the session middleware, and cookie helpers.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use shelf_http::error::AppError;

use crate::{Session, SessionGate};

/// State for [`require_session`]: the gate plus how its token travels over HTTP.
#[derive(Clone)]
pub struct SessionGuard {
    pub gate: SessionGate,
    pub cookie_name: String,
    pub secure: bool,
}

impl SessionGuard {
    pub fn new(gate: SessionGate, cookie_name: impl Into<String>, secure: bool) -> Self {
        Self {
            gate,
            cookie_name: cookie_name.into(),
            secure,
        }
    }

    /// Token from `Authorization: Bearer`, falling back to the session cookie.
    pub fn session_token(&self, headers: &HeaderMap, jar: &CookieJar) -> Option<String> {
        let bearer = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty());

        bearer
            .map(str::to_owned)
            .or_else(|| jar.get(&self.cookie_name).map(|c| c.value().to_owned()))
    }

    pub fn session_cookie(&self, session: &Session) -> Cookie<'static> {
        Cookie::build((self.cookie_name.clone(), session.token.clone()))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::seconds(
                self.gate.ttl().as_secs().try_into().unwrap_or(i64::MAX),
            ))
            .build()
    }

    /// A cookie that, added to the jar, makes the client drop the session cookie.
    pub fn removal_cookie(&self) -> Cookie<'static> {
        Cookie::build((self.cookie_name.clone(), "")).path("/").build()
    }
}

/// Middleware admitting only requests with a live session.
///
/// On success the [`Session`] is placed in request extensions.
pub async fn require_session(
    State(guard): State<SessionGuard>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = guard.session_token(request.headers(), &jar);
    let session = guard.gate.require_session(token.as_deref()).await?;

    tracing::debug!(username = %session.username, "session accepted");
    request.extensions_mut().insert(session);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{
        body::Body,
        http::{header::COOKIE, StatusCode},
        middleware::from_fn_with_state,
        routing::get,
        Extension, Router,
    };
    use tower::ServiceExt;

    use super::*;
    use crate::{hash_secret, Argon2Credentials, MemorySessionStore};

    fn guard() -> SessionGuard {
        let credentials = Argon2Credentials::new()
            .unwrap()
            .with_user("admin", hash_secret("password").unwrap());
        let gate = SessionGate::new(
            Arc::new(credentials),
            Arc::new(MemorySessionStore::new()),
            Duration::from_secs(60),
        );
        SessionGuard::new(gate, "books_api_token", false)
    }

    fn app(guard: SessionGuard) -> Router {
        Router::new()
            .route(
                "/private",
                get(|Extension(session): Extension<Session>| async move { session.username }),
            )
            .route_layer(from_fn_with_state(guard, require_session))
    }

    #[tokio::test]
    async fn request_without_session_is_forbidden() {
        let response = app(guard())
            .oneshot(Request::builder().uri("/private").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn cookie_and_bearer_tokens_are_accepted() {
        let guard = guard();
        let session = guard.gate.sign_in("admin", "password").await.unwrap();
        let app = app(guard.clone());

        let cookie = guard.session_cookie(&session);
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/private")
                    .header(COOKIE, format!("{}={}", cookie.name(), cookie.value()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/private")
                    .header(AUTHORIZATION, format!("Bearer {}", session.token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn session_cookie_attributes() {
        let guard = guard();
        let session = Session::mint("admin", Duration::from_secs(60));
        let cookie = guard.session_cookie(&session);
        assert_eq!(cookie.name(), "books_api_token");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.max_age(), Some(time::Duration::seconds(60)));
    }

    #[test]
    fn bearer_wins_over_cookie() {
        let guard = guard();
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer from-header".parse().unwrap());
        let jar = CookieJar::new().add(Cookie::new("books_api_token", "from-cookie"));
        assert_eq!(
            guard.session_token(&headers, &jar).as_deref(),
            Some("from-header")
        );
        assert_eq!(
            guard.session_token(&HeaderMap::new(), &jar).as_deref(),
            Some("from-cookie")
        );
    }
}
