//! Axum middleware binding the HTTP session to each request.
//!
//! The signed id is read from the `mortimer_session` cookie and its data
//! loaded from the backend. Handlers reach it through the [`SessionHandle`]
//! extractor. After the handler returns, changed data is saved and the
//! cookie refreshed; a destroyed session is deleted and its cookie expired.

use axum::extract::{FromRequestParts, Request};
use axum::http::header;
use axum::http::request::Parts;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use base64::Engine;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::cookie::CookieSigner;
use super::{SessionBackend, SessionData};

pub const COOKIE_NAME: &str = "mortimer_session";
const MAX_AGE_SECS: u64 = 7 * 24 * 3600;

/// Shared handle to the request's HTTP session.
#[derive(Clone)]
pub struct SessionHandle {
    pub id: String,
    pub data: Arc<Mutex<SessionData>>,
    pub destroyed: Arc<Mutex<bool>>,
}

impl<S> FromRequestParts<S> for SessionHandle
where
    S: Send + Sync,
{
    type Rejection = crate::error::AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionHandle>()
            .cloned()
            .ok_or(crate::error::AppError::Internal(
                "Session middleware not configured".into(),
            ))
    }
}

impl SessionHandle {
    fn new(id: String, data: SessionData) -> Self {
        Self {
            id,
            data: Arc::new(Mutex::new(data)),
            destroyed: Arc::new(Mutex::new(false)),
        }
    }

    /// Mark the session for deletion once the response is produced.
    pub async fn destroy(&self) {
        *self.destroyed.lock().await = true;
        self.data.lock().await.clear();
    }
}

/// Session middleware configuration.
pub struct SessionLayer<B: SessionBackend> {
    pub backend: Arc<B>,
    pub signer: CookieSigner,
    pub https_only: bool,
    pub cookie_domain: Option<String>,
}

impl<B: SessionBackend> SessionLayer<B> {
    fn set_cookie(&self, session_id: &str) -> String {
        let mut parts = vec![
            format!("{}={}", COOKIE_NAME, self.signer.sign(session_id)),
            format!("Max-Age={}", MAX_AGE_SECS),
        ];
        parts.extend(self.cookie_attributes());
        parts.join("; ")
    }

    fn delete_cookie(&self) -> String {
        let mut parts = vec![format!("{}=", COOKIE_NAME), "Max-Age=0".into()];
        parts.extend(self.cookie_attributes());
        parts.join("; ")
    }

    fn cookie_attributes(&self) -> Vec<String> {
        let mut attrs = vec!["Path=/".to_string(), "HttpOnly".into(), "SameSite=Lax".into()];
        if self.https_only {
            attrs.push("Secure".into());
        }
        if let Some(domain) = &self.cookie_domain {
            attrs.push(format!("Domain={domain}"));
        }
        attrs
    }
}

pub async fn session_middleware<B: SessionBackend + 'static>(
    layer: Arc<SessionLayer<B>>,
    mut req: Request,
    next: Next,
) -> Response {
    let cookie_header = req
        .headers()
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let known_id = parse_cookie(cookie_header, COOKIE_NAME)
        .and_then(|value| layer.signer.verify(value));

    let loaded = match known_id {
        Some(id) => layer.backend.load(&id).await.map(|data| (id, data)),
        None => None,
    };
    let (id, initial) = loaded.unwrap_or_else(|| (generate_session_id(), SessionData::new()));

    let handle = SessionHandle::new(id.clone(), initial.clone());
    req.extensions_mut().insert(handle.clone());

    let mut response = next.run(req).await;

    let destroyed = *handle.destroyed.lock().await;
    let current = handle.data.lock().await.clone();

    let cookie = if destroyed {
        layer.backend.delete(&id).await;
        Some(layer.delete_cookie())
    } else if current != initial {
        // Untouched sessions are never persisted, so anonymous GETs leave no trace.
        layer.backend.save(&id, &current).await;
        Some(layer.set_cookie(&id))
    } else {
        None
    };

    if let Some(cookie) = cookie {
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => tracing::error!(error = %e, "could not encode session cookie"),
        }
    }

    response
}

fn generate_session_id() -> String {
    use rand::Rng;
    let bytes: [u8; 32] = rand::thread_rng().r#gen();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Find one cookie in a `Cookie` header value.
fn parse_cookie<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|part| {
        part.trim()
            .strip_prefix(name)
            .and_then(|rest| rest.strip_prefix('='))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::memory::InMemoryBackend;

    fn layer(https_only: bool, domain: Option<&str>) -> SessionLayer<InMemoryBackend> {
        SessionLayer {
            backend: Arc::new(InMemoryBackend::new()),
            signer: CookieSigner::new("secret"),
            https_only,
            cookie_domain: domain.map(String::from),
        }
    }

    #[test]
    fn test_parse_cookie() {
        let header = "theme=dark; mortimer_session=abc.def; other=1";
        assert_eq!(parse_cookie(header, COOKIE_NAME), Some("abc.def"));
        assert_eq!(parse_cookie("theme=dark", COOKIE_NAME), None);
        assert_eq!(parse_cookie("", COOKIE_NAME), None);
    }

    #[test]
    fn test_parse_cookie_ignores_prefixed_names() {
        let header = "mortimer_session_old=x; mortimer_session=y";
        assert_eq!(parse_cookie(header, COOKIE_NAME), Some("y"));
    }

    #[test]
    fn test_set_cookie_attributes() {
        let cookie = layer(false, None).set_cookie("h1");
        assert!(cookie.starts_with("mortimer_session="));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Path=/"));
        assert!(!cookie.contains("Secure"));
        assert!(!cookie.contains("Domain="));
    }

    #[test]
    fn test_secure_cookie_with_domain() {
        let cookie = layer(true, Some(".lab.example")).set_cookie("h1");
        assert!(cookie.contains("Secure"));
        assert!(cookie.contains("Domain=.lab.example"));
    }

    #[test]
    fn test_delete_cookie() {
        let cookie = layer(false, None).delete_cookie();
        assert!(cookie.starts_with("mortimer_session=;"));
        assert!(cookie.contains("Max-Age=0"));
    }

    #[test]
    fn test_generated_ids_differ() {
        assert_ne!(generate_session_id(), generate_session_id());
    }
}
