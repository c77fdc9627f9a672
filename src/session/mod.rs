//! Session context: cookies, bearer token, and content keys.
//!
//! The [`SessionContext`] is built once at startup from externally supplied
//! credential files and shared read-only by every component. It is the only
//! place credentials live; no component mutates it after construction.

mod cookies;
mod keys;

pub use cookies::{CookieEntry, CookieError, CookieParse, load_cookies_into_jar, parse_netscape_cookies};
pub use keys::{CONTENT_KEY_LEN, ContentKey, KeyFormatError, KeyMap};

use std::fmt;
use std::io::BufRead;
use std::sync::Arc;

use reqwest::cookie::Jar;
use tracing::{debug, instrument, warn};

/// Name of the cookie that carries the session's auth token.
pub const AUTH_COOKIE_NAME: &str = "access_token";

/// Errors building a session context.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Cookie file failed to parse.
    #[error("cookie file error: {0}")]
    Cookie(#[from] CookieError),

    /// Key file failed to parse.
    #[error("key file error: {0}")]
    Key(#[from] KeyFormatError),

    /// Neither a bearer token nor a usable auth cookie was supplied.
    #[error("no usable credential: supply a bearer token or a cookie file containing '{AUTH_COOKIE_NAME}'")]
    NoCredentials,
}

/// Immutable session credentials shared by all components.
///
/// Holds the parsed cookie list (in file order), an optional bearer token,
/// and the key-ID → content-key mapping. Wrap in an `Arc` and share freely;
/// nothing here is mutated after construction.
#[derive(Clone)]
pub struct SessionContext {
    cookies: Vec<CookieEntry>,
    bearer: Option<String>,
    keys: KeyMap,
    jar: Arc<Jar>,
}

impl SessionContext {
    /// Builds a session context from credential sources.
    ///
    /// `cookie_source` is Netscape-format cookie text (may be empty when a
    /// bearer token is supplied). `key_source` is the JSON key mapping (may
    /// be `None` for courses without DRM). An explicit `bearer` override
    /// takes precedence over any auth cookie.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::NoCredentials`] when neither a bearer token nor
    /// an `access_token` cookie is available, or parse errors from either
    /// source.
    #[instrument(level = "debug", skip_all)]
    pub fn load(
        cookie_source: Option<impl BufRead>,
        key_source: Option<&str>,
        bearer: Option<String>,
    ) -> Result<Self, AuthError> {
        let cookies = match cookie_source {
            Some(reader) => {
                let parsed = parse_netscape_cookies(reader)?;
                for (line, reason) in &parsed.warnings {
                    warn!(line, reason = %reason, "malformed cookie line skipped");
                }
                parsed.cookies
            }
            None => Vec::new(),
        };

        let keys = match key_source {
            Some(json) => KeyMap::parse(json)?,
            None => KeyMap::default(),
        };

        let bearer = bearer.filter(|token| !token.trim().is_empty());

        let has_auth_cookie = cookies.iter().any(|c| c.name == AUTH_COOKIE_NAME);
        if bearer.is_none() && !has_auth_cookie {
            return Err(AuthError::NoCredentials);
        }

        let jar = load_cookies_into_jar(&cookies);

        debug!(
            cookies = cookies.len(),
            keys = keys.len(),
            bearer = bearer.is_some(),
            "session context ready"
        );

        Ok(Self {
            cookies,
            bearer,
            keys,
            jar,
        })
    }

    /// Returns the `Authorization` header value for authenticated requests.
    ///
    /// A bearer override wins; otherwise the auth cookie's value is promoted
    /// to a bearer token (the service accepts either).
    #[must_use]
    pub fn authorization(&self) -> Option<String> {
        if let Some(token) = &self.bearer {
            return Some(format!("Bearer {token}"));
        }
        self.cookies
            .iter()
            .find(|c| c.name == AUTH_COOKIE_NAME)
            .map(|c| format!("Bearer {}", c.value()))
    }

    /// The cookie jar for the shared HTTP client.
    #[must_use]
    pub fn cookie_jar(&self) -> Arc<Jar> {
        Arc::clone(&self.jar)
    }

    /// Parsed cookies in file order.
    #[must_use]
    pub fn cookies(&self) -> &[CookieEntry] {
        &self.cookies
    }

    /// Looks up a content key by key-ID.
    #[must_use]
    pub fn content_key(&self, key_id: &str) -> Option<&ContentKey> {
        self.keys.get(key_id)
    }

    /// Returns true when the session holds a key for `key_id`.
    #[must_use]
    pub fn has_content_key(&self, key_id: &str) -> bool {
        self.keys.contains(key_id)
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("cookies", &self.cookies.len())
            .field("bearer", &self.bearer.as_ref().map(|_| "[REDACTED]"))
            .field("keys", &self.keys)
            .finish()
    }
}
