//! Netscape cookie file parser and reqwest jar loader.
//!
//! Parses the Netscape HTTP cookie file format (7 TAB-separated fields per
//! line) and loads the result into a `reqwest::cookie::Jar` so the shared
//! HTTP client attaches session cookies to matching requests.

use std::fmt;
use std::io::BufRead;
use std::sync::Arc;

use reqwest::cookie::Jar;
use tracing::{debug, instrument, warn};

/// A single parsed cookie from a Netscape-format cookie file.
///
/// The value field is redacted in Debug output so session tokens never end
/// up in logs.
#[derive(Clone)]
pub struct CookieEntry {
    /// The domain the cookie belongs to (e.g., `.learn.example.com`).
    pub domain: String,
    /// Whether subdomains should match.
    pub include_subdomains: bool,
    /// The URL path scope for the cookie.
    pub path: String,
    /// Whether the cookie should only be sent over HTTPS.
    pub secure: bool,
    /// Unix timestamp for expiry (0 = session cookie).
    pub expires: u64,
    /// Cookie name.
    pub name: String,
    /// Cookie value (sensitive — never log).
    value: String,
}

impl CookieEntry {
    /// Returns the cookie value.
    ///
    /// Cookie values are sensitive — avoid logging the return value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Debug for CookieEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieEntry")
            .field("domain", &self.domain)
            .field("include_subdomains", &self.include_subdomains)
            .field("path", &self.path)
            .field("secure", &self.secure)
            .field("expires", &self.expires)
            .field("name", &self.name)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// Errors that can occur while parsing a cookie file.
#[derive(Debug, thiserror::Error)]
pub enum CookieError {
    /// A line in the cookie file has an invalid format.
    #[error("line {line_number}: {reason}")]
    InvalidLine {
        /// 1-based line number in the cookie file.
        line_number: usize,
        /// Description of what was wrong.
        reason: String,
    },

    /// I/O error reading the cookie file.
    #[error("failed to read cookie file: {0}")]
    Io(#[from] std::io::Error),

    /// No valid cookies found in a non-empty file.
    #[error("no valid cookies found in file ({malformed_count} lines failed to parse)")]
    NoCookiesFound {
        /// Number of malformed lines encountered.
        malformed_count: usize,
    },
}

/// Result of parsing a cookie file: the parsed entries plus warnings for
/// malformed lines (partial success, matching browser-export tolerance).
#[derive(Debug)]
pub struct CookieParse {
    /// Successfully parsed cookies, in file order.
    pub cookies: Vec<CookieEntry>,
    /// Warnings for malformed lines (line number and reason).
    pub warnings: Vec<(usize, String)>,
}

/// Parses a Netscape-format cookie file from a buffered reader.
///
/// Each non-comment, non-blank line must contain exactly 7 TAB-separated
/// fields: `domain`, `include_subdomains`, `path`, `secure`, `expires`,
/// `name`, `value`. Lines starting with `#` and blank lines are skipped,
/// including the optional `# Netscape HTTP Cookie File` header.
///
/// # Errors
///
/// Returns [`CookieError::Io`] on read failure, or
/// [`CookieError::NoCookiesFound`] when a non-empty file yields zero valid
/// cookies. Individual malformed lines are collected as warnings.
#[instrument(level = "debug", skip(reader))]
pub fn parse_netscape_cookies(reader: impl BufRead) -> Result<CookieParse, CookieError> {
    let mut cookies = Vec::new();
    let mut warnings = Vec::new();
    let mut data_lines = 0;

    for (idx, line_result) in reader.lines().enumerate() {
        let line_number = idx + 1;
        let line = line_result?;
        // Handle CRLF: strip trailing \r
        let line = line.trim_end();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        data_lines += 1;

        match parse_cookie_line(line, line_number) {
            Ok(cookie) => {
                debug!(
                    line = line_number,
                    domain = %cookie.domain,
                    name = %cookie.name,
                    "parsed cookie"
                );
                cookies.push(cookie);
            }
            Err(e) => {
                warn!(line = line_number, reason = %e, "skipping malformed cookie line");
                warnings.push((line_number, e.to_string()));
            }
        }
    }

    if cookies.is_empty() && data_lines > 0 {
        return Err(CookieError::NoCookiesFound {
            malformed_count: warnings.len(),
        });
    }

    Ok(CookieParse { cookies, warnings })
}

/// Parses a single cookie line into a `CookieEntry`.
fn parse_cookie_line(line: &str, line_number: usize) -> Result<CookieEntry, CookieError> {
    let fields: Vec<&str> = line.split('\t').collect();

    if fields.len() != 7 {
        return Err(CookieError::InvalidLine {
            line_number,
            reason: format!("expected 7 TAB-separated fields, found {}", fields.len()),
        });
    }

    let invalid = |reason: String| CookieError::InvalidLine {
        line_number,
        reason,
    };

    let domain = fields[0].to_string();
    if domain.is_empty() {
        return Err(invalid("domain field is empty".to_string()));
    }

    let include_subdomains = parse_flag(fields[1])
        .ok_or_else(|| invalid(format!("subdomain flag must be TRUE or FALSE, got '{}'", fields[1])))?;
    let path = fields[2].to_string();
    let secure = parse_flag(fields[3])
        .ok_or_else(|| invalid(format!("secure flag must be TRUE or FALSE, got '{}'", fields[3])))?;

    let expires = fields[4].parse::<u64>().map_err(|_| {
        invalid(format!(
            "expires field must be a non-negative integer, got '{}'",
            fields[4]
        ))
    })?;

    let name = fields[5].to_string();
    if name.is_empty() {
        return Err(invalid("cookie name field is empty".to_string()));
    }

    Ok(CookieEntry {
        domain,
        include_subdomains,
        path,
        secure,
        expires,
        name,
        value: fields[6].to_string(),
    })
}

fn parse_flag(value: &str) -> Option<bool> {
    match value {
        "TRUE" => Some(true),
        "FALSE" => Some(false),
        _ => None,
    }
}

/// Loads parsed cookies into a `reqwest::cookie::Jar`.
///
/// Each entry is converted to a `Set-Cookie` header string and added to the
/// jar with the appropriate origin URL for domain matching. Returns an
/// `Arc<Jar>` suitable for `reqwest::ClientBuilder::cookie_provider()`.
#[instrument(level = "debug", skip(cookies))]
pub fn load_cookies_into_jar(cookies: &[CookieEntry]) -> Arc<Jar> {
    let jar = Arc::new(Jar::default());

    for cookie in cookies {
        let set_cookie = build_set_cookie_string(cookie);
        let origin_url = build_origin_url(cookie);

        if let Ok(url) = origin_url.parse::<url::Url>() {
            jar.add_cookie_str(&set_cookie, &url);
            debug!(domain = %cookie.domain, name = %cookie.name, "loaded cookie into jar");
        } else {
            warn!(
                domain = %cookie.domain,
                name = %cookie.name,
                "skipping cookie with unparseable domain"
            );
        }
    }

    jar
}

/// Builds a `Set-Cookie` header string from a `CookieEntry`.
fn build_set_cookie_string(cookie: &CookieEntry) -> String {
    let mut parts = vec![format!("{}={}", cookie.name, cookie.value())];
    parts.push(format!("Domain={}", cookie.domain));
    parts.push(format!("Path={}", cookie.path));

    if cookie.secure {
        parts.push("Secure".to_string());
    }

    // 0 = session cookie, omit Expires
    if cookie.expires > 0 {
        if let Some(expires_str) = unix_to_http_date(cookie.expires) {
            parts.push(format!("Expires={expires_str}"));
        } else {
            warn!(
                domain = %cookie.domain,
                name = %cookie.name,
                expires = cookie.expires,
                "cookie expiry timestamp overflows SystemTime; treating as session cookie"
            );
        }
    }

    parts.join("; ")
}

/// Builds the origin URL for `Jar::add_cookie_str` from a `CookieEntry`.
fn build_origin_url(cookie: &CookieEntry) -> String {
    let scheme = if cookie.secure { "https" } else { "http" };
    let domain = cookie.domain.strip_prefix('.').unwrap_or(&cookie.domain);
    format!("{scheme}://{domain}{}", cookie.path)
}

/// Converts a Unix timestamp to an HTTP-date string (RFC 7231).
fn unix_to_http_date(timestamp: u64) -> Option<String> {
    use std::time::{Duration, UNIX_EPOCH};

    let time = UNIX_EPOCH.checked_add(Duration::from_secs(timestamp))?;
    Some(httpdate::fmt_http_date(time))
}
