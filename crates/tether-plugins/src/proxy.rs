//! Inbound request handling for resource calls: header hygiene before a
//! request is forwarded to a plugin.

use std::fmt;
use std::net::SocketAddr;

use reqwest::Method;
use reqwest::header::{COOKIE, HeaderMap, HeaderName, HeaderValue, ORIGIN, REFERER};
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{Span, error};

use crate::error::{PluginError, PluginResult};

/// Headers that only describe the hop between client and host.
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// The HTTP request that triggered a resource call.
pub struct IncomingRequest {
    /// Request method.
    pub method: Method,
    /// Raw query string, without the leading `?`.
    pub raw_query: Option<String>,
    /// Request headers.
    pub headers: HeaderMap,
    /// Address of the connecting client.
    pub remote_addr: Option<SocketAddr>,
    /// Request body, read to the end before the plugin is called.
    pub body: Box<dyn AsyncRead + Send + Unpin>,
}

impl fmt::Debug for IncomingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncomingRequest")
            .field("method", &self.method)
            .field("raw_query", &self.raw_query)
            .field("headers", &self.headers)
            .field("remote_addr", &self.remote_addr)
            .finish_non_exhaustive()
    }
}

impl IncomingRequest {
    /// A request with an in-memory body.
    #[must_use]
    pub fn new(method: Method, body: impl Into<Vec<u8>>) -> Self {
        Self {
            method,
            raw_query: None,
            headers: HeaderMap::new(),
            remote_addr: None,
            body: Box::new(std::io::Cursor::new(body.into())),
        }
    }

    /// Set the raw query string.
    #[must_use]
    pub fn with_query(mut self, raw_query: impl Into<String>) -> Self {
        self.raw_query = Some(raw_query.into());
        self
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Set the client address.
    #[must_use]
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// `path` followed by the raw query, if there is one.
    #[must_use]
    pub fn resource_url(&self, path: &str) -> String {
        match self.raw_query.as_deref() {
            Some(query) if !query.is_empty() => format!("{path}?{query}"),
            _ => path.to_owned(),
        }
    }

    /// Read the whole body into memory.
    ///
    /// # Errors
    ///
    /// Returns a wrapped I/O error if reading fails.
    pub async fn read_body(&mut self) -> PluginResult<Vec<u8>> {
        let mut body = Vec::new();
        self.body
            .read_to_end(&mut body)
            .await
            .map_err(|e| PluginError::from(e).wrap("failed to read request body"))?;
        Ok(body)
    }
}

#[derive(Debug, Default, Deserialize)]
struct KeepCookiesModel {
    #[serde(default, rename = "keepCookies")]
    keep_cookies: Vec<String>,
}

/// Cookie names a data source wants forwarded, read from the `keepCookies`
/// key of its JSON settings. A parse failure is logged and keeps none.
#[must_use]
pub fn keep_cookies(json_data: &[u8], span: &Span) -> Vec<String> {
    if json_data.is_empty() {
        return Vec::new();
    }
    match serde_json::from_slice::<KeepCookiesModel>(json_data) {
        Ok(model) => model.keep_cookies,
        Err(e) => {
            span.in_scope(|| {
                error!(error = %e, "failed to unpack json data in data source settings");
            });
            Vec::new()
        },
    }
}

/// Replace the `Cookie` header(s) with a single header holding only the
/// whitelisted cookies. A repeated cookie name keeps its last value.
pub fn clear_cookie_header(headers: &mut HeaderMap, keep: &[String]) {
    let mut kept: Vec<(String, String)> = Vec::new();
    for value in headers.get_all(COOKIE) {
        let Ok(value) = value.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let Some((name, val)) = pair.trim().split_once('=') else {
                continue;
            };
            if keep.iter().any(|k| k == name) {
                kept.retain(|(n, _)| n != name);
                kept.push((name.to_owned(), val.to_owned()));
            }
        }
    }

    headers.remove(COOKIE);
    if kept.is_empty() {
        return;
    }
    let joined = kept
        .iter()
        .map(|(n, v)| format!("{n}={v}"))
        .collect::<Vec<_>>()
        .join("; ");
    if let Ok(value) = HeaderValue::from_str(&joined) {
        headers.insert(COOKIE, value);
    }
}

/// Strip hop-by-hop headers (including any listed in `Connection`), drop
/// `Origin` and `Referer`, and append the client to `X-Forwarded-For`.
pub fn prepare_proxy_headers(headers: &mut HeaderMap, remote_addr: Option<SocketAddr>) {
    let listed: Vec<HeaderName> = headers
        .get_all(reqwest::header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }

    headers.remove(ORIGIN);
    headers.remove(REFERER);

    let Some(addr) = remote_addr else {
        return;
    };
    let client = addr.ip().to_string();
    let forwarded = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(prior) if !prior.is_empty() => format!("{prior}, {client}"),
        _ => client,
    };
    if let Ok(value) = HeaderValue::from_str(&forwarded) {
        headers.insert(HeaderName::from_static(X_FORWARDED_FOR), value);
    }
}
