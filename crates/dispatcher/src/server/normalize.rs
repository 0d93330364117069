//! Builds a [`NormalizedRequest`] from the request line, headers, and a body
//! that arrives in arbitrarily split chunks.

use std::collections::HashMap;

use axum::http::HeaderMap;
use common::{DispatchError, HeaderValue, NormalizedRequest};
use url::Url;

/// Host assumed when the request carries no usable `Host` header.
const FALLBACK_HOST: &str = "localhost";

// ---------------------------------------------------------------------------
// Incremental UTF-8 decoding
// ---------------------------------------------------------------------------

/// Streaming UTF-8 decoder.
///
/// A multi-byte character split across two chunks is held back until the
/// rest of it arrives, so decoding chunk by chunk yields the same text as
/// decoding the concatenated bytes. Invalid sequences decode to U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    /// Leading bytes of an incomplete character (at most 3).
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `chunk`, returning all text that is complete so far.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let joined;
        let mut rest: &[u8] = if self.pending.is_empty() {
            chunk
        } else {
            joined = [std::mem::take(&mut self.pending).as_slice(), chunk].concat();
            &joined
        };

        let mut out = String::with_capacity(rest.len());
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            // Truncated character at the end of the input.
                            self.pending.extend_from_slice(after);
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Flush the decoder at end of input.
    ///
    /// A character still incomplete at this point decodes to U+FFFD.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            String::new()
        } else {
            self.pending.clear();
            char::REPLACEMENT_CHARACTER.to_string()
        }
    }
}

// ---------------------------------------------------------------------------
// Request normalizer
// ---------------------------------------------------------------------------

/// Accumulates one request and produces its [`NormalizedRequest`].
#[derive(Debug)]
pub struct RequestNormalizer {
    path: String,
    query_params: HashMap<String, String>,
    method: String,
    headers: HashMap<String, HeaderValue>,
    body: String,
    decoder: Utf8Decoder,
    received: usize,
    max_body: Option<usize>,
}

impl RequestNormalizer {
    /// Start normalizing a request from its method, raw target and headers.
    ///
    /// The target is resolved against `http://<host>/`, so both origin-form
    /// (`/a?b=c`) and absolute-form targets are accepted.
    pub fn new(method: &str, target: &str, headers: &HeaderMap) -> Self {
        let headers = collect_headers(headers);
        let host = headers.get("host").map(HeaderValue::first);
        let (path, query_params) = parse_target(target, host);

        Self {
            path,
            query_params,
            method: method.to_lowercase(),
            headers,
            body: String::new(),
            decoder: Utf8Decoder::new(),
            received: 0,
            max_body: None,
        }
    }

    /// Reject bodies longer than `limit` bytes. `None` accepts any size.
    pub fn with_max_body(mut self, limit: Option<usize>) -> Self {
        self.max_body = limit;
        self
    }

    /// Append the next body chunk.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::BodyTooLarge`] once the total body length
    /// passes the configured limit.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Result<(), DispatchError> {
        self.received = self.received.saturating_add(chunk.len());
        if let Some(limit) = self.max_body {
            if self.received > limit {
                return Err(DispatchError::BodyTooLarge { limit });
            }
        }
        let text = self.decoder.decode(chunk);
        self.body.push_str(&text);
        Ok(())
    }

    /// Number of body bytes received so far.
    pub fn received(&self) -> usize {
        self.received
    }

    /// Signal end of input and build the normalized request.
    pub fn finish(mut self) -> NormalizedRequest {
        let tail = self.decoder.finish();
        self.body.push_str(&tail);
        NormalizedRequest {
            path: self.path,
            query_params: self.query_params,
            method: self.method,
            headers: self.headers,
            raw_body: self.body,
        }
    }
}

/// Strip every leading and trailing `/` from `path`.
pub fn trim_path(path: &str) -> &str {
    path.trim_matches('/')
}

fn collect_headers(headers: &HeaderMap) -> HashMap<String, HeaderValue> {
    let mut out: HashMap<String, HeaderValue> = HashMap::with_capacity(headers.keys_len());
    for (name, value) in headers {
        let value = match value.to_str() {
            Ok(v) => v.to_owned(),
            Err(_) => String::from_utf8_lossy(value.as_bytes()).into_owned(),
        };
        match out.get_mut(name.as_str()) {
            Some(existing) => existing.push(value),
            None => {
                out.insert(name.as_str().to_owned(), HeaderValue::Single(value));
            }
        }
    }
    out
}

fn parse_target(target: &str, host: Option<&str>) -> (String, HashMap<String, String>) {
    let resolved = host
        .and_then(|h| Url::parse(&format!("http://{h}/")).ok())
        .or_else(|| Url::parse(&format!("http://{FALLBACK_HOST}/")).ok())
        .and_then(|base| base.join(target).ok());

    match resolved {
        Some(url) => (
            trim_path(url.path()).to_owned(),
            collect_query(url.query().unwrap_or("")),
        ),
        None => {
            let (path, query) = target.split_once('?').unwrap_or((target, ""));
            (trim_path(path).to_owned(), collect_query(query))
        }
    }
}

fn collect_query(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        // Later occurrences overwrite earlier ones.
        params.insert(key.into_owned(), value.into_owned());
    }
    params
}
