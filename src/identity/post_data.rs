//! Buffered POST fields for the identification stage.
//!
//! Login posts are buffered whole; the middleware parses form fields from the
//! bytes and hands the same bytes on to the downstream handler. Flash uploads
//! only have a bounded prefix read (`PostFields::peek`), which is replayed in
//! front of the untouched remainder of the stream. File parts of multipart
//! bodies are skipped; only plain fields are kept.

use std::collections::HashMap;

use axum::body::{Body, Bytes};
use axum::extract::{FromRequest, Multipart};
use axum::http::{header, HeaderMap, Request};
use futures_util::{stream, StreamExt};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostFields {
    fields: HashMap<String, Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormKind { UrlEncoded, Multipart }

pub fn form_kind(headers: &HeaderMap) -> Option<FormKind> {
    let ct = headers.get(header::CONTENT_TYPE)?.to_str().ok()?.to_ascii_lowercase();
    if ct.starts_with("application/x-www-form-urlencoded") {
        Some(FormKind::UrlEncoded)
    } else if ct.starts_with("multipart/form-data") {
        Some(FormKind::Multipart)
    } else {
        None
    }
}

fn multipart_boundary(headers: &HeaderMap) -> Option<String> {
    let ct = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
    ct.split(';').find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim().eq_ignore_ascii_case("boundary").then(|| value.trim().trim_matches('"').to_string())
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// The named part and the delimiter closing it are both in `buf`.
fn holds_complete_part(buf: &[u8], boundary: &str, name: &str) -> bool {
    let marker = format!("name=\"{name}\"");
    let Some(start) = find(buf, marker.as_bytes()) else { return false; };
    find(&buf[start..], format!("\r\n--{boundary}").as_bytes()).is_some()
}

impl PostFields {
    pub fn from_pairs<K: Into<String>, V: Into<Vec<u8>>>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        Self { fields: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }

    /// Parse according to the request content type. Unparsable bodies yield
    /// whatever fields were read before the failure.
    pub async fn parse(headers: &HeaderMap, body: Bytes) -> Self {
        match form_kind(headers) {
            Some(FormKind::UrlEncoded) => Self::parse_urlencoded(&body),
            Some(FormKind::Multipart) => Self::parse_multipart(headers, body).await,
            None => Self::default(),
        }
    }

    /// Read at most about `cap` bytes of `body`, stopping early once the
    /// multipart part named `field` has been seen in full, and parse fields
    /// from that prefix. The returned body replays the prefix followed by the
    /// unread remainder, so the downstream handler sees the request unchanged.
    pub async fn peek(headers: &HeaderMap, body: Body, cap: usize, field: &str) -> (Self, Body) {
        let boundary = match form_kind(headers) {
            Some(FormKind::Multipart) => multipart_boundary(headers),
            _ => None,
        };
        let mut rest = body.into_data_stream();
        let mut prefix = Vec::new();
        let mut failure = None;
        let mut finished = false;
        while prefix.len() < cap {
            if boundary.as_deref().is_some_and(|b| holds_complete_part(&prefix, b, field)) {
                break;
            }
            match rest.next().await {
                Some(Ok(chunk)) => prefix.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    debug!(target: "auth", error = %e, "request body failed while peeking");
                    failure = Some(e);
                    break;
                }
                None => {
                    finished = true;
                    break;
                }
            }
        }
        if !finished && failure.is_none() {
            debug!(target: "auth", read = prefix.len(), cap, "post fields taken from a body prefix");
        }
        let prefix = Bytes::from(prefix);
        let fields = Self::parse(headers, prefix.clone()).await;
        let body = if finished {
            Body::from(prefix)
        } else {
            let head = std::iter::once(Ok(prefix)).chain(failure.map(Err));
            Body::from_stream(stream::iter(head).chain(rest))
        };
        (fields, body)
    }

    fn parse_urlencoded(body: &[u8]) -> Self {
        match serde_urlencoded::from_bytes::<Vec<(String, String)>>(body) {
            Ok(pairs) => Self::from_pairs(pairs),
            Err(e) => {
                debug!(target: "auth", error = %e, "urlencoded body not parsed");
                Self::default()
            }
        }
    }

    async fn parse_multipart(headers: &HeaderMap, body: Bytes) -> Self {
        let mut out = Self::default();
        let mut builder = Request::builder().method("POST");
        if let Some(ct) = headers.get(header::CONTENT_TYPE) {
            builder = builder.header(header::CONTENT_TYPE, ct);
        }
        let Ok(req) = builder.body(Body::from(body)) else { return out; };
        let mut multipart = match Multipart::from_request(req, &()).await {
            Ok(m) => m,
            Err(e) => {
                debug!(target: "auth", error = %e, "multipart body not parsed");
                return out;
            }
        };
        loop {
            match multipart.next_field().await {
                Ok(Some(field)) => {
                    if field.file_name().is_some() { continue; }
                    let Some(name) = field.name().map(str::to_owned) else { continue; };
                    match field.bytes().await {
                        Ok(data) => { out.fields.insert(name, data.to_vec()); }
                        Err(e) => {
                            debug!(target: "auth", error = %e, "multipart field not read");
                            break;
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(target: "auth", error = %e, "multipart stream ended early");
                    break;
                }
            }
        }
        out
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> { self.fields.get(name).map(Vec::as_slice) }

    /// The field as UTF-8; `None` when missing or not valid UTF-8.
    pub fn text(&self, name: &str) -> Option<&str> { self.get(name).and_then(|b| std::str::from_utf8(b).ok()) }

    pub fn is_empty(&self) -> bool { self.fields.is_empty() }
}
