//! Request classification.
//!
//! Every request is put in a channel before identification so the pipeline
//! can pick which identifiers and challengers apply. Legacy Flash uploaders
//! cannot send cookies, so they post the session ticket as a form field
//! named after the cookie; the upload classifier moves it into the `Cookie`
//! header so identification only ever reads one place.

use axum::http::request::Parts;
use axum::http::{header, HeaderValue, Method};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::post_data::PostFields;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Browser,
    Api,
    Upload,
}

const DAV_METHODS: &[&str] = &["PROPFIND", "PROPPATCH", "MKCOL", "LOCK", "UNLOCK", "COPY", "MOVE"];

static DAV_AGENTS: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"(?i)(microsoft data access internet publishing provider|webdrive|webdavfs|webdavlib|cadaver|davfs2|neon/|gnome-vfs|goliveserver|xythos)").ok()
});

fn header_str<'a>(parts: &'a Parts, name: &str) -> &'a str {
    parts.headers.get(name).and_then(|v| v.to_str().ok()).unwrap_or("")
}

/// Header/method based channel: WebDAV clients and XML/JSON posts are API
/// traffic, everything else is a browser.
pub fn default_request_classifier(parts: &Parts) -> Channel {
    if DAV_METHODS.contains(&parts.method.as_str()) {
        return Channel::Api;
    }
    let agent = header_str(parts, header::USER_AGENT.as_str());
    if DAV_AGENTS.as_ref().is_some_and(|re| re.is_match(agent)) {
        return Channel::Api;
    }
    if parts.method == Method::POST {
        let ct = header_str(parts, header::CONTENT_TYPE.as_str()).to_ascii_lowercase();
        let mime = ct.split(';').next().unwrap_or("").trim();
        if mime == "text/xml" || mime == "application/xml" || mime.ends_with("+xml") || mime == "application/json" {
            return Channel::Api;
        }
    }
    Channel::Browser
}

#[derive(Debug, Clone)]
pub struct FlashUploadClassifier {
    cookie_name: String,
}

impl FlashUploadClassifier {
    pub fn new(cookie_name: impl Into<String>) -> Self { Self { cookie_name: cookie_name.into() } }

    pub fn cookie_name(&self) -> &str { &self.cookie_name }

    /// True for browser-channel POSTs made by the Flash player.
    pub fn is_flash_upload(&self, parts: &Parts) -> bool {
        if parts.method != Method::POST || default_request_classifier(parts) != Channel::Browser {
            return false;
        }
        header_str(parts, header::USER_AGENT.as_str()).contains("Flash")
            || header_str(parts, "x-requested-with").contains("Flash")
    }

    pub fn wants_post_data(&self, parts: &Parts) -> bool { self.is_flash_upload(parts) }

    /// Classify and, for Flash uploads, replace the `Cookie` header with the
    /// ticket found in the POST field. A missing or unusable field leaves the
    /// headers untouched.
    pub fn classify(&self, parts: &mut Parts, post: Option<&PostFields>) -> Channel {
        let baseline = default_request_classifier(parts);
        if baseline != Channel::Browser || !self.is_flash_upload(parts) {
            return baseline;
        }
        let value = post
            .and_then(|p| p.text(&self.cookie_name))
            .filter(|v| v.is_ascii())
            .and_then(|v| HeaderValue::from_str(&format!("{}={}", self.cookie_name, v)).ok());
        match value {
            Some(v) => {
                parts.headers.remove(header::COOKIE);
                parts.headers.insert(header::COOKIE, v);
            }
            None => debug!(target: "auth", field = %self.cookie_name, "flash upload without usable session field"),
        }
        Channel::Upload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(method: &str, headers: &[(&str, &str)]) -> Parts {
        let mut b = Request::builder().method(method).uri("/upload");
        for (k, v) in headers {
            b = b.header(*k, *v);
        }
        b.body(()).unwrap().into_parts().0
    }

    #[test]
    fn baseline_channels() {
        assert_eq!(default_request_classifier(&parts("GET", &[])), Channel::Browser);
        assert_eq!(default_request_classifier(&parts("PROPFIND", &[])), Channel::Api);
        assert_eq!(default_request_classifier(&parts("GET", &[("user-agent", "cadaver/0.23.3")])), Channel::Api);
        assert_eq!(default_request_classifier(&parts("POST", &[("content-type", "text/xml; charset=utf-8")])), Channel::Api);
        assert_eq!(default_request_classifier(&parts("POST", &[("content-type", "application/json")])), Channel::Api);
        assert_eq!(default_request_classifier(&parts("POST", &[("content-type", "multipart/form-data; boundary=x")])), Channel::Browser);
    }

    #[test]
    fn flash_upload_synthesizes_cookie_header() {
        let c = FlashUploadClassifier::new("authtkt");
        let mut p = parts("POST", &[("user-agent", "Shockwave Flash"), ("cookie", "flash=junk")]);
        let post = PostFields::from_pairs([("authtkt", "1700000000.Mw.abcd")]);
        assert_eq!(c.classify(&mut p, Some(&post)), Channel::Upload);
        let cookies: Vec<_> = p.headers.get_all("cookie").iter().collect();
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0], "authtkt=1700000000.Mw.abcd");
    }

    #[test]
    fn requested_with_flash_also_counts() {
        let c = FlashUploadClassifier::new("authtkt");
        let mut p = parts("POST", &[("x-requested-with", "ShockwaveFlash/32.0.0.465")]);
        let post = PostFields::from_pairs([("authtkt", "tok")]);
        assert_eq!(c.classify(&mut p, Some(&post)), Channel::Upload);
        assert_eq!(p.headers.get("cookie").unwrap(), "authtkt=tok");
    }

    #[test]
    fn missing_field_leaves_headers_unchanged() {
        let c = FlashUploadClassifier::new("authtkt");
        let mut p = parts("POST", &[("user-agent", "Adobe Flash Player 10"), ("cookie", "a=b")]);
        let before = p.headers.clone();
        assert_eq!(c.classify(&mut p, Some(&PostFields::default())), Channel::Upload);
        assert_eq!(p.headers, before);
        assert_eq!(c.classify(&mut p, None), Channel::Upload);
        assert_eq!(p.headers, before);
    }

    #[test]
    fn unencodable_field_is_ignored() {
        let c = FlashUploadClassifier::new("authtkt");
        let mut p = parts("POST", &[("user-agent", "Shockwave Flash")]);
        let post = PostFields::from_pairs([("authtkt", "t\u{e9}st\nx")]);
        assert_eq!(c.classify(&mut p, Some(&post)), Channel::Upload);
        assert!(p.headers.get("cookie").is_none());

        let post = PostFields::from_pairs([("authtkt", vec![0xffu8, 0x00])]);
        assert_eq!(c.classify(&mut p, Some(&post)), Channel::Upload);
        assert!(p.headers.get("cookie").is_none());
    }

    #[test]
    fn non_flash_or_non_post_is_left_alone() {
        let c = FlashUploadClassifier::new("authtkt");
        let post = PostFields::from_pairs([("authtkt", "tok")]);
        let mut p = parts("GET", &[("user-agent", "Shockwave Flash")]);
        assert_eq!(c.classify(&mut p, Some(&post)), Channel::Browser);
        let mut p = parts("POST", &[("user-agent", "Mozilla/5.0")]);
        assert_eq!(c.classify(&mut p, Some(&post)), Channel::Browser);
        assert!(p.headers.get("cookie").is_none());
        let mut p = parts("POST", &[("user-agent", "Shockwave Flash"), ("content-type", "text/xml")]);
        assert_eq!(c.classify(&mut p, Some(&post)), Channel::Api);
    }
}
