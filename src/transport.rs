//! Token transport — cookies and URL parameters
//!
//! `TransportContext` is a framework-neutral view of one request/response
//! pair: the host framework fills it from the `Cookie` header and request
//! URL, and afterwards turns the staged cookies into `Set-Cookie` headers.

use crate::config::ManagerConfig;
use cookie::time::{Duration, OffsetDateTime};
use cookie::Cookie;
use std::collections::HashMap;

/// Request-side token sources plus response-side staged cookies
#[derive(Debug, Clone, Default)]
pub struct TransportContext {
    cookies: HashMap<String, String>,
    query: HashMap<String, String>,
    staged: Vec<Cookie<'static>>,
}

impl TransportContext {
    /// Empty context (no cookies, no URL parameters)
    pub fn new() -> Self {
        Self::default()
    }

    /// Add cookies from a raw `Cookie` request header
    ///
    /// Values are percent-decoded. Malformed pairs are skipped, and the
    /// first occurrence of a name wins, matching how user agents order more
    /// specific cookies first.
    pub fn with_cookie_header(mut self, header: &str) -> Self {
        for cookie in Cookie::split_parse_encoded(header).flatten() {
            if !self.cookies.contains_key(cookie.name()) {
                self.cookies
                    .insert(cookie.name().to_string(), cookie.value_trimmed().to_string());
            }
        }
        self
    }

    /// Add a single already-decoded cookie
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.entry(name.into()).or_insert_with(|| value.into());
        self
    }

    /// Add URL parameters from a request URL or bare query string
    pub fn with_url(mut self, url: &str) -> Self {
        let without_fragment = url.split('#').next().unwrap_or_default();
        let query = match without_fragment.split_once('?') {
            Some((_, q)) => q,
            None if without_fragment.contains('=') => without_fragment,
            None => return self,
        };

        for pair in query.split('&') {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            let name = match urlencoding::decode(&name.replace('+', " ")) {
                Ok(n) => n.into_owned(),
                Err(_) => continue,
            };
            if name.is_empty() || self.query.contains_key(&name) {
                continue;
            }
            if let Ok(value) = urlencoding::decode(&value.replace('+', " ")) {
                self.query.insert(name, value.into_owned());
            }
        }
        self
    }

    /// Cookie value by name
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// URL parameter value by name
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Token carried by either transport; the cookie takes precedence
    pub fn token(&self, name: &str, accept_url: bool) -> Option<&str> {
        self.cookie(name)
            .filter(|v| !v.is_empty())
            .or_else(|| {
                accept_url
                    .then(|| self.query_param(name))
                    .flatten()
                    .filter(|v| !v.is_empty())
            })
    }

    /// Queue a cookie for the response, replacing one with the same name
    pub fn stage(&mut self, cookie: Cookie<'static>) {
        self.staged.retain(|c| c.name() != cookie.name());
        self.staged.push(cookie);
    }

    /// Cookies queued for the response
    pub fn staged(&self) -> &[Cookie<'static>] {
        &self.staged
    }

    /// Drain queued cookies
    pub fn take_staged(&mut self) -> Vec<Cookie<'static>> {
        std::mem::take(&mut self.staged)
    }

    /// Rendered `Set-Cookie` header values, percent-encoded
    pub fn set_cookie_headers(&self) -> Vec<String> {
        self.staged.iter().map(|c| c.encoded().to_string()).collect()
    }
}

fn base_cookie(config: &ManagerConfig, value: String) -> Cookie<'static> {
    let mut cookie = Cookie::build((config.cookie_name.clone(), value))
        .http_only(true)
        .secure(config.secure)
        .build();
    if !config.cookie_path.is_empty() {
        cookie.set_path(config.cookie_path.clone());
    }
    cookie.set_same_site(config.same_site);
    cookie
}

/// Cookie carrying a session token
///
/// A cookie lifetime of zero leaves out `Max-Age`, so the browser drops
/// the cookie when it closes.
pub fn session_cookie(config: &ManagerConfig, token: &str) -> Cookie<'static> {
    let mut cookie = base_cookie(config, token.to_string());
    let max_age = config.cookie_max_age();
    if max_age > 0 {
        cookie.set_max_age(Duration::seconds(i64::try_from(max_age).unwrap_or(i64::MAX)));
    }
    cookie
}

/// Cookie that makes the client drop its token immediately
pub fn removal_cookie(config: &ManagerConfig) -> Cookie<'static> {
    let mut cookie = base_cookie(config, String::new());
    cookie.make_removal();
    cookie.set_expires(OffsetDateTime::UNIX_EPOCH);
    cookie
}

/// Whether a staged cookie deletes the client-held value
pub fn is_removal(cookie: &Cookie<'_>) -> bool {
    cookie.max_age().is_some_and(|age| age <= Duration::ZERO)
}

/// Append `name=token` to a URL for clients without cookie support
pub fn append_token(url: &str, name: &str, token: &str) -> String {
    let (base, fragment) = match url.split_once('#') {
        Some((b, f)) => (b, Some(f)),
        None => (url, None),
    };
    let sep = if !base.contains('?') {
        "?"
    } else if base.ends_with('?') || base.ends_with('&') {
        ""
    } else {
        "&"
    };

    let mut out = format!(
        "{}{}{}={}",
        base,
        sep,
        urlencoding::encode(name),
        urlencoding::encode(token)
    );
    if let Some(fragment) = fragment {
        out.push('#');
        out.push_str(fragment);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use cookie::SameSite;

    #[test]
    fn test_parse_cookie_header() {
        let ctx = TransportContext::new()
            .with_cookie_header("theme=dark; sessionid=abc%2Ddef;  other=1; sessionid=later");
        assert_eq!(ctx.cookie("sessionid"), Some("abc-def"));
        assert_eq!(ctx.cookie("theme"), Some("dark"));
        assert_eq!(ctx.cookie("other"), Some("1"));
        assert_eq!(ctx.cookie("missing"), None);
    }

    #[test]
    fn test_parse_cookie_header_skips_malformed_pairs() {
        let ctx = TransportContext::new()
            .with_cookie_header("novalue; =orphan; sessionid=\"quoted\"; lang=en");
        assert_eq!(ctx.cookie("sessionid"), Some("quoted"));
        assert_eq!(ctx.cookie("lang"), Some("en"));
        assert_eq!(ctx.cookie("novalue"), None);
        assert_eq!(ctx.cookie(""), None);
    }

    #[test]
    fn test_parse_url_params() {
        let ctx = TransportContext::new().with_url("/cart?item=1&sessionid=tok123#top");
        assert_eq!(ctx.query_param("sessionid"), Some("tok123"));
        assert_eq!(ctx.query_param("item"), Some("1"));

        let bare = TransportContext::new().with_url("sessionid=xyz");
        assert_eq!(bare.query_param("sessionid"), Some("xyz"));

        let none = TransportContext::new().with_url("/plain/path");
        assert_eq!(none.query_param("sessionid"), None);
    }

    #[test]
    fn test_token_prefers_cookie() {
        let ctx = TransportContext::new()
            .with_cookie("sid", "from-cookie")
            .with_url("/?sid=from-url");
        assert_eq!(ctx.token("sid", true), Some("from-cookie"));

        let url_only = TransportContext::new().with_url("/?sid=from-url");
        assert_eq!(url_only.token("sid", true), Some("from-url"));
        assert_eq!(url_only.token("sid", false), None);

        let empty = TransportContext::new().with_cookie("sid", "");
        assert_eq!(empty.token("sid", true), None);
    }

    #[test]
    fn test_session_cookie_rendering() {
        let config = ManagerConfig::default();
        let cookie = session_cookie(&config, "tok");
        assert_eq!(
            cookie.encoded().to_string(),
            "sessionid=tok; HttpOnly; SameSite=Lax; Path=/; Max-Age=3600"
        );
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert!(!is_removal(&cookie));
    }

    #[test]
    fn test_browser_session_cookie_has_no_max_age() {
        let config = ManagerConfig::default()
            .with_cookie_lifetime(std::time::Duration::ZERO)
            .with_same_site(None)
            .with_secure(true);
        let cookie = session_cookie(&config, "tok");
        assert_eq!(cookie.max_age(), None);
        assert_eq!(
            cookie.encoded().to_string(),
            "sessionid=tok; HttpOnly; Secure; Path=/"
        );
    }

    #[test]
    fn test_cookie_value_is_percent_encoded() {
        let config = ManagerConfig::default().with_same_site(None);
        let cookie = session_cookie(&config, "a b;c");
        let rendered = cookie.encoded().to_string();
        assert!(rendered.starts_with("sessionid=a%20b%3Bc;"));

        let ctx = TransportContext::new().with_cookie_header(&rendered);
        assert_eq!(ctx.cookie("sessionid"), Some("a b;c"));
    }

    #[test]
    fn test_removal_cookie_rendering() {
        let config = ManagerConfig::default().with_same_site(None);
        let cookie = removal_cookie(&config);
        assert!(is_removal(&cookie));
        assert_eq!(cookie.value(), "");
        assert_eq!(
            cookie.encoded().to_string(),
            "sessionid=; HttpOnly; Path=/; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT"
        );
    }

    #[test]
    fn test_stage_replaces_same_name() {
        let config = ManagerConfig::default();
        let mut ctx = TransportContext::new();
        ctx.stage(session_cookie(&config, "a"));
        ctx.stage(removal_cookie(&config));
        assert_eq!(ctx.staged().len(), 1);
        assert!(is_removal(&ctx.staged()[0]));
        assert_eq!(ctx.set_cookie_headers().len(), 1);
        assert_eq!(ctx.take_staged().len(), 1);
        assert!(ctx.staged().is_empty());
    }

    #[test]
    fn test_append_token() {
        assert_eq!(append_token("/cart", "sid", "t"), "/cart?sid=t");
        assert_eq!(append_token("/cart?x=1", "sid", "t"), "/cart?x=1&sid=t");
        assert_eq!(append_token("/cart?", "sid", "t"), "/cart?sid=t");
        assert_eq!(append_token("/a#frag", "sid", "t"), "/a?sid=t#frag");
    }
}
