//! HTTP cookies.
//!
//! `Set-Cookie` parsing and serialization go through the `cookie` crate; the
//! payload keeps the toolkit's view of a cookie, where a parsed domain always
//! carries a leading dot and the expiration is a single optional instant.

use std::ffi::c_void;

use bridge_traits::assert_abi_contract;
use bridge_traits::ffi::{ByteView, CookieRawForm, PushFn, SameSite};
use cookie::time::{Duration, OffsetDateTime, PrimitiveDateTime};
use cookie::Cookie;
use tracing::{debug, warn};
use url::Url;

use crate::bytearray::{write_bytes, NativeByteArray};
use crate::handle::{export_shared_handle, payload, Shared};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkCookieData {
    pub name: Vec<u8>,
    pub value: Vec<u8>,
    pub domain: String,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: Option<SameSite>,
    /// Unix milliseconds; `None` for a session cookie.
    pub expiration_ms: Option<i64>,
}

payload!(NetworkCookieData, "NetworkCookie");

pub type NativeNetworkCookie = Shared<NetworkCookieData>;

assert_abi_contract!(SharedHandle, NativeNetworkCookie, { d: usize });

fn unix_ms(instant: OffsetDateTime) -> i64 {
    (instant.unix_timestamp_nanos() / 1_000_000) as i64
}

fn from_unix_ms(ms: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000).ok()
}

impl NetworkCookieData {
    pub fn new(name: &[u8], value: &[u8]) -> Self {
        Self {
            name: name.to_vec(),
            value: value.to_vec(),
            ..Self::default()
        }
    }

    fn from_parsed(parsed: &Cookie<'_>, now: OffsetDateTime) -> Self {
        let domain = parsed
            .domain()
            .filter(|domain| !domain.is_empty())
            .map(|domain| format!(".{domain}"))
            .unwrap_or_default();

        let expiration_ms = match (parsed.max_age(), parsed.expires_datetime()) {
            (Some(max_age), _) if max_age <= Duration::ZERO => Some(0),
            (Some(max_age), _) => Some(unix_ms(
                now.checked_add(max_age)
                    .unwrap_or_else(|| PrimitiveDateTime::MAX.assume_utc()),
            )),
            (None, Some(expires)) => Some(unix_ms(expires)),
            (None, None) => None,
        };

        Self {
            name: parsed.name().as_bytes().to_vec(),
            value: parsed.value().as_bytes().to_vec(),
            domain,
            path: parsed.path().unwrap_or_default().to_string(),
            secure: parsed.secure().unwrap_or(false),
            http_only: parsed.http_only().unwrap_or(false),
            same_site: parsed.same_site().map(|policy| match policy {
                cookie::SameSite::Strict => SameSite::Strict,
                cookie::SameSite::Lax => SameSite::Lax,
                cookie::SameSite::None => SameSite::None,
            }),
            expiration_ms,
        }
    }

    /// Parses one cookie per line. A single bad line fails the whole input.
    pub fn parse_all(input: &[u8]) -> Vec<Self> {
        let text = String::from_utf8_lossy(input);
        let now = OffsetDateTime::now_utc();
        let mut cookies = Vec::new();
        for line in text.split('\n').map(str::trim).filter(|line| !line.is_empty()) {
            match Cookie::parse(line) {
                Ok(parsed) => cookies.push(Self::from_parsed(&parsed, now)),
                Err(err) => {
                    warn!(error = %err, "Rejected Set-Cookie line");
                    return Vec::new();
                }
            }
        }
        debug!(count = cookies.len(), "Parsed cookies");
        cookies
    }

    fn to_cookie(&self) -> Cookie<'static> {
        let mut cookie = Cookie::new(
            String::from_utf8_lossy(&self.name).into_owned(),
            String::from_utf8_lossy(&self.value).into_owned(),
        );
        if self.secure {
            cookie.set_secure(true);
        }
        if self.http_only {
            cookie.set_http_only(true);
        }
        match self.same_site {
            Some(SameSite::Strict) => cookie.set_same_site(cookie::SameSite::Strict),
            Some(SameSite::Lax) => cookie.set_same_site(cookie::SameSite::Lax),
            Some(SameSite::None) => cookie.set_same_site(cookie::SameSite::None),
            Some(SameSite::Default) | None => {}
        }
        if let Some(expires) = self.expiration_ms.and_then(from_unix_ms) {
            cookie.set_expires(expires);
        }
        if !self.domain.is_empty() {
            cookie.set_domain(self.domain.clone());
        }
        if !self.path.is_empty() {
            cookie.set_path(self.path.clone());
        }
        cookie
    }

    pub fn to_raw_form(&self, form: CookieRawForm) -> String {
        let cookie = self.to_cookie();
        match form {
            CookieRawForm::NameAndValueOnly => cookie.stripped().to_string(),
            CookieRawForm::Full => cookie.to_string(),
        }
    }

    pub fn has_same_identifier(&self, other: &Self) -> bool {
        self.name == other.name && self.domain == other.domain && self.path == other.path
    }

    /// Fills in the path and domain a cookie received from `url` defaults to.
    pub fn normalize(&mut self, url: &Url) {
        if self.path.is_empty() {
            let path = url.path();
            let default_path = &path[..path.rfind('/').map_or(0, |slash| slash + 1)];
            self.path = if default_path.is_empty() {
                "/".to_string()
            } else {
                default_path.to_string()
            };
        }

        if self.domain.is_empty() {
            self.domain = url.host_str().unwrap_or_default().to_string();
        } else {
            let is_ip = self
                .domain
                .trim_matches(|c| c == '[' || c == ']')
                .parse::<std::net::IpAddr>()
                .is_ok();
            if !is_ip && !self.domain.starts_with('.') {
                self.domain.insert(0, '.');
            }
        }
    }
}

export_shared_handle!(NativeNetworkCookie {
    default: netbridge_cookie_init_default,
    clone: netbridge_cookie_clone,
    drop: netbridge_cookie_drop,
    eq: netbridge_cookie_eq,
    ref_count: netbridge_cookie_ref_count,
    live: netbridge_cookie_live_payloads,
});

#[no_mangle]
pub unsafe extern "C" fn netbridge_cookie_new(
    name: ByteView,
    value: ByteView,
    out: *mut NativeNetworkCookie,
) {
    out.write(Shared::new(NetworkCookieData::new(name.as_slice(), value.as_slice())));
}

/// Pushes each parsed cookie; returns how many were pushed.
#[no_mangle]
pub unsafe extern "C" fn netbridge_cookie_parse(
    input: ByteView,
    push: PushFn,
    ctx: *mut c_void,
) -> usize {
    let cookies = NetworkCookieData::parse_all(input.as_slice());
    for data in &cookies {
        let cookie = NativeNetworkCookie::new(data.clone());
        push(ctx, (&cookie as *const NativeNetworkCookie).cast());
    }
    cookies.len()
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_cookie_name(
    cookie: *const NativeNetworkCookie,
    out: *mut NativeByteArray,
) {
    let cookie = &*cookie;
    write_bytes(out, cookie.name.as_slice());
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_cookie_set_name(cookie: *mut NativeNetworkCookie, name: ByteView) {
    let cookie = &mut *cookie;
    cookie.make_mut().name = name.as_slice().to_vec();
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_cookie_value(
    cookie: *const NativeNetworkCookie,
    out: *mut NativeByteArray,
) {
    let cookie = &*cookie;
    write_bytes(out, cookie.value.as_slice());
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_cookie_set_value(cookie: *mut NativeNetworkCookie, value: ByteView) {
    let cookie = &mut *cookie;
    cookie.make_mut().value = value.as_slice().to_vec();
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_cookie_domain(
    cookie: *const NativeNetworkCookie,
    out: *mut NativeByteArray,
) {
    let cookie = &*cookie;
    write_bytes(out, cookie.domain.as_bytes());
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_cookie_set_domain(cookie: *mut NativeNetworkCookie, domain: ByteView) {
    let cookie = &mut *cookie;
    cookie.make_mut().domain = String::from_utf8_lossy(domain.as_slice()).into_owned();
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_cookie_path(
    cookie: *const NativeNetworkCookie,
    out: *mut NativeByteArray,
) {
    let cookie = &*cookie;
    write_bytes(out, cookie.path.as_bytes());
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_cookie_set_path(cookie: *mut NativeNetworkCookie, path: ByteView) {
    let cookie = &mut *cookie;
    cookie.make_mut().path = String::from_utf8_lossy(path.as_slice()).into_owned();
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_cookie_is_secure(cookie: *const NativeNetworkCookie) -> bool {
    let cookie = &*cookie;
    cookie.secure
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_cookie_set_secure(cookie: *mut NativeNetworkCookie, enable: bool) {
    let cookie = &mut *cookie;
    cookie.make_mut().secure = enable;
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_cookie_is_http_only(cookie: *const NativeNetworkCookie) -> bool {
    let cookie = &*cookie;
    cookie.http_only
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_cookie_set_http_only(cookie: *mut NativeNetworkCookie, enable: bool) {
    let cookie = &mut *cookie;
    cookie.make_mut().http_only = enable;
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_cookie_same_site_policy(
    cookie: *const NativeNetworkCookie,
) -> SameSite {
    let cookie = &*cookie;
    cookie.same_site.unwrap_or(SameSite::Default)
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_cookie_set_same_site_policy(
    cookie: *mut NativeNetworkCookie,
    policy: SameSite,
) {
    let cookie = &mut *cookie;
    cookie.make_mut().same_site = (policy != SameSite::Default).then_some(policy);
}

/// Returns `false` for a session cookie, leaving `*ms` untouched.
#[no_mangle]
pub unsafe extern "C" fn netbridge_cookie_expiration(
    cookie: *const NativeNetworkCookie,
    ms: *mut i64,
) -> bool {
    let cookie = &*cookie;
    match cookie.expiration_ms {
        Some(expiration) => {
            *ms = expiration;
            true
        }
        None => false,
    }
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_cookie_set_expiration(
    cookie: *mut NativeNetworkCookie,
    has_expiration: bool,
    ms: i64,
) {
    let cookie = &mut *cookie;
    cookie.make_mut().expiration_ms = has_expiration.then_some(ms);
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_cookie_is_session_cookie(cookie: *const NativeNetworkCookie) -> bool {
    let cookie = &*cookie;
    cookie.expiration_ms.is_none()
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_cookie_to_raw_form(
    cookie: *const NativeNetworkCookie,
    form: CookieRawForm,
    out: *mut NativeByteArray,
) {
    let cookie = &*cookie;
    write_bytes(out, cookie.to_raw_form(form));
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_cookie_has_same_identifier(
    a: *const NativeNetworkCookie,
    b: *const NativeNetworkCookie,
) -> bool {
    let a = &*a;
    a.has_same_identifier(&*b)
}

/// Returns `false`, leaving the cookie unchanged, when `url` does not parse.
#[no_mangle]
pub unsafe extern "C" fn netbridge_cookie_normalize(
    cookie: *mut NativeNetworkCookie,
    url: ByteView,
) -> bool {
    let cookie = &mut *cookie;
    let text = String::from_utf8_lossy(url.as_slice());
    match Url::parse(&text) {
        Ok(url) => {
            cookie.make_mut().normalize(&url);
            true
        }
        Err(err) => {
            warn!(url = %text, error = %err, "Cannot normalize cookie against invalid URL");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_cookie() {
        let cookies = NetworkCookieData::parse_all(b"name=value; Path=/");
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].name, b"name");
        assert_eq!(cookies[0].value, b"value");
        assert_eq!(cookies[0].path, "/");
        assert!(cookies[0].expiration_ms.is_none());
    }

    #[test]
    fn test_parse_attributes() {
        let cookies = NetworkCookieData::parse_all(
            b"sid=1; Domain=example.com; Secure; HttpOnly; SameSite=Lax; Max-Age=0\nother=2",
        );
        assert_eq!(cookies.len(), 2);
        let sid = &cookies[0];
        assert_eq!(sid.domain, ".example.com");
        assert!(sid.secure && sid.http_only);
        assert_eq!(sid.same_site, Some(SameSite::Lax));
        assert_eq!(sid.expiration_ms, Some(0));
    }

    #[test]
    fn test_huge_max_age_clamps() {
        let cookies = NetworkCookieData::parse_all(b"a=b; Max-Age=999999999999\nc=d; Max-Age=9223372036854775807");
        assert_eq!(cookies.len(), 2);

        let century = unix_ms(OffsetDateTime::now_utc() + Duration::days(36_500));
        assert!(cookies[0].expiration_ms.is_some_and(|ms| ms > century));
        assert_eq!(cookies[1].expiration_ms, Some(unix_ms(PrimitiveDateTime::MAX.assume_utc())));
        assert!(cookies[0].to_raw_form(CookieRawForm::Full).contains("Expires="));
    }

    #[test]
    fn test_parse_failure_yields_nothing() {
        assert!(NetworkCookieData::parse_all(b"good=1\n=missing-name").is_empty());
    }

    #[test]
    fn test_raw_form() {
        let mut cookie = NetworkCookieData::new(b"a", b"b");
        cookie.path = "/docs".to_string();
        cookie.http_only = true;
        assert_eq!(cookie.to_raw_form(CookieRawForm::NameAndValueOnly), "a=b");
        let full = cookie.to_raw_form(CookieRawForm::Full);
        assert!(full.starts_with("a=b"));
        assert!(full.contains("HttpOnly"));
        assert!(full.contains("Path=/docs"));
    }

    #[test]
    fn test_normalize_defaults() {
        let url = Url::parse("https://www.example.com/a/b/page.html").unwrap();
        let mut cookie = NetworkCookieData::new(b"a", b"b");
        cookie.normalize(&url);
        assert_eq!(cookie.path, "/a/b/");
        assert_eq!(cookie.domain, "www.example.com");

        let mut scoped = NetworkCookieData::new(b"a", b"b");
        scoped.domain = "example.com".to_string();
        scoped.normalize(&url);
        assert_eq!(scoped.domain, ".example.com");
    }
}
