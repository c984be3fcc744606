//! HTTP cookies.

use std::ffi::c_void;
use std::fmt;

use bridge_traits::ffi::{ByteView, CookieRawForm, PushFn, SameSite};
use tracing::debug;

use crate::bytearray::{string_from, ByteArray};
use crate::util::{collect, construct, shared_handle};

shared_handle! {
    /// A cookie as sent in `Set-Cookie` or `Cookie` headers.
    pub struct NetworkCookie => bridge_native::NativeNetworkCookie {
        default: netbridge_cookie_init_default,
        clone: netbridge_cookie_clone,
        drop: netbridge_cookie_drop,
        eq: netbridge_cookie_eq,
        ref_count: netbridge_cookie_ref_count,
        live: netbridge_cookie_live_payloads,
    }
}

extern "C" {
    fn netbridge_cookie_new(name: ByteView, value: ByteView, out: *mut NetworkCookie);
    fn netbridge_cookie_parse(input: ByteView, push: PushFn, ctx: *mut c_void) -> usize;
    fn netbridge_cookie_name(cookie: *const NetworkCookie, out: *mut ByteArray);
    fn netbridge_cookie_set_name(cookie: *mut NetworkCookie, name: ByteView);
    fn netbridge_cookie_value(cookie: *const NetworkCookie, out: *mut ByteArray);
    fn netbridge_cookie_set_value(cookie: *mut NetworkCookie, value: ByteView);
    fn netbridge_cookie_domain(cookie: *const NetworkCookie, out: *mut ByteArray);
    fn netbridge_cookie_set_domain(cookie: *mut NetworkCookie, domain: ByteView);
    fn netbridge_cookie_path(cookie: *const NetworkCookie, out: *mut ByteArray);
    fn netbridge_cookie_set_path(cookie: *mut NetworkCookie, path: ByteView);
    fn netbridge_cookie_is_secure(cookie: *const NetworkCookie) -> bool;
    fn netbridge_cookie_set_secure(cookie: *mut NetworkCookie, enable: bool);
    fn netbridge_cookie_is_http_only(cookie: *const NetworkCookie) -> bool;
    fn netbridge_cookie_set_http_only(cookie: *mut NetworkCookie, enable: bool);
    fn netbridge_cookie_same_site_policy(cookie: *const NetworkCookie) -> SameSite;
    fn netbridge_cookie_set_same_site_policy(cookie: *mut NetworkCookie, policy: SameSite);
    fn netbridge_cookie_expiration(cookie: *const NetworkCookie, ms: *mut i64) -> bool;
    fn netbridge_cookie_set_expiration(cookie: *mut NetworkCookie, has_expiration: bool, ms: i64);
    fn netbridge_cookie_is_session_cookie(cookie: *const NetworkCookie) -> bool;
    fn netbridge_cookie_to_raw_form(cookie: *const NetworkCookie, form: CookieRawForm, out: *mut ByteArray);
    fn netbridge_cookie_has_same_identifier(a: *const NetworkCookie, b: *const NetworkCookie) -> bool;
    fn netbridge_cookie_normalize(cookie: *mut NetworkCookie, url: ByteView) -> bool;
}

fn view(bytes: &[u8]) -> ByteView {
    ByteView::from_slice(bytes)
}

impl NetworkCookie {
    pub fn new(name: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Self {
        unsafe { construct(|out| netbridge_cookie_new(view(name.as_ref()), view(value.as_ref()), out)) }
    }

    /// Parses one `Set-Cookie` value per line. A single unparsable line
    /// yields an empty list.
    pub fn parse_cookies(input: &[u8]) -> Vec<NetworkCookie> {
        let cookies: Vec<NetworkCookie> =
            unsafe { collect(|push, ctx| netbridge_cookie_parse(view(input), push, ctx)) };
        debug!(count = cookies.len(), "Parsed Set-Cookie input");
        cookies
    }

    pub fn name(&self) -> ByteArray {
        unsafe { construct(|out| netbridge_cookie_name(self, out)) }
    }

    pub fn set_name(&mut self, name: impl AsRef<[u8]>) {
        unsafe { netbridge_cookie_set_name(self, view(name.as_ref())) }
    }

    pub fn value(&self) -> ByteArray {
        unsafe { construct(|out| netbridge_cookie_value(self, out)) }
    }

    pub fn set_value(&mut self, value: impl AsRef<[u8]>) {
        unsafe { netbridge_cookie_set_value(self, view(value.as_ref())) }
    }

    pub fn domain(&self) -> String {
        unsafe { string_from(|out| netbridge_cookie_domain(self, out)) }
    }

    pub fn set_domain(&mut self, domain: &str) {
        unsafe { netbridge_cookie_set_domain(self, view(domain.as_bytes())) }
    }

    pub fn path(&self) -> String {
        unsafe { string_from(|out| netbridge_cookie_path(self, out)) }
    }

    pub fn set_path(&mut self, path: &str) {
        unsafe { netbridge_cookie_set_path(self, view(path.as_bytes())) }
    }

    pub fn is_secure(&self) -> bool {
        unsafe { netbridge_cookie_is_secure(self) }
    }

    pub fn set_secure(&mut self, enable: bool) {
        unsafe { netbridge_cookie_set_secure(self, enable) }
    }

    pub fn is_http_only(&self) -> bool {
        unsafe { netbridge_cookie_is_http_only(self) }
    }

    pub fn set_http_only(&mut self, enable: bool) {
        unsafe { netbridge_cookie_set_http_only(self, enable) }
    }

    /// [`SameSite::Default`] when the attribute is absent.
    pub fn same_site_policy(&self) -> SameSite {
        unsafe { netbridge_cookie_same_site_policy(self) }
    }

    pub fn set_same_site_policy(&mut self, policy: SameSite) {
        unsafe { netbridge_cookie_set_same_site_policy(self, policy) }
    }

    /// Expiration in Unix milliseconds; `None` for a session cookie.
    pub fn expiration(&self) -> Option<i64> {
        let mut ms = 0;
        unsafe { netbridge_cookie_expiration(self, &mut ms) }.then_some(ms)
    }

    pub fn set_expiration(&mut self, ms: Option<i64>) {
        unsafe { netbridge_cookie_set_expiration(self, ms.is_some(), ms.unwrap_or_default()) }
    }

    pub fn is_session_cookie(&self) -> bool {
        unsafe { netbridge_cookie_is_session_cookie(self) }
    }

    pub fn to_raw_form(&self, form: CookieRawForm) -> ByteArray {
        unsafe { construct(|out| netbridge_cookie_to_raw_form(self, form, out)) }
    }

    /// Same name, domain and path.
    pub fn has_same_identifier(&self, other: &NetworkCookie) -> bool {
        unsafe { netbridge_cookie_has_same_identifier(self, other) }
    }

    /// Fills in the defaults a cookie received from `url` gets. Returns
    /// `false`, leaving the cookie untouched, when `url` does not parse.
    pub fn normalize(&mut self, url: &str) -> bool {
        unsafe { netbridge_cookie_normalize(self, view(url.as_bytes())) }
    }
}

impl fmt::Debug for NetworkCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkCookie")
            .field("name", &self.name().to_string_lossy())
            .field("domain", &self.domain())
            .field("path", &self.path())
            .field("secure", &self.is_secure())
            .field("http_only", &self.is_http_only())
            .field("expiration", &self.expiration())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_cookie() {
        let cookies = NetworkCookie::parse_cookies(b"name=value; Path=/");
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].name().as_slice(), b"name");
        assert_eq!(cookies[0].value().as_slice(), b"value");
        assert_eq!(cookies[0].path(), "/");
        assert!(cookies[0].is_session_cookie());
    }

    #[test]
    fn test_one_bad_line_rejects_all() {
        assert!(NetworkCookie::parse_cookies(b"a=1\nnot a cookie").is_empty());
    }

    #[test]
    fn test_setters_and_identifier() {
        let mut first = NetworkCookie::new("sid", "abc");
        first.set_domain(".example.com");
        first.set_path("/app");
        first.set_secure(true);
        first.set_expiration(Some(1_700_000_000_000));

        let mut second = first.clone();
        second.set_value("other");

        assert!(first.has_same_identifier(&second));
        assert_ne!(first, second);
        assert_eq!(first.expiration(), Some(1_700_000_000_000));
        assert!(!first.is_session_cookie());
        assert_eq!(
            first.to_raw_form(CookieRawForm::NameAndValueOnly).as_slice(),
            b"sid=abc"
        );
    }

    #[test]
    fn test_normalize_fills_defaults() {
        let mut cookie = NetworkCookie::new("a", "b");
        assert!(cookie.normalize("https://www.example.com/docs/page.html"));
        assert_eq!(cookie.domain(), "www.example.com");
        assert_eq!(cookie.path(), "/docs/");
        assert!(!cookie.normalize("not a url"));
    }
}
