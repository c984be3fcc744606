use std::ffi::c_void;
use std::fmt;
use std::path::Path;

use bridge_traits::ffi::{ByteView, CryptographicHashAlgorithm, EncodingFormat, PushFn, SubjectInfo};
use bridge_traits::Clock;
use chrono::{DateTime, TimeZone, Utc};
use tracing::debug;

use super::altnames::AlternativeNames;
use super::key::SslKey;
use crate::bytearray::{string_from, ByteArray};
use crate::util::{collect, construct, shared_handle};

shared_handle! {
    /// An X.509 certificate. The default value is the null certificate.
    pub struct SslCertificate => bridge_native::NativeSslCertificate {
        default: netbridge_certificate_init_default,
        clone: netbridge_certificate_clone,
        drop: netbridge_certificate_drop,
        eq: netbridge_certificate_eq,
        ref_count: netbridge_certificate_ref_count,
        live: netbridge_certificate_live_payloads,
    }
}

extern "C" {
    fn netbridge_certificate_from_data(
        encoded: ByteView,
        format: EncodingFormat,
        push: PushFn,
        ctx: *mut c_void,
    ) -> usize;
    fn netbridge_certificate_from_path(path: ByteView, format: EncodingFormat, push: PushFn, ctx: *mut c_void)
        -> usize;
    fn netbridge_certificate_is_null(cert: *const SslCertificate) -> bool;
    fn netbridge_certificate_clear(cert: *mut SslCertificate);
    fn netbridge_certificate_to_der(cert: *const SslCertificate, out: *mut ByteArray);
    fn netbridge_certificate_to_pem(cert: *const SslCertificate, out: *mut ByteArray);
    fn netbridge_certificate_to_text(cert: *const SslCertificate, out: *mut ByteArray);
    fn netbridge_certificate_digest(
        cert: *const SslCertificate,
        algorithm: CryptographicHashAlgorithm,
        out: *mut ByteArray,
    );
    fn netbridge_certificate_serial_number(cert: *const SslCertificate, out: *mut ByteArray);
    fn netbridge_certificate_version(cert: *const SslCertificate, out: *mut ByteArray);
    fn netbridge_certificate_subject_info(
        cert: *const SslCertificate,
        info: SubjectInfo,
        push: PushFn,
        ctx: *mut c_void,
    ) -> usize;
    fn netbridge_certificate_issuer_info(
        cert: *const SslCertificate,
        info: SubjectInfo,
        push: PushFn,
        ctx: *mut c_void,
    ) -> usize;
    fn netbridge_certificate_subject_display_name(cert: *const SslCertificate, out: *mut ByteArray);
    fn netbridge_certificate_issuer_display_name(cert: *const SslCertificate, out: *mut ByteArray);
    fn netbridge_certificate_effective_date(cert: *const SslCertificate) -> i64;
    fn netbridge_certificate_expiry_date(cert: *const SslCertificate) -> i64;
    fn netbridge_certificate_is_self_signed(cert: *const SslCertificate) -> bool;
    fn netbridge_certificate_public_key(cert: *const SslCertificate, out: *mut SslKey);
    fn netbridge_certificate_subject_alternative_names(cert: *const SslCertificate, out: *mut AlternativeNames);
}

fn strings(arrays: Vec<ByteArray>) -> Vec<String> {
    arrays
        .iter()
        .map(|array| array.to_string_lossy().into_owned())
        .collect()
}

fn timestamp(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

impl SslCertificate {
    /// Every certificate in `encoded`. PEM blocks that fail to parse are
    /// skipped; DER parsing stops at the first bad certificate.
    pub fn from_data(encoded: &[u8], format: EncodingFormat) -> Vec<SslCertificate> {
        let certs: Vec<SslCertificate> = unsafe {
            collect(|push, ctx| netbridge_certificate_from_data(ByteView::from_slice(encoded), format, push, ctx))
        };
        debug!(count = certs.len(), ?format, "Loaded certificates");
        certs
    }

    /// Reads `path` and parses it like [`from_data`](Self::from_data). An
    /// unreadable file yields no certificates.
    pub fn from_path(path: impl AsRef<Path>, format: EncodingFormat) -> Vec<SslCertificate> {
        let path = path.as_ref().as_os_str().as_encoded_bytes();
        unsafe { collect(|push, ctx| netbridge_certificate_from_path(ByteView::from_slice(path), format, push, ctx)) }
    }

    pub fn is_null(&self) -> bool {
        unsafe { netbridge_certificate_is_null(self) }
    }

    pub fn clear(&mut self) {
        unsafe { netbridge_certificate_clear(self) }
    }

    pub fn to_der(&self) -> ByteArray {
        unsafe { construct(|out| netbridge_certificate_to_der(self, out)) }
    }

    pub fn to_pem(&self) -> ByteArray {
        unsafe { construct(|out| netbridge_certificate_to_pem(self, out)) }
    }

    /// Human-readable summary.
    pub fn to_text(&self) -> String {
        unsafe { string_from(|out| netbridge_certificate_to_text(self, out)) }
    }

    /// Digest of the DER encoding.
    pub fn digest(&self, algorithm: CryptographicHashAlgorithm) -> ByteArray {
        unsafe { construct(|out| netbridge_certificate_digest(self, algorithm, out)) }
    }

    /// Colon-separated lower-case hex.
    pub fn serial_number(&self) -> ByteArray {
        unsafe { construct(|out| netbridge_certificate_serial_number(self, out)) }
    }

    pub fn version(&self) -> ByteArray {
        unsafe { construct(|out| netbridge_certificate_version(self, out)) }
    }

    pub fn subject_info(&self, info: SubjectInfo) -> Vec<String> {
        strings(unsafe { collect(|push, ctx| netbridge_certificate_subject_info(self, info, push, ctx)) })
    }

    pub fn issuer_info(&self, info: SubjectInfo) -> Vec<String> {
        strings(unsafe { collect(|push, ctx| netbridge_certificate_issuer_info(self, info, push, ctx)) })
    }

    /// Common name, falling back to the organizational unit, then the
    /// organization.
    pub fn subject_display_name(&self) -> String {
        unsafe { string_from(|out| netbridge_certificate_subject_display_name(self, out)) }
    }

    pub fn issuer_display_name(&self) -> String {
        unsafe { string_from(|out| netbridge_certificate_issuer_display_name(self, out)) }
    }

    /// `notBefore` in Unix seconds.
    pub fn effective_date(&self) -> i64 {
        unsafe { netbridge_certificate_effective_date(self) }
    }

    /// `notAfter` in Unix seconds.
    pub fn expiry_date(&self) -> i64 {
        unsafe { netbridge_certificate_expiry_date(self) }
    }

    pub fn effective_date_time(&self) -> Option<DateTime<Utc>> {
        timestamp(self.effective_date())
    }

    pub fn expiry_date_time(&self) -> Option<DateTime<Utc>> {
        timestamp(self.expiry_date())
    }

    /// Inside the validity period at `clock`'s current time. Null
    /// certificates are never valid.
    pub fn is_valid_at(&self, clock: &dyn Clock) -> bool {
        let now = clock.unix_timestamp();
        !self.is_null() && self.effective_date() <= now && now <= self.expiry_date()
    }

    /// Subject equals issuer; the signature is not checked.
    pub fn is_self_signed(&self) -> bool {
        unsafe { netbridge_certificate_is_self_signed(self) }
    }

    pub fn public_key(&self) -> SslKey {
        unsafe { construct(|out| netbridge_certificate_public_key(self, out)) }
    }

    pub fn subject_alternative_names(&self) -> AlternativeNames {
        unsafe { construct(|out| netbridge_certificate_subject_alternative_names(self, out)) }
    }
}

impl fmt::Debug for SslCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return f.write_str("SslCertificate(null)");
        }
        f.debug_struct("SslCertificate")
            .field("subject", &self.subject_display_name())
            .field("issuer", &self.issuer_display_name())
            .field("serial", &self.serial_number().to_string_lossy())
            .field("expiry", &self.expiry_date_time())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::time::FixedClock;

    #[test]
    fn test_null_certificate() {
        let cert = SslCertificate::default();
        assert!(cert.is_null());
        assert!(cert.version().is_empty());
        assert!(cert.subject_info(SubjectInfo::CommonName).is_empty());
        assert!(cert.subject_alternative_names().is_empty());
        assert!(cert.public_key().is_null());

        let clock = FixedClock::from_unix_timestamp(0).unwrap();
        assert!(!cert.is_valid_at(&clock));
        assert_eq!(format!("{cert:?}"), "SslCertificate(null)");
    }

    #[test]
    fn test_garbage_yields_nothing() {
        assert!(SslCertificate::from_data(b"garbage", EncodingFormat::Pem).is_empty());
        assert!(SslCertificate::from_data(b"garbage", EncodingFormat::Der).is_empty());
        assert!(SslCertificate::from_path("/nonexistent/cert.pem", EncodingFormat::Pem).is_empty());
    }
}
