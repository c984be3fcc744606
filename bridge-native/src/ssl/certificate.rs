//! X.509 certificates.
//!
//! A certificate payload keeps the DER encoding together with the fields
//! read from it at load time. The default payload is the null certificate.

use std::ffi::c_void;
use std::fs;
use std::net::IpAddr;

use bridge_traits::assert_abi_contract;
use bridge_traits::ffi::{
    AlternativeNameEntryType, ByteView, CryptographicHashAlgorithm, EncodingFormat, PushFn,
    SubjectInfo,
};
use tracing::{debug, warn};
use x509_parser::extensions::GeneralName;
use x509_parser::parse_x509_certificate;
use x509_parser::pem::Pem;
use x509_parser::x509::X509Name;

use super::altnames::{AltNameEntry, AlternativeNamesData, NativeAlternativeNames};
use super::key::{NativeSslKey, SslKeyData};
use super::{encode_pem, hex_colon, ParseResult, SslParseError};
use crate::bytearray::{push_all, write_bytes, NativeByteArray};
use crate::handle::{export_shared_handle, payload, Shared};
use crate::hash::NativeCryptographicHash;

const PEM_LABEL: &str = "CERTIFICATE";

/// Distinguished name as `(attribute OID, value)` pairs in encoding order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameInfo {
    attributes: Vec<(String, String)>,
    text: String,
}

fn attribute_oid(info: SubjectInfo) -> &'static str {
    match info {
        SubjectInfo::Organization => "2.5.4.10",
        SubjectInfo::CommonName => "2.5.4.3",
        SubjectInfo::LocalityName => "2.5.4.7",
        SubjectInfo::OrganizationalUnitName => "2.5.4.11",
        SubjectInfo::CountryName => "2.5.4.6",
        SubjectInfo::StateOrProvinceName => "2.5.4.8",
        SubjectInfo::DistinguishedNameQualifier => "2.5.4.46",
        SubjectInfo::SerialNumber => "2.5.4.5",
        SubjectInfo::EmailAddress => "1.2.840.113549.1.9.1",
    }
}

impl NameInfo {
    fn read(name: &X509Name<'_>) -> Self {
        let attributes = name
            .iter_attributes()
            .filter_map(|attr| {
                let value = attr.as_str().ok()?;
                Some((attr.attr_type().to_id_string(), value.to_string()))
            })
            .collect();
        Self {
            attributes,
            text: name.to_string(),
        }
    }

    pub fn values(&self, info: SubjectInfo) -> impl Iterator<Item = &str> + '_ {
        let oid = attribute_oid(info);
        self.attributes
            .iter()
            .filter(move |(attr, _)| attr == oid)
            .map(|(_, value)| value.as_str())
    }

    /// Common name, else organizational unit, else organization.
    pub fn display_name(&self) -> &str {
        [
            SubjectInfo::CommonName,
            SubjectInfo::OrganizationalUnitName,
            SubjectInfo::Organization,
        ]
        .into_iter()
        .find_map(|info| self.values(info).next())
        .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateData {
    pub der: Vec<u8>,
    pub version: u32,
    pub serial: Vec<u8>,
    pub subject: NameInfo,
    pub issuer: NameInfo,
    pub not_before: i64,
    pub not_after: i64,
    pub self_signed: bool,
    pub public_key: SslKeyData,
    pub alternative_names: Vec<AltNameEntry>,
}

payload!(CertificateData, "SslCertificate");

pub type NativeSslCertificate = Shared<CertificateData>;

assert_abi_contract!(SharedHandle, NativeSslCertificate, { d: usize });

fn ip_text(bytes: &[u8]) -> Option<String> {
    let ip = match bytes.len() {
        4 => IpAddr::from(<[u8; 4]>::try_from(bytes).ok()?),
        16 => IpAddr::from(<[u8; 16]>::try_from(bytes).ok()?),
        _ => return None,
    };
    Some(ip.to_string())
}

impl CertificateData {
    /// Parses one DER certificate, returning the bytes that follow it.
    fn parse_der(der: &[u8]) -> ParseResult<(Self, &[u8])> {
        let (rest, cert) =
            parse_x509_certificate(der).map_err(|err| SslParseError::Der(err.to_string()))?;
        let consumed = &der[..der.len() - rest.len()];

        let mut alternative_names = Vec::new();
        match cert.subject_alternative_name() {
            Ok(Some(extension)) => {
                for name in &extension.value.general_names {
                    let entry = match name {
                        GeneralName::RFC822Name(email) => {
                            Some((AlternativeNameEntryType::EmailEntry, email.to_string()))
                        }
                        GeneralName::DNSName(dns) => {
                            Some((AlternativeNameEntryType::DnsEntry, dns.to_string()))
                        }
                        GeneralName::IPAddress(bytes) => {
                            ip_text(bytes).map(|ip| (AlternativeNameEntryType::IpAddressEntry, ip))
                        }
                        _ => None,
                    };
                    if let Some((kind, value)) = entry {
                        alternative_names.push(AltNameEntry {
                            kind,
                            value: value.into_bytes(),
                        });
                    }
                }
            }
            Ok(None) => {}
            Err(err) => warn!(error = %err, "Ignoring malformed subjectAltName"),
        }

        let data = Self {
            der: consumed.to_vec(),
            version: cert.version().0 + 1,
            serial: cert.raw_serial().to_vec(),
            subject: NameInfo::read(cert.subject()),
            issuer: NameInfo::read(cert.issuer()),
            not_before: cert.validity().not_before.timestamp(),
            not_after: cert.validity().not_after.timestamp(),
            self_signed: cert.subject().as_raw() == cert.issuer().as_raw(),
            public_key: SslKeyData::from_public_key_info(cert.public_key()).unwrap_or_else(|err| {
                debug!(error = %err, "Certificate public key not recognised");
                SslKeyData::default()
            }),
            alternative_names,
        };
        Ok((data, rest))
    }

    /// Every certificate in `encoded`; blocks that fail to parse are skipped.
    pub fn parse_all(encoded: &[u8], format: EncodingFormat) -> Vec<Self> {
        let mut certificates = Vec::new();
        match format {
            EncodingFormat::Pem => {
                for block in Pem::iter_from_buffer(encoded) {
                    let block = match block {
                        Ok(block) => block,
                        Err(err) => {
                            warn!(error = %err, "Stopping at malformed PEM block");
                            break;
                        }
                    };
                    if block.label != PEM_LABEL {
                        debug!(label = %block.label, "Skipping non-certificate PEM block");
                        continue;
                    }
                    match Self::parse_der(&block.contents) {
                        Ok((cert, _)) => certificates.push(cert),
                        Err(err) => warn!(error = %err, "Skipping invalid certificate"),
                    }
                }
            }
            EncodingFormat::Der => {
                let mut remaining = encoded;
                while !remaining.is_empty() {
                    match Self::parse_der(remaining) {
                        Ok((cert, rest)) => {
                            certificates.push(cert);
                            remaining = rest;
                        }
                        Err(err) => {
                            warn!(error = %err, "Stopping at invalid certificate");
                            break;
                        }
                    }
                }
            }
        }
        certificates
    }

    pub fn is_null(&self) -> bool {
        self.der.is_empty()
    }

    pub fn serial_number(&self) -> String {
        hex_colon(&self.serial)
    }

    pub fn to_pem(&self) -> String {
        if self.is_null() {
            return String::new();
        }
        encode_pem(PEM_LABEL, &self.der)
    }

    /// Human-readable summary.
    pub fn to_text(&self) -> String {
        if self.is_null() {
            return String::new();
        }
        let key = &self.public_key;
        let alternative_names = self
            .alternative_names
            .iter()
            .map(|entry| {
                let prefix = match entry.kind {
                    AlternativeNameEntryType::EmailEntry => "email",
                    AlternativeNameEntryType::DnsEntry => "DNS",
                    AlternativeNameEntryType::IpAddressEntry => "IP Address",
                };
                format!("{prefix}:{}", String::from_utf8_lossy(&entry.value))
            })
            .collect::<Vec<_>>()
            .join(", ");

        let mut text = String::from("Certificate:\n");
        text.push_str(&format!("    Version: {}\n", self.version));
        text.push_str(&format!("    Serial Number: {}\n", self.serial_number()));
        text.push_str(&format!("    Issuer: {}\n", self.issuer.text));
        text.push_str(&format!("    Not Before: {}\n", self.not_before));
        text.push_str(&format!("    Not After: {}\n", self.not_after));
        text.push_str(&format!("    Subject: {}\n", self.subject.text));
        text.push_str(&format!(
            "    Public Key: {:?} ({} bit)\n",
            key.algorithm, key.length
        ));
        if !alternative_names.is_empty() {
            text.push_str(&format!("    Subject Alternative Name: {alternative_names}\n"));
        }
        text
    }
}

unsafe fn push_certificates(certificates: Vec<CertificateData>, push: PushFn, ctx: *mut c_void) -> usize {
    let count = certificates.len();
    for data in certificates {
        let cert = NativeSslCertificate::new(data);
        push(ctx, (&cert as *const NativeSslCertificate).cast());
    }
    count
}

export_shared_handle!(NativeSslCertificate {
    default: netbridge_certificate_init_default,
    clone: netbridge_certificate_clone,
    drop: netbridge_certificate_drop,
    eq: netbridge_certificate_eq,
    ref_count: netbridge_certificate_ref_count,
    live: netbridge_certificate_live_payloads,
});

#[no_mangle]
pub unsafe extern "C" fn netbridge_certificate_from_data(
    encoded: ByteView,
    format: EncodingFormat,
    push: PushFn,
    ctx: *mut c_void,
) -> usize {
    push_certificates(CertificateData::parse_all(encoded.as_slice(), format), push, ctx)
}

/// Loads every certificate in one file; an unreadable file yields none.
#[no_mangle]
pub unsafe extern "C" fn netbridge_certificate_from_path(
    path: ByteView,
    format: EncodingFormat,
    push: PushFn,
    ctx: *mut c_void,
) -> usize {
    let path = String::from_utf8_lossy(path.as_slice()).into_owned();
    match fs::read(&path) {
        Ok(encoded) => push_certificates(CertificateData::parse_all(&encoded, format), push, ctx),
        Err(err) => {
            warn!(%path, error = %err, "Cannot read certificate file");
            0
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_certificate_is_null(cert: *const NativeSslCertificate) -> bool {
    let cert = &*cert;
    cert.is_null()
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_certificate_clear(cert: *mut NativeSslCertificate) {
    let cert = &mut *cert;
    *cert.make_mut() = CertificateData::default();
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_certificate_to_der(
    cert: *const NativeSslCertificate,
    out: *mut NativeByteArray,
) {
    let cert = &*cert;
    write_bytes(out, cert.der.as_slice());
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_certificate_to_pem(
    cert: *const NativeSslCertificate,
    out: *mut NativeByteArray,
) {
    let cert = &*cert;
    write_bytes(out, cert.to_pem());
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_certificate_to_text(
    cert: *const NativeSslCertificate,
    out: *mut NativeByteArray,
) {
    let cert = &*cert;
    write_bytes(out, cert.to_text());
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_certificate_digest(
    cert: *const NativeSslCertificate,
    algorithm: CryptographicHashAlgorithm,
    out: *mut NativeByteArray,
) {
    let cert = &*cert;
    write_bytes(out, NativeCryptographicHash::digest(algorithm, &cert.der));
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_certificate_serial_number(
    cert: *const NativeSslCertificate,
    out: *mut NativeByteArray,
) {
    let cert = &*cert;
    write_bytes(out, cert.serial_number());
}

/// `"1"`, `"2"` or `"3"`; empty for the null certificate.
#[no_mangle]
pub unsafe extern "C" fn netbridge_certificate_version(
    cert: *const NativeSslCertificate,
    out: *mut NativeByteArray,
) {
    let cert = &*cert;
    let version = if cert.is_null() {
        String::new()
    } else {
        cert.version.to_string()
    };
    write_bytes(out, version);
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_certificate_subject_info(
    cert: *const NativeSslCertificate,
    info: SubjectInfo,
    push: PushFn,
    ctx: *mut c_void,
) -> usize {
    let cert = &*cert;
    push_all(cert.subject.values(info), push, ctx)
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_certificate_issuer_info(
    cert: *const NativeSslCertificate,
    info: SubjectInfo,
    push: PushFn,
    ctx: *mut c_void,
) -> usize {
    let cert = &*cert;
    push_all(cert.issuer.values(info), push, ctx)
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_certificate_subject_display_name(
    cert: *const NativeSslCertificate,
    out: *mut NativeByteArray,
) {
    let cert = &*cert;
    write_bytes(out, cert.subject.display_name());
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_certificate_issuer_display_name(
    cert: *const NativeSslCertificate,
    out: *mut NativeByteArray,
) {
    let cert = &*cert;
    write_bytes(out, cert.issuer.display_name());
}

/// Unix seconds.
#[no_mangle]
pub unsafe extern "C" fn netbridge_certificate_effective_date(cert: *const NativeSslCertificate) -> i64 {
    let cert = &*cert;
    cert.not_before
}

/// Unix seconds.
#[no_mangle]
pub unsafe extern "C" fn netbridge_certificate_expiry_date(cert: *const NativeSslCertificate) -> i64 {
    let cert = &*cert;
    cert.not_after
}

/// Compares subject and issuer names; the signature is not checked.
#[no_mangle]
pub unsafe extern "C" fn netbridge_certificate_is_self_signed(cert: *const NativeSslCertificate) -> bool {
    let cert = &*cert;
    cert.self_signed
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_certificate_public_key(
    cert: *const NativeSslCertificate,
    out: *mut NativeSslKey,
) {
    let cert = &*cert;
    out.write(Shared::new(cert.public_key.clone()));
}

#[no_mangle]
pub unsafe extern "C" fn netbridge_certificate_subject_alternative_names(
    cert: *const NativeSslCertificate,
    out: *mut NativeAlternativeNames,
) {
    let cert = &*cert;
    out.write(Shared::new(AlternativeNamesData::new(
        cert.alternative_names.clone(),
    )));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_yields_no_certificates() {
        assert!(CertificateData::parse_all(b"not a certificate", EncodingFormat::Der).is_empty());
        assert!(CertificateData::parse_all(b"", EncodingFormat::Pem).is_empty());
    }

    #[test]
    fn test_null_certificate() {
        let cert = CertificateData::default();
        assert!(cert.is_null());
        assert_eq!(cert.to_pem(), "");
        assert_eq!(cert.subject.display_name(), "");
    }

    #[test]
    fn test_ip_text() {
        assert_eq!(ip_text(&[127, 0, 0, 1]).as_deref(), Some("127.0.0.1"));
        assert_eq!(ip_text(&[0; 3]), None);
    }
}
