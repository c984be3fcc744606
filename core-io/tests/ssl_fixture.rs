use std::path::PathBuf;

use bridge_traits::ffi::{
    AlternativeNameEntryType, CryptographicHashAlgorithm, EncodingFormat, KeyAlgorithm, KeyType, SubjectInfo,
};
use bridge_traits::time::FixedClock;
use bridge_traits::SystemClock;
use core_io::ssl::{SslCertificate, SslKey};
use core_io::CryptographicHash;

const CERT_PEM: &[u8] = include_bytes!("data/cert.pem");
const KEY_PEM: &[u8] = include_bytes!("data/key.pem");

fn fixture() -> SslCertificate {
    let mut certs = SslCertificate::from_data(CERT_PEM, EncodingFormat::Pem);
    assert_eq!(certs.len(), 1);
    certs.remove(0)
}

#[test]
fn test_der_round_trip_gives_equal_certificate() {
    let cert = fixture();
    let der = cert.to_der();
    let reloaded = SslCertificate::from_data(der.as_slice(), EncodingFormat::Der);
    assert_eq!(reloaded.len(), 1);
    assert_eq!(reloaded[0], cert);
    assert_eq!(reloaded[0].to_pem(), cert.to_pem());
}

#[test]
fn test_fixture_fields() {
    let cert = fixture();
    assert_eq!(cert.version().as_slice(), b"3");
    assert_eq!(cert.serial_number().as_slice(), b"12:34");
    assert_eq!(cert.subject_info(SubjectInfo::CommonName), vec!["localhost".to_string()]);
    assert_eq!(cert.subject_info(SubjectInfo::Organization), vec!["Netbridge Test".to_string()]);
    assert_eq!(cert.issuer_display_name(), "localhost");
    assert!(cert.is_self_signed());
    assert!(cert.effective_date() < cert.expiry_date());
    assert!(cert.is_valid_at(&SystemClock));
    assert!(!cert.is_valid_at(&FixedClock::from_unix_timestamp(0).unwrap()));

    let digest = cert.digest(CryptographicHashAlgorithm::Sha256);
    assert_eq!(
        digest,
        CryptographicHash::hash(cert.to_der().as_slice(), CryptographicHashAlgorithm::Sha256)
    );
    assert!(cert.to_text().contains("Serial Number: 12:34"));
}

#[test]
fn test_alternative_names_grouped_by_type() {
    let names = fixture().subject_alternative_names();
    assert_eq!(names.len(), 4);
    assert!(names.contains(AlternativeNameEntryType::DnsEntry));

    let keys: Vec<_> = names.keys().collect();
    assert_eq!(
        keys,
        vec![
            AlternativeNameEntryType::EmailEntry,
            AlternativeNameEntryType::DnsEntry,
            AlternativeNameEntryType::IpAddressEntry,
        ]
    );

    let dns: Vec<&[u8]> = names
        .values_for(AlternativeNameEntryType::DnsEntry)
        .map(|view| view.as_slice())
        .collect();
    assert_eq!(dns, vec![&b"localhost"[..], b"netbridge.test"]);

    let ips = names.values(AlternativeNameEntryType::IpAddressEntry);
    assert_eq!(ips[0].as_slice(), b"127.0.0.1");
}

#[test]
fn test_cursor_stays_at_end() {
    let names = fixture().subject_alternative_names();
    let mut iter = names.iter();
    assert_eq!(iter.by_ref().count(), 4);
    assert!(iter.next().is_none());
    assert!(iter.next().is_none());

    let mut emails = names.values_for(AlternativeNameEntryType::EmailEntry);
    assert_eq!(emails.next().map(|v| v.as_slice()), Some(&b"admin@netbridge.test"[..]));
    assert!(emails.next().is_none());
    assert!(emails.next().is_none());
}

#[test]
fn test_keys_load_with_matching_lengths() {
    let private = SslKey::parse(KEY_PEM, KeyAlgorithm::Rsa, EncodingFormat::Pem, KeyType::PrivateKey).unwrap();
    assert_eq!(private.length(), 2048);

    let public = fixture().public_key();
    assert_eq!(public.algorithm(), KeyAlgorithm::Rsa);
    assert_eq!(public.key_type(), KeyType::PublicKey);
    assert_eq!(public.length(), 2048);

    let reloaded = SslKey::from_data(
        public.to_der().as_slice(),
        KeyAlgorithm::Rsa,
        EncodingFormat::Der,
        KeyType::PublicKey,
    );
    assert_eq!(reloaded, public);

    // Wrong algorithm for the material.
    assert!(SslKey::from_data(KEY_PEM, KeyAlgorithm::Ec, EncodingFormat::Pem, KeyType::PrivateKey).is_null());
}

#[test]
fn test_from_path_reads_fixture() {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/data/cert.pem");
    let certs = SslCertificate::from_path(&path, EncodingFormat::Pem);
    assert_eq!(certs, vec![fixture()]);
}
