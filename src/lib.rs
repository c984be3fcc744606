//! # netbridge
//!
//! Safe Rust bindings over a native networking and I/O toolkit.
//!
//! ## Overview
//!
//! The workspace is split the way a C++ binding layer is: a shared contract
//! ([`bridge_traits`]), the toolkit itself (`bridge-native`), and the host
//! wrappers ([`core_io`]). This crate re-exports the host side and adds
//! [`init`], which wires up logging and loads runtime resources from a
//! [`RuntimeConfig`].
//!
//! ```no_run
//! use netbridge::{init, EventLoop, RuntimeConfig};
//!
//! let bindings = init(RuntimeConfig::builder().report_contracts(true).build()?)?;
//! let event_loop = EventLoop::new()?;
//! event_loop.post(|| tracing::info!("inside the loop"));
//! let code = bindings.run(&event_loop);
//! # Ok::<(), netbridge::Error>(())
//! ```
//!
//! ## Features
//!
//! `fs`, `net` and `ssl` forward to the matching `core-io` features and are
//! all enabled by default.

use std::sync::Arc;

use bridge_traits::ContractInfo;
use core_runtime::logging::init_logging;
use thiserror::Error;
use tracing::info;

pub use bridge_traits;
pub use core_io;
pub use core_runtime;

pub use bridge_traits::error::BridgeError;
pub use core_io::{ByteArray, ByteArrayView, CryptographicHash, DeadlineTimer, EventLoop};
pub use core_runtime::{LogFormat, LoggingConfig, RuntimeConfig, RuntimeSettings};

#[cfg(feature = "fs")]
pub use core_io::{Buffer, File, IoDevice, TemporaryFile};
#[cfg(feature = "net")]
pub use core_io::net;
#[cfg(feature = "ssl")]
pub use core_io::ssl;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Runtime(#[from] core_runtime::Error),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("No certificates found in {0}")]
    EmptyCertificateBundle(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Runtime state produced by [`init`]. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Bindings {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: RuntimeConfig,
    contracts: Vec<ContractInfo>,
    #[cfg(feature = "ssl")]
    trusted: Vec<ssl::SslCertificate>,
}

/// Installs the global subscriber described by `config.logging`, then
/// builds [`Bindings`] from the rest of the config.
///
/// # Errors
///
/// Fails if logging is already initialized, or for the reasons listed on
/// [`Bindings::new`].
pub fn init(config: RuntimeConfig) -> Result<Bindings> {
    init_logging(config.logging.clone())?;
    Bindings::new(config)
}

impl Bindings {
    /// Like [`init`] but leaves the global subscriber alone.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyCertificateBundle`] when `trusted_certificates` names a
    /// file without a single PEM certificate.
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        config.validate()?;

        let contracts = core_io::contracts();
        if config.report_contracts {
            for contract in &contracts {
                info!(target: "netbridge::contracts", "{}", contract);
            }
        }

        #[cfg(feature = "ssl")]
        let trusted = load_trusted(&config)?;

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                contracts,
                #[cfg(feature = "ssl")]
                trusted,
            }),
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// ABI contracts of every bridged value type in this build.
    pub fn contracts(&self) -> &[ContractInfo] {
        &self.inner.contracts
    }

    #[cfg(feature = "ssl")]
    pub fn trusted_certificates(&self) -> &[ssl::SslCertificate] {
        &self.inner.trusted
    }

    /// True when an identical certificate is in the trusted bundle. Chains
    /// are not built and signatures are not checked.
    #[cfg(feature = "ssl")]
    pub fn is_trusted(&self, cert: &ssl::SslCertificate) -> bool {
        !cert.is_null() && self.inner.trusted.iter().any(|trusted| trusted == cert)
    }

    /// Runs `event_loop` until it exits, or until the configured
    /// event-loop timeout passes.
    pub fn run(&self, event_loop: &EventLoop) -> i32 {
        match self.inner.config.event_loop_timeout {
            Some(timeout) => event_loop.exec_timeout(timeout),
            None => event_loop.exec(),
        }
    }
}

#[cfg(feature = "ssl")]
fn load_trusted(config: &RuntimeConfig) -> Result<Vec<ssl::SslCertificate>> {
    use bridge_traits::ffi::EncodingFormat;
    use core_runtime::logging::strip_path;

    let Some(path) = &config.trusted_certificates else {
        return Ok(Vec::new());
    };

    let shown = path.display().to_string();
    let certs = ssl::SslCertificate::from_path(path, EncodingFormat::Pem);
    if certs.is_empty() {
        return Err(Error::EmptyCertificateBundle(shown));
    }

    tracing::debug!(file = %strip_path(&shown), count = certs.len(), "Loaded trusted certificates");
    Ok(certs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bindings_without_resources() {
        let bindings = Bindings::new(RuntimeConfig::builder().build().unwrap()).unwrap();
        assert_eq!(bindings.contracts().len(), core_io::contracts().len());
        assert!(bindings.config().event_loop_timeout.is_none());
        #[cfg(feature = "ssl")]
        assert!(bindings.trusted_certificates().is_empty());
    }

    #[test]
    fn test_run_honours_timeout() {
        let config = RuntimeConfig::builder()
            .event_loop_timeout(std::time::Duration::from_millis(20))
            .build()
            .unwrap();
        let bindings = Bindings::new(config).unwrap();
        let event_loop = EventLoop::new().unwrap();
        assert_eq!(bindings.run(&event_loop), core_io::eventloop::EXEC_FAILED);
    }

    #[cfg(feature = "ssl")]
    mod trusted {
        use std::io::Write;
        use std::path::PathBuf;

        use bridge_traits::ffi::EncodingFormat;

        use super::*;

        fn fixture(name: &str) -> PathBuf {
            PathBuf::from(env!("CARGO_MANIFEST_DIR"))
                .join("core-io/tests/data")
                .join(name)
        }

        #[test]
        fn test_trusted_bundle_is_loaded() -> anyhow::Result<()> {
            let config = RuntimeConfig::builder()
                .trusted_certificates(fixture("cert.pem"))
                .report_contracts(true)
                .build()?;
            let bindings = Bindings::new(config)?;
            assert_eq!(bindings.trusted_certificates().len(), 1);

            let pem = std::fs::read(fixture("cert.pem"))?;
            let cert = ssl::SslCertificate::from_data(&pem, EncodingFormat::Pem).remove(0);
            assert!(bindings.is_trusted(&cert));
            assert!(!bindings.is_trusted(&ssl::SslCertificate::default()));
            Ok(())
        }

        #[test]
        fn test_bundle_without_certificates_is_rejected() -> anyhow::Result<()> {
            let mut bundle = tempfile::NamedTempFile::new()?;
            writeln!(bundle, "-----BEGIN NOTHING-----")?;

            let config = RuntimeConfig::builder().trusted_certificates(bundle.path()).build()?;
            let err = Bindings::new(config).unwrap_err();
            assert!(matches!(err, Error::EmptyCertificateBundle(_)));
            Ok(())
        }

        #[test]
        fn test_key_file_is_not_a_certificate_bundle() -> anyhow::Result<()> {
            let config = RuntimeConfig::builder().trusted_certificates(fixture("key.pem")).build()?;
            assert!(Bindings::new(config).is_err());
            Ok(())
        }
    }
}
