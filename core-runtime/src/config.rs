//! # Runtime Configuration
//!
//! A [`RuntimeConfig`] is assembled with [`RuntimeConfig::builder`] and
//! validated once, in [`RuntimeConfigBuilder::build`]. Invalid settings are
//! rejected there rather than surfacing later as toolkit errors.
//!
//! The plain-data part of the config is [`RuntimeSettings`], which can be
//! read from JSON:
//!
//! ```
//! use core_runtime::config::RuntimeConfig;
//!
//! let config = RuntimeConfig::builder()
//!     .settings_json(r#"{ "report_contracts": true, "event_loop_timeout_ms": 250 }"#)
//!     .unwrap()
//!     .build()
//!     .unwrap();
//! assert!(config.report_contracts);
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::RuntimeConfig;
//! use std::time::Duration;
//!
//! RuntimeConfig::builder()
//!     .event_loop_timeout(Duration::ZERO)
//!     .build()
//!     .expect("Should fail - zero timeout");
//! ```

use crate::error::{Error, Result};
use crate::logging::{LogFormat, LoggingConfig};
use bridge_traits::time::LogLevel;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub logging: LoggingConfig,

    /// Log every bridged type's ABI contract at startup
    pub report_contracts: bool,

    /// Default wait for event-loop processing. `None` waits forever.
    pub event_loop_timeout: Option<Duration>,

    /// PEM bundle of trusted certificates loaded at startup
    pub trusted_certificates: Option<PathBuf>,
}

/// Serializable subset of [`RuntimeConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    pub log_format: Option<LogFormat>,
    pub log_level: Option<LogLevel>,
    pub log_filter: Option<String>,
    pub report_contracts: bool,
    pub event_loop_timeout_ms: Option<u64>,
    pub trusted_certificates: Option<PathBuf>,
}

impl RuntimeSettings {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl RuntimeConfig {
    pub fn builder() -> RuntimeConfigBuilder {
        RuntimeConfigBuilder::default()
    }

    /// Checks the invariants [`RuntimeConfigBuilder::build`] enforces.
    pub fn validate(&self) -> Result<()> {
        if self.event_loop_timeout == Some(Duration::ZERO) {
            return Err(Error::Config(
                "Event loop timeout must be greater than 0ms. Leave it unset to wait forever.".to_string(),
            ));
        }

        if let Some(path) = &self.trusted_certificates {
            if path.as_os_str().is_empty() {
                return Err(Error::Config("Trusted certificate path cannot be empty".to_string()));
            }
            if !path.is_file() {
                return Err(Error::CapabilityMissing {
                    capability: "TrustedCertificates".to_string(),
                    message: format!("Certificate bundle {} does not exist or is not a file", path.display()),
                });
            }
        }

        Ok(())
    }

    /// The plain-data view of this config.
    pub fn settings(&self) -> RuntimeSettings {
        RuntimeSettings {
            log_format: Some(self.logging.format),
            log_level: Some(self.logging.level),
            log_filter: self.logging.filter.clone(),
            report_contracts: self.report_contracts,
            event_loop_timeout_ms: self.event_loop_timeout.map(|t| t.as_millis() as u64),
            trusted_certificates: self.trusted_certificates.clone(),
        }
    }
}

/// Builder for [`RuntimeConfig`].
#[derive(Debug, Default)]
pub struct RuntimeConfigBuilder {
    logging: Option<LoggingConfig>,
    report_contracts: bool,
    event_loop_timeout: Option<Duration>,
    trusted_certificates: Option<PathBuf>,
}

impl RuntimeConfigBuilder {
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    pub fn report_contracts(mut self, enabled: bool) -> Self {
        self.report_contracts = enabled;
        self
    }

    pub fn event_loop_timeout(mut self, timeout: Duration) -> Self {
        self.event_loop_timeout = Some(timeout);
        self
    }

    pub fn trusted_certificates<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.trusted_certificates = Some(path.into());
        self
    }

    /// Overlays `settings` on the builder. Logging fields that are unset
    /// keep their current values.
    pub fn settings(mut self, settings: RuntimeSettings) -> Self {
        let mut logging = self.logging.take().unwrap_or_default();
        if let Some(format) = settings.log_format {
            logging.format = format;
        }
        if let Some(level) = settings.log_level {
            logging.level = level;
        }
        if let Some(filter) = settings.log_filter {
            logging.filter = Some(filter);
        }
        self.logging = Some(logging);

        self.report_contracts = settings.report_contracts;
        if let Some(ms) = settings.event_loop_timeout_ms {
            self.event_loop_timeout = Some(Duration::from_millis(ms));
        }
        if let Some(path) = settings.trusted_certificates {
            self.trusted_certificates = Some(path);
        }
        self
    }

    pub fn settings_json(self, json: &str) -> Result<Self> {
        Ok(self.settings(RuntimeSettings::from_json(json)?))
    }

    /// Builds and validates the config.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] for a zero event-loop timeout or an empty path
    /// - [`Error::CapabilityMissing`] when the certificate bundle is missing
    pub fn build(self) -> Result<RuntimeConfig> {
        let config = RuntimeConfig {
            logging: self.logging.unwrap_or_default(),
            report_contracts: self.report_contracts,
            event_loop_timeout: self.event_loop_timeout,
            trusted_certificates: self.trusted_certificates,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builder_defaults() {
        let config = RuntimeConfig::builder().build().unwrap();
        assert!(!config.report_contracts);
        assert_eq!(config.event_loop_timeout, None);
        assert_eq!(config.trusted_certificates, None);
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let result = RuntimeConfig::builder().event_loop_timeout(Duration::ZERO).build();
        match result {
            Err(Error::Config(msg)) => assert!(msg.contains("greater than 0ms")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_missing_bundle() {
        let result = RuntimeConfig::builder()
            .trusted_certificates("/nonexistent/bundle.pem")
            .build();
        assert!(matches!(result, Err(Error::CapabilityMissing { .. })));

        let result = RuntimeConfig::builder().trusted_certificates("").build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_existing_bundle_accepted() {
        let mut bundle = tempfile::NamedTempFile::new().unwrap();
        writeln!(bundle, "not really pem").unwrap();

        let config = RuntimeConfig::builder()
            .trusted_certificates(bundle.path())
            .event_loop_timeout(Duration::from_millis(50))
            .build()
            .unwrap();
        assert_eq!(config.trusted_certificates.as_deref(), Some(bundle.path()));
        assert_eq!(config.event_loop_timeout, Some(Duration::from_millis(50)));
    }

    #[test]
    fn test_settings_overlay() {
        let config = RuntimeConfig::builder()
            .logging(LoggingConfig::default().with_filter("core_io=trace"))
            .settings_json(r#"{ "log_level": "Debug", "log_format": "compact", "event_loop_timeout_ms": 10 }"#)
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, LogFormat::Compact);
        assert_eq!(config.logging.filter.as_deref(), Some("core_io=trace"));
        assert_eq!(config.event_loop_timeout, Some(Duration::from_millis(10)));
    }

    #[test]
    fn test_settings_round_trip() {
        let config = RuntimeConfig::builder()
            .report_contracts(true)
            .event_loop_timeout(Duration::from_secs(2))
            .build()
            .unwrap();
        let settings = config.settings();
        assert_eq!(settings.event_loop_timeout_ms, Some(2000));

        let json = serde_json::to_string(&settings).unwrap();
        assert_eq!(RuntimeSettings::from_json(&json).unwrap(), settings);
    }

    #[test]
    fn test_bad_json_is_config_error() {
        let result = RuntimeSettings::from_json("{ \"report_contracts\": 3 }");
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
