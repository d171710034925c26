//! UPF SBI Configuration
//!
//! Factory configuration loaded from YAML. The file is read once at startup
//! and shared read-only afterwards.

use std::net::IpAddr;
use std::path::Path;

use anyhow::{bail, Context, Result};
use nf_sbi::{SbiClientConfig, UriScheme};
use serde::{Deserialize, Serialize};

/// Default configuration file path
pub const UPF_DEFAULT_CONFIG_PATH: &str = "./config/upfcfg.yaml";
/// Configuration format version this daemon understands
pub const UPF_EXPECTED_CONFIG_VERSION: &str = "1.0.4";
/// Default SBI bind address
pub const UPF_DEFAULT_IPV4: &str = "127.0.0.8";
/// Default SBI port
pub const UPF_DEFAULT_SBI_PORT: u16 = 8000;

fn default_binding_ip() -> String {
    UPF_DEFAULT_IPV4.to_string()
}

fn default_port() -> u16 {
    UPF_DEFAULT_SBI_PORT
}

fn default_true() -> bool {
    true
}

fn default_level() -> String {
    "info".to_string()
}

/// Top level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub version: String,
    #[serde(default)]
    pub description: String,
    pub sbi: Sbi,
    #[serde(default)]
    pub logger: Logger,
}

/// SBI listener and registry settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sbi {
    #[serde(default)]
    pub scheme: UriScheme,
    #[serde(default = "default_binding_ip")]
    pub binding_ip: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Registry base URI; registration is disabled when absent or empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nrf_uri: Option<String>,
    /// PEM CA bundle trusted for an https registry; webpki roots otherwise
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nrf_ca_pem: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert: Option<Cert>,
}

/// PEM certificate and key paths for https
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cert {
    pub pem: String,
    pub key: String,
}

/// Logger settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Logger {
    #[serde(default = "default_true")]
    pub enable: bool,
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub report_caller: bool,
}

impl Default for Logger {
    fn default() -> Self {
        Self {
            enable: true,
            level: default_level(),
            report_caller: false,
        }
    }
}

impl Logger {
    /// Effective level filter; `Off` when logging is disabled.
    pub fn level_filter(&self) -> log::LevelFilter {
        if !self.enable {
            return log::LevelFilter::Off;
        }
        parse_level(&self.level).unwrap_or(log::LevelFilter::Info)
    }
}

/// Map a level name to a filter. `fatal` and `panic` collapse to `Error`.
pub fn parse_level(level: &str) -> Option<log::LevelFilter> {
    match level.to_lowercase().as_str() {
        "trace" => Some(log::LevelFilter::Trace),
        "debug" => Some(log::LevelFilter::Debug),
        "info" => Some(log::LevelFilter::Info),
        "warn" | "warning" => Some(log::LevelFilter::Warn),
        "error" | "fatal" | "panic" => Some(log::LevelFilter::Error),
        _ => None,
    }
}

impl Sbi {
    /// Registry URI when registration is enabled
    pub fn registration_uri(&self) -> Option<&str> {
        self.nrf_uri.as_deref().filter(|uri| !uri.is_empty())
    }
}

impl Config {
    /// Read, parse and validate a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config =
            serde_yaml::from_str(content).context("Failed to parse YAML config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.version != UPF_EXPECTED_CONFIG_VERSION {
            bail!(
                "Config version is [{}], but expected is [{}]",
                self.version,
                UPF_EXPECTED_CONFIG_VERSION
            );
        }

        let sbi = &self.sbi;
        if sbi.binding_ip.parse::<IpAddr>().is_err() {
            bail!("sbi.bindingIp [{}] is not an IP address", sbi.binding_ip);
        }
        if sbi.port == 0 {
            bail!("sbi.port must be non-zero");
        }
        if sbi.scheme == UriScheme::Https {
            match &sbi.cert {
                Some(cert) if !cert.pem.is_empty() && !cert.key.is_empty() => {}
                _ => bail!("sbi.cert.pem and sbi.cert.key are required for https"),
            }
        }
        if let Some(uri) = sbi.registration_uri() {
            SbiClientConfig::from_uri(uri)
                .with_context(|| format!("sbi.nrfUri [{uri}] is not a valid http(s) URI"))?;
        }

        if parse_level(&self.logger.level).is_none() {
            bail!("logger.level [{}] is not a known level", self.logger.level);
        }

        Ok(())
    }

    /// Dump the effective configuration at info level
    pub fn print(&self) {
        log::info!("==================================================");
        log::info!("UPF SBI configuration");
        log::info!("  version: {}", self.version);
        log::info!("  description: {}", self.description);
        log::info!("  sbi:");
        log::info!("    scheme: {}", self.sbi.scheme);
        log::info!("    bindingIp: {}", self.sbi.binding_ip);
        log::info!("    port: {}", self.sbi.port);
        match self.sbi.registration_uri() {
            Some(uri) => log::info!("    nrfUri: {uri}"),
            None => log::info!("    nrfUri: <none, registration disabled>"),
        }
        if let Some(ca) = &self.sbi.nrf_ca_pem {
            log::info!("    nrfCaPem: {ca}");
        }
        if let Some(cert) = &self.sbi.cert {
            log::info!("    cert.pem: {}", cert.pem);
            log::info!("    cert.key: {}", cert.key);
        }
        log::info!("  logger:");
        log::info!("    enable: {}", self.logger.enable);
        log::info!("    level: {}", self.logger.level);
        log::info!("    reportCaller: {}", self.logger.report_caller);
        log::info!("==================================================");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version: 1.0.4
description: UPF initial local configuration
sbi:
  scheme: http
  bindingIp: 127.0.0.8
  port: 8000
  nrfUri: http://127.0.0.10:8000
logger:
  enable: true
  level: debug
  reportCaller: true
"#;

    #[test]
    fn test_parse_sample() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.version, "1.0.4");
        assert_eq!(config.sbi.scheme, UriScheme::Http);
        assert_eq!(config.sbi.binding_ip, "127.0.0.8");
        assert_eq!(config.sbi.port, 8000);
        assert_eq!(config.sbi.registration_uri(), Some("http://127.0.0.10:8000"));
        assert!(config.logger.report_caller);
        assert_eq!(config.logger.level_filter(), log::LevelFilter::Debug);
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_yaml("version: 1.0.4\nsbi: {}\n").unwrap();
        assert_eq!(config.sbi.binding_ip, UPF_DEFAULT_IPV4);
        assert_eq!(config.sbi.port, UPF_DEFAULT_SBI_PORT);
        assert_eq!(config.sbi.registration_uri(), None);
        assert_eq!(config.logger, Logger::default());
    }

    #[test]
    fn test_empty_nrf_uri_disables_registration() {
        let config = Config::from_yaml("version: 1.0.4\nsbi:\n  nrfUri: \"\"\n").unwrap();
        assert_eq!(config.sbi.registration_uri(), None);
    }

    #[test]
    fn test_version_mismatch() {
        let err = Config::from_yaml("version: 1.0.3\nsbi: {}\n").unwrap_err();
        assert!(err.to_string().contains("expected is [1.0.4]"));
    }

    #[test]
    fn test_invalid_fields() {
        assert!(Config::from_yaml("version: 1.0.4\nsbi:\n  bindingIp: upf.local\n").is_err());
        assert!(Config::from_yaml("version: 1.0.4\nsbi:\n  port: 0\n").is_err());
        assert!(Config::from_yaml("version: 1.0.4\nsbi:\n  scheme: https\n").is_err());
        assert!(Config::from_yaml("version: 1.0.4\nsbi:\n  scheme: ftp\n").is_err());
        assert!(Config::from_yaml("version: 1.0.4\nsbi:\n  nrfUri: ftp://nrf\n").is_err());
        assert!(Config::from_yaml("version: 1.0.4\nsbi: {}\nlogger:\n  level: loud\n").is_err());
    }

    #[test]
    fn test_https_with_cert() {
        let yaml = "version: 1.0.4\nsbi:\n  scheme: https\n  cert:\n    pem: cert/upf.pem\n    key: cert/upf.key\n";
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.sbi.cert.unwrap().key, "cert/upf.key");
    }

    #[test]
    fn test_nrf_ca_bundle() {
        let yaml = "version: 1.0.4\nsbi:\n  nrfUri: https://nrf.local:443\n  nrfCaPem: cert/nrf-ca.pem\n";
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.sbi.nrf_ca_pem.as_deref(), Some("cert/nrf-ca.pem"));

        let config = Config::from_yaml("version: 1.0.4\nsbi: {}\n").unwrap();
        assert!(config.sbi.nrf_ca_pem.is_none());
    }

    #[test]
    fn test_level_mapping() {
        assert_eq!(parse_level("fatal"), Some(log::LevelFilter::Error));
        assert_eq!(parse_level("PANIC"), Some(log::LevelFilter::Error));
        assert_eq!(parse_level("bogus"), None);

        let logger = Logger {
            enable: false,
            ..Logger::default()
        };
        assert_eq!(logger.level_filter(), log::LevelFilter::Off);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load("/nonexistent/upfcfg.yaml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
