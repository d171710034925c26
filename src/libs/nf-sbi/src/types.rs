//! SBI Types
//!
//! NF, service and scheme enumerations used on the Nnrf_NFManagement
//! interface, with their OpenAPI wire names.

use serde::{Deserialize, Serialize};
use std::fmt;

/// NF Type enumeration - matches OpenAPI_nf_type_e
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NfType {
    Nrf,
    Udm,
    Amf,
    Smf,
    Ausf,
    Nef,
    Pcf,
    Nssf,
    Udr,
    Upf,
    Nwdaf,
    Scp,
}

impl NfType {
    pub fn to_str(&self) -> &'static str {
        match self {
            Self::Nrf => "NRF",
            Self::Udm => "UDM",
            Self::Amf => "AMF",
            Self::Smf => "SMF",
            Self::Ausf => "AUSF",
            Self::Nef => "NEF",
            Self::Pcf => "PCF",
            Self::Nssf => "NSSF",
            Self::Udr => "UDR",
            Self::Upf => "UPF",
            Self::Nwdaf => "NWDAF",
            Self::Scp => "SCP",
        }
    }
}

impl fmt::Display for NfType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

/// NF Status - matches OpenAPI_nf_status_e
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NfStatus {
    #[default]
    Registered,
    Suspended,
    Undiscoverable,
}

/// SBI service names advertised or consumed by this layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceName {
    #[serde(rename = "nnrf-nfm")]
    NnrfNfm,
    #[serde(rename = "nupf-oam")]
    NupfOam,
}

impl ServiceName {
    /// Convert service name to its URI prefix form
    pub fn to_name(&self) -> &'static str {
        match self {
            Self::NnrfNfm => "nnrf-nfm",
            Self::NupfOam => "nupf-oam",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "nnrf-nfm" => Some(Self::NnrfNfm),
            "nupf-oam" => Some(Self::NupfOam),
            _ => None,
        }
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_name())
    }
}

/// PDU session type - matches OpenAPI_pdu_session_type_e
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PduSessionType {
    Ipv4,
    Ipv6,
    Ipv4v6,
    Unstructured,
    Ethernet,
}

/// URI Scheme - matches OpenAPI_uri_scheme_e
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UriScheme {
    #[default]
    Http,
    Https,
}

impl UriScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "http" => Some(Self::Http),
            "https" => Some(Self::Https),
            _ => None,
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Self::Http => 80,
            Self::Https => 443,
        }
    }
}

impl fmt::Display for UriScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_name_conversion() {
        assert_eq!(ServiceName::NupfOam.to_name(), "nupf-oam");
        assert_eq!(ServiceName::from_name("nnrf-nfm"), Some(ServiceName::NnrfNfm));
        assert_eq!(ServiceName::from_name("invalid"), None);
    }

    #[test]
    fn test_uri_scheme() {
        assert_eq!(UriScheme::Http.as_str(), "http");
        assert_eq!(UriScheme::from_str("https"), Some(UriScheme::Https));
        assert_eq!(UriScheme::from_str("ftp"), None);
        assert_eq!(UriScheme::Https.default_port(), 443);
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(serde_json::to_string(&NfType::Upf).unwrap(), "\"UPF\"");
        assert_eq!(
            serde_json::to_string(&NfStatus::Registered).unwrap(),
            "\"REGISTERED\""
        );
        assert_eq!(
            serde_json::to_string(&PduSessionType::Ipv4).unwrap(),
            "\"IPV4\""
        );
        assert_eq!(
            serde_json::to_string(&ServiceName::NupfOam).unwrap(),
            "\"nupf-oam\""
        );
        let scheme: UriScheme = serde_json::from_str("\"https\"").unwrap();
        assert_eq!(scheme, UriScheme::Https);
    }
}
