//! Nnrf_NFManagement
//!
//! NF profile models, the registry operations seam ([`NfManagementApi`]) and
//! its HTTP implementation against an NRF (TS 29.510 NFInstanceIDDocument).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::client::{SbiClient, SbiClientConfig};
use crate::error::{SbiError, SbiResult};
use crate::message::{ProblemDetails, SbiResponse};
use crate::types::{NfStatus, NfType, PduSessionType, ServiceName, UriScheme};

/// API root path segment of the NF management service
pub const NNRF_NFM_PATH_MARKER: &str = "/nnrf-nfm/";
/// NF instances collection under the v1 API
pub const NF_INSTANCES_PATH: &str = "/nnrf-nfm/v1/nf-instances";

/// IP endpoint of an NF service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct IpEndPoint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv4_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// NF service entry of a profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NfService {
    pub service_instance_id: String,
    pub service_name: ServiceName,
    pub scheme: UriScheme,
    pub nf_service_status: NfStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ip_end_points: Vec<IpEndPoint>,
}

/// UPF specific profile data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpfInfo {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pdu_session_types: Vec<PduSessionType>,
}

/// Registry-provided custom capability flags.
///
/// Only `oauth2` is understood; other keys are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NfCustomInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth2: Option<bool>,
}

/// NF Profile - the description sent to (and echoed by) the NRF
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NfProfile {
    pub nf_instance_id: String,
    pub nf_type: NfType,
    pub nf_status: NfStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ipv4_addresses: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nf_services: Vec<NfService>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upf_info: Option<UpfInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_info: Option<NfCustomInfo>,
}

impl NfProfile {
    /// OAuth2 requirement flag announced by the registry, if any
    pub fn oauth2_required(&self) -> Option<bool> {
        self.custom_info.as_ref().and_then(|info| info.oauth2)
    }
}

/// Result of a successful RegisterNFInstance call
#[derive(Debug, Clone, Default)]
pub struct RegisterNfInstanceResponse {
    /// Resource URI of a newly created instance record (201 Created)
    pub location: Option<String>,
    /// Profile echoed back by the registry
    pub profile: Option<NfProfile>,
}

/// Registry operations for one NRF.
#[async_trait]
pub trait NfManagementApi: Send + Sync {
    /// RegisterNFInstance (create or full update of the instance record)
    async fn register_nf_instance(
        &self,
        nf_instance_id: &str,
        profile: &NfProfile,
    ) -> SbiResult<RegisterNfInstanceResponse>;

    /// DeregisterNFInstance
    async fn deregister_nf_instance(&self, nf_instance_id: &str) -> SbiResult<()>;
}

/// Split a registry resource location into the registry root address and
/// the assigned instance identifier.
///
/// The root is everything before `/nnrf-nfm/` (empty when the marker is
/// missing); the identifier is the last path segment.
pub fn parse_resource_location(location: &str) -> (String, String) {
    let root = location
        .find(NNRF_NFM_PATH_MARKER)
        .map(|idx| location[..idx].to_string())
        .unwrap_or_default();
    let id = location
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string();
    (root, id)
}

/// Turn a non-2xx registry reply into an error carrying the best detail
/// available.
fn status_error(response: &SbiResponse) -> SbiError {
    let message = response
        .json_body::<ProblemDetails>()
        .ok()
        .and_then(|p| p.detail.or(p.cause))
        .or_else(|| response.http.content.clone())
        .unwrap_or_default();
    SbiError::from_status(response.status, message)
}

/// HTTP NF management client bound to one NRF base URI
pub struct NfManagementClient {
    client: SbiClient,
}

impl NfManagementClient {
    /// Create a client for an NRF base URI such as `http://127.0.0.10:8000`
    pub fn new(nrf_uri: &str) -> SbiResult<Self> {
        Ok(Self::with_client_config(SbiClientConfig::from_uri(nrf_uri)?))
    }

    /// Create a client from a prepared configuration (CA bundle, timeouts)
    pub fn with_client_config(config: SbiClientConfig) -> Self {
        Self {
            client: SbiClient::new(config),
        }
    }

    /// Base URI the client targets
    pub fn base_uri(&self) -> String {
        self.client.config().base_uri()
    }

    fn instance_path(nf_instance_id: &str) -> String {
        format!("{NF_INSTANCES_PATH}/{nf_instance_id}")
    }
}

#[async_trait]
impl NfManagementApi for NfManagementClient {
    async fn register_nf_instance(
        &self,
        nf_instance_id: &str,
        profile: &NfProfile,
    ) -> SbiResult<RegisterNfInstanceResponse> {
        let response = self
            .client
            .put_json(&Self::instance_path(nf_instance_id), profile)
            .await?;

        match response.status {
            200 | 201 => {
                let location = if response.status == 201 {
                    let location = response
                        .http
                        .get_header("location")
                        .filter(|l| !l.is_empty())
                        .cloned();
                    if location.is_none() {
                        return Err(SbiError::InvalidResponse(
                            "201 Created without Location header".to_string(),
                        ));
                    }
                    location
                } else {
                    None
                };

                let profile = match response.http.content {
                    Some(_) => Some(response.json_body::<NfProfile>()?),
                    None => None,
                };

                Ok(RegisterNfInstanceResponse { location, profile })
            }
            _ => Err(status_error(&response)),
        }
    }

    async fn deregister_nf_instance(&self, nf_instance_id: &str) -> SbiResult<()> {
        let response = self
            .client
            .delete(&Self::instance_path(nf_instance_id))
            .await?;

        if response.is_success() {
            Ok(())
        } else {
            Err(status_error(&response))
        }
    }
}
