//! Nnrf NF management consumer
//!
//! Registers this UPF instance with the NRF (bounded retry) and withdraws
//! it again at shutdown.

use std::sync::Arc;
use std::time::Duration;

use nf_sbi::{
    parse_resource_location, IpEndPoint, NfProfile, NfService, NfStatus, NfType, PduSessionType,
    SbiError, SbiResult, ServiceName, UpfInfo,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::Config;
use crate::nf_management_clients::NfManagementClients;

/// Default number of RegisterNFInstance attempts
const DEFAULT_MAX_ATTEMPTS: usize = 3;
/// Default pause after a failed attempt
const DEFAULT_BACKOFF: Duration = Duration::from_secs(2);

/// Bounded retry of RegisterNFInstance; fixed backoff, no jitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

/// Registration coordinator for one NF instance
pub struct NnrfService {
    /// Generated once, never changes
    nf_instance_id: String,
    config: Arc<Config>,
    clients: NfManagementClients,
    retry: RetryPolicy,
}

impl NnrfService {
    pub fn new(config: Arc<Config>) -> Self {
        let clients = NfManagementClients::with_ca_cert(config.sbi.nrf_ca_pem.clone());
        Self {
            nf_instance_id: Uuid::new_v4().to_string(),
            config,
            clients,
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the registry client cache
    pub fn with_clients(mut self, clients: NfManagementClients) -> Self {
        self.clients = clients;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn nf_instance_id(&self) -> &str {
        &self.nf_instance_id
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Build the advertised profile from the current configuration.
    ///
    /// The bind address is assumed to be IPv4.
    pub fn build_nf_profile(&self) -> NfProfile {
        let sbi = &self.config.sbi;
        NfProfile {
            nf_instance_id: self.nf_instance_id.clone(),
            nf_type: NfType::Upf,
            nf_status: NfStatus::Registered,
            ipv4_addresses: vec![sbi.binding_ip.clone()],
            nf_services: vec![NfService {
                service_instance_id: "0".to_string(),
                service_name: ServiceName::NupfOam,
                scheme: sbi.scheme,
                nf_service_status: NfStatus::Registered,
                ip_end_points: vec![IpEndPoint {
                    ipv4_address: Some(sbi.binding_ip.clone()),
                    port: Some(sbi.port),
                }],
            }],
            upf_info: Some(UpfInfo {
                pdu_session_types: vec![PduSessionType::Ipv4],
            }),
            custom_info: None,
        }
    }

    /// Register this instance with the NRF at `nrf_uri`.
    ///
    /// Returns the NRF root URI and the instance id taken from the
    /// `Location` of a newly created record, or two empty strings when an
    /// existing record was updated. Every failed attempt, the last one
    /// included, is followed by the backoff pause. Cancellation is checked
    /// before every attempt and cuts the pause short; an in-flight call is
    /// not interrupted.
    pub async fn register_nf_instance(
        &self,
        cancel: &CancellationToken,
        nrf_uri: &str,
    ) -> SbiResult<(String, String)> {
        let profile = self.build_nf_profile();
        let client = self.clients.get_or_create(nrf_uri).await?;

        for attempt in 0..self.retry.max_attempts {
            if cancel.is_cancelled() {
                return Err(SbiError::Cancelled { attempt });
            }

            let response = match client
                .register_nf_instance(&self.nf_instance_id, &profile)
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    log::error!(
                        "UPF register to NRF Error[{e}] (attempt {}/{})",
                        attempt + 1,
                        self.retry.max_attempts
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(self.retry.backoff) => {}
                        _ = cancel.cancelled() => {}
                    }
                    continue;
                }
            };

            let Some(location) = response.location else {
                // 200 OK: the record already existed and was refreshed
                log::debug!("NF instance {} updated in NRF", self.nf_instance_id);
                return Ok((String::new(), String::new()));
            };

            let (nrf_root, nf_instance_id) = parse_resource_location(&location);

            // TODO: enforce OAuth2 once NRF certificate configuration exists
            if let Some(oauth2) = response.profile.as_ref().and_then(|p| p.oauth2_required()) {
                log::info!("OAuth2 setting receive from NRF: {oauth2}");
            }

            return Ok((nrf_root, nf_instance_id));
        }

        Err(SbiError::RegistrationExhausted {
            attempts: self.retry.max_attempts,
        })
    }

    /// Withdraw this instance from the NRF. Single attempt.
    pub async fn deregister_nf_instance(&self, nrf_uri: &str) -> SbiResult<()> {
        let client = self.clients.get_or_create(nrf_uri).await?;
        client
            .deregister_nf_instance(&self.nf_instance_id)
            .await
            .map_err(|e| SbiError::DeregistrationFailed {
                nf_instance_id: self.nf_instance_id.clone(),
                source: Box::new(e),
            })
    }
}

/// Outbound SBI consumers of the UPF
pub struct Consumer {
    nnrf_service: NnrfService,
}

impl Consumer {
    pub fn new(config: Arc<Config>) -> Self {
        Self::from_nnrf_service(NnrfService::new(config))
    }

    pub fn from_nnrf_service(nnrf_service: NnrfService) -> Self {
        Self { nnrf_service }
    }

    pub fn nnrf(&self) -> &NnrfService {
        &self.nnrf_service
    }
}
