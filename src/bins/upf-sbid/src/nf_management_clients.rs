//! NRF client cache
//!
//! One long-lived [`NfManagementApi`] handle per registry base URI, created
//! on first use and shared afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use nf_sbi::{NfManagementApi, NfManagementClient, SbiClientConfig, SbiError, SbiResult};
use tokio::sync::RwLock;

/// Builds a registry handle for a base URI
pub type NfManagementClientFactory =
    Arc<dyn Fn(&str) -> SbiResult<Arc<dyn NfManagementApi>> + Send + Sync>;

/// HTTP clients; https targets are verified against `ca_cert` when given,
/// the webpki roots otherwise.
fn http_client_factory(ca_cert: Option<String>) -> NfManagementClientFactory {
    Arc::new(move |uri: &str| {
        let mut config = SbiClientConfig::from_uri(uri)?;
        if let Some(ca) = &ca_cert {
            config = config.with_ca_cert(ca.as_str());
        }
        Ok(Arc::new(NfManagementClient::with_client_config(config)) as Arc<dyn NfManagementApi>)
    })
}

/// Registry handles keyed by base URI
pub struct NfManagementClients {
    clients: RwLock<HashMap<String, Arc<dyn NfManagementApi>>>,
    factory: NfManagementClientFactory,
}

impl NfManagementClients {
    /// Cache building HTTP clients
    pub fn new() -> Self {
        Self::with_ca_cert(None)
    }

    /// Cache building HTTP clients that trust `ca_cert` for https NRFs
    pub fn with_ca_cert(ca_cert: Option<String>) -> Self {
        Self::with_factory(http_client_factory(ca_cert))
    }

    /// Cache building handles through `factory`
    pub fn with_factory(factory: NfManagementClientFactory) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            factory,
        }
    }

    /// Get the handle for `uri`, creating it on first use.
    ///
    /// Two callers missing at the same time may both build a handle; the
    /// first one inserted wins and is what every caller gets back.
    pub async fn get_or_create(&self, uri: &str) -> SbiResult<Arc<dyn NfManagementApi>> {
        if uri.is_empty() {
            return Err(SbiError::InvalidAddress("empty NRF URI".to_string()));
        }

        {
            let clients = self.clients.read().await;
            if let Some(client) = clients.get(uri) {
                return Ok(client.clone());
            }
        }

        let client = (self.factory)(uri)
            .map_err(|e| SbiError::ClientUnavailable(format!("{uri}: {e}")))?;

        let mut clients = self.clients.write().await;
        let cached = clients.entry(uri.to_string()).or_insert(client);
        Ok(cached.clone())
    }

    /// Number of cached handles
    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }
}

impl Default for NfManagementClients {
    fn default() -> Self {
        Self::new()
    }
}
