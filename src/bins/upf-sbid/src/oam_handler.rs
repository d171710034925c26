//! NWDAF-OAM management routes
//!
//! - `GET /nwdaf-oam/` health check
//! - `GET /nwdaf-oam/nf-resource` resource snapshot

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use nf_sbi::{send_method_not_allowed, send_not_found, SbiRequest, SbiRequestHandler, SbiResponse};

use crate::nf_resource::NfResourceProvider;

/// Route group prefix
pub const NWDAF_OAM_ROUTE_GROUP: &str = "nwdaf-oam";
/// Health check body
pub const HEALTH_CHECK_TEXT: &str = "UPF NWDAF-OAM working!";

/// Request handler for the management surface
#[derive(Clone)]
pub struct OamHandler {
    resources: Arc<dyn NfResourceProvider>,
}

impl OamHandler {
    pub fn new(resources: Arc<dyn NfResourceProvider>) -> Self {
        Self { resources }
    }

    async fn dispatch(resources: Arc<dyn NfResourceProvider>, request: SbiRequest) -> SbiResponse {
        let method = request.header.method.as_str();
        let path = request.header.path();

        log::debug!("UPF SBI: {method} {path}");

        let parts: Vec<&str> = path.trim_start_matches('/').split('/').collect();

        match parts.as_slice() {
            [NWDAF_OAM_ROUTE_GROUP] | [NWDAF_OAM_ROUTE_GROUP, ""] => match method {
                "GET" => SbiResponse::ok().with_text(HEALTH_CHECK_TEXT),
                _ => send_method_not_allowed(method, "/"),
            },
            [NWDAF_OAM_ROUTE_GROUP, "nf-resource"] => match method {
                "GET" => handle_nf_resource_get(resources.as_ref()).await,
                _ => send_method_not_allowed(method, "nf-resource"),
            },
            _ => send_not_found(&format!("Resource not found: {path}"), None),
        }
    }
}

async fn handle_nf_resource_get(resources: &dyn NfResourceProvider) -> SbiResponse {
    let resource = match resources.nf_resource().await {
        Ok(resource) => resource,
        Err(e) => {
            log::warn!("NF resource collection failed: {e}");
            return SbiResponse::with_status(500).with_text(e.to_string());
        }
    };

    match SbiResponse::ok().with_json_body(&resource) {
        Ok(response) => response,
        Err(e) => SbiResponse::with_status(500).with_text(e.to_string()),
    }
}

impl SbiRequestHandler for OamHandler {
    fn handle(&self, request: SbiRequest) -> Pin<Box<dyn Future<Output = SbiResponse> + Send>> {
        Box::pin(Self::dispatch(self.resources.clone(), request))
    }
}
