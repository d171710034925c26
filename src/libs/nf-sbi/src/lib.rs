//! NextGCore NF SBI (Service Based Interface) Library
//!
//! HTTP plumbing and NRF management models shared by network functions that
//! expose a management endpoint and advertise themselves to an NRF.
//!
//! # Example
//!
//! ```rust,no_run
//! use nf_sbi::{NfManagementApi, NfManagementClient};
//!
//! async fn example() -> nf_sbi::SbiResult<()> {
//!     let nrf = NfManagementClient::new("http://127.0.0.10:8000")?;
//!     nrf.deregister_nf_instance("d3b4c1e2-0000-4000-8000-000000000000").await
//! }
//! ```
//!
//! # Modules
//!
//! - [`types`] - NF types, statuses, service names and URI schemes
//! - [`message`] - SBI request/response envelopes and problem details
//! - [`client`] - HTTP/2 client implementation
//! - [`server`] - HTTP server with bounded graceful shutdown
//! - [`tls`] - TLS configuration and certificate loading
//! - [`nnrf`] - Nnrf_NFManagement profile models and client
//! - [`error`] - Error types

pub mod error;
pub mod message;
pub mod nnrf;
pub mod tls;
pub mod types;

pub mod client;
pub mod server;

// Re-export commonly used types
pub use client::{SbiClient, SbiClientConfig};
pub use error::{SbiError, SbiResult};
pub use message::{ProblemDetails, SbiHeader, SbiHttpMessage, SbiRequest, SbiResponse};
pub use nnrf::{
    parse_resource_location, IpEndPoint, NfCustomInfo, NfManagementApi, NfManagementClient,
    NfProfile, NfService, RegisterNfInstanceResponse, UpfInfo,
};
pub use server::{
    send_error, send_method_not_allowed, send_not_found, SbiRequestHandler, SbiServer,
    SbiServerConfig,
};
pub use types::{NfStatus, NfType, PduSessionType, ServiceName, UriScheme};
