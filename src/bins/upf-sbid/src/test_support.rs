//! Test doubles shared by the daemon's unit tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use nf_sbi::{
    NfCustomInfo, NfManagementApi, NfProfile, RegisterNfInstanceResponse, SbiError, SbiResult,
};
use tokio::time::Instant;

use crate::config::Config;
use crate::nf_management_clients::NfManagementClients;

/// Scripted reply of the stub registry to one RegisterNFInstance call
#[derive(Debug, Clone)]
pub enum RegisterReply {
    /// 201 with this location, profile echoed with `oauth2: true`
    Created(String),
    /// 200, profile echoed, no location
    Updated,
    /// Transport failure
    Fail,
}

/// Registry call as seen by the stub, in arrival order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubCall {
    /// Recorded once the register reply is produced
    Register,
    Deregister,
}

/// In-memory registry
pub struct StubNrf {
    script: Mutex<VecDeque<RegisterReply>>,
    fallback: RegisterReply,
    register_latency: Option<Duration>,
    hang_deregister: bool,
    fail_deregister: bool,
    pub register_calls: AtomicUsize,
    pub deregister_calls: AtomicUsize,
    pub register_times: Mutex<Vec<Instant>>,
    pub last_profile: Mutex<Option<NfProfile>>,
    calls: Mutex<Vec<StubCall>>,
}

impl Default for StubNrf {
    fn default() -> Self {
        Self::scripted(Vec::new(), RegisterReply::Updated)
    }
}

impl StubNrf {
    /// Replies from `script` in order, then `fallback` forever
    pub fn scripted(script: Vec<RegisterReply>, fallback: RegisterReply) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            register_latency: None,
            hang_deregister: false,
            fail_deregister: false,
            register_calls: AtomicUsize::new(0),
            deregister_calls: AtomicUsize::new(0),
            register_times: Mutex::new(Vec::new()),
            last_profile: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every register call takes `latency` before replying
    pub fn slow_register(mut self, latency: Duration) -> Self {
        self.register_latency = Some(latency);
        self
    }

    /// Deregistration never completes
    pub fn hanging_deregister(mut self) -> Self {
        self.hang_deregister = true;
        self
    }

    /// Deregistration returns a 404
    pub fn failing_deregister(mut self) -> Self {
        self.fail_deregister = true;
        self
    }

    pub fn registers(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub fn deregisters(&self) -> usize {
        self.deregister_calls.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<StubCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl NfManagementApi for StubNrf {
    async fn register_nf_instance(
        &self,
        _nf_instance_id: &str,
        profile: &NfProfile,
    ) -> SbiResult<RegisterNfInstanceResponse> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        self.register_times.lock().unwrap().push(Instant::now());
        *self.last_profile.lock().unwrap() = Some(profile.clone());
        if let Some(latency) = self.register_latency {
            tokio::time::sleep(latency).await;
        }
        self.calls.lock().unwrap().push(StubCall::Register);

        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        let mut echoed = profile.clone();
        match reply {
            RegisterReply::Created(location) => {
                echoed.custom_info = Some(NfCustomInfo { oauth2: Some(true) });
                Ok(RegisterNfInstanceResponse {
                    location: Some(location),
                    profile: Some(echoed),
                })
            }
            RegisterReply::Updated => Ok(RegisterNfInstanceResponse {
                location: None,
                profile: Some(echoed),
            }),
            RegisterReply::Fail => Err(SbiError::ConnectionError("connection refused".to_string())),
        }
    }

    async fn deregister_nf_instance(&self, _nf_instance_id: &str) -> SbiResult<()> {
        self.deregister_calls.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(StubCall::Deregister);
        if self.hang_deregister {
            std::future::pending::<()>().await;
        }
        if self.fail_deregister {
            return Err(SbiError::from_status(404, "NF instance not found"));
        }
        Ok(())
    }
}

/// Cache whose every handle is `stub`
pub fn stub_clients(stub: Arc<StubNrf>) -> NfManagementClients {
    NfManagementClients::with_factory(Arc::new(move |_uri: &str| {
        Ok(stub.clone() as Arc<dyn NfManagementApi>)
    }))
}

/// Valid configuration listening on an ephemeral loopback port
pub fn test_config(nrf_uri: Option<&str>) -> Config {
    let mut yaml = String::from(
        "version: 1.0.4\ndescription: test\nsbi:\n  scheme: http\n  bindingIp: 127.0.0.1\n  port: 8000\n",
    );
    if let Some(uri) = nrf_uri {
        yaml.push_str(&format!("  nrfUri: {uri}\n"));
    }
    let mut config = Config::from_yaml(&yaml).unwrap();
    // Port 0 fails validation but lets tests bind an ephemeral port.
    config.sbi.port = 0;
    config
}
