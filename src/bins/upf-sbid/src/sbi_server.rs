//! UPF SBI server lifecycle
//!
//! Owns the management listener and the NRF registration around it:
//!
//! ```text
//! Created -> Starting -> Running -> Stopping -> Stopped
//! ```
//!
//! `start` binds the listener (bind failures are returned), then spawns the
//! delayed registration task and the serve task on the caller's
//! [`TaskTracker`] together with the move to `Running`. `stop` withdraws a
//! pending registration, deregisters, then shuts the listener down; each
//! step is bounded and only logged on failure, so `stop` always ends in
//! `Stopped`.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use nf_sbi::{SbiError, SbiResult, SbiServer, SbiServerConfig, UriScheme};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::Config;
use crate::nf_resource::{NfResourceProvider, SysinfoResourceProvider};
use crate::nnrf_service::Consumer;
use crate::oam_handler::OamHandler;

/// Lifecycle of the SBI server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// Delays and budgets of the lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleTiming {
    /// Wait before the first registration attempt, to let the NRF come up
    pub register_delay: Duration,
    /// Budget of the DeregisterNFInstance call at stop
    pub deregister_timeout: Duration,
    /// Budget of the listener's graceful shutdown at stop
    pub shutdown_timeout: Duration,
}

impl Default for LifecycleTiming {
    fn default() -> Self {
        Self {
            register_delay: Duration::from_secs(1),
            deregister_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

/// Background registration launched by `start`
struct Registration {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// UPF SBI server
pub struct UpfSbiServer {
    config: Arc<Config>,
    /// Absent when registration is disabled
    consumer: Option<Arc<Consumer>>,
    handler: OamHandler,
    timing: LifecycleTiming,
    http: Mutex<Option<Arc<SbiServer>>>,
    registration: Mutex<Option<Registration>>,
    local_addr: OnceLock<SocketAddr>,
    state: watch::Sender<LifecycleState>,
}

impl UpfSbiServer {
    pub fn new(config: Arc<Config>) -> Self {
        let consumer = config
            .sbi
            .registration_uri()
            .map(|_| Arc::new(Consumer::new(config.clone())));

        Self {
            config,
            consumer,
            handler: OamHandler::new(Arc::new(SysinfoResourceProvider::new())),
            timing: LifecycleTiming::default(),
            http: Mutex::new(None),
            registration: Mutex::new(None),
            local_addr: OnceLock::new(),
            state: watch::Sender::new(LifecycleState::Created),
        }
    }

    /// Replace the NRF consumer. Ignored when no NRF URI is configured.
    pub fn with_consumer(mut self, consumer: Consumer) -> Self {
        if self.config.sbi.registration_uri().is_some() {
            self.consumer = Some(Arc::new(consumer));
        }
        self
    }

    pub fn with_resources(mut self, resources: Arc<dyn NfResourceProvider>) -> Self {
        self.handler = OamHandler::new(resources);
        self
    }

    pub fn with_timing(mut self, timing: LifecycleTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Address the listener is bound to, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    fn transition(&self, from: LifecycleState, to: LifecycleState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        })
    }

    fn listener_config(&self) -> SbiResult<SbiServerConfig> {
        let sbi = &self.config.sbi;
        let mut config = SbiServerConfig::with_host_port(&sbi.binding_ip, sbi.port)?
            .with_shutdown_timeout(self.timing.shutdown_timeout);

        if sbi.scheme == UriScheme::Https {
            let cert = sbi.cert.as_ref().ok_or_else(|| {
                SbiError::TlsError("https scheme requires sbi.cert".to_string())
            })?;
            config = config.with_tls(&cert.key, &cert.pem);
        }
        Ok(config)
    }

    /// Bind the listener and launch registration and serving.
    ///
    /// Only bind (and TLS material) failures are returned; registration
    /// failures are logged by the background task. Both tasks are spawned on
    /// `tracker`; the registration task observes `cancel` and is withdrawn by
    /// `stop`. A `stop` landing during the bind fails `start` with
    /// `ServerError` before anything is spawned.
    pub async fn start(&self, cancel: &CancellationToken, tracker: &TaskTracker) -> SbiResult<()> {
        if !self.transition(LifecycleState::Created, LifecycleState::Starting) {
            return Err(SbiError::ServerError(format!(
                "UPF SBI server cannot start from state {:?}",
                self.state()
            )));
        }

        let http = match self.bind().await {
            Ok(http) => http,
            Err(e) => {
                self.state.send_replace(LifecycleState::Stopped);
                return Err(e);
            }
        };

        if self.config.sbi.registration_uri().is_none() {
            log::info!("No NRF URI configured, UPF SBI running in standalone mode");
        }

        // Launching under the state lock: a concurrent stop() either finds
        // the tasks or knows they were never spawned.
        let launched = self.state.send_if_modified(|state| {
            if *state != LifecycleState::Starting {
                return false;
            }
            self.launch(&http, cancel, tracker);
            *state = LifecycleState::Running;
            true
        });

        if !launched {
            // stop() ran while binding; nothing was registered.
            if let Err(e) = http.shutdown().await {
                log::error!("HTTP server shutdown error: {e}");
            }
            return Err(SbiError::ServerError(
                "UPF SBI server stopped during start".to_string(),
            ));
        }

        Ok(())
    }

    /// Spawn the registration, serve and supervisor tasks
    fn launch(&self, http: &Arc<SbiServer>, cancel: &CancellationToken, tracker: &TaskTracker) {
        if let (Some(uri), Some(consumer)) =
            (self.config.sbi.registration_uri(), self.consumer.clone())
        {
            let cancel = cancel.child_token();
            let task = tracker.spawn(register_task(
                consumer,
                uri.to_string(),
                self.timing.register_delay,
                cancel.clone(),
            ));
            *self
                .registration
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(Registration { cancel, task });
        }

        let serving = tracker.spawn({
            let http = http.clone();
            let handler = self.handler.clone();
            async move { http.serve(handler).await }
        });

        // Serve panics stop at this boundary; they are logged, not propagated.
        tracker.spawn(async move {
            match serving.await {
                Ok(Ok(())) => log::info!("HTTP server stopped"),
                Ok(Err(e)) => log::error!("HTTP server error: {e}"),
                Err(e) if e.is_panic() => log::error!("Recovered in UPF SBI server: {e}"),
                Err(e) => log::warn!("HTTP server task ended: {e}"),
            }
        });
    }

    async fn bind(&self) -> SbiResult<Arc<SbiServer>> {
        let config = self.listener_config()?;
        log::info!("SBI Binding: {}", config.addr);

        let http = Arc::new(SbiServer::bind(config).await?);
        let _ = self.local_addr.set(http.local_addr());

        let mut slot = self
            .http
            .lock()
            .map_err(|_| SbiError::Internal("server lock poisoned".to_string()))?;
        *slot = Some(http.clone());
        Ok(http)
    }

    /// Deregister from the NRF, then shut the listener down.
    ///
    /// Every failure on the way is logged; the server always ends up
    /// `Stopped`. Calling `stop` again is a no-op.
    pub async fn stop(&self) {
        let mut previous = LifecycleState::Stopped;
        self.state.send_if_modified(|state| {
            previous = *state;
            match *state {
                LifecycleState::Starting | LifecycleState::Running => {
                    *state = LifecycleState::Stopping;
                    true
                }
                LifecycleState::Created => {
                    *state = LifecycleState::Stopped;
                    true
                }
                LifecycleState::Stopping | LifecycleState::Stopped => false,
            }
        });

        match previous {
            LifecycleState::Created | LifecycleState::Stopped => return,
            LifecycleState::Stopping => {
                let mut rx = self.state.subscribe();
                let _ = rx.wait_for(|s| *s == LifecycleState::Stopped).await;
                return;
            }
            LifecycleState::Starting | LifecycleState::Running => {}
        }

        self.withdraw_registration().await;
        self.deregister().await;

        let http = self.http.lock().ok().and_then(|mut slot| slot.take());
        if let Some(http) = http {
            if let Err(e) = http.shutdown().await {
                log::error!("HTTP server shutdown error: {e}");
            }
        }

        self.state.send_replace(LifecycleState::Stopped);
        log::info!("UPF SBI Server terminated");
    }

    /// Cancel the registration task and wait for it, so no register request
    /// is still in flight when the deregistration goes out.
    async fn withdraw_registration(&self) {
        let registration = self
            .registration
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(Registration { cancel, mut task }) = registration else {
            return;
        };

        cancel.cancel();
        if tokio::time::timeout(self.timing.deregister_timeout, &mut task)
            .await
            .is_err()
        {
            log::warn!(
                "NF registration still in flight after {:?}, aborting it",
                self.timing.deregister_timeout
            );
            task.abort();
        }
    }

    async fn deregister(&self) {
        let (Some(consumer), Some(uri)) = (&self.consumer, self.config.sbi.registration_uri())
        else {
            return;
        };

        match tokio::time::timeout(
            self.timing.deregister_timeout,
            consumer.nnrf().deregister_nf_instance(uri),
        )
        .await
        {
            Ok(Ok(())) => log::info!(
                "NF instance {} deregistered from NRF",
                consumer.nnrf().nf_instance_id()
            ),
            Ok(Err(e)) => log::error!("Deregister NFInstance error: {e}"),
            Err(_) => log::error!(
                "Deregister NFInstance error: {}",
                SbiError::ShutdownTimeout("NF deregistration")
            ),
        }
    }
}

/// One-shot registration after `delay`; the outcome is only logged.
async fn register_task(
    consumer: Arc<Consumer>,
    nrf_uri: String,
    delay: Duration,
    cancel: CancellationToken,
) {
    tokio::select! {
        _ = tokio::time::sleep(delay) => {}
        _ = cancel.cancelled() => {}
    }

    match consumer.nnrf().register_nf_instance(&cancel, &nrf_uri).await {
        Ok((nrf_root, nf_instance_id)) if nf_instance_id.is_empty() => {
            log::info!(
                "NF profile of {} updated in NRF{}",
                consumer.nnrf().nf_instance_id(),
                if nrf_root.is_empty() { String::new() } else { format!(" {nrf_root}") }
            );
        }
        Ok((nrf_root, nf_instance_id)) => {
            log::info!("NF registered to NRF {nrf_root} as instance {nf_instance_id}");
        }
        Err(SbiError::Cancelled { attempt }) => {
            log::info!("NF registration cancelled after {attempt} attempt(s)");
        }
        Err(e) => log::error!("Register NFInstance error: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nf_resource::NfResource;
    use crate::nnrf_service::{NnrfService, RetryPolicy};
    use crate::test_support::{stub_clients, test_config, RegisterReply, StubCall, StubNrf};
    use async_trait::async_trait;
    use nf_sbi::SbiClient;
    use std::time::Instant;
    use tokio::sync::Notify;

    const NRF: &str = "http://127.0.0.10:8000";

    fn fast_timing() -> LifecycleTiming {
        LifecycleTiming {
            register_delay: Duration::from_millis(10),
            deregister_timeout: Duration::from_millis(200),
            shutdown_timeout: Duration::from_millis(200),
        }
    }

    fn server_with(stub: Arc<StubNrf>, nrf_uri: Option<&str>) -> UpfSbiServer {
        let config = Arc::new(test_config(nrf_uri));
        let nnrf = NnrfService::new(config.clone())
            .with_clients(stub_clients(stub))
            .with_retry_policy(RetryPolicy {
                max_attempts: 3,
                backoff: Duration::from_millis(10),
            });
        UpfSbiServer::new(config)
            .with_consumer(Consumer::from_nnrf_service(nnrf))
            .with_timing(fast_timing())
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn client_for(server: &UpfSbiServer) -> SbiClient {
        let addr = server.local_addr().unwrap();
        SbiClient::with_host_port(addr.ip().to_string(), addr.port())
    }

    /// Blocks every snapshot request until the test ends.
    struct HangingResources {
        entered: Arc<Notify>,
    }

    #[async_trait]
    impl NfResourceProvider for HangingResources {
        async fn nf_resource(&self) -> SbiResult<NfResource> {
            self.entered.notify_one();
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_start_register_serve_stop() {
        let stub = Arc::new(StubNrf::default());
        let server = server_with(stub.clone(), Some(NRF));
        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();
        assert_eq!(server.state(), LifecycleState::Created);

        server.start(&cancel, &tracker).await.unwrap();
        assert_eq!(server.state(), LifecycleState::Running);

        wait_until(|| stub.registers() == 1).await;

        let client = client_for(&server);
        let response = client.get("/nwdaf-oam/").await.unwrap();
        assert_eq!(response.status, 200);
        client.close().await;

        cancel.cancel();
        server.stop().await;
        assert_eq!(server.state(), LifecycleState::Stopped);
        assert_eq!(stub.deregisters(), 1);

        tracker.close();
        tokio::time::timeout(Duration::from_secs(2), tracker.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_serves_while_registration_fails() {
        let stub = Arc::new(StubNrf::scripted(Vec::new(), RegisterReply::Fail));
        let server = server_with(stub.clone(), Some(NRF));
        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();

        server.start(&cancel, &tracker).await.unwrap();
        wait_until(|| stub.registers() == 3).await;

        let client = client_for(&server);
        let response = client.get("/nwdaf-oam/").await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(server.state(), LifecycleState::Running);
        client.close().await;

        server.stop().await;
        assert_eq!(server.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn test_registration_disabled() {
        let stub = Arc::new(StubNrf::default());
        let server = server_with(stub.clone(), None);
        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();

        server.start(&cancel, &tracker).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        server.stop().await;

        assert_eq!(server.state(), LifecycleState::Stopped);
        assert_eq!(stub.registers(), 0);
        assert_eq!(stub.deregisters(), 0);
    }

    #[tokio::test]
    async fn test_stop_completes_when_everything_hangs() {
        let stub = Arc::new(StubNrf::default().hanging_deregister());
        let entered = Arc::new(Notify::new());
        let server = server_with(stub.clone(), Some(NRF)).with_resources(Arc::new(
            HangingResources {
                entered: entered.clone(),
            },
        ));
        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();

        server.start(&cancel, &tracker).await.unwrap();

        let client = client_for(&server);
        let in_flight = tokio::spawn(async move { client.get("/nwdaf-oam/nf-resource").await });
        entered.notified().await;

        let started = Instant::now();
        tokio::time::timeout(Duration::from_secs(3), server.stop())
            .await
            .unwrap();
        assert_eq!(server.state(), LifecycleState::Stopped);
        assert_eq!(stub.deregisters(), 1);
        assert!(started.elapsed() >= Duration::from_millis(200));

        in_flight.abort();
    }

    #[tokio::test]
    async fn test_stop_before_start_and_twice() {
        let stub = Arc::new(StubNrf::default());
        let server = server_with(stub.clone(), Some(NRF));

        server.stop().await;
        assert_eq!(server.state(), LifecycleState::Stopped);
        server.stop().await;
        assert_eq!(server.state(), LifecycleState::Stopped);
        assert_eq!(stub.deregisters(), 0);

        let err = server
            .start(&CancellationToken::new(), &TaskTracker::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SbiError::ServerError(_)));
    }

    fn immediate_registration() -> LifecycleTiming {
        LifecycleTiming {
            register_delay: Duration::ZERO,
            ..fast_timing()
        }
    }

    #[tokio::test]
    async fn test_stop_withdraws_pending_registration() {
        let stub = Arc::new(StubNrf::default());
        let server = server_with(stub.clone(), Some(NRF)).with_timing(LifecycleTiming {
            register_delay: Duration::from_secs(30),
            ..fast_timing()
        });
        let tracker = TaskTracker::new();

        server.start(&CancellationToken::new(), &tracker).await.unwrap();
        server.stop().await;

        tracker.close();
        tokio::time::timeout(Duration::from_secs(2), tracker.wait())
            .await
            .unwrap();
        assert_eq!(stub.calls(), vec![StubCall::Deregister]);
    }

    #[tokio::test]
    async fn test_stop_waits_for_in_flight_registration() {
        let stub = Arc::new(StubNrf::default().slow_register(Duration::from_millis(100)));
        let server = server_with(stub.clone(), Some(NRF)).with_timing(immediate_registration());
        let tracker = TaskTracker::new();

        server.start(&CancellationToken::new(), &tracker).await.unwrap();
        wait_until(|| stub.registers() == 1).await;
        server.stop().await;

        assert_eq!(stub.calls(), vec![StubCall::Register, StubCall::Deregister]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_start_and_stop_never_register_late() {
        for round in 0..200 {
            let stub = Arc::new(StubNrf::default());
            let server = Arc::new(
                server_with(stub.clone(), Some(NRF)).with_timing(immediate_registration()),
            );
            let tracker = TaskTracker::new();

            let starting = tokio::spawn({
                let server = server.clone();
                let tracker = tracker.clone();
                async move { server.start(&CancellationToken::new(), &tracker).await }
            });
            let stopping = tokio::spawn({
                let server = server.clone();
                async move { server.stop().await }
            });
            let started = starting.await.unwrap();
            stopping.await.unwrap();

            tracker.close();
            tokio::time::timeout(Duration::from_secs(2), tracker.wait())
                .await
                .unwrap();

            let calls = stub.calls();
            assert_eq!(server.state(), LifecycleState::Stopped, "round {round}");
            if started.is_err() {
                assert!(!calls.contains(&StubCall::Register), "round {round}: {calls:?}");
            }
            if let Some(at) = calls.iter().position(|c| *c == StubCall::Deregister) {
                assert!(
                    !calls[at..].contains(&StubCall::Register),
                    "round {round}: register after deregister {calls:?}"
                );
            }
        }
    }

    #[tokio::test]
    async fn test_bind_error_is_fatal() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let mut config = test_config(None);
        config.sbi.port = taken.local_addr().unwrap().port();
        let server = UpfSbiServer::new(Arc::new(config));
        let tracker = TaskTracker::new();

        let err = server
            .start(&CancellationToken::new(), &tracker)
            .await
            .unwrap_err();
        assert!(matches!(err, SbiError::BindError { .. }));
        assert_eq!(server.state(), LifecycleState::Stopped);
        assert!(tracker.is_empty());
    }
}
