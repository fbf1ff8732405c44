//! Client builder, shared core and public operations.
//!
//! The [`ClientBuilder`] collects configuration and the two pluggable
//! seams (notifier and connector). [`ClientBuilder::start`] spawns the
//! connection manager, which keeps a daemon session alive until
//! [`CneClient::shutdown`]:
//! 1. Connect (retrying forever with a fixed delay)
//! 2. Send `Init`, then re-register the standing role if configured
//! 3. Read frames and dispatch them
//! 4. On disconnect fail everything in flight and drop all registrations
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use cne_client::{ChannelNotifier, CneClient, PeerHandle, RoleRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (notifier, mut notices) = ChannelNotifier::new();
//!     let client = CneClient::builder()
//!         .socket_path("/dev/socket/cnd")
//!         .notifier(notifier)
//!         .start()?;
//!
//!     client.wait_connected(Duration::from_secs(10)).await?;
//!     let id = client.register_role(RoleRequest::new(1), PeerHandle::new())?;
//!     while let Some(notice) = notices.recv().await {
//!         println!("{:?}", notice);
//!     }
//!     client.release_role(id).await?;
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::codec::PayloadWriter;
use crate::config::ClientConfig;
use crate::error::{CneError, Result};
use crate::info::{BatteryInfo, WlanInfo, WwanInfo};
use crate::notify::{LogNotifier, LossReason, Notice, Notifier};
use crate::protocol::{Rat, RequestType};
use crate::registration::{
    lifecycle, FlowId, PeerHandle, QosSpec, RegistrationId, RegistrationSnapshot,
    RegistrationTable, RoleRequest,
};
use crate::request::{OutstandingTable, PendingRequest, RequestPool, Response};
use crate::transport::{ConnectionManager, Connector, LinkState, UnixConnector};
use crate::writer::{encode_checked, WriterHandle};

/// State shared by the public handle, the connection manager, the
/// dispatcher and the registration tasks.
pub(crate) struct ClientCore {
    pub(crate) config: ClientConfig,
    pub(crate) pool: RequestPool,
    pub(crate) outstanding: OutstandingTable,
    pub(crate) registrations: Mutex<RegistrationTable>,
    pub(crate) shutdown: CancellationToken,
    writer: Mutex<Option<WriterHandle>>,
    notifier: Arc<dyn Notifier>,
    state: watch::Sender<LinkState>,
    failures: AtomicU32,
}

impl ClientCore {
    pub(crate) fn new(config: ClientConfig, notifier: Arc<dyn Notifier>) -> Self {
        let (state, _) = watch::channel(LinkState::Disconnected);
        Self {
            pool: RequestPool::new(config.pool_capacity),
            outstanding: OutstandingTable::new(),
            registrations: Mutex::new(RegistrationTable::new()),
            shutdown: CancellationToken::new(),
            writer: Mutex::new(None),
            notifier,
            state,
            failures: AtomicU32::new(0),
            config,
        }
    }

    pub(crate) fn notify(&self, notice: Notice) {
        self.notifier.notify(notice);
    }

    pub(crate) fn set_link_state(&self, state: LinkState) {
        self.state.send_replace(state);
    }

    pub(crate) fn link_state(&self) -> LinkState {
        *self.state.borrow()
    }

    pub(crate) fn subscribe_link_state(&self) -> watch::Receiver<LinkState> {
        self.state.subscribe()
    }

    /// Connects or sessions that ended without a clean run, in a row.
    pub(crate) fn consecutive_failures(&self) -> u32 {
        self.failures.load(Ordering::Relaxed)
    }

    pub(crate) fn record_failure(&self) -> u32 {
        self.failures.fetch_add(1, Ordering::Relaxed).saturating_add(1)
    }

    pub(crate) fn clear_failures(&self) {
        self.failures.store(0, Ordering::Relaxed);
    }

    /// Start a session on a fresh connection: serials restart at 0 in the
    /// table's current epoch.
    pub(crate) fn begin_session(&self) -> u64 {
        let epoch = self.outstanding.epoch();
        self.pool.begin_epoch(epoch);
        epoch
    }

    /// Make the session's writer visible to callers.
    pub(crate) fn open_session(&self, writer: WriterHandle) {
        *self.writer.lock() = Some(writer);
    }

    /// End the session: hide the writer, fail every outstanding request
    /// and drop every registration without talking to the daemon.
    pub(crate) fn reset_session(&self) {
        self.writer.lock().take();

        let (next_epoch, drained) = self.outstanding.advance_epoch();
        let failed = drained.len();
        for req in drained {
            self.complete(req, Err(CneError::PeerUnavailable));
        }

        let lost = self.registrations.lock().teardown_all();
        tracing::info!(
            "Session reset: {} requests failed, {} registrations dropped (epoch {})",
            failed,
            lost.len(),
            next_epoch
        );
        for registration in lost {
            self.notify(Notice::RegistrationLost {
                registration,
                reason: LossReason::TransportReset,
            });
        }
    }

    /// Build a request with the next serial.
    pub(crate) fn request<F>(&self, request_type: RequestType, body: F) -> PendingRequest
    where
        F: FnOnce(&mut PayloadWriter<'_>),
    {
        let mut req = self.pool.obtain(request_type);
        body(&mut req.body());
        req
    }

    /// Record `req` as outstanding and queue it for sending.
    ///
    /// The receiver yields the outcome exactly once. Errors returned here
    /// mean the request never became outstanding.
    pub(crate) async fn submit(
        &self,
        req: PendingRequest,
    ) -> Result<oneshot::Receiver<Result<Response>>> {
        let writer = self.writer.lock().clone();
        let Some(writer) = writer else {
            self.pool.release(req);
            return Err(if self.shutdown.is_cancelled() {
                CneError::Shutdown
            } else {
                CneError::PeerUnavailable
            });
        };
        self.submit_on(&writer, req).await
    }

    /// [`submit`](Self::submit) through `writer`, whether or not the
    /// session is open to callers yet.
    pub(crate) async fn submit_on(
        &self,
        writer: &WriterHandle,
        mut req: PendingRequest,
    ) -> Result<oneshot::Receiver<Result<Response>>> {
        if self.shutdown.is_cancelled() {
            self.pool.release(req);
            return Err(CneError::Shutdown);
        }
        let frame = match encode_checked(req.take_payload(), self.config.max_frame_size) {
            Ok(frame) => frame,
            Err(e) => {
                self.pool.release(req);
                return Err(e);
            }
        };

        let (tx, rx) = oneshot::channel();
        req.set_responder(tx);
        let (serial, epoch, request_type) = (req.serial(), req.epoch(), req.request_type());
        if let Err((req, e)) = self.outstanding.insert(req) {
            self.pool.release(req);
            return Err(e);
        }

        tracing::trace!("Sending {:?} (serial {})", request_type, serial);
        if let Err(e) = writer.send(frame).await {
            if let Some(req) = self.outstanding.take_in_epoch(serial, epoch) {
                self.pool.release(req);
            }
            return Err(e);
        }
        Ok(rx)
    }

    /// Send `req` and wait at most `timeout` for its response.
    pub(crate) async fn round_trip(
        &self,
        req: PendingRequest,
        timeout: Duration,
    ) -> Result<Response> {
        let (request, serial, epoch) = (req.request_type(), req.serial(), req.epoch());
        let rx = self.submit(req).await?;
        self.await_response(rx, request, serial, epoch, timeout).await
    }

    /// [`round_trip`](Self::round_trip) through `writer`.
    pub(crate) async fn round_trip_on(
        &self,
        writer: &WriterHandle,
        req: PendingRequest,
        timeout: Duration,
    ) -> Result<Response> {
        let (request, serial, epoch) = (req.request_type(), req.serial(), req.epoch());
        let rx = self.submit_on(writer, req).await?;
        self.await_response(rx, request, serial, epoch, timeout).await
    }

    async fn await_response(
        &self,
        mut rx: oneshot::Receiver<Result<Response>>,
        request: RequestType,
        serial: u32,
        epoch: u64,
        timeout: Duration,
    ) -> Result<Response> {
        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(outcome) => outcome.unwrap_or(Err(CneError::PeerUnavailable)),
            Err(_) => match self.outstanding.take_in_epoch(serial, epoch) {
                Some(req) => {
                    tracing::warn!("{:?} (serial {}) timed out after {:?}", request, serial, timeout);
                    self.pool.release(req);
                    Err(CneError::Timeout { request, serial })
                }
                // Resolved concurrently with the timeout; the outcome is
                // already on its way.
                None => rx.await.unwrap_or(Err(CneError::PeerUnavailable)),
            },
        }
    }

    /// Build, send and await a request with the configured timeout.
    pub(crate) async fn call<F>(&self, request_type: RequestType, body: F) -> Result<Response>
    where
        F: FnOnce(&mut PayloadWriter<'_>) + Send,
    {
        let req = self.request(request_type, body);
        self.round_trip(req, self.config.request_timeout()).await
    }

    /// Deliver an outcome and recycle the request.
    pub(crate) fn complete(&self, mut req: PendingRequest, outcome: Result<Response>) {
        if !req.resolve(outcome) {
            tracing::debug!(
                "Caller of {:?} (serial {}) stopped waiting",
                req.request_type(),
                req.serial()
            );
        }
        self.pool.release(req);
    }
}

/// Builder for configuring and starting a [`CneClient`].
pub struct ClientBuilder {
    config: ClientConfig,
    notifier: Option<Arc<dyn Notifier>>,
    connector: Option<Arc<dyn Connector>>,
}

impl ClientBuilder {
    /// Create a builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            notifier: None,
            connector: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Daemon socket path. Ignored when a custom connector is set.
    pub fn socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.socket_path = path.into();
        self
    }

    /// Largest payload accepted in either direction.
    ///
    /// Default: 64 KiB
    pub fn max_frame_size(mut self, size: u32) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Fixed delay between reconnect attempts.
    ///
    /// Default: 4 seconds
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Consecutive connection failures logged at `warn`.
    ///
    /// Default: 8
    pub fn loud_failure_limit(mut self, limit: u32) -> Self {
        self.config.loud_failure_limit = limit;
        self
    }

    /// Timeout for every synchronous round trip.
    ///
    /// Default: 5 seconds
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Writer queue capacity.
    ///
    /// Default: 64
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// Idle request buffers kept for reuse.
    ///
    /// Default: 4
    pub fn pool_capacity(mut self, capacity: usize) -> Self {
        self.config.pool_capacity = capacity;
        self
    }

    /// Role to (re-)register on every connection.
    pub fn standing_role(mut self, role: RoleRequest) -> Self {
        self.config.standing_role = Some(role);
        self
    }

    /// Where notices go. Defaults to logging them.
    pub fn notifier(mut self, notifier: impl Notifier) -> Self {
        self.notifier = Some(Arc::new(notifier));
        self
    }

    /// Custom connection factory.
    pub fn connector(mut self, connector: impl Connector) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Validate the configuration and spawn the connection manager.
    ///
    /// Must be called inside a Tokio runtime. Returns immediately; use
    /// [`CneClient::wait_connected`] to wait for the first session.
    pub fn start(self) -> Result<CneClient> {
        self.config.validate()?;
        let connector = match self.connector {
            Some(connector) => connector,
            None => Arc::new(UnixConnector::new(self.config.socket_path.clone())) as Arc<dyn Connector>,
        };
        let notifier = match self.notifier {
            Some(notifier) => notifier,
            None => Arc::new(LogNotifier) as Arc<dyn Notifier>,
        };

        let core = Arc::new(ClientCore::new(self.config, notifier));
        let manager = tokio::spawn(ConnectionManager::new(core.clone(), connector).run());

        Ok(CneClient {
            core,
            manager: Mutex::new(Some(manager)),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running connectivity-engine client.
///
/// Dropping it stops the connection manager.
pub struct CneClient {
    core: Arc<ClientCore>,
    manager: Mutex<Option<JoinHandle<()>>>,
}

impl CneClient {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.core.config
    }

    /// Current connection state.
    pub fn link_state(&self) -> LinkState {
        self.core.link_state()
    }

    /// Failed connects and sessions lost before running cleanly, in a row.
    /// Back to 0 after a session that completed `Init` and closed cleanly.
    pub fn consecutive_failures(&self) -> u32 {
        self.core.consecutive_failures()
    }

    /// Watch connection state changes.
    pub fn link_state_changes(&self) -> watch::Receiver<LinkState> {
        self.core.subscribe_link_state()
    }

    /// Wait until a session is up. A session is up once the daemon has
    /// acknowledged `Init`; requests made before that fail with
    /// `PeerUnavailable`.
    ///
    /// Fails with `PeerUnavailable` if none is established within
    /// `timeout`, or `Shutdown` if the client stops meanwhile.
    pub async fn wait_connected(&self, timeout: Duration) -> Result<()> {
        let mut rx = self.core.subscribe_link_state();
        let connected = async {
            tokio::select! {
                r = rx.wait_for(|s| *s == LinkState::Connected) => {
                    r.map(|_| ()).map_err(|_| CneError::Shutdown)
                }
                _ = self.core.shutdown.cancelled() => Err(CneError::Shutdown),
            }
        };
        tokio::time::timeout(timeout, connected)
            .await
            .unwrap_or(Err(CneError::PeerUnavailable))
    }

    /// Register a role owned by `peer`. Returns immediately; the outcome
    /// arrives as `LinkAvailable` or `RegistrationFailed`.
    ///
    /// Killing `peer` later releases the registration.
    pub fn register_role(&self, role: RoleRequest, peer: PeerHandle) -> Result<RegistrationId> {
        lifecycle::register(&self.core, role, peer)
    }

    /// Tell the daemon whether the active link is good enough. When it is
    /// not, the next untried candidate becomes active. Returns the RAT that
    /// was confirmed.
    pub async fn report_link_satisfaction(&self, id: RegistrationId, satisfied: bool) -> Result<Rat> {
        lifecycle::report_link_satisfaction(&self.core, id, satisfied).await
    }

    /// Move to the better RAT offered by `BetterLinkAvailable`.
    pub async fn switch_link(&self, id: RegistrationId) -> Result<Rat> {
        lifecycle::switch_link(&self.core, id).await
    }

    /// Stay on the current RAT after a `BetterLinkAvailable`.
    pub async fn reject_switch(&self, id: RegistrationId) -> Result<Rat> {
        lifecycle::reject_switch(&self.core, id).await
    }

    /// Deregister and drop everything the registration owns.
    pub async fn release_role(&self, id: RegistrationId) -> Result<()> {
        lifecycle::release(&self.core, id, LossReason::Released).await
    }

    /// Ask for a QoS flow on behalf of an active registration.
    pub async fn request_qos(&self, id: RegistrationId, spec: QosSpec) -> Result<FlowId> {
        lifecycle::request_qos(&self.core, id, spec).await
    }

    /// Give a QoS flow back.
    pub async fn release_qos(&self, id: RegistrationId, flow: FlowId) -> Result<()> {
        lifecycle::release_qos(&self.core, id, flow).await
    }

    pub async fn update_wlan_info(&self, info: &WlanInfo) -> Result<()> {
        self.core
            .call(RequestType::UpdateWlanInfo, |w| info.encode(w))
            .await
            .map(|_| ())
    }

    pub async fn update_wwan_info(&self, info: &WwanInfo) -> Result<()> {
        self.core
            .call(RequestType::UpdateWwanInfo, |w| info.encode(w))
            .await
            .map(|_| ())
    }

    pub async fn update_battery_info(&self, info: &BatteryInfo) -> Result<()> {
        self.core
            .call(RequestType::UpdateBatteryInfo, |w| info.encode(w))
            .await
            .map(|_| ())
    }

    /// Tell the daemon which RAT the platform uses as default network.
    pub async fn set_default_network(&self, rat: Rat) -> Result<()> {
        self.core
            .call(RequestType::NotifyDefaultNetwork, |w| {
                w.put_i32(rat.code());
            })
            .await
            .map(|_| ())
    }

    /// Send an arbitrary request with a pre-encoded body and wait at most
    /// `timeout` for the response.
    pub async fn call(
        &self,
        request_type: RequestType,
        body: &[u8],
        timeout: Duration,
    ) -> Result<Response> {
        let mut req = self.core.pool.obtain(request_type);
        req.append(body);
        self.core.round_trip(req, timeout).await
    }

    pub fn registration(&self, id: RegistrationId) -> Option<RegistrationSnapshot> {
        self.core.registrations.lock().snapshot(id)
    }

    pub fn registrations(&self) -> Vec<RegistrationSnapshot> {
        self.core.registrations.lock().snapshots()
    }

    /// QoS flows owned by `id`.
    pub fn qos_flows(&self, id: RegistrationId) -> Vec<FlowId> {
        self.core.registrations.lock().qos().flows_for(id)
    }

    /// Serials awaiting a response.
    pub fn outstanding_requests(&self) -> Vec<u32> {
        self.core.outstanding.serials()
    }

    /// Stop the connection manager and wait for it to wind down. Anything
    /// in flight fails with `PeerUnavailable`.
    pub async fn shutdown(&self) {
        self.core.shutdown.cancel();
        let manager = self.manager.lock().take();
        if let Some(manager) = manager {
            if let Err(e) = manager.await {
                tracing::error!("Connection manager panicked: {}", e);
            }
        }
    }
}

impl Drop for CneClient {
    fn drop(&mut self) {
        self.core.shutdown.cancel();
    }
}
