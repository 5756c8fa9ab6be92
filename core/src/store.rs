//! The port-forward store: tracks, resumes, and persists tunnels.
//!
//! The store owns the in-memory tunnel collection and is the only writer
//! to persistent storage; collaborators are injected at construction.
//! Operations on different tunnels may run concurrently. Calls racing on
//! the same tunnel are last-write-wins and must be serialized by the
//! caller (the UI disables the relevant control while a call is in
//! flight).

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::control::ControlApi;
use crate::error::{ForwardError, Result};
use crate::models::{
    ForwardNotification, ForwardProtocol, ForwardStatus, ForwardTarget, PortForwardDescriptor,
    PortForwardItem,
};
use crate::net;
use crate::storage::ForwardStorage;

/// Poll interval while waiting for a stopped tunnel's port to be released.
const PORT_RELEASE_POLL: Duration = Duration::from_millis(200);

/// Upper bound on the port-release wait.
const PORT_RELEASE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Manages the lifecycle of port-forward tunnels.
pub struct PortForwardStore<S, C> {
    storage: S,
    control: C,

    /// Tracked tunnels, in insertion order.
    items: RwLock<Vec<PortForwardItem>>,

    /// Pending user-facing notifications.
    pending_notifications: RwLock<Vec<ForwardNotification>>,

    /// Live `watch` handles.
    watchers: Arc<AtomicUsize>,

    /// Set while `load_all` runs, so write-through does not retrigger itself.
    syncing: AtomicBool,

    /// Set when a change lands while `load_all` is in flight; the running
    /// sync picks it up and persists once more.
    dirty: AtomicBool,
}

/// Detaches its watch when dropped.
///
/// Handles are independent: write-through persistence stays active while
/// any handle is alive.
pub struct WatchHandle {
    watchers: Arc<AtomicUsize>,
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.watchers.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<S: ForwardStorage, C: ControlApi> PortForwardStore<S, C> {
    /// Creates a store over the given collaborators. Call `init` to
    /// resume saved tunnels.
    pub fn new(storage: S, control: C) -> Self {
        Self {
            storage,
            control,
            items: RwLock::new(Vec::new()),
            pending_notifications: RwLock::new(Vec::new()),
            watchers: Arc::new(AtomicUsize::new(0)),
            syncing: AtomicBool::new(false),
            dirty: AtomicBool::new(false),
        }
    }

    // =========================================================================
    // Startup
    // =========================================================================

    /// Reconciles saved tunnels with the control backend.
    ///
    /// Disabled records are registered without a start attempt; active
    /// (including legacy status-less) records are resumed concurrently
    /// through the same path user additions take. Per-tunnel failures do
    /// not abort the rest: they collapse into a single `ResumeFailed`
    /// notification and are never retried here. The reconciled snapshot
    /// is written back to storage, so resumed tunnels are persisted with
    /// their actual bound ports.
    pub async fn init(&self) -> Result<()> {
        self.storage.ready().await?;

        let Some(saved) = self.storage.load().await? else {
            debug!("no saved port-forwards");
            return Ok(());
        };
        if saved.is_empty() {
            return Ok(());
        }

        let (disabled, active): (Vec<_>, Vec<_>) = saved
            .into_iter()
            .partition(|d| d.status == ForwardStatus::Disabled);

        for descriptor in &disabled {
            self.add(descriptor).await?;
        }

        let total = active.len();
        let results = join_all(active.iter().map(|descriptor| self.add(descriptor))).await;
        let failed = results
            .iter()
            .filter(|r| !matches!(r, Ok(item) if item.status == ForwardStatus::Active))
            .count();

        if failed > 0 {
            warn!(failed, total, "some saved port-forwards could not be started");
            self.pending_notifications
                .write()
                .push(ForwardNotification::ResumeFailed { failed, total });
        }

        // Resumed tunnels carry their actual bound ports now; write the
        // reconciled snapshot back.
        self.load_all().await?;
        Ok(())
    }

    /// Registers every saved tunnel in memory without starting any of them.
    ///
    /// For short-lived callers that operate on tunnels whose lifetime is
    /// owned by the backend; `init` is the resume-at-startup path.
    pub async fn restore(&self) -> Result<()> {
        self.storage.ready().await?;

        let Some(saved) = self.storage.load().await? else {
            return Ok(());
        };

        let mut items = self.items.write();
        for descriptor in &saved {
            let target = descriptor.target();
            if !items.iter().any(|i| target.matches(i)) {
                items.push(PortForwardItem::from(descriptor));
            }
        }
        Ok(())
    }

    // =========================================================================
    // Lifecycle operations
    // =========================================================================

    /// Registers a tunnel, starting it when its (defaulted) status is active.
    ///
    /// `add` is idempotent per identity: when a tunnel with the same
    /// `(kind, namespace, name, port)` already exists, the existing item
    /// is returned unchanged and the incoming local port and protocol are
    /// discarded.
    pub async fn add(&self, descriptor: &PortForwardDescriptor) -> Result<PortForwardItem> {
        let target = descriptor.target();
        if let Some(existing) = self.find(&target) {
            debug!(id = %existing.id(), "port-forward already registered");
            return Ok(existing);
        }

        let item = PortForwardItem::from(descriptor);
        self.items.write().push(item.clone());

        if item.status == ForwardStatus::Active {
            return self.start(descriptor).await;
        }

        self.changed().await;
        Ok(item)
    }

    /// Starts a registered tunnel.
    ///
    /// A backend failure is not an error here: the item comes back
    /// `Disabled` and callers inspect its status, which keeps batch
    /// resumes meaningful. The port the backend reports is authoritative;
    /// a mismatch with the requested local port is logged and accepted.
    /// Starting an untracked tunnel is a caller bug and fails with
    /// `NotFound`.
    pub async fn start(&self, descriptor: &PortForwardDescriptor) -> Result<PortForwardItem> {
        let target = descriptor.target();
        let Some(mut item) = self.find(&target) else {
            return Err(ForwardError::NotFound(target.to_string()));
        };

        let requested = item.forward_port;
        match self.control.start_tunnel(&target, requested).await {
            Ok(bound) => {
                if requested != 0 && bound != requested {
                    warn!(
                        %target,
                        requested,
                        bound,
                        "tunnel bound to a different local port than requested"
                    );
                }
                item.forward_port = bound;
                item.status = ForwardStatus::Active;
                info!(%target, port = bound, "port-forward started");
            }
            Err(err) => {
                warn!(%target, %err, "failed to start port-forward");
                item.status = ForwardStatus::Disabled;
            }
        }

        self.replace(item.clone());
        self.changed().await;
        Ok(item)
    }

    /// Stops a tunnel and waits until its local port is released.
    ///
    /// Stopping an untracked tunnel is a no-op. Failures propagate: the
    /// caller needs to distinguish "confirmed stopped" from "unknown".
    pub async fn stop(&self, descriptor: &PortForwardDescriptor) -> Result<()> {
        let target = descriptor.target();
        let Some(mut item) = self.find(&target) else {
            warn!(%target, "stop requested for untracked port-forward");
            return Ok(());
        };

        let result = match self.control.stop_tunnel(&target, item.forward_port).await {
            Ok(()) => {
                net::wait_until_free(item.forward_port, PORT_RELEASE_POLL, PORT_RELEASE_TIMEOUT)
                    .await
            }
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            warn!(%target, %err, "failed to stop port-forward");
            return Err(err);
        }

        item.status = ForwardStatus::Disabled;
        self.replace(item);
        self.changed().await;
        info!(%target, "port-forward stopped");
        Ok(())
    }

    /// Moves a tunnel to a new local port.
    ///
    /// An active tunnel is stopped (best-effort: a failed stop is assumed
    /// already down), updated, and restarted; the returned item is the
    /// restart's outcome and may come back `Disabled`. A disabled tunnel
    /// only has its local port updated and no start is attempted.
    pub async fn modify(
        &self,
        descriptor: &PortForwardDescriptor,
        desired_port: u16,
        protocol: Option<ForwardProtocol>,
    ) -> Result<PortForwardItem> {
        let target = descriptor.target();
        let Some(mut item) = self.find(&target) else {
            return Err(ForwardError::NotFound(target.to_string()));
        };

        if item.status == ForwardStatus::Active {
            if let Err(err) = self.stop(descriptor).await {
                warn!(%target, %err, "stop before modify failed, assuming tunnel is down");
            }
            // Stop rewrites the item on success; re-read before updating.
            let mut item = self
                .find(&target)
                .ok_or_else(|| ForwardError::NotFound(target.to_string()))?;
            item.forward_port = desired_port;
            if let Some(protocol) = protocol {
                item.protocol = protocol;
            }
            self.replace(item);
            self.changed().await;
            return self.start(descriptor).await;
        }

        item.forward_port = desired_port;
        self.replace(item.clone());
        self.changed().await;
        Ok(item)
    }

    /// Stops (best-effort) and forgets a tunnel.
    ///
    /// Removal from the collection is unconditional; only the underlying
    /// teardown can fail, and an already-disabled tunnel failing to stop
    /// is expected.
    pub async fn remove(&self, descriptor: &PortForwardDescriptor) -> Result<()> {
        let target = descriptor.target();
        let Some(item) = self.find(&target) else {
            warn!(%target, "remove requested for untracked port-forward");
            return Ok(());
        };

        let was_active = item.status == ForwardStatus::Active;
        if let Err(err) = self.stop(descriptor).await {
            if was_active {
                warn!(%target, %err, "could not confirm tunnel teardown, removing anyway");
            }
        }

        self.items.write().retain(|i| !target.matches(i));
        self.changed().await;
        info!(%target, "port-forward removed");
        Ok(())
    }

    /// Queries the live state of a tracked tunnel.
    ///
    /// Returns `None` when the backend reports no active tunnel or the
    /// query itself fails; "not running" is a state, not an error. A
    /// bound port differing from the tracked one is logged and returned
    /// as-is.
    pub async fn get_port_forward(
        &self,
        descriptor: &PortForwardDescriptor,
    ) -> Result<Option<PortForwardItem>> {
        let target = descriptor.target();
        let Some(item) = self.find(&target) else {
            return Err(ForwardError::NotFound(target.to_string()));
        };

        match self.control.query_tunnel(&target, item.forward_port).await {
            Ok(Some(port)) => {
                if port != item.forward_port {
                    warn!(
                        %target,
                        tracked = item.forward_port,
                        live = port,
                        "tunnel bound port differs from tracked port"
                    );
                }
                let mut live = item;
                live.forward_port = port;
                Ok(Some(live))
            }
            Ok(None) => Ok(None),
            Err(err) => {
                warn!(%target, %err, "tunnel query failed");
                Ok(None)
            }
        }
    }

    // =========================================================================
    // Projection
    // =========================================================================

    /// Read-only snapshot of the tracked tunnels, in insertion order.
    pub fn items(&self) -> Vec<PortForwardItem> {
        self.items.read().clone()
    }

    /// Looks up a tunnel by its derived identifier.
    pub fn get_by_id(&self, id: &str) -> Option<PortForwardItem> {
        self.items.read().iter().find(|i| i.id() == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    // =========================================================================
    // Notifications
    // =========================================================================

    /// Drains pending user-facing notifications.
    pub fn take_notifications(&self) -> Vec<ForwardNotification> {
        std::mem::take(&mut *self.pending_notifications.write())
    }

    /// Checks if there are pending notifications.
    pub fn has_notifications(&self) -> bool {
        !self.pending_notifications.read().is_empty()
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Persists the current collection and rebuilds it from the snapshot.
    ///
    /// Write-through: memory is authoritative and storage follows.
    /// Changes that land while a save is in flight coalesce into one
    /// follow-up sync. Last write wins; there is no transactional
    /// guarantee across a crash between an in-memory mutation and this
    /// save.
    pub async fn load_all(&self) -> Result<()> {
        self.syncing.store(true, Ordering::SeqCst);
        let mut result = self.sync_snapshot().await;
        while result.is_ok() && self.dirty.swap(false, Ordering::SeqCst) {
            result = self.sync_snapshot().await;
        }
        self.syncing.store(false, Ordering::SeqCst);
        result
    }

    async fn sync_snapshot(&self) -> Result<()> {
        let snapshot: Vec<PortForwardDescriptor> = self
            .items
            .read()
            .iter()
            .map(PortForwardItem::to_descriptor)
            .collect();

        self.storage.save(&snapshot).await?;

        // Rebuild from the live collection, not the saved snapshot: an
        // item may have been rewritten while the save was in flight.
        let mut items = self.items.write();
        let rebuilt: Vec<PortForwardItem> = items
            .iter()
            .map(|item| PortForwardItem::from(&item.to_descriptor()))
            .collect();
        *items = rebuilt;
        Ok(())
    }

    /// Starts write-through persistence of collection changes.
    ///
    /// Watches are reference-counted: persistence stays active while any
    /// handle is alive, and each handle detaches independently on drop.
    pub fn watch(&self) -> WatchHandle {
        self.watchers.fetch_add(1, Ordering::SeqCst);
        WatchHandle {
            watchers: Arc::clone(&self.watchers),
        }
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    fn find(&self, target: &ForwardTarget) -> Option<PortForwardItem> {
        self.items.read().iter().find(|i| target.matches(i)).cloned()
    }

    fn replace(&self, item: PortForwardItem) {
        let target = item.target();
        let mut items = self.items.write();
        if let Some(existing) = items.iter_mut().find(|i| target.matches(i)) {
            *existing = item;
        } else {
            items.push(item);
        }
    }

    /// Write-through hook, invoked after every collection mutation.
    async fn changed(&self) {
        if self.watchers.load(Ordering::SeqCst) == 0 {
            return;
        }
        if self.syncing.load(Ordering::SeqCst) {
            // A sync is in flight; mark it to run once more so this
            // change is not dropped.
            self.dirty.store(true, Ordering::SeqCst);
            return;
        }
        if let Err(err) = self.load_all().await {
            warn!(%err, "failed to persist port-forwards");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Mock control backend with scriptable outcomes and call counters.
    #[derive(Clone, Default)]
    struct MockControl {
        state: Arc<MockControlState>,
    }

    #[derive(Default)]
    struct MockControlState {
        /// Port returned by start; `None` makes start fail.
        start_port: RwLock<Option<u16>>,
        stop_fails: AtomicBool,
        /// Port reported by query; `None` means "not active".
        query_port: RwLock<Option<u16>>,
        query_fails: AtomicBool,
        start_calls: AtomicUsize,
        stop_calls: AtomicUsize,
        start_args: RwLock<Vec<(u16, u16)>>,
    }

    impl MockControl {
        fn start_returning(port: u16) -> Self {
            let control = Self::default();
            *control.state.start_port.write() = Some(port);
            control
        }

        fn start_failing() -> Self {
            Self::default()
        }

        fn set_stop_fails(&self, fails: bool) {
            self.state.stop_fails.store(fails, Ordering::SeqCst);
        }

        fn set_query_port(&self, port: Option<u16>) {
            *self.state.query_port.write() = port;
        }

        fn set_query_fails(&self, fails: bool) {
            self.state.query_fails.store(fails, Ordering::SeqCst);
        }

        fn start_calls(&self) -> usize {
            self.state.start_calls.load(Ordering::SeqCst)
        }

        fn stop_calls(&self) -> usize {
            self.state.stop_calls.load(Ordering::SeqCst)
        }
    }

    impl ControlApi for MockControl {
        async fn start_tunnel(&self, target: &ForwardTarget, forward_port: u16) -> Result<u16> {
            self.state.start_calls.fetch_add(1, Ordering::SeqCst);
            self.state.start_args.write().push((target.port, forward_port));
            match *self.state.start_port.read() {
                Some(port) => Ok(port),
                None => Err(ForwardError::Control("start refused".to_string())),
            }
        }

        async fn stop_tunnel(&self, _target: &ForwardTarget, _forward_port: u16) -> Result<()> {
            self.state.stop_calls.fetch_add(1, Ordering::SeqCst);
            if self.state.stop_fails.load(Ordering::SeqCst) {
                Err(ForwardError::Control("stop refused".to_string()))
            } else {
                Ok(())
            }
        }

        async fn query_tunnel(
            &self,
            _target: &ForwardTarget,
            _forward_port: u16,
        ) -> Result<Option<u16>> {
            if self.state.query_fails.load(Ordering::SeqCst) {
                Err(ForwardError::Control("query refused".to_string()))
            } else {
                Ok(*self.state.query_port.read())
            }
        }
    }

    /// Mock storage backed by memory.
    #[derive(Clone, Default)]
    struct MockStorage {
        state: Arc<MockStorageState>,
    }

    #[derive(Default)]
    struct MockStorageState {
        saved: RwLock<Option<Vec<PortForwardDescriptor>>>,
        save_calls: AtomicUsize,
    }

    impl MockStorage {
        fn containing(forwards: Vec<PortForwardDescriptor>) -> Self {
            let storage = Self::default();
            *storage.state.saved.write() = Some(forwards);
            storage
        }

        fn saved(&self) -> Option<Vec<PortForwardDescriptor>> {
            self.state.saved.read().clone()
        }

        fn save_calls(&self) -> usize {
            self.state.save_calls.load(Ordering::SeqCst)
        }
    }

    impl ForwardStorage for MockStorage {
        async fn ready(&self) -> Result<()> {
            Ok(())
        }

        async fn load(&self) -> Result<Option<Vec<PortForwardDescriptor>>> {
            Ok(self.state.saved.read().clone())
        }

        async fn save(&self, forwards: &[PortForwardDescriptor]) -> Result<()> {
            // Suspend once, as real file I/O does.
            tokio::task::yield_now().await;
            self.state.save_calls.fetch_add(1, Ordering::SeqCst);
            *self.state.saved.write() = Some(forwards.to_vec());
            Ok(())
        }
    }

    fn web_descriptor() -> PortForwardDescriptor {
        PortForwardDescriptor::new(
            "pod".to_string(),
            "default".to_string(),
            "web".to_string(),
            80,
            28391,
        )
    }

    #[tokio::test]
    async fn test_add_is_idempotent_per_identity() {
        let control = MockControl::start_returning(28391);
        let store = PortForwardStore::new(MockStorage::default(), control.clone());

        let first = store.add(&web_descriptor()).await.unwrap();

        // Same identity, different mutable fields: discarded.
        let mut duplicate = web_descriptor();
        duplicate.forward_port = 9999;
        duplicate.protocol = ForwardProtocol::Https;
        let second = store.add(&duplicate).await.unwrap();

        assert_eq!(second, first);
        assert_eq!(store.len(), 1);
        assert_eq!(control.start_calls(), 1);
    }

    #[tokio::test]
    async fn test_start_accepts_backend_port() {
        let control = MockControl::start_returning(9999);
        let store = PortForwardStore::new(MockStorage::default(), control);

        let item = store.add(&web_descriptor()).await.unwrap();

        assert_eq!(item.forward_port, 9999);
        assert_eq!(item.status, ForwardStatus::Active);
        assert_eq!(store.items()[0].forward_port, 9999);
    }

    #[tokio::test]
    async fn test_start_failure_resolves_disabled() {
        let store = PortForwardStore::new(MockStorage::default(), MockControl::start_failing());

        let item = store.add(&web_descriptor()).await.unwrap();

        assert_eq!(item.status, ForwardStatus::Disabled);
        assert_eq!(store.items()[0].status, ForwardStatus::Disabled);
    }

    #[tokio::test]
    async fn test_start_untracked_is_not_found() {
        let store = PortForwardStore::new(MockStorage::default(), MockControl::start_returning(1));

        let err = store.start(&web_descriptor()).await.unwrap_err();
        assert!(matches!(err, ForwardError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_stop_unknown_is_noop() {
        let store = PortForwardStore::new(MockStorage::default(), MockControl::default());

        store.stop(&web_descriptor()).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_stop_failure_propagates() {
        let control = MockControl::start_returning(28391);
        let store = PortForwardStore::new(MockStorage::default(), control.clone());
        store.add(&web_descriptor()).await.unwrap();

        control.set_stop_fails(true);
        let err = store.stop(&web_descriptor()).await.unwrap_err();
        assert!(matches!(err, ForwardError::Control(_)));

        // Status is only written back on confirmed stops.
        assert_eq!(store.items()[0].status, ForwardStatus::Active);
    }

    #[tokio::test]
    async fn test_stop_marks_disabled() {
        let control = MockControl::start_returning(28391);
        let store = PortForwardStore::new(MockStorage::default(), control);
        store.add(&web_descriptor()).await.unwrap();

        store.stop(&web_descriptor()).await.unwrap();
        assert_eq!(store.items()[0].status, ForwardStatus::Disabled);
    }

    #[tokio::test]
    async fn test_remove_clears_model_even_if_stop_fails() {
        let control = MockControl::start_returning(28391);
        let store = PortForwardStore::new(MockStorage::default(), control.clone());
        store.add(&web_descriptor()).await.unwrap();

        control.set_stop_fails(true);
        store.remove(&web_descriptor()).await.unwrap();

        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_remove_unknown_is_noop() {
        let store = PortForwardStore::new(MockStorage::default(), MockControl::default());
        store.remove(&web_descriptor()).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_modify_disabled_does_not_start() {
        let control = MockControl::default();
        let store = PortForwardStore::new(MockStorage::default(), control.clone());

        let mut descriptor = web_descriptor();
        descriptor.status = ForwardStatus::Disabled;
        store.add(&descriptor).await.unwrap();
        assert_eq!(control.start_calls(), 0);

        let item = store.modify(&descriptor, 31111, None).await.unwrap();

        assert_eq!(item.forward_port, 31111);
        assert_eq!(item.status, ForwardStatus::Disabled);
        assert_eq!(control.start_calls(), 0);
    }

    #[tokio::test]
    async fn test_modify_active_restarts_on_new_port() {
        let control = MockControl::start_returning(28391);
        let store = PortForwardStore::new(MockStorage::default(), control.clone());
        store.add(&web_descriptor()).await.unwrap();

        *control.state.start_port.write() = Some(31112);
        let item = store
            .modify(&web_descriptor(), 31112, Some(ForwardProtocol::Https))
            .await
            .unwrap();

        assert_eq!(item.forward_port, 31112);
        assert_eq!(item.protocol, ForwardProtocol::Https);
        assert_eq!(item.status, ForwardStatus::Active);
        assert_eq!(control.stop_calls(), 1);
        assert_eq!(control.start_calls(), 2);
    }

    #[tokio::test]
    async fn test_modify_active_swallows_stop_failure() {
        let control = MockControl::start_returning(28391);
        let store = PortForwardStore::new(MockStorage::default(), control.clone());
        store.add(&web_descriptor()).await.unwrap();

        control.set_stop_fails(true);
        *control.state.start_port.write() = Some(31113);
        let item = store.modify(&web_descriptor(), 31113, None).await.unwrap();

        assert_eq!(item.forward_port, 31113);
        assert_eq!(item.status, ForwardStatus::Active);
    }

    #[tokio::test]
    async fn test_modify_untracked_is_not_found() {
        let store = PortForwardStore::new(MockStorage::default(), MockControl::default());
        let err = store.modify(&web_descriptor(), 1, None).await.unwrap_err();
        assert!(matches!(err, ForwardError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_get_port_forward_returns_live_port() {
        let control = MockControl::start_returning(28391);
        let store = PortForwardStore::new(MockStorage::default(), control.clone());
        store.add(&web_descriptor()).await.unwrap();

        // Backend reports a drifted port: accepted, not written back.
        control.set_query_port(Some(9999));
        let live = store.get_port_forward(&web_descriptor()).await.unwrap();

        assert_eq!(live.unwrap().forward_port, 9999);
        assert_eq!(store.items()[0].forward_port, 28391);
    }

    #[tokio::test]
    async fn test_get_port_forward_maps_absent_and_failed_to_none() {
        let control = MockControl::start_returning(28391);
        let store = PortForwardStore::new(MockStorage::default(), control.clone());
        store.add(&web_descriptor()).await.unwrap();

        control.set_query_port(None);
        assert!(store.get_port_forward(&web_descriptor()).await.unwrap().is_none());

        control.set_query_fails(true);
        assert!(store.get_port_forward(&web_descriptor()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_port_forward_untracked_is_not_found() {
        let store = PortForwardStore::new(MockStorage::default(), MockControl::default());
        let err = store.get_port_forward(&web_descriptor()).await.unwrap_err();
        assert!(matches!(err, ForwardError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_get_by_id() {
        let control = MockControl::start_returning(28391);
        let store = PortForwardStore::new(MockStorage::default(), control);
        store.add(&web_descriptor()).await.unwrap();

        assert!(store.get_by_id("default-pod-web:80").is_some());
        assert!(store.get_by_id("default-pod-web:81").is_none());
    }

    #[tokio::test]
    async fn test_init_resumes_saved_active_forward() {
        let mut saved = web_descriptor();
        saved.forward_port = 8080;
        let storage = MockStorage::containing(vec![saved]);
        let control = MockControl::start_returning(8080);
        let store = PortForwardStore::new(storage, control.clone());

        store.init().await.unwrap();

        let items = store.items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].forward_port, 8080);
        assert_eq!(items[0].status, ForwardStatus::Active);
        assert_eq!(*control.state.start_args.read(), vec![(80, 8080)]);
        assert!(!store.has_notifications());
    }

    #[tokio::test]
    async fn test_init_failure_raises_single_aggregate_warning() {
        let storage = MockStorage::containing(vec![web_descriptor()]);
        let store = PortForwardStore::new(storage, MockControl::start_failing());

        store.init().await.unwrap();

        let items = store.items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].status, ForwardStatus::Disabled);

        let notifications = store.take_notifications();
        assert_eq!(
            notifications,
            vec![ForwardNotification::ResumeFailed {
                failed: 1,
                total: 1
            }]
        );
        assert!(!store.has_notifications());
    }

    #[tokio::test]
    async fn test_init_registers_disabled_without_start() {
        let mut saved = web_descriptor();
        saved.status = ForwardStatus::Disabled;
        let storage = MockStorage::containing(vec![saved]);
        let control = MockControl::default();
        let store = PortForwardStore::new(storage, control.clone());

        store.init().await.unwrap();

        assert_eq!(store.items()[0].status, ForwardStatus::Disabled);
        assert_eq!(control.start_calls(), 0);
        assert!(!store.has_notifications());
    }

    #[tokio::test]
    async fn test_init_treats_legacy_record_as_active() {
        // A record persisted before the status field existed.
        let legacy: PortForwardDescriptor = serde_json::from_str(
            r#"{"kind":"pod","namespace":"default","name":"web","port":80,"forwardPort":8080}"#,
        )
        .unwrap();
        let storage = MockStorage::containing(vec![legacy]);
        let control = MockControl::start_returning(8080);
        let store = PortForwardStore::new(storage, control.clone());

        store.init().await.unwrap();

        assert_eq!(control.start_calls(), 1);
        assert_eq!(store.items()[0].status, ForwardStatus::Active);
    }

    #[tokio::test]
    async fn test_init_persists_reconciled_snapshot() {
        let mut saved = web_descriptor();
        saved.forward_port = 0;
        let storage = MockStorage::containing(vec![saved]);
        let control = MockControl::start_returning(8080);
        let store = PortForwardStore::new(storage.clone(), control);

        store.init().await.unwrap();

        // No watcher: init itself writes the reconciled snapshot through,
        // so the record never stays at port 0 while Active.
        let saved = storage.saved().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].forward_port, 8080);
        assert_eq!(saved[0].status, ForwardStatus::Active);
    }

    #[tokio::test]
    async fn test_concurrent_resume_keeps_every_bound_port() {
        let mut web = web_descriptor();
        web.forward_port = 0;
        let db = PortForwardDescriptor::new(
            "service".to_string(),
            "default".to_string(),
            "db".to_string(),
            5432,
            0,
        );
        let storage = MockStorage::containing(vec![web, db]);
        let control = MockControl::start_returning(31999);
        let store = PortForwardStore::new(storage.clone(), control);

        // With a watcher alive, the first resumed tunnel's write-through
        // save is in flight while the second tunnel's start resolves; the
        // late change must survive in memory and reach storage.
        let _watch = store.watch();
        store.init().await.unwrap();

        let items = store.items();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.forward_port == 31999));

        let saved = storage.saved().unwrap();
        assert_eq!(saved.len(), 2);
        assert!(saved
            .iter()
            .all(|d| d.forward_port == 31999 && d.status == ForwardStatus::Active));
    }

    #[tokio::test]
    async fn test_init_with_empty_storage_does_nothing() {
        let control = MockControl::default();
        let store = PortForwardStore::new(MockStorage::default(), control.clone());

        store.init().await.unwrap();

        assert!(store.is_empty());
        assert_eq!(control.start_calls(), 0);
    }

    #[tokio::test]
    async fn test_watch_persists_changes() {
        let storage = MockStorage::default();
        let control = MockControl::start_returning(28391);
        let store = PortForwardStore::new(storage.clone(), control);

        let watch = store.watch();
        store.add(&web_descriptor()).await.unwrap();

        let saved = storage.saved().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].forward_port, 28391);
        assert_eq!(saved[0].status, ForwardStatus::Active);

        // Disposed watch detaches; further changes are not written through.
        drop(watch);
        let calls = storage.save_calls();
        store.remove(&web_descriptor()).await.unwrap();
        assert_eq!(storage.save_calls(), calls);
    }

    #[tokio::test]
    async fn test_watch_handles_compose() {
        let storage = MockStorage::default();
        let control = MockControl::start_returning(28391);
        let store = PortForwardStore::new(storage.clone(), control);

        let first = store.watch();
        let second = store.watch();
        drop(first);

        // One handle is still alive, so changes keep persisting.
        store.add(&web_descriptor()).await.unwrap();
        assert!(storage.saved().is_some());
        drop(second);
    }

    #[tokio::test]
    async fn test_load_all_writes_snapshot() {
        let storage = MockStorage::default();
        let control = MockControl::start_returning(28391);
        let store = PortForwardStore::new(storage.clone(), control);
        store.add(&web_descriptor()).await.unwrap();

        store.load_all().await.unwrap();

        let saved = storage.saved().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_restore_registers_without_starting() {
        let mut saved = web_descriptor();
        saved.forward_port = 8080;
        let storage = MockStorage::containing(vec![saved]);
        let control = MockControl::default();
        let store = PortForwardStore::new(storage, control.clone());

        store.restore().await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.items()[0].status, ForwardStatus::Active);
        assert_eq!(control.start_calls(), 0);
    }
}
