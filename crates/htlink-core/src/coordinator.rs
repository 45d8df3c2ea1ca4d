// ── Polling coordinator ──
//
// Owns the single device session and drives it through one cycle at a
// time: login, bulk reads, individual reads, logout, publish. Writes and
// clock operations go through the same session mutex, so nothing is ever
// interleaved on the wire.

use std::collections::{BTreeSet, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::{NaiveDateTime, Utc};
use htlink_proto::frame::MAX_PAYLOAD;
use htlink_proto::{Connector, DeviceClock, Session, TcpConnector};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, ParameterDescriptor, QueryClass};
use crate::config::CoordinatorConfig;
use crate::error::{CoreError, WriteRejection};
use crate::gate::{self, WriteGate};
use crate::health::{Health, HealthTracker};
use crate::store::{ParameterSnapshot, SnapshotBuilder, SnapshotStore, Validity};
use crate::stream::SnapshotStream;
use crate::value::ParamValue;

// ── Selection plan ───────────────────────────────────────────────────

/// Configuration resolved against the catalog: which descriptors to read
/// in the bulk phase and which one by one.
struct Plan {
    config: CoordinatorConfig,
    selected: Vec<String>,
    bulk: Vec<ParameterDescriptor>,
    individual: Vec<ParameterDescriptor>,
}

impl Plan {
    fn resolve(config: CoordinatorConfig, catalog: &Catalog) -> Self {
        let requested = if config.selected_params.is_empty() {
            catalog.default_selection()
        } else {
            config.selected_params.clone()
        };

        let mut seen = HashSet::new();
        let mut selected = Vec::new();
        let mut bulk = Vec::new();
        let mut individual = Vec::new();
        for id in requested {
            if !seen.insert(id.clone()) {
                continue;
            }
            let Some(desc) = catalog.get(&id) else {
                warn!(param = %id, "unknown parameter in selection, ignoring");
                continue;
            };
            match desc.class {
                QueryClass::Bulk => bulk.push(desc.clone()),
                QueryClass::Individual => individual.push(desc.clone()),
            }
            selected.push(id);
        }

        debug!(
            bulk = bulk.len(),
            individual = individual.len(),
            "selection partitioned"
        );
        Self {
            config,
            selected,
            bulk,
            individual,
        }
    }
}

// ── Coordinator ──────────────────────────────────────────────────────

struct Poller {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct Inner<C: Connector> {
    catalog: Arc<Catalog>,
    connector: C,
    plan: ArcSwap<Plan>,
    session: Mutex<Session<C>>,
    gate: WriteGate,
    store: SnapshotStore,
    health: HealthTracker,
    cycle_running: AtomicBool,
    cycles: AtomicU64,
    failing: StdMutex<BTreeSet<String>>,
    cancel: CancellationToken,
    poller: StdMutex<Option<Poller>>,
}

/// Handle to one device's polling coordinator. Cheap to clone.
pub struct Coordinator<C: Connector + Clone = TcpConnector> {
    inner: Arc<Inner<C>>,
}

impl<C: Connector + Clone> Clone for Coordinator<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Coordinator<TcpConnector> {
    /// Coordinator for the built-in catalog over plain TCP.
    pub fn new(config: CoordinatorConfig) -> Self {
        Self::from_parts(config, Catalog::builtin(), TcpConnector)
    }

    pub fn with_catalog(config: CoordinatorConfig, catalog: Arc<Catalog>) -> Self {
        Self::from_parts(config, catalog, TcpConnector)
    }
}

impl<C: Connector + Clone> Coordinator<C> {
    pub fn with_connector(config: CoordinatorConfig, connector: C) -> Self {
        Self::from_parts(config, Catalog::builtin(), connector)
    }

    /// Build a coordinator. No I/O happens until the first cycle; writes
    /// start disabled regardless of `config.write_enabled`.
    pub fn from_parts(config: CoordinatorConfig, catalog: Arc<Catalog>, connector: C) -> Self {
        let config = config.normalized();
        let session = Session::with_connector(config.transport(), connector.clone());
        let gate = WriteGate::new(config.write_enabled);
        let plan = Plan::resolve(config, &catalog);

        Self {
            inner: Arc::new(Inner {
                catalog,
                connector,
                plan: ArcSwap::from_pointee(plan),
                session: Mutex::new(session),
                gate,
                store: SnapshotStore::new(),
                health: HealthTracker::new(),
                cycle_running: AtomicBool::new(false),
                cycles: AtomicU64::new(0),
                failing: StdMutex::new(BTreeSet::new()),
                cancel: CancellationToken::new(),
                poller: StdMutex::new(None),
            }),
        }
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.inner.catalog
    }

    pub fn config(&self) -> CoordinatorConfig {
        self.inner.plan.load().config.clone()
    }

    /// Selected identifiers that exist in the catalog, in polling order.
    pub fn selected(&self) -> Vec<String> {
        self.inner.plan.load().selected.clone()
    }

    /// Latest published snapshot. Never blocks.
    pub fn snapshot(&self) -> Arc<ParameterSnapshot> {
        self.inner.store.load()
    }

    pub fn subscribe(&self) -> SnapshotStream {
        self.inner.store.subscribe()
    }

    pub fn health(&self) -> Health {
        self.inner.health.current()
    }

    pub fn subscribe_health(&self) -> watch::Receiver<Health> {
        self.inner.health.subscribe()
    }

    /// Parameters that were not fresh in the last published snapshot.
    pub fn failing_parameters(&self) -> Vec<String> {
        self.lock_failing().iter().cloned().collect()
    }

    // ── Polling ──────────────────────────────────────────────────────

    /// Run one cycle and publish its snapshot.
    ///
    /// Returns [`CoreError::CycleInProgress`] without doing anything if
    /// another cycle is still running. Connection and login failures
    /// leave the published snapshot untouched.
    pub async fn refresh(&self) -> Result<Arc<ParameterSnapshot>, CoreError> {
        if self.inner.cancel.is_cancelled() {
            return Err(CoreError::ShuttingDown);
        }
        let Some(_guard) = CycleGuard::acquire(&self.inner.cycle_running) else {
            debug!("cycle already in flight, skipping");
            return Err(CoreError::CycleInProgress);
        };
        self.abortable(self.run_cycle()).await
    }

    async fn run_cycle(&self) -> Result<Arc<ParameterSnapshot>, CoreError> {
        let plan = self.inner.plan.load_full();
        let cycle = self.inner.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        let started = tokio::time::Instant::now();

        let collected = {
            let mut session = self.inner.session.lock().await;
            let result = collect(&mut session, &plan, self.inner.store.load()).await;
            session.logout().await;
            result
        };

        match collected {
            Ok(builder) => {
                let snapshot = self.inner.store.publish(builder.finish(cycle));
                self.inner
                    .health
                    .record_success(snapshot.published_at.unwrap_or_else(Utc::now));
                self.track_failing(&snapshot);

                if !plan.selected.is_empty() && snapshot.fresh_count() == 0 {
                    warn!(cycle, "no data received from heat pump");
                }
                debug!(
                    cycle,
                    fresh = snapshot.fresh_count(),
                    total = snapshot.len(),
                    elapsed_ms = started.elapsed().as_millis(),
                    "snapshot published"
                );
                Ok(snapshot)
            }
            Err(err) => {
                warn!(cycle, error = %err, "polling cycle failed");
                self.inner
                    .health
                    .record_failure(&err.to_string(), plan.config.unavailable_after);
                Err(err)
            }
        }
    }

    fn track_failing(&self, snapshot: &ParameterSnapshot) {
        let now: BTreeSet<String> = snapshot.invalid_ids().map(str::to_owned).collect();
        let mut failing = self.lock_failing();
        for id in now.difference(&failing) {
            let validity = snapshot.get(id).map(|e| e.validity);
            warn!(param = %id, ?validity, "parameter not readable");
        }
        for id in failing.difference(&now) {
            info!(param = %id, "parameter readable again");
        }
        *failing = now;
    }

    /// Start the scheduled polling loop. The first cycle runs immediately.
    /// Returns `false` if polling is already running or the coordinator
    /// has been shut down.
    pub fn spawn_polling(&self) -> bool {
        if self.inner.cancel.is_cancelled() {
            return false;
        }
        let mut poller = self.lock_poller();
        if poller.is_some() {
            return false;
        }
        let interval = self.inner.plan.load().config.scan_interval;
        let cancel = self.inner.cancel.child_token();
        let handle = tokio::spawn(poll_task(self.clone(), interval, cancel.clone()));
        *poller = Some(Poller { cancel, handle });
        info!(interval_secs = interval.as_secs(), "polling started");
        true
    }

    pub fn is_polling(&self) -> bool {
        self.lock_poller().is_some()
    }

    fn stop_polling(&self) -> Option<JoinHandle<()>> {
        let poller = self.lock_poller().take()?;
        poller.cancel.cancel();
        Some(poller.handle)
    }

    /// Stop polling, abort any in-flight cycle or write and close the
    /// transport. Partial data from an aborted cycle is discarded.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        if let Some(handle) = self.stop_polling() {
            let _ = handle.await;
        }
        self.inner.session.lock().await.reset();
        info!("coordinator shut down");
    }

    /// Swap in a new configuration. Waits for the session to be free,
    /// closes it, rebuilds it for the new address and disables writes.
    pub async fn reconfigure(&self, config: CoordinatorConfig) {
        let config = config.normalized();
        let permitted = config.write_enabled;
        {
            let mut session = self.inner.session.lock().await;
            session.logout().await;
            *session = Session::with_connector(config.transport(), self.inner.connector.clone());
            self.inner
                .plan
                .store(Arc::new(Plan::resolve(config, &self.inner.catalog)));
            self.inner.gate.reset(permitted);
        }
        self.lock_failing().clear();

        if let Some(handle) = self.stop_polling() {
            handle.abort();
            self.spawn_polling();
        }
        info!("coordinator reconfigured");
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Explicit confirmation action for the write-enable flag.
    pub fn set_writes_enabled(&self, enabled: bool) -> Result<(), CoreError> {
        self.inner.gate.set_enabled(enabled)
    }

    pub fn writes_enabled(&self) -> bool {
        self.inner.gate.is_enabled()
    }

    pub fn writes_permitted(&self) -> bool {
        self.inner.gate.is_permitted()
    }

    /// Identifier, capability and value checks without the write flag.
    /// Lets callers reject bad input before asking for confirmation.
    pub fn validate_write(&self, id: &str, value: &ParamValue) -> Result<(), WriteRejection> {
        gate::validate(&self.inner.catalog, id, value).map(|_| ())
    }

    /// Write one parameter and return the value the device confirmed.
    ///
    /// All checks run before the session is touched. The published
    /// snapshot is not updated; the next cycle reads the value back.
    /// The write flag is checked first, so a disabled coordinator reports
    /// `WriteBlocked` even for an out-of-range value; use
    /// [`validate_write`](Self::validate_write) to check a value
    /// regardless of the flag.
    pub async fn request_write(&self, id: &str, value: ParamValue) -> Result<ParamValue, CoreError> {
        let approved = self.inner.gate.check(&self.inner.catalog, id, &value)?;
        let register = approved.descriptor.register();

        let applied = self
            .abortable(async {
                let mut session = self.inner.session.lock().await;
                // The flag may have been cleared while waiting for the session.
                if let Err(rejection) = self.inner.gate.ensure_enabled() {
                    return Err(CoreError::from(rejection));
                }
                let result = match session.ensure_logged_in().await {
                    Ok(()) => session.write(register, approved.raw).await,
                    Err(err) => Err(err),
                };
                session.logout().await;
                result.map_err(CoreError::from)
            })
            .await?;

        let confirmed = approved.descriptor.decode_raw(applied);
        info!(param = id, requested = %value, applied = %confirmed, "parameter written");
        Ok(confirmed)
    }

    // ── Device clock ─────────────────────────────────────────────────

    pub async fn device_time(&self) -> Result<DeviceClock, CoreError> {
        self.abortable(async {
            let mut session = self.inner.session.lock().await;
            let result = match session.ensure_logged_in().await {
                Ok(()) => session.read_clock().await,
                Err(err) => Err(err),
            };
            session.logout().await;
            result.map_err(CoreError::from)
        })
        .await
    }

    /// Set the device clock, defaulting to the host's local time.
    /// Subject to the write-enable flag.
    pub async fn set_device_time(
        &self,
        datetime: Option<NaiveDateTime>,
    ) -> Result<DeviceClock, CoreError> {
        self.inner.gate.ensure_enabled()?;
        let datetime = datetime.unwrap_or_else(|| chrono::Local::now().naive_local());

        let clock = self
            .abortable(async {
                let mut session = self.inner.session.lock().await;
                if let Err(rejection) = self.inner.gate.ensure_enabled() {
                    return Err(CoreError::from(rejection));
                }
                let result = match session.ensure_logged_in().await {
                    Ok(()) => session.set_clock(datetime).await,
                    Err(err) => Err(err),
                };
                session.logout().await;
                result.map_err(CoreError::from)
            })
            .await?;

        info!(datetime = %clock.datetime, "device clock set");
        Ok(clock)
    }

    // ── Helpers ──────────────────────────────────────────────────────

    async fn abortable<T>(
        &self,
        fut: impl Future<Output = Result<T, CoreError>>,
    ) -> Result<T, CoreError> {
        tokio::select! {
            biased;
            () = self.inner.cancel.cancelled() => {
                debug!("operation aborted by shutdown");
                Err(CoreError::ShuttingDown)
            }
            result = fut => result,
        }
    }

    fn lock_failing(&self) -> MutexGuard<'_, BTreeSet<String>> {
        self.inner
            .failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_poller(&self) -> MutexGuard<'_, Option<Poller>> {
        self.inner
            .poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the in-flight flag when the cycle ends, including on abort.
struct CycleGuard<'a>(&'a AtomicBool);

impl<'a> CycleGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ── Cycle steps ──────────────────────────────────────────────────────

async fn collect<C: Connector>(
    session: &mut Session<C>,
    plan: &Plan,
    previous: Arc<ParameterSnapshot>,
) -> Result<SnapshotBuilder, CoreError> {
    session.ensure_logged_in().await?;
    let mut builder = SnapshotBuilder::new(previous, Utc::now());

    for batch in bulk_batches(&plan.bulk, plan.config.bulk_batch_size) {
        let numbers: Vec<u16> = batch.iter().map(|d| d.number).collect();
        match session.bulk_read(&numbers).await {
            Ok(values) => {
                for desc in batch {
                    match values.get(&desc.number) {
                        Some(&raw) => builder.fresh(&desc.id, desc.decode_raw(raw)),
                        None => builder.invalid(&desc.id, Validity::NotReported),
                    }
                }
            }
            Err(err) if err.is_session_fault() => return Err(err.into()),
            Err(err) => {
                warn!(
                    error = %err,
                    count = batch.len(),
                    "bulk read rejected, reading parameters one by one"
                );
                for desc in batch {
                    read_one(session, desc, &mut builder).await?;
                }
            }
        }
    }

    for desc in &plan.individual {
        read_one(session, desc, &mut builder).await?;
    }
    Ok(builder)
}

/// Read a single parameter. Only a session-level fault is returned as an
/// error; anything else just invalidates this entry.
async fn read_one<C: Connector>(
    session: &mut Session<C>,
    desc: &ParameterDescriptor,
    builder: &mut SnapshotBuilder,
) -> Result<(), CoreError> {
    match session.read(desc.register()).await {
        Ok(raw) => builder.fresh(&desc.id, desc.decode_raw(raw)),
        Err(err) if err.is_session_fault() => return Err(err.into()),
        Err(err) => {
            debug!(param = %desc.id, error = %err, "read failed");
            builder.invalid(&desc.id, Validity::ReadFailed);
        }
    }
    Ok(())
}

/// Split bulk descriptors into requests of at most `max_count` numbers
/// whose payload still fits into one frame.
fn bulk_batches(descs: &[ParameterDescriptor], max_count: usize) -> Vec<&[ParameterDescriptor]> {
    const FRAME_OVERHEAD: usize = "MR;".len();

    let mut batches = Vec::new();
    let mut start = 0;
    let mut len = FRAME_OVERHEAD;
    for (i, desc) in descs.iter().enumerate() {
        let item = 1 + desc.number.to_string().len();
        if i > start && (i - start >= max_count || len + item > MAX_PAYLOAD) {
            batches.push(&descs[start..i]);
            start = i;
            len = FRAME_OVERHEAD;
        }
        len += item;
    }
    if start < descs.len() {
        batches.push(&descs[start..]);
    }
    batches
}

async fn poll_task<C: Connector + Clone>(
    coordinator: Coordinator<C>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                // Failures are logged by the cycle; the next tick retries.
                if let Err(CoreError::ShuttingDown) = coordinator.refresh().await {
                    break;
                }
            }
        }
    }
    debug!("polling loop stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::catalog::DataKind;

    fn bulk(id: &str, number: u16) -> ParameterDescriptor {
        ParameterDescriptor::new(id, id, QueryClass::Bulk, number, DataKind::Int)
    }

    #[test]
    fn batches_respect_count_limit() {
        let descs: Vec<_> = (0..40).map(|n| bulk(&format!("p{n}"), n)).collect();
        let batches = bulk_batches(&descs, 16);
        let sizes: Vec<_> = batches.iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![16, 16, 8]);
    }

    #[test]
    fn batches_respect_frame_size() {
        // Five-digit numbers take six bytes each; 42 of them fit into 255.
        let descs: Vec<_> = (0..100)
            .map(|n| bulk(&format!("p{n}"), 10_000 + n))
            .collect();
        let batches = bulk_batches(&descs, usize::MAX);
        for batch in &batches {
            let payload_len = 3 + batch.len() * 6;
            assert!(payload_len <= MAX_PAYLOAD, "batch of {} too long", batch.len());
        }
        assert_eq!(batches.iter().map(|b| b.len()).sum::<usize>(), 100);
        assert_eq!(batches[0].len(), 42);
    }

    #[test]
    fn empty_selection_makes_no_batches() {
        assert!(bulk_batches(&[], 16).is_empty());
    }

    #[test]
    fn plan_drops_unknown_and_duplicate_ids() {
        let catalog = Catalog::from_descriptors([bulk("a", 0), bulk("b", 1)]).unwrap();
        let config = CoordinatorConfig::new("hp").with_selected(["b", "zzz", "a", "b"]);
        let plan = Plan::resolve(config, &catalog);
        assert_eq!(plan.selected, vec!["b".to_owned(), "a".to_owned()]);
        assert_eq!(plan.bulk.len(), 2);
        assert!(plan.individual.is_empty());
    }

    #[test]
    fn empty_selection_uses_catalog_default() {
        let catalog = Catalog::from_descriptors([bulk("a", 0), bulk("b", 1)])
            .unwrap()
            .with_default_selection(["a"])
            .unwrap();
        let plan = Plan::resolve(CoordinatorConfig::new("hp"), &catalog);
        assert_eq!(plan.selected, vec!["a".to_owned()]);
    }
}
