//! Resource coverage tracking.
//!
//! A [`ResourceCoverageTracker`] owns one coverage session for one resource
//! kind. The lifecycle is written once here; what differs between scripts
//! and stylesheets (which commands to send, how to read registrations and
//! usage snapshots) comes from a [`CoverageKind`] strategy.
//!
//! ```text
//!   Idle ──start──► Enabled ──stop──► Idle
//!                     │  ▲
//!     registration ───┘  └── context reset (clears cache)
//! ```
//!
//! While enabled, one pump task consumes registration and reset events in
//! the order the target sent them. Each registration spawns its own source
//! fetch, so fetches overlap and may finish out of order.

mod cache;
mod script;
mod stylesheet;

pub use script::{anonymous_script_url, is_injected_script_url, ScriptKind, INJECTED_SCRIPT_SCHEME};
pub use stylesheet::StyleSheetKind;

use crate::cdp_coverage::UsageMap;
use crate::merge::convert_to_disjoint_ranges;
use crate::protocol::{methods, EventSubscription, ProtocolCommand, ProtocolEvent, ProtocolSession};
use crate::resource::{CoverageEntry, ResourceId, ResourceRecord};
use crate::result::{CoverageError, CoverageResult};
use cache::ResourceCache;
use futures::future::try_join_all;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A registration that passed the kind's filters and awaits its source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingResource {
    /// Target-assigned id
    pub id: ResourceId,
    /// URL to report for the resource
    pub url: String,
}

/// What a resource kind contributes to the shared tracker lifecycle
pub trait CoverageKind: Send + Sync + 'static {
    /// Short name used in errors and logs
    const LABEL: &'static str;

    /// Event announcing a new resource
    const REGISTRATION_EVENT: &'static str;

    /// Whether a context reset clears the cache
    fn reset_on_navigation(&self) -> bool;

    /// Commands that turn instrumentation on; sent concurrently
    fn enable_commands(&self) -> Vec<ProtocolCommand>;

    /// Command whose response carries the usage snapshot
    fn collect_command(&self) -> ProtocolCommand;

    /// Commands that turn instrumentation off; sent alongside the collect command
    fn disable_commands(&self) -> Vec<ProtocolCommand>;

    /// Filter and name a registration; `None` skips the resource
    fn admit(&self, params: &Value) -> CoverageResult<Option<PendingResource>>;

    /// Command fetching one resource's source text
    fn fetch_command(&self, id: &ResourceId) -> ProtocolCommand;

    /// Read the source text out of the fetch response
    fn source_text(&self, response: Value) -> CoverageResult<String>;

    /// Group the usage snapshot by resource
    fn extract_usage(&self, snapshot: Value) -> CoverageResult<UsageMap>;
}

/// Subscriptions and pump of one enabled session.
///
/// Dropping it releases everything, so early returns in `start`/`stop`
/// never leak listeners.
#[derive(Debug, Default)]
struct Attachment {
    subscriptions: Vec<EventSubscription>,
    pump: Option<JoinHandle<()>>,
}

impl Attachment {
    fn detach(mut self) {
        self.release();
    }

    fn release(&mut self) {
        for subscription in self.subscriptions.drain(..) {
            subscription.release();
        }
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

impl Drop for Attachment {
    fn drop(&mut self) {
        self.release();
    }
}

struct ActiveSession<K> {
    kind: Arc<K>,
    attachment: Attachment,
}

/// Shared by the pump and fetch tasks of one session
struct TaskContext<K> {
    kind: Arc<K>,
    session: Arc<dyn ProtocolSession>,
    cache: Arc<Mutex<ResourceCache>>,
}

impl<K> Clone for TaskContext<K> {
    fn clone(&self) -> Self {
        Self {
            kind: Arc::clone(&self.kind),
            session: Arc::clone(&self.session),
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<K: CoverageKind> TaskContext<K> {
    async fn pump(self, mut events: mpsc::UnboundedReceiver<ProtocolEvent>) {
        while let Some(event) = events.recv().await {
            if event.method == methods::EVENT_EXECUTION_CONTEXTS_CLEARED {
                self.on_context_reset().await;
            } else {
                self.on_registration(&event.params).await;
            }
        }
        debug!(kind = K::LABEL, "event stream closed");
    }

    async fn on_context_reset(&self) {
        if self.kind.reset_on_navigation() && self.cache.lock().await.reset() {
            debug!(kind = K::LABEL, "execution contexts cleared, cache reset");
        }
    }

    async fn on_registration(&self, params: &Value) {
        let pending = match self.kind.admit(params) {
            Ok(Some(pending)) => pending,
            Ok(None) => return,
            Err(e) => {
                warn!(kind = K::LABEL, "skipping registration: {e}");
                return;
            }
        };
        let Some(generation) = self.cache.lock().await.accepting_generation() else {
            return;
        };
        let ctx = self.clone();
        tokio::spawn(async move { ctx.fetch(pending, generation).await });
    }

    async fn fetch(self, pending: PendingResource, generation: u64) {
        let command = self.kind.fetch_command(&pending.id);
        let text = match self.session.send_command(command).await {
            Ok(response) => self.kind.source_text(response),
            Err(e) => Err(e),
        };
        let text = match text {
            Ok(text) => text,
            Err(e) => {
                let err = CoverageError::ResourceFetch {
                    resource_id: pending.id.to_string(),
                    message: e.to_string(),
                };
                warn!(kind = K::LABEL, url = %pending.url, "{err}");
                return;
            }
        };
        let record = ResourceRecord {
            id: pending.id,
            url: pending.url,
            source_text: text,
        };
        let id = record.id.clone();
        if !self.cache.lock().await.insert(generation, record) {
            debug!(kind = K::LABEL, resource = %id, "discarding source fetched for a previous cache");
        }
    }
}

/// Coverage session for one resource kind
pub struct ResourceCoverageTracker<K: CoverageKind> {
    session: Arc<dyn ProtocolSession>,
    cache: Arc<Mutex<ResourceCache>>,
    active: Option<ActiveSession<K>>,
}

impl<K: CoverageKind> ResourceCoverageTracker<K> {
    /// Create an idle tracker on `session`
    #[must_use]
    pub fn new(session: Arc<dyn ProtocolSession>) -> Self {
        Self {
            session,
            cache: Arc::new(Mutex::new(ResourceCache::default())),
            active: None,
        }
    }

    /// Whether a session is running
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.active.is_some()
    }

    /// The configured kind of the running session
    #[must_use]
    pub fn kind(&self) -> Option<&K> {
        self.active.as_ref().map(|a| a.kind.as_ref())
    }

    /// Number of resources whose source has been fetched so far
    pub async fn resource_count(&self) -> usize {
        self.cache.lock().await.len()
    }

    /// Start collecting.
    ///
    /// Fails with [`CoverageError::AlreadyEnabled`] when a session is running.
    /// A rejected enable command leaves the tracker idle with every
    /// subscription released; the target may still have some domains enabled.
    pub async fn start(&mut self, kind: K) -> CoverageResult<()> {
        if self.active.is_some() {
            return Err(CoverageError::AlreadyEnabled { kind: K::LABEL });
        }
        self.cache.lock().await.begin_session();

        // Both streams share one channel so resets stay ordered with registrations.
        let (sink, events) = mpsc::unbounded_channel();
        let mut attachment = Attachment::default();
        attachment
            .subscriptions
            .push(self.session.subscribe(K::REGISTRATION_EVENT, sink.clone())?);
        attachment.subscriptions.push(
            self.session
                .subscribe(methods::EVENT_EXECUTION_CONTEXTS_CLEARED, sink)?,
        );

        try_join_all(
            kind.enable_commands()
                .into_iter()
                .map(|command| self.session.send_command(command)),
        )
        .await?;

        self.cache.lock().await.open();
        let kind = Arc::new(kind);
        let ctx = TaskContext {
            kind: Arc::clone(&kind),
            session: Arc::clone(&self.session),
            cache: Arc::clone(&self.cache),
        };
        attachment.pump = Some(tokio::spawn(ctx.pump(events)));
        self.active = Some(ActiveSession { kind, attachment });
        debug!(kind = K::LABEL, "coverage enabled");
        Ok(())
    }

    /// Stop collecting and return one entry per cached resource.
    ///
    /// Fails with [`CoverageError::NotEnabled`] when idle. Resources whose
    /// source had not arrived yet are absent, and events arriving while
    /// stopping are ignored. The cache is wiped even when a teardown command
    /// fails.
    pub async fn stop(&mut self) -> CoverageResult<Vec<CoverageEntry>> {
        let Some(ActiveSession { kind, attachment }) = self.active.take() else {
            return Err(CoverageError::NotEnabled { kind: K::LABEL });
        };
        // No event is handled past this point.
        attachment.detach();
        self.cache.lock().await.close();

        let snapshot = self.collect(kind.as_ref()).await;
        let records = self.cache.lock().await.take_records();
        debug!(kind = K::LABEL, resources = records.len(), "coverage disabled");

        let usage = kind.extract_usage(snapshot?)?;
        Ok(build_entries(records, usage))
    }

    async fn collect(&self, kind: &K) -> CoverageResult<Value> {
        let snapshot = self.session.send_command(kind.collect_command());
        let teardown = try_join_all(
            kind.disable_commands()
                .into_iter()
                .map(|command| self.session.send_command(command)),
        );
        let (snapshot, _) = futures::try_join!(snapshot, teardown)?;
        Ok(snapshot)
    }
}

impl<K: CoverageKind> fmt::Debug for ResourceCoverageTracker<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceCoverageTracker")
            .field("kind", &K::LABEL)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

fn build_entries(records: Vec<ResourceRecord>, mut usage: UsageMap) -> Vec<CoverageEntry> {
    records
        .into_iter()
        .map(|record| {
            let resource = usage.remove(&record.id).unwrap_or_default();
            CoverageEntry {
                url: record.url,
                text: record.source_text,
                ranges: convert_to_disjoint_ranges(&resource.ranges),
                raw_script_coverage: resource.raw,
            }
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::cdp_coverage::ResourceUsage;
    use crate::merge::{DisjointRange, UsageRange};

    #[test]
    fn test_build_entries_joins_usage_by_id() {
        let records = vec![
            ResourceRecord {
                id: ResourceId::from("2"),
                url: "b.js".to_string(),
                source_text: "0123456789".to_string(),
            },
            ResourceRecord {
                id: ResourceId::from("1"),
                url: "a.js".to_string(),
                source_text: "abc".to_string(),
            },
        ];
        let mut usage = UsageMap::new();
        usage.insert(
            ResourceId::from("2"),
            ResourceUsage {
                ranges: vec![UsageRange::new(0, 10, 1), UsageRange::new(2, 5, 1)],
                raw: None,
            },
        );
        usage.insert(
            ResourceId::from("99"),
            ResourceUsage {
                ranges: vec![UsageRange::new(0, 1, 1)],
                raw: None,
            },
        );

        let entries = build_entries(records, usage);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].url, "b.js");
        assert_eq!(entries[0].ranges, vec![DisjointRange::new(0, 10)]);
        assert_eq!(entries[1].url, "a.js");
        assert!(entries[1].ranges.is_empty());
    }

    #[test]
    fn test_attachment_release_is_idempotent() {
        let mut attachment = Attachment::default();
        attachment.release();
        attachment.release();
        attachment.detach();
    }
}
