use crate::config::AgentConfig;
use crate::error::StorageError;
use crate::session::get_or_create_session_id;
use crate::storage::KeyValueStore;
use crate::transport::Transport;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tl_core::types::{Attributes, EventKind, TrackRequest};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Result of one tracking call, used only for bookkeeping and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOutcome {
    Sent,
    /// Kept in the retry queue.
    Queued,
    /// Rejected, or the failure that tripped the breaker.
    Dropped,
    /// The breaker was already open; nothing was attempted.
    Disabled,
}

impl TrackOutcome {
    pub fn is_sent(self) -> bool {
        self == Self::Sent
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub delivered: usize,
    pub requeued: usize,
    pub dropped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Facts about the host that are merged into every event's attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientEnvironment {
    pub client_agent: String,
    pub screen: Option<Dimensions>,
    pub viewport: Option<Dimensions>,
    pub referrer: Option<String>,
}

impl Default for ClientEnvironment {
    fn default() -> Self {
        Self {
            client_agent: concat!("tally-agent/", env!("CARGO_PKG_VERSION")).to_string(),
            screen: None,
            viewport: None,
            referrer: None,
        }
    }
}

impl ClientEnvironment {
    fn merge_into(&self, attributes: &mut Attributes, now: DateTime<Utc>) {
        let mut put = |key: &str, value: Value| {
            attributes.entry(key.to_string()).or_insert(value);
        };
        put("userAgent", Value::String(self.client_agent.clone()));
        if let Some(screen) = self.screen {
            put("screenWidth", screen.width.into());
            put("screenHeight", screen.height.into());
        }
        if let Some(viewport) = self.viewport {
            put("viewportWidth", viewport.width.into());
            put("viewportHeight", viewport.height.into());
        }
        put(
            "timestamp",
            Value::String(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        if let Some(referrer) = &self.referrer {
            put("referrer", Value::String(referrer.clone()));
        }
    }
}

/// An event waiting in the retry queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedEvent {
    pub request: TrackRequest,
    pub queued_at: DateTime<Utc>,
}

/// Completion of a fire-and-forget tracking call. Dropping it is fine.
#[derive(Debug)]
pub struct TrackHandle(Option<JoinHandle<TrackOutcome>>);

impl TrackHandle {
    pub async fn outcome(self) -> TrackOutcome {
        match self.0 {
            Some(handle) => handle.await.unwrap_or(TrackOutcome::Dropped),
            None => TrackOutcome::Dropped,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Breaker {
    enabled: bool,
    failures: u32,
}

struct Inner {
    config: AgentConfig,
    transport: Arc<dyn Transport>,
    storage: Arc<dyn KeyValueStore>,
    environment: ClientEnvironment,
    session_id: String,
    current_page: Mutex<String>,
    breaker: Mutex<Breaker>,
    queue: Mutex<Vec<QueuedEvent>>,
    online: AtomicBool,
    flushing: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Client-side tracking agent.
///
/// Every public tracking call is fire-and-forget: it spawns onto the ambient
/// tokio runtime and returns at once. Delivery failures feed a consecutive
/// failure counter; reaching `failure_threshold` turns the agent off for the
/// rest of its life. Connectivity failures are queued and retried on the next
/// flush, rejected events are dropped.
///
/// Cloning is cheap and clones share all state.
#[derive(Clone)]
pub struct TrackingAgent {
    inner: Arc<Inner>,
}

impl TrackingAgent {
    pub fn new(
        config: AgentConfig,
        transport: Arc<dyn Transport>,
        storage: Arc<dyn KeyValueStore>,
        environment: ClientEnvironment,
    ) -> Self {
        let session_id = get_or_create_session_id(storage.as_ref(), &config.session_key);
        let queue = load_queue(storage.as_ref(), &config.queue_key).unwrap_or_else(|err| {
            tracing::debug!(error = %err, "persisted queue unreadable, starting empty");
            Vec::new()
        });
        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                storage,
                environment,
                session_id,
                current_page: Mutex::new("/".to_string()),
                breaker: Mutex::new(Breaker {
                    enabled: true,
                    failures: 0,
                }),
                queue: Mutex::new(queue),
                online: AtomicBool::new(true),
                flushing: AtomicBool::new(false),
            }),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    pub fn is_enabled(&self) -> bool {
        lock(&self.inner.breaker).enabled
    }

    pub fn failures(&self) -> u32 {
        lock(&self.inner.breaker).failures
    }

    pub fn is_online(&self) -> bool {
        self.inner.online.load(Ordering::Acquire)
    }

    pub fn pending(&self) -> usize {
        lock(&self.inner.queue).len()
    }

    pub fn current_page(&self) -> String {
        lock(&self.inner.current_page).clone()
    }

    pub fn set_current_page(&self, page_url: impl Into<String>) {
        *lock(&self.inner.current_page) = page_url.into();
    }

    pub fn track_page_view(&self, page_url: impl Into<String>) -> TrackHandle {
        let page_url = page_url.into();
        self.set_current_page(page_url.clone());
        self.track_event(EventKind::PageView, page_url, Attributes::new())
    }

    pub fn track_event(
        &self,
        kind: EventKind,
        page_url: impl Into<String>,
        attributes: Attributes,
    ) -> TrackHandle {
        let agent = self.clone();
        let page_url = page_url.into();
        self.spawn(async move { agent.send_event(kind, page_url, attributes).await })
    }

    /// Records a named user action against the current page.
    pub fn track_action(&self, action: &str, data: Attributes) -> TrackHandle {
        let mut attributes = data;
        attributes.insert("action".to_string(), Value::String(action.to_string()));
        self.track_event(EventKind::Action, self.current_page(), attributes)
    }

    pub fn track_login(&self, page_url: impl Into<String>) -> TrackHandle {
        self.track_event(EventKind::Login, page_url, Attributes::new())
    }

    pub fn track_logout(&self, page_url: impl Into<String>) -> TrackHandle {
        self.track_event(EventKind::Logout, page_url, Attributes::new())
    }

    pub fn track_registration(&self, page_url: impl Into<String>) -> TrackHandle {
        self.track_event(EventKind::Registration, page_url, Attributes::new())
    }

    /// The tracking algorithm behind every `track_*` call, awaitable.
    pub async fn send_event(
        &self,
        kind: EventKind,
        page_url: String,
        attributes: Attributes,
    ) -> TrackOutcome {
        if !self.is_enabled() {
            return TrackOutcome::Disabled;
        }
        let request = self.build_request(kind, page_url, attributes);

        if !self.is_online() {
            self.enqueue(request);
            return TrackOutcome::Queued;
        }

        match self.inner.transport.deliver(&request).await {
            Ok(()) => {
                self.record_success();
                TrackOutcome::Sent
            }
            Err(err) => {
                tracing::debug!(error = %err, kind = %kind, "event delivery failed");
                let disabled = self.record_failure();
                if err.is_connectivity() && !disabled {
                    self.enqueue(request);
                    TrackOutcome::Queued
                } else {
                    TrackOutcome::Dropped
                }
            }
        }
    }

    /// Retries every queued event once. Connectivity failures stay queued,
    /// anything else is dropped. A flush already in progress makes this a
    /// no-op.
    pub async fn flush(&self) -> FlushReport {
        let mut report = FlushReport::default();
        if !self.is_enabled() || !self.is_online() {
            return report;
        }
        let Some(_guard) = FlushGuard::acquire(&self.inner.flushing) else {
            return report;
        };

        // Entries stay queued (and persisted) until delivered or dropped.
        // Only a flush removes entries and new ones are appended at the end,
        // so the entry under delivery always sits at index `kept`.
        let batch = lock(&self.inner.queue).clone();
        let mut kept = 0;
        for entry in batch {
            if !self.is_enabled() {
                break;
            }
            match self.inner.transport.deliver(&entry.request).await {
                Ok(()) => {
                    self.record_success();
                    report.delivered += 1;
                    self.remove_queued(kept);
                }
                Err(err) if err.is_connectivity() => {
                    tracing::debug!(error = %err, "queued event still undeliverable");
                    self.record_failure();
                    report.requeued += 1;
                    kept += 1;
                }
                Err(err) => {
                    tracing::debug!(error = %err, "queued event rejected, dropping");
                    self.record_failure();
                    report.dropped += 1;
                    self.remove_queued(kept);
                }
            }
        }
        report
    }

    /// Updates the connectivity belief. Going back online starts a flush.
    pub fn set_online(&self, online: bool) {
        if self.mark_online(online) {
            let agent = self.clone();
            self.spawn(async move {
                agent.flush().await;
                TrackOutcome::Sent
            });
        }
    }

    /// Follows a connectivity signal until its sender is dropped.
    pub fn watch_connectivity(&self, mut signal: watch::Receiver<bool>) -> Option<JoinHandle<()>> {
        let agent = self.clone();
        let handle = Handle::try_current().ok()?;
        Some(handle.spawn(async move {
            loop {
                let online = *signal.borrow_and_update();
                if agent.mark_online(online) {
                    agent.flush().await;
                }
                if signal.changed().await.is_err() {
                    break;
                }
            }
        }))
    }

    fn mark_online(&self, online: bool) -> bool {
        let was_online = self.inner.online.swap(online, Ordering::AcqRel);
        online && !was_online
    }

    fn spawn<F>(&self, task: F) -> TrackHandle
    where
        F: Future<Output = TrackOutcome> + Send + 'static,
    {
        match Handle::try_current() {
            Ok(handle) => TrackHandle(Some(handle.spawn(task))),
            Err(_) => {
                tracing::debug!("no runtime available, tracking call dropped");
                TrackHandle(None)
            }
        }
    }

    fn build_request(&self, kind: EventKind, page_url: String, mut attributes: Attributes) -> TrackRequest {
        self.inner.environment.merge_into(&mut attributes, Utc::now());
        TrackRequest::new(kind, page_url, self.inner.session_id.clone()).with_data(attributes)
    }

    fn record_success(&self) {
        lock(&self.inner.breaker).failures = 0;
    }

    /// Returns true when the agent is now disabled.
    fn record_failure(&self) -> bool {
        let mut breaker = lock(&self.inner.breaker);
        breaker.failures += 1;
        if breaker.failures >= self.inner.config.failure_threshold && breaker.enabled {
            breaker.enabled = false;
            tracing::debug!(failures = breaker.failures, "tracking disabled after repeated failures");
        }
        !breaker.enabled
    }

    fn enqueue(&self, request: TrackRequest) {
        let mut queue = lock(&self.inner.queue);
        queue.push(QueuedEvent {
            request,
            queued_at: Utc::now(),
        });
        self.persist(&queue);
    }

    fn remove_queued(&self, index: usize) {
        let mut queue = lock(&self.inner.queue);
        if index < queue.len() {
            queue.remove(index);
        }
        self.persist(&queue);
    }

    fn persist(&self, queue: &[QueuedEvent]) {
        if let Err(err) = save_queue(
            self.inner.storage.as_ref(),
            &self.inner.config.queue_key,
            queue,
        ) {
            tracing::debug!(error = %err, "retry queue kept in memory only");
        }
    }
}

struct FlushGuard<'a>(&'a AtomicBool);

impl<'a> FlushGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        (!flag.swap(true, Ordering::AcqRel)).then_some(Self(flag))
    }
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub fn load_queue(storage: &dyn KeyValueStore, key: &str) -> Result<Vec<QueuedEvent>, StorageError> {
    match storage.get(key)? {
        Some(raw) => serde_json::from_str(&raw).map_err(|err| StorageError::Decode {
            message: err.to_string(),
        }),
        None => Ok(Vec::new()),
    }
}

pub fn save_queue(storage: &dyn KeyValueStore, key: &str, queue: &[QueuedEvent]) -> Result<(), StorageError> {
    if queue.is_empty() {
        return storage.remove(key);
    }
    let raw = serde_json::to_string(queue).map_err(|err| StorageError::Encode {
        message: err.to_string(),
    })?;
    storage.set(key, &raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeliveryError;
    use crate::storage::MemoryStore;
    use futures::future::BoxFuture;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<(), DeliveryError>>>,
        delivered: Mutex<Vec<TrackRequest>>,
        calls: AtomicUsize,
    }

    impl ScriptedTransport {
        fn then(self, result: Result<(), DeliveryError>) -> Self {
            lock(&self.script).push_back(result);
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn delivered_pages(&self) -> Vec<String> {
            lock(&self.delivered)
                .iter()
                .filter_map(|request| request.page_url.clone())
                .collect()
        }
    }

    impl Transport for ScriptedTransport {
        fn deliver<'a>(&'a self, request: &'a TrackRequest) -> BoxFuture<'a, Result<(), DeliveryError>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                let result = lock(&self.script).pop_front().unwrap_or(Ok(()));
                if result.is_ok() {
                    lock(&self.delivered).push(request.clone());
                }
                result
            })
        }
    }

    fn offline() -> Result<(), DeliveryError> {
        Err(DeliveryError::Connectivity {
            message: "connection refused".to_string(),
        })
    }

    fn rejected() -> Result<(), DeliveryError> {
        Err(DeliveryError::Rejected {
            message: "server answered 400".to_string(),
        })
    }

    fn agent_with(transport: Arc<ScriptedTransport>, storage: Arc<MemoryStore>) -> TrackingAgent {
        TrackingAgent::new(
            AgentConfig::new("http://analytics.test/analytics/track"),
            transport,
            storage,
            ClientEnvironment::default(),
        )
    }

    #[tokio::test]
    async fn three_connectivity_failures_disable_the_agent() {
        let transport = Arc::new(
            ScriptedTransport::default()
                .then(offline())
                .then(offline())
                .then(offline()),
        );
        let agent = agent_with(transport.clone(), Arc::new(MemoryStore::new()));

        assert_eq!(agent.track_page_view("/a").outcome().await, TrackOutcome::Queued);
        assert_eq!(agent.track_page_view("/b").outcome().await, TrackOutcome::Queued);
        assert_eq!(agent.track_page_view("/c").outcome().await, TrackOutcome::Dropped);
        assert!(!agent.is_enabled());

        assert_eq!(agent.track_page_view("/d").outcome().await, TrackOutcome::Disabled);
        assert_eq!(transport.calls(), 3);
        assert_eq!(agent.pending(), 2);
    }

    #[tokio::test]
    async fn success_resets_the_failure_count() {
        let transport = Arc::new(
            ScriptedTransport::default()
                .then(offline())
                .then(offline())
                .then(Ok(()))
                .then(offline())
                .then(offline()),
        );
        let agent = agent_with(transport.clone(), Arc::new(MemoryStore::new()));
        for page in ["/1", "/2", "/3", "/4", "/5"] {
            agent.track_page_view(page).outcome().await;
        }
        assert!(agent.is_enabled());
        assert_eq!(agent.failures(), 2);
    }

    #[tokio::test]
    async fn rejected_events_are_not_queued() {
        let transport = Arc::new(ScriptedTransport::default().then(rejected()));
        let agent = agent_with(transport, Arc::new(MemoryStore::new()));
        assert_eq!(agent.track_page_view("/bad").outcome().await, TrackOutcome::Dropped);
        assert_eq!(agent.pending(), 0);
        assert_eq!(agent.failures(), 1);
    }

    #[tokio::test]
    async fn queued_event_is_delivered_once_and_leaves_storage() {
        let storage = Arc::new(MemoryStore::new());
        let transport = Arc::new(ScriptedTransport::default().then(offline()));
        let agent = agent_with(transport.clone(), storage.clone());

        assert_eq!(agent.track_page_view("/later").outcome().await, TrackOutcome::Queued);
        let persisted = load_queue(&*storage, &agent.inner.config.queue_key).unwrap();
        assert_eq!(persisted.len(), 1);

        let report = agent.flush().await;
        assert_eq!(report.delivered, 1);
        assert_eq!(agent.pending(), 0);
        assert!(storage.get(&agent.inner.config.queue_key).unwrap().is_none());

        agent.flush().await;
        assert_eq!(transport.delivered_pages(), vec!["/later".to_string()]);
    }

    #[tokio::test]
    async fn flush_requeues_connectivity_and_drops_rejections() {
        let transport = Arc::new(
            ScriptedTransport::default()
                .then(offline())
                .then(offline())
                .then(offline())
                .then(rejected()),
        );
        let agent = TrackingAgent::new(
            AgentConfig::new("http://analytics.test").with_failure_threshold(10),
            transport.clone(),
            Arc::new(MemoryStore::new()),
            ClientEnvironment::default(),
        );
        agent.track_page_view("/a").outcome().await;
        agent.track_page_view("/b").outcome().await;
        assert_eq!(agent.pending(), 2);

        let report = agent.flush().await;
        assert_eq!(
            report,
            FlushReport {
                delivered: 0,
                requeued: 1,
                dropped: 1,
            }
        );
        assert_eq!(agent.pending(), 1);
    }

    #[tokio::test]
    async fn offline_agent_queues_without_a_network_call() {
        let transport = Arc::new(ScriptedTransport::default());
        let agent = agent_with(transport.clone(), Arc::new(MemoryStore::new()));
        agent.set_online(false);
        assert_eq!(agent.track_page_view("/a").outcome().await, TrackOutcome::Queued);
        assert_eq!(transport.calls(), 0);
        assert_eq!(agent.flush().await, FlushReport::default());
        assert_eq!(agent.pending(), 1);
    }

    #[tokio::test]
    async fn reconnecting_flushes_the_queue() {
        let transport = Arc::new(ScriptedTransport::default());
        let agent = agent_with(transport.clone(), Arc::new(MemoryStore::new()));
        let (tx, rx) = watch::channel(false);
        let watcher = agent.watch_connectivity(rx).unwrap();
        tokio::task::yield_now().await;
        while agent.is_online() {
            tokio::task::yield_now().await;
        }

        agent.track_page_view("/offline").outcome().await;
        assert_eq!(agent.pending(), 1);

        tx.send(true).unwrap();
        drop(tx);
        watcher.await.unwrap();
        assert_eq!(agent.pending(), 0);
        assert_eq!(transport.delivered_pages(), vec!["/offline".to_string()]);
    }

    #[tokio::test]
    async fn persisted_queue_survives_a_new_agent() {
        let storage = Arc::new(MemoryStore::new());
        let first = agent_with(
            Arc::new(ScriptedTransport::default().then(offline())),
            storage.clone(),
        );
        first.track_page_view("/kept").outcome().await;

        let transport = Arc::new(ScriptedTransport::default());
        let second = agent_with(transport.clone(), storage);
        assert_eq!(second.session_id(), first.session_id());
        assert_eq!(second.pending(), 1);
        second.flush().await;
        assert_eq!(transport.delivered_pages(), vec!["/kept".to_string()]);
    }

    #[tokio::test]
    async fn events_carry_session_and_environment() {
        let transport = Arc::new(ScriptedTransport::default());
        let agent = TrackingAgent::new(
            AgentConfig::new("http://analytics.test"),
            transport.clone(),
            Arc::new(MemoryStore::new()),
            ClientEnvironment {
                client_agent: "tally-test/2.0".to_string(),
                screen: Some(Dimensions {
                    width: 1920,
                    height: 1080,
                }),
                viewport: None,
                referrer: Some("https://ref.test/".to_string()),
            },
        );
        agent.set_current_page("/settings");
        let mut data = Attributes::new();
        data.insert("userAgent".to_string(), Value::String("caller".to_string()));
        agent.track_action("save", data).outcome().await;

        let request = lock(&transport.delivered)[0].clone();
        assert_eq!(request.page_url.as_deref(), Some("/settings"));
        assert_eq!(request.session_id.as_deref(), Some(agent.session_id()));
        assert_eq!(request.event_type.as_deref(), Some("action"));
        let attributes = request.event_data.unwrap();
        assert_eq!(attributes["action"], "save");
        assert_eq!(attributes["userAgent"], "caller");
        assert_eq!(attributes["screenWidth"], 1920);
        assert_eq!(attributes["referrer"], "https://ref.test/");
        assert!(attributes.contains_key("timestamp"));
        assert!(!attributes.contains_key("viewportWidth"));
    }

    #[test]
    fn tracking_without_a_runtime_is_a_silent_no_op() {
        let transport = Arc::new(ScriptedTransport::default());
        let agent = agent_with(transport.clone(), Arc::new(MemoryStore::new()));
        let handle = agent.track_page_view("/nowhere");
        assert!(handle.0.is_none());
        assert_eq!(transport.calls(), 0);
    }

    /// Holds every delivery until the test releases it; pages listed in
    /// `unreachable` fail at once with a connectivity error.
    struct GatedTransport {
        unreachable: Vec<&'static str>,
        started: tokio::sync::Notify,
        release: tokio::sync::Semaphore,
        delivered: Mutex<Vec<String>>,
    }

    impl GatedTransport {
        fn new(unreachable: Vec<&'static str>) -> Self {
            Self {
                unreachable,
                started: tokio::sync::Notify::new(),
                release: tokio::sync::Semaphore::new(0),
                delivered: Mutex::new(Vec::new()),
            }
        }
    }

    impl Transport for GatedTransport {
        fn deliver<'a>(&'a self, request: &'a TrackRequest) -> BoxFuture<'a, Result<(), DeliveryError>> {
            Box::pin(async move {
                let page = request.page_url.clone().unwrap_or_default();
                if self.unreachable.iter().any(|unreachable| *unreachable == page) {
                    return offline();
                }
                self.started.notify_one();
                self.release.acquire().await.unwrap().forget();
                lock(&self.delivered).push(page);
                Ok(())
            })
        }
    }

    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Unavailable {
                message: "quota exceeded".to_string(),
            })
        }

        fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable {
                message: "quota exceeded".to_string(),
            })
        }

        fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable {
                message: "quota exceeded".to_string(),
            })
        }
    }

    fn seed_queue(storage: &MemoryStore, pages: &[&str]) {
        let queue: Vec<QueuedEvent> = pages
            .iter()
            .map(|page| QueuedEvent {
                request: TrackRequest::new(EventKind::PageView, *page, "sess_seed"),
                queued_at: Utc::now(),
            })
            .collect();
        save_queue(storage, crate::config::DEFAULT_QUEUE_KEY, &queue).unwrap();
    }

    fn persisted_pages(storage: &MemoryStore) -> Vec<String> {
        load_queue(storage, crate::config::DEFAULT_QUEUE_KEY)
            .unwrap()
            .into_iter()
            .filter_map(|entry| entry.request.page_url)
            .collect()
    }

    #[tokio::test]
    async fn events_under_delivery_stay_persisted_while_others_queue() {
        let storage = Arc::new(MemoryStore::new());
        seed_queue(&storage, &["/queued"]);
        let transport = Arc::new(GatedTransport::new(vec!["/new"]));
        let agent = TrackingAgent::new(
            AgentConfig::new("http://analytics.test"),
            transport.clone(),
            storage.clone(),
            ClientEnvironment::default(),
        );

        let flushing = tokio::spawn({
            let agent = agent.clone();
            async move { agent.flush().await }
        });
        transport.started.notified().await;

        let outcome = agent
            .send_event(EventKind::PageView, "/new".to_string(), Attributes::new())
            .await;
        assert_eq!(outcome, TrackOutcome::Queued);
        assert_eq!(persisted_pages(&storage), vec!["/queued", "/new"]);

        transport.release.add_permits(1);
        let report = flushing.await.unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(persisted_pages(&storage), vec!["/new"]);
        assert_eq!(agent.pending(), 1);
    }

    #[tokio::test]
    async fn overlapping_flushes_deliver_each_event_once() {
        let storage = Arc::new(MemoryStore::new());
        seed_queue(&storage, &["/one", "/two"]);
        let transport = Arc::new(GatedTransport::new(Vec::new()));
        let agent = TrackingAgent::new(
            AgentConfig::new("http://analytics.test"),
            transport.clone(),
            storage.clone(),
            ClientEnvironment::default(),
        );

        let first = tokio::spawn({
            let agent = agent.clone();
            async move { agent.flush().await }
        });
        transport.started.notified().await;

        assert_eq!(agent.flush().await, FlushReport::default());

        transport.release.add_permits(2);
        assert_eq!(first.await.unwrap().delivered, 2);
        assert_eq!(agent.flush().await, FlushReport::default());
        assert_eq!(*lock(&transport.delivered), vec!["/one", "/two"]);
        assert_eq!(agent.pending(), 0);
        assert!(persisted_pages(&storage).is_empty());
    }

    #[tokio::test]
    async fn failing_storage_keeps_the_queue_in_memory() {
        let transport = Arc::new(ScriptedTransport::default().then(offline()));
        let agent = TrackingAgent::new(
            AgentConfig::new("http://analytics.test"),
            transport.clone(),
            Arc::new(BrokenStore),
            ClientEnvironment::default(),
        );
        assert!(!agent.session_id().is_empty());

        assert_eq!(agent.track_page_view("/kept").outcome().await, TrackOutcome::Queued);
        assert_eq!(agent.pending(), 1);

        let report = agent.flush().await;
        assert_eq!(report.delivered, 1);
        assert_eq!(agent.pending(), 0);
        assert_eq!(transport.delivered_pages(), vec!["/kept".to_string()]);
    }
}
