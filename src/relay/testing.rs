//! Mock implementations for testing
//!
//! Deterministic providers and a fault-injecting store so the relay and the
//! HTTP layer can be exercised without network access.

use super::traits::MessageStore;
use super::{Relay, RelaySettings};
use crate::db::{Database, DbError, Direction, Message, NewMessage};
use crate::llm::{CompletionProvider, CompletionRequest, LlmError};
use crate::messaging::error::DeliveryErrorKind;
use crate::messaging::{DeliveryError, DeliveryReceipt, MessagingProvider};
use async_trait::async_trait;
use axum::Router;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const SERVICE_NUMBER: &str = "+14155238886";

/// Serve `app` on an ephemeral local port and return its base URL
pub async fn spawn_stub_server(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

// ============================================================================
// Shared event log
// ============================================================================

/// Ordered record of side effects across store and providers
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

// ============================================================================
// Mock Completion Provider
// ============================================================================

/// Completion provider that returns queued replies
pub struct MockCompletion {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    delay: Duration,
    log: EventLog,
    /// Record of all requests made
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl MockCompletion {
    pub fn new(log: EventLog) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            delay: Duration::ZERO,
            log,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Sleep before answering every request
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn queue_reply(&self, text: impl Into<String>) {
        self.replies.lock().unwrap().push_back(Ok(text.into()));
    }

    pub fn queue_error(&self, error: LlmError) {
        self.replies.lock().unwrap().push_back(Err(error));
    }

    pub fn recorded_requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for MockCompletion {
    async fn generate(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        self.log.push("generate");
        self.requests.lock().unwrap().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock reply queued")))
    }

    fn model_id(&self) -> &str {
        "mock-model"
    }
}

// ============================================================================
// Mock Messaging Provider
// ============================================================================

/// Messaging provider that accepts everything unless told to fail
pub struct MockMessenger {
    fail: bool,
    delay: Duration,
    log: EventLog,
    /// (recipient, sender, text) per attempted send
    pub sends: Mutex<Vec<(String, String, String)>>,
}

impl MockMessenger {
    pub fn new(log: EventLog) -> Self {
        Self {
            fail: false,
            delay: Duration::ZERO,
            log,
            sends: Mutex::new(Vec::new()),
        }
    }

    /// Reject every send
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn recorded_sends(&self) -> Vec<(String, String, String)> {
        self.sends.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessagingProvider for MockMessenger {
    async fn send(
        &self,
        recipient: &str,
        sender: &str,
        text: &str,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        self.log.push("send");
        let n = {
            let mut sends = self.sends.lock().unwrap();
            sends.push((recipient.to_string(), sender.to_string(), text.to_string()));
            sends.len()
        };
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(DeliveryError::new(
                DeliveryErrorKind::Rejected,
                "mock provider rejected the message",
            ));
        }
        Ok(DeliveryReceipt {
            provider_id: format!("SM{n:032}"),
            status: "queued".to_string(),
        })
    }
}

// ============================================================================
// Recording Store
// ============================================================================

/// In-memory database wrapper that logs writes and can fail on demand
pub struct RecordingStore {
    db: Database,
    log: EventLog,
    appends: AtomicUsize,
    /// 1-based index of the append call that should fail
    fail_append_at: Mutex<Option<usize>>,
    fail_reads: Mutex<bool>,
}

impl RecordingStore {
    pub fn new(db: Database, log: EventLog) -> Self {
        Self {
            db,
            log,
            appends: AtomicUsize::new(0),
            fail_append_at: Mutex::new(None),
            fail_reads: Mutex::new(false),
        }
    }

    pub fn fail_append_at(&self, call: usize) {
        *self.fail_append_at.lock().unwrap() = Some(call);
    }

    pub fn fail_reads(&self) {
        *self.fail_reads.lock().unwrap() = true;
    }
}

fn injected_failure() -> DbError {
    DbError::Sqlite(rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_FULL),
        Some("injected failure".to_string()),
    ))
}

#[async_trait]
impl MessageStore for RecordingStore {
    async fn append(&self, message: &NewMessage) -> Result<Message, DbError> {
        let call = self.appends.fetch_add(1, Ordering::SeqCst) + 1;
        if *self.fail_append_at.lock().unwrap() == Some(call) {
            return Err(injected_failure());
        }
        let stored = self.db.append(message)?;
        self.log.push(format!("append:{}", stored.direction));
        Ok(stored)
    }

    async fn list_by_recipient(&self, party: &str, limit: usize) -> Result<Vec<Message>, DbError> {
        if *self.fail_reads.lock().unwrap() {
            return Err(injected_failure());
        }
        self.db.list_by_recipient(party, limit)
    }
}

// ============================================================================
// Test Relay Builder
// ============================================================================

/// Relay wired to mocks, with handles to every collaborator
pub struct TestRelay {
    pub relay: Arc<Relay>,
    pub db: Database,
    pub store: Arc<RecordingStore>,
    pub completion: Arc<MockCompletion>,
    pub messenger: Arc<MockMessenger>,
    pub log: EventLog,
}

impl TestRelay {
    pub fn builder() -> TestRelayBuilder {
        TestRelayBuilder::default()
    }

    /// Stored messages of one direction, oldest first
    pub fn stored(&self, direction: Direction) -> Vec<Message> {
        let mut messages: Vec<_> = self
            .db
            .list_by_recipient(SERVICE_NUMBER, 1000)
            .unwrap()
            .into_iter()
            .filter(|m| m.direction == direction)
            .collect();
        messages.reverse();
        messages
    }
}

pub struct TestRelayBuilder {
    history_depth: usize,
    upstream_timeout: Duration,
    completion_delay: Duration,
    send_delay: Duration,
    failing_messenger: bool,
}

impl Default for TestRelayBuilder {
    fn default() -> Self {
        Self {
            history_depth: 10,
            upstream_timeout: Duration::from_secs(5),
            completion_delay: Duration::ZERO,
            send_delay: Duration::ZERO,
            failing_messenger: false,
        }
    }
}

impl TestRelayBuilder {
    pub fn history_depth(mut self, depth: usize) -> Self {
        self.history_depth = depth;
        self
    }

    pub fn upstream_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_timeout = timeout;
        self
    }

    pub fn completion_delay(mut self, delay: Duration) -> Self {
        self.completion_delay = delay;
        self
    }

    pub fn send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = delay;
        self
    }

    pub fn failing_messenger(mut self) -> Self {
        self.failing_messenger = true;
        self
    }

    pub fn build(self) -> TestRelay {
        let log = EventLog::default();
        let db = Database::open_in_memory().unwrap();
        let store = Arc::new(RecordingStore::new(db.clone(), log.clone()));
        let completion =
            Arc::new(MockCompletion::new(log.clone()).with_delay(self.completion_delay));
        let mut messenger = MockMessenger::new(log.clone()).with_delay(self.send_delay);
        if self.failing_messenger {
            messenger = messenger.failing();
        }
        let messenger = Arc::new(messenger);

        let relay = Relay::new(
            RelaySettings {
                service_number: SERVICE_NUMBER.to_string(),
                instructions: "Be brief.".to_string(),
                history_depth: self.history_depth,
                upstream_timeout: self.upstream_timeout,
            },
            store.clone(),
            completion.clone(),
            messenger.clone(),
        );

        TestRelay {
            relay: Arc::new(relay),
            db,
            store,
            completion,
            messenger,
            log,
        }
    }
}
