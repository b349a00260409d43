//! One fetch cycle: validate → build request → send → parse → persist cursor
//!
//! The cursor is read once at the start of the cycle and written at most once
//! at the end, and only when the response parsed successfully and carried an
//! explicit `ultNSU`. Every failure before that point leaves the persisted
//! cursor untouched, so the whole cycle can simply be run again.

use crate::config::{Config, IdentityConfig};
use crate::cursor::{CursorSave, CursorStore};
use crate::error::{Error, ErrorKind, Result};
use crate::request::RequestBuilder;
use crate::response::ResponseParser;
use crate::storage::{FsResponseStore, ResponseHandle, ResponseStore};
use crate::transport::{Transport, TransportClient};
use crate::types::{Cursor, Identity, ResponseEnvelope};
use crate::utils::truncate_chars;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Number of characters of the raw response included in debug logs
const RESPONSE_PREVIEW_CHARS: usize = 2000;

/// Stage of a sync cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    /// Not started
    Idle,
    /// Checking the identity and loading the cursor
    Validating,
    /// Building the request document
    BuildingRequest,
    /// Waiting for the endpoint
    Sending,
    /// Storing and parsing the raw response
    ParsingResponse,
    /// Writing the new cursor
    Persisting,
    /// Cycle completed
    Succeeded,
    /// Cycle aborted with an error of the given kind
    Failed(ErrorKind),
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncState::Idle => write!(f, "idle"),
            SyncState::Validating => write!(f, "validating"),
            SyncState::BuildingRequest => write!(f, "building request"),
            SyncState::Sending => write!(f, "sending"),
            SyncState::ParsingResponse => write!(f, "parsing response"),
            SyncState::Persisting => write!(f, "persisting"),
            SyncState::Succeeded => write!(f, "succeeded"),
            SyncState::Failed(kind) => write!(f, "failed ({:?})", kind),
        }
    }
}

/// Result of a successful cycle
#[derive(Clone, Debug)]
pub struct SyncOutcome {
    /// Cursor the request was sent with
    pub sent_cursor: Cursor,
    /// Where the raw response was stored
    pub response: ResponseHandle,
    /// Parsed response
    pub envelope: ResponseEnvelope,
    /// Cursor write, if the response carried a cursor
    pub cursor_save: Option<CursorSave>,
}

impl SyncOutcome {
    /// Cursor held by the persisted record after the cycle
    pub fn persisted_cursor(&self) -> &Cursor {
        self.cursor_save
            .as_ref()
            .map(CursorSave::effective)
            .unwrap_or(&self.sent_cursor)
    }

    /// Whether the persisted cursor moved forward
    pub fn advanced(&self) -> bool {
        *self.persisted_cursor() > self.sent_cursor
    }

    /// Whether the authority reports more documents past the new cursor
    pub fn has_more(&self) -> bool {
        self.envelope.has_more()
    }
}

/// A cycle that stopped before completing
#[derive(Debug, Error)]
#[error("sync failed while {stage}: {error}")]
pub struct SyncFailure {
    /// Stage in which the failure happened
    pub stage: SyncState,
    /// The underlying error
    #[source]
    pub error: Error,
    /// Raw response, when it was received and stored before the failure
    pub response: Option<ResponseHandle>,
}

impl SyncFailure {
    /// Terminal state of the cycle, `Failed(kind)`
    pub fn state(&self) -> SyncState {
        SyncState::Failed(self.error.kind())
    }
}

/// Orchestrates one request/response round against the distribution endpoint
pub struct SyncPipeline {
    identity: IdentityConfig,
    request_path: Option<PathBuf>,
    transport: Arc<dyn Transport>,
    responses: Arc<dyn ResponseStore>,
    cursors: CursorStore,
}

impl SyncPipeline {
    /// Create a pipeline from explicit collaborators
    ///
    /// The request audit copy is written to `config.storage.request_path`;
    /// use [`SyncPipeline::without_audit_copy`] to disable it.
    pub fn new(
        config: &Config,
        transport: Arc<dyn Transport>,
        responses: Arc<dyn ResponseStore>,
    ) -> Self {
        Self {
            identity: config.identity.clone(),
            request_path: Some(config.storage.request_path.clone()),
            transport,
            responses,
            cursors: CursorStore::new(config.storage.cursor_path.clone()),
        }
    }

    /// Create a pipeline using the mutual-TLS client and file storage
    ///
    /// Fails if the configuration is invalid or the client credentials
    /// cannot be loaded.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let transport = TransportClient::new(&config.transport)?;
        let responses = FsResponseStore::new(config.storage.response_dir.clone());
        Ok(Self::new(config, Arc::new(transport), Arc::new(responses)))
    }

    /// Do not write the request audit copy
    pub fn without_audit_copy(mut self) -> Self {
        self.request_path = None;
        self
    }

    /// Cursor store used by this pipeline
    pub fn cursor_store(&self) -> &CursorStore {
        &self.cursors
    }

    /// Run one sync cycle
    ///
    /// # Errors
    ///
    /// Returns a [`SyncFailure`] naming the stage that failed. When the
    /// failure happened after the response was received (parse or
    /// persistence), [`SyncFailure::response`] points at the stored raw
    /// response.
    pub async fn run(&self) -> std::result::Result<SyncOutcome, SyncFailure> {
        let mut state = SyncState::Idle;

        transition(&mut state, SyncState::Validating);
        let identity = Identity::new(
            &self.identity.taxpayer_id,
            &self.identity.jurisdiction,
            self.identity.environment,
        )
        .map_err(|e| fail(state, e.into(), None))?;
        let sent_cursor = self
            .cursors
            .load_async()
            .await
            .map_err(|e| fail(state, e, None))?;
        info!(cursor = sent_cursor.as_str(), "using cursor");

        transition(&mut state, SyncState::BuildingRequest);
        let request = RequestBuilder::build(&identity, &sent_cursor);
        if let Some(path) = &self.request_path
            && let Err(e) = request.write_audit_copy(path)
        {
            warn!(path = %path.display(), error = %e, "failed to save request audit copy");
        }

        transition(&mut state, SyncState::Sending);
        let body = self
            .transport
            .send(&request)
            .await
            .map_err(|e| fail(state, e.into(), None))?;

        transition(&mut state, SyncState::ParsingResponse);
        debug!(
            preview = truncate_chars(&body, RESPONSE_PREVIEW_CHARS),
            truncated = body.chars().count() > RESPONSE_PREVIEW_CHARS,
            "raw response"
        );
        let response = self
            .responses
            .put(&sent_cursor, &body)
            .map_err(|e| fail(state, e, None))?;
        let envelope = ResponseParser::parse(body.as_bytes())
            .map_err(|e| fail(state, e.into(), Some(response.clone())))?;

        if let Some(code) = &envelope.status_code {
            info!(
                status = %code,
                reason = envelope.status_reason.as_deref().unwrap_or(""),
                packages = envelope.packages.len(),
                "authority answered"
            );
        }

        let cursor_save = match &envelope.cursor {
            Some(new_cursor) => {
                transition(&mut state, SyncState::Persisting);
                let save = self
                    .cursors
                    .save_async(new_cursor)
                    .await
                    .map_err(|e| fail(state, e, Some(response.clone())))?;
                Some(save)
            }
            None => {
                warn!(
                    cursor = sent_cursor.as_str(),
                    "response carried no ultNSU, cursor not advanced"
                );
                None
            }
        };

        transition(&mut state, SyncState::Succeeded);
        Ok(SyncOutcome {
            sent_cursor,
            response,
            envelope,
            cursor_save,
        })
    }
}

fn transition(state: &mut SyncState, next: SyncState) {
    debug!(from = %state, to = %next, "sync state transition");
    *state = next;
}

fn fail(stage: SyncState, error: Error, response: Option<ResponseHandle>) -> SyncFailure {
    error!(
        stage = %stage,
        code = error.code(),
        error = %error,
        "sync cycle failed"
    );
    SyncFailure {
        stage,
        error,
        response,
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ParseError, TransportError};
    use crate::request::RequestEnvelope;
    use crate::storage::MemoryResponseStore;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Transport answering from a queue and recording the cursors it was sent
    #[derive(Default)]
    struct ScriptedTransport {
        answers: Mutex<VecDeque<std::result::Result<String, TransportError>>>,
        sent: Mutex<Vec<Cursor>>,
    }

    impl ScriptedTransport {
        fn answering(answers: Vec<std::result::Result<String, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                answers: Mutex::new(answers.into()),
                sent: Mutex::new(Vec::new()),
            })
        }

        fn sent(&self) -> Vec<Cursor> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(
            &self,
            request: &RequestEnvelope,
        ) -> std::result::Result<String, TransportError> {
            self.sent.lock().unwrap().push(request.cursor().clone());
            self.answers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(String::new()))
        }
    }

    fn response_with(inner: &str) -> String {
        format!(
            r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body><retDistDFeInt xmlns="http://www.portalfiscal.inf.br/nfe" versao="1.01">{}</retDistDFeInt></soap:Body></soap:Envelope>"#,
            inner
        )
    }

    fn config(temp_dir: &TempDir, taxpayer_id: &str) -> Config {
        let mut config = Config::default();
        config.identity.taxpayer_id = taxpayer_id.to_string();
        config.storage.cursor_path = temp_dir.path().join("nsu.json");
        config.storage.request_path = temp_dir.path().join("entrada.xml");
        config
    }

    fn pipeline(
        config: &Config,
        transport: Arc<ScriptedTransport>,
        store: Arc<MemoryResponseStore>,
    ) -> SyncPipeline {
        SyncPipeline::new(config, transport, store)
    }

    #[tokio::test]
    async fn invalid_taxpayer_id_fails_before_sending() {
        let temp_dir = TempDir::new().unwrap();
        let config = config(&temp_dir, "123");
        let transport = ScriptedTransport::answering(vec![]);
        let store = Arc::new(MemoryResponseStore::new());

        let failure = pipeline(&config, transport.clone(), store.clone())
            .run()
            .await
            .unwrap_err();

        assert_eq!(failure.stage, SyncState::Validating);
        assert_eq!(failure.state(), SyncState::Failed(ErrorKind::Validation));
        assert!(transport.sent().is_empty());
        assert!(store.is_empty());
        assert!(!config.storage.request_path.exists());
        assert!(!config.storage.cursor_path.exists());
    }

    #[tokio::test]
    async fn cursor_advances_to_response_value() {
        let temp_dir = TempDir::new().unwrap();
        let config = config(&temp_dir, "12.345.678/0001-95");
        let cursors = CursorStore::new(&config.storage.cursor_path);
        cursors.save(&Cursor::parse("000000000000002").unwrap()).unwrap();

        let transport = ScriptedTransport::answering(vec![Ok(response_with(
            "<cStat>138</cStat><ultNSU>000000000000005</ultNSU><maxNSU>000000000000005</maxNSU>",
        ))]);
        let store = Arc::new(MemoryResponseStore::new());

        let outcome = pipeline(&config, transport.clone(), store.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(transport.sent(), vec![Cursor::parse("2").unwrap()]);
        assert_eq!(outcome.sent_cursor.as_str(), "000000000000002");
        assert_eq!(outcome.persisted_cursor().as_str(), "000000000000005");
        assert!(outcome.advanced());
        assert!(!outcome.has_more());
        assert_eq!(cursors.load().as_str(), "000000000000005");
        assert_eq!(store.len(), 1);
        assert!(config.storage.request_path.exists());
    }

    #[tokio::test]
    async fn missing_cursor_leaves_persisted_state_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let config = config(&temp_dir, "12345678000195");
        let cursors = CursorStore::new(&config.storage.cursor_path);
        cursors.save(&Cursor::parse("8").unwrap()).unwrap();
        let before = std::fs::read(&config.storage.cursor_path).unwrap();

        let transport = ScriptedTransport::answering(vec![Ok(response_with(
            "<cStat>656</cStat><xMotivo>Consumo Indevido</xMotivo>",
        ))]);
        let outcome = pipeline(&config, transport, Arc::new(MemoryResponseStore::new()))
            .run()
            .await
            .unwrap();

        assert!(outcome.cursor_save.is_none());
        assert!(!outcome.advanced());
        assert_eq!(outcome.persisted_cursor().as_str(), "000000000000008");
        assert_eq!(std::fs::read(&config.storage.cursor_path).unwrap(), before);
    }

    #[tokio::test]
    async fn transport_failure_keeps_cursor_and_stores_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let config = config(&temp_dir, "12345678000195");
        let transport = ScriptedTransport::answering(vec![Err(TransportError::HttpStatus {
            status: 503,
            body: "unavailable".to_string(),
        })]);
        let store = Arc::new(MemoryResponseStore::new());

        let failure = pipeline(&config, transport, store.clone())
            .run()
            .await
            .unwrap_err();

        assert_eq!(failure.stage, SyncState::Sending);
        assert!(failure.error.is_retryable());
        assert!(failure.response.is_none());
        assert!(store.is_empty());
        assert!(!config.storage.cursor_path.exists());
    }

    #[tokio::test]
    async fn parse_failure_still_stores_raw_response() {
        let temp_dir = TempDir::new().unwrap();
        let config = config(&temp_dir, "12345678000195");
        let transport = ScriptedTransport::answering(vec![Ok("<broken><xml>".to_string())]);
        let store = Arc::new(MemoryResponseStore::new());

        let failure = pipeline(&config, transport, store.clone())
            .run()
            .await
            .unwrap_err();

        assert_eq!(failure.stage, SyncState::ParsingResponse);
        assert!(matches!(failure.error, Error::Parse(ParseError::Malformed { .. })));
        let handle = failure.response.unwrap();
        assert_eq!(store.read(&handle).unwrap(), b"<broken><xml>");
        assert!(!config.storage.cursor_path.exists());
    }

    #[tokio::test]
    async fn persistence_failure_is_surfaced() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = config(&temp_dir, "12345678000195");
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, "file").unwrap();
        config.storage.cursor_path = blocker.join("nsu.json");

        let transport = ScriptedTransport::answering(vec![Ok(response_with(
            "<ultNSU>000000000000003</ultNSU>",
        ))]);
        let failure = pipeline(&config, transport, Arc::new(MemoryResponseStore::new()))
            .run()
            .await
            .unwrap_err();

        assert_eq!(failure.stage, SyncState::Persisting);
        assert_eq!(failure.state(), SyncState::Failed(ErrorKind::Persistence));
        assert!(failure.response.is_some());
    }

    #[tokio::test]
    async fn repeated_cycles_never_move_cursor_backwards() {
        let temp_dir = TempDir::new().unwrap();
        let config = config(&temp_dir, "12345678000195");
        let transport = ScriptedTransport::answering(vec![
            Ok(response_with("<ultNSU>000000000000003</ultNSU>")),
            Ok(response_with("<ultNSU>000000000000007</ultNSU>")),
            Ok(response_with("<ultNSU>000000000000004</ultNSU>")),
            Ok(response_with("<ultNSU>000000000000012</ultNSU>")),
        ]);
        let sync = pipeline(&config, transport.clone(), Arc::new(MemoryResponseStore::new()))
            .without_audit_copy();

        let mut last = Cursor::zero();
        for _ in 0..4 {
            let outcome = sync.run().await.unwrap();
            let persisted = sync.cursor_store().load();
            assert!(persisted >= last);
            assert_eq!(outcome.persisted_cursor(), &persisted);
            last = persisted;
        }

        assert_eq!(last.as_str(), "000000000000012");
        let sent: Vec<_> = transport.sent().iter().map(Cursor::value).collect();
        assert_eq!(sent, vec![0, 3, 7, 7]);
        assert!(!config.storage.request_path.exists());
    }

    #[tokio::test]
    async fn waiting_for_cursor_lock_does_not_stall_runtime() {
        use fs2::FileExt;
        use std::time::{Duration, Instant};

        let temp_dir = TempDir::new().unwrap();
        let config = config(&temp_dir, "12345678000195");
        let holder = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(temp_dir.path().join("nsu.json.lock"))
            .unwrap();
        holder.lock_exclusive().unwrap();
        let releaser = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(1500));
            holder.unlock().unwrap();
        });

        let transport = ScriptedTransport::answering(vec![Ok(response_with(
            "<ultNSU>000000000000004</ultNSU>",
        ))]);
        let sync = pipeline(&config, transport, Arc::new(MemoryResponseStore::new()));

        let started = Instant::now();
        let timer = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            started.elapsed()
        };
        let (outcome, timer_elapsed) = tokio::join!(sync.run(), timer);

        assert!(
            timer_elapsed < Duration::from_millis(1000),
            "timer fired after {:?}",
            timer_elapsed
        );
        assert_eq!(outcome.unwrap().persisted_cursor().as_str(), "000000000000004");
        releaser.join().unwrap();
    }
}
