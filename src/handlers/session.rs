//! Per-connection session
//!
//! A session receives one request at a time, authenticates it, runs the
//! ingest pipeline and produces exactly one response. Application-level
//! failures are turned into error responses; only the transport can close a
//! session.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::auth::TokenVerifier;
use crate::classifier::Classifier;
use crate::error::{SessionError, SessionResult};
use crate::models::Sample;
use crate::protocol::{ClientMessage, DataRequest, ListChannelsRequest, ProtocolError, ServerMessage};
use crate::signal::{self, FeatureProfile};
use crate::store::{ChannelRegistry, SampleStore};

/// Everything a session needs, shared read-only by all sessions
pub struct SessionContext {
    pub verifier: TokenVerifier,
    pub classifier: Classifier,
    pub profile: FeatureProfile,
    pub smoothing_window: usize,
    pub store: Arc<dyn SampleStore>,
    pub channels: Arc<dyn ChannelRegistry>,
    pub idle_timeout: Option<Duration>,
}

impl SessionContext {
    pub fn new(
        verifier: TokenVerifier,
        classifier: Classifier,
        profile: FeatureProfile,
        store: Arc<dyn SampleStore>,
        channels: Arc<dyn ChannelRegistry>,
    ) -> Self {
        Self {
            verifier,
            classifier,
            profile,
            smoothing_window: signal::filter::DEFAULT_WINDOW,
            store,
            channels,
            idle_timeout: None,
        }
    }

    pub fn with_smoothing_window(mut self, window: usize) -> Self {
        self.smoothing_window = window;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Authenticating,
    Processing,
    Responding,
    Closed,
}

pub struct Session {
    ctx: Arc<SessionContext>,
    state: SessionState,
    client_id: Option<String>,
    handled: u64,
}

impl Session {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self {
            ctx,
            state: SessionState::Idle,
            client_id: None,
            handled: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Client id of the last accepted `data` request
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    /// Number of requests answered so far
    pub fn handled(&self) -> u64 {
        self.handled
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.ctx.idle_timeout
    }

    fn transition(&mut self, next: SessionState) {
        tracing::trace!("Session {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Handle one text frame. The session is left in `Responding` until
    /// [`Session::response_sent`] is called.
    pub async fn handle_text(&mut self, text: &str) -> ServerMessage {
        let response = match self.dispatch(text).await {
            Ok(response) => response,
            Err(e) => e.to_message(),
        };
        self.transition(SessionState::Responding);
        response
    }

    /// Answer a frame that is not text
    pub fn reject_frame(&mut self) -> ServerMessage {
        self.transition(SessionState::Responding);
        SessionError::from(ProtocolError::NonTextFrame).to_message()
    }

    pub fn response_sent(&mut self) {
        self.handled += 1;
        self.transition(SessionState::Idle);
    }

    pub fn close(&mut self) {
        self.transition(SessionState::Closed);
    }

    async fn dispatch(&mut self, text: &str) -> SessionResult<ServerMessage> {
        let message = ClientMessage::parse(text)?;

        self.transition(SessionState::Authenticating);
        if let Err(e) = self.ctx.verifier.verify(message.token()) {
            tracing::warn!("Unauthorized {} attempt: {}", message.action(), e);
            return Err(e.into());
        }

        self.transition(SessionState::Processing);
        match message {
            ClientMessage::Data(req) => self.submit(req).await,
            ClientMessage::ListChannels(req) => self.list_channels(req).await,
        }
    }

    /// Decode, extract, classify, smooth and persist one sample
    async fn submit(&mut self, req: DataRequest) -> SessionResult<ServerMessage> {
        req.validate().map_err(ProtocolError::from)?;

        let payload = req
            .payload
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or(ProtocolError::NoPayload)?;

        self.client_id = Some(req.client_id.clone());

        let raw_signal = signal::decode_tagged(payload, &req.format)?;
        let extraction = signal::extract(&raw_signal, self.ctx.profile);
        let classification = self.ctx.classifier.classify(extraction.vector())?;
        let filtered_signal = signal::smooth(&raw_signal, self.ctx.smoothing_window);
        let (features, degraded) = extraction.into_parts();

        let sample = Sample {
            id: Uuid::new_v4(),
            client_id: req.client_id,
            channel_id: req.channel_id,
            timestamp: Utc::now(),
            raw_signal,
            filtered_signal,
            features,
            classification,
        };
        let client_id = sample.client_id.clone();
        let sample_id = sample.id;

        self.ctx
            .channels
            .ensure_channel(&sample.client_id, &sample.channel_id)
            .await
            .map_err(SessionError::Store)?;
        self.ctx.store.persist(sample).await.map_err(SessionError::Store)?;

        tracing::info!("[{}] -> Class {} (sample {})", client_id, classification, sample_id);

        match degraded {
            Some(reason) => Err(reason.into()),
            None => Ok(ServerMessage::success(classification.code())),
        }
    }

    async fn list_channels(&mut self, req: ListChannelsRequest) -> SessionResult<ServerMessage> {
        req.validate().map_err(ProtocolError::from)?;

        let client_id = req
            .client_id
            .filter(|c| !c.is_empty())
            .ok_or(ProtocolError::MissingClientId)?;

        let channels = self
            .ctx
            .channels
            .list_channels_for(&client_id)
            .await
            .map_err(SessionError::ChannelFetch)?;

        tracing::debug!("[{}] listed {} channel(s)", client_id, channels.len());
        Ok(ServerMessage::channels(channels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{read_table, Classification, ReferenceModel};
    use crate::protocol::Stage;
    use crate::store::{MemoryStore, StoreError};
    use async_trait::async_trait;
    use std::collections::BTreeSet;

    const TOKEN: &str = "test-token";

    fn float_hex(values: &[f32]) -> String {
        hex::encode(values.iter().flat_map(|v| v.to_le_bytes()).collect::<Vec<u8>>())
    }

    fn compact_classifier() -> Classifier {
        let table = read_table("label,GRW,FF,Var\n1,0,0,0\n2,2.5,1.1,1.25\n".as_bytes()).unwrap();
        Classifier::with_model(ReferenceModel::build(&table, FeatureProfile::Compact).unwrap())
    }

    fn session_with(classifier: Classifier, store: Arc<MemoryStore>) -> Session {
        let ctx = SessionContext::new(
            TokenVerifier::shared_secret(TOKEN),
            classifier,
            FeatureProfile::Compact,
            store.clone(),
            store,
        );
        Session::new(Arc::new(ctx))
    }

    fn data_request(token: &str, payload: &str, format: &str) -> String {
        serde_json::json!({
            "action": "data",
            "token": token,
            "client_id": "client_1",
            "channel_id": "channel_1",
            "payload": payload,
            "format": format,
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_data_success_stores_sample() {
        let store = Arc::new(MemoryStore::new());
        let mut session = session_with(compact_classifier(), store.clone());

        let response = session
            .handle_text(&data_request(TOKEN, &float_hex(&[1.0, 2.0, 3.0, 4.0]), "float"))
            .await;
        assert_eq!(response, ServerMessage::success(2));
        assert_eq!(session.state(), SessionState::Responding);
        session.response_sent();
        assert_eq!(session.state(), SessionState::Idle);

        let samples = store.samples();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].raw_signal, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(samples[0].filtered_signal, vec![2.0, 3.0]);
        assert_eq!(samples[0].classification, Classification::Label(2));
        assert_eq!(session.client_id(), Some("client_1"));
    }

    #[tokio::test]
    async fn test_unauthorized_keeps_session_usable() {
        let store = Arc::new(MemoryStore::new());
        let mut session = session_with(compact_classifier(), store.clone());
        let payload = float_hex(&[1.0]);

        let response = session.handle_text(&data_request("wrong", &payload, "float")).await;
        assert_eq!(response.error_code(), Some("unauthorized"));
        session.response_sent();
        assert_eq!(store.sample_count(), 0);

        let response = session.handle_text(&data_request(TOKEN, &payload, "float")).await;
        assert!(response.error_code().is_none());
        assert_eq!(store.sample_count(), 1);
    }

    #[tokio::test]
    async fn test_decode_failure_reports_stage() {
        let store = Arc::new(MemoryStore::new());
        let mut session = session_with(compact_classifier(), store.clone());

        for (payload, format) in [("abc", "float"), ("0000", "int8")] {
            let response = session.handle_text(&data_request(TOKEN, payload, format)).await;
            match response {
                ServerMessage::Error { error, stage, .. } => {
                    assert_eq!(error, "data_submission_failed");
                    assert_eq!(stage, Some(Stage::Decode));
                }
                other => panic!("unexpected {:?}", other),
            }
            session.response_sent();
        }
        assert_eq!(store.sample_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_signal_stores_degraded_sample() {
        let store = Arc::new(MemoryStore::new());
        let mut session = session_with(compact_classifier(), store.clone());

        // two bytes cannot hold a float32
        let response = session.handle_text(&data_request(TOKEN, "abcd", "float")).await;
        match response {
            ServerMessage::Error { error, stage, .. } => {
                assert_eq!(error, "data_submission_failed");
                assert_eq!(stage, Some(Stage::Extract));
            }
            other => panic!("unexpected {:?}", other),
        }

        let samples = store.samples();
        assert_eq!(samples.len(), 1);
        assert!(samples[0].raw_signal.is_empty());
        assert!(samples[0].features.as_slice().iter().all(|&v| v == 0.0));
        assert_eq!(samples[0].classification, Classification::Label(1));
    }

    #[tokio::test]
    async fn test_model_not_ready_reported() {
        let store = Arc::new(MemoryStore::new());
        let mut session = session_with(Classifier::unloaded(), store.clone());

        let response = session.handle_text(&data_request(TOKEN, &float_hex(&[1.0]), "float")).await;
        match response {
            ServerMessage::Error { stage, .. } => assert_eq!(stage, Some(Stage::Classify)),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(store.sample_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_payload_and_unknown_action() {
        let store = Arc::new(MemoryStore::new());
        let mut session = session_with(compact_classifier(), store);

        let text = serde_json::json!({"action": "data", "token": TOKEN}).to_string();
        assert_eq!(session.handle_text(&text).await.error_code(), Some("no_payload"));
        session.response_sent();

        let response = session.handle_text(r#"{"action":"shutdown"}"#).await;
        assert_eq!(response.error_code(), Some("Unknown action"));
        session.response_sent();
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_list_channels() {
        let store = Arc::new(MemoryStore::new());
        let mut session = session_with(compact_classifier(), store.clone());

        session
            .handle_text(&data_request(TOKEN, &float_hex(&[1.0, 2.0]), "float"))
            .await;
        session.response_sent();

        let text = serde_json::json!({"action": "list_channels", "token": TOKEN, "client_id": "client_1"}).to_string();
        assert_eq!(
            session.handle_text(&text).await,
            ServerMessage::channels(vec!["channel_1".to_string()])
        );
        session.response_sent();

        let text = serde_json::json!({"action": "list_channels", "token": TOKEN}).to_string();
        assert_eq!(session.handle_text(&text).await.error_code(), Some("missing_client_id"));
        session.response_sent();

        let text = serde_json::json!({"action": "list_channels", "token": "nope", "client_id": "client_1"}).to_string();
        assert_eq!(session.handle_text(&text).await.error_code(), Some("unauthorized"));
    }

    struct BrokenStore;

    #[async_trait]
    impl SampleStore for BrokenStore {
        async fn persist(&self, _sample: Sample) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("disk full".to_string()))
        }
    }

    #[async_trait]
    impl ChannelRegistry for BrokenStore {
        async fn list_channels_for(&self, _client_id: &str) -> Result<BTreeSet<String>, StoreError> {
            Err(StoreError::Unavailable("disk full".to_string()))
        }

        async fn ensure_channel(&self, _client_id: &str, _channel_id: &str) -> Result<bool, StoreError> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_store_failures_reported() {
        let broken = Arc::new(BrokenStore);
        let ctx = SessionContext::new(
            TokenVerifier::shared_secret(TOKEN),
            compact_classifier(),
            FeatureProfile::Compact,
            broken.clone(),
            broken,
        );
        let mut session = Session::new(Arc::new(ctx));

        match session.handle_text(&data_request(TOKEN, &float_hex(&[1.0]), "float")).await {
            ServerMessage::Error { error, stage, .. } => {
                assert_eq!(error, "data_submission_failed");
                assert_eq!(stage, Some(Stage::Store));
            }
            other => panic!("unexpected {:?}", other),
        }
        session.response_sent();

        let text = serde_json::json!({"action": "list_channels", "token": TOKEN, "client_id": "c"}).to_string();
        assert_eq!(session.handle_text(&text).await.error_code(), Some("channel_fetch_failed"));
    }
}
