#![allow(dead_code)]

use async_trait::async_trait;
use psd2flow::application::controller::ConsentFlowController;
use psd2flow::application::correlator::CallbackCorrelator;
use psd2flow::application::defaults::DefaultCredentials;
use psd2flow::domain::exchange::HttpExchange;
use psd2flow::domain::ports::{
    AuthorizationCodeStoreBox, CertificateTarget, ExternalAgent, RequestExecutor,
};
use psd2flow::domain::session::{Bank, FlowSession};
use psd2flow::domain::template::{OrderedPairs, PreparedRequest};
use psd2flow::error::{ConsentError, Result};
use psd2flow::infrastructure::in_memory::{InMemoryCodeStore, InMemoryConfigurationStore};
use psd2flow::interfaces::callback::CallbackRoutes;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Replays queued replies and records every request it was asked to send.
#[derive(Clone, Default)]
pub struct ScriptedExecutor {
    replies: Arc<Mutex<VecDeque<Result<HttpExchange>>>>,
    pub sent: Arc<Mutex<Vec<PreparedRequest>>>,
}

impl ScriptedExecutor {
    pub fn reply(&self, status: u16, body: &str) -> &Self {
        self.replies
            .lock()
            .unwrap()
            .push_back(Ok(HttpExchange::new(status, OrderedPairs::new(), body)));
        self
    }

    pub fn reply_with_headers(&self, status: u16, headers: &[(&str, &str)], body: &str) -> &Self {
        let headers = headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.replies
            .lock()
            .unwrap()
            .push_back(Ok(HttpExchange::new(status, headers, body)));
        self
    }

    pub fn fail(&self, message: &str) -> &Self {
        self.replies
            .lock()
            .unwrap()
            .push_back(Err(ConsentError::Transport(message.to_string())));
        self
    }

    pub fn sent(&self) -> Vec<PreparedRequest> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl RequestExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        request: &PreparedRequest,
        _target: &CertificateTarget,
    ) -> Result<HttpExchange> {
        self.sent.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ConsentError::Transport("no scripted reply".to_string())))
    }
}

/// Remembers the links it was asked to open.
#[derive(Clone, Default)]
pub struct RecordingAgent {
    pub opened: Arc<Mutex<Vec<String>>>,
}

impl ExternalAgent for RecordingAgent {
    fn open(&self, url: &str) -> Result<()> {
        self.opened.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

pub fn session() -> FlowSession {
    FlowSession {
        user_id: "alice".to_string(),
        profile_id: "main".to_string(),
        bank: Bank {
            id: "raiffeisen".to_string(),
            name: "Raiffeisen Bank".to_string(),
        },
        environment: "SB Test".parse().unwrap(),
    }
}

pub fn correlator() -> Arc<CallbackCorrelator> {
    Arc::new(CallbackCorrelator::new(
        Box::new(InMemoryCodeStore::new()),
        CallbackRoutes::default(),
    ))
}

pub struct Harness {
    pub flow: ConsentFlowController,
    pub executor: ScriptedExecutor,
    pub store: InMemoryConfigurationStore,
    pub correlator: Arc<CallbackCorrelator>,
}

pub fn harness() -> Harness {
    harness_with_codes(Box::new(InMemoryCodeStore::new()))
}

/// A harness whose correlator falls back to `codes` for durable lookups.
pub fn harness_with_codes(codes: AuthorizationCodeStoreBox) -> Harness {
    let executor = ScriptedExecutor::default();
    let store = InMemoryConfigurationStore::new();
    let correlator = Arc::new(CallbackCorrelator::new(codes, CallbackRoutes::default()));
    let flow = ConsentFlowController::new(
        session(),
        Box::new(store.clone()),
        Box::new(executor.clone()),
        correlator.clone(),
        DefaultCredentials {
            client_id: "client-1".to_string(),
            client_secret: "secret-1".to_string(),
            psu_id: "psu-1".to_string(),
            ..Default::default()
        },
    );
    Harness {
        flow,
        executor,
        store,
        correlator,
    }
}

pub const SCA_LINK: &str = "https://bank.test/sca/start?session=s-1";

pub fn status_body(status: &str) -> String {
    format!(r#"{{"consentStatus":"{status}"}}"#)
}
