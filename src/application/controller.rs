use super::correlator::{CallbackCorrelator, next_code};
use super::defaults::{DefaultCredentials, default_template};
use super::extractor::{
    extract_access_token, extract_consent_id, extract_consent_status, extract_redirect_target,
    is_consent_active,
};
use super::substitution::{append_query_parameter, substitute};
use crate::domain::context::ConsentContext;
use crate::domain::exchange::HttpExchange;
use crate::domain::ports::{ConfigurationStoreBox, ExternalAgent, RequestExecutorBox};
use crate::domain::session::FlowSession;
use crate::domain::step::{ApiStep, StepBoard, StepState};
use crate::domain::template::{CONSENT_ID_PLACEHOLDER, PreparedRequest, RequestTemplate};
use crate::error::{ConsentError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Query parameter that ties the SCA link to the consent being authorized.
const CONSENT_ID_PARAMETER: &str = "consentId";

/// What a completed call produced.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub step: ApiStep,
    pub state: StepState,
    pub status_code: u16,
    pub raw_text: String,
    pub consent_gate_open: bool,
    /// Set when the call succeeded but left something to report, such as a
    /// consent that is not yet valid.
    pub message: Option<String>,
}

/// Drives one consent authorization for a single (user, profile, bank,
/// environment) session.
///
/// The controller owns the per-step state board, the values correlated
/// between steps and the in-memory copy of each step's last response.
/// Templates and their cached responses live in the configuration store.
pub struct ConsentFlowController {
    session: FlowSession,
    store: ConfigurationStoreBox,
    executor: RequestExecutorBox,
    correlator: Arc<CallbackCorrelator>,
    credentials: DefaultCredentials,
    board: StepBoard,
    context: ConsentContext,
    responses: HashMap<ApiStep, String>,
    last_error: Option<String>,
    subscription: Option<watch::Receiver<Option<String>>>,
}

impl ConsentFlowController {
    pub fn new(
        session: FlowSession,
        store: ConfigurationStoreBox,
        executor: RequestExecutorBox,
        correlator: Arc<CallbackCorrelator>,
        credentials: DefaultCredentials,
    ) -> Self {
        Self {
            session,
            store,
            executor,
            correlator,
            credentials,
            board: StepBoard::new(),
            context: ConsentContext::new(),
            responses: HashMap::new(),
            last_error: None,
            subscription: None,
        }
    }

    pub fn session(&self) -> &FlowSession {
        &self.session
    }

    /// The stored template for `step`, or the built-in default when none was saved.
    pub async fn template(&self, step: ApiStep) -> Result<RequestTemplate> {
        let key = self.session.key(step);
        match self.store.get(&key).await? {
            Some(template) => Ok(template),
            None => {
                debug!(%key, "no stored template, using default");
                Ok(default_template(key, &self.credentials))
            }
        }
    }

    pub async fn save_template(&self, template: RequestTemplate) -> Result<()> {
        info!(key = %template.key, "saving template");
        self.store.put(template).await
    }

    /// Executes one network step.
    ///
    /// Nothing is sent and no state changes when the step's preconditions do
    /// not hold. Otherwise the raw exchange text (or the error) is written back
    /// into the template's cached response whatever the outcome.
    ///
    /// Dropping the returned future before it resolves leaves the step
    /// `Active`, which blocks it until [`reset`](Self::reset).
    pub async fn run_step(&mut self, step: ApiStep) -> Result<StepReport> {
        if step.is_external() {
            return Err(ConsentError::StepNotRunnable {
                step,
                reason: "it completes through launch_authorization and await_authorization"
                    .to_string(),
            });
        }
        if let Some(reason) = self.board.blocker(step) {
            return Err(ConsentError::StepNotRunnable { step, reason });
        }

        let template = self.template(step).await?;
        self.board.set(step, StepState::Active);
        info!(%step, "step started");

        let outcome = match self.prepare(step, &template).await {
            Ok(request) => {
                debug!(%step, url = %request.full_url(), "request prepared");
                self.executor
                    .execute(&request, &self.session.certificate_target())
                    .await
            }
            Err(e) => Err(e),
        };

        let (text, result) = match outcome {
            Ok(exchange) => {
                let text = exchange.raw_text.clone();
                (text, self.complete(step, exchange))
            }
            Err(e) => {
                let text = format!("Error: {e}");
                self.responses.insert(step, text.clone());
                (text, self.fail(step, e))
            }
        };
        self.remember(template, &text).await?;
        result
    }

    /// Shows the SCA redirect to the user and starts listening for the code.
    ///
    /// The target becomes step 4's cached response.
    pub async fn launch_authorization(&mut self, agent: &dyn ExternalAgent) -> Result<String> {
        let step = ApiStep::ConsentAuthorization;
        if self.board.state(ApiStep::ScaLinkGeneration) != StepState::Succeeded {
            return Err(ConsentError::StepNotRunnable {
                step,
                reason: format!("{} has not succeeded", ApiStep::ScaLinkGeneration),
            });
        }
        if self.board.state(step) == StepState::Active {
            return Err(ConsentError::StepNotRunnable {
                step,
                reason: "the authorization is already waiting for a callback".to_string(),
            });
        }
        let target = self
            .context
            .sca_redirect_url()
            .map(str::to_string)
            .ok_or_else(|| ConsentError::StepNotRunnable {
                step,
                reason: "no SCA redirect target was extracted".to_string(),
            })?;

        // Subscribe first so a redirect that comes back instantly is not missed.
        let subscription = self.correlator.subscribe();
        agent.open(&target)?;
        self.subscription = Some(subscription);
        self.board.set(step, StepState::Active);
        self.responses.insert(step, target.clone());
        info!(%step, "authorization launched");

        let template = self.template(step).await?;
        self.remember(template, &target).await?;
        Ok(target)
    }

    /// Waits for the authorization code with no timeout.
    ///
    /// Dropping the returned future leaves step 4 `Active`; follow with
    /// [`cancel_authorization`](Self::cancel_authorization) to give up.
    pub async fn await_authorization(&mut self) -> Result<String> {
        let step = ApiStep::ConsentAuthorization;
        let receiver = self
            .subscription
            .as_mut()
            .ok_or_else(|| ConsentError::StepNotRunnable {
                step,
                reason: "the authorization has not been launched".to_string(),
            })?;

        let code = next_code(receiver).await.ok_or_else(|| {
            ConsentError::Internal(Box::new(std::io::Error::other(
                "callback inbox closed before a code arrived",
            )))
        })?;

        self.context.authorization_code = Some(code.clone());
        self.subscription = None;
        self.board.set(step, StepState::Succeeded);
        info!(%step, "authorization code received");
        Ok(code)
    }

    /// The user closed the external agent without finishing.
    pub fn cancel_authorization(&mut self) {
        let step = ApiStep::ConsentAuthorization;
        self.subscription = None;
        if self.board.state(step) == StepState::Active {
            self.board.set(step, StepState::Pending);
            info!(%step, "authorization cancelled");
        }
    }

    /// Starts over: every step `Pending`, gate closed, context and in-memory
    /// responses gone. Stored templates are left as they are.
    pub fn reset(&mut self) {
        self.board.reset();
        self.context.clear();
        self.responses.clear();
        self.last_error = None;
        self.subscription = None;
        info!("flow reset");
    }

    pub fn state(&self, step: ApiStep) -> StepState {
        self.board.state(step)
    }

    pub fn board(&self) -> &StepBoard {
        &self.board
    }

    pub fn is_step_runnable(&self, step: ApiStep) -> bool {
        if step.is_external() {
            return self.board.state(ApiStep::ScaLinkGeneration) == StepState::Succeeded
                && self.board.state(step) != StepState::Active
                && self.context.sca_redirect_url().is_some();
        }
        self.board.is_runnable(step)
    }

    pub fn consent_gate_open(&self) -> bool {
        self.board.consent_valid()
    }

    pub fn context(&self) -> &ConsentContext {
        &self.context
    }

    pub fn response(&self, step: ApiStep) -> Option<&str> {
        self.responses.get(&step).map(String::as_str)
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    async fn prepare(&mut self, step: ApiStep, template: &RequestTemplate) -> Result<PreparedRequest> {
        if step == ApiStep::GenerateAccessToken && self.context.authorization_code().is_none() {
            self.context.authorization_code = self.correlator.consume().await?;
        }

        let mut request = substitute(template, &self.context)?;
        if step == ApiStep::ScaLinkGeneration {
            let consent_id = self
                .context
                .consent_id()
                .ok_or(ConsentError::MissingCorrelationValue(CONSENT_ID_PLACEHOLDER))?;
            append_query_parameter(&mut request, CONSENT_ID_PARAMETER, consent_id);
        }
        Ok(request)
    }

    fn complete(&mut self, step: ApiStep, exchange: HttpExchange) -> Result<StepReport> {
        self.responses.insert(step, exchange.raw_text.clone());
        if !exchange.is_success() {
            return self.fail(
                step,
                ConsentError::NonSuccessStatus {
                    step,
                    status: exchange.status_code,
                },
            );
        }

        self.last_error = None;
        match step {
            ApiStep::ConsentCreation => {
                self.context.consent_id = extract_consent_id(&exchange.raw_text);
                if self.context.consent_id.is_none() {
                    warn!(%step, "response carried no consentId");
                }
            }
            ApiStep::ScaLinkGeneration => {
                self.context.sca_redirect_url =
                    extract_redirect_target(&exchange.raw_text, &exchange.headers);
                if self.context.sca_redirect_url.is_none() {
                    warn!(%step, "response carried no redirect target");
                }
            }
            ApiStep::ValidateConsent => {
                let status = extract_consent_status(&exchange.raw_text);
                let valid = is_consent_active(status.as_deref());
                self.board.set_consent_valid(valid);
                if !valid {
                    let message = match status {
                        Some(status) => format!("consent status is {status:?}, not valid"),
                        None => ConsentError::UnparsableResponse(
                            "no consentStatus in the response".to_string(),
                        )
                        .to_string(),
                    };
                    warn!(%step, "{message}");
                    self.last_error = Some(message);
                }
            }
            ApiStep::GenerateAccessToken => {
                self.context.access_token_response = Some(exchange.raw_text.clone());
                self.context.access_token = extract_access_token(&exchange.raw_text);
                if self.context.access_token.is_none() {
                    let message = ConsentError::UnparsableResponse(
                        "no access_token in the response".to_string(),
                    )
                    .to_string();
                    warn!(%step, "{message}");
                    self.last_error = Some(message);
                }
            }
            ApiStep::CheckConsentDetails | ApiStep::ConsentAuthorization => {}
        }

        self.board.set(step, StepState::Succeeded);
        info!(%step, status = exchange.status_code, "step succeeded");
        Ok(StepReport {
            step,
            state: StepState::Succeeded,
            status_code: exchange.status_code,
            raw_text: exchange.raw_text,
            consent_gate_open: self.board.consent_valid(),
            message: self.last_error.clone(),
        })
    }

    fn fail(&mut self, step: ApiStep, error: ConsentError) -> Result<StepReport> {
        self.board.set(step, StepState::Failed);
        self.last_error = Some(error.to_string());
        warn!(%step, %error, "step failed");
        Err(error)
    }

    async fn remember(&self, mut template: RequestTemplate, text: &str) -> Result<()> {
        template.cached_response = text.to_string();
        self.store.put(template).await
    }
}
