use crate::error::ConsentError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The six steps of the consent flow, in protocol order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ApiStep {
    #[serde(rename = "Consent Creation")]
    ConsentCreation,
    #[serde(rename = "Check Consent Details")]
    CheckConsentDetails,
    #[serde(rename = "Generating SCA Link")]
    ScaLinkGeneration,
    #[serde(rename = "Consent Authorization")]
    ConsentAuthorization,
    #[serde(rename = "Validate Consent Active")]
    ValidateConsent,
    #[serde(rename = "Generate Active Access Token")]
    GenerateAccessToken,
}

impl ApiStep {
    pub const ALL: [ApiStep; 6] = [
        ApiStep::ConsentCreation,
        ApiStep::CheckConsentDetails,
        ApiStep::ScaLinkGeneration,
        ApiStep::ConsentAuthorization,
        ApiStep::ValidateConsent,
        ApiStep::GenerateAccessToken,
    ];

    /// 1-based position in the flow.
    pub fn number(self) -> usize {
        self as usize + 1
    }

    pub fn label(self) -> &'static str {
        match self {
            ApiStep::ConsentCreation => "Consent Creation",
            ApiStep::CheckConsentDetails => "Check Consent Details",
            ApiStep::ScaLinkGeneration => "Generating SCA Link",
            ApiStep::ConsentAuthorization => "Consent Authorization",
            ApiStep::ValidateConsent => "Validate Consent Active",
            ApiStep::GenerateAccessToken => "Generate Active Access Token",
        }
    }

    /// Name used on the command line.
    pub fn slug(self) -> &'static str {
        match self {
            ApiStep::ConsentCreation => "consent-creation",
            ApiStep::CheckConsentDetails => "check-consent-details",
            ApiStep::ScaLinkGeneration => "sca-link-generation",
            ApiStep::ConsentAuthorization => "consent-authorization",
            ApiStep::ValidateConsent => "validate-consent",
            ApiStep::GenerateAccessToken => "generate-access-token",
        }
    }

    pub fn predecessor(self) -> Option<ApiStep> {
        match self {
            ApiStep::ConsentCreation => None,
            other => Some(Self::ALL[other as usize - 1]),
        }
    }

    /// Step 4 is driven by an external redirect rather than an HTTP call.
    pub fn is_external(self) -> bool {
        self == ApiStep::ConsentAuthorization
    }
}

impl fmt::Display for ApiStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ApiStep {
    type Err = ConsentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|step| {
                step.slug().eq_ignore_ascii_case(wanted) || step.label().eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| ConsentError::InvalidStep(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepState {
    #[default]
    Pending,
    Active,
    Succeeded,
    Failed,
}

/// Per-step states plus the consent-status gate that guards token issuance.
///
/// All ordering rules of the flow live here so they can be checked without
/// touching the network.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepBoard {
    states: BTreeMap<ApiStep, StepState>,
    consent_valid: bool,
}

impl StepBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, step: ApiStep) -> StepState {
        self.states.get(&step).copied().unwrap_or_default()
    }

    pub fn set(&mut self, step: ApiStep, state: StepState) {
        self.states.insert(step, state);
    }

    pub fn consent_valid(&self) -> bool {
        self.consent_valid
    }

    pub fn set_consent_valid(&mut self, valid: bool) {
        self.consent_valid = valid;
    }

    /// The redirect counts as launched while step 4 waits or once it completed.
    pub fn redirect_launched(&self) -> bool {
        matches!(
            self.state(ApiStep::ConsentAuthorization),
            StepState::Active | StepState::Succeeded
        )
    }

    pub fn is_runnable(&self, step: ApiStep) -> bool {
        self.blocker(step).is_none()
    }

    /// Explains why `step` may not start, or `None` when it may.
    pub fn blocker(&self, step: ApiStep) -> Option<String> {
        if self.state(step) == StepState::Active {
            return Some("a call for this step is already in flight".to_string());
        }
        match step {
            ApiStep::ConsentCreation => None,
            ApiStep::ValidateConsent => {
                if self.redirect_launched() {
                    None
                } else {
                    Some("the SCA redirect has not been launched".to_string())
                }
            }
            ApiStep::GenerateAccessToken => {
                if self.state(ApiStep::ValidateConsent) != StepState::Succeeded {
                    Some(format!("{} has not succeeded", ApiStep::ValidateConsent))
                } else if !self.consent_valid {
                    Some("consent status is not valid".to_string())
                } else {
                    None
                }
            }
            other => {
                let previous = other.predecessor()?;
                if self.state(previous) == StepState::Succeeded {
                    None
                } else {
                    Some(format!("{previous} has not succeeded"))
                }
            }
        }
    }

    pub fn reset(&mut self) {
        self.states.clear();
        self.consent_valid = false;
    }

    pub fn iter(&self) -> impl Iterator<Item = (ApiStep, StepState)> + '_ {
        ApiStep::ALL.into_iter().map(|step| (step, self.state(step)))
    }
}
