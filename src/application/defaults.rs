//! Request templates used when nothing has been stored for a step yet.
//!
//! The shapes follow the Berlin Group NextGenPSD2 consent API as exposed by the
//! Raiffeisen Romania sandbox (`SB`) and UAT (`RD`) gateways. Credentials are
//! never baked in; they come from [`DefaultCredentials`].

use crate::domain::step::ApiStep;
use crate::domain::template::{RequestTemplate, TemplateKey};

const SANDBOX_HOST: &str = "https://api-auth-test.raiffeisenonline.ro/rbro/prod02";
const SANDBOX_AUTH_HOST: &str = "https://api-auth2-test.raiffeisenonline.ro/rbro/prod02";
const REAL_DATA_HOST: &str = "https://api-auth-uat.raiffeisenonline.ro/rbro/uat01";
const REAL_DATA_AUTH_HOST: &str = "https://api-auth2-uat.raiffeisenonline.ro/rbro/uat01";

const CONSENT_API: &str = "psd2-bgs-consent-api-1.3.2-rbro/v1/consents";
const PSU_USER_AGENT: &str = "psd2flow/0.1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub psu_id: String,
    pub iban: String,
    pub currency: String,
    /// Berlin Group accepts `9999-12-31` as "as long as possible".
    pub valid_until: String,
}

impl Default for DefaultCredentials {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            psu_id: String::new(),
            iban: String::new(),
            currency: "RON".to_string(),
            valid_until: "9999-12-31".to_string(),
        }
    }
}

/// Builds the default template for `key.step` in `key.environment`.
pub fn default_template(key: TemplateKey, credentials: &DefaultCredentials) -> RequestTemplate {
    let (host, auth_host) = if key.environment.is_sandbox() {
        (SANDBOX_HOST, SANDBOX_AUTH_HOST)
    } else {
        (REAL_DATA_HOST, REAL_DATA_AUTH_HOST)
    };
    let client_id = credentials.client_id.as_str();

    match key.step {
        ApiStep::ConsentCreation => RequestTemplate::new(key, "POST", format!("{host}/{CONSENT_API}"))
            .with_header("Accept", "application/json")
            .with_header("Content-Type", "application/json")
            .with_header("Client-Id", client_id)
            .with_header("PSU-ID", credentials.psu_id.as_str())
            .with_header("X-Request-ID", request_id(1))
            .with_header("psu-user-agent", PSU_USER_AGENT)
            .with_body(consent_body(credentials)),
        ApiStep::CheckConsentDetails => {
            RequestTemplate::new(key, "GET", format!("{host}/{CONSENT_API}/{{consentId}}"))
                .with_header("Accept", "application/json")
                .with_header("Cache-Control", "no-cache")
                .with_header("Client-Id", client_id)
                .with_header("X-Request-ID", request_id(2))
        }
        ApiStep::ScaLinkGeneration => RequestTemplate::new(
            key,
            "GET",
            format!("{auth_host}/psd2-auth-bridge-api/bridge/authorize"),
        )
        .with_header("Accept", "application/json")
        .with_query("client_id", client_id)
        .with_query("response_type", "code")
        .with_query("scope", "AISP"),
        ApiStep::ConsentAuthorization => RequestTemplate::new(
            key,
            "GET",
            format!("{host}/psd2-auth-bridge-api/bridge/authorize"),
        ),
        ApiStep::ValidateConsent => {
            RequestTemplate::new(key, "GET", format!("{host}/{CONSENT_API}/{{consentId}}/status"))
                .with_header("Accept", "application/json")
                .with_header("Client-Id", client_id)
                .with_header("X-Request-ID", request_id(5))
        }
        ApiStep::GenerateAccessToken => {
            RequestTemplate::new(key, "POST", format!("{auth_host}/aisp/oauth2/token"))
                .with_header("Content-Type", "application/x-www-form-urlencoded")
                .with_header("Accept", "application/json")
                .with_body(format!(
                    "grant_type=authorization_code&client_id={client_id}&client_secret={}&code={{authorizationCode}}&scope=AISP",
                    credentials.client_secret
                ))
        }
    }
}

fn consent_body(credentials: &DefaultCredentials) -> String {
    let account = serde_json::json!([{
        "iban": credentials.iban,
        "currency": credentials.currency,
    }]);
    let body = serde_json::json!({
        "access": {
            "accounts": account,
            "balances": account,
            "transactions": account,
        },
        "recurringIndicator": true,
        "validUntil": credentials.valid_until,
        "frequencyPerDay": 4,
        "combinedServiceIndicator": false,
    });
    serde_json::to_string_pretty(&body).unwrap_or_default()
}

/// Stable per-step request ids; banks only require the header to be a UUID.
fn request_id(step: u8) -> String {
    format!("00000000-0000-4000-8000-00000000000{step}")
}
