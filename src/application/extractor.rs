//! Pulls correlation values out of raw exchange text.
//!
//! Every function accepts the `curl -i` style blob the executor produces, so a
//! status line and headers above the JSON body are expected and skipped.

use crate::domain::template::OrderedPairs;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// Consent status value that allows the flow to proceed to token issuance.
pub const ACTIVE_CONSENT_STATUS: &str = "valid";

/// JSON keys that may carry the SCA redirect target, in lookup order.
pub const REDIRECT_KEYS: [&str; 9] = [
    "scaRedirect",
    "sca_redirect",
    "authorisationUrl",
    "authorization_url",
    "authUrl",
    "auth_url",
    "redirectUrl",
    "redirect_url",
    "href",
];

#[derive(Debug, Deserialize)]
struct ConsentCreated {
    #[serde(rename = "consentId")]
    consent_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConsentStatusBody {
    #[serde(rename = "consentStatus")]
    consent_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    access_token: Option<String>,
}

pub fn extract_consent_id(raw: &str) -> Option<String> {
    let start = raw.find(['{', '['])?;
    let value = first_json_value(&raw[start..])?;
    let consent_id = serde_json::from_value::<ConsentCreated>(value)
        .ok()
        .and_then(|body| body.consent_id);
    if consent_id.is_none() {
        debug!("no consentId in response");
    }
    consent_id
}

/// Prefers the `Location` header; falls back to well-known JSON keys whose
/// value looks like a URL.
pub fn extract_redirect_target(raw: &str, headers: &OrderedPairs) -> Option<String> {
    let from_header = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("location"))
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty());
    if from_header.is_some() {
        return from_header;
    }

    let (head, body) = split_head_and_body(raw);
    if let Some(location) = head.lines().find_map(location_line) {
        return Some(location);
    }

    let value = first_json_value(body.trim_start())
        .or_else(|| raw.find('{').and_then(|start| first_json_value(&raw[start..])))?;
    let object = value.as_object()?;
    REDIRECT_KEYS.iter().find_map(|key| {
        object
            .get(*key)
            .and_then(Value::as_str)
            .filter(|url| url.contains("http"))
            .map(str::to_string)
    })
}

pub fn extract_consent_status(raw: &str) -> Option<String> {
    let (_, body) = split_head_and_body(raw);
    let value = first_json_value(body.trim())?;
    serde_json::from_value::<ConsentStatusBody>(value)
        .ok()
        .and_then(|body| body.consent_status)
}

pub fn extract_access_token(raw: &str) -> Option<String> {
    let (_, body) = split_head_and_body(raw);
    let value = first_json_value(body.trim())?;
    serde_json::from_value::<TokenBody>(value)
        .ok()
        .and_then(|body| body.access_token)
}

pub fn is_consent_active(status: Option<&str>) -> bool {
    status == Some(ACTIVE_CONSENT_STATUS)
}

/// Splits at the first blank line. Text without one is treated as all body.
fn split_head_and_body(raw: &str) -> (&str, &str) {
    let lf = raw.find("\n\n").map(|i| (i, 2));
    let crlf = raw.find("\r\n\r\n").map(|i| (i, 4));
    let boundary = match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    };
    match boundary {
        Some((index, width)) => (&raw[..index], &raw[index + width..]),
        None => ("", raw),
    }
}

fn location_line(line: &str) -> Option<String> {
    let (name, value) = line.trim().split_once(':')?;
    if !name.trim().eq_ignore_ascii_case("location") {
        return None;
    }
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Parses the first JSON value in `text`, ignoring anything after it.
fn first_json_value(text: &str) -> Option<Value> {
    serde_json::Deserializer::from_str(text)
        .into_iter::<Value>()
        .next()
        .and_then(|result| result.ok())
}
