mod common;

use common::{Harness, RecordingAgent, SCA_LINK, harness, harness_with_codes, status_body};
use psd2flow::domain::ports::{AuthorizationCodeStore, ConfigurationStore};
use psd2flow::domain::step::{ApiStep, StepState};
use psd2flow::error::ConsentError;
use psd2flow::infrastructure::json_file::JsonFileStore;
use std::time::Duration;

/// Runs steps 1 to 3, launches the redirect and validates the consent,
/// leaving the authorization code unset in the flow's context.
async fn validated_without_code(h: &mut Harness) {
    h.executor.reply(201, r#"{"consentId":"c-1"}"#);
    h.executor.reply(200, "{}");
    h.executor.reply(200, &format!(r#"{{"scaRedirect":"{SCA_LINK}"}}"#));
    h.executor.reply(200, &status_body("valid"));
    h.flow.run_step(ApiStep::ConsentCreation).await.unwrap();
    h.flow.run_step(ApiStep::CheckConsentDetails).await.unwrap();
    h.flow.run_step(ApiStep::ScaLinkGeneration).await.unwrap();
    h.flow
        .launch_authorization(&RecordingAgent::default())
        .await
        .unwrap();
    h.flow.run_step(ApiStep::ValidateConsent).await.unwrap();
    assert!(h.flow.consent_gate_open());
    assert_eq!(h.flow.context().authorization_code(), None);
}

#[tokio::test]
async fn test_full_flow_end_to_end() {
    let mut h = harness();
    let agent = RecordingAgent::default();

    h.executor.reply(201, r#"{"consentId":"c-1","consentStatus":"received"}"#);
    let report = h.flow.run_step(ApiStep::ConsentCreation).await.unwrap();
    assert_eq!(report.state, StepState::Succeeded);
    assert_eq!(h.flow.context().consent_id(), Some("c-1"));

    h.executor.reply(200, r#"{"consentStatus":"received"}"#);
    h.flow.run_step(ApiStep::CheckConsentDetails).await.unwrap();
    let sent = h.executor.sent();
    assert!(sent[1].url.ends_with("/consents/c-1"));

    h.executor
        .reply_with_headers(302, &[("Location", SCA_LINK)], "");
    h.flow.run_step(ApiStep::ScaLinkGeneration).await.unwrap();
    let sent = h.executor.sent();
    assert_eq!(sent[2].query_parameters["consentId"], "c-1");
    assert_eq!(sent[2].query_parameters["client_id"], "client-1");
    assert_eq!(h.flow.context().sca_redirect_url(), Some(SCA_LINK));

    let target = h.flow.launch_authorization(&agent).await.unwrap();
    assert_eq!(target, SCA_LINK);
    assert_eq!(*agent.opened.lock().unwrap(), vec![SCA_LINK.to_string()]);
    assert_eq!(h.flow.state(ApiStep::ConsentAuthorization), StepState::Active);

    h.correlator
        .handle_redirect("psd2banking://callback?code=auth-9&state=x")
        .await
        .unwrap();
    assert_eq!(h.flow.await_authorization().await.unwrap(), "auth-9");
    assert_eq!(
        h.flow.state(ApiStep::ConsentAuthorization),
        StepState::Succeeded
    );

    h.executor.reply(200, &status_body("valid"));
    h.flow.run_step(ApiStep::ValidateConsent).await.unwrap();
    assert!(h.flow.consent_gate_open());
    assert!(h.executor.sent()[3].url.ends_with("/consents/c-1/status"));

    h.executor
        .reply(200, r#"{"access_token":"tok-1","token_type":"Bearer"}"#);
    h.flow.run_step(ApiStep::GenerateAccessToken).await.unwrap();
    let token_request = &h.executor.sent()[4];
    assert!(token_request.body.contains("code=auth-9"));
    assert!(token_request.body.contains("client_secret=secret-1"));
    assert!(
        h.flow
            .context()
            .access_token_response
            .as_deref()
            .unwrap()
            .contains("tok-1")
    );
    assert_eq!(h.flow.context().access_token(), Some("tok-1"));

    for (step, state) in h.flow.board().iter() {
        assert_eq!(state, StepState::Succeeded, "{step}");
    }
}

#[tokio::test]
async fn test_wait_resolves_when_code_arrives_later() {
    let mut h = harness();
    h.executor.reply(201, r#"{"consentId":"c-1"}"#);
    h.executor.reply(200, "{}");
    h.executor.reply(200, &format!(r#"{{"scaRedirect":"{SCA_LINK}"}}"#));
    h.flow.run_step(ApiStep::ConsentCreation).await.unwrap();
    h.flow.run_step(ApiStep::CheckConsentDetails).await.unwrap();
    h.flow.run_step(ApiStep::ScaLinkGeneration).await.unwrap();
    h.flow
        .launch_authorization(&RecordingAgent::default())
        .await
        .unwrap();

    let correlator = h.correlator.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        correlator.publish("late-code").await.unwrap();
    });

    let code = tokio::time::timeout(Duration::from_secs(5), h.flow.await_authorization())
        .await
        .expect("code was never delivered")
        .unwrap();
    assert_eq!(code, "late-code");
    assert_eq!(h.flow.context().authorization_code(), Some("late-code"));
}

#[tokio::test]
async fn test_steps_out_of_order_send_nothing() {
    let mut h = harness();

    for step in [
        ApiStep::CheckConsentDetails,
        ApiStep::ScaLinkGeneration,
        ApiStep::ValidateConsent,
        ApiStep::GenerateAccessToken,
    ] {
        assert!(!h.flow.is_step_runnable(step));
        let err = h.flow.run_step(step).await.unwrap_err();
        assert!(matches!(err, ConsentError::StepNotRunnable { .. }), "{step}");
        assert_eq!(h.flow.state(step), StepState::Pending);
    }
    assert!(h.executor.sent().is_empty());
    assert!(h.flow.is_step_runnable(ApiStep::ConsentCreation));

    let err = h
        .flow
        .launch_authorization(&RecordingAgent::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ConsentError::StepNotRunnable { .. }));
}

#[tokio::test]
async fn test_consent_not_valid_keeps_gate_closed() {
    let mut h = harness();
    h.executor.reply(201, r#"{"consentId":"c-1"}"#);
    h.executor.reply(200, "{}");
    h.executor.reply(200, &format!(r#"{{"authUrl":"{SCA_LINK}"}}"#));
    h.executor.reply(200, &status_body("received"));

    h.flow.run_step(ApiStep::ConsentCreation).await.unwrap();
    h.flow.run_step(ApiStep::CheckConsentDetails).await.unwrap();
    h.flow.run_step(ApiStep::ScaLinkGeneration).await.unwrap();
    h.flow
        .launch_authorization(&RecordingAgent::default())
        .await
        .unwrap();
    h.correlator.publish("code-1").await.unwrap();
    h.flow.await_authorization().await.unwrap();

    let report = h.flow.run_step(ApiStep::ValidateConsent).await.unwrap();
    assert!(!report.consent_gate_open);
    assert!(report.message.as_deref().unwrap().contains("received"));
    assert_eq!(h.flow.state(ApiStep::ValidateConsent), StepState::Succeeded);
    assert!(!h.flow.consent_gate_open());
    assert!(h.flow.last_error().unwrap().contains("received"));

    let before = h.executor.sent().len();
    let err = h
        .flow
        .run_step(ApiStep::GenerateAccessToken)
        .await
        .unwrap_err();
    assert!(matches!(err, ConsentError::StepNotRunnable { .. }));
    assert_eq!(h.executor.sent().len(), before);
}

#[tokio::test]
async fn test_reset_clears_flow_but_not_templates() {
    let mut h = harness();
    let mut custom = h.flow.template(ApiStep::ConsentCreation).await.unwrap();
    custom.url = "https://custom.test/v1/consents".to_string();
    h.flow.save_template(custom).await.unwrap();

    h.executor.reply(201, r#"{"consentId":"c-1"}"#);
    h.executor.reply(200, "{}");
    h.executor.reply(200, &format!(r#"{{"href":"{SCA_LINK}"}}"#));
    h.flow.run_step(ApiStep::ConsentCreation).await.unwrap();
    h.flow.run_step(ApiStep::CheckConsentDetails).await.unwrap();
    h.flow.run_step(ApiStep::ScaLinkGeneration).await.unwrap();
    assert_eq!(h.executor.sent()[0].url, "https://custom.test/v1/consents");

    let key = h.flow.session().key(ApiStep::ConsentCreation);
    let stored_before = h.store.get(&key).await.unwrap().unwrap();

    h.flow.reset();

    for (_, state) in h.flow.board().iter() {
        assert_eq!(state, StepState::Pending);
    }
    assert_eq!(h.flow.context().consent_id(), None);
    assert_eq!(h.flow.context().sca_redirect_url(), None);
    assert!(h.flow.response(ApiStep::ConsentCreation).is_none());
    assert!(!h.flow.consent_gate_open());

    let stored_after = h.store.get(&key).await.unwrap().unwrap();
    assert_eq!(stored_after, stored_before);
    assert_eq!(stored_after.url, "https://custom.test/v1/consents");
}

#[tokio::test]
async fn test_transport_error_is_recorded_and_retryable() {
    let mut h = harness();
    h.executor.fail("connection refused");

    let err = h.flow.run_step(ApiStep::ConsentCreation).await.unwrap_err();
    assert!(matches!(err, ConsentError::Transport(_)));
    assert_eq!(h.flow.state(ApiStep::ConsentCreation), StepState::Failed);

    let stored = h.flow.template(ApiStep::ConsentCreation).await.unwrap();
    assert_eq!(
        stored.cached_response,
        "Error: Transport error: connection refused"
    );
    assert!(h.flow.is_step_runnable(ApiStep::ConsentCreation));

    h.executor.reply(201, r#"{"consentId":"c-2"}"#);
    h.flow.run_step(ApiStep::ConsentCreation).await.unwrap();
    assert_eq!(h.flow.state(ApiStep::ConsentCreation), StepState::Succeeded);
    assert_eq!(h.flow.context().consent_id(), Some("c-2"));
    assert_eq!(h.flow.last_error(), None);
}

#[tokio::test]
async fn test_missing_consent_id_fails_before_sending() {
    let mut h = harness();
    h.executor.reply(201, r#"{"status":"created"}"#);
    h.flow.run_step(ApiStep::ConsentCreation).await.unwrap();
    assert_eq!(h.flow.context().consent_id(), None);

    let err = h
        .flow
        .run_step(ApiStep::CheckConsentDetails)
        .await
        .unwrap_err();
    assert!(matches!(err, ConsentError::MissingCorrelationValue(_)));
    assert_eq!(h.flow.state(ApiStep::CheckConsentDetails), StepState::Failed);
    assert_eq!(h.executor.sent().len(), 1);
}

#[tokio::test]
async fn test_cancel_then_relaunch() {
    let mut h = harness();
    let agent = RecordingAgent::default();
    h.executor.reply(201, r#"{"consentId":"c-1"}"#);
    h.executor.reply(200, "{}");
    h.executor.reply(200, &format!(r#"{{"redirectUrl":"{SCA_LINK}"}}"#));
    h.flow.run_step(ApiStep::ConsentCreation).await.unwrap();
    h.flow.run_step(ApiStep::CheckConsentDetails).await.unwrap();
    h.flow.run_step(ApiStep::ScaLinkGeneration).await.unwrap();

    h.flow.launch_authorization(&agent).await.unwrap();
    assert!(h.flow.launch_authorization(&agent).await.is_err());
    h.flow.cancel_authorization();
    assert_eq!(
        h.flow.state(ApiStep::ConsentAuthorization),
        StepState::Pending
    );
    assert!(!h.flow.is_step_runnable(ApiStep::ValidateConsent));

    h.flow.launch_authorization(&agent).await.unwrap();
    assert_eq!(agent.opened.lock().unwrap().len(), 2);

    let stored = h.flow.template(ApiStep::ConsentAuthorization).await.unwrap();
    assert_eq!(stored.cached_response, SCA_LINK);
}

#[tokio::test]
async fn test_failed_retry_replaces_previous_response() {
    let mut h = harness();
    h.executor.reply(201, r#"{"consentId":"c-1"}"#);
    h.flow.run_step(ApiStep::ConsentCreation).await.unwrap();
    assert!(h.flow.response(ApiStep::ConsentCreation).unwrap().contains("c-1"));

    h.executor.fail("connection refused");
    h.flow.run_step(ApiStep::ConsentCreation).await.unwrap_err();

    let expected = "Error: Transport error: connection refused";
    assert_eq!(h.flow.response(ApiStep::ConsentCreation), Some(expected));
    let stored = h.flow.template(ApiStep::ConsentCreation).await.unwrap();
    assert_eq!(stored.cached_response, expected);
}

#[tokio::test]
async fn test_token_step_uses_code_from_previous_process() {
    let dir = tempfile::tempdir().unwrap();
    JsonFileStore::open(dir.path())
        .unwrap()
        .save_code("earlier-code")
        .await
        .unwrap();

    let mut h = harness_with_codes(Box::new(JsonFileStore::open(dir.path()).unwrap()));
    validated_without_code(&mut h).await;

    h.executor.reply(200, r#"{"access_token":"tok-2"}"#);
    let report = h.flow.run_step(ApiStep::GenerateAccessToken).await.unwrap();
    assert_eq!(report.message, None);

    let token_request = h.executor.sent().pop().unwrap();
    assert!(token_request.body.contains("code=earlier-code"));
    assert_eq!(h.flow.context().authorization_code(), Some("earlier-code"));
    assert_eq!(h.flow.context().access_token(), Some("tok-2"));
}

#[tokio::test]
async fn test_token_step_without_any_code_sends_nothing() {
    let mut h = harness();
    validated_without_code(&mut h).await;
    let before = h.executor.sent().len();

    let err = h
        .flow
        .run_step(ApiStep::GenerateAccessToken)
        .await
        .unwrap_err();
    assert!(matches!(err, ConsentError::MissingCorrelationValue(_)));
    assert_eq!(h.flow.state(ApiStep::GenerateAccessToken), StepState::Failed);
    assert_eq!(h.executor.sent().len(), before);
}

#[tokio::test]
async fn test_token_response_without_access_token_is_reported() {
    let mut h = harness();
    validated_without_code(&mut h).await;
    h.correlator.publish("code-1").await.unwrap();

    h.executor.reply(200, r#"{"error":"pending"}"#);
    let report = h.flow.run_step(ApiStep::GenerateAccessToken).await.unwrap();
    assert_eq!(report.state, StepState::Succeeded);
    assert!(report.message.as_deref().unwrap().starts_with("Unparsable response"));
    assert_eq!(h.flow.context().access_token(), None);
    assert!(h.flow.context().access_token_response.is_some());
}

#[tokio::test]
async fn test_unreadable_consent_status_keeps_gate_closed() {
    let mut h = harness();
    h.executor.reply(201, r#"{"consentId":"c-1"}"#);
    h.executor.reply(200, "{}");
    h.executor.reply(200, &format!(r#"{{"scaRedirect":"{SCA_LINK}"}}"#));
    h.executor.reply(200, "<html>maintenance</html>");
    h.flow.run_step(ApiStep::ConsentCreation).await.unwrap();
    h.flow.run_step(ApiStep::CheckConsentDetails).await.unwrap();
    h.flow.run_step(ApiStep::ScaLinkGeneration).await.unwrap();
    h.flow
        .launch_authorization(&RecordingAgent::default())
        .await
        .unwrap();

    let report = h.flow.run_step(ApiStep::ValidateConsent).await.unwrap();
    assert!(!report.consent_gate_open);
    assert!(report.message.as_deref().unwrap().starts_with("Unparsable response"));
}
