use crate::domain::context::ConsentContext;
use crate::domain::template::{
    AUTHORIZATION_CODE_PLACEHOLDER, CONSENT_ID_PLACEHOLDER, PreparedRequest, RequestTemplate,
};
use crate::error::{ConsentError, Result};

/// Resolves `{consentId}` and `{authorizationCode}` in a template.
///
/// Tokens are replaced in the URL, query-parameter values, header values and
/// body. A token whose context value is missing fails the whole substitution,
/// so no half-resolved request ever reaches the network.
pub fn substitute(template: &RequestTemplate, context: &ConsentContext) -> Result<PreparedRequest> {
    let mut request = template.to_request();
    resolve_placeholder(&mut request, CONSENT_ID_PLACEHOLDER, context.consent_id())?;
    resolve_placeholder(
        &mut request,
        AUTHORIZATION_CODE_PLACEHOLDER,
        context.authorization_code(),
    )?;
    Ok(request)
}

/// Adds `name=value` to the query unless the request already carries `name`.
pub fn append_query_parameter(request: &mut PreparedRequest, name: &str, value: &str) -> bool {
    if request.has_query_parameter(name) {
        return false;
    }
    request
        .query_parameters
        .insert(name.to_string(), value.to_string());
    true
}

pub fn contains_placeholder(request: &PreparedRequest, placeholder: &str) -> bool {
    request.url.contains(placeholder)
        || request.body.contains(placeholder)
        || request.query_parameters.values().any(|v| v.contains(placeholder))
        || request.headers.values().any(|v| v.contains(placeholder))
}

fn resolve_placeholder(
    request: &mut PreparedRequest,
    placeholder: &'static str,
    value: Option<&str>,
) -> Result<()> {
    if !contains_placeholder(request, placeholder) {
        return Ok(());
    }
    let value = value.ok_or(ConsentError::MissingCorrelationValue(placeholder))?;

    request.url = request.url.replace(placeholder, value);
    request.body = request.body.replace(placeholder, value);
    for v in request.query_parameters.values_mut() {
        *v = v.replace(placeholder, value);
    }
    for v in request.headers.values_mut() {
        *v = v.replace(placeholder, value);
    }
    Ok(())
}
