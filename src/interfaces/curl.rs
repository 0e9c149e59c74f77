//! Conversion between request templates and `curl` command lines.
//!
//! Generated commands use POSIX single quoting, so they paste into any
//! POSIX shell. The parser accepts what browsers' "copy as cURL" and API
//! consoles emit: single and double quotes, backslash escapes, line
//! continuations and bodies spanning several lines.

use crate::domain::template::{OrderedPairs, RequestTemplate, join_query};
use crate::error::{ConsentError, Result};
use tracing::debug;

const CONTINUATION: &str = " \\\n  ";

/// The request parts recovered from a `curl` command.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CurlRequest {
    pub method: String,
    pub url: String,
    pub headers: OrderedPairs,
    pub query_parameters: OrderedPairs,
    pub body: String,
}

impl CurlRequest {
    /// Overwrites the request side of `template`, keeping its key and cached response.
    pub fn apply_to(self, template: &mut RequestTemplate) {
        template.method = self.method;
        template.url = self.url;
        template.headers = self.headers;
        template.query_parameters = self.query_parameters;
        template.body = self.body;
    }
}

pub fn to_curl(template: &RequestTemplate) -> String {
    let mut lines = vec![
        format!("curl --request {}", template.method.trim().to_ascii_uppercase()),
        format!(
            "--url {}",
            shell_quote(&join_query(&template.url, &template.query_parameters))
        ),
    ];
    for (name, value) in &template.headers {
        lines.push(format!("--header {}", shell_quote(&format!("{name}: {value}"))));
    }
    if !template.body.is_empty() {
        lines.push(format!("--data {}", shell_quote(&template.body)));
    }
    lines.join(CONTINUATION)
}

pub fn parse_curl(text: &str) -> Result<CurlRequest> {
    let words = tokenize(text)?;
    let mut words = words.into_iter().peekable();
    if words.peek().map(String::as_str) == Some("curl") {
        words.next();
    }

    let mut method = None;
    let mut url = None;
    let mut headers = OrderedPairs::new();
    let mut data: Vec<String> = Vec::new();

    while let Some(word) = words.next() {
        let (flag, inline) = match word.split_once('=') {
            Some((flag, value)) if word.starts_with("--") => (flag.to_string(), Some(value.to_string())),
            _ => (word.clone(), None),
        };
        let mut value = |name: &str| -> Result<String> {
            inline
                .clone()
                .or_else(|| words.next())
                .ok_or_else(|| ConsentError::InvalidCurl(format!("{name} needs a value")))
        };

        match flag.as_str() {
            "-X" | "--request" => method = Some(value(&flag)?),
            "--url" => url = Some(value(&flag)?),
            "-H" | "--header" => {
                let header = value(&flag)?;
                let (name, header_value) = header
                    .split_once(':')
                    .ok_or_else(|| ConsentError::InvalidCurl(format!("malformed header {header:?}")))?;
                headers.insert(name.trim().to_string(), header_value.trim().to_string());
            }
            "-d" | "--data" | "--data-raw" | "--data-binary" | "--data-ascii" => {
                data.push(value(&flag)?)
            }
            _ if flag.starts_with("-X") && flag.len() > 2 => method = Some(flag[2..].to_string()),
            _ if is_http(&word) && url.is_none() => url = Some(word),
            _ => debug!(word = %word, "ignoring curl argument"),
        }
    }

    let url = url.ok_or_else(|| ConsentError::InvalidCurl("no URL found".to_string()))?;
    let body = data.join("&");
    let method = match method {
        Some(method) => method.to_ascii_uppercase(),
        None if !body.is_empty() => "POST".to_string(),
        None => "GET".to_string(),
    };
    let (url, query_parameters) = split_query(&url);

    Ok(CurlRequest {
        method,
        url,
        headers,
        query_parameters,
        body,
    })
}

/// Wraps `value` in single quotes, closing and reopening around embedded ones.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn is_http(word: &str) -> bool {
    let lower = word.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Splits at the first `?`. Pairs are kept verbatim, without percent-decoding.
fn split_query(url: &str) -> (String, OrderedPairs) {
    let mut params = OrderedPairs::new();
    let Some((base, query)) = url.split_once('?') else {
        return (url.to_string(), params);
    };
    for pair in query.split('&').filter(|pair| !pair.is_empty()) {
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        params.insert(name.to_string(), value.to_string());
    }
    (base.to_string(), params)
}

fn tokenize(text: &str) -> Result<Vec<String>> {
    let mut words = Vec::new();
    let mut current: Option<String> = None;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                let word = current.get_or_insert_with(String::new);
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(ch) => word.push(ch),
                        None => {
                            return Err(ConsentError::InvalidCurl(
                                "unterminated single quote".to_string(),
                            ));
                        }
                    }
                }
            }
            '"' => {
                let word = current.get_or_insert_with(String::new);
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('\n') => {}
                            Some(ch @ ('"' | '\\' | '$' | '`')) => word.push(ch),
                            Some(ch) => {
                                word.push('\\');
                                word.push(ch);
                            }
                            None => {
                                return Err(ConsentError::InvalidCurl(
                                    "unterminated double quote".to_string(),
                                ));
                            }
                        },
                        Some(ch) => word.push(ch),
                        None => {
                            return Err(ConsentError::InvalidCurl(
                                "unterminated double quote".to_string(),
                            ));
                        }
                    }
                }
            }
            '\\' => match chars.next() {
                Some('\n') => {}
                Some('\r') if chars.peek() == Some(&'\n') => {
                    chars.next();
                }
                Some(ch) => current.get_or_insert_with(String::new).push(ch),
                None => {}
            },
            c if c.is_whitespace() => {
                if let Some(word) = current.take() {
                    words.push(word);
                }
            }
            c => current.get_or_insert_with(String::new).push(c),
        }
    }
    if let Some(word) = current {
        words.push(word);
    }
    Ok(words)
}
