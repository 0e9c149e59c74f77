use super::template::OrderedPairs;

/// Status codes the flow accepts as a successful exchange.
pub const SUCCESS_STATUSES: [u16; 3] = [200, 201, 302];

/// One HTTP round trip as the flow sees it.
///
/// `raw_text` is the `curl -i` style rendering: status line, headers, a blank
/// line and the body. A status of 0 stands for "no response".
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HttpExchange {
    pub status_code: u16,
    pub raw_text: String,
    pub headers: OrderedPairs,
}

impl HttpExchange {
    pub fn new(status_code: u16, headers: OrderedPairs, body: &str) -> Self {
        let raw_text = render_raw(status_code, &headers, body);
        Self {
            status_code,
            raw_text,
            headers,
        }
    }

    pub fn is_success(&self) -> bool {
        is_success_status(self.status_code)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

pub fn is_success_status(status: u16) -> bool {
    SUCCESS_STATUSES.contains(&status)
}

pub fn render_raw(status_code: u16, headers: &OrderedPairs, body: &str) -> String {
    let mut raw = format!("HTTP/1.1 {status_code}\n");
    for (name, value) in headers {
        raw.push_str(name);
        raw.push_str(": ");
        raw.push_str(value);
        raw.push('\n');
    }
    raw.push('\n');
    raw.push_str(body);
    raw
}
