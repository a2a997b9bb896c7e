//! Screening of inbound request metadata for injection-like payloads.

use axum::http::{header::USER_AGENT, HeaderMap};
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::sync::OnceLock;

pub const MAX_USER_AGENT_LENGTH: usize = 500;
pub const MAX_HEADER_BYTES: usize = 8 * 1024;

const URL_SIGNATURES: [(&str, &str); 5] = [
    (r"(<|%3c)\s*script", "Potential XSS detected: script tag in URL"),
    (r"javascript\s*:", "Potential XSS detected: javascript: scheme in URL"),
    (
        r"\bon(load|error|click|dblclick|mouse\w+|key\w+|focus|blur|change|submit|input|abort)\s*(=|%3d)",
        "Potential XSS detected: inline event handler in URL",
    ),
    (
        r"union(\s|%20|\+|/\*.*?\*/)+(all(\s|%20|\+)+)?select\b",
        "Potential SQL injection detected: UNION SELECT in URL",
    ),
    (
        r"(\.|%2e){2}(/|\\|%2f|%5c)",
        "Potential path traversal detected in URL",
    ),
];

fn url_signatures() -> &'static [(Regex, &'static str)] {
    static SIGNATURES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    SIGNATURES.get_or_init(|| {
        URL_SIGNATURES
            .iter()
            .map(|(pattern, message)| {
                let regex = RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .expect("URL signature pattern should compile");
                (regex, *message)
            })
            .collect()
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionReport {
    pub is_valid: bool,
    pub violations: Vec<String>,
}

/// Stateless request screener. Every flagged condition becomes one
/// human-readable entry in the report.
#[derive(Debug, Clone)]
pub struct RequestInspector {
    max_user_agent_length: usize,
    max_header_bytes: usize,
}

impl Default for RequestInspector {
    fn default() -> Self {
        Self {
            max_user_agent_length: MAX_USER_AGENT_LENGTH,
            max_header_bytes: MAX_HEADER_BYTES,
        }
    }
}

impl RequestInspector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inspect(&self, url: &str, headers: &HeaderMap) -> InspectionReport {
        let mut violations: Vec<String> = url_signatures()
            .iter()
            .filter(|(regex, _)| regex.is_match(url))
            .map(|(_, message)| message.to_string())
            .collect();

        match headers.get(USER_AGENT) {
            None => violations.push("Missing User-Agent header".to_string()),
            Some(value) if value.as_bytes().is_empty() => {
                violations.push("Missing User-Agent header".to_string())
            }
            Some(value) if value.len() > self.max_user_agent_length => violations.push(format!(
                "User-Agent header exceeds {} characters",
                self.max_user_agent_length
            )),
            Some(_) => {}
        }

        let header_bytes = total_header_bytes(headers);
        if header_bytes > self.max_header_bytes {
            violations.push(format!(
                "Request headers too large: {} bytes exceeds {} byte limit",
                header_bytes, self.max_header_bytes
            ));
        }

        InspectionReport {
            is_valid: violations.is_empty(),
            violations,
        }
    }
}

fn total_header_bytes(headers: &HeaderMap) -> usize {
    headers
        .iter()
        .map(|(name, value)| name.as_str().len() + value.len())
        .sum()
}
