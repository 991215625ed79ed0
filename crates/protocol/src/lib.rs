pub mod alb;
pub mod scrub;

use chrono::{NaiveDateTime, Timelike};
use serde::Serialize;
use tracing::debug;

pub use scrub::RedactionSecrets;

/// The source format's single-character marker for an absent field.
pub const SENTINEL: &str = "-";

const SOURCE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

/// One successfully parsed access-log line, flattened for ingestion.
/// Every field is a sentinel-normalized string except `time` (reformatted
/// timestamp) and `raw_log` (redacted original line).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AccessLogRecord {
    #[serde(rename = "_time")]
    pub time: String,
    #[serde(rename = "type")]
    pub request_type: String,
    pub client: String,
    pub client_port: String,
    pub target: String,
    pub target_port: String,
    pub request_processing_time: String,
    pub target_processing_time: String,
    pub response_processing_time: String,
    pub elb_status_code: String,
    pub target_status_code: String,
    pub received_bytes: String,
    pub sent_bytes: String,
    pub request: String,
    pub method: String,
    pub url: String,
    pub protocol: String,
    pub user_agent: String,
    pub ssl_cipher: String,
    pub ssl_protocol: String,
    pub trace_id: String,
    pub domain_name: String,
    pub matched_rule_priority: String,
    pub request_creation_time: String,
    pub actions_executed: String,
    pub redirect_url: String,
    pub error_reason: String,
    pub target_port_list: String,
    pub target_status_code_list: String,
    pub classification: String,
    pub classification_reason: String,
    pub tid: String,
    pub service: String,
    pub raw_log: String,
}

impl AccessLogRecord {
    // Every declared field except `time` and `raw_log`. Keep this list in
    // sync with the struct; the sentinel invariant is only as complete as
    // this enumeration.
    fn sentinel_fields_mut(&mut self) -> [&mut String; 32] {
        [
            &mut self.request_type,
            &mut self.client,
            &mut self.client_port,
            &mut self.target,
            &mut self.target_port,
            &mut self.request_processing_time,
            &mut self.target_processing_time,
            &mut self.response_processing_time,
            &mut self.elb_status_code,
            &mut self.target_status_code,
            &mut self.received_bytes,
            &mut self.sent_bytes,
            &mut self.request,
            &mut self.method,
            &mut self.url,
            &mut self.protocol,
            &mut self.user_agent,
            &mut self.ssl_cipher,
            &mut self.ssl_protocol,
            &mut self.trace_id,
            &mut self.domain_name,
            &mut self.matched_rule_priority,
            &mut self.request_creation_time,
            &mut self.actions_executed,
            &mut self.redirect_url,
            &mut self.error_reason,
            &mut self.target_port_list,
            &mut self.target_status_code_list,
            &mut self.classification,
            &mut self.classification_reason,
            &mut self.tid,
            &mut self.service,
        ]
    }

    fn normalize_sentinels(&mut self) {
        for field in self.sentinel_fields_mut() {
            if field.as_str() == SENTINEL {
                field.clear();
            }
        }
    }
}

/// Emitted when a line does not match the grammar. The raw line is not
/// processed further.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseFailure {
    #[serde(rename = "_time")]
    pub time: String,
    pub data: FailureDetail,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureDetail {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LogEvent {
    Record(AccessLogRecord),
    Failure(ParseFailure),
}

impl LogEvent {
    pub fn is_failure(&self) -> bool {
        matches!(self, LogEvent::Failure(_))
    }
}

pub struct LineParser {
    secrets: RedactionSecrets,
}

impl LineParser {
    pub fn new(secrets: RedactionSecrets) -> Self {
        Self { secrets }
    }

    /// Total over any input line: a grammar mismatch comes back as an
    /// explicit failure record, never an error. Holds no state across
    /// calls.
    pub fn parse(&self, line: &str) -> LogEvent {
        let canonical = scrub::canonicalize_resource_path(line);
        let fields = match alb::parse_fields(&canonical) {
            Ok(fields) => fields,
            Err(err) => {
                debug!("line failed grammar match: {err}");
                return LogEvent::Failure(ParseFailure {
                    time: String::new(),
                    data: FailureDetail {
                        error: err.to_string(),
                    },
                });
            }
        };

        let (client, client_port) = split_address(fields.client);
        let (target, target_port) = split_address(fields.target);

        let mut record = AccessLogRecord {
            time: format_timestamp(fields.time),
            request_type: fields.request_type.to_string(),
            client,
            client_port,
            target,
            target_port,
            request_processing_time: fields.request_processing_time.to_string(),
            target_processing_time: fields.target_processing_time.to_string(),
            response_processing_time: fields.response_processing_time.to_string(),
            elb_status_code: fields.elb_status_code.to_string(),
            target_status_code: fields.target_status_code.to_string(),
            received_bytes: fields.received_bytes.to_string(),
            sent_bytes: fields.sent_bytes.to_string(),
            request: fields.request.to_string(),
            method: fields.method.to_string(),
            url: fields.url.to_string(),
            protocol: fields.protocol.to_string(),
            user_agent: fields.user_agent.to_string(),
            ssl_cipher: fields.ssl_cipher.to_string(),
            ssl_protocol: fields.ssl_protocol.to_string(),
            trace_id: fields.trace_id.to_string(),
            domain_name: fields.domain_name.to_string(),
            matched_rule_priority: fields.matched_rule_priority.to_string(),
            request_creation_time: fields.request_creation_time.to_string(),
            actions_executed: fields.actions_executed.to_string(),
            redirect_url: fields.redirect_url.to_string(),
            error_reason: fields.error_reason.to_string(),
            target_port_list: fields.target_port_list.to_string(),
            target_status_code_list: fields.target_status_code_list.to_string(),
            classification: fields.classification.to_string(),
            classification_reason: fields.classification_reason.to_string(),
            tid: fields.tid.to_string(),
            service: service_name(fields.target_group_arn),
            // Redaction applies to the original line, not the canonicalized
            // form; callers needing the canonical text re-derive it.
            raw_log: scrub::redact(line, &self.secrets),
        };
        record.normalize_sentinels();
        LogEvent::Record(record)
    }
}

/// Reformats the source timestamp to ISO-8601 with an explicit UTC marker,
/// dropping the fractional part when it is zero. An unrecognized token is
/// passed through unchanged.
fn format_timestamp(raw: &str) -> String {
    match NaiveDateTime::parse_from_str(raw, SOURCE_TIME_FORMAT) {
        Ok(ts) if ts.nanosecond() == 0 => ts.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        Ok(ts) => ts.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
        Err(_) => raw.to_string(),
    }
}

// Splits on the last colon only; a field without one is all address.
fn split_address(field: &str) -> (String, String) {
    match field.rsplit_once(':') {
        Some((addr, port)) => (addr.to_string(), port.to_string()),
        None => (field.to_string(), String::new()),
    }
}

// The short service name is the final slash-segment of the target-group
// identifier; the identifier itself is not retained.
fn service_name(target_group_arn: &str) -> String {
    if target_group_arn == SENTINEL {
        return String::new();
    }
    target_group_arn
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}
