use anyhow::{Result, anyhow, bail};
use nom::{
    IResult,
    bytes::complete::{take_while, take_while1},
    character::complete::{char, space1},
    sequence::{delimited, preceded},
};

// https://docs.aws.amazon.com/elasticloadbalancing/latest/application/load-balancer-access-logs.html
//
// Positional fields of one access-log line, in source order, borrowed from
// the input. The load-balancer resource name and the certificate reference
// are consumed by the grammar but not retained.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFields<'a> {
    pub request_type: &'a str,
    pub time: &'a str,
    pub client: &'a str,
    pub target: &'a str,
    pub request_processing_time: &'a str,
    pub target_processing_time: &'a str,
    pub response_processing_time: &'a str,
    pub elb_status_code: &'a str,
    pub target_status_code: &'a str,
    pub received_bytes: &'a str,
    pub sent_bytes: &'a str,
    pub request: &'a str,
    pub method: &'a str,
    pub url: &'a str,
    pub protocol: &'a str,
    pub user_agent: &'a str,
    pub ssl_cipher: &'a str,
    pub ssl_protocol: &'a str,
    pub target_group_arn: &'a str,
    pub trace_id: &'a str,
    pub domain_name: &'a str,
    pub matched_rule_priority: &'a str,
    pub request_creation_time: &'a str,
    pub actions_executed: &'a str,
    pub redirect_url: &'a str,
    pub error_reason: &'a str,
    pub target_port_list: &'a str,
    pub target_status_code_list: &'a str,
    pub classification: &'a str,
    pub classification_reason: &'a str,
    pub tid: &'a str,
}

pub fn parse_fields(line: &str) -> Result<RawFields<'_>> {
    let line = line.trim_end();

    let (rest, request_type) = field(line, "type", bare)?;
    let (rest, time) = next(rest, "time", bare)?;
    let (rest, _elb) = next(rest, "elb", bare)?;
    let (rest, client) = next(rest, "client:port", bare)?;
    let (rest, target) = next(rest, "target:port", bare)?;
    let (rest, request_processing_time) = next(rest, "request_processing_time", decimal)?;
    let (rest, target_processing_time) = next(rest, "target_processing_time", decimal)?;
    let (rest, response_processing_time) = next(rest, "response_processing_time", decimal)?;
    let (rest, elb_status_code) = next(rest, "elb_status_code", digits_or_dash)?;
    let (rest, target_status_code) = next(rest, "target_status_code", bare)?;
    let (rest, received_bytes) = next(rest, "received_bytes", digits_or_dash)?;
    let (rest, sent_bytes) = next(rest, "sent_bytes", digits)?;
    let (rest, request) = next(rest, "request", quoted)?;
    let (method, url, protocol) = split_request(request)?;
    let (rest, user_agent) = next(rest, "user_agent", quoted)?;
    let (rest, ssl_cipher) = next(rest, "ssl_cipher", bare)?;
    let (rest, ssl_protocol) = next(rest, "ssl_protocol", bare)?;
    let (rest, target_group_arn) = next(rest, "target_group_arn", bare)?;
    let (rest, trace_id) = next(rest, "trace_id", quoted)?;
    let (rest, domain_name) = next(rest, "domain_name", quoted)?;
    let (rest, _chosen_cert_arn) = next(rest, "chosen_cert_arn", bare)?;
    let (rest, matched_rule_priority) = next(rest, "matched_rule_priority", bare)?;
    let (rest, request_creation_time) = next(rest, "request_creation_time", bare)?;
    let (rest, actions_executed) = next(rest, "actions_executed", quoted)?;
    let (rest, redirect_url) = next(rest, "redirect_url", quoted)?;
    let (rest, error_reason) = next(rest, "error_reason", quoted)?;
    let (rest, target_port_list) = next(rest, "target_port_list", quoted)?;
    let (rest, target_status_code_list) = next(rest, "target_status_code_list", quoted)?;
    let (rest, classification) = next(rest, "classification", quoted)?;
    let (rest, classification_reason) = next(rest, "classification_reason", quoted)?;
    let (_, tid) = next(rest, "tid", bare)?;
    // Anything after tid belongs to a newer field revision; ignore it.

    Ok(RawFields {
        request_type,
        time,
        client,
        target,
        request_processing_time,
        target_processing_time,
        response_processing_time,
        elb_status_code,
        target_status_code,
        received_bytes,
        sent_bytes,
        request,
        method,
        url,
        protocol,
        user_agent,
        ssl_cipher,
        ssl_protocol,
        target_group_arn,
        trace_id,
        domain_name,
        matched_rule_priority,
        request_creation_time,
        actions_executed,
        redirect_url,
        error_reason,
        target_port_list,
        target_status_code_list,
        classification,
        classification_reason,
        tid,
    })
}

fn field<'a, O>(
    input: &'a str,
    name: &'static str,
    mut parser: impl FnMut(&'a str) -> IResult<&'a str, O>,
) -> Result<(&'a str, O)> {
    parser(input).map_err(|_| anyhow!("malformed field `{name}`"))
}

fn next<'a, O>(
    input: &'a str,
    name: &'static str,
    parser: impl FnMut(&'a str) -> IResult<&'a str, O>,
) -> Result<(&'a str, O)> {
    field(input, name, preceded(space1, parser))
}

// The quoted request holds exactly three space-separated sub-tokens.
fn split_request(request: &str) -> Result<(&str, &str, &str)> {
    let mut parts = request.splitn(3, ' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(method), Some(url), Some(protocol))
            if !method.is_empty()
                && !url.is_empty()
                && !protocol.is_empty()
                && !protocol.contains(' ') =>
        {
            Ok((method, url, protocol))
        }
        _ => bail!("malformed field `request`"),
    }
}

fn bare(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c != ' ')(input)
}

fn quoted(input: &str) -> IResult<&str, &str> {
    delimited(char('"'), take_while(|c: char| c != '"'), char('"'))(input)
}

fn digits(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_digit())(input)
}

fn digits_or_dash(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_digit() || c == '-')(input)
}

// Processing times are fractional seconds, or -1 when the request never
// reached a target.
fn decimal(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_digit() || c == '.' || c == '-')(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE: &str = r#"https 2023-01-15T10:30:00.123456Z app/k8s-default-ingress 203.0.113.10:51234 10.0.2.15:8080 0.001 0.042 0.000 200 200 512 1024 "GET https://app.example.com:443/api/v1/items?id=42 HTTP/2.0" "Mozilla/5.0 (X11; Linux x86_64)" ECDHE-RSA-AES128-GCM-SHA256 TLSv1.2 arn:aws:elasticloadbalancing:eu-west-1:111122223333:targetgroup/web-backend/a1b2c3d4e5f6a7b8 "Root=1-63c3b0a8-1234567890abcdef12345678" "app.example.com" "arn:aws:acm:eu-west-1:111122223333:certificate/aaaabbbb-cccc-dddd-eeee-ffff00001111" 2 2023-01-15T10:30:00.100000Z "forward" "-" "-" "10.0.2.15:8080" "200" "-" "-" TID_0123456789abcdef"#;

    #[test]
    fn test_parse_full_line() {
        let fields = parse_fields(LINE).unwrap();
        assert_eq!(fields.request_type, "https");
        assert_eq!(fields.time, "2023-01-15T10:30:00.123456Z");
        assert_eq!(fields.client, "203.0.113.10:51234");
        assert_eq!(fields.target, "10.0.2.15:8080");
        assert_eq!(fields.request_processing_time, "0.001");
        assert_eq!(fields.target_processing_time, "0.042");
        assert_eq!(fields.response_processing_time, "0.000");
        assert_eq!(fields.elb_status_code, "200");
        assert_eq!(fields.target_status_code, "200");
        assert_eq!(fields.received_bytes, "512");
        assert_eq!(fields.sent_bytes, "1024");
        assert_eq!(
            fields.request,
            "GET https://app.example.com:443/api/v1/items?id=42 HTTP/2.0"
        );
        assert_eq!(fields.method, "GET");
        assert_eq!(fields.url, "https://app.example.com:443/api/v1/items?id=42");
        assert_eq!(fields.protocol, "HTTP/2.0");
        assert_eq!(fields.user_agent, "Mozilla/5.0 (X11; Linux x86_64)");
        assert_eq!(fields.ssl_cipher, "ECDHE-RSA-AES128-GCM-SHA256");
        assert_eq!(fields.ssl_protocol, "TLSv1.2");
        assert_eq!(
            fields.target_group_arn,
            "arn:aws:elasticloadbalancing:eu-west-1:111122223333:targetgroup/web-backend/a1b2c3d4e5f6a7b8"
        );
        assert_eq!(fields.trace_id, "Root=1-63c3b0a8-1234567890abcdef12345678");
        assert_eq!(fields.domain_name, "app.example.com");
        assert_eq!(fields.matched_rule_priority, "2");
        assert_eq!(fields.request_creation_time, "2023-01-15T10:30:00.100000Z");
        assert_eq!(fields.actions_executed, "forward");
        assert_eq!(fields.redirect_url, "-");
        assert_eq!(fields.error_reason, "-");
        assert_eq!(fields.target_port_list, "10.0.2.15:8080");
        assert_eq!(fields.target_status_code_list, "200");
        assert_eq!(fields.classification, "-");
        assert_eq!(fields.classification_reason, "-");
        assert_eq!(fields.tid, "TID_0123456789abcdef");
    }

    #[test]
    fn test_parse_line_without_target() {
        let line = r#"http 2018-11-30T22:23:00.186641Z app/my-loadbalancer/50dc6c495c0c9188 192.168.131.39:2817 - 0.000 0.001 0.000 200 200 34 366 "GET http://www.example.com:80/ HTTP/1.1" "curl/7.46.0" - - arn:aws:elasticloadbalancing:us-east-2:123456789012:targetgroup/my-targets/73e2d6bc24d8a067 "Root=1-58337364-23a8c76965a2ef7629b185e3" "-" "-" 0 2018-11-30T22:22:48.364000Z "forward" "-" "-" "-" "-" "-" "-" TID_aaaa1111bbbb2222"#;
        let fields = parse_fields(line).unwrap();
        assert_eq!(fields.target, "-");
        assert_eq!(fields.ssl_cipher, "-");
        assert_eq!(fields.domain_name, "-");
        assert_eq!(fields.tid, "TID_aaaa1111bbbb2222");
    }

    #[test]
    fn test_negative_processing_times() {
        let line = LINE.replace(" 0.001 0.042 0.000 ", " -1 -1 -1 ");
        let fields = parse_fields(&line).unwrap();
        assert_eq!(fields.request_processing_time, "-1");
        assert_eq!(fields.target_processing_time, "-1");
        assert_eq!(fields.response_processing_time, "-1");
    }

    #[test]
    fn test_trailing_fields_ignored() {
        let line = format!("{LINE} some-future-field \"another one\"");
        let fields = parse_fields(&line).unwrap();
        assert_eq!(fields.tid, "TID_0123456789abcdef");
    }

    #[test]
    fn test_truncated_line_names_missing_field() {
        let truncated = LINE.split(" \"GET ").next().unwrap();
        let err = parse_fields(truncated).unwrap_err();
        assert_eq!(err.to_string(), "malformed field `request`");
    }

    #[test]
    fn test_garbage_line_fails_early() {
        let err = parse_fields("complete nonsense").unwrap_err();
        assert!(err.to_string().contains("malformed field"));
    }

    #[test]
    fn test_non_numeric_status_rejected() {
        let line = LINE.replace(" 200 200 512 ", " abc 200 512 ");
        let err = parse_fields(&line).unwrap_err();
        assert_eq!(err.to_string(), "malformed field `elb_status_code`");
    }

    #[test]
    fn test_request_must_hold_three_tokens() {
        let line = LINE.replace(
            "\"GET https://app.example.com:443/api/v1/items?id=42 HTTP/2.0\"",
            "\"GET HTTP/2.0\"",
        );
        let err = parse_fields(&line).unwrap_err();
        assert_eq!(err.to_string(), "malformed field `request`");
    }

    #[test]
    fn test_empty_line() {
        assert!(parse_fields("").is_err());
        assert!(parse_fields("   ").is_err());
    }
}
