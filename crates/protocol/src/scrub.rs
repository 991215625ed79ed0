use regex::Regex;
use std::borrow::Cow;
use std::sync::OnceLock;

/// Placeholder written into sanitized raw logs in place of the certificate
/// identifier.
pub const CERT_PLACEHOLDER: &str = "CERT_ARN";
/// Placeholder written in place of the account identifier.
pub const ACCOUNT_PLACEHOLDER: &str = "ACCOUNT_ID";

const CANONICAL_RESOURCE_PATH: &str = "app/k8s-default-ingress";

/// Operator identifiers that must never appear in stored raw log copies.
/// An empty secret disables that substitution.
#[derive(Debug, Clone, Default)]
pub struct RedactionSecrets {
    pub cert_arn: String,
    pub account_id: String,
}

fn resource_path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"app/k8s-default-ingressn-[a-z0-9]+/[a-z0-9]+").expect("resource path pattern")
    })
}

/// Collapses the per-rollout hash suffixes in load-balancer resource paths
/// so otherwise-identical lines keep an identical shape. Must run before
/// grammar matching: the suffix sits inside a token the grammar treats as
/// opaque.
pub fn canonicalize_resource_path(line: &str) -> Cow<'_, str> {
    resource_path_re().replace_all(line, CANONICAL_RESOURCE_PATH)
}

/// Substitutes every occurrence of the configured secrets with the fixed
/// placeholders.
pub fn redact(line: &str, secrets: &RedactionSecrets) -> String {
    let mut out = line.to_string();
    if !secrets.cert_arn.is_empty() {
        out = out.replace(&secrets.cert_arn, CERT_PLACEHOLDER);
    }
    if !secrets.account_id.is_empty() {
        out = out.replace(&secrets.account_id, ACCOUNT_PLACEHOLDER);
    }
    out
}
