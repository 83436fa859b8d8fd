//! Configuration validation.
//!
//! Detects unknown or misspelled fields, type errors, and settings that would
//! make the authorization flow fail or weaken it.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use url::Url;

use crate::{
    env_subst::{has_placeholder, substitute_env},
    loader::{parse_config, parse_config_value},
    schema::{StorageMode, WicketConfig},
};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unknown-field", "type-error", "invalid-value",
    /// "security"
    pub category: &'static str,
    /// Dotted path, e.g. "client.redirect_uri"
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn new(
        severity: Severity,
        category: &'static str,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "{} [{}]: {}", self.severity, self.category, self.message)
        } else {
            write!(
                f,
                "{} [{}] {}: {}",
                self.severity, self.category, self.path, self.message
            )
        }
    }
}

/// Result of validating a configuration file.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

/// Expected shape of the configuration tree.
enum KnownKeys {
    Struct(HashMap<&'static str, KnownKeys>),
    /// Dynamic keys with scalar values (`client.extras`).
    Map,
    Leaf,
}

fn build_schema_map() -> KnownKeys {
    use KnownKeys::{Leaf, Map, Struct};

    Struct(HashMap::from([
        ("auth_server_url", Leaf),
        ("min_validity_seconds", Leaf),
        ("debug", Leaf),
        (
            "client",
            Struct(HashMap::from([
                ("client_id", Leaf),
                ("client_secret", Leaf),
                ("redirect_uri", Leaf),
                ("scope", Leaf),
                ("extras", Map),
            ])),
        ),
        (
            "storage",
            Struct(HashMap::from([("mode", Leaf), ("path", Leaf)])),
        ),
        ("http", Struct(HashMap::from([("timeout_secs", Leaf)]))),
    ]))
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b_len = b.chars().count();
    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.chars().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_len]
}

/// Closest candidate within `max_distance` edits.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    candidates
        .iter()
        .map(|&c| (c, levenshtein(needle, c)))
        .filter(|&(_, d)| d > 0 && d <= max_distance)
        .min_by_key(|&(c, d)| (d, c))
        .map(|(c, _)| c)
}

/// Validate a config file at the given path, or the discovered one if `path`
/// is `None`.
#[must_use]
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let Some(actual_path) = path
        .map(Path::to_path_buf)
        .or_else(crate::loader::find_config_file)
    else {
        return ValidationResult {
            diagnostics: vec![Diagnostic::new(
                Severity::Error,
                "syntax",
                "",
                "no config file found",
            )],
            config_path: None,
        };
    };

    let mut result = match std::fs::read_to_string(&actual_path) {
        Ok(content) => validate_str(&content, &actual_path),
        Err(e) => ValidationResult {
            diagnostics: vec![Diagnostic::new(
                Severity::Error,
                "syntax",
                "",
                format!("failed to read config file: {e}"),
            )],
            config_path: None,
        },
    };
    result.config_path = Some(actual_path);
    result
}

/// Validate raw config text. `path` only selects the format by extension.
#[must_use]
pub fn validate_str(raw: &str, path: &Path) -> ValidationResult {
    let mut diagnostics = Vec::new();

    let tree = match parse_config_value(raw, path) {
        Ok(tree) => tree,
        Err(e) => {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "syntax",
                "",
                format!("syntax error: {e}"),
            ));
            return ValidationResult {
                diagnostics,
                config_path: None,
            };
        },
    };

    check_unknown_fields(&tree, &build_schema_map(), "", &mut diagnostics);
    check_plaintext_secret(&tree, &mut diagnostics);

    match parse_config(&substitute_env(raw), path) {
        Ok(config) => check_semantics(&config, &mut diagnostics),
        Err(e) => diagnostics.push(Diagnostic::new(
            Severity::Error,
            "type-error",
            "",
            format!("type error: {e}"),
        )),
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

fn check_unknown_fields(
    value: &serde_json::Value,
    schema: &KnownKeys,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let (serde_json::Value::Object(table), KnownKeys::Struct(fields)) = (value, schema) else {
        return;
    };

    let known_keys: Vec<&str> = fields.keys().copied().collect();
    for (key, child_value) in table {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        if let Some(child_schema) = fields.get(key.as_str()) {
            check_unknown_fields(child_value, child_schema, &path, diagnostics);
            continue;
        }

        let message = match suggest(key, &known_keys, 3) {
            Some(s) => format!("unknown field (did you mean \"{s}\"?)"),
            None => "unknown field".to_string(),
        };
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "unknown-field",
            path,
            message,
        ));
    }
}

fn check_plaintext_secret(tree: &serde_json::Value, diagnostics: &mut Vec<Diagnostic>) {
    let secret = tree
        .get("client")
        .and_then(|c| c.get("client_secret"))
        .and_then(|s| s.as_str());
    if let Some(secret) = secret
        && !has_placeholder(secret)
    {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "security",
            "client.client_secret",
            "client secret is stored in plain text; use ${ENV_VAR} instead",
        ));
    }
}

fn check_semantics(config: &WicketConfig, diagnostics: &mut Vec<Diagnostic>) {
    match Url::parse(&config.auth_server_url) {
        Ok(url) if !matches!(url.scheme(), "http" | "https") => {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "invalid-value",
                "auth_server_url",
                format!("unsupported scheme \"{}\"", url.scheme()),
            ));
        },
        Ok(url) if url.scheme() == "http" && !is_loopback(&url) => {
            diagnostics.push(Diagnostic::new(
                Severity::Warning,
                "security",
                "auth_server_url",
                "issuer uses plain http; tokens would travel unencrypted",
            ));
        },
        Ok(_) => {},
        Err(e) => diagnostics.push(Diagnostic::new(
            Severity::Error,
            "invalid-value",
            "auth_server_url",
            format!("not a valid URL: {e}"),
        )),
    }

    if config.client.identity.client_id.trim().is_empty() {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "invalid-value",
            "client.client_id",
            "client id is empty",
        ));
    }

    if let Some(redirect_uri) = &config.client.redirect_uri
        && let Err(e) = Url::parse(redirect_uri)
    {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "invalid-value",
            "client.redirect_uri",
            format!("not a valid URL: {e}"),
        ));
    }

    if !config
        .client
        .scope
        .split_whitespace()
        .any(|s| s == "openid")
    {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "invalid-value",
            "client.scope",
            "scope lacks \"openid\"; no ID token will be issued",
        ));
    }

    match (config.storage.mode, &config.storage.path) {
        (StorageMode::File, None) => diagnostics.push(Diagnostic::new(
            Severity::Error,
            "invalid-value",
            "storage.path",
            "file storage requires storage.path",
        )),
        (mode @ (StorageMode::Memory | StorageMode::Ephemeral), Some(_)) => {
            diagnostics.push(Diagnostic::new(
                Severity::Warning,
                "invalid-value",
                "storage.path",
                format!("storage.path is ignored in {} mode", mode.as_str()),
            ));
        },
        _ => {},
    }
    if config.storage.mode == StorageMode::Ephemeral {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "security",
            "storage.mode",
            "ephemeral storage disables PKCE and does not verify the returned state",
        ));
    }

    if config.min_validity_seconds == Some(0) {
        diagnostics.push(Diagnostic::new(
            Severity::Info,
            "invalid-value",
            "min_validity_seconds",
            "0 disables automatic token renewal",
        ));
    }

    if config.http.timeout_secs == 0 {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "invalid-value",
            "http.timeout_secs",
            "timeout must be at least one second",
        ));
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(url::Host::Domain(domain)) => domain == "localhost",
        Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
        Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
auth_server_url = "https://idp.example/realm"
min_validity_seconds = 30

[client]
client_id = "c1"
client_secret = "${WICKET_CLIENT_SECRET}"
redirect_uri = "http://127.0.0.1:8765/callback"
scope = "openid profile"

[client.extras]
prompt = "login"

[storage]
mode = "file"
path = "/tmp/wicket-pending.json"

[http]
timeout_secs = 10
"#;

    fn check(raw: &str) -> ValidationResult {
        validate_str(raw, Path::new("wicket.toml"))
    }

    fn find<'a>(result: &'a ValidationResult, path: &str) -> Option<&'a Diagnostic> {
        result.diagnostics.iter().find(|d| d.path == path)
    }

    #[test]
    fn levenshtein_distances() {
        assert_eq!(levenshtein("client", "client"), 0);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("scope", "scop"), 1);
        assert_eq!(levenshtein("storage", "storgae"), 2);
    }

    #[test]
    fn valid_config_has_no_diagnostics() {
        let result = check(VALID);
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn unknown_nested_key_with_suggestion() {
        let result = check(
            "auth_server_url = \"https://idp.example\"\n[client]\nclient_id = \"c1\"\nredirect_url = \"http://127.0.0.1/\"\n",
        );
        let d = find(&result, "client.redirect_url").unwrap();
        assert_eq!(d.category, "unknown-field");
        assert!(d.message.contains("redirect_uri"), "{}", d.message);
        assert!(result.has_errors());
    }

    #[test]
    fn extras_accept_any_key() {
        let result = check(
            "auth_server_url = \"https://idp.example\"\n[client]\nclient_id = \"c1\"\n[client.extras]\nkc_idp_hint = \"corp\"\n",
        );
        assert!(!result.has_errors(), "{:?}", result.diagnostics);
    }

    #[test]
    fn syntax_error_stops_validation() {
        let result = check("auth_server_url = \n");
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].category, "syntax");
    }

    #[test]
    fn missing_client_is_a_type_error() {
        let result = check("auth_server_url = \"https://idp.example\"\n");
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.category == "type-error")
        );
    }

    #[test]
    fn plaintext_secret_warned() {
        let result = check(
            "auth_server_url = \"https://idp.example\"\n[client]\nclient_id = \"c1\"\nclient_secret = \"hunter2\"\n",
        );
        let d = find(&result, "client.client_secret").unwrap();
        assert_eq!(d.severity, Severity::Warning);
        assert_eq!(d.category, "security");
    }

    #[test]
    fn semantic_errors_reported() {
        let result = check(
            r#"
auth_server_url = "ftp://idp.example"
[client]
client_id = " "
redirect_uri = "not a url"
[storage]
mode = "file"
[http]
timeout_secs = 0
"#,
        );
        for path in [
            "auth_server_url",
            "client.client_id",
            "client.redirect_uri",
            "storage.path",
            "http.timeout_secs",
        ] {
            let d = find(&result, path).unwrap_or_else(|| panic!("no diagnostic for {path}"));
            assert_eq!(d.severity, Severity::Error, "{d}");
        }
    }

    #[test]
    fn warnings_for_weak_settings() {
        let result = check(
            r#"
auth_server_url = "http://idp.example"
min_validity_seconds = 0
[client]
client_id = "c1"
scope = "profile"
[storage]
mode = "ephemeral"
path = "/tmp/x.json"
"#,
        );
        assert!(!result.has_errors(), "{:?}", result.diagnostics);
        assert_eq!(
            find(&result, "auth_server_url").unwrap().severity,
            Severity::Warning
        );
        assert!(find(&result, "client.scope").is_some());
        assert!(find(&result, "storage.path").is_some());
        assert!(find(&result, "storage.mode").is_some());
        assert_eq!(result.count(Severity::Info), 1);
    }

    #[test]
    fn loopback_http_issuer_not_warned() {
        let result = check(
            "auth_server_url = \"http://127.0.0.1:8080/realm\"\n[client]\nclient_id = \"c1\"\n",
        );
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn validates_yaml() {
        let result = validate_str(
            "auth_server_url: https://idp.example\nclient:\n  client_id: c1\n  scpoe: openid\n",
            Path::new("wicket.yaml"),
        );
        let d = find(&result, "client.scpoe").unwrap();
        assert!(d.message.contains("scope"));
    }

    #[test]
    fn validate_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wicket.toml");
        std::fs::write(&path, VALID).unwrap();
        let result = validate(Some(&path));
        assert_eq!(result.config_path.as_deref(), Some(path.as_path()));
        assert!(result.diagnostics.is_empty());
    }
}
