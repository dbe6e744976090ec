//! Data models for zurg-edge
//!
//! The persisted rewrite configuration and the rule types it is made of.
//! Field names match the JSON document the config store keeps on disk.

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Rewrite Rules
// ============================================================================

/// How a rule's `find` string is interpreted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RuleKind {
    /// Literal, case-insensitive substring match
    Exact,
    /// Regular expression, case-sensitive unless the pattern says otherwise
    Regex,
    /// A tag this version does not know; kept verbatim and skipped when applied
    Unrecognized(String),
}

impl RuleKind {
    pub fn as_str(&self) -> &str {
        match self {
            RuleKind::Exact => "exact",
            RuleKind::Regex => "regex",
            RuleKind::Unrecognized(tag) => tag,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, RuleKind::Unrecognized(_))
    }
}

impl From<String> for RuleKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "exact" => RuleKind::Exact,
            "regex" => RuleKind::Regex,
            _ => RuleKind::Unrecognized(tag),
        }
    }
}

impl From<&str> for RuleKind {
    fn from(tag: &str) -> Self {
        RuleKind::from(tag.to_string())
    }
}

impl From<RuleKind> for String {
    fn from(kind: RuleKind) -> Self {
        match kind {
            RuleKind::Unrecognized(tag) => tag,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single find/replace rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteRule {
    #[serde(rename = "type")]
    pub kind: RuleKind,

    /// Literal text (exact) or pattern source (regex)
    pub find: String,

    /// Replacement text; may reference capture groups as `$1`, `$&` or `$<name>`
    #[serde(default)]
    pub replace: String,
}

impl RewriteRule {
    pub fn exact(find: impl Into<String>, replace: impl Into<String>) -> Self {
        Self {
            kind: RuleKind::Exact,
            find: find.into(),
            replace: replace.into(),
        }
    }

    pub fn regex(find: impl Into<String>, replace: impl Into<String>) -> Self {
        Self {
            kind: RuleKind::Regex,
            find: find.into(),
            replace: replace.into(),
        }
    }
}

/// Ordered rules; each one runs over the output of the previous
pub type RuleSet = Vec<RewriteRule>;

/// Which rule group a rule belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleGroup {
    /// Applied to WebDAV multi-status bodies
    Filename,
    /// Applied to `Location` response headers
    Location,
}

impl RuleGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleGroup::Filename => "filename",
            RuleGroup::Location => "location",
        }
    }
}

// ============================================================================
// Proxy Configuration
// ============================================================================

/// Persisted rewrite configuration, loaded once per request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    /// Convert `getlastmodified` values to RFC1123
    #[serde(default)]
    pub fix_timestamps: bool,

    /// Rules applied to PROPFIND multi-status bodies
    #[serde(default, alias = "rewriteRules")]
    pub filename_rules: RuleSet,

    /// Rules applied to the `Location` header of any response
    #[serde(default, alias = "locationRewriteRules")]
    pub location_rules: RuleSet,
}

impl ProxyConfig {
    pub fn rules(&self, group: RuleGroup) -> &RuleSet {
        match group {
            RuleGroup::Filename => &self.filename_rules,
            RuleGroup::Location => &self.location_rules,
        }
    }

    pub fn rules_mut(&mut self, group: RuleGroup) -> &mut RuleSet {
        match group {
            RuleGroup::Filename => &mut self.filename_rules,
            RuleGroup::Location => &mut self.location_rules,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProxyConfig::default();
        assert!(!config.fix_timestamps);
        assert!(config.filename_rules.is_empty());
        assert!(config.location_rules.is_empty());
    }

    #[test]
    fn test_partial_document_uses_defaults() {
        let config: ProxyConfig = serde_json::from_str(r#"{"fixTimestamps": true}"#).unwrap();
        assert!(config.fix_timestamps);
        assert!(config.filename_rules.is_empty());
    }

    #[test]
    fn test_legacy_field_names() {
        let json = r#"{
            "fixTimestamps": false,
            "rewriteRules": [{"type": "exact", "find": "a", "replace": "b"}],
            "locationRewriteRules": [{"type": "regex", "find": "^http:", "replace": "https:"}]
        }"#;
        let config: ProxyConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.filename_rules, vec![RewriteRule::exact("a", "b")]);
        assert_eq!(config.location_rules, vec![RewriteRule::regex("^http:", "https:")]);
    }

    #[test]
    fn test_unknown_kind_survives_round_trip() {
        let json = r#"{"type": "glob", "find": "*.mkv", "replace": "x"}"#;
        let rule: RewriteRule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.kind, RuleKind::Unrecognized("glob".into()));
        assert!(!rule.kind.is_recognized());

        let value = serde_json::to_value(&rule).unwrap();
        assert_eq!(value["type"], "glob");
    }

    #[test]
    fn test_serializes_camel_case() {
        let config = ProxyConfig {
            fix_timestamps: true,
            ..Default::default()
        };
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["fixTimestamps"], true);
        assert!(value["filenameRules"].as_array().unwrap().is_empty());
        assert!(value["locationRules"].as_array().unwrap().is_empty());
    }
}
