//! Rule-based text rewriting
//!
//! Rules are compiled up front and then applied in order, each one over the
//! output of the previous. A rule replaces every non-overlapping match in a
//! single pass and never sees its own output again.
//!
//! Stored replacement strings use the `$1` / `$&` / `$<name>` / `$$` syntax
//! the configuration form has always accepted. They are translated into the
//! regex crate's `${1}` expansion syntax when a rule is compiled, so `$1P`
//! keeps meaning "group one followed by P".

pub mod timestamp;

use std::borrow::Cow;

use regex::{Captures, Regex, RegexBuilder};
use thiserror::Error;
use tracing::debug;

use crate::models::{RewriteRule, RuleKind};

/// Errors raised while compiling rules
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("invalid {kind} rule {find:?}: {source}")]
    InvalidPattern {
        kind: RuleKind,
        find: String,
        #[source]
        source: regex::Error,
    },
}

/// How a compiled rule produces its replacement text
#[derive(Clone)]
enum Replacement {
    /// Expansion template in regex crate syntax
    Template(String),
    /// Replacement computed from the captures of each match
    Computed(fn(&Captures<'_>) -> String),
}

/// A rule ready to run
#[derive(Clone)]
pub struct CompiledRule {
    regex: Regex,
    replacement: Replacement,
}

impl std::fmt::Debug for CompiledRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.replacement {
            Replacement::Template(_) => "template",
            Replacement::Computed(_) => "computed",
        };
        f.debug_struct("CompiledRule")
            .field("pattern", &self.regex.as_str())
            .field("replacement", &kind)
            .finish()
    }
}

impl CompiledRule {
    /// Compile a stored rule. Returns `Ok(None)` for rules that are skipped:
    /// unrecognized kinds and empty `find` strings.
    pub fn from_rule(rule: &RewriteRule) -> Result<Option<Self>, RuleError> {
        if rule.find.is_empty() {
            debug!(kind = %rule.kind, "Skipping rewrite rule with empty find");
            return Ok(None);
        }

        let regex = match &rule.kind {
            RuleKind::Exact => RegexBuilder::new(&regex::escape(&rule.find))
                .case_insensitive(true)
                .build(),
            RuleKind::Regex => Regex::new(&rule.find),
            RuleKind::Unrecognized(tag) => {
                debug!(kind = %tag, find = %rule.find, "Skipping rewrite rule of unknown type");
                return Ok(None);
            }
        }
        .map_err(|source| RuleError::InvalidPattern {
            kind: rule.kind.clone(),
            find: rule.find.clone(),
            source,
        })?;

        let template = translate_replacement(&rule.replace, &regex);
        Ok(Some(Self {
            regex,
            replacement: Replacement::Template(template),
        }))
    }

    /// A rule whose replacement is computed per match
    pub fn computed(regex: Regex, replace: fn(&Captures<'_>) -> String) -> Self {
        Self {
            regex,
            replacement: Replacement::Computed(replace),
        }
    }

    /// Replace every match in `text`
    pub fn apply<'t>(&self, text: &'t str) -> Cow<'t, str> {
        match &self.replacement {
            Replacement::Template(template) => self.regex.replace_all(text, template.as_str()),
            Replacement::Computed(replace) => self.regex.replace_all(text, |caps: &Captures<'_>| replace(caps)),
        }
    }
}

/// An ordered, compiled rule list
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    rules: Vec<CompiledRule>,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile every rule in order. Any invalid pattern fails the whole list,
    /// so a caller never applies half of a broken rule set.
    pub fn compile(rules: &[RewriteRule]) -> Result<Self, RuleError> {
        let mut engine = Self::new();
        engine.extend(rules)?;
        Ok(engine)
    }

    /// An engine whose first rule converts `getlastmodified` values to RFC1123
    pub fn with_timestamp_fix() -> Self {
        Self {
            rules: vec![timestamp::last_modified_rule()],
        }
    }

    /// Append stored rules after the ones already compiled
    pub fn extend(&mut self, rules: &[RewriteRule]) -> Result<(), RuleError> {
        for rule in rules {
            if let Some(compiled) = CompiledRule::from_rule(rule)? {
                self.rules.push(compiled);
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Run every rule over `text`, in order
    pub fn apply(&self, text: &str) -> String {
        let mut output = text.to_string();
        for rule in &self.rules {
            let replaced = match rule.apply(&output) {
                Cow::Owned(rewritten) => Some(rewritten),
                Cow::Borrowed(_) => None,
            };
            if let Some(rewritten) = replaced {
                output = rewritten;
            }
        }
        output
    }
}

/// Compile `rules` and apply them to `text`
pub fn apply(text: &str, rules: &[RewriteRule]) -> Result<String, RuleError> {
    Ok(RuleEngine::compile(rules)?.apply(text))
}

/// Check that every rule compiles
pub fn validate_rules(rules: &[RewriteRule]) -> Result<(), RuleError> {
    RuleEngine::compile(rules).map(|_| ())
}

/// Translate a stored replacement string into regex crate expansion syntax.
///
/// `$n` and `$nn` refer to a group only when the pattern has that many groups
/// (two digits are preferred when both would be valid); `$&` is the whole
/// match; `$<name>` is a named group the pattern defines. Every other `$` is
/// kept literally.
fn translate_replacement(replace: &str, regex: &Regex) -> String {
    let groups = regex.captures_len().saturating_sub(1);
    let mut out = String::with_capacity(replace.len() + 8);
    let mut rest = replace;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos + 1..];
        let (expansion, consumed) = expand_token(tail, groups, regex);
        out.push_str(&expansion);
        rest = &tail[consumed..];
    }
    out.push_str(rest);
    out
}

/// Expansion for the token following a `$`, and how many bytes it consumed
fn expand_token(tail: &str, groups: usize, regex: &Regex) -> (String, usize) {
    let literal = ("$$".to_string(), 0);
    let bytes = tail.as_bytes();

    match bytes.first() {
        Some(b'$') => ("$$".to_string(), 1),
        Some(b'&') => ("${0}".to_string(), 1),
        Some(first) if first.is_ascii_digit() => {
            let one = usize::from(first - b'0');
            if let Some(second) = bytes.get(1).filter(|b| b.is_ascii_digit()) {
                let two = one * 10 + usize::from(second - b'0');
                if (1..=groups).contains(&two) {
                    return (format!("${{{two}}}"), 2);
                }
            }
            if (1..=groups).contains(&one) {
                (format!("${{{one}}}"), 1)
            } else {
                literal
            }
        }
        Some(b'<') => match tail.find('>') {
            Some(end) => {
                let name = &tail[1..end];
                if regex.capture_names().flatten().any(|n| n == name) {
                    (format!("${{{name}}}"), end + 1)
                } else {
                    literal
                }
            }
            None => literal,
        },
        _ => literal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_exact_rule_is_case_insensitive() {
        let rules = vec![RewriteRule::exact("Movie.mkv", "Film.mkv")];
        let out = apply("<d:displayname>movie.mkv</d:displayname>", &rules).unwrap();
        assert_eq!(out, "<d:displayname>Film.mkv</d:displayname>");
    }

    #[test]
    fn test_exact_rule_escapes_metacharacters() {
        let rules = vec![RewriteRule::exact("a.b(1)", "x")];
        assert_eq!(apply("a.b(1) aXb(1)", &rules).unwrap(), "x aXb(1)");
    }

    #[test]
    fn test_exact_rule_replaces_every_occurrence() {
        let rules = vec![RewriteRule::exact("[RARBG]", "")];
        assert_eq!(apply("A [RARBG] B [rarbg]", &rules).unwrap(), "A  B ");
    }

    #[test]
    fn test_regex_rule_with_group_reference() {
        let rules = vec![RewriteRule::regex(r"(\d+)p", "$1P")];
        assert_eq!(apply("1080p", &rules).unwrap(), "1080P");
    }

    #[test]
    fn test_regex_rule_is_case_sensitive() {
        let rules = vec![RewriteRule::regex("mkv", "MKV")];
        assert_eq!(apply("a.mkv b.MkV", &rules).unwrap(), "a.MKV b.MkV");
    }

    #[test]
    fn test_empty_rule_set_is_identity() {
        let text = "<d:multistatus>unchanged</d:multistatus>";
        assert_eq!(apply(text, &[]).unwrap(), text);
    }

    #[test]
    fn test_rules_chain_in_order() {
        let rules = vec![
            RewriteRule::exact("one", "two"),
            RewriteRule::exact("two", "three"),
        ];
        assert_eq!(apply("one", &rules).unwrap(), "three");

        let reversed: Vec<_> = rules.into_iter().rev().collect();
        assert_eq!(apply("one", &reversed).unwrap(), "two");
    }

    #[test]
    fn test_rule_does_not_rematch_its_own_output() {
        let rules = vec![RewriteRule::exact("a", "aa")];
        assert_eq!(apply("aXa", &rules).unwrap(), "aaXaa");
    }

    #[test]
    fn test_unrecognized_and_empty_rules_are_skipped() {
        let rules = vec![
            RewriteRule {
                kind: RuleKind::Unrecognized("glob".into()),
                find: "*".into(),
                replace: "x".into(),
            },
            RewriteRule::exact("", "x"),
            RewriteRule::exact("b", "c"),
        ];
        let engine = RuleEngine::compile(&rules).unwrap();
        assert_eq!(engine.len(), 1);
        assert_eq!(engine.apply("abc"), "acc");
    }

    #[test]
    fn test_invalid_regex_fails_the_whole_set() {
        let rules = vec![
            RewriteRule::exact("a", "b"),
            RewriteRule::regex("(unclosed", "x"),
        ];
        let err = apply("a", &rules).unwrap_err();
        let RuleError::InvalidPattern { kind, find, .. } = err;
        assert_eq!(kind, RuleKind::Regex);
        assert_eq!(find, "(unclosed");
        assert!(validate_rules(&rules).is_err());
    }

    #[test]
    fn test_replacement_translation() {
        let re = Regex::new(r"(a)(b)(?<tail>c)").unwrap();
        assert_eq!(translate_replacement("$2$1", &re), "${2}${1}");
        assert_eq!(translate_replacement("[$&]", &re), "[${0}]");
        assert_eq!(translate_replacement("$<tail>!", &re), "${tail}!");
        assert_eq!(translate_replacement("$$5", &re), "$$5");
        assert_eq!(translate_replacement("$9", &re), "$$9");
        assert_eq!(translate_replacement("cost $", &re), "cost $$");
        assert_eq!(translate_replacement("$<nope>", &re), "$$<nope>");
    }

    #[test]
    fn test_two_digit_group_only_when_defined() {
        let re = Regex::new(r"(a)").unwrap();
        assert_eq!(translate_replacement("$10", &re), "${1}0");
    }

    #[test]
    fn test_literal_dollar_in_exact_replacement() {
        let rules = vec![RewriteRule::exact("price", "$5 & $&")];
        assert_eq!(apply("Price", &rules).unwrap(), "$5 & Price");
    }

    #[test]
    fn test_deterministic() {
        let rules = vec![RewriteRule::regex(r"\s+", " ")];
        let text = "a   b\t\tc";
        assert_eq!(apply(text, &rules).unwrap(), apply(text, &rules).unwrap());
    }
}
