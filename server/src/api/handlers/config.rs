//! Rewrite configuration handlers
//!
//! `GET` serves the stored config as an HTML form, or as JSON when the
//! client asks for it. `POST` takes the form submission, `PUT` takes JSON.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use tracing::info;

use crate::api::ApiError;
use crate::models::{ProxyConfig, RewriteRule, RuleGroup, RuleKind, RuleSet};
use crate::rewrite;
use crate::AppState;

const CONFIG_PAGE: &str = include_str!("config_page.html");

/// Show the current configuration
pub async fn show_config(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let config = state.store.load().await?;

    let wants_json = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("application/json"));

    if wants_json {
        Ok(Json(config).into_response())
    } else {
        Ok(Html(render_config_page(&config)).into_response())
    }
}

/// Save a form submission from the config page
pub async fn save_config_form(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, &'static str), ApiError> {
    let config = parse_config_form(&body);
    validate_config(&config)?;
    state.store.save(&config).await?;

    info!(source = "form", "Rewrite configuration updated");
    Ok((StatusCode::OK, "Configuration saved!"))
}

/// Replace the configuration with a JSON document
pub async fn save_config_json(
    State(state): State<Arc<AppState>>,
    Json(config): Json<ProxyConfig>,
) -> Result<Json<ProxyConfig>, ApiError> {
    validate_config(&config)?;
    state.store.save(&config).await?;

    info!(source = "json", "Rewrite configuration updated");
    Ok(Json(config))
}

/// Reject rules that would break every rewritten response
pub fn validate_config(config: &ProxyConfig) -> Result<(), ApiError> {
    for group in [RuleGroup::Filename, RuleGroup::Location] {
        let rules = config.rules(group);
        if let Some(index) = rules.iter().position(|rule| rule.find.is_empty()) {
            return Err(ApiError::BadRequest(format!(
                "{} rule {} has an empty find value",
                group.as_str(),
                index + 1
            )));
        }
        rewrite::validate_rules(rules)
            .map_err(|e| ApiError::BadRequest(format!("{} rules: {}", group.as_str(), e)))?;
    }
    Ok(())
}

/// Urlencoded form fields, in submission order
struct FormFields(Vec<(String, String)>);

impl FormFields {
    fn parse(body: &[u8]) -> Self {
        Self(url::form_urlencoded::parse(body).into_owned().collect())
    }

    fn all(&self, name: &str) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
            .collect()
    }

    fn first(&self, name: &str) -> Option<&str> {
        self.all(name).first().copied()
    }

    /// Zip `<prefix>RuleType`, `<prefix>FindValue` and `<prefix>ReplaceValue`
    /// by index. Rows with an empty find value are dropped.
    fn rules(&self, prefix: &str) -> RuleSet {
        let kinds = self.all(&format!("{prefix}RuleType"));
        let finds = self.all(&format!("{prefix}FindValue"));
        let replaces = self.all(&format!("{prefix}ReplaceValue"));

        finds
            .iter()
            .enumerate()
            .filter(|(_, find)| !find.is_empty())
            .map(|(i, find)| RewriteRule {
                kind: RuleKind::from(kinds.get(i).copied().unwrap_or_default()),
                find: find.to_string(),
                replace: replaces.get(i).copied().unwrap_or_default().to_string(),
            })
            .collect()
    }
}

/// Build a config from the config page's form submission
pub fn parse_config_form(body: &[u8]) -> ProxyConfig {
    let fields = FormFields::parse(body);
    ProxyConfig {
        fix_timestamps: fields.first("fixTimestamps") == Some("on"),
        filename_rules: fields.rules(RuleGroup::Filename.as_str()),
        location_rules: fields.rules(RuleGroup::Location.as_str()),
    }
}

/// Render the config page for the given configuration
pub fn render_config_page(config: &ProxyConfig) -> String {
    CONFIG_PAGE
        .replace("{{fix_timestamps}}", if config.fix_timestamps { "checked" } else { "" })
        .replace("{{filename_rules}}", &render_rule_rows(&config.filename_rules, RuleGroup::Filename))
        .replace("{{location_rules}}", &render_rule_rows(&config.location_rules, RuleGroup::Location))
}

fn render_rule_rows(rules: &[RewriteRule], group: RuleGroup) -> String {
    let prefix = group.as_str();
    rules
        .iter()
        .map(|rule| {
            let mut options = String::new();
            for kind in [RuleKind::Exact, RuleKind::Regex] {
                let selected = if rule.kind == kind { " selected" } else { "" };
                let label = if kind == RuleKind::Exact { "Exact" } else { "Regex" };
                options.push_str(&format!(r#"<option value="{kind}"{selected}>{label}</option>"#));
            }
            if let RuleKind::Unrecognized(tag) = &rule.kind {
                let tag = htmlescape::encode_attribute(tag);
                options.push_str(&format!(r#"<option value="{tag}" selected>{tag}</option>"#));
            }

            format!(
                concat!(
                    r#"<div class="rule">"#,
                    r#"<label>Type: <select name="{prefix}RuleType">{options}</select></label>"#,
                    r#"<label>Find: <input type="text" name="{prefix}FindValue" value="{find}"></label>"#,
                    r#"<label>Replace: <input type="text" name="{prefix}ReplaceValue" value="{replace}"></label>"#,
                    r#"<button type="button" class="removeRule">Remove</button>"#,
                    "</div>\n"
                ),
                prefix = prefix,
                options = options,
                find = htmlescape::encode_attribute(&rule.find),
                replace = htmlescape::encode_attribute(&rule.replace),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_form_zips_rules_by_index() {
        let body = concat!(
            "fixTimestamps=on",
            "&filenameRuleType=exact&filenameFindValue=Movie.mkv&filenameReplaceValue=Film.mkv",
            "&filenameRuleType=regex&filenameFindValue=%28%5Cd%2B%29p&filenameReplaceValue=%241P",
            "&locationRuleType=regex&locationFindValue=%5Ehttp%3A&locationReplaceValue=https%3A",
        );
        let config = parse_config_form(body.as_bytes());

        assert!(config.fix_timestamps);
        assert_eq!(
            config.filename_rules,
            vec![
                RewriteRule::exact("Movie.mkv", "Film.mkv"),
                RewriteRule::regex(r"(\d+)p", "$1P"),
            ]
        );
        assert_eq!(config.location_rules, vec![RewriteRule::regex("^http:", "https:")]);
    }

    #[test]
    fn test_parse_form_defaults() {
        let config = parse_config_form(b"");
        assert_eq!(config, ProxyConfig::default());

        let config = parse_config_form(b"fixTimestamps=off");
        assert!(!config.fix_timestamps);
    }

    #[test]
    fn test_parse_form_drops_blank_rows_and_fills_missing_fields() {
        let body = "filenameRuleType=exact&filenameFindValue=&filenameReplaceValue=x\
                    &filenameRuleType=exact&filenameFindValue=a\
                    &filenameFindValue=b&filenameReplaceValue=c";
        let config = parse_config_form(body.as_bytes());

        assert_eq!(
            config.filename_rules,
            vec![
                RewriteRule::exact("a", "c"),
                RewriteRule {
                    kind: RuleKind::Unrecognized(String::new()),
                    find: "b".into(),
                    replace: "".into(),
                },
            ]
        );
    }

    #[test]
    fn test_parse_form_keeps_whitespace_find() {
        let config = parse_config_form(b"filenameRuleType=exact&filenameFindValue=+&filenameReplaceValue=.");
        assert_eq!(config.filename_rules, vec![RewriteRule::exact(" ", ".")]);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_config() {
        let mut config = ProxyConfig {
            filename_rules: vec![RewriteRule::exact("a", "b")],
            ..Default::default()
        };
        assert!(validate_config(&config).is_ok());

        config.location_rules.push(RewriteRule::regex("(", "x"));
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().starts_with("location rules:"));

        config.location_rules = vec![RewriteRule::exact("", "x")];
        assert_eq!(
            validate_config(&config).unwrap_err().to_string(),
            "location rule 1 has an empty find value"
        );
    }

    #[test]
    fn test_render_page_escapes_values() {
        let config = ProxyConfig {
            fix_timestamps: true,
            filename_rules: vec![RewriteRule::exact(r#"a"<b>"#, "c&d")],
            location_rules: vec![RewriteRule {
                kind: RuleKind::Unrecognized("glob".into()),
                find: "*".into(),
                replace: "x".into(),
            }],
        };
        let page = render_config_page(&config);

        assert!(page.contains("checked"));
        assert!(!page.contains(r#"a"<b>"#));
        assert!(page.contains(r#"name="filenameFindValue""#));
        assert!(page.contains(r#"<option value="exact" selected>Exact</option>"#));
        assert!(page.contains(r#"<option value="glob" selected>glob</option>"#));
        assert!(!page.contains("{{"));
    }
}
