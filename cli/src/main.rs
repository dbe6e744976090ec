//! zurgctl - Command-line interface for zurg-edge
//!
//! Reads and edits the proxy's rewrite rules over `/config`, and previews
//! what a set of rules does to a saved PROPFIND response.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use reqwest::blocking::{Client, RequestBuilder};

use zurg_edge::models::{ProxyConfig, RewriteRule, RuleGroup, RuleKind};
use zurg_edge::transform::{rewrite_location, rewrite_multistatus};

/// zurgctl - Manage a zurg-edge proxy
#[derive(Parser)]
#[command(name = "zurgctl")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "CLI for zurg-edge, the Zurg WebDAV rewriting proxy", long_about = None)]
struct Cli {
    /// zurg-edge URL
    #[arg(short, long, env = "ZURGCTL_URL", default_value = "http://127.0.0.1:8080")]
    url: String,

    /// Basic auth username
    #[arg(long, env = "ZURGCTL_USER")]
    user: Option<String>,

    /// Basic auth password
    #[arg(long, env = "ZURGCTL_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current configuration
    Show {
        /// Print raw JSON
        #[arg(long)]
        json: bool,
    },

    /// Turn the RFC 1123 timestamp fix on or off
    Timestamps {
        #[arg(value_enum)]
        state: Toggle,
    },

    /// Append a rewrite rule
    Add {
        #[arg(value_enum)]
        group: Group,

        /// Rule type (exact, regex)
        #[arg(short, long, default_value = "exact")]
        kind: String,

        /// Text or pattern to find
        #[arg(short, long)]
        find: String,

        /// Replacement text
        #[arg(short, long, default_value = "")]
        replace: String,
    },

    /// Remove a rule by its 1-based position
    Remove {
        #[arg(value_enum)]
        group: Group,

        index: usize,
    },

    /// Remove every rule in a group
    Clear {
        #[arg(value_enum)]
        group: Group,
    },

    /// Run the rules over a saved response locally
    Preview {
        /// File holding a PROPFIND body, or a Location value with --location
        #[arg(short, long)]
        input: PathBuf,

        /// Use this config file instead of the server's
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Treat the input as a Location header value
        #[arg(long)]
        location: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

#[derive(Clone, Copy, ValueEnum)]
enum Group {
    Filename,
    Location,
}

impl From<Group> for RuleGroup {
    fn from(group: Group) -> Self {
        match group {
            Group::Filename => RuleGroup::Filename,
            Group::Location => RuleGroup::Location,
        }
    }
}

struct ConfigClient {
    client: Client,
    url: String,
    credentials: Option<(String, Option<String>)>,
}

impl ConfigClient {
    fn new(cli: &Cli) -> Self {
        Self {
            client: Client::new(),
            url: format!("{}/config", cli.url.trim_end_matches('/')),
            credentials: cli.user.clone().map(|user| (user, cli.password.clone())),
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some((user, password)) => request.basic_auth(user, password.as_ref()),
            None => request,
        }
    }

    fn fetch(&self) -> Result<ProxyConfig> {
        let response = self
            .authorize(self.client.get(&self.url))
            .header("Accept", "application/json")
            .send()
            .context("Failed to reach zurg-edge")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().unwrap_or_else(|_| "Unknown error".to_string());
            anyhow::bail!("Request failed ({}): {}", status, error_text);
        }

        response.json().context("Failed to parse configuration")
    }

    fn store(&self, config: &ProxyConfig) -> Result<()> {
        let response = self
            .authorize(self.client.put(&self.url))
            .json(config)
            .send()
            .context("Failed to reach zurg-edge")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().unwrap_or_else(|_| "Unknown error".to_string());
            anyhow::bail!("Save failed ({}): {}", status, error_text);
        }
        Ok(())
    }

    /// Fetch, edit, and write back the configuration
    fn update(&self, edit: impl FnOnce(&mut ProxyConfig) -> Result<()>) -> Result<ProxyConfig> {
        let mut config = self.fetch()?;
        edit(&mut config)?;
        self.store(&config)?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let api = ConfigClient::new(&cli);

    match cli.command {
        Commands::Show { json } => {
            let config = api.fetch()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                print_config(&config);
            }
        }

        Commands::Timestamps { state } => {
            let enabled = matches!(state, Toggle::On);
            api.update(|config| {
                config.fix_timestamps = enabled;
                Ok(())
            })?;
            let label = if enabled { "enabled".green() } else { "disabled".yellow() };
            println!("{} timestamp fix {}", "✓".green(), label);
        }

        Commands::Add {
            group,
            kind,
            find,
            replace,
        } => {
            let rule = RewriteRule {
                kind: RuleKind::from(kind),
                find,
                replace,
            };
            if !rule.kind.is_recognized() {
                anyhow::bail!("Unknown rule type '{}' (expected exact or regex)", rule.kind);
            }

            let group = RuleGroup::from(group);
            let config = api.update(|config| {
                config.rules_mut(group).push(rule);
                Ok(())
            })?;
            println!(
                "{} Added {} rule #{}",
                "✓".green(),
                group.as_str(),
                config.rules(group).len()
            );
        }

        Commands::Remove { group, index } => {
            let group = RuleGroup::from(group);
            let mut removed = None;
            api.update(|config| {
                let rules = config.rules_mut(group);
                if index == 0 || index > rules.len() {
                    anyhow::bail!("No {} rule #{} ({} defined)", group.as_str(), index, rules.len());
                }
                removed = Some(rules.remove(index - 1));
                Ok(())
            })?;
            if let Some(rule) = removed {
                println!("{} Removed {} rule {}", "✓".green(), group.as_str(), describe(&rule));
            }
        }

        Commands::Clear { group } => {
            let group = RuleGroup::from(group);
            api.update(|config| {
                config.rules_mut(group).clear();
                Ok(())
            })?;
            println!("{} Cleared {} rules", "✓".green(), group.as_str());
        }

        Commands::Preview {
            input,
            config,
            location,
        } => {
            let config = match config {
                Some(path) => {
                    let raw = fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                    serde_json::from_str(&raw)
                        .with_context(|| format!("Invalid config file: {}", path.display()))?
                }
                None => api.fetch()?,
            };

            let text = fs::read_to_string(&input)
                .with_context(|| format!("Failed to read input: {}", input.display()))?;

            if location {
                match rewrite_location(text.trim(), &config.location_rules)? {
                    Some(rewritten) => println!("{}", rewritten),
                    None => println!("{}", "(unchanged)".dimmed()),
                }
            } else {
                print!("{}", rewrite_multistatus(&text, &config)?);
            }
        }
    }

    Ok(())
}

fn print_config(config: &ProxyConfig) {
    println!("{}", "zurg-edge Configuration".bright_cyan().bold());
    println!("{}", "=".repeat(40).bright_blue());
    println!(
        "{} {}",
        "Timestamp fix:".cyan(),
        if config.fix_timestamps { "on".green() } else { "off".yellow() }
    );

    for group in [RuleGroup::Filename, RuleGroup::Location] {
        let rules = config.rules(group);
        println!("\n{} ({})", format!("{} rules", group.as_str()).cyan().bold(), rules.len());
        for (i, rule) in rules.iter().enumerate() {
            println!("  {}. {}", i + 1, describe(rule));
        }
    }
}

fn describe(rule: &RewriteRule) -> String {
    let kind = if rule.kind.is_recognized() {
        rule.kind.to_string().normal()
    } else {
        format!("{} (ignored)", rule.kind).red()
    };
    format!("[{}] {:?} -> {:?}", kind, rule.find, rule.replace)
}
