use anyhow::Result;
use chrono::NaiveTime;
use clap::{Parser, Subcommand};
use colored::*;
use drumline_core::{
    codec,
    config::DEFAULT_LOG_FILTER,
    database::{Database, SCHEMA_VERSION},
    rule_engine::RuleStore,
    Category, Config, Hostname, Rule,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tabled::{Table, Tabled};

#[derive(Parser)]
#[command(name = "drumline")]
#[command(about = "Drumline - block hostnames all day or at set times", version)]
struct Cli {
    /// Database file path
    #[arg(short, long, default_value_os_t = Config::from_env().database)]
    database: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage block rules
    Rules {
        #[command(subcommand)]
        action: RulesAction,
    },
    /// Block a hostname, indefinitely or at daily times
    Block {
        /// Hostname or URL
        hostname: String,
        /// Daily block times, e.g. "9-12,13:30-17"
        #[arg(long)]
        times: Option<String>,
    },
    /// Remove a hostname's indefinite block
    Unblock {
        /// Hostname or URL
        hostname: String,
    },
    /// Remove a hostname's daily block times
    ClearTimes {
        /// Hostname or URL
        hostname: String,
    },
    /// Check whether a hostname is blocked
    Check {
        /// Hostname or URL
        hostname: String,
        /// Time of day as HH:MM (default: now)
        #[arg(long, value_parser = parse_clock)]
        at: Option<NaiveTime>,
    },
    /// Show rule and database status
    Status,
}

#[derive(Subcommand)]
enum RulesAction {
    /// List all rules
    List,
    /// Export rules to JSON
    Export {
        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Import rules from JSON
    Import {
        /// Input file
        #[arg(short, long)]
        input: PathBuf,
    },
}

#[derive(Tabled)]
struct RuleRow {
    #[tabled(rename = "Hostname")]
    hostname: String,
    #[tabled(rename = "Indefinite")]
    indefinite: String,
    #[tabled(rename = "Daily block times")]
    times: String,
    #[tabled(rename = "Blocked now")]
    blocked_now: String,
}

fn parse_clock(s: &str) -> std::result::Result<NaiveTime, String> {
    NaiveTime::parse_from_str(s, "%H:%M").map_err(|e| format!("expected HH:MM: {}", e))
}

/// The shared filter, with the CLI's own target at the same level as core.
fn cli_log_filter(config: &Config) -> String {
    if config.log_filter == DEFAULT_LOG_FILTER {
        format!("{},drumline_cli=info", config.log_filter)
    } else {
        config.log_filter.clone()
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env();
    tracing_subscriber::fmt()
        .with_env_filter(cli_log_filter(&config))
        .with_writer(std::io::stderr)
        .init();

    if let Some(parent) = cli.database.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = Database::open(&cli.database)?;

    match cli.command {
        Commands::Rules { action } => handle_rules(&db, action)?,
        Commands::Block { hostname, times } => handle_block(&db, &hostname, times.as_deref())?,
        Commands::Unblock { hostname } => handle_unblock(&db, &hostname)?,
        Commands::ClearTimes { hostname } => handle_clear_times(&db, &hostname)?,
        Commands::Check { hostname, at } => handle_check(&db, &hostname, at)?,
        Commands::Status => handle_status(&db, &cli.database)?,
    }

    Ok(())
}

fn handle_rules(db: &Database, action: RulesAction) -> Result<()> {
    let mut rules = RuleStore::load(db)?;

    match action {
        RulesAction::List => {
            if rules.is_empty() {
                println!("No rules defined. Run 'drumline block <hostname>' to add one.");
                return Ok(());
            }

            let now = chrono::Local::now().time();
            let rows: Vec<RuleRow> = rules
                .iter()
                .map(|(hostname, rule)| RuleRow {
                    hostname: hostname.to_string(),
                    indefinite: if rule.is_indefinitely_blocked() { "Yes" } else { "No" }.to_string(),
                    times: if rule.windows().is_empty() {
                        "-".to_string()
                    } else {
                        codec::format_window_spec(rule.windows())
                    },
                    blocked_now: if rules.is_blocked_now(hostname, now) { "Yes" } else { "No" }
                        .to_string(),
                })
                .collect();

            let table = Table::new(rows).to_string();
            println!("{}", table);
        }

        RulesAction::Export { output } => {
            let exported: BTreeMap<&Hostname, &Rule> = rules.iter().collect();
            let json = serde_json::to_string_pretty(&exported)?;
            std::fs::write(&output, json)?;
            println!("Exported {} rules to {:?}", exported.len(), output);
        }

        RulesAction::Import { input } => {
            let json = std::fs::read_to_string(&input)?;
            let imported: BTreeMap<Hostname, Rule> = serde_json::from_str(&json)?;
            let count = merge_rules(&mut rules, imported);
            for category in Category::all() {
                rules.checkpoint(db, category)?;
            }
            println!("Imported {} rules from {:?}", count, input);
        }
    }

    Ok(())
}

/// Merge imported rules over the existing ones. Only the persisted fields are
/// taken; returns how many rules contributed something.
fn merge_rules(rules: &mut RuleStore, imported: BTreeMap<Hostname, Rule>) -> usize {
    let mut count = 0;
    for (hostname, rule) in imported {
        let mut used = false;
        if rule.is_indefinitely_blocked() {
            rules.set_indefinite_block(hostname.clone());
            used = true;
        }
        if let Some(windows) = rule.windows.filter(|w| !w.is_empty()) {
            rules.set_windows(hostname, windows);
            used = true;
        }
        if used {
            count += 1;
        }
    }
    count
}

fn handle_block(db: &Database, hostname: &str, times: Option<&str>) -> Result<()> {
    let hostname = Hostname::parse(hostname)?;
    let mut rules = RuleStore::load(db)?;

    match times {
        Some(times) => {
            let windows = codec::parse_window_spec(times)?;
            let spec = codec::format_window_spec(&windows);
            rules.set_windows(hostname.clone(), windows);
            rules.checkpoint(db, Category::DailyBlockTimes)?;
            println!("Blocked {} daily at {}", hostname.to_string().yellow(), spec);
        }
        None => {
            rules.set_indefinite_block(hostname.clone());
            rules.checkpoint(db, Category::Blocked)?;
            println!("Blocked {} indefinitely", hostname.to_string().yellow());
        }
    }

    Ok(())
}

fn handle_unblock(db: &Database, hostname: &str) -> Result<()> {
    let hostname = Hostname::parse(hostname)?;
    let mut rules = RuleStore::load(db)?;

    rules.clear_indefinite_block(&hostname)?;
    rules.checkpoint(db, Category::Blocked)?;
    println!("Unblocked {}", hostname.to_string().yellow());
    if !rules.get(&hostname).map(|r| r.windows().is_empty()).unwrap_or(true) {
        println!("{}", "Daily block times still apply.".dimmed());
    }

    Ok(())
}

fn handle_clear_times(db: &Database, hostname: &str) -> Result<()> {
    let hostname = Hostname::parse(hostname)?;
    let mut rules = RuleStore::load(db)?;

    rules.clear_windows(&hostname)?;
    rules.checkpoint(db, Category::DailyBlockTimes)?;
    println!("Removed daily block times of {}", hostname.to_string().yellow());

    Ok(())
}

fn handle_check(db: &Database, hostname: &str, at: Option<NaiveTime>) -> Result<()> {
    let hostname = Hostname::parse(hostname)?;
    let rules = RuleStore::load(db)?;
    let at = at.unwrap_or_else(|| chrono::Local::now().time());

    let verdict = if rules.is_blocked_now(&hostname, at) {
        " BLOCKED ".on_red().white().bold()
    } else {
        " ALLOWED ".on_green().black().bold()
    };
    println!("{} {} at {}", verdict, hostname, at.format("%H:%M"));

    Ok(())
}

fn handle_status(db: &Database, path: &std::path::Path) -> Result<()> {
    let rules = RuleStore::load(db)?;
    let indefinite = rules.iter().filter(|(_, r)| r.is_indefinitely_blocked()).count();
    let scheduled = rules.iter().filter(|(_, r)| !r.windows().is_empty()).count();
    let now = chrono::Local::now().time();
    let blocked_now = rules
        .iter()
        .filter(|(hostname, _)| rules.is_blocked_now(hostname, now))
        .count();

    println!("Drumline Status");
    println!("===============");
    println!("Database:   {}", path.display());
    println!("Schema:     v{} (expected v{})", db.schema_version()?, SCHEMA_VERSION);
    println!(
        "Rules:      {} total, {} indefinite, {} with daily times",
        rules.len(),
        indefinite,
        scheduled
    );
    println!("Blocked:    {} right now", blocked_now);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use drumline_core::types::Window;

    fn host(s: &str) -> Hostname {
        Hostname::parse(s).unwrap()
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_log_filter_comes_from_config() {
        let default = Config::from_vars(|_| None);
        assert_eq!(
            cli_log_filter(&default),
            "drumline_service=info,drumline_core=info,drumline_cli=info"
        );

        let custom = Config::from_vars(|name| {
            (name == "DRUMLINE_LOG").then(|| "drumline_core=debug".to_string())
        });
        assert_eq!(cli_log_filter(&custom), "drumline_core=debug");
    }

    #[test]
    fn test_parse_clock() {
        assert_eq!(parse_clock("09:30"), Ok(NaiveTime::from_hms_opt(9, 30, 0).unwrap()));
        assert!(parse_clock("25:00").is_err());
        assert!(parse_clock("noon").is_err());
    }

    #[test]
    fn test_merge_rules() {
        let mut rules = RuleStore::new();
        rules.set_windows(host("example.com"), vec![Window::hours(9, 17)]);

        let imported: BTreeMap<Hostname, Rule> = serde_json::from_str(
            r#"{
                "example.com": {"blocked": true},
                "news.example.org": {"dailyBlockTimes": ["22-24"]},
                "idle.example.net": {"tracked": true}
            }"#,
        )
        .unwrap();

        assert_eq!(merge_rules(&mut rules, imported), 2);
        assert_eq!(rules.len(), 2);

        let rule = rules.get(&host("example.com")).unwrap();
        assert!(rule.is_indefinitely_blocked());
        assert_eq!(rule.windows(), &[Window::hours(9, 17)]);
        assert_eq!(
            rules.get(&host("news.example.org")).unwrap().windows(),
            &[Window::hours(22, 24)]
        );
    }

    #[test]
    fn test_block_and_unblock_persist() {
        let db = Database::in_memory().unwrap();
        handle_block(&db, "https://example.com/", None).unwrap();
        handle_block(&db, "example.com", Some("9-17")).unwrap();

        let rules = RuleStore::load(&db).unwrap();
        let rule = rules.get(&host("example.com")).unwrap();
        assert!(rule.is_indefinitely_blocked());
        assert_eq!(rule.windows(), &[Window::hours(9, 17)]);

        handle_unblock(&db, "example.com").unwrap();
        handle_clear_times(&db, "example.com").unwrap();
        assert!(RuleStore::load(&db).unwrap().is_empty());

        assert!(handle_unblock(&db, "example.com").is_err());
        assert!(handle_block(&db, "example.com", Some("17-9")).is_err());
    }
}
