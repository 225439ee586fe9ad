//! SpendWatch CLI — ingestion, scheduling, reports, and config commands.
//!
//! Commands:
//! - `ingest` — fetch one day (yesterday by default) and merge it into the dataset
//! - `schedule` — run the ingestion once a day at the configured time
//! - `report` — aggregate queries over the dataset
//! - `status` — dataset metadata and the last processed day
//! - `config init` / `config show` — write a starter config, print the effective one

mod report;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::path::{Path, PathBuf};

use spendwatch_core::allowlist::Allowlist;
use spendwatch_core::config::AppConfig;
use spendwatch_core::data::{CsvStore, IngestOutcome, SpendingApi};
use spendwatch_core::domain::EntityCode;
use spendwatch_runner::{Aggregator, DailyTrigger, IngestionJob, RunLock, Scheduler, SystemClock};

const DEFAULT_CONFIG_FILE: &str = "spendwatch.toml";
const CONFIG_ENV: &str = "SPENDWATCH_CONFIG";

#[derive(Parser)]
#[command(
    name = "spendwatch",
    version,
    about = "SpendWatch — daily public-spending ingestion for allowlisted entities"
)]
struct Cli {
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,

    /// Config file.
    ///
    /// Defaults to $SPENDWATCH_CONFIG if set, or ./spendwatch.toml if present.
    /// Without either, built-in defaults are used.
    #[arg(short = 'c', long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch one day of transactions and merge the allowlisted ones.
    Ingest {
        /// Day to fetch (YYYY-MM-DD). Defaults to yesterday.
        #[arg(long)]
        date: Option<String>,
    },
    /// Run the ingestion every day at the configured local time.
    Schedule {
        /// Exit after this many firings.
        #[arg(long)]
        max_firings: Option<usize>,

        /// Skip running a missed firing on startup.
        #[arg(long, default_value_t = false)]
        no_catch_up: bool,
    },
    /// Aggregate reports over the dataset.
    Report {
        #[command(subcommand)]
        query: ReportQuery,
    },
    /// Show dataset metadata and scheduler state.
    Status,
    /// Config file management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ReportQuery {
    /// Row count, total amount, and date range.
    Summary,
    /// Transactions where an entity is payer or recipient.
    Entity {
        /// EDRPOU code; missing leading zeros are restored.
        code: String,

        /// Maximum rows to print.
        #[arg(short = 'n', long, default_value_t = 50)]
        limit: usize,
    },
    /// Recipients ranked by total amount received.
    TopRecipients {
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,
    },
    /// Running total of spend per day.
    Cumulative,
    /// Transaction counts per weekday.
    Weekdays,
    /// How transaction amounts are distributed, by order of magnitude.
    Amounts,
    /// Payers ranked by defense-related spend.
    Defense {
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,

        /// Keyword to match in payment details (repeatable). Replaces the
        /// configured list.
        #[arg(long = "keyword", value_name = "WORD")]
        keywords: Vec<String>,
    },
    /// First rows of the dataset.
    Preview {
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a starter spendwatch.toml and allowlist.toml.
    Init {
        /// Directory to write into.
        #[arg(long, default_value = ".")]
        dir: PathBuf,

        /// Overwrite existing files.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Print the effective configuration.
    Show,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.verbose.log_level_filter())
        .parse_default_env()
        .init();

    let command = match cli.command {
        Commands::Config {
            action: ConfigAction::Init { dir, force },
        } => return run_config_init(&dir, force),
        command => command,
    };

    let config = load_config(cli.config.as_deref())?;
    match command {
        Commands::Ingest { date } => run_ingest(&config, date.as_deref()),
        Commands::Schedule {
            max_firings,
            no_catch_up,
        } => run_schedule(&config, max_firings, no_catch_up),
        Commands::Report { query } => run_report(&config, query),
        Commands::Status => run_status(&config),
        Commands::Config { .. } => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

/// Pick the config file: explicit flag, then the environment, then the
/// default file if it exists. An explicitly named file must exist.
fn config_path(explicit: Option<&Path>, env: Option<PathBuf>) -> (PathBuf, bool) {
    match (explicit, env) {
        (Some(path), _) => (path.to_path_buf(), true),
        (None, Some(path)) => (path, true),
        (None, None) => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    }
}

fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    let (path, required) = config_path(explicit, std::env::var_os(CONFIG_ENV).map(PathBuf::from));
    if required || path.exists() {
        log::debug!("loading config from {}", path.display());
        return AppConfig::from_file(&path)
            .with_context(|| format!("loading config {}", path.display()));
    }
    log::info!("no {DEFAULT_CONFIG_FILE} found; using built-in defaults");
    Ok(AppConfig::default())
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .with_context(|| format!("invalid date '{s}', expected YYYY-MM-DD"))
}

fn yesterday() -> NaiveDate {
    chrono::Local::now().date_naive() - chrono::Duration::days(1)
}

fn build_job(config: &AppConfig) -> Result<IngestionJob> {
    let api = SpendingApi::from_config(&config.api)?;
    let job = IngestionJob::from_config(config, Box::new(api))?;
    log::info!(
        "{} allowlisted entities; dataset {}",
        job.allowlist().len(),
        job.store().path().display()
    );
    Ok(job)
}

fn run_ingest(config: &AppConfig, date: Option<&str>) -> Result<()> {
    let day = match date {
        Some(s) => parse_date(s)?,
        None => yesterday(),
    };
    let job = build_job(config)?;

    match job.run_for(day)? {
        IngestOutcome::NoData => println!("No transactions published for {day}."),
        IngestOutcome::Ingested(summary) => {
            println!("=== Ingest {day} ===");
            println!("Fetched:        {}", summary.fetched);
            println!("Kept:           {}", summary.kept);
            println!("Filtered out:   {}", summary.filtered_out);
            println!("Rejected:       {}", summary.rejected);
            if summary.merge.written {
                println!("Appended:       {}", summary.merge.appended);
                if summary.merge.skipped_duplicates > 0 {
                    println!("Duplicates:     {}", summary.merge.skipped_duplicates);
                }
                if let Some(total) = summary.merge.total_rows {
                    println!("Dataset rows:   {total}");
                }
            } else {
                println!("Dataset unchanged.");
            }
        }
    }
    Ok(())
}

fn run_schedule(config: &AppConfig, max_firings: Option<usize>, no_catch_up: bool) -> Result<()> {
    let job = build_job(config)?;
    let state = job.run_state();

    let trigger = DailyTrigger::new(config.schedule.fire_time()?);
    let mut scheduler = Scheduler::new(trigger, SystemClock, config.schedule.poll_interval());
    scheduler.on_fire(move |day| {
        job.run_for(day)?;
        Ok(())
    });

    if config.schedule.catch_up && !no_catch_up {
        scheduler.catch_up(&state);
    }
    scheduler.run(max_firings);
    Ok(())
}

fn run_report(config: &AppConfig, query: ReportQuery) -> Result<()> {
    let store = CsvStore::new(&config.store.dataset_path, config.store.merge_policy);
    let Some(agg) = Aggregator::from_store(&store)? else {
        println!(
            "No dataset yet at {}. Run `spendwatch ingest` first.",
            store.path().display()
        );
        return Ok(());
    };

    let text = match query {
        ReportQuery::Summary => report::summary(&agg, store.meta().as_ref()),
        ReportQuery::Entity { code, limit } => {
            let code = EntityCode::parse(&code)
                .with_context(|| format!("invalid EDRPOU code '{code}'"))?;
            let rows = agg.filter_by_entity(&code);
            let shown = &rows[..limit.min(rows.len())];
            let mut text = report::transactions(shown);
            if rows.len() > shown.len() {
                text.push_str(&format!("… {} more\n", rows.len() - shown.len()));
            }
            text
        }
        ReportQuery::TopRecipients { limit } => {
            report::ranked("Recipient", &agg.top_recipients_by_amount(limit))
        }
        ReportQuery::Cumulative => report::cumulative(&agg.cumulative_spend_by_day()),
        ReportQuery::Weekdays => report::weekdays(&agg.counts_by_weekday()),
        ReportQuery::Amounts => report::amounts(&agg.amounts()),
        ReportQuery::Defense { limit, keywords } => {
            let keywords: &[String] = if keywords.is_empty() {
                &config.reports.defense_keywords
            } else {
                &keywords
            };
            report::ranked("Payer", &agg.defense_spend_by_payer(keywords, limit))
        }
        ReportQuery::Preview { limit } => {
            let rows: Vec<_> = agg.preview(limit).iter().collect();
            report::transactions(&rows)
        }
    };
    print!("{text}");
    Ok(())
}

fn run_status(config: &AppConfig) -> Result<()> {
    let store = CsvStore::new(&config.store.dataset_path, config.store.merge_policy);
    let state = spendwatch_runner::RunState::load(&config.store.state_path);
    let locked = RunLock::path_for(store.path()).exists();
    print!(
        "{}",
        report::status(store.path(), store.meta().as_ref(), &state, locked)
    );
    Ok(())
}

fn run_config_init(dir: &Path, force: bool) -> Result<()> {
    let config_file = dir.join(DEFAULT_CONFIG_FILE);
    let config = AppConfig::default();
    let allowlist_name = config
        .allowlist
        .file
        .clone()
        .unwrap_or_else(|| PathBuf::from("allowlist.toml"));
    let allowlist_file = dir.join(&allowlist_name);

    if !force {
        for path in [&config_file, &allowlist_file] {
            if path.exists() {
                bail!("{} already exists (pass --force to overwrite)", path.display());
            }
        }
    }

    std::fs::create_dir_all(dir)?;
    std::fs::write(&config_file, config.to_toml()?)?;
    std::fs::write(&allowlist_file, Allowlist::default_kyiv_region().to_toml()?)?;

    println!("Wrote {}", config_file.display());
    println!("Wrote {}", allowlist_file.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_report_subcommands() {
        let cli = Cli::try_parse_from([
            "spendwatch", "report", "defense", "-n", "3", "--keyword", "ЗСУ", "--keyword", "дрон",
        ])
        .unwrap();
        match cli.command {
            Commands::Report {
                query: ReportQuery::Defense { limit, keywords },
            } => {
                assert_eq!(limit, 3);
                assert_eq!(keywords, vec!["ЗСУ", "дрон"]);
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn parses_amounts_report() {
        let cli = Cli::try_parse_from(["spendwatch", "report", "amounts"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Report {
                query: ReportQuery::Amounts
            }
        ));
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::try_parse_from(["spendwatch", "status", "--config", "x.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
    }

    #[test]
    fn config_path_precedence() {
        let explicit = Path::new("a.toml");
        assert_eq!(
            config_path(Some(explicit), Some("b.toml".into())),
            (PathBuf::from("a.toml"), true)
        );
        assert_eq!(
            config_path(None, Some("b.toml".into())),
            (PathBuf::from("b.toml"), true)
        );
        assert_eq!(
            config_path(None, None),
            (PathBuf::from(DEFAULT_CONFIG_FILE), false)
        );
    }

    #[test]
    fn dates_must_be_iso() {
        assert_eq!(
            parse_date("2024-01-31").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()
        );
        assert!(parse_date("31.01.2024").is_err());
    }

    #[test]
    fn config_init_writes_loadable_files() {
        let dir = tempfile::tempdir().unwrap();
        run_config_init(dir.path(), false).unwrap();

        let config = AppConfig::from_file(&dir.path().join(DEFAULT_CONFIG_FILE)).unwrap();
        let allowlist = config.load_allowlist().unwrap();
        assert_eq!(allowlist.len(), 69);
        assert!(allowlist.contains(&EntityCode::parse("04358000").unwrap()));

        // Refuses to clobber without --force
        assert!(run_config_init(dir.path(), false).is_err());
        run_config_init(dir.path(), true).unwrap();
    }
}
