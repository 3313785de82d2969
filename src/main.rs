use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use autoqa::brain::{DecisionBrain, QaProfile};
use autoqa::config::ProviderKind;
use autoqa::driver::remote::{RemoteDriver, RemoteDriverConfig};
use autoqa::evidence::{EvidenceSink, FileEvidenceSink};
use autoqa::providers::{AnthropicProvider, DecisionService, OpenAIProvider, ScriptedDecisionService};
use autoqa::runner::{AuditReport, BatchRunner, ScenarioRunner};
use autoqa::scenarios::{load_catalog, ScenarioFilter};
use autoqa::storage::FileStore;
use autoqa::types::{Priority, ScenarioResult, TestScenario};
use autoqa::{exit_codes, logging, Config};

#[derive(Parser)]
#[command(name = "autoqa")]
#[command(about = "Goal-driven test agents for web applications", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML config file (defaults to ./autoqa.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Scenario file or directory
    #[arg(long, global = true)]
    scenarios: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Default)]
struct FilterArgs {
    /// Only scenarios with this id (repeatable)
    #[arg(long = "id")]
    ids: Vec<String>,
    #[arg(long = "category")]
    categories: Vec<String>,
    #[arg(long = "tag")]
    tags: Vec<String>,
    /// critical, high, medium or low (p0..p3 also accepted)
    #[arg(long = "priority")]
    priorities: Vec<String>,
}

impl FilterArgs {
    fn into_filter(self) -> Result<ScenarioFilter> {
        let priorities = self
            .priorities
            .iter()
            .map(|p| Priority::from_str(p).ok_or_else(|| anyhow!("Unknown priority '{}'", p)))
            .collect::<Result<Vec<_>>>()?;
        Ok(ScenarioFilter {
            ids: self.ids,
            categories: self.categories,
            tags: self.tags,
            priorities,
        })
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the selected scenarios and write evidence plus an audit report
    Run {
        #[command(flatten)]
        filter: FilterArgs,
        /// Print the plan and record every scenario as skipped
        #[arg(long)]
        dry_run: bool,
        /// Ask the driver for a visible browser
        #[arg(long)]
        headed: bool,
        /// Ask the driver to record a trace
        #[arg(long)]
        trace: bool,
        #[arg(long)]
        max_retries: Option<u32>,
        #[arg(long)]
        base_url: Option<String>,
    },
    /// List the selected scenarios without running them
    List {
        #[command(flatten)]
        filter: FilterArgs,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let code = match execute(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("autoqa: {:#}", e);
            exit_codes::FATAL
        }
    };
    std::process::exit(code);
}

async fn execute(cli: Cli) -> Result<i32> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(path) = cli.scenarios {
        config.scenarios = path;
    }

    match cli.command {
        Commands::List { filter } => {
            let scenarios = select(&config, filter).await?;
            for scenario in &scenarios {
                print_plan(&config, scenario);
            }
            println!("{} scenario(s)", scenarios.len());
            Ok(exit_codes::OK)
        }
        Commands::Run {
            filter,
            dry_run,
            headed,
            trace,
            max_retries,
            base_url,
        } => {
            if let Some(retries) = max_retries {
                config.batch.max_retries = retries;
            }
            if base_url.is_some() {
                config.runner.base_url = base_url;
            }
            config.runner.dry_run |= dry_run;

            let scenarios = select(&config, filter).await?;
            if scenarios.is_empty() {
                println!("No scenarios matched");
                return Ok(exit_codes::OK);
            }
            if config.runner.dry_run {
                return dry_run_plan(&config, &scenarios).await;
            }
            run_batch(&config, &scenarios, headed, trace).await
        }
    }
}

async fn select(config: &Config, filter: FilterArgs) -> Result<Vec<TestScenario>> {
    let filter = filter.into_filter()?;
    let scenarios = load_catalog(&config.scenarios).await?;
    Ok(filter.apply(scenarios))
}

fn print_plan(config: &Config, scenario: &TestScenario) {
    let profile = QaProfile::resolve(scenario, config.brain.default_profile.as_deref());
    println!(
        "{:<28} {:<9} {:<14} {:<13} max {:>3} actions, {} criteria, {} backend checks",
        scenario.id,
        scenario.priority.as_str(),
        profile.name,
        scenario.persona.as_str(),
        scenario.max_actions,
        scenario.success_criteria.len(),
        scenario.backend_checks.len()
    );
    println!("    {}", scenario.goal);
}

async fn dry_run_plan(config: &Config, scenarios: &[TestScenario]) -> Result<i32> {
    let results: Vec<ScenarioResult> = scenarios
        .iter()
        .map(|scenario| {
            print_plan(config, scenario);
            ScenarioResult::skipped(&scenario.id, "dry run")
        })
        .collect();
    let report = AuditReport::from_results(&results);
    report.write(&config.evidence_dir).await?;
    print!("\n{}", report.summary_text());
    Ok(report.exit_code())
}

fn decision_service(config: &Config) -> Result<Arc<dyn DecisionService>> {
    let timeout = Duration::from_secs(config.llm_timeout_secs);
    let service: Arc<dyn DecisionService> = match config.provider {
        ProviderKind::Anthropic => {
            let key = config
                .api_key()
                .ok_or_else(|| anyhow!("ANTHROPIC_API_KEY is not set"))?;
            let mut provider = AnthropicProvider::new(key.to_string(), timeout)?;
            if let Some(model) = &config.model {
                provider = provider.with_model(model.clone());
            }
            Arc::new(provider)
        }
        ProviderKind::OpenAI => {
            let key = config
                .api_key()
                .ok_or_else(|| anyhow!("OPENAI_API_KEY is not set"))?;
            let mut provider = OpenAIProvider::new(key.to_string(), timeout)?;
            if let Some(model) = &config.model {
                provider = provider.with_model(model.clone());
            }
            if let Some(base_url) = &config.llm_base_url {
                provider = provider.with_base_url(base_url.clone());
            }
            Arc::new(provider)
        }
        ProviderKind::Scripted => {
            if config.scripted_responses.is_empty() {
                return Err(anyhow!("provider 'scripted' needs scripted_responses"));
            }
            Arc::new(ScriptedDecisionService::new(config.scripted_responses.clone()))
        }
    };
    Ok(service)
}

async fn run_batch(
    config: &Config,
    scenarios: &[TestScenario],
    headed: bool,
    trace: bool,
) -> Result<i32> {
    let service = decision_service(config)?;
    let store = Arc::new(FileStore::new(&config.store_dir));
    let evidence = Arc::new(FileEvidenceSink::new(&config.evidence_dir));

    let driver = RemoteDriver::open_session(RemoteDriverConfig {
        base_url: config.driver_url.clone(),
        headed,
        trace,
        ..Default::default()
    })
    .await
    .context("Failed to open a browser session")?;
    let driver = Arc::new(driver);

    let brain = DecisionBrain::new(service, store, config.brain.clone());
    let runner = ScenarioRunner::new(
        driver.clone(),
        brain,
        evidence.clone(),
        config.runner.clone(),
    );
    let mut batch = BatchRunner::new(runner, config.batch.clone());

    let mut collected = Vec::new();
    let returned = batch
        .run_all(scenarios, |result| {
            println!(
                "[{}] {} ({} actions, {:.1}s){}",
                result.status.as_str().to_uppercase(),
                result.scenario_id,
                result.action_count(),
                result.duration_ms as f64 / 1000.0,
                if result.was_flaky { " flaky" } else { "" }
            );
            collected.push(result.clone());
        })
        .await;

    if let Err(e) = driver.close_session().await {
        log::warn!("Failed to close driver session: {}", e);
    }

    let report = AuditReport::from_batch(&collected, &returned);
    let (report_path, _) = report.write(evidence.output_dir()).await?;
    print!("\n{}", report.summary_text());
    println!("Report: {}", report_path.display());
    Ok(report.exit_code())
}
