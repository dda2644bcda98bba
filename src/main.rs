//! meter - usage ledger, cost estimates and sandboxed tool runs
//!
//! ## Usage
//!
//! ```bash
//! # Dashboard aggregates for January
//! meter summary --from 2025-01-01 --to 2025-01-31
//!
//! # Everything recorded for one execution
//! meter show exec-42
//!
//! # Run a program as a sandboxed tool and record its usage
//! meter run --execution-id exec-42 --timeout-ms 5000 ./lint.sh src/
//!
//! # Repair the indices after a crash
//! meter reconcile
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use meter_config::MeterConfig;
use meter_core::{LogGuard, init_logging, parse_day};
use meter_cost::CostCalculator;
use meter_sandbox::{PROCESS_CAPABILITY, ProcessTool, SandboxConfig, ToolSandboxEnforcer};
use meter_store::{MetricsFilter, MetricsQuery, MetricsStore, UsageBucket};
use serde::Serialize;
use tracing::{error, info};

/// Usage metering, cost estimation and sandboxed tool execution.
#[derive(Parser, Debug)]
#[command(name = "meter")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to ~/.meter/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Metrics root, overriding the configuration
    #[arg(long, global = true)]
    metrics_root: Option<PathBuf>,

    /// Enable verbose logging (increases log level)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Directory for log files (defaults to ~/.meter/logs/)
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every execution id
    Executions,

    /// Show all records for one execution
    Show { execution_id: String },

    /// Show all records for one day (YYYY-MM-DD)
    Daily { date: String },

    /// Aggregate totals over a range
    Summary(FilterArgs),

    /// Per-model usage and cost
    Models(FilterArgs),

    /// Per-tool call statistics
    Tools(FilterArgs),

    /// Per-agent usage
    Agents(FilterArgs),

    /// Per-execution rollups, newest first
    Runs(FilterArgs),

    /// Daily token and cost series
    Series(FilterArgs),

    /// Estimate the cost of a model call
    Estimate {
        model_id: String,
        input_tokens: u64,
        output_tokens: u64,
    },

    /// List the pricing table
    Pricing,

    /// Re-synchronize the execution and day indices
    Reconcile,

    /// Run a program as a sandboxed tool and record its usage
    Run {
        /// Execution the tool call belongs to
        #[arg(long)]
        execution_id: String,

        /// Time budget, overriding the configured default
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// JSON written to the program's stdin
        #[arg(long, default_value = "null")]
        input: String,

        /// Agent to attribute the call to
        #[arg(long)]
        agent: Option<String>,

        /// Tool name to record (defaults to the program name)
        #[arg(long)]
        name: Option<String>,

        program: String,

        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

#[derive(Args, Debug, Clone, Default)]
struct FilterArgs {
    /// First day, inclusive (YYYY-MM-DD)
    #[arg(long)]
    from: Option<String>,

    /// Last day, inclusive (YYYY-MM-DD)
    #[arg(long)]
    to: Option<String>,

    #[arg(long)]
    agent: Option<String>,

    #[arg(long)]
    model: Option<String>,

    #[arg(long)]
    workspace: Option<String>,
}

impl FilterArgs {
    fn to_filter(&self) -> Result<MetricsFilter> {
        let mut filter = MetricsFilter::all();
        filter.from = self.from.as_deref().map(parse_day).transpose()?;
        filter.to = self.to.as_deref().map(parse_day).transpose()?;
        filter.agent_id = self.agent.clone();
        filter.model_id = self.model.clone();
        filter.workspace_id = self.workspace.clone();
        Ok(filter)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            if let Some(hint) = e.downcast_ref::<meter_core::MeterError>().and_then(|m| m.guidance()) {
                eprintln!("Hint: {hint}");
            }
            return ExitCode::from(2);
        }
    };

    let _guard = match setup_logging(&cli, &config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            return ExitCode::from(1);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start async runtime: {e}");
            return ExitCode::from(1);
        }
    };

    match runtime.block_on(run(cli.command, config)) {
        Ok(code) => code,
        Err(e) => {
            error!("meter command failed: {e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::from(1)
        }
    }
}

fn load_config(cli: &Cli) -> Result<MeterConfig> {
    let mut config = match &cli.config {
        Some(path) => MeterConfig::load(path)?,
        None => MeterConfig::load_or_default(&MeterConfig::default_path()?)?,
    };
    if let Some(root) = &cli.metrics_root {
        config.metrics_root = root.clone();
    }
    Ok(config)
}

/// Set up logging based on CLI arguments and configuration.
fn setup_logging(cli: &Cli, config: &MeterConfig) -> meter_core::Result<LogGuard> {
    let log_dir = cli.log_dir.clone().or_else(|| config.log_dir.clone());
    init_logging(log_dir, cli.verbose > 0)
}

async fn run(command: Command, config: MeterConfig) -> Result<ExitCode> {
    info!(?command, "running meter command");
    let calculator = config.build_calculator();

    // Pricing commands never touch the ledger.
    match &command {
        Command::Estimate {
            model_id,
            input_tokens,
            output_tokens,
        } => {
            print_json(&calculator.estimate(model_id, *input_tokens, *output_tokens))?;
            return Ok(ExitCode::SUCCESS);
        }
        Command::Pricing => {
            print_json(&calculator.list_pricing())?;
            return Ok(ExitCode::SUCCESS);
        }
        _ => {}
    }

    let store = MetricsStore::open(&config.metrics_root)
        .await
        .with_context(|| format!("opening metrics root {}", config.metrics_root.display()))?;

    match command {
        Command::Executions => {
            for id in store.get_all_execution_ids().await? {
                println!("{id}");
            }
        }
        Command::Show { execution_id } => {
            print_bucket(&execution_id, &store.get_execution_records(&execution_id).await?)?;
        }
        Command::Daily { date } => {
            print_bucket(&date, &store.get_daily_records(parse_day(&date)?).await?)?;
        }
        Command::Summary(args) => {
            print_json(&query(&store, &calculator).summary(&args.to_filter()?).await?)?;
        }
        Command::Models(args) => {
            print_json(&query(&store, &calculator).models(&args.to_filter()?).await?)?;
        }
        Command::Tools(args) => {
            print_json(&query(&store, &calculator).tools(&args.to_filter()?).await?)?;
        }
        Command::Agents(args) => {
            print_json(&query(&store, &calculator).agents(&args.to_filter()?).await?)?;
        }
        Command::Runs(args) => {
            print_json(&query(&store, &calculator).executions(&args.to_filter()?).await?)?;
        }
        Command::Series(args) => {
            let filter = args.to_filter()?;
            let q = query(&store, &calculator);
            print_json(&serde_json::json!({
                "tokens": q.tokens(&filter).await?,
                "costs": q.costs(&filter).await?,
            }))?;
        }
        Command::Reconcile => {
            let report = store.reconcile().await?;
            print_json(&report)?;
        }
        Command::Run {
            execution_id,
            timeout_ms,
            input,
            agent,
            name,
            program,
            args,
        } => {
            meter_store::validate_execution_id(&execution_id)?;
            let policy = run_policy(config.sandbox.clone(), timeout_ms)?;
            let input: serde_json::Value =
                serde_json::from_str(&input).context("--input must be valid JSON")?;
            let tool_name = name.unwrap_or_else(|| program.clone());

            let mut enforcer = ToolSandboxEnforcer::with_default_config(config.sandbox.clone());
            enforcer.register(ProcessTool::new(&tool_name, &program).with_args(args));

            let result = enforcer.execute(&tool_name, input, Some(policy)).await;
            let mut record = result.to_tool_usage(&execution_id, result.finished_at);
            if let Some(agent) = agent {
                record = record.with_agent(agent);
            }
            store.append_tool_usage(&record).await?;

            print_json(&result)?;
            if !result.success {
                return Ok(ExitCode::from(3));
            }
        }
        Command::Estimate { .. } | Command::Pricing => {}
    }

    Ok(ExitCode::SUCCESS)
}

fn query<'a>(store: &'a MetricsStore, calculator: &'a CostCalculator) -> MetricsQuery<'a> {
    MetricsQuery::new(store, calculator)
}

/// Policy for `meter run`: the configured default plus process spawning.
fn run_policy(base: SandboxConfig, timeout_ms: Option<u64>) -> Result<SandboxConfig> {
    let mut policy = base.allow([PROCESS_CAPABILITY]);
    if let Some(ms) = timeout_ms {
        anyhow::ensure!(ms > 0, "--timeout-ms must be > 0");
        policy = policy.with_timeout_ms(ms);
    }
    Ok(policy)
}

fn print_bucket(key: &str, bucket: &UsageBucket) -> Result<()> {
    if bucket.is_empty() {
        info!(%key, "no records found");
    } else {
        info!(%key, records = bucket.len(), "loaded records");
    }
    print_json(bucket)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_policy_rejects_zero_timeout() {
        let err = run_policy(SandboxConfig::default(), Some(0)).unwrap_err();
        assert_eq!(err.to_string(), "--timeout-ms must be > 0");
    }

    #[test]
    fn test_run_policy_overrides_timeout() {
        let policy = run_policy(SandboxConfig::default(), Some(250)).unwrap();
        assert_eq!(policy.max_execution_time_ms, 250);
        assert!(policy.check_capability(PROCESS_CAPABILITY).is_ok());
    }

    #[test]
    fn test_run_policy_keeps_configured_timeout() {
        let base = SandboxConfig::default().with_timeout_ms(1_234);
        let policy = run_policy(base, None).unwrap();
        assert_eq!(policy.max_execution_time_ms, 1_234);
    }

    #[test]
    fn test_cli_parses_zero_timeout_for_validation() {
        let cli = Cli::try_parse_from([
            "meter",
            "run",
            "--execution-id",
            "e1",
            "--timeout-ms",
            "0",
            "true",
        ])
        .unwrap();
        match cli.command {
            Command::Run { timeout_ms, .. } => {
                assert!(run_policy(SandboxConfig::default(), timeout_ms).is_err());
            }
            other => panic!("expected Run, got {other:?}"),
        }
    }
}
