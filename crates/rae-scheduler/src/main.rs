use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use rae_core::{EngineConfig, PlatformProbe, TracingSink};
use rae_scheduler::{PipelineScheduler, ResourceAllocation, SimulatedExecutor, SystemProbe, Task};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    let task_args = [
        Arg::new("title")
            .long("title")
            .required(true)
            .help("Task title"),
        Arg::new("description")
            .long("description")
            .default_value("")
            .help("Task description"),
        Arg::new("points")
            .long("points")
            .value_parser(value_parser!(u32))
            .help("Story point estimate"),
    ];

    Command::new("rae")
        .version(rae_scheduler::VERSION)
        .about("Resilient adaptive execution engine")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Engine configuration (TOML)"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .subcommand(
            Command::new("allocate")
                .about("Print the resource allocation for this host")
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("plan")
                .about("Print the execution plan for a task")
                .args(task_args.clone())
                .arg(
                    Arg::new("producers")
                        .long("producers")
                        .value_parser(value_parser!(u32))
                        .help("Competing producers for the execution stage"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("simulate")
                .about("Run a task over simulated stages")
                .args(task_args)
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .default_value("42")
                        .value_parser(value_parser!(u64))
                        .help("Random seed for reproducibility"),
                )
                .arg(
                    Arg::new("failure-rate")
                        .long("failure-rate")
                        .default_value("0.1")
                        .value_parser(value_parser!(f64))
                        .help("Probability that a stage call fails transiently"),
                ),
        )
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(matches: &ArgMatches) -> Result<EngineConfig> {
    let config = match matches.get_one::<PathBuf>("config") {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => EngineConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn task_from(args: &ArgMatches) -> Task {
    let title = args.get_one::<String>("title").cloned().unwrap_or_default();
    let description = args.get_one::<String>("description").cloned().unwrap_or_default();
    let task = Task::new("cli-task", title, description);
    match args.get_one::<u32>("points") {
        Some(points) => task.with_story_points(*points),
        None => task,
    }
}

fn print_allocation(allocation: &ResourceAllocation) {
    println!("Resource Allocation");
    println!("===================");
    println!("  Parallel developers: {}", allocation.max_parallel_developers);
    println!("  Parallel stages:     {}", allocation.max_parallel_stages);
    println!("  Parallel tests:      {}", allocation.max_parallel_tests);
    println!("  Memory per agent:    {:.2} GB", allocation.memory_per_agent_gb);
    println!("  Batch size:          {}", allocation.batch_size);
    println!("  Thread pool:         {}", allocation.thread_pool_size);
    println!("  Async I/O:           {}", allocation.async_io);
    println!("  Caching:             {}", allocation.caching);
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("json-logs"));
    let mut config = load_config(&matches)?;

    match matches.subcommand() {
        Some(("allocate", args)) => {
            let platform = SystemProbe.detect();
            let allocation = ResourceAllocation::for_platform(&platform);
            if args.get_flag("json") {
                let out = serde_json::json!({ "platform": platform, "allocation": allocation });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!(
                    "Platform: {} logical / {} physical cores, {:.1} GB total, {:.1} GB available, {:?}",
                    platform.logical_cores,
                    platform.physical_cores,
                    platform.total_memory_gb,
                    platform.available_memory_gb,
                    platform.os_family
                );
                println!();
                print_allocation(&allocation);
            }
        }
        Some(("plan", args)) => {
            if let Some(producers) = args.get_one::<u32>("producers") {
                config.scheduler = config.scheduler.with_competing_producers(*producers);
            }
            let scheduler = PipelineScheduler::new(
                Arc::new(SimulatedExecutor::new(0, 0.0)),
                Arc::new(SystemProbe),
                config,
            )?;
            let plan = scheduler.build_plan(&task_from(args));

            if args.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                println!("Execution Plan ({} task, {} developer(s))", plan.complexity, plan.developers);
                println!();
                for decision in &plan.decisions {
                    println!(
                        "  {:<18} {:<9} {}",
                        decision.stage.name(),
                        format!("{:?}", decision.requirement),
                        decision.justification
                    );
                }
                println!();
                let batches: Vec<String> = plan
                    .batches
                    .iter()
                    .map(|b| b.iter().map(|s| s.name()).collect::<Vec<_>>().join(" + "))
                    .collect();
                println!("Run order: {}", batches.join(" -> "));
            }
        }
        Some(("simulate", args)) => {
            let seed = args.get_one::<u64>("seed").copied().unwrap_or(42);
            let failure_rate = args.get_one::<f64>("failure-rate").copied().unwrap_or(0.1);

            let scheduler = PipelineScheduler::new(
                Arc::new(SimulatedExecutor::new(seed, failure_rate)),
                Arc::new(SystemProbe),
                config,
            )?
            .with_sink(Arc::new(TracingSink));
            let report = scheduler.run(&task_from(args)).await;

            println!("Simulation Report");
            println!("=================");
            for outcome in &report.outcomes {
                println!(
                    "  {:<18} {:<10} attempts={} {}ms{}",
                    outcome.stage.name(),
                    format!("{:?}", outcome.status),
                    outcome.attempts,
                    outcome.duration_ms,
                    outcome.error.as_deref().map(|e| format!("  ({e})")).unwrap_or_default()
                );
            }
            println!();
            println!("Status: {}", if report.success { "SUCCEEDED" } else { "FAILED" });
            println!("Duration: {}ms", report.duration_ms);

            if let Some(error) = report.error() {
                return Err(error.into());
            }
        }
        _ => {}
    }
    Ok(())
}
