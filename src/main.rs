//! Thin CLI layer: parse args, styled output, and call into fanjoin-core.
//! Crash-proof: panic caught and reported; all errors return Result.

mod stats;

use clap::{Arg, ArgAction, ArgMatches, Command};
use colored::Colorize;
use fanjoin_core::{
    load_config, partition, Executor, InlineExecutor, MergeMode, ParallelConfig, TaskRunner,
    ThreadPerTask,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::env;
use std::error::Error as _;
use std::fs;
use std::io::IsTerminal;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use crate::stats::{parse_values, StatsCombiner, StatsVisitor};

// ---- UI helpers (no-op when stdout isn't a TTY) ----

fn use_color() -> bool {
    std::io::stdout().is_terminal()
        && env::var("NO_COLOR").unwrap_or_default().is_empty()
}

fn success(msg: &str) {
    if use_color() {
        println!("{}", msg.green());
    } else {
        println!("{}", msg);
    }
}

fn error(msg: &str) {
    if use_color() {
        eprintln!("{}", msg.red());
    } else {
        eprintln!("{}", msg);
    }
}

fn info(msg: &str) {
    if use_color() {
        println!("{}", msg.cyan());
    } else {
        println!("{}", msg);
    }
}

fn dim(msg: &str) {
    if use_color() {
        println!("{}", msg.dimmed());
    } else {
        println!("{}", msg);
    }
}

/// Logs go to stderr, filtered by FANJOIN_LOG (default "warn").
fn init_logging(quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::try_from_env("FANJOIN_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// "top: cause: cause" for a library error.
fn error_chain(e: &fanjoin_core::Error) -> String {
    let mut msg = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}

fn json_error(e: serde_json::Error) -> String {
    error_chain(&fanjoin_core::Error::from(e))
}

fn tasks_arg() -> Arg {
    Arg::new("tasks")
        .short('t')
        .long("tasks")
        .value_parser(clap::value_parser!(usize))
        .help("Number of parallel tasks (default: from .fanjoinrc, else CPUs x 2)")
}

fn json_arg() -> Arg {
    Arg::new("json")
        .long("json")
        .action(ArgAction::SetTrue)
        .help("Output machine-readable JSON")
}

fn cmd_sections(m: &ArgMatches, cfg: &ParallelConfig) -> Result<(), String> {
    let len = m.get_one::<usize>("len").copied().unwrap_or(0);
    let tasks = m
        .get_one::<usize>("tasks")
        .copied()
        .unwrap_or_else(|| cfg.task_count_for(len));
    if tasks == 0 {
        return Err("--tasks must be at least 1".to_string());
    }
    let sections = partition(len, tasks);
    if m.get_flag("json") {
        let s = serde_json::to_string_pretty(&sections).map_err(json_error)?;
        println!("{}", s);
        return Ok(());
    }
    info(&format!("{} element(s) over {} task(s)", len, tasks));
    for section in &sections {
        let line = format!("  {:<8} {} element(s)", section.to_string(), section.len());
        if section.is_empty() {
            dim(&line);
        } else {
            println!("{}", line);
        }
    }
    Ok(())
}

fn read_input(m: &ArgMatches) -> Result<Vec<i64>, String> {
    if let Some(path) = m.get_one::<String>("input") {
        let text = fs::read_to_string(path).map_err(|e| format!("Failed to read {}: {}", path, e))?;
        return parse_values(&text);
    }
    let len = m.get_one::<usize>("len").copied().unwrap_or(0);
    Ok((0..len as i64).collect())
}

fn progress_bar(tasks: usize) -> ProgressBar {
    let pb = ProgressBar::new(tasks as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{bar:30.cyan/dim} {pos}/{len} sections merged")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb
}

fn execute<E: Executor + ?Sized>(
    executor: &E,
    runner: TaskRunner<StatsCombiner, StatsVisitor>,
    fail_on: Option<i64>,
    values: Vec<i64>,
) -> Result<StatsCombiner, String> {
    let factory = move || StatsVisitor::new(fail_on);
    runner
        .execute_and_combine(executor, &factory, values)
        .map_err(|e| error_chain(&e))
}

fn cmd_stats(m: &ArgMatches, cfg: &ParallelConfig, quiet: bool) -> Result<(), String> {
    let values = read_input(m)?;
    let tasks = m
        .get_one::<usize>("tasks")
        .copied()
        .unwrap_or_else(|| cfg.task_count_for(values.len()));
    let mode = m
        .get_one::<String>("mode")
        .and_then(|s| MergeMode::parse(s))
        .unwrap_or(MergeMode::Incremental);
    let executor_name = m.get_one::<String>("executor").map(|s| s.as_str()).unwrap_or("rayon");
    let fail_on = m.get_one::<i64>("fail-on").copied();
    let json = m.get_flag("json");

    let progress = if !json && !quiet && std::io::stdout().is_terminal() {
        Some(progress_bar(tasks))
    } else {
        None
    };
    let runner = TaskRunner::new(StatsCombiner::new(mode, progress.clone()), tasks)
        .map_err(|e| error_chain(&e))?;

    let started = Instant::now();
    let result = match executor_name {
        "inline" => execute(&InlineExecutor, runner, fail_on, values),
        "threads" => execute(&ThreadPerTask::new(cfg.thread_name_prefix.clone()), runner, fail_on, values),
        _ => run_on_pool(runner, cfg, fail_on, values),
    };
    if let Some(pb) = &progress {
        pb.finish_and_clear();
    }
    let combiner = result?;
    let elapsed = started.elapsed();
    let total = combiner.total();

    if json {
        let mut out = total.to_json();
        out["tasks"] = tasks.into();
        out["mode"] = serde_json::to_value(mode).map_err(json_error)?;
        out["executor"] = executor_name.into();
        out["elapsedMs"] = (elapsed.as_millis() as u64).into();
        let s = serde_json::to_string_pretty(&out).map_err(json_error)?;
        println!("{}", s);
        return Ok(());
    }
    if quiet {
        println!("{}", total.sum);
        return Ok(());
    }
    success(&format!(
        "Merged {} section(s) ({:?}, {} executor) in {:.1?}",
        combiner.merged(),
        mode,
        executor_name,
        elapsed
    ));
    println!("  count  {}", total.count);
    println!("  sum    {}", total.sum);
    if let (Some(min), Some(max)) = (total.min, total.max) {
        println!("  min    {}", min);
        println!("  max    {}", max);
    }
    match total.mean() {
        Some(mean) => println!("  mean   {:.2}", mean),
        None => dim("  (no values)"),
    }
    Ok(())
}

#[cfg(feature = "rayon-pool")]
fn run_on_pool(
    runner: TaskRunner<StatsCombiner, StatsVisitor>,
    cfg: &ParallelConfig,
    fail_on: Option<i64>,
    values: Vec<i64>,
) -> Result<StatsCombiner, String> {
    let pool = fanjoin_core::build_pool(cfg.pool_threads(), &cfg.thread_name_prefix)
        .map_err(|e| error_chain(&e))?;
    execute(&pool, runner, fail_on, values)
}

#[cfg(not(feature = "rayon-pool"))]
fn run_on_pool(
    runner: TaskRunner<StatsCombiner, StatsVisitor>,
    _cfg: &ParallelConfig,
    fail_on: Option<i64>,
    values: Vec<i64>,
) -> Result<StatsCombiner, String> {
    execute(fanjoin_core::default_executor(), runner, fail_on, values)
}

fn run() -> Result<(), String> {
    let matches = Command::new("fanjoin")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Split a sequence into sections, visit them in parallel, merge the results")
        .after_help(
            "Examples:\n  fanjoin sections --len 10 --tasks 3\n  fanjoin stats --len 1000000 --mode barrier\n  fanjoin stats --input numbers.txt --executor threads --json",
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Minimal output; only errors are logged"),
        )
        .subcommand(
            Command::new("sections")
                .about("Show how an input of LEN elements is split into sections")
                .arg(
                    Arg::new("len")
                        .short('n')
                        .long("len")
                        .required(true)
                        .value_parser(clap::value_parser!(usize))
                        .help("Input length"),
                )
                .arg(tasks_arg())
                .arg(json_arg()),
        )
        .subcommand(
            Command::new("stats")
                .about("Count, sum, min and max of integers, computed section by section")
                .arg(
                    Arg::new("len")
                        .short('n')
                        .long("len")
                        .value_parser(clap::value_parser!(usize))
                        .conflicts_with("input")
                        .help("Use the integers 0..LEN as input"),
                )
                .arg(
                    Arg::new("input")
                        .short('i')
                        .long("input")
                        .help("Read one integer per line from this file"),
                )
                .arg(tasks_arg())
                .arg(
                    Arg::new("mode")
                        .long("mode")
                        .value_parser(["incremental", "barrier"])
                        .default_value("incremental")
                        .help("Merge each section as it finishes, or all at once"),
                )
                .arg(
                    Arg::new("executor")
                        .long("executor")
                        .value_parser(["rayon", "threads", "inline"])
                        .default_value("rayon")
                        .help("Where worker tasks run"),
                )
                .arg(
                    Arg::new("fail-on")
                        .long("fail-on")
                        .value_parser(clap::value_parser!(i64))
                        .allow_negative_numbers(true)
                        .help("Make the visitor fail when it meets this value"),
                )
                .arg(json_arg()),
        )
        .get_matches();

    let quiet = matches.get_flag("quiet");
    init_logging(quiet);

    let cwd = env::current_dir().map_err(|e| e.to_string())?;
    let cfg = load_config(&cwd).map_err(|e| error_chain(&e))?;

    match matches.subcommand() {
        Some(("sections", sub_m)) => cmd_sections(sub_m, &cfg),
        Some(("stats", sub_m)) => cmd_stats(sub_m, &cfg, quiet),
        _ => {
            dim("Nothing to do. Try `fanjoin --help`.");
            Ok(())
        }
    }
}

fn main() {
    if !use_color() {
        colored::control::set_override(false);
    }

    let code = match std::panic::catch_unwind(run) {
        Ok(Ok(())) => 0,
        Ok(Err(e)) => {
            error(&e);
            1
        }
        Err(_) => {
            error("An unexpected error occurred. Please report this issue.");
            1
        }
    };
    std::process::exit(code);
}
