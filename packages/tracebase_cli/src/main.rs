use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracebase::table_file::{load_baseline, load_table, save_baseline, save_table};
use tracebase::{merge_tables, BaselinePair, ConsistencyEngine, EngineConfig, RecordType, Table};

#[derive(Parser)]
#[command(name = "tracebase", version, about = "Tracebase table merge and consistency tools")]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Three-way merge of one table file; the result is written over LEFT
    TableMerge(TableMergeArgs),
    /// Report consistency problems between a parent and a child baseline
    Check(CheckArgs),
}

#[derive(Args)]
struct TableMergeArgs {
    ancestor: PathBuf,
    left: PathBuf,
    right: PathBuf,
    /// Table whose collapse rule applies to rows added on both sides
    /// (default: inferred from LEFT's file name)
    #[arg(long, value_name = "NAME")]
    table: Option<String>,
}

#[derive(Args)]
struct CheckArgs {
    /// Directory holding the parent baseline's table files
    parent: PathBuf,
    /// Directory holding the child baseline's table files
    child: PathBuf,
    /// Apply on-load repairs and save both baselines
    #[arg(long)]
    fix: bool,
    /// Engine configuration as JSON
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let result = match cli.command {
        Command::TableMerge(args) => table_merge(args),
        Command::Check(args) => check(args),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn table_for(name: Option<&str>, left: &Path) -> Result<Option<&'static dyn Table>> {
    if let Some(name) = name {
        let record_type =
            RecordType::from_name(name).with_context(|| format!("--table {}", name))?;
        return Ok(Some(record_type.table()));
    }
    Ok(left
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| RecordType::from_name(n).ok())
        .map(RecordType::table))
}

fn table_merge(args: TableMergeArgs) -> Result<()> {
    let table = table_for(args.table.as_deref(), &args.left)?;
    let load = |path: &Path| {
        load_table(path).with_context(|| format!("reading {}", path.display()))
    };
    let ancestor = load(args.ancestor.as_path())?;
    let left = load(args.left.as_path())?;
    let right = load(args.right.as_path())?;

    let merged = merge_tables(&ancestor, &left, &right, table, Utc::now());
    save_table(&args.left, &merged)
        .with_context(|| format!("writing {}", args.left.display()))?;
    log::info!("merged {} rows into {}", merged.len(), args.left.display());
    Ok(())
}

fn check(args: CheckArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            EngineConfig::from_json_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?
        }
        None => EngineConfig::default(),
    };
    let engine = ConsistencyEngine::new(config);

    let parent = load_baseline(&args.parent)
        .with_context(|| format!("loading {}", args.parent.display()))?;
    let child = load_baseline(&args.child)
        .with_context(|| format!("loading {}", args.child.display()))?;
    let mut pair = BaselinePair::new(parent, child);

    if args.fix {
        let fixed = engine.on_load_autofix(&pair, Utc::now());
        if fixed != pair {
            save_baseline(&args.parent, fixed.parent())
                .with_context(|| format!("saving {}", args.parent.display()))?;
            save_baseline(&args.child, fixed.child())
                .with_context(|| format!("saving {}", args.child.display()))?;
        }
        pair = fixed;
    }

    for problem in engine.get_problems(&pair) {
        let fixes: Vec<String> = problem
            .solutions()
            .map(|(direction, solution)| format!("{:?}: {}", direction, solution.description()))
            .collect();
        println!("{}", problem);
        for fix in fixes {
            println!("    {}", fix);
        }
    }
    Ok(())
}
