use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use clap::{ArgAction, Args, Parser, Subcommand};
use rayon::prelude::*;
use schema_union_config::{RegisteredSchema, RegistryConfig, SchemaRegistry};
use schema_union_core::SchemaError;
use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;

const STDIN: &str = "-";

#[derive(Debug, Parser)]
#[command(name = "schema-union")]
#[command(about = "Check schema sets and load or dump records against them")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build every schema of a descriptor file and report problems.
    Check(CheckArgs),
    /// Validate and decode wire records.
    Load(ProcessArgs),
    /// Encode decoded values into wire records.
    Dump(ProcessArgs),
    /// Print the structure of one or all schemas as JSON.
    Describe(DescribeArgs),
}

#[derive(Debug, Args)]
struct CheckArgs {
    /// Descriptor file (YAML, or JSON with a `.json` extension).
    #[arg(long)]
    config: PathBuf,
}

#[derive(Debug, Args)]
struct ProcessArgs {
    /// Descriptor file (YAML, or JSON with a `.json` extension).
    #[arg(long)]
    config: PathBuf,
    /// Name of the schema to apply.
    #[arg(long)]
    schema: String,
    /// JSON input files; `-` or nothing reads stdin.
    inputs: Vec<PathBuf>,
    /// Number of parallel jobs for multiple inputs (default: number of CPUs).
    #[arg(long)]
    jobs: Option<usize>,
}

#[derive(Debug, Args)]
struct DescribeArgs {
    /// Descriptor file (YAML, or JSON with a `.json` extension).
    #[arg(long)]
    config: PathBuf,
    /// Schema to describe; all schemas when omitted.
    #[arg(long)]
    schema: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Load,
    Dump,
}

fn main() {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Command::Check(args) => run_check(args),
        Command::Load(args) => run_process(args, Direction::Load),
        Command::Dump(args) => run_process(args, Direction::Dump),
        Command::Describe(args) => run_describe(args),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run_check(args: CheckArgs) -> Result<(), String> {
    let registry = build_registry(&args.config)?;
    println!(
        "Built {} schema(s) from '{}'.",
        registry.len(),
        args.config.display()
    );
    for name in registry.names() {
        println!("  {name}");
    }
    Ok(())
}

fn run_process(args: ProcessArgs, direction: Direction) -> Result<(), String> {
    let registry = build_registry(&args.config)?;
    let schema = registry.require(&args.schema).map_err(|e| e.to_string())?;

    let inputs = if args.inputs.is_empty() {
        vec![PathBuf::from(STDIN)]
    } else {
        args.inputs
    };

    if let [input] = inputs.as_slice() {
        let value = read_json(input)?;
        let out = apply(schema, direction, &value)
            .map_err(|err| format!("'{}' {}", input.display(), describe_failure(&err)))?;
        return print_json(&out);
    }

    if inputs.iter().any(|p| p.as_os_str() == STDIN) {
        return Err("stdin ('-') cannot be combined with other inputs".to_string());
    }

    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(jobs) = args.jobs {
        builder = builder.num_threads(jobs);
    }
    let pool = builder
        .build()
        .map_err(|e| format!("Failed to create thread pool: {e}"))?;

    let outcomes: Vec<(String, Result<Value, String>)> = pool.install(|| {
        inputs
            .par_iter()
            .map(|path| {
                let outcome = read_json(path).and_then(|value| {
                    apply(schema, direction, &value).map_err(|err| describe_failure(&err))
                });
                (path.display().to_string(), outcome)
            })
            .collect()
    });

    let mut output = Map::new();
    let mut failures = Vec::new();
    for (path, outcome) in outcomes {
        match outcome {
            Ok(value) => {
                output.insert(path, value);
            }
            Err(err) => failures.push(format!("'{path}' {err}")),
        }
    }
    if !failures.is_empty() {
        return Err(format!(
            "{} of {} input(s) failed:\n{}",
            failures.len(),
            inputs.len(),
            failures.join("\n")
        ));
    }
    print_json(&Value::Object(output))
}

fn run_describe(args: DescribeArgs) -> Result<(), String> {
    let registry = build_registry(&args.config)?;

    if let Some(name) = &args.schema {
        return print_json(&describe_schema(&registry, name)?);
    }

    let mut output = Map::new();
    for name in registry.names() {
        output.insert(name.to_string(), describe_schema(&registry, name)?);
    }
    print_json(&Value::Object(output))
}

fn describe_schema(registry: &SchemaRegistry, name: &str) -> Result<Value, String> {
    let schema = registry.require(name).map_err(|e| e.to_string())?;
    let description = schema
        .describe(name)
        .map_err(|err| format!("schema '{name}': {err}"))?;
    serde_json::to_value(&description)
        .map_err(|err| format!("Failed to serialize description of '{name}': {err}"))
}

fn build_registry(path: &Path) -> Result<SchemaRegistry, String> {
    let config = RegistryConfig::load(path)
        .map_err(|err| format!("Failed to read '{}': {err}", path.display()))?;
    SchemaRegistry::from_config(&config).map_err(|err| format!("'{}': {err}", path.display()))
}

fn apply(schema: &RegisteredSchema, direction: Direction, value: &Value) -> Result<Value, SchemaError> {
    match direction {
        Direction::Load => schema.load(value),
        Direction::Dump => schema.dump(value),
    }
}

fn describe_failure(err: &SchemaError) -> String {
    match err {
        SchemaError::Validation(keyed) => format!("failed validation:\n{keyed}"),
        SchemaError::Config(config) => format!("unusable schema: {config}"),
    }
}

fn read_json(path: &Path) -> Result<Value, String> {
    let raw = if path.as_os_str() == STDIN {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .map_err(|err| format!("Failed to read stdin: {err}"))?;
        raw
    } else {
        fs::read_to_string(path)
            .map_err(|err| format!("Failed to read '{}': {err}", path.display()))?
    };
    serde_json::from_str(&raw).map_err(|err| format!("Invalid JSON in '{}': {err}", path.display()))
}

fn print_json(value: &Value) -> Result<(), String> {
    let raw = serde_json::to_string_pretty(value)
        .map_err(|err| format!("Failed to serialize output: {err}"))?;
    println!("{raw}");
    Ok(())
}
