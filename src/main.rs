#![deny(clippy::all)]

use anyhow::Context as _;
use clap::Parser;
use indexmap::IndexMap;
use scribe_engine::{Context, EngineBuilder, Value};
use scribe_util::ResultTraced;
use std::path::PathBuf;
use tracing_subscriber::{filter::EnvFilter, prelude::*};

#[derive(Debug, Parser)]
#[clap(
    author,
    version,
    about,
    long_about = "Render a template file against a set of parameters"
)]
struct Args {
    /// Template file to render. Omit to read source from stdin
    file: Option<PathBuf>,

    /// Parameter in `name=value` form, passed to the template as a top-level
    /// variable. Values are parsed as int/float/bool when possible, else
    /// kept as a string. May be repeated
    #[clap(long = "set", short = 's')]
    params: Vec<String>,
}

fn main() {
    initialize_tracing();
    let args = Args::parse();
    match run(&args) {
        Ok(output) => print!("{output}"),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(1);
        }
    }
}

fn run(args: &Args) -> anyhow::Result<String> {
    let params = parse_params(&args.params);
    let ctx = Context::new(vec![std::rc::Rc::new(params)]);
    let runtime = EngineBuilder::new().build();

    match &args.file {
        Some(path) => Ok(runtime.compile_file(path).execute(&ctx)),
        None => {
            use std::io::Read;
            let mut source = String::new();
            std::io::stdin()
                .read_to_string(&mut source)
                .context("Error reading template from stdin")
                .traced()?;
            Ok(runtime.compile(&source).execute(&ctx))
        }
    }
}

fn parse_params(pairs: &[String]) -> Value {
    let mut map = IndexMap::new();
    for pair in pairs {
        let Some((name, raw)) = pair.split_once('=') else {
            continue;
        };
        map.insert(name.to_owned(), parse_scalar(raw));
    }
    Value::Object(map)
}

fn parse_scalar(raw: &str) -> Value {
    if let Ok(i) = raw.parse::<i64>() {
        Value::Int(i)
    } else if let Ok(f) = raw.parse::<f64>() {
        Value::Float(f)
    } else if raw == "true" || raw == "false" {
        Value::Bool(raw == "true")
    } else {
        Value::String(raw.to_owned())
    }
}

/// Set up tracing to log to stderr, filtered by `RUST_LOG`
fn initialize_tracing() {
    let subscriber = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(subscriber).init();
}
