//! Command-line interface for sprig.
//!
//! ```text
//! sprig <grammar> [--source FILE] [--output FILE] [--check] [--leaves] [--verbose]
//! ```
//!
//! `<grammar>` is either a `grammar.json` or a table blob written by
//! `--output`. With `--check` the grammar is only validated. With
//! `--source` the file is parsed and its tree printed as an S-expression;
//! the exit status is 1 if the tree contains errors.

use facet::Facet;
use sprig::{generate, parse_grammar, validate, GrammarError, Language, LoadError, Parser};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Facet, Debug)]
struct Args {
    /// Path to a `grammar.json` or a compiled table blob.
    #[facet(positional)]
    grammar: String,

    /// Source file to parse.
    #[facet(named, short = 's', default)]
    source: Option<String>,

    /// Where to write the compiled table.
    #[facet(named, short = 'o', default)]
    output: Option<String>,

    /// Only validate the grammar.
    #[facet(named, short = 'c', default)]
    check: bool,

    /// Print every token of the parsed source instead of the S-expression.
    #[facet(named, short = 'l', default)]
    leaves: bool,

    /// Log generator and parser decisions to stderr.
    #[facet(named, short = 'v', default)]
    verbose: bool,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{0}")]
    Args(String),
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Grammar(#[from] GrammarError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("{0}")]
    Invalid(#[from] sprig::ValidationError),
}

fn main() -> ExitCode {
    let raw: Vec<String> = std::env::args().skip(1).collect();
    let refs: Vec<&str> = raw.iter().map(String::as_str).collect();
    let result = facet_args::from_slice::<Args>(&refs)
        .map_err(|e| CliError::Args(e.to_string()))
        .and_then(|args| {
            init_logging(args.verbose);
            run(&args)
        });
    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(2)
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "sprig=debug" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read(path: &str) -> Result<Vec<u8>, CliError> {
    std::fs::read(path).map_err(|source| CliError::Read {
        path: path.into(),
        source,
    })
}

fn run(args: &Args) -> Result<ExitCode, CliError> {
    let bytes = read(&args.grammar)?;
    let language = if bytes.starts_with(b"SPRG") {
        if args.check {
            return Err(CliError::Args(
                "--check needs a grammar.json, not a compiled table".into(),
            ));
        }
        Language::from_bytes(&bytes, None)?
    } else {
        let json = String::from_utf8_lossy(&bytes);
        let grammar = parse_grammar(&json)?;
        if args.check {
            validate(&grammar)?;
            println!("{}: ok", grammar.name);
            return Ok(ExitCode::SUCCESS);
        }
        generate(&grammar)?
    };

    if let Some(output) = &args.output {
        std::fs::write(output, language.to_bytes()).map_err(|source| CliError::Write {
            path: output.into(),
            source,
        })?;
        tracing::info!(path = %output, "wrote table");
    }

    let Some(source) = &args.source else {
        if args.output.is_none() {
            println!(
                "{}: {} symbols, {} states, {} productions, {} conflicts resolved",
                language.name(),
                language.symbol_count(),
                language.state_count(),
                language.production_count(),
                language.conflict_count(),
            );
        }
        return Ok(ExitCode::SUCCESS);
    };

    let text = String::from_utf8_lossy(&read(source)?).into_owned();
    let tree = Parser::new(language).parse(&text);
    if args.leaves {
        for leaf in tree.leaves() {
            let leaf_text = text.get(leaf.byte_range.clone()).unwrap_or_default();
            println!("{}\t{:?}\t{:?}", leaf.kind, leaf.byte_range, leaf_text);
        }
    } else {
        println!("{tree}");
    }
    let errors = tree.errors();
    for range in &errors {
        eprintln!("syntax error at bytes {}..{}", range.start, range.end);
    }
    Ok(if errors.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
