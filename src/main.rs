//! mdcheck CLI - checks SAML metadata against local rule documents

use clap::error::ErrorKind;
use clap::Parser;
use mdcheck::runner::{CheckRunner, RunResult};
use mdcheck::CheckError;
use std::error::Error;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "mdcheck",
    version,
    about = "SAML metadata checker",
    long_about = "Checks an input file containing SAML metadata against a set of local rules \
                  expressed as XML rule documents. Exits non-zero if any rule emits a message \
                  starting with [ERROR]."
)]
struct Cli {
    /// Metadata file to check
    input: PathBuf,

    /// Rule documents, applied in the order given
    #[arg(required = true)]
    rules: Vec<PathBuf>,
}

fn check(cli: &Cli) -> Result<RunResult, CheckError> {
    let mut runner = CheckRunner::new(&cli.input)?;
    for path in &cli.rules {
        runner.add_rule_set(path)?;
    }
    runner.run(&mut std::io::stderr())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    // The whole failure surface maps to one exit code, so usage errors exit
    // 1 here rather than clap's default 2.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    match check(&cli) {
        Ok(result) if result.passed() => {}
        Ok(_) => {
            eprintln!("*** ERRORS ENCOUNTERED IN {} ***", cli.input.display());
            std::process::exit(1);
        }
        Err(err) => {
            eprintln!("Internal error: {}", err);
            let mut source = err.source();
            while let Some(cause) = source {
                eprintln!("  caused by: {}", cause);
                source = cause.source();
            }
            std::process::exit(1);
        }
    }
}
