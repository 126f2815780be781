use clap::Parser;
use vedascript::cli::{run, Cli};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
