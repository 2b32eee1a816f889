use clap::Parser;
use fundrank::cli::{run, Cli};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
