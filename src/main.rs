use clap::Parser;
use signaldesk::cli::{run, Cli};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
