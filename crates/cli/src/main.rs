use std::process::ExitCode;

fn main() -> ExitCode {
    capplan_cli::run()
}
