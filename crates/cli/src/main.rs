use std::process::ExitCode;

fn main() -> ExitCode {
    trout_cli::run()
}
