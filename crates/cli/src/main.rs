use std::process::ExitCode;

fn main() -> ExitCode {
    arbot_cli::run()
}
