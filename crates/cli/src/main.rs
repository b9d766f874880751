use std::process::ExitCode;

fn main() -> ExitCode {
    tutor_cli::run()
}
