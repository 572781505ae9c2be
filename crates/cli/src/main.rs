use std::process::ExitCode;

fn main() -> ExitCode {
    quickpick_cli::run()
}
