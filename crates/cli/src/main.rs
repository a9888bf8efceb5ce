use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    kbase_observability::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match kbase_cli::command::parse(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("error: {e}\n\n{}", kbase_cli::command::USAGE);
            return ExitCode::from(2);
        }
    };

    match kbase_cli::run(command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
