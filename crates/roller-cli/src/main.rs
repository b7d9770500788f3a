use std::process::ExitCode;

use roller_cli::{
    cli::Cli,
    Environment,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = color_eyre::install() {
        eprintln!("failed installing the error report hook:\n{err:?}");
        return ExitCode::FAILURE;
    }

    let env: Environment = match config::get() {
        Ok(env) => env,
        Err(err) => {
            eprintln!("failed reading the roller environment:\n{err}");
            return ExitCode::FAILURE;
        }
    };

    let filter = EnvFilter::try_new(&env.log).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::get_args();
    if let Err(err) = args.run(&env).await {
        eprintln!("Error: {err:?}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
