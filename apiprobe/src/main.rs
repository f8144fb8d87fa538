use std::process::ExitCode;

use apiprobe::{run, Cli};
use clap::Parser;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .try_init();
    let cli = Cli::parse();
    run(cli).await
}
