use mpgw_convert::{cli, logger};
use std::process::ExitCode;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    if let Err(e) = logger::init() {
        eprintln!("Failed to initialize logging: {e}");
    }
    cli::main().await
}
