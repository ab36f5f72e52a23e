// src/main.rs

use nac_runner::cli::Command;
use nac_runner::http::PoolLimits;
use nac_runner::{cli, http, logging, run};

#[tokio::main]
async fn main() {
    match run_main().await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("nac-runner error: {err:?}");
            std::process::exit(2);
        }
    }
}

async fn run_main() -> anyhow::Result<i32> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;

    if let Some(Command::HttpProxy(proxy)) = &args.command {
        http::proxy::serve_stdio(proxy.apply(PoolLimits::default())).await?;
        return Ok(0);
    }

    run(args).await
}
