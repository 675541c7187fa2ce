use retrainflow::{app, cli, logging};

#[tokio::main]
async fn main() {
    if let Err(err) = run_main().await {
        eprintln!("retrainflow error: {err:#}");
        std::process::exit(1);
    }
}

async fn run_main() -> anyhow::Result<()> {
    let args = cli::parse();
    logging::init_logging(args.log_level, args.log_json)?;
    app::run(args).await
}
