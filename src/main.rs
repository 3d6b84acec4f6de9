use chrono::Local;
use dora_report::progress::TracingProgress;
use dora_report::{export, AppConfig, MetricsError, MetricsQuerier};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(e) = run().await {
        tracing::error!("{e:#}");
        let code = e
            .downcast_ref::<MetricsError>()
            .map(MetricsError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

fn init_tracing() {
    let fmt_layer = if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dora_report=info".into()),
        )
        .with(fmt_layer)
        .init();
}

async fn run() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    let config = AppConfig::from_env()?;
    let window = config.window(Local::now().date_naive())?;

    let querier = MetricsQuerier::new(&config)?;
    let output = querier.run(window, &TracingProgress).await?;

    let path = export::output_path(&config.artifacts_dir, &config.repo, &window);
    export::write_csv(&path, &output.records).map_err(MetricsError::from)?;
    tracing::info!(path = %path.display(), rows = output.records.len(), "Wrote change table");

    println!();
    println!("{}", output.report);

    Ok(())
}
