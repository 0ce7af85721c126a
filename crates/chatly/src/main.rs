use chatly::config::Config;
use chatly::server::run_server;
use chatly::telemetry::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = Config::from_env()?;
    run_server(config).await
}
