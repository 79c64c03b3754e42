use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use geata_server::config::Config;
use geata_server::server::{run_stdio, McpServer, DEFAULT_PORT};
use geata_server::tools::ServerContext;

#[derive(Parser, Debug)]
#[command(name = "geata", version, about = "Google Workspace bridge for MCP clients")]
struct Args {
    /// Transport to serve on: "stdio" or "tcp"
    #[arg(long, default_value = "stdio")]
    transport: String,

    /// Port for TCP mode
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout belongs to the stdio transport.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::from_env()?;
    let ctx = Arc::new(ServerContext::new(&config)?);

    match args.transport.as_str() {
        "stdio" => run_stdio(ctx).await?,
        "tcp" => {
            let server = McpServer::new(ctx, args.port);
            server.start().await?;
            info!(port = args.port, "serving until interrupted");
            tokio::signal::ctrl_c().await?;
            server.stop()?;
        }
        other => anyhow::bail!("unsupported transport: {other} (expected stdio or tcp)"),
    }

    Ok(())
}
