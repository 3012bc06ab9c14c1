use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use fetch_bridge::client::{BridgeClient, FetchGateway, FetchInit, ResponseBody};
use fetch_bridge::config::{load_or_default, BodyMode};
use fetch_bridge::observability::logging;
use fetch_bridge::transport::framed;

#[derive(Parser)]
#[command(name = "bridge-cli")]
#[command(about = "Perform one HTTP request through a fetch-bridge host", long_about = None)]
struct Cli {
    /// Target URL
    url: String,

    /// Config file (client and transport sections are used)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host address, overrides `client.host_address`
    #[arg(long)]
    host: Option<String>,

    #[arg(short = 'X', long, default_value = "GET")]
    method: String,

    /// Request header as `Name: value` (repeatable)
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Request body
    #[arg(short, long)]
    data: Option<String>,

    /// Timeout in milliseconds
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Stream the body chunk by chunk instead of buffering it
    #[arg(long)]
    stream: bool,

    /// Print response headers
    #[arg(short = 'i', long)]
    include: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_or_default(cli.config.as_deref())?;
    logging::init(&config.observability);

    let address = cli.host.clone().unwrap_or_else(|| config.client.host_address.clone());
    let stream = TcpStream::connect(&address).await?;
    let endpoint = framed::client_endpoint(stream, &config.transport);
    let gateway = FetchGateway::new(BridgeClient::connect_with_config(endpoint, &config.client), &config.client);

    let mut init = FetchInit::new().method(cli.method.as_str());
    for header in &cli.headers {
        let (name, value) = header
            .split_once(':')
            .ok_or_else(|| format!("invalid header '{}', expected 'Name: value'", header))?;
        init = init.header(name.trim(), value.trim());
    }
    if let Some(data) = cli.data {
        init = init.body(data);
    }
    if let Some(timeout) = cli.timeout {
        init = init.timeout(Duration::from_millis(timeout));
    }
    if cli.stream {
        init = init.body_mode(BodyMode::Streaming);
    }

    let response = gateway.fetch(cli.url.as_str(), init).await?;

    eprintln!("{} {}", response.status(), response.status_text());
    if cli.include {
        for (name, value) in response.headers().iter() {
            eprintln!("{}: {}", name, value);
        }
        eprintln!();
    }

    let mut stdout = tokio::io::stdout();
    match response.into_body() {
        ResponseBody::Buffered(bytes) => stdout.write_all(&bytes).await?,
        ResponseBody::Streaming(mut body) => {
            while let Some(chunk) = body.next().await {
                stdout.write_all(&chunk?).await?;
                stdout.flush().await?;
            }
        }
    }
    stdout.flush().await?;

    Ok(())
}
