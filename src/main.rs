mod catalog;
mod chat;
mod config;
mod error;
mod page;
mod proxy;
mod render;
mod routine;
mod selection;
#[cfg(test)]
mod test_support;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{Config, Transport};
use crate::page::{PageState, Session};
use crate::routine::RoutineClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load();

    match std::env::args().nth(1).as_deref() {
        None | Some("page") => run_page(config).await,
        Some("proxy") => proxy::run(config.proxy).await,
        Some(other) => anyhow::bail!("unknown mode `{other}`, expected `page` or `proxy`"),
    }
}

async fn run_page(config: Config) -> anyhow::Result<()> {
    let mut session = Session::new();
    session.load_catalog(&config.catalog.source).await;

    let client = RoutineClient::with_config(&config.transport);
    match client.transport() {
        Transport::None => warn!("no proxy_url or api_key configured; routine generation will ask for setup"),
        Transport::Direct(_) => warn!("using a client-side API key; deploy the edge proxy for production"),
        Transport::Proxy(url) => info!("routing chat through proxy {url}"),
    }

    page::run(&config.page.listen, PageState::new(session, client)).await
}
