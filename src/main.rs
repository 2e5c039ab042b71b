use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use snippetbox::app::App;
use snippetbox::config::Config;
use snippetbox::models::{MemorySnippets, MemoryUsers};
use snippetbox::render::JsonRenderer;
use snippetbox::session::MemoryStore;
use snippetbox::Server;

/// How often expired sessions are swept from the memory store.
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[tokio::main]
async fn main() -> Result<(), snippetbox::Error> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::parse();
    if config.secret.is_none() {
        warn!("no --secret given; open forms will stop validating after a restart");
    }
    if config.insecure_cookies {
        warn!("cookies are sent without Secure; use only for plain-HTTP development");
    }
    info!(debug = config.debug, static_dir = %config.static_dir.display(), "starting");

    let store = MemoryStore::new();
    let sweeper = store.spawn_cleanup(SESSION_SWEEP_INTERVAL);

    let addr = config.addr;
    let app = App::new(
        config,
        Arc::new(store),
        Arc::new(MemoryUsers::new()),
        Arc::new(MemorySnippets::new()),
        Arc::new(JsonRenderer),
    );

    let result = Server::bind(addr).serve(app.routes()).await;
    sweeper.abort();
    result
}
