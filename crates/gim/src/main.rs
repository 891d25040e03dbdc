use std::sync::Arc;

use tracing::{error, info};

use gim_core::{config::Config, group::GroupRegistry, router::Router, store::MemoryStore};

mod console;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::load()?;
    gim_core::logging::init(&cfg.service_name, cfg.log_json)?;

    let store = Arc::new(MemoryStore::new());
    let delivery = Arc::new(console::ConsoleDelivery::new());
    let registry = Arc::new(GroupRegistry::new(
        store.clone(),
        store.clone(),
        delivery.clone(),
    ));

    for &gid in &cfg.preload_groups {
        if let Err(e) = registry.get(gid).await {
            error!(%gid, error = %e, "preload failed");
        }
    }

    let api = Arc::new(gim_api::ApiState::new(
        store.clone(),
        registry.clone(),
        delivery.clone(),
    ));
    // A malformed tree must stop the process before anything is served.
    let router = Arc::new(
        gim_api::register(Router::builder().strict_params(cfg.strict_params), &api).build()?,
    );
    info!(service = %cfg.service_name, routes = router.paths().len(), "gim started, reading requests from stdin");

    tokio::select! {
        res = console::serve_stdin(router, store, delivery) => res?,
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }

    info!(live_groups = registry.loaded().len(), "gim stopped");
    Ok(())
}
