use std::sync::Arc;

use anyhow::Context as _;
use sentinel::Service;
use sentinel_common::config::Config;
use sentinel_store::PgStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    sentinel_common::logging::init();

    let config = Config::from_env().context("loading configuration")?;
    let store = PgStore::connect(&config.database)
        .await
        .context("connecting to the store")?;

    Service::new(config, Arc::new(store)).run().await
}
