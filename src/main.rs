mod clinic;
mod config;
mod entities;
mod google;
mod http_api;
mod ids;
mod mapping;
mod mongo;
mod sheets;
mod store;
mod vietqr;

use std::sync::Arc;

use anyhow::anyhow;
use dotenvy::dotenv;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::config::{AppConfig, BackendKind};
use crate::sheets::SheetBackend;

async fn build_backend(cfg: &AppConfig) -> anyhow::Result<Arc<dyn SheetBackend>> {
    let backend: Arc<dyn SheetBackend> = match cfg.backend {
        BackendKind::Google => {
            let sheet_id = cfg
                .google_sheet_id
                .clone()
                .ok_or_else(|| anyhow!("GOOGLE_SHEET_ID environment variable is required"))?;
            let token = cfg
                .google_token
                .clone()
                .ok_or_else(|| anyhow!("GOOGLE_SHEETS_TOKEN environment variable is required"))?;
            Arc::new(google::GoogleSheets::new(sheet_id, token)?)
        }
        BackendKind::Mongo => {
            let uri = cfg
                .mongo_uri
                .as_deref()
                .ok_or_else(|| anyhow!("MONGO_URI missing in environment"))?;
            mongo::init_mongo(uri, &cfg.mongo_db).await?;
            Arc::new(mongo::MongoSheets::from_global()?)
        }
        BackendKind::Memory => {
            tracing::warn!(target: "store", "using in-memory sheets; data is lost on exit");
            Arc::new(sheets::MemorySheets::new())
        }
    };
    Ok(backend)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let cfg = AppConfig::from_env()?;
    tracing::info!(target: "http", "[boot] backend = {:?}, port = {}", cfg.backend, cfg.port);

    let backend = build_backend(&cfg).await?;
    let clinic = clinic::Clinic::new(
        store::RowStore::new(backend),
        cfg.bank.clone(),
        cfg.owner_email.clone(),
    );

    http_api::run_http_server(&cfg, clinic).await?;

    Ok(())
}
