use std::sync::Arc;

use basisdesk::gate::GateSpotClient;
use basisdesk::mexc::MexcFuturesClient;
use basisdesk::strategy::config::DeskConfig;
use basisdesk::strategy::engine::TradeDesk;
use basisdesk::strategy::reconcile::spawn_reconcile_loop;
use basisdesk::strategy::store::{DeskStore, MemoryStore, RedisStore};
use basisdesk::{http, DynError};

#[tokio::main]
async fn main() -> Result<(), DynError> {
    dotenv::dotenv().ok();
    let cfg = DeskConfig::from_env()?;

    eprintln!(
        "[BOOT] symbol {} | margin {}% | leverage {}x | poll {}s | not-found policy: {}",
        cfg.default_symbol,
        cfg.margin_pct,
        cfg.leverage,
        cfg.poll_interval_secs,
        if cfg.assume_filled_on_not_found {
            "assume filled"
        } else {
            "manual review"
        }
    );
    if cfg.gate.is_none() {
        eprintln!("[BOOT] gate credentials missing; spot orders and balances will fail");
    }
    if cfg.mexc_auth_token.is_none() {
        eprintln!("[BOOT] MEXC_AUTH_TOKEN missing; futures orders and balances will fail");
    }

    let store: Arc<dyn DeskStore> = match RedisStore::connect(&cfg.redis_url, None).await {
        Ok(store) => {
            eprintln!("[BOOT] redis connected at {}", cfg.redis_url);
            Arc::new(store)
        }
        Err(e) => {
            eprintln!(
                "[BOOT] redis unavailable ({}); running on the in-memory store, nothing will persist",
                e
            );
            Arc::new(MemoryStore::new())
        }
    };

    let spot = Arc::new(GateSpotClient::new(cfg.gate.clone()));
    let futures = Arc::new(MexcFuturesClient::new(cfg.mexc_auth_token.clone()));

    let desk = Arc::new(TradeDesk::bootstrap(spot, futures, store, cfg.clone()).await);
    spawn_reconcile_loop(desk.clone());

    http::serve(desk, cfg.listen_port).await
}
