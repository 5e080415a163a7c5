//! Persistence collaborator: overrides and trade history.
//!
//! At-least-once write semantics are acceptable everywhere; re-saving an
//! unchanged record is harmless. The desk keeps working (empty) when the
//! backing store is unreachable at boot.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;

use crate::strategy::types::Trade;
use crate::DynError;

#[async_trait::async_trait]
pub trait DeskStore: Send + Sync {
    /// Durable before returning Ok.
    async fn upsert_override(&self, symbol: &str, patch: &Value) -> Result<(), String>;

    async fn load_overrides(&self) -> Result<HashMap<String, Value>, String>;

    /// Idempotent upsert keyed by `localId`.
    async fn save_trade(&self, trade: &Trade) -> Result<(), String>;

    /// Newest first.
    async fn load_history(&self) -> Result<Vec<Trade>, String>;
}

/// In-memory store for tests and degraded boot.
#[derive(Default)]
pub struct MemoryStore {
    overrides: Mutex<HashMap<String, Value>>,
    trades: Mutex<HashMap<String, Trade>>,
    save_calls: std::sync::atomic::AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of trade records held, for test assertions.
    pub fn trade_count(&self) -> usize {
        self.trades.lock().expect("memory store lock").len()
    }

    /// Number of `save_trade` calls observed, for persist-on-change tests.
    pub fn save_calls(&self) -> usize {
        self.save_calls.load(std::sync::atomic::Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl DeskStore for MemoryStore {
    async fn upsert_override(&self, symbol: &str, patch: &Value) -> Result<(), String> {
        let mut overrides = self.overrides.lock().map_err(|e| e.to_string())?;
        overrides.insert(symbol.to_string(), patch.clone());
        Ok(())
    }

    async fn load_overrides(&self) -> Result<HashMap<String, Value>, String> {
        let overrides = self.overrides.lock().map_err(|e| e.to_string())?;
        Ok(overrides.clone())
    }

    async fn save_trade(&self, trade: &Trade) -> Result<(), String> {
        self.save_calls
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let mut trades = self.trades.lock().map_err(|e| e.to_string())?;
        trades.insert(trade.local_id.clone(), trade.clone());
        Ok(())
    }

    async fn load_history(&self) -> Result<Vec<Trade>, String> {
        let trades = self.trades.lock().map_err(|e| e.to_string())?;
        let mut history: Vec<Trade> = trades.values().cloned().collect();
        history.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(history)
    }
}

/// Redis-backed store: one hash per collection, JSON values.
pub struct RedisStore {
    conn: redis::aio::MultiplexedConnection,
    prefix: String,
}

impl RedisStore {
    pub async fn connect(url: &str, prefix: Option<String>) -> Result<Self, DynError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_tokio_connection().await?;
        Ok(Self {
            conn,
            prefix: prefix.unwrap_or_else(|| "desk".to_string()),
        })
    }

    fn overrides_key(&self) -> String {
        format!("{}:overrides", self.prefix)
    }

    fn trades_key(&self) -> String {
        format!("{}:trades", self.prefix)
    }
}

#[async_trait::async_trait]
impl DeskStore for RedisStore {
    async fn upsert_override(&self, symbol: &str, patch: &Value) -> Result<(), String> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(patch).map_err(|e| e.to_string())?;
        redis::cmd("HSET")
            .arg(self.overrides_key())
            .arg(symbol)
            .arg(json)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| e.to_string())
    }

    async fn load_overrides(&self) -> Result<HashMap<String, Value>, String> {
        let mut conn = self.conn.clone();
        let raw: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(self.overrides_key())
            .query_async(&mut conn)
            .await
            .map_err(|e| e.to_string())?;
        let mut overrides = HashMap::new();
        for (symbol, json) in raw {
            match serde_json::from_str(&json) {
                Ok(patch) => {
                    overrides.insert(symbol, patch);
                }
                Err(e) => eprintln!("[STORE] skipping unparseable override for {}: {}", symbol, e),
            }
        }
        Ok(overrides)
    }

    async fn save_trade(&self, trade: &Trade) -> Result<(), String> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(trade).map_err(|e| e.to_string())?;
        redis::cmd("HSET")
            .arg(self.trades_key())
            .arg(&trade.local_id)
            .arg(json)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| e.to_string())
    }

    async fn load_history(&self) -> Result<Vec<Trade>, String> {
        let mut conn = self.conn.clone();
        let raw: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(self.trades_key())
            .query_async(&mut conn)
            .await
            .map_err(|e| e.to_string())?;
        let mut history = Vec::with_capacity(raw.len());
        for (local_id, json) in raw {
            match serde_json::from_str::<Trade>(&json) {
                Ok(trade) => history.push(trade),
                Err(e) => eprintln!("[STORE] skipping unparseable trade {}: {}", local_id, e),
            }
        }
        history.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::types::{LegStatus, Settlement, TradeMode, TradeStatus};
    use serde_json::json;

    fn trade(local_id: &str, created_at: i64) -> Trade {
        Trade {
            local_id: local_id.to_string(),
            created_at,
            symbol: "WMTX_USDT".into(),
            mode: TradeMode::Open,
            price_used_gate: 1.0,
            price_used_mexc: 1.1,
            volume: 10.0,
            contracts: 1.0,
            gate_order_id: None,
            mexc_order_id: None,
            gate_status: LegStatus::Creating,
            mexc_status: LegStatus::Creating,
            status: TradeStatus::Creating,
            settlement: Settlement::Pending,
            needs_review: false,
            executed_at: None,
            filled_at: None,
            cancelled_at: None,
        }
    }

    #[tokio::test]
    async fn test_memory_store_override_roundtrip() {
        let store = MemoryStore::new();
        store
            .upsert_override("WMTX_USDT", &json!({"gate": {"priceScale": 8}}))
            .await
            .unwrap();
        let overrides = store.load_overrides().await.unwrap();
        assert_eq!(overrides["WMTX_USDT"], json!({"gate": {"priceScale": 8}}));
    }

    #[tokio::test]
    async fn test_memory_store_history_newest_first_and_idempotent() {
        let store = MemoryStore::new();
        store.save_trade(&trade("1", 100)).await.unwrap();
        store.save_trade(&trade("2", 200)).await.unwrap();
        // Re-saving the same record is a harmless upsert.
        store.save_trade(&trade("1", 100)).await.unwrap();
        let history = store.load_history().await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].local_id, "2");
        assert_eq!(history[1].local_id, "1");
    }
}
