//! Per-symbol market metadata: auto-discovered baseline, persisted operator
//! overrides, and the deep-merged effective view.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;

use crate::strategy::error::OpError;
use crate::strategy::types::{ExecSettings, GateMeta, MarketMeta, MetaReport, MexcMeta};
use crate::strategy::venue::{FuturesVenue, SpotVenue};

/// Recursive merge of `patch` into `base`: object leaves merge, scalar
/// leaves replace, null/absent leaves are no-ops.
pub fn deep_merge(base: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        if !patch.is_null() {
            *base = patch.clone();
        }
        return;
    };
    if !base.is_object() {
        *base = Value::Object(serde_json::Map::new());
    }
    if let Value::Object(base_map) = base {
        for (key, patch_val) in patch_map {
            if patch_val.is_null() {
                continue;
            }
            if patch_val.is_object() {
                let slot = base_map
                    .entry(key.clone())
                    .or_insert(Value::Object(serde_json::Map::new()));
                deep_merge(slot, patch_val);
            } else {
                base_map.insert(key.clone(), patch_val.clone());
            }
        }
    }
}

/// Apply an override patch to a baseline, validating that the merged value
/// still deserializes as market meta.
pub fn apply_override(baseline: &MarketMeta, patch: &Value) -> Result<MarketMeta, OpError> {
    let mut merged = serde_json::to_value(baseline)
        .map_err(|e| OpError::Storage(format!("meta serialization failed: {}", e)))?;
    deep_merge(&mut merged, patch);
    serde_json::from_value(merged)
        .map_err(|e| OpError::Validation(format!("override does not match meta shape: {}", e)))
}

/// Repository for market metadata. Baselines are discovered lazily and
/// cached for the process lifetime (or until an explicit refresh); overrides
/// are persisted through the store before a write reports success.
pub struct MetaRepository {
    spot: Arc<dyn SpotVenue>,
    futures: Arc<dyn FuturesVenue>,
    store: Arc<dyn crate::strategy::store::DeskStore>,
    default_settings: ExecSettings,
    baselines: Mutex<HashMap<String, MarketMeta>>,
    overrides: Mutex<HashMap<String, Value>>,
}

impl MetaRepository {
    pub fn new(
        spot: Arc<dyn SpotVenue>,
        futures: Arc<dyn FuturesVenue>,
        store: Arc<dyn crate::strategy::store::DeskStore>,
        default_settings: ExecSettings,
    ) -> Self {
        Self {
            spot,
            futures,
            store,
            default_settings,
            baselines: Mutex::new(HashMap::new()),
            overrides: Mutex::new(HashMap::new()),
        }
    }

    /// Seed the override map from persisted state at startup.
    pub async fn load_persisted(&self, persisted: HashMap<String, Value>) {
        let mut overrides = self.overrides.lock().await;
        *overrides = persisted;
    }

    /// Baseline for `symbol`, discovering and caching on first reference.
    /// Discovery failure on either venue substitutes the documented
    /// fallback so quotes stay available while discovery is degraded.
    pub async fn baseline(&self, symbol: &str) -> MarketMeta {
        {
            let cache = self.baselines.lock().await;
            if let Some(meta) = cache.get(symbol) {
                return meta.clone();
            }
        }

        let gate = match self.spot.pair_meta(symbol).await {
            Ok(meta) => meta,
            Err(e) => {
                eprintln!("[META] gate pair discovery failed for {}: {} (using fallback)", symbol, e);
                GateMeta::FALLBACK
            }
        };
        let mexc = match self.futures.contract_meta(symbol).await {
            Ok(meta) => meta,
            Err(e) => {
                eprintln!("[META] mexc contract discovery failed for {}: {} (using fallback)", symbol, e);
                MexcMeta::FALLBACK
            }
        };
        let meta = MarketMeta {
            symbol: symbol.to_string(),
            gate,
            mexc,
            settings: self.default_settings,
        };

        let mut cache = self.baselines.lock().await;
        cache.entry(symbol.to_string()).or_insert_with(|| meta.clone());
        meta
    }

    pub async fn override_of(&self, symbol: &str) -> Option<Value> {
        self.overrides.lock().await.get(symbol).cloned()
    }

    /// Effective meta: override leaves merged over the baseline. A stored
    /// override that no longer matches the meta shape is ignored with a
    /// warning rather than poisoning resolution.
    pub async fn resolve(&self, symbol: &str) -> MarketMeta {
        let baseline = self.baseline(symbol).await;
        let Some(patch) = self.override_of(symbol).await else {
            return baseline;
        };
        match apply_override(&baseline, &patch) {
            Ok(merged) => merged,
            Err(e) => {
                eprintln!("[META] stored override for {} is unusable: {} (ignoring)", symbol, e);
                baseline
            }
        }
    }

    pub async fn report(&self, symbol: &str) -> MetaReport {
        let auto = self.baseline(symbol).await;
        let override_patch = self.override_of(symbol).await;
        let merged = self.resolve(symbol).await;
        MetaReport {
            symbol: symbol.to_string(),
            auto,
            override_patch,
            merged,
        }
    }

    /// Merge `patch` into the stored override for `symbol` and persist it.
    /// The write is durable before this returns success; the auto-discovered
    /// baseline is left untouched.
    pub async fn set_override(&self, symbol: &str, patch: &Value) -> Result<MarketMeta, OpError> {
        if !patch.is_object() {
            return Err(OpError::Validation("override must be an object".into()));
        }

        let baseline = self.baseline(symbol).await;
        let combined = {
            let overrides = self.overrides.lock().await;
            let mut combined = overrides.get(symbol).cloned().unwrap_or_else(|| Value::Object(serde_json::Map::new()));
            deep_merge(&mut combined, patch);
            combined
        };

        // Validate before persisting: a patch that breaks the meta shape is
        // rejected instead of being written.
        let merged = apply_override(&baseline, &combined)?;

        self.store
            .upsert_override(symbol, &combined)
            .await
            .map_err(OpError::Storage)?;

        let mut overrides = self.overrides.lock().await;
        overrides.insert(symbol.to_string(), combined);
        Ok(merged)
    }

    /// Drop one symbol's cached baseline so the next reference rediscovers.
    pub async fn refresh(&self, symbol: &str) {
        self.baselines.lock().await.remove(symbol);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn baseline() -> MarketMeta {
        MarketMeta {
            symbol: "WMTX_USDT".into(),
            gate: GateMeta {
                price_scale: 11,
                qty_scale: 0,
                min_qty: 0.0,
                min_quote: 3.0,
            },
            mexc: MexcMeta::FALLBACK,
            settings: ExecSettings {
                margin_pct: 10.0,
                leverage: 1.0,
            },
        }
    }

    #[test]
    fn test_deep_merge_untouched_leaves_survive() {
        let mut base = json!({"priceScale": 11, "qtyScale": 0});
        deep_merge(&mut base, &json!({"priceScale": 8}));
        assert_eq!(base, json!({"priceScale": 8, "qtyScale": 0}));
    }

    #[test]
    fn test_deep_merge_recurses_into_objects() {
        let mut base = json!({"gate": {"priceScale": 11, "qtyScale": 0}, "settings": {"leverage": 1}});
        deep_merge(&mut base, &json!({"gate": {"priceScale": 8}}));
        assert_eq!(
            base,
            json!({"gate": {"priceScale": 8, "qtyScale": 0}, "settings": {"leverage": 1}})
        );
    }

    #[test]
    fn test_deep_merge_null_is_noop() {
        let mut base = json!({"priceScale": 11});
        deep_merge(&mut base, &json!({"priceScale": null, "minQty": null}));
        assert_eq!(base, json!({"priceScale": 11}));
    }

    #[test]
    fn test_apply_override_merges_scalars() {
        let merged = apply_override(&baseline(), &json!({"gate": {"priceScale": 8}})).unwrap();
        assert_eq!(merged.gate.price_scale, 8);
        assert_eq!(merged.gate.qty_scale, 0);
        assert_eq!(merged.mexc.contract_size, 10.0);
    }

    #[test]
    fn test_apply_override_settings_leaf() {
        let merged =
            apply_override(&baseline(), &json!({"settings": {"leverage": 5.0}})).unwrap();
        assert_eq!(merged.settings.leverage, 5.0);
        assert_eq!(merged.settings.margin_pct, 10.0);
    }

    #[test]
    fn test_apply_override_rejects_shape_breakage() {
        let result = apply_override(&baseline(), &json!({"gate": {"priceScale": "eleven"}}));
        assert!(result.is_err());
    }
}
