//! Precheck evaluation, dual-leg order submission, and cancellation.
//!
//! There is no cross-venue atomicity: one leg can land while the other
//! fails, and the truth table over the two acknowledgements becomes the
//! aggregate status. The trade record is persisted before either network
//! call so a crash mid-execution still leaves a reconcilable record.

use crate::strategy::engine::{PrecheckSnapshot, TradeDesk};
use crate::strategy::error::OpError;
use crate::strategy::planner::{build_plan, PlanOutcome};
use crate::strategy::sizing::{format_scaled, round_price};
use crate::strategy::types::{
    submission_status, CancelLegOutcome, CancelReport, ExecutionReport, FuturesOrderRequest,
    LegAck, LegStatus, MarketMeta, PrecheckDetails, PrecheckReport, Settlement, Trade, TradeMode,
    TradeStatus,
};

fn drift_pct(reference: f64, fresh: f64) -> f64 {
    if reference == 0.0 {
        return 0.0;
    }
    ((fresh - reference) / reference * 100.0).abs()
}

impl TradeDesk {
    async fn fresh_plan(
        &self,
        mode: TradeMode,
    ) -> Result<(String, MarketMeta, PlanOutcome), OpError> {
        let symbol = self.current_symbol().await;
        let meta = self.meta.resolve(&symbol).await;
        let gate_book = self.spot.order_book(&symbol).await?;
        let mexc_book = self.futures.depth(&symbol).await?;
        let position = self.state.lock().await.position.clone();
        let outcome = build_plan(mode, &gate_book, &mexc_book, &meta, &position)?;
        Ok((symbol, meta, outcome))
    }

    /// Dry-run: derive the executable pair and, for `open`, evaluate margin
    /// sufficiency on the futures venue. Never submits anything.
    pub async fn precheck(&self, mode: TradeMode) -> Result<PrecheckReport, OpError> {
        let (symbol, meta, outcome) = self.fresh_plan(mode).await?;
        let plan = match outcome {
            PlanOutcome::Blocked {
                reason,
                min_quote,
                gate_quote,
            } => {
                return Ok(PrecheckReport::Blocked {
                    blocked: true,
                    reason: reason.to_string(),
                    min_quote,
                    gate_quote,
                    mode,
                })
            }
            PlanOutcome::Ready(plan) => plan,
        };

        {
            let mut state = self.state.lock().await;
            state.last_precheck = Some(PrecheckSnapshot {
                symbol: symbol.clone(),
                mode,
                gate_touch: plan.gate_touch,
                mexc_touch: plan.mexc_touch,
                at_ms: self.now(),
            });
        }

        let contract_size = meta.mexc.effective_contract_size();
        let leverage = if meta.settings.leverage > 0.0 {
            meta.settings.leverage
        } else {
            1.0
        };
        let mut details = PrecheckDetails {
            mode,
            symbol,
            gate_price: plan.gate_price,
            mexc_price: plan.mexc_price,
            contracts: plan.contracts,
            contract_size,
            volume: plan.volume,
            leverage: meta.settings.leverage,
            margin_pct: meta.settings.margin_pct,
            required_usdt: 0.0,
            available_usdt: None,
        };

        // Close reduces exposure; no margin check applies.
        if mode == TradeMode::Close {
            return Ok(PrecheckReport::Evaluated {
                need_confirm: false,
                unknown_balance: false,
                details,
            });
        }

        details.required_usdt =
            round_price(plan.mexc_price * contract_size * plan.contracts / leverage, 6);
        match self.futures.available_usdt().await {
            Ok(Some(available)) => {
                details.available_usdt = Some(round_price(available, 6));
                Ok(PrecheckReport::Evaluated {
                    need_confirm: available < details.required_usdt,
                    unknown_balance: false,
                    details,
                })
            }
            Ok(None) => Ok(PrecheckReport::Evaluated {
                need_confirm: false,
                unknown_balance: true,
                details,
            }),
            Err(e) => {
                eprintln!("[PRECHECK] mexc balance unavailable: {}", e);
                Ok(PrecheckReport::Evaluated {
                    need_confirm: false,
                    unknown_balance: true,
                    details,
                })
            }
        }
    }

    /// Submit both legs of a trade. Price/quantity are re-derived from
    /// fresh books; the only thing taken from the precheck is the staleness
    /// guard over its touch prices.
    pub async fn execute_trade(&self, mode: TradeMode) -> Result<ExecutionReport, OpError> {
        let (symbol, meta, outcome) = self.fresh_plan(mode).await?;
        let plan = match outcome {
            PlanOutcome::Blocked {
                min_quote,
                gate_quote,
                ..
            } => {
                return Err(OpError::Validation(format!(
                    "gate minimum notional not met ({:.6} < {} USDT), try more contracts",
                    gate_quote, min_quote
                )))
            }
            PlanOutcome::Ready(plan) => plan,
        };
        if plan.volume <= 0.0 {
            return Err(OpError::Validation(
                "no tradable quantity at current depth and position target".into(),
            ));
        }

        // Reject when the book drifted past tolerance since a recent
        // precheck: the operator confirmed numbers that no longer hold.
        {
            let state = self.state.lock().await;
            if let Some(snap) = &state.last_precheck {
                let ttl_ms = (self.cfg.precheck_ttl_secs as i64) * 1000;
                if snap.symbol == symbol && snap.mode == mode && self.now() - snap.at_ms <= ttl_ms {
                    let gate_drift = drift_pct(snap.gate_touch, plan.gate_touch);
                    let mexc_drift = drift_pct(snap.mexc_touch, plan.mexc_touch);
                    let limit = self.cfg.max_book_drift_pct;
                    if gate_drift > limit || mexc_drift > limit {
                        return Err(OpError::Validation(format!(
                            "book moved since precheck (gate {:.3}%, mexc {:.3}%, limit {}%); re-run precheck",
                            gate_drift, mexc_drift, limit
                        )));
                    }
                }
            }
        }

        let now = self.now();
        let trade = {
            let mut state = self.state.lock().await;
            let local_id = Self::next_local_id(&state.history, now);
            let trade = Trade {
                local_id,
                created_at: now,
                symbol: symbol.clone(),
                mode,
                price_used_gate: plan.gate_price,
                price_used_mexc: plan.mexc_price,
                volume: plan.volume,
                contracts: plan.contracts,
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
            };
            state.history.insert(0, trade.clone());
            trade
        };
        if let Err(e) = self.store.save_trade(&trade).await {
            Self::log_store_failure("create", &e);
        }

        eprintln!(
            "[EXECUTE] {:?} {} | gate {} @ {} | mexc {} contract(s) @ {}",
            mode, symbol, plan.volume, plan.gate_price, plan.contracts, plan.mexc_price
        );

        let gate_price_str = format_scaled(plan.gate_price, meta.gate.price_scale);
        let gate_amount_str = format_scaled(plan.volume, meta.gate.qty_scale);
        let (gate_id, gate_ok) = match self
            .spot
            .place_limit_order(&symbol, mode.gate_side(), &gate_price_str, &gate_amount_str)
            .await
        {
            Ok(id) => (Some(id), true),
            Err(e) => {
                eprintln!("[EXECUTE] gate leg failed: {}", e);
                (None, false)
            }
        };

        let request = FuturesOrderRequest {
            symbol: symbol.clone(),
            price: plan.mexc_price,
            contracts: plan.contracts,
            leverage: meta.settings.leverage,
            side_code: mode.mexc_side_code(),
        };
        let (mexc_id, mexc_ok) = match self.futures.submit_order(&request).await {
            Ok(id) => (Some(id), true),
            Err(e) => {
                eprintln!("[EXECUTE] mexc leg failed: {}", e);
                (None, false)
            }
        };

        let status = submission_status(gate_ok, mexc_ok);
        let updated = {
            let mut state = self.state.lock().await;
            state
                .history
                .iter_mut()
                .find(|t| t.local_id == trade.local_id)
                .map(|t| {
                    t.gate_order_id = gate_id.clone();
                    t.mexc_order_id = mexc_id.clone();
                    t.gate_status = if gate_ok { LegStatus::Open } else { LegStatus::Error };
                    t.mexc_status = if mexc_ok { LegStatus::Open } else { LegStatus::Error };
                    t.status = status;
                    t.executed_at = Some(self.now());
                    t.clone()
                })
        };
        if let Some(t) = &updated {
            if let Err(e) = self.store.save_trade(t).await {
                Self::log_store_failure("update", &e);
            }
        }

        Ok(ExecutionReport {
            local_id: trade.local_id,
            mode,
            gate: LegAck {
                id: gate_id,
                price: plan.gate_price,
            },
            mexc: LegAck {
                id: mexc_id,
                price: plan.mexc_price,
            },
            status,
        })
    }

    /// Cancel both legs, symmetrically and independently: a failure on one
    /// leg is reported but never suppresses the other. A nonzero gate
    /// partial fill captured before the cancel is folded into the position
    /// under the usual settlement-once guard.
    pub async fn cancel_trade(&self, local_id: &str) -> Result<CancelReport, OpError> {
        let trade = {
            let state = self.state.lock().await;
            state
                .history
                .iter()
                .find(|t| t.local_id == local_id)
                .cloned()
                .ok_or_else(|| OpError::UnknownTrade(local_id.to_string()))?
        };
        let symbol = trade.symbol.clone();

        let mut gate_out = CancelLegOutcome::skipped();
        let mut captured_qty = 0.0;
        let mut captured_price = trade.price_used_gate;
        if let Some(gate_id) = &trade.gate_order_id {
            gate_out.attempted = true;
            match self.spot.cancel_order(&symbol, gate_id).await {
                Ok(()) => {
                    gate_out.ok = true;
                    match self.spot.order_detail(&symbol, gate_id).await {
                        Ok(detail) => {
                            captured_qty = detail.filled_amount.max(0.0);
                            if detail.avg_deal_price > 0.0 {
                                captured_price = detail.avg_deal_price;
                            }
                        }
                        Err(e) => {
                            eprintln!("[CANCEL] gate fill lookup failed for {}: {}", gate_id, e)
                        }
                    }
                }
                Err(e) => {
                    eprintln!("[CANCEL] gate cancel failed for {}: {}", gate_id, e);
                    gate_out.error = Some(e.to_string());
                }
            }
        }

        let mut mexc_out = CancelLegOutcome::skipped();
        if let Some(mexc_id) = &trade.mexc_order_id {
            mexc_out.attempted = true;
            match self.futures.cancel_order(&symbol, mexc_id).await {
                Ok(()) => mexc_out.ok = true,
                Err(e) => {
                    eprintln!("[CANCEL] mexc cancel failed for {}: {}", mexc_id, e);
                    mexc_out.error = Some(e.to_string());
                }
            }
        }

        let now = self.now();
        let snapshot = {
            let mut state = self.state.lock().await;
            let Some(idx) = state.history.iter().position(|t| t.local_id == local_id) else {
                return Err(OpError::UnknownTrade(local_id.to_string()));
            };
            let arb = state.history[idx].arb_pct();
            {
                let t = &mut state.history[idx];
                t.status = TradeStatus::Cancelled;
                t.cancelled_at = Some(now);
                if gate_out.ok {
                    t.gate_status = LegStatus::Cancelled;
                }
                if mexc_out.ok {
                    t.mexc_status = LegStatus::Cancelled;
                }
                if (gate_out.attempted && !gate_out.ok) || (mexc_out.attempted && !mexc_out.ok) {
                    t.needs_review = true;
                }
            }
            if captured_qty > 0.0 && !state.history[idx].settlement.is_folded() {
                state
                    .position
                    .accumulate(captured_qty, captured_price, arb, now);
                state.history[idx].settlement = Settlement::Folded {
                    at: now,
                    qty: captured_qty,
                    avg_price: captured_price,
                };
            }
            state.history[idx].clone()
        };
        if let Err(e) = self.store.save_trade(&snapshot).await {
            Self::log_store_failure("cancel", &e);
        }

        Ok(CancelReport {
            local_id: local_id.to_string(),
            status: snapshot.status,
            gate: gate_out,
            mexc: mexc_out,
            captured_fill: captured_qty,
        })
    }
}
