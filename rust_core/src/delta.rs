//! Price delta computation against the previously stored price.

use crate::db::PriceStore;
use crate::models::{PriceUpdate, SymbolPair};
use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::Arc;
use tracing::warn;

/// Fractional digits kept for `change_percent`.
pub const CHANGE_PERCENT_DP: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceDelta {
    pub change: Decimal,
    pub change_percent: Decimal,
}

impl PriceDelta {
    pub const ZERO: PriceDelta = PriceDelta {
        change: Decimal::ZERO,
        change_percent: Decimal::ZERO,
    };
}

/// Delta of `price` against `prior`.
///
/// No prior price, or a prior of exactly zero, yields a zero delta.
/// Returns `None` when the change or percentage does not fit in a `Decimal`.
pub fn compute_delta(prior: Option<Decimal>, price: Decimal) -> Option<PriceDelta> {
    let prior = match prior {
        Some(p) if !p.is_zero() => p,
        _ => return Some(PriceDelta::ZERO),
    };

    let change = price.checked_sub(prior)?;
    let change_percent = change
        .checked_div(prior)?
        .checked_mul(Decimal::from(100))?
        .round_dp_with_strategy(CHANGE_PERCENT_DP, RoundingStrategy::MidpointAwayFromZero);

    Some(PriceDelta {
        change,
        change_percent,
    })
}

/// Outcome of the prior-price lookup for one pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorLookup {
    Found,
    /// First observation of the pair
    Missing,
    /// The store could not be read; treated as a missing prior for this cycle
    Failed,
}

pub struct DeltaEngine {
    store: Arc<dyn PriceStore>,
}

impl DeltaEngine {
    pub fn new(store: Arc<dyn PriceStore>) -> Self {
        Self { store }
    }

    /// Read the prior price for `pair` and build the update to stage for
    /// this cycle's batch. Lookup errors never fail the pair; a delta that
    /// overflows does, and yields `None`.
    pub async fn stage(&self, pair: SymbolPair, price: Decimal) -> Option<(PriceUpdate, PriorLookup)> {
        let (prior, lookup) = match self.store.previous_price(&pair).await {
            Ok(Some(p)) => (Some(p), PriorLookup::Found),
            Ok(None) => (None, PriorLookup::Missing),
            Err(e) => {
                warn!("Prior price lookup failed for {}: {:#}", pair, e);
                (None, PriorLookup::Failed)
            }
        };

        let Some(delta) = compute_delta(prior, price) else {
            warn!("Delta of {} against {:?} overflows for {}", price, prior, pair);
            return None;
        };
        let update = PriceUpdate {
            pair,
            price,
            change: delta.change,
            change_percent: delta.change_percent,
        };
        Some((update, lookup))
    }
}
