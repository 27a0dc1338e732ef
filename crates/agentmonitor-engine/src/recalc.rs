//! Batch cost recalculation: rewrite cost_usd across historical rows
//! from the current pricing tables. The only permitted mutation of
//! persisted events.

use agentmonitor_pricing::{Pricing, TokenCounts};
use agentmonitor_store::{Store, queries};

use crate::Result;

/// Walk every event carrying a model and recompute its cost inside one
/// transaction. Returns the number of rows rewritten. Unknown models
/// get a null cost rather than a stale one.
pub fn recalculate_costs(store: &Store, pricing: &Pricing) -> Result<u64> {
    let updated = store.write_tx(|tx| {
        let rows = queries::events::list_costed_rows(tx)?;
        let mut updated = 0u64;
        for row in rows {
            let cost = pricing.cost(
                &row.model,
                TokenCounts {
                    input: row.tokens_in,
                    output: row.tokens_out,
                    cache_read: row.cache_read_tokens,
                    cache_write: row.cache_write_tokens,
                },
            );
            if queries::events::update_cost(tx, row.id, cost)? {
                updated += 1;
            }
        }
        Ok(updated)
    })?;
    Ok(updated)
}
