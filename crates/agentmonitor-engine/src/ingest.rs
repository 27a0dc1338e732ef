//! The ingest pipeline: contract, lifecycle side-effects, cost
//! computation, and persistence in one transaction per call.

use std::sync::Arc;

use agentmonitor_pricing::{Pricing, TokenCounts};
use agentmonitor_store::{Store, queries};
use agentmonitor_types::{EventRecord, FieldError, NormalizedEvent, StreamMessage};
use chrono::{DateTime, Utc};
use rusqlite::Transaction;
use serde::Serialize;
use serde_json::Value;

use crate::contract;
use crate::sessions;
use crate::time::to_canonical;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStatus {
    Created,
    Duplicate,
}

/// Result of one accepted payload, plus the broadcast messages the
/// caller should publish after the transaction commits.
#[derive(Debug)]
pub struct IngestOutcome {
    pub status: IngestStatus,
    pub id: Option<i64>,
    pub messages: Vec<StreamMessage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RejectedItem {
    pub index: usize,
    pub errors: Vec<FieldError>,
}

/// Result of one batch envelope.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub received: u64,
    pub ids: Vec<i64>,
    pub duplicates: u64,
    pub rejected: Vec<RejectedItem>,
    pub messages: Vec<StreamMessage>,
}

#[derive(Clone)]
pub struct Ingestor {
    store: Arc<Store>,
    pricing: &'static Pricing,
    max_payload_bytes: usize,
}

impl Ingestor {
    pub fn new(store: Arc<Store>, pricing: &'static Pricing, max_payload_bytes: usize) -> Self {
        Self {
            store,
            pricing,
            max_payload_bytes,
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Normalize, persist, and stage broadcasts for a single payload.
    pub fn ingest_one(&self, raw: Value) -> Result<IngestOutcome> {
        let mut event = contract::normalize(raw, self.max_payload_bytes)
            .map_err(Error::InvalidPayload)?;
        let now = Utc::now();
        self.fill_cost(&mut event);

        self.store
            .write_tx(|tx| apply_one(tx, &event, now))
            .map_err(Error::from)
    }

    /// Validate every payload independently, then persist the valid
    /// ones in a single transaction. Duplicates and rejections are
    /// counted, never errored.
    pub fn ingest_batch(&self, envelope: Value) -> Result<BatchOutcome> {
        let Value::Object(mut envelope) = envelope else {
            return Err(Error::InvalidEnvelope(
                "batch body must be a JSON object".to_string(),
            ));
        };
        let Some(Value::Array(items)) = envelope.remove("events") else {
            return Err(Error::InvalidEnvelope(
                "missing `events` array".to_string(),
            ));
        };

        let mut accepted: Vec<NormalizedEvent> = Vec::new();
        let mut outcome = BatchOutcome::default();

        for (index, item) in items.into_iter().enumerate() {
            match contract::normalize(item, self.max_payload_bytes) {
                Ok(mut event) => {
                    self.fill_cost(&mut event);
                    accepted.push(event);
                }
                Err(errors) => outcome.rejected.push(RejectedItem { index, errors }),
            }
        }

        let now = Utc::now();
        let results = self.store.write_tx(|tx| {
            let mut results = Vec::with_capacity(accepted.len());
            for event in &accepted {
                results.push(apply_one(tx, event, now)?);
            }
            Ok(results)
        })?;

        for result in results {
            match result.status {
                IngestStatus::Created => {
                    outcome.received += 1;
                    if let Some(id) = result.id {
                        outcome.ids.push(id);
                    }
                    outcome.messages.extend(result.messages);
                }
                IngestStatus::Duplicate => outcome.duplicates += 1,
            }
        }

        Ok(outcome)
    }

    /// Client-provided costs are preserved verbatim; otherwise a cost
    /// is derived when the model is known and tokens were measured.
    fn fill_cost(&self, event: &mut NormalizedEvent) {
        if event.cost_usd.is_some() {
            return;
        }
        let Some(model) = &event.model else {
            return;
        };
        if event.tokens_in == 0 && event.tokens_out == 0 {
            return;
        }
        event.cost_usd = self.pricing.cost(
            model,
            TokenCounts {
                input: event.tokens_in,
                output: event.tokens_out,
                cache_read: event.cache_read_tokens,
                cache_write: event.cache_write_tokens,
            },
        );
    }
}

/// Apply one normalized event inside the writer transaction. Duplicate
/// event_ids short-circuit before any session or agent side-effect.
fn apply_one(
    tx: &Transaction<'_>,
    event: &NormalizedEvent,
    now: DateTime<Utc>,
) -> agentmonitor_store::Result<IngestOutcome> {
    if let Some(event_id) = &event.event_id
        && queries::events::exists_by_event_id(tx, event_id)?
    {
        return Ok(IngestOutcome {
            status: IngestStatus::Duplicate,
            id: None,
            messages: Vec::new(),
        });
    }

    let now_str = to_canonical(now);
    queries::agents::upsert(tx, &event.agent_type, &event.agent_type, &now_str)?;

    let existing = queries::sessions::get_by_id(tx, &event.session_id)?;
    let plan = sessions::apply_event(existing.as_ref(), event, now);
    queries::sessions::upsert(tx, &plan.record)?;

    let Some(id) = queries::events::insert(tx, event, &now_str)? else {
        // The pre-check above makes this unreachable for event_id
        // duplicates within the serialized writer lane; stay defensive.
        return Ok(IngestOutcome {
            status: IngestStatus::Duplicate,
            id: None,
            messages: Vec::new(),
        });
    };

    let record: EventRecord = queries::events::get_by_id(tx, id)?.ok_or_else(|| {
        agentmonitor_store::Error::Query(format!("event {id} vanished inside its own transaction"))
    })?;

    let mut messages = vec![StreamMessage::Event { event: record }];
    if plan.status_changed {
        messages.push(StreamMessage::SessionUpdate {
            session_id: Some(plan.record.id.clone()),
            status: Some(plan.record.status),
            idled: 0,
            ended: 0,
        });
    }

    Ok(IngestOutcome {
        status: IngestStatus::Created,
        id: Some(id),
        messages,
    })
}
