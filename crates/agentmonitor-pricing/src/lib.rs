// Pure pricing: (model, token counts) -> USD. Tables are embedded JSON,
// one file per model family, loaded once and immutable afterwards.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::Deserialize;

/// Per-million-token USD rates for one model.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ModelRates {
    pub input: f64,
    pub output: f64,
    pub cache_read: f64,
    pub cache_write: f64,
}

/// Token counts entering a cost calculation.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenCounts {
    pub input: u64,
    pub output: u64,
    pub cache_read: u64,
    pub cache_write: u64,
}

#[derive(Debug, Deserialize)]
struct FamilyTable {
    family: String,
    #[allow(dead_code)]
    version: String,
    models: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
    #[serde(default)]
    aliases: Vec<String>,
    input: f64,
    output: f64,
    cache_read: f64,
    cache_write: f64,
}

static EMBEDDED_TABLES: &[&str] = &[
    include_str!("../data/anthropic.json"),
    include_str!("../data/openai.json"),
    include_str!("../data/google.json"),
];

static PRICING: Lazy<Pricing> = Lazy::new(Pricing::load_embedded);

/// Loaded pricing tables. Canonical ids and aliases share one flat map.
#[derive(Debug, Default)]
pub struct Pricing {
    rates: HashMap<String, ModelRates>,
    families: Vec<String>,
}

impl Pricing {
    fn load_embedded() -> Self {
        let mut pricing = Pricing::default();
        for raw in EMBEDDED_TABLES {
            // Embedded tables ship with the binary; a parse failure here
            // is a build defect, not a runtime condition.
            let table: FamilyTable =
                serde_json::from_str(raw).expect("embedded pricing table is valid JSON");
            pricing.add_table(table);
        }
        pricing
    }

    fn add_table(&mut self, table: FamilyTable) {
        for model in table.models {
            let rates = ModelRates {
                input: model.input,
                output: model.output,
                cache_read: model.cache_read,
                cache_write: model.cache_write,
            };
            for alias in &model.aliases {
                self.rates.insert(alias.clone(), rates);
            }
            self.rates.insert(model.id, rates);
        }
        self.families.push(table.family);
    }

    /// Process-wide tables, loaded on first use.
    pub fn global() -> &'static Pricing {
        &PRICING
    }

    pub fn families(&self) -> &[String] {
        &self.families
    }

    /// Look up rates for a model id. Provider prefixes are stripped and
    /// dated variants fall back to the longest known prefix.
    pub fn rates_for(&self, model: &str) -> Option<ModelRates> {
        let normalized = normalize_model_id(model);
        if let Some(rates) = self.rates.get(normalized) {
            return Some(*rates);
        }

        // Longest-prefix fallback covers date-stamped releases the
        // tables have not enumerated as aliases.
        self.rates
            .iter()
            .filter(|(id, _)| normalized.starts_with(id.as_str()))
            .max_by_key(|(id, _)| id.len())
            .map(|(_, rates)| *rates)
    }

    /// Compute USD cost, or None when the model is unknown.
    pub fn cost(&self, model: &str, tokens: TokenCounts) -> Option<f64> {
        let rates = self.rates_for(model)?;
        Some(
            tokens.input as f64 * rates.input / 1e6
                + tokens.output as f64 * rates.output / 1e6
                + tokens.cache_read as f64 * rates.cache_read / 1e6
                + tokens.cache_write as f64 * rates.cache_write / 1e6,
        )
    }
}

/// Strip provider routing prefixes (`anthropic/...`, `openai/...`) and
/// surrounding whitespace from a model identifier.
pub fn normalize_model_id(model: &str) -> &str {
    let trimmed = model.trim();
    for prefix in ["anthropic/", "openai/", "google/", "models/"] {
        if let Some(rest) = trimmed.strip_prefix(prefix) {
            return rest;
        }
    }
    trimmed
}
