use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::models::{Coordinates, PropertyRecord, Slot};
use crate::scoring::PropertyScores;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseSummary {
    pub scores: PropertyScores,
}

/// Client-facing aggregate: the record with its slots grouped by category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComprehensiveSearchResponse {
    pub address: String,
    pub postcode: String,
    pub house_number: String,
    pub coordinates: Coordinates,
    pub building_id: String,
    pub aggregated_at: DateTime<Utc>,
    pub data_sources: Vec<String>,
    pub errors: BTreeMap<String, String>,
    /// category → slot → data
    pub api_results: BTreeMap<String, BTreeMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<ResponseSummary>,
}

impl ComprehensiveSearchResponse {
    pub fn build(record: &PropertyRecord, scores: Option<PropertyScores>) -> Self {
        let mut api_results: BTreeMap<String, BTreeMap<String, Value>> = BTreeMap::new();
        for slot in Slot::ALL {
            if let Some(data) = record.sources.get_json(*slot) {
                api_results
                    .entry(slot.category().as_str().to_string())
                    .or_default()
                    .insert(slot.as_str().to_string(), data);
            }
        }

        Self {
            address: record.address.clone(),
            postcode: record.postcode.clone(),
            house_number: record.house_number.clone(),
            coordinates: record.coordinates,
            building_id: record.building_id.clone(),
            aggregated_at: record.aggregated_at,
            data_sources: record.data_sources.clone(),
            errors: record.errors.clone(),
            api_results,
            summary: scores.map(|scores| ResponseSummary { scores }),
        }
    }
}
