//! Typed records returned by the upstream adapters.
//!
//! Every record decodes leniently: unknown fields are ignored and missing
//! fields fall back to their defaults, so a partially filled provider response
//! still produces a usable slot.

use serde::{Deserialize, Serialize};

// ============ Property & Cadastral ============

/// Cadastral parcel information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KadasterInfo {
    /// Cadastral parcel identifier.
    pub parcel_id: Option<String>,
    /// Cadastral designation (municipality, section, number).
    pub cadastral_designation: Option<String>,
    /// Plot area in square metres.
    pub plot_area: Option<f64>,
    /// Ownership type (e.g. "Full ownership", "Leasehold").
    pub ownership_type: Option<String>,
}

/// One historical WOZ (municipal valuation) value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WozValue {
    pub year: i32,
    pub value: f64,
}

/// Municipal property valuation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WozData {
    pub woz_value: Option<f64>,
    pub reference_year: Option<i32>,
    pub history: Vec<WozValue>,
}

/// Automated market valuation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MarketValuation {
    pub estimated_value: Option<f64>,
    pub lower_bound: Option<f64>,
    pub upper_bound: Option<f64>,
    pub price_per_m2: Option<f64>,
    /// Market trend for the area: "Increasing", "Stable" or "Decreasing".
    pub trend: Option<String>,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Transaction {
    /// Transaction date, `YYYY-MM-DD`.
    pub date: String,
    pub price: f64,
    pub transaction_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransactionHistory {
    pub transactions: Vec<Transaction>,
}

impl TransactionHistory {
    /// Percentage gain between the earliest and the latest transaction.
    ///
    /// Returns `None` with fewer than two priced transactions.
    pub fn price_gain_percentage(&self) -> Option<f64> {
        let mut priced: Vec<&Transaction> =
            self.transactions.iter().filter(|t| t.price > 0.0).collect();
        if priced.len() < 2 {
            return None;
        }
        // ISO dates sort lexicographically
        priced.sort_by(|a, b| a.date.cmp(&b.date));
        let first = priced.first()?.price;
        let last = priced.last()?.price;
        Some((last - first) / first * 100.0)
    }
}

/// Heritage register entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonumentStatus {
    pub is_monument: bool,
    pub monument_type: Option<String>,
    pub register_number: Option<String>,
}

/// Building register details.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PdokBuilding {
    pub construction_year: Option<i32>,
    pub floor_area: Option<f64>,
    pub building_status: Option<String>,
    pub usage_purpose: Option<String>,
}

/// 3D building model attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Stratopo {
    pub building_height: Option<f64>,
    pub volume: Option<f64>,
    pub roof_type: Option<String>,
}

// ============ Development ============

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildingPermits {
    pub total_permits: u32,
    pub recent_permits: u32,
    /// "Increasing", "Stable" or "Decreasing".
    pub trend: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LandUse {
    pub zoning: Option<String>,
    pub primary_use: Option<String>,
    pub planned_developments: Vec<String>,
}

// ============ Environment ============

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Weather {
    pub temperature: Option<f64>,
    pub precipitation: Option<f64>,
    pub wind_speed: Option<f64>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SoilQuality {
    /// "None", "Light", "Moderate" or "Severe".
    pub contamination_level: Option<String>,
    pub soil_type: Option<String>,
    pub suitable_for: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Subsidence {
    /// Millimetres per year, negative when sinking.
    pub subsidence_rate: Option<f64>,
    /// "Stable", "Low risk", "Medium risk" or "High risk".
    pub stability_rating: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AirQuality {
    pub aqi: Option<f64>,
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
    pub no2: Option<f64>,
    pub quality_label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NoisePollution {
    /// Combined noise level in dB(A).
    pub total_noise: Option<f64>,
    pub road_noise: Option<f64>,
    pub rail_noise: Option<f64>,
    pub aircraft_noise: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FloodRisk {
    /// "Low", "Medium", "High" or "Very High".
    pub risk_level: Option<String>,
    pub water_depth: Option<f64>,
    pub primary_risk: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WaterQuality {
    pub quality_rating: Option<String>,
    pub nitrate: Option<f64>,
    pub ph: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Elevation {
    /// Metres relative to NAP.
    pub elevation: Option<f64>,
    pub terrain: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchipholFlights {
    pub daily_flights: Option<u32>,
    pub nearest_runway_km: Option<f64>,
    pub noise_contour: Option<String>,
}

// ============ Energy ============

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Solar {
    /// Annual solar radiation in kWh/m².
    pub solar_radiation: Option<f64>,
    pub annual_potential_kwh: Option<f64>,
    pub optimal_panels: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnergyClimate {
    /// EPC label, "A++++" through "G".
    pub energy_label: Option<String>,
    pub energy_index: Option<f64>,
    pub label_registered: Option<String>,
    pub heating_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Sustainability {
    pub current_label: Option<String>,
    pub potential_label: Option<String>,
    /// Yearly savings in euros if all measures are applied.
    pub total_cost_savings: Option<f64>,
    pub co2_reduction: Option<f64>,
    pub measures: Vec<String>,
}

// ============ Mobility ============

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Traffic {
    /// "Low", "Medium" or "High".
    pub congestion_level: Option<String>,
    pub average_speed: Option<f64>,
    pub incidents: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransitStop {
    pub name: String,
    pub stop_type: Option<String>,
    pub distance: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PublicTransport {
    pub nearest_stops: Vec<TransitStop>,
    /// Distance to the nearest train station in metres.
    pub nearest_station_distance: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Parking {
    pub total_spaces: Option<u32>,
    pub available_spaces: Option<u32>,
    pub paid_parking: Option<bool>,
}

// ============ Demographics ============

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Population {
    pub total_population: Option<u64>,
    pub households: Option<u64>,
    pub average_age: Option<f64>,
    /// Yearly growth in percent.
    pub growth_rate: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatLine {
    pub average_income: Option<f64>,
    /// Percentage of the working-age population in employment.
    pub employment_rate: Option<f64>,
    pub unemployment_rate: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SquareStats {
    pub population_density: Option<f64>,
    pub average_woz: Option<f64>,
    pub owner_occupied_pct: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CbsData {
    pub average_income: Option<f64>,
    pub employment_rate: Option<f64>,
    pub households_with_children_pct: Option<f64>,
}

// ============ Safety & Amenities ============

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Safety {
    /// 0-100, higher is safer.
    pub safety_score: Option<f64>,
    pub crime_rate: Option<f64>,
    pub burglary_rate: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GreenSpaces {
    pub green_percentage: Option<f64>,
    /// Metres to the nearest park.
    pub nearest_park_distance: Option<f64>,
    pub parks: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct School {
    pub name: String,
    pub school_type: Option<String>,
    pub distance: Option<f64>,
    pub quality: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Education {
    pub schools: Vec<School>,
    /// Average inspection quality on a 0-10 scale.
    pub average_quality: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Facilities {
    /// 0-100, density and variety of nearby amenities.
    pub amenities_score: Option<f64>,
    pub facility_count: Option<u32>,
    pub nearest_supermarket: Option<f64>,
    pub nearest_gp: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_gain_uses_chronological_order() {
        let history = TransactionHistory {
            transactions: vec![
                Transaction {
                    date: "2020-06-01".to_string(),
                    price: 300_000.0,
                    transaction_type: None,
                },
                Transaction {
                    date: "2012-03-15".to_string(),
                    price: 200_000.0,
                    transaction_type: None,
                },
            ],
        };

        let gain = history.price_gain_percentage().unwrap();
        assert!((gain - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_price_gain_needs_two_transactions() {
        let history = TransactionHistory {
            transactions: vec![Transaction {
                date: "2020-06-01".to_string(),
                price: 300_000.0,
                transaction_type: None,
            }],
        };
        assert_eq!(history.price_gain_percentage(), None);
    }

    #[test]
    fn test_lenient_decoding() {
        let soil: SoilQuality = serde_json::from_value(serde_json::json!({
            "contaminationLevel": "Moderate",
            "unrelated": 42
        }))
        .unwrap();
        assert_eq!(soil.contamination_level.as_deref(), Some("Moderate"));
        assert!(soil.suitable_for.is_empty());
    }
}
