/// Scoring engine tests
/// Covers label mappings, risk classification, neutral defaults and recommendations
use addressiq_backend::models::{Coordinates, PropertyRecord, ResolvedAddress, SourceData};
use addressiq_backend::scoring::{score, RiskLevel};
use addressiq_backend::source_models::*;

fn empty_record() -> PropertyRecord {
    PropertyRecord::new(&ResolvedAddress {
        address: "Domplein 29, 3512JE Utrecht".to_string(),
        postcode: "3512JE".to_string(),
        house_number: "29".to_string(),
        coordinates: Coordinates {
            lon: 5.1214,
            lat: 52.0907,
        },
        building_id: "0344010000012345".to_string(),
        municipality_code: "GM0344".to_string(),
        neighborhood_code: "BU03440000".to_string(),
    })
}

fn with_label(label: &str) -> PropertyRecord {
    let mut record = empty_record();
    record.record_success(SourceData::EnergyClimate(EnergyClimate {
        energy_label: Some(label.to_string()),
        ..Default::default()
    }));
    record
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 0.01,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn test_energy_label_b_drives_esg() {
    let scores = score(&with_label("B"));

    assert_eq!(scores.breakdown.esg.energy_efficiency, 75.0);
    assert_eq!(scores.breakdown.esg.sustainability, 45.0);
    // 0.20·75 + 0.15·100 + 0.15·0 + 0.15·45 + 0.10·70 + 0.10·70 + 0.10·70 + 0.05·50
    assert_close(scores.esg_score, 60.25);
}

#[test]
fn test_energy_label_c_renovation_roi() {
    let scores = score(&with_label("C"));
    assert_eq!(scores.breakdown.opportunity.renovation_roi, 65.0);
}

#[test]
fn test_label_falls_back_to_sustainability_current_label() {
    let mut record = empty_record();
    record.record_success(SourceData::Sustainability(Sustainability {
        current_label: Some("G".to_string()),
        ..Default::default()
    }));

    let scores = score(&record);
    assert_eq!(scores.breakdown.esg.energy_efficiency, 10.0);
    assert_eq!(scores.breakdown.opportunity.renovation_roi, 90.0);
}

#[test]
fn test_high_risk_classification() {
    let mut record = empty_record();
    record.record_success(SourceData::FloodRisk(FloodRisk {
        risk_level: Some("Very High".to_string()),
        ..Default::default()
    }));
    record.record_success(SourceData::SoilQuality(SoilQuality {
        contamination_level: Some("Severe".to_string()),
        ..Default::default()
    }));
    record.record_success(SourceData::Subsidence(Subsidence {
        stability_rating: Some("High risk".to_string()),
        ..Default::default()
    }));

    let scores = score(&record);
    assert_eq!(scores.risk_level, RiskLevel::VeryHigh);
    assert_eq!(scores.breakdown.esg.flood_risk, 10.0);
    // 100 - 40 (severe soil) - 30 (subsidence)
    assert_eq!(scores.breakdown.esg.environmental_risk, 30.0);

    let json = serde_json::to_value(&scores).unwrap();
    assert_eq!(json["riskLevel"], "Very High");
    assert!(scores
        .recommendations
        .iter()
        .any(|r| r.contains("Flood risk is elevated")));
}

#[test]
fn test_empty_record_uses_neutral_defaults() {
    let scores = score(&empty_record());

    assert_close(scores.esg_score, 53.0);
    assert_close(scores.profit_score, 45.0);
    assert_close(scores.opportunity_score, 47.0);
    assert_close(scores.overall_score, 48.0);
    assert_eq!(scores.risk_level, RiskLevel::Low);
    assert_eq!(scores.breakdown.profit.rental_yield, 0.0);
    assert_eq!(scores.breakdown.opportunity.accessibility, 30.0);

    // energy efficiency 50 < 60 and accessibility 30 < 50
    assert_eq!(scores.recommendations.len(), 2);
}

#[test]
fn test_profit_inputs() {
    let mut record = empty_record();
    record.record_success(SourceData::TransactionHistory(TransactionHistory {
        transactions: vec![
            Transaction {
                date: "2015-01-10".to_string(),
                price: 200_000.0,
                transaction_type: None,
            },
            Transaction {
                date: "2021-09-01".to_string(),
                price: 260_000.0,
                transaction_type: None,
            },
        ],
    }));
    record.record_success(SourceData::MarketValuation(MarketValuation {
        estimated_value: Some(410_000.0),
        trend: Some("Increasing".to_string()),
        ..Default::default()
    }));
    record.record_success(SourceData::Population(Population {
        total_population: Some(25_000),
        ..Default::default()
    }));

    let profit = score(&record).breakdown.profit;
    // 30% gain, doubled
    assert_close(profit.price_appreciation, 60.0);
    assert_eq!(profit.market_demand, 70.0);
    assert_eq!(profit.capital_growth, 80.0);
    assert_eq!(profit.rental_yield, 4.0);
}

#[test]
fn test_monument_lowers_development_potential() {
    let mut record = empty_record();
    record.record_success(SourceData::MonumentStatus(MonumentStatus {
        is_monument: true,
        ..Default::default()
    }));

    let scores = score(&record);
    assert_eq!(scores.breakdown.opportunity.development_potential, 20.0);
}

#[test]
fn test_accessibility_is_capped() {
    let mut record = empty_record();
    record.record_success(SourceData::PublicTransport(PublicTransport {
        nearest_stops: (0..8)
            .map(|i| TransitStop {
                name: format!("Stop {i}"),
                ..Default::default()
            })
            .collect(),
        nearest_station_distance: Some(400.0),
    }));
    record.record_success(SourceData::Parking(Parking {
        available_spaces: Some(12),
        ..Default::default()
    }));

    let scores = score(&record);
    // 30 + min(80, 40) + 20 + 10
    assert_eq!(scores.breakdown.opportunity.accessibility, 100.0);
}

#[test]
fn test_sustainability_savings_recommendation() {
    let mut record = with_label("A");
    record.record_success(SourceData::Sustainability(Sustainability {
        total_cost_savings: Some(1_450.0),
        ..Default::default()
    }));

    let scores = score(&record);
    assert!(scores
        .recommendations
        .iter()
        .any(|r| r.contains("€1450 per year")));
    // A label: no energy-efficiency recommendation
    assert!(!scores
        .recommendations
        .iter()
        .any(|r| r.starts_with("Improve energy efficiency")));
}

#[test]
fn test_partial_record_scores_stay_in_range() {
    let mut record = with_label("E");
    record.record_success(SourceData::AirQuality(AirQuality {
        aqi: Some(180.0),
        ..Default::default()
    }));
    record.record_failure("floodRisk", "upstream status 503");
    record.record_failure("safety", "timeout");
    record.record_failure("education", "circuit open");
    record.record_failure("traffic", "no data");

    assert_eq!(record.data_sources.len(), 2);
    assert_eq!(record.errors.len(), 4);

    let scores = score(&record);
    for value in [
        scores.esg_score,
        scores.profit_score,
        scores.opportunity_score,
        scores.overall_score,
    ] {
        assert!((0.0..=100.0).contains(&value), "{value} out of range");
    }
    assert_eq!(scores.breakdown.esg.air_quality, 0.0);
}
