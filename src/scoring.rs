//! Scoring engine: ESG, Profit and Opportunity composites on a 0-100 scale,
//! an Overall score, a risk classification and recommendations.
//!
//! Pure and total: every component has a neutral default for missing inputs.

use serde::{Deserialize, Serialize};

use crate::models::PropertyRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    #[serde(rename = "Very High")]
    VeryHigh,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
            RiskLevel::VeryHigh => "Very High",
        }
    }

    pub fn from_points(points: u32) -> Self {
        match points {
            p if p >= 6 => RiskLevel::VeryHigh,
            p if p >= 4 => RiskLevel::High,
            p if p >= 2 => RiskLevel::Medium,
            _ => RiskLevel::Low,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EsgBreakdown {
    pub energy_efficiency: f64,
    pub environmental_risk: f64,
    pub social_livability: f64,
    pub sustainability: f64,
    pub flood_risk: f64,
    pub air_quality: f64,
    pub noise_level: f64,
    pub green_space_access: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfitBreakdown {
    pub price_appreciation: f64,
    pub market_demand: f64,
    pub liquidity_score: f64,
    pub capital_growth: f64,
    /// Percent, not a 0-100 score.
    pub rental_yield: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpportunityBreakdown {
    pub development_potential: f64,
    #[serde(rename = "renovationROI")]
    pub renovation_roi: f64,
    #[serde(rename = "energyUpgradeROI")]
    pub energy_upgrade_roi: f64,
    pub neighborhood_growth: f64,
    pub accessibility: f64,
    pub amenities_score: f64,
    pub future_development: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub esg: EsgBreakdown,
    pub profit: ProfitBreakdown,
    pub opportunity: OpportunityBreakdown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyScores {
    pub esg_score: f64,
    pub profit_score: f64,
    pub opportunity_score: f64,
    pub overall_score: f64,
    pub risk_level: RiskLevel,
    pub breakdown: ScoreBreakdown,
    pub recommendations: Vec<String>,
}

fn clamp(score: f64) -> f64 {
    if score.is_nan() {
        return 0.0;
    }
    score.clamp(0.0, 100.0)
}

fn is(value: Option<&str>, expected: &str) -> bool {
    value
        .map(|v| v.trim().eq_ignore_ascii_case(expected))
        .unwrap_or(false)
}

fn normalize_label(label: &str) -> String {
    label.trim().to_uppercase()
}

/// EPC label → energy efficiency score.
pub fn energy_label_score(label: Option<&str>) -> f64 {
    let Some(label) = label.map(normalize_label) else {
        return 50.0;
    };
    if label.starts_with("A+") {
        return 95.0;
    }
    match label.as_str() {
        "A" => 85.0,
        "B" => 75.0,
        "C" => 60.0,
        "D" => 45.0,
        "E" => 30.0,
        "F" => 20.0,
        "G" => 10.0,
        _ => 50.0,
    }
}

/// EPC label → expected return of a renovation; worse labels gain more.
pub fn renovation_roi(label: Option<&str>) -> f64 {
    let Some(label) = label.map(normalize_label) else {
        return 50.0;
    };
    if label.starts_with("A+") {
        return 20.0;
    }
    match label.as_str() {
        "A" => 30.0,
        "B" => 45.0,
        "C" => 65.0,
        "D" => 75.0,
        "E" => 80.0,
        "F" => 85.0,
        "G" => 90.0,
        _ => 50.0,
    }
}

/// Shared inputs read from several components.
struct Inputs<'a> {
    record: &'a PropertyRecord,
    energy_label: Option<&'a str>,
    permits_trend: Option<&'a str>,
    amenities: Option<f64>,
    average_income: Option<f64>,
    employment_rate: Option<f64>,
}

impl<'a> Inputs<'a> {
    fn new(record: &'a PropertyRecord) -> Self {
        let s = &record.sources;
        Self {
            record,
            energy_label: s
                .energy_climate
                .as_ref()
                .and_then(|e| e.energy_label.as_deref())
                .or_else(|| s.sustainability.as_ref().and_then(|e| e.current_label.as_deref())),
            permits_trend: s.building_permits.as_ref().and_then(|p| p.trend.as_deref()),
            amenities: s.facilities.as_ref().and_then(|f| f.amenities_score),
            average_income: s
                .cbs
                .as_ref()
                .and_then(|c| c.average_income)
                .or_else(|| s.stat_line.as_ref().and_then(|c| c.average_income)),
            employment_rate: s
                .cbs
                .as_ref()
                .and_then(|c| c.employment_rate)
                .or_else(|| s.stat_line.as_ref().and_then(|c| c.employment_rate)),
        }
    }

    fn flood_level(&self) -> Option<&'a str> {
        self.record
            .sources
            .flood_risk
            .as_ref()
            .and_then(|f| f.risk_level.as_deref())
    }
}

fn esg_breakdown(inputs: &Inputs) -> EsgBreakdown {
    let s = &inputs.record.sources;
    let energy_efficiency = energy_label_score(inputs.energy_label);

    let mut environmental_risk = 100.0;
    let contamination = s.soil_quality.as_ref().and_then(|q| q.contamination_level.as_deref());
    if is(contamination, "Severe") {
        environmental_risk -= 40.0;
    } else if is(contamination, "Moderate") {
        environmental_risk -= 20.0;
    }
    if is(s.subsidence.as_ref().and_then(|q| q.stability_rating.as_deref()), "High risk") {
        environmental_risk -= 30.0;
    }

    let safety = s.safety.as_ref().and_then(|x| x.safety_score).unwrap_or(0.0);
    let education = s.education.as_ref().and_then(|x| x.average_quality).unwrap_or(0.0);
    let social_livability =
        0.4 * safety + 0.3 * inputs.amenities.unwrap_or(0.0) + 3.0 * education;

    let solar_term = s
        .solar
        .as_ref()
        .and_then(|x| x.solar_radiation)
        .map(|radiation| (radiation / 600.0 * 100.0).min(100.0))
        .unwrap_or(0.0);
    let sustainability = 0.6 * energy_efficiency + 0.4 * solar_term;

    let flood_risk = match inputs.flood_level() {
        l if is(l, "Low") => 90.0,
        l if is(l, "Medium") => 60.0,
        l if is(l, "High") => 30.0,
        l if is(l, "Very High") => 10.0,
        _ => 70.0,
    };

    let air_quality = s
        .air_quality
        .as_ref()
        .and_then(|x| x.aqi)
        .map(|aqi| (100.0 - 0.8 * aqi).max(0.0))
        .unwrap_or(70.0);

    let noise_level = match s.noise_pollution.as_ref().and_then(|x| x.total_noise) {
        Some(db) if db < 50.0 => 100.0,
        Some(db) if db < 55.0 => 80.0,
        Some(db) if db < 60.0 => 60.0,
        Some(db) if db < 65.0 => 40.0,
        Some(_) => 20.0,
        None => 70.0,
    };

    let green_space_access = match s.green_spaces.as_ref() {
        Some(green) => match green.green_percentage {
            Some(pct) => {
                let near_park = green.nearest_park_distance.map(|d| d < 500.0).unwrap_or(false);
                pct + if near_park { 20.0 } else { 0.0 }
            }
            None => 50.0,
        },
        None => 50.0,
    };

    EsgBreakdown {
        energy_efficiency: clamp(energy_efficiency),
        environmental_risk: clamp(environmental_risk),
        social_livability: clamp(social_livability),
        sustainability: clamp(sustainability),
        flood_risk,
        air_quality: clamp(air_quality),
        noise_level,
        green_space_access: clamp(green_space_access),
    }
}

fn esg_score(b: &EsgBreakdown) -> f64 {
    clamp(
        0.20 * b.energy_efficiency
            + 0.15 * b.environmental_risk
            + 0.15 * b.social_livability
            + 0.15 * b.sustainability
            + 0.10 * b.flood_risk
            + 0.10 * b.air_quality
            + 0.10 * b.noise_level
            + 0.05 * b.green_space_access,
    )
}

fn profit_breakdown(inputs: &Inputs) -> ProfitBreakdown {
    let s = &inputs.record.sources;

    let price_appreciation = s
        .transaction_history
        .as_ref()
        .and_then(|t| t.price_gain_percentage())
        .map(|gain| (2.0 * gain).min(100.0))
        .unwrap_or(50.0);

    let mut market_demand = 50.0;
    if s.population
        .as_ref()
        .and_then(|p| p.total_population)
        .map(|n| n > 10_000)
        .unwrap_or(false)
    {
        market_demand += 20.0;
    }
    if is(inputs.permits_trend, "Increasing") {
        market_demand += 20.0;
    }
    if inputs.employment_rate.map(|r| r > 75.0).unwrap_or(false) {
        market_demand += 10.0;
    }

    let mut liquidity_score = 50.0;
    let stops = s
        .public_transport
        .as_ref()
        .map(|p| p.nearest_stops.len())
        .unwrap_or(0);
    if stops >= 3 {
        liquidity_score += 15.0;
    }
    if inputs.amenities.map(|a| a > 70.0).unwrap_or(false) {
        liquidity_score += 20.0;
    }
    if inputs.average_income.map(|i| i > 40_000.0).unwrap_or(false) {
        liquidity_score += 15.0;
    }

    let trend = s.market_valuation.as_ref().and_then(|m| m.trend.as_deref());
    let capital_growth = match trend {
        t if is(t, "Increasing") => 80.0,
        t if is(t, "Stable") => 60.0,
        t if is(t, "Decreasing") => 30.0,
        _ => 50.0,
    };

    let rental_yield = if s
        .market_valuation
        .as_ref()
        .and_then(|m| m.estimated_value)
        .is_some()
    {
        4.0
    } else {
        0.0
    };

    ProfitBreakdown {
        price_appreciation: clamp(price_appreciation),
        market_demand: clamp(market_demand),
        liquidity_score: clamp(liquidity_score),
        capital_growth,
        rental_yield,
    }
}

fn profit_score(b: &ProfitBreakdown) -> f64 {
    clamp(
        0.25 * b.price_appreciation
            + 0.25 * b.market_demand
            + 0.20 * b.liquidity_score
            + 0.20 * b.capital_growth
            + 0.10 * clamp(10.0 * b.rental_yield),
    )
}

fn opportunity_breakdown(inputs: &Inputs, energy_efficiency: f64) -> OpportunityBreakdown {
    let s = &inputs.record.sources;
    let increasing = is(inputs.permits_trend, "Increasing");
    let decreasing = is(inputs.permits_trend, "Decreasing");

    let mut development_potential = 50.0;
    if s.kadaster_info
        .as_ref()
        .and_then(|k| k.plot_area)
        .map(|area| area > 500.0)
        .unwrap_or(false)
    {
        development_potential += 15.0;
    }
    let zoning = s.land_use.as_ref().and_then(|l| l.zoning.as_deref());
    if is(zoning, "Residential") || is(zoning, "Mixed") {
        development_potential += 15.0;
    }
    if increasing {
        development_potential += 10.0;
    }
    if s.monument_status.as_ref().map(|m| m.is_monument).unwrap_or(false) {
        development_potential -= 30.0;
    }

    let savings = s
        .sustainability
        .as_ref()
        .and_then(|x| x.total_cost_savings)
        .unwrap_or(0.0);
    let energy_upgrade_roi = 100.0 - energy_efficiency + (savings / 100.0).clamp(0.0, 20.0);

    let mut neighborhood_growth = 50.0;
    if increasing {
        neighborhood_growth += 20.0;
    } else if decreasing {
        neighborhood_growth -= 20.0;
    }
    match s.population.as_ref().and_then(|p| p.growth_rate) {
        Some(rate) if rate > 1.0 => neighborhood_growth += 15.0,
        Some(rate) if rate < 0.0 => neighborhood_growth -= 10.0,
        _ => {}
    }
    if inputs.average_income.map(|i| i > 40_000.0).unwrap_or(false) {
        neighborhood_growth += 15.0;
    }

    let mut accessibility = 30.0;
    if let Some(transport) = s.public_transport.as_ref() {
        accessibility += (10.0 * transport.nearest_stops.len() as f64).min(40.0);
        if transport
            .nearest_station_distance
            .map(|d| d < 1_000.0)
            .unwrap_or(false)
        {
            accessibility += 20.0;
        }
    }
    if s.parking
        .as_ref()
        .and_then(|p| p.available_spaces)
        .map(|n| n > 0)
        .unwrap_or(false)
    {
        accessibility += 10.0;
    }
    if is(s.traffic.as_ref().and_then(|t| t.congestion_level.as_deref()), "High") {
        accessibility -= 10.0;
    }

    let mut future_development = 50.0;
    if increasing {
        future_development += 25.0;
    } else if decreasing {
        future_development -= 25.0;
    }
    if s.land_use
        .as_ref()
        .map(|l| !l.planned_developments.is_empty())
        .unwrap_or(false)
    {
        future_development += 15.0;
    }

    OpportunityBreakdown {
        development_potential: clamp(development_potential),
        renovation_roi: renovation_roi(inputs.energy_label),
        energy_upgrade_roi: clamp(energy_upgrade_roi),
        neighborhood_growth: clamp(neighborhood_growth),
        accessibility: clamp(accessibility),
        amenities_score: clamp(inputs.amenities.unwrap_or(50.0)),
        future_development: clamp(future_development),
    }
}

fn opportunity_score(b: &OpportunityBreakdown) -> f64 {
    clamp(
        0.20 * b.development_potential
            + 0.15 * b.renovation_roi
            + 0.15 * b.energy_upgrade_roi
            + 0.15 * b.neighborhood_growth
            + 0.15 * b.accessibility
            + 0.10 * b.amenities_score
            + 0.10 * b.future_development,
    )
}

/// Risk points summed over flood, subsidence, soil, safety and permits.
pub fn risk_points(record: &PropertyRecord) -> u32 {
    let s = &record.sources;
    let mut points = 0;

    let flood = s.flood_risk.as_ref().and_then(|f| f.risk_level.as_deref());
    if is(flood, "High") || is(flood, "Very High") {
        points += 3;
    } else if is(flood, "Medium") {
        points += 1;
    }
    if is(s.subsidence.as_ref().and_then(|x| x.stability_rating.as_deref()), "High risk") {
        points += 2;
    }
    let soil = s.soil_quality.as_ref().and_then(|x| x.contamination_level.as_deref());
    if is(soil, "Severe") {
        points += 3;
    } else if is(soil, "Moderate") {
        points += 1;
    }
    if s.safety
        .as_ref()
        .and_then(|x| x.safety_score)
        .map(|score| score < 40.0)
        .unwrap_or(false)
    {
        points += 2;
    }
    if is(s.building_permits.as_ref().and_then(|p| p.trend.as_deref()), "Decreasing") {
        points += 1;
    }
    points
}

fn recommendations(inputs: &Inputs, breakdown: &ScoreBreakdown, profit: f64) -> Vec<String> {
    let s = &inputs.record.sources;
    let mut out = Vec::new();

    if breakdown.esg.energy_efficiency < 60.0 {
        out.push(
            "Improve energy efficiency with insulation upgrades or solar panels \
             to raise the energy label."
                .to_string(),
        );
    }
    if let Some(savings) = s
        .sustainability
        .as_ref()
        .and_then(|x| x.total_cost_savings)
        .filter(|v| *v > 1_000.0)
    {
        out.push(format!(
            "Recommended sustainability measures could save €{:.0} per year.",
            savings
        ));
    }
    let flood = inputs.flood_level();
    if is(flood, "High") || is(flood, "Very High") {
        out.push(
            "Flood risk is elevated: consider flood insurance and \
             water-resistant building measures."
                .to_string(),
        );
    }
    if breakdown.opportunity.development_potential > 70.0 {
        out.push(
            "Check local zoning plans: the plot shows strong development potential.".to_string(),
        );
    }
    if profit > 75.0 {
        out.push("Strong market fundamentals support this property as an investment.".to_string());
    }
    if profit < 40.0 {
        out.push(
            "Weak market indicators: negotiate on price or plan for a longer holding period."
                .to_string(),
        );
    }
    if breakdown.opportunity.accessibility < 50.0 {
        out.push("Limited public transport accessibility may reduce rental demand.".to_string());
    }
    if breakdown.opportunity.renovation_roi > 70.0 {
        out.push(
            "Renovating to a better energy label offers a high return on investment.".to_string(),
        );
    }

    out
}

/// Scores an aggregated record.
pub fn score(record: &PropertyRecord) -> PropertyScores {
    let inputs = Inputs::new(record);

    let esg = esg_breakdown(&inputs);
    let profit = profit_breakdown(&inputs);
    let opportunity = opportunity_breakdown(&inputs, esg.energy_efficiency);

    let esg_score = esg_score(&esg);
    let profit_score = profit_score(&profit);
    let opportunity_score = opportunity_score(&opportunity);
    let overall_score = clamp(0.3 * esg_score + 0.4 * profit_score + 0.3 * opportunity_score);

    let breakdown = ScoreBreakdown {
        esg,
        profit,
        opportunity,
    };
    let recommendations = recommendations(&inputs, &breakdown, profit_score);

    PropertyScores {
        esg_score,
        profit_score,
        opportunity_score,
        overall_score,
        risk_level: RiskLevel::from_points(risk_points(record)),
        breakdown,
        recommendations,
    }
}
