use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::errors::AppError;
use crate::source_models::*;

// ============ Source Slots ============

/// Broad grouping used when presenting results to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceCategory {
    Property,
    Development,
    Environment,
    Energy,
    Mobility,
    Demographics,
    Safety,
    Amenities,
}

impl SourceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceCategory::Property => "property",
            SourceCategory::Development => "development",
            SourceCategory::Environment => "environment",
            SourceCategory::Energy => "energy",
            SourceCategory::Mobility => "mobility",
            SourceCategory::Demographics => "demographics",
            SourceCategory::Safety => "safety",
            SourceCategory::Amenities => "amenities",
        }
    }
}

/// Declares the slot enum, the typed data enum and the record slots from one
/// table so the three can never drift apart.
macro_rules! property_slots {
    ($( $variant:ident => $field:ident: $ty:ty, $key:literal, $category:ident; )*) => {
        /// One named upstream category of the property record.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Slot {
            $( $variant, )*
        }

        impl Slot {
            pub const ALL: &'static [Slot] = &[ $( Slot::$variant, )* ];

            /// JSON key of the slot; also the source name used in
            /// `dataSources`, `errors` and progress events.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( Slot::$variant => $key, )*
                }
            }

            pub fn category(&self) -> SourceCategory {
                match self {
                    $( Slot::$variant => SourceCategory::$category, )*
                }
            }

            pub fn from_name(name: &str) -> Option<Slot> {
                match name {
                    $( $key => Some(Slot::$variant), )*
                    _ => None,
                }
            }
        }

        /// A typed record produced by one adapter.
        #[derive(Debug, Clone, PartialEq)]
        pub enum SourceData {
            $( $variant($ty), )*
        }

        impl SourceData {
            pub fn slot(&self) -> Slot {
                match self {
                    $( SourceData::$variant(_) => Slot::$variant, )*
                }
            }

            /// Serializes the inner record (without the enum tag).
            pub fn to_json(&self) -> Value {
                match self {
                    $( SourceData::$variant(v) => serde_json::to_value(v).unwrap_or(Value::Null), )*
                }
            }

            /// Decodes an upstream JSON document into the record for `slot`.
            pub fn decode(slot: Slot, value: Value) -> Result<SourceData, serde_json::Error> {
                match slot {
                    $( Slot::$variant => serde_json::from_value(value).map(SourceData::$variant), )*
                }
            }
        }

        /// The optional per-source slots of a [`PropertyRecord`].
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub struct SourceSlots {
            $(
                #[serde(default, skip_serializing_if = "Option::is_none")]
                pub $field: Option<$ty>,
            )*
        }

        impl SourceSlots {
            pub fn insert(&mut self, data: SourceData) {
                match data {
                    $( SourceData::$variant(v) => self.$field = Some(v), )*
                }
            }

            pub fn is_populated(&self, slot: Slot) -> bool {
                match slot {
                    $( Slot::$variant => self.$field.is_some(), )*
                }
            }

            pub fn get_json(&self, slot: Slot) -> Option<Value> {
                match slot {
                    $( Slot::$variant => self
                        .$field
                        .as_ref()
                        .map(|v| serde_json::to_value(v).unwrap_or(Value::Null)), )*
                }
            }
        }
    };
}

property_slots! {
    KadasterInfo => kadaster_info: KadasterInfo, "kadasterInfo", Property;
    WozData => woz_data: WozData, "wozData", Property;
    MarketValuation => market_valuation: MarketValuation, "marketValuation", Property;
    TransactionHistory => transaction_history: TransactionHistory, "transactionHistory", Property;
    MonumentStatus => monument_status: MonumentStatus, "monumentStatus", Property;
    Pdok => pdok: PdokBuilding, "pdok", Property;
    Stratopo => stratopo: Stratopo, "stratopo", Property;
    BuildingPermits => building_permits: BuildingPermits, "buildingPermits", Development;
    LandUse => land_use: LandUse, "landUse", Development;
    Weather => weather: Weather, "weather", Environment;
    SoilQuality => soil_quality: SoilQuality, "soilQuality", Environment;
    Subsidence => subsidence: Subsidence, "subsidence", Environment;
    AirQuality => air_quality: AirQuality, "airQuality", Environment;
    NoisePollution => noise_pollution: NoisePollution, "noisePollution", Environment;
    FloodRisk => flood_risk: FloodRisk, "floodRisk", Environment;
    WaterQuality => water_quality: WaterQuality, "waterQuality", Environment;
    Elevation => elevation: Elevation, "elevation", Environment;
    SchipholFlights => schiphol_flights: SchipholFlights, "schipholFlights", Environment;
    Solar => solar: Solar, "solar", Energy;
    EnergyClimate => energy_climate: EnergyClimate, "energyClimate", Energy;
    Sustainability => sustainability: Sustainability, "sustainability", Energy;
    Traffic => traffic: Traffic, "traffic", Mobility;
    PublicTransport => public_transport: PublicTransport, "publicTransport", Mobility;
    Parking => parking: Parking, "parking", Mobility;
    Population => population: Population, "population", Demographics;
    StatLine => stat_line: StatLine, "statLine", Demographics;
    SquareStats => square_stats: SquareStats, "squareStats", Demographics;
    Cbs => cbs: CbsData, "cbs", Demographics;
    Safety => safety: Safety, "safety", Safety;
    GreenSpaces => green_spaces: GreenSpaces, "greenSpaces", Amenities;
    Education => education: Education, "education", Amenities;
    Facilities => facilities: Facilities, "facilities", Amenities;
}

// ============ Address ============

/// WGS84 coordinates in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lon: f64,
    pub lat: f64,
}

/// A normalized postcode / house number pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressQuery {
    pub postcode: String,
    pub house_number: String,
}

fn postcode_regex() -> &'static Regex {
    static POSTCODE: OnceLock<Regex> = OnceLock::new();
    POSTCODE.get_or_init(|| Regex::new(r"^[1-9][0-9]{3}[A-Z]{2}$").expect("valid postcode regex"))
}

/// Uppercases the postcode and strips all whitespace: `" 3541 ed "` → `"3541ED"`.
pub fn normalize_postcode(postcode: &str) -> String {
    postcode
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}

/// Trims surrounding whitespace from a house number.
pub fn normalize_house_number(house_number: &str) -> String {
    house_number.trim().to_string()
}

/// A house number split into its registry parts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HouseNumberParts {
    pub number: String,
    /// Single letter directly after the number: `12a` → `A`.
    pub letter: Option<String>,
    /// Anything after the number and letter: `12-2` → `2`, `12a bis` → `BIS`.
    pub addition: Option<String>,
}

fn is_separator(c: char) -> bool {
    c == '-' || c == '/' || c.is_whitespace()
}

/// Splits `"12a-2"` into number `12`, letter `A` and addition `2`.
pub fn split_house_number(house_number: &str) -> HouseNumberParts {
    let trimmed = house_number.trim();
    let digits = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (number, rest) = trimmed.split_at(digits);
    let rest = rest.trim_start_matches(is_separator);

    let mut chars = rest.chars();
    let (letter, rest) = match (chars.next(), chars.next()) {
        (Some(c), next) if c.is_ascii_alphabetic() && next.map_or(true, is_separator) => {
            (Some(c.to_ascii_uppercase().to_string()), &rest[1..])
        }
        _ => (None, rest),
    };

    let addition = rest.trim_matches(is_separator).to_uppercase();
    HouseNumberParts {
        number: number.to_string(),
        letter,
        addition: (!addition.is_empty()).then_some(addition),
    }
}

impl AddressQuery {
    /// Normalizes without validating.
    pub fn new(postcode: &str, house_number: &str) -> Self {
        Self {
            postcode: normalize_postcode(postcode),
            house_number: normalize_house_number(house_number),
        }
    }

    /// Normalizes and validates a postcode / house number pair.
    pub fn parse(postcode: &str, house_number: &str) -> Result<Self, AppError> {
        let query = Self::new(postcode, house_number);
        if query.postcode.is_empty() || query.house_number.is_empty() {
            return Err(AppError::BadRequest(
                "postcode and houseNumber are required".to_string(),
            ));
        }
        if !postcode_regex().is_match(&query.postcode) {
            return Err(AppError::BadRequest(format!(
                "Invalid postcode: {}",
                query.postcode
            )));
        }
        if !query
            .house_number
            .chars()
            .next()
            .map(|c| c.is_ascii_digit())
            .unwrap_or(false)
        {
            return Err(AppError::BadRequest(format!(
                "Invalid house number: {}",
                query.house_number
            )));
        }
        Ok(query)
    }

    /// Parses free text such as `"1234AB 5"`, `"1234 AB 5"` or `"1234AB+5"`.
    ///
    /// The last token is the house number; everything before it is the postcode.
    pub fn parse_free_text(address: &str) -> Result<Self, AppError> {
        let cleaned = address.replace('+', " ");
        let tokens: Vec<&str> = cleaned.split_whitespace().collect();
        match tokens.split_last() {
            Some((house_number, postcode)) if !postcode.is_empty() => {
                Self::parse(&postcode.join(""), house_number)
            }
            _ => Err(AppError::BadRequest(
                "address must be '<POSTCODE> <HOUSENUMBER>'".to_string(),
            )),
        }
    }
}

/// Output of the resolver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedAddress {
    pub address: String,
    pub postcode: String,
    pub house_number: String,
    pub coordinates: Coordinates,
    pub building_id: String,
    pub municipality_code: String,
    pub neighborhood_code: String,
}

// ============ Property Record ============

/// The aggregated record for one address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyRecord {
    pub address: String,
    pub postcode: String,
    pub house_number: String,
    pub coordinates: Coordinates,
    pub building_id: String,
    #[serde(default)]
    pub municipality_code: String,
    #[serde(default)]
    pub neighborhood_code: String,
    pub aggregated_at: DateTime<Utc>,
    /// Sources that returned usable data, in completion order.
    pub data_sources: Vec<String>,
    /// Source name → error message for attempted sources that failed.
    pub errors: BTreeMap<String, String>,
    #[serde(flatten)]
    pub sources: SourceSlots,
}

impl PropertyRecord {
    pub fn new(resolved: &ResolvedAddress) -> Self {
        Self {
            address: resolved.address.clone(),
            postcode: resolved.postcode.clone(),
            house_number: resolved.house_number.clone(),
            coordinates: resolved.coordinates,
            building_id: resolved.building_id.clone(),
            municipality_code: resolved.municipality_code.clone(),
            neighborhood_code: resolved.neighborhood_code.clone(),
            aggregated_at: Utc::now(),
            data_sources: Vec::new(),
            errors: BTreeMap::new(),
            sources: SourceSlots::default(),
        }
    }

    /// Stores a successful result and records its source exactly once.
    pub fn record_success(&mut self, data: SourceData) {
        let name = data.slot().as_str();
        self.errors.remove(name);
        self.sources.insert(data);
        if !self.data_sources.iter().any(|s| s == name) {
            self.data_sources.push(name.to_string());
        }
    }

    /// Records a failure unless the source already delivered data.
    pub fn record_failure(&mut self, source: &str, error: impl Into<String>) {
        if self.data_sources.iter().any(|s| s == source) {
            return;
        }
        self.errors.insert(source.to_string(), error.into());
    }
}

// ============ Progress Events ============

/// Lifecycle status of one adapter task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProgressStatus {
    Pending,
    Running,
    Success,
    Failure,
    SkippedNoCredential,
    SkippedNoKey,
}

impl ProgressStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProgressStatus::Pending | ProgressStatus::Running)
    }

    /// Position in the lifecycle; events for one source never decrease.
    pub fn rank(&self) -> u8 {
        match self {
            ProgressStatus::Pending => 0,
            ProgressStatus::Running => 1,
            _ => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub source: String,
    pub status: ProgressStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(source: impl Into<String>, status: ProgressStatus) -> Self {
        Self {
            source: source.into(),
            status,
            data: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn success(source: impl Into<String>, data: Value) -> Self {
        Self {
            data: Some(data),
            ..Self::new(source, ProgressStatus::Success)
        }
    }

    pub fn failure(source: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(source, ProgressStatus::Failure)
        }
    }
}

// ============ Request Parameters ============

/// Query parameters of the `/api/property*` endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyQueryParams {
    pub postcode: Option<String>,
    pub house_number: Option<String>,
}

impl PropertyQueryParams {
    pub fn to_query(&self) -> Result<AddressQuery, AppError> {
        AddressQuery::parse(
            self.postcode.as_deref().unwrap_or_default(),
            self.house_number.as_deref().unwrap_or_default(),
        )
    }
}

/// Query parameters of `/api/search/stream`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamQueryParams {
    pub postcode: Option<String>,
    pub house_number: Option<String>,
    pub bypass_cache: Option<String>,
    /// JSON object mapping credential or adapter name to an API key.
    pub api_keys: Option<String>,
    pub admin_secret: Option<String>,
}

impl StreamQueryParams {
    pub fn wants_bypass(&self) -> bool {
        matches!(
            self.bypass_cache.as_deref().map(str::trim),
            Some("true") | Some("1") | Some("yes")
        )
    }
}

/// Query parameters of the legacy `GET /search`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LegacySearchParams {
    pub address: Option<String>,
}

/// Form body of the legacy `POST /search`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacySearchForm {
    pub postcode: Option<String>,
    pub house_number: Option<String>,
}
