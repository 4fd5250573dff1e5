//! Static catalog of the HTTP-backed sources.
//!
//! A source is enabled by setting `<ENV_PREFIX>_URL`. Credentialed sources
//! additionally need their provider key (`<PROVIDER>_API_KEY`) or a
//! per-request override.

use crate::adapters::Binding;
use crate::cache::{keys, CacheClass};
use crate::models::{ResolvedAddress, Slot, SourceData};
use crate::source_models::{BuildingPermits, MonumentStatus, Subsidence};
use crate::upstream::AuthStyle;

/// A credential shared by one or more sources.
#[derive(Debug)]
pub struct Provider {
    pub name: &'static str,
    pub env_var: &'static str,
    pub auth: AuthStyle,
}

pub const PROVIDERS: &[Provider] = &[
    Provider { name: "altum", env_var: "ALTUM_API_KEY", auth: AuthStyle::Header },
    Provider { name: "kadaster", env_var: "KADASTER_API_KEY", auth: AuthStyle::Header },
    Provider { name: "knmi", env_var: "KNMI_API_KEY", auth: AuthStyle::Header },
    Provider { name: "schiphol", env_var: "SCHIPHOL_API_KEY", auth: AuthStyle::QueryParam },
    Provider { name: "tomtom", env_var: "TOMTOM_API_KEY", auth: AuthStyle::QueryParam },
];

pub fn provider(name: &str) -> Option<&'static Provider> {
    PROVIDERS.iter().find(|p| p.name == name)
}

/// Declaration of one HTTP-backed source.
#[derive(Debug)]
pub struct SourceSpec {
    pub slot: Slot,
    pub env_prefix: &'static str,
    pub binding: Binding,
    /// Provider credential name.
    pub credential: Option<&'static str>,
    pub cache: Option<CacheClass>,
    pub requests_per_second: u32,
    /// Record returned when the upstream answers 404.
    pub soft_default: Option<fn() -> SourceData>,
}

impl SourceSpec {
    pub fn auth(&self) -> AuthStyle {
        self.credential
            .and_then(provider)
            .map(|p| p.auth)
            .unwrap_or(AuthStyle::None)
    }

    /// Cache key for this source at `address`, when the source is cached.
    pub fn cache_key(&self, address: &ResolvedAddress) -> Option<String> {
        self.cache?;
        let (lat, lon) = (address.coordinates.lat, address.coordinates.lon);
        let key = match self.slot {
            Slot::MarketValuation => keys::valuation(&address.building_id),
            Slot::TransactionHistory => keys::transactions(&address.building_id),
            Slot::Weather => keys::weather(lat, lon),
            Slot::AirQuality => keys::air_quality(lat, lon),
            Slot::SoilQuality => keys::soil(lat, lon),
            Slot::Elevation => keys::elevation(lat, lon),
            Slot::Traffic => match self.binding {
                Binding::GeoRadius(radius) => keys::traffic(lat, lon, radius),
                _ => keys::traffic(lat, lon, 0),
            },
            // Only cached under a real neighborhood code so it cannot collide
            // with statLine's municipality entry.
            Slot::Population if !address.neighborhood_code.is_empty() => {
                keys::demographics(&address.neighborhood_code)
            }
            Slot::StatLine => keys::demographics(&address.municipality_code),
            _ => return None,
        };
        Some(key)
    }
}

fn not_a_monument() -> SourceData {
    SourceData::MonumentStatus(MonumentStatus {
        is_monument: false,
        ..Default::default()
    })
}

fn stable_ground() -> SourceData {
    SourceData::Subsidence(Subsidence {
        stability_rating: Some("Stable".to_string()),
        ..Default::default()
    })
}

fn no_permits() -> SourceData {
    SourceData::BuildingPermits(BuildingPermits {
        total_permits: 0,
        recent_permits: 0,
        trend: Some("Stable".to_string()),
    })
}

macro_rules! source {
    ($slot:ident, $prefix:literal, $binding:expr) => {
        source!($slot, $prefix, $binding, None, None, 10, None)
    };
    ($slot:ident, $prefix:literal, $binding:expr, $cred:expr, $cache:expr, $rps:literal, $soft:expr) => {
        SourceSpec {
            slot: Slot::$slot,
            env_prefix: $prefix,
            binding: $binding,
            credential: $cred,
            cache: $cache,
            requests_per_second: $rps,
            soft_default: $soft,
        }
    };
}

#[rustfmt::skip]
pub const SOURCES: &[SourceSpec] = &[
    // property
    source!(KadasterInfo, "KADASTER", Binding::Building, Some("kadaster"), None, 5, None),
    source!(WozData, "WOZ", Binding::Building, Some("altum"), None, 5, None),
    source!(MarketValuation, "MARKET_VALUATION", Binding::Building, Some("altum"), Some(CacheClass::Property), 5, None),
    source!(TransactionHistory, "TRANSACTIONS", Binding::Building, Some("altum"), Some(CacheClass::Transactions), 5, None),
    source!(MonumentStatus, "MONUMENT", Binding::Building, None, None, 10, Some(not_a_monument)),
    source!(Pdok, "PDOK_BUILDING", Binding::Building),
    source!(Stratopo, "STRATOPO", Binding::Building),
    // development
    source!(BuildingPermits, "BUILDING_PERMITS", Binding::GeoRadius(500), None, None, 10, Some(no_permits)),
    source!(LandUse, "LAND_USE", Binding::Geo),
    // environment
    source!(Weather, "WEATHER", Binding::Geo, Some("knmi"), Some(CacheClass::Weather), 10, None),
    source!(SoilQuality, "SOIL", Binding::Geo, None, Some(CacheClass::Static), 10, None),
    source!(Subsidence, "SUBSIDENCE", Binding::Geo, None, None, 10, Some(stable_ground)),
    source!(AirQuality, "AIR_QUALITY", Binding::Geo, None, Some(CacheClass::AirQuality), 10, None),
    source!(NoisePollution, "NOISE", Binding::Geo),
    source!(FloodRisk, "FLOOD_RISK", Binding::Geo),
    source!(WaterQuality, "WATER_QUALITY", Binding::Geo),
    source!(Elevation, "ELEVATION", Binding::Geo, None, Some(CacheClass::Static), 10, None),
    source!(SchipholFlights, "SCHIPHOL", Binding::Geo, Some("schiphol"), None, 2, None),
    // energy
    source!(Solar, "SOLAR", Binding::Geo),
    source!(EnergyClimate, "ENERGY_LABEL", Binding::Address, Some("altum"), None, 5, None),
    source!(Sustainability, "SUSTAINABILITY", Binding::Address, Some("altum"), None, 5, None),
    // mobility
    source!(Traffic, "TRAFFIC", Binding::GeoRadius(1000), Some("tomtom"), Some(CacheClass::Traffic), 5, None),
    source!(PublicTransport, "PUBLIC_TRANSPORT", Binding::GeoRadius(1000)),
    source!(Parking, "PARKING", Binding::GeoRadius(500)),
    // demographics
    source!(Population, "POPULATION", Binding::Neighborhood, None, Some(CacheClass::Demographics), 10, None),
    source!(StatLine, "STATLINE", Binding::Municipality, None, Some(CacheClass::Demographics), 10, None),
    source!(SquareStats, "SQUARE_STATS", Binding::Geo),
    source!(Cbs, "CBS", Binding::Neighborhood),
    // safety
    source!(Safety, "SAFETY", Binding::Neighborhood),
    // amenities
    source!(GreenSpaces, "GREEN_SPACES", Binding::GeoRadius(1000)),
    source!(Education, "EDUCATION", Binding::GeoRadius(2000)),
    source!(Facilities, "FACILITIES", Binding::GeoRadius(1000)),
];

pub fn spec_for(slot: Slot) -> Option<&'static SourceSpec> {
    SOURCES.iter().find(|s| s.slot == slot)
}
