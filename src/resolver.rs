use crate::adapters::pdok::{AddressLookup, RegionLookup};
use crate::errors::{AdapterError, AppError};
use crate::models::{normalize_postcode, AddressQuery, ResolvedAddress};
use crate::upstream::UpstreamClient;

/// Maps a postcode and house number to a canonical address with coordinates,
/// building id and region codes.
#[derive(Clone)]
pub struct Resolver {
    address_lookup: AddressLookup,
    region_lookup: Option<RegionLookup>,
}

impl Resolver {
    pub fn new(
        client: UpstreamClient,
        address_lookup_url: &str,
        reverse_geocode_url: Option<&str>,
    ) -> Self {
        Self {
            address_lookup: AddressLookup::new(client.clone(), address_lookup_url),
            region_lookup: reverse_geocode_url.map(|url| RegionLookup::new(client, url)),
        }
    }

    /// Resolves `query`; any failure of the address lookup is `AddressNotFound`.
    pub async fn resolve(&self, query: &AddressQuery) -> Result<ResolvedAddress, AppError> {
        let query = AddressQuery::new(&query.postcode, &query.house_number);
        let label = format!("{} {}", query.postcode, query.house_number);

        let found = match self.address_lookup.lookup(&query).await {
            Ok(found) => found,
            Err(AdapterError::NoData) => {
                return Err(AppError::AddressNotFound(format!("No address found for {}", label)))
            }
            Err(e) => {
                tracing::warn!("Address lookup failed for {}: {}", label, e);
                return Err(AppError::AddressNotFound(format!("Could not resolve {}", label)));
            }
        };

        let mut resolved = ResolvedAddress {
            address: found.address,
            postcode: found
                .postcode
                .map(|p| normalize_postcode(&p))
                .unwrap_or(query.postcode),
            // the lookup answers with the bare number; keep letter and addition
            house_number: query.house_number,
            coordinates: found.coordinates,
            building_id: found.building_id,
            municipality_code: found.municipality_code,
            neighborhood_code: String::new(),
        };

        if let Some(region_lookup) = &self.region_lookup {
            match region_lookup.lookup(resolved.coordinates).await {
                Ok(codes) => {
                    if !codes.municipality_code.is_empty() {
                        resolved.municipality_code = codes.municipality_code;
                    }
                    resolved.neighborhood_code = codes.neighborhood_code;
                }
                Err(e) => {
                    tracing::warn!(
                        "Region lookup failed for {}, keeping municipality {}: {}",
                        label,
                        resolved.municipality_code,
                        e
                    );
                }
            }
        }

        tracing::info!(
            "Resolved {} → {} (building {}, {}/{})",
            label,
            resolved.address,
            if resolved.building_id.is_empty() { "-" } else { &resolved.building_id },
            resolved.municipality_code,
            resolved.neighborhood_code
        );

        Ok(resolved)
    }
}
