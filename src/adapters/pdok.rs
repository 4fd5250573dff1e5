//! Resolver sources backed by a Solr-style geocoder (PDOK Locatieserver).

use serde::Deserialize;
use serde_json::Value;

use crate::errors::AdapterError;
use crate::models::{split_house_number, AddressQuery, Coordinates};
use crate::upstream::{AuthStyle, UpstreamClient};

#[derive(Debug, Deserialize)]
struct SolrEnvelope {
    response: SolrDocs,
}

#[derive(Debug, Deserialize)]
struct SolrDocs {
    #[serde(default)]
    docs: Vec<LocationDoc>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LocationDoc {
    weergavenaam: Option<String>,
    centroide_ll: Option<String>,
    adresseerbaarobject_id: Option<String>,
    gemeentecode: Option<String>,
    buurtcode: Option<String>,
    postcode: Option<String>,
}

/// First hit of an address lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct AddressMatch {
    pub address: String,
    pub coordinates: Coordinates,
    pub building_id: String,
    pub municipality_code: String,
    pub postcode: Option<String>,
}

/// Region codes covering a coordinate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionCodes {
    pub municipality_code: String,
    pub neighborhood_code: String,
}

fn first_doc(body: Option<Value>) -> Result<LocationDoc, AdapterError> {
    let body = body.ok_or(AdapterError::NoData)?;
    let envelope: SolrEnvelope =
        serde_json::from_value(body).map_err(|e| AdapterError::Decode(e.to_string()))?;
    envelope.response.docs.into_iter().next().ok_or(AdapterError::NoData)
}

/// `postcode:3512JE and huisnummer:5 and huisletter:A`, with letter and
/// addition only when the house number carries them.
fn solr_query(query: &AddressQuery) -> String {
    let parts = split_house_number(&query.house_number);
    let mut q = format!("postcode:{} and huisnummer:{}", query.postcode, parts.number);
    if let Some(letter) = &parts.letter {
        q.push_str(&format!(" and huisletter:{}", letter));
    }
    if let Some(addition) = &parts.addition {
        q.push_str(&format!(" and huisnummertoevoeging:{}", addition));
    }
    q
}

/// Parses a WKT point, `POINT(<lon> <lat>)`.
pub fn parse_point(wkt: &str) -> Option<Coordinates> {
    let inner = wkt
        .trim()
        .strip_prefix("POINT")?
        .trim()
        .strip_prefix('(')?
        .strip_suffix(')')?;
    let mut parts = inner.split_whitespace();
    let lon = parts.next()?.parse().ok()?;
    let lat = parts.next()?.parse().ok()?;
    Some(Coordinates { lon, lat })
}

fn with_prefix(prefix: &str, code: &str) -> String {
    let code = code.trim();
    if code.is_empty() || code.to_uppercase().starts_with(prefix) {
        code.to_uppercase()
    } else {
        format!("{}{}", prefix, code)
    }
}

/// `0344` → `GM0344`
pub fn normalize_municipality_code(code: &str) -> String {
    with_prefix("GM", code)
}

/// `03440101` → `BU03440101`
pub fn normalize_neighborhood_code(code: &str) -> String {
    with_prefix("BU", code)
}

/// Address → coordinates, building id and municipality.
#[derive(Clone)]
pub struct AddressLookup {
    client: UpstreamClient,
    base_url: String,
}

impl AddressLookup {
    pub fn new(client: UpstreamClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub async fn lookup(&self, query: &AddressQuery) -> Result<AddressMatch, AdapterError> {
        let url = format!("{}/free", self.base_url);
        let params = [
            ("q", solr_query(query)),
            ("fq", "type:adres".to_string()),
            ("rows", "1".to_string()),
        ];

        let doc = first_doc(self.client.get_json(&url, &params, AuthStyle::None, None).await?)?;

        let address = doc
            .weergavenaam
            .filter(|a| !a.trim().is_empty())
            .ok_or(AdapterError::NoData)?;
        let coordinates = doc
            .centroide_ll
            .as_deref()
            .and_then(parse_point)
            .ok_or_else(|| AdapterError::Decode("missing centroide_ll".to_string()))?;

        Ok(AddressMatch {
            address,
            coordinates,
            building_id: doc.adresseerbaarobject_id.unwrap_or_default(),
            municipality_code: normalize_municipality_code(&doc.gemeentecode.unwrap_or_default()),
            postcode: doc.postcode,
        })
    }
}

/// Coordinates → neighborhood and municipality codes.
#[derive(Clone)]
pub struct RegionLookup {
    client: UpstreamClient,
    base_url: String,
}

impl RegionLookup {
    pub fn new(client: UpstreamClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub async fn lookup(&self, coordinates: Coordinates) -> Result<RegionCodes, AdapterError> {
        let url = format!("{}/reverse", self.base_url);
        let params = [
            ("lat", coordinates.lat.to_string()),
            ("lon", coordinates.lon.to_string()),
            ("type", "buurt".to_string()),
            ("rows", "1".to_string()),
        ];

        let doc = first_doc(self.client.get_json(&url, &params, AuthStyle::None, None).await?)?;

        Ok(RegionCodes {
            municipality_code: normalize_municipality_code(&doc.gemeentecode.unwrap_or_default()),
            neighborhood_code: normalize_neighborhood_code(&doc.buurtcode.unwrap_or_default()),
        })
    }
}
