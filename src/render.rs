//! Server-rendered HTML fragments.

use crate::models::PropertyRecord;
use crate::scoring::PropertyScores;

/// Embedded responses larger than this are left out of the legacy fragment.
pub const MAX_EMBEDDED_RESPONSE: usize = 2 * 1024 * 1024;

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Single-line header shown above the results.
pub fn header_fragment(record: &PropertyRecord, scores: &PropertyScores) -> String {
    let risk = scores.risk_level.as_str();
    format!(
        concat!(
            r#"<div class="property-header">"#,
            r#"<h2 class="property-address">{address}</h2>"#,
            r#"<span class="property-coordinates">{lat:.5}, {lon:.5}</span>"#,
            r#"<span class="risk-level risk-{risk_class}">Risk: {risk}</span>"#,
            r#"<span class="overall-score">Overall score: {overall:.0}/100</span>"#,
            r#"<span class="source-count">{sources} sources</span>"#,
            "</div>"
        ),
        address = escape_html(&record.address),
        lat = record.coordinates.lat,
        lon = record.coordinates.lon,
        risk_class = escape_html(&risk.to_lowercase().replace(' ', "-")),
        risk = escape_html(risk),
        overall = scores.overall_score,
        sources = record.data_sources.len(),
    )
}

/// Legacy `/search` fragment embedding the full JSON response.
pub fn legacy_fragment(response_json: &str) -> String {
    if response_json.len() > MAX_EMBEDDED_RESPONSE {
        tracing::warn!(
            "Search response of {} bytes too large to embed",
            response_json.len()
        );
        return r#"<div id="search-results" data-truncated="true"></div>"#.to_string();
    }
    format!(
        r#"<div id="search-results" data-response="{}"></div>"#,
        escape_html(response_json)
    )
}
