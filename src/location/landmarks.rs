//! Nearby points of interest from an Overpass-compatible service.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::AgentConfig;
use crate::error::{CoreError, Result};
use crate::geo::{round_to, GeoPoint};
use crate::location::lookup::LookupResult;
use crate::logging::structured::LogContext;

/// OSM keys searched, in the priority used to categorise a hit.
pub const LANDMARK_CATEGORIES: &[&str] = &[
    "amenity", "building", "shop", "highway", "leisure", "natural", "historic",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LandmarkCategory {
    Amenity,
    Building,
    Shop,
    Highway,
    Leisure,
    Natural,
    Historic,
    Other,
}

impl LandmarkCategory {
    pub fn from_key(key: &str) -> Self {
        match key {
            "amenity" => LandmarkCategory::Amenity,
            "building" => LandmarkCategory::Building,
            "shop" => LandmarkCategory::Shop,
            "highway" => LandmarkCategory::Highway,
            "leisure" => LandmarkCategory::Leisure,
            "natural" => LandmarkCategory::Natural,
            "historic" => LandmarkCategory::Historic,
            _ => LandmarkCategory::Other,
        }
    }
}

/// One named place near a reference point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkHit {
    pub name: String,
    /// Value of the category tag (`school`, `primary`, ...), or `unknown`.
    #[serde(rename = "type")]
    pub kind: String,
    pub category: LandmarkCategory,
    /// Metres from the reference point, one decimal.
    pub distance_m: f64,
    pub latitude: f64,
    pub longitude: f64,
}

/// Named places within `radius_m` of a point, closest first, at most `limit`.
pub trait LandmarkSource: Send + Sync {
    fn nearby(
        &self,
        center: GeoPoint,
        radius_m: u32,
        limit: usize,
        ctx: &LogContext,
    ) -> LookupResult<Vec<LandmarkHit>>;
}

#[derive(Debug, Deserialize)]
pub struct OverpassResponse {
    #[serde(default)]
    pub elements: Vec<OverpassElement>,
}

#[derive(Debug, Deserialize)]
pub struct OverpassElement {
    #[serde(rename = "type")]
    pub element_type: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub center: Option<OverpassCenter>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct OverpassCenter {
    pub lat: f64,
    pub lon: f64,
}

/// Overpass QL for named nodes and ways carrying any landmark category.
pub fn build_overpass_query(center: GeoPoint, radius_m: u32, limit: usize) -> String {
    let around = format!(
        "(around:{},{},{})",
        radius_m, center.latitude, center.longitude
    );
    let mut query = String::from("[out:json][timeout:15];\n(\n");
    for element in ["node", "way"] {
        for key in LANDMARK_CATEGORIES {
            query.push_str(&format!("  {}[\"name\"][\"{}\"]{};\n", element, key, around));
        }
    }
    query.push_str(&format!(");\nout center {};", limit * 2));
    query
}

/// Tag value and category of the highest-priority category key present.
pub fn classify_tags(tags: &HashMap<String, String>) -> (String, LandmarkCategory) {
    LANDMARK_CATEGORIES
        .iter()
        .find_map(|key| {
            tags.get(*key)
                .map(|value| (value.clone(), LandmarkCategory::from_key(key)))
        })
        .unwrap_or_else(|| ("unknown".to_string(), LandmarkCategory::Other))
}

/// Convert elements to hits, dropping unnamed or unlocated ones, then keep
/// the `limit` closest.
pub fn landmarks_from_response(
    response: OverpassResponse,
    center: GeoPoint,
    limit: usize,
) -> Vec<LandmarkHit> {
    let mut hits: Vec<LandmarkHit> = response
        .elements
        .into_iter()
        .filter_map(|element| {
            let name = element.tags.get("name").filter(|n| !n.is_empty())?.clone();
            let (lat, lon) = match element.element_type.as_str() {
                "node" => (element.lat?, element.lon?),
                "way" => {
                    let c = element.center.as_ref()?;
                    (c.lat, c.lon)
                }
                _ => return None,
            };
            let point = GeoPoint::new(lat, lon);
            let (kind, category) = classify_tags(&element.tags);
            Some(LandmarkHit {
                name,
                kind,
                category,
                distance_m: round_to(center.distance_m(&point), 1),
                latitude: lat,
                longitude: lon,
            })
        })
        .collect();

    hits.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));
    hits.truncate(limit);
    hits
}

/// Blocking Overpass client.
pub struct OverpassClient {
    http: reqwest::blocking::Client,
    url: String,
}

impl OverpassClient {
    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.landmark_timeout_secs))
            .build()
            .map_err(|e| CoreError::Config(format!("landmark client: {}", e)))?;

        Ok(Self {
            http,
            url: config.overpass_url.clone(),
        })
    }
}

impl LandmarkSource for OverpassClient {
    fn nearby(
        &self,
        center: GeoPoint,
        radius_m: u32,
        limit: usize,
        ctx: &LogContext,
    ) -> LookupResult<Vec<LandmarkHit>> {
        let query = build_overpass_query(center, radius_m, limit);
        log::debug!(
            "{} LANDMARK_REQUEST lat={:.6} lon={:.6} radius_m={}",
            ctx,
            center.latitude,
            center.longitude,
            radius_m
        );

        let response: OverpassResponse = self
            .http
            .post(&self.url)
            .form(&[("data", query)])
            .send()?
            .error_for_status()?
            .json()?;

        let hits = landmarks_from_response(response, center, limit);
        log::info!("{} LANDMARKS_FOUND count={}", ctx, hits.len());
        Ok(hits)
    }
}
