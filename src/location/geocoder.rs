//! Reverse geocoding against a Nominatim-compatible service.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::AgentConfig;
use crate::error::{CoreError, Result};
use crate::geo::GeoPoint;
use crate::location::lookup::{LookupFailure, LookupResult};
use crate::location::throttle::RateLimiter;
use crate::logging::structured::LogContext;

/// Street-level detail.
const NOMINATIM_ZOOM: &str = "18";

/// Structured address for one coordinate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub display_name: String,
    pub road: String,
    pub suburb: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub postcode: String,
}

impl Address {
    /// Road, then suburb (or city), then state. Falls back to the display
    /// name when none of those are known.
    pub fn short(&self) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(3);
        if !self.road.is_empty() {
            parts.push(&self.road);
        }
        if !self.suburb.is_empty() {
            parts.push(&self.suburb);
        } else if !self.city.is_empty() {
            parts.push(&self.city);
        }
        if !self.state.is_empty() {
            parts.push(&self.state);
        }

        if parts.is_empty() {
            self.display_name.clone()
        } else {
            parts.join(", ")
        }
    }
}

/// Raw `/reverse?format=json&addressdetails=1` payload.
#[derive(Debug, Deserialize)]
pub struct NominatimResponse {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub address: HashMap<String, String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl NominatimResponse {
    pub fn into_address(self) -> LookupResult<Address> {
        if let Some(error) = self.error {
            return Err(LookupFailure::NoResult(error));
        }

        let pick = |keys: &[&str]| -> String {
            keys.iter()
                .find_map(|k| self.address.get(*k).filter(|v| !v.is_empty()))
                .cloned()
                .unwrap_or_default()
        };

        Ok(Address {
            display_name: self
                .display_name
                .clone()
                .unwrap_or_else(|| "Unknown location".to_string()),
            road: pick(&["road", "highway"]),
            suburb: pick(&["suburb", "neighbourhood"]),
            city: pick(&["city", "town", "village"]),
            state: pick(&["state", "province"]),
            country: pick(&["country"]),
            postcode: pick(&["postcode"]),
        })
    }
}

/// Coordinate → address lookup.
pub trait ReverseGeocoder: Send + Sync {
    fn reverse(&self, point: GeoPoint, ctx: &LogContext) -> LookupResult<Address>;
}

/// Blocking Nominatim client. Calls are spaced by a shared `RateLimiter`.
pub struct NominatimClient {
    http: reqwest::blocking::Client,
    url: String,
    limiter: Arc<RateLimiter>,
}

impl NominatimClient {
    pub fn new(config: &AgentConfig, limiter: Arc<RateLimiter>) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.geocoding_timeout_secs))
            .build()
            .map_err(|e| CoreError::Config(format!("geocoding client: {}", e)))?;

        Ok(Self {
            http,
            url: config.nominatim_url.clone(),
            limiter,
        })
    }

    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(
            config.geocoding_delay_ms,
        )));
        Self::new(config, limiter)
    }
}

impl ReverseGeocoder for NominatimClient {
    fn reverse(&self, point: GeoPoint, ctx: &LogContext) -> LookupResult<Address> {
        if !point.is_valid() {
            return Err(LookupFailure::NoResult(format!(
                "invalid coordinates ({}, {})",
                point.latitude, point.longitude
            )));
        }

        let waited = self.limiter.acquire();
        log::debug!(
            "{} GEOCODE_REQUEST lat={:.6} lon={:.6} throttled_ms={}",
            ctx,
            point.latitude,
            point.longitude,
            waited.as_millis()
        );

        let response = self
            .http
            .get(&self.url)
            .query(&[
                ("lat", point.latitude.to_string()),
                ("lon", point.longitude.to_string()),
                ("format", "json".to_string()),
                ("addressdetails", "1".to_string()),
                ("zoom", NOMINATIM_ZOOM.to_string()),
            ])
            .send()?
            .error_for_status()?;

        let address = response.json::<NominatimResponse>()?.into_address()?;

        log::info!(
            "{} GEOCODE_OK address=\"{}\"",
            ctx,
            address.display_name.chars().take(80).collect::<String>()
        );
        Ok(address)
    }
}
