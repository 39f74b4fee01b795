//! Location verification.
//!
//! Compares the GPS embedded in a photo with the coordinates the reporter
//! submitted, corroborated by reverse geocoding and nearby landmarks.
//! External lookups are best-effort: their failures degrade the result but
//! never change the distance-based verdict.

pub mod geocoder;
pub mod landmarks;
pub mod lookup;
pub mod throttle;
pub mod verifier;

pub use geocoder::{Address, NominatimClient, ReverseGeocoder};
pub use landmarks::{LandmarkCategory, LandmarkHit, LandmarkSource, OverpassClient};
pub use lookup::{LookupFailure, LookupResult};
pub use throttle::RateLimiter;
pub use verifier::*;
