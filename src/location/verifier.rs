//! Photo-vs-submitted GPS verification.
//!
//! Flow:
//! 1. Photo GPS from EXIF (absent → `no_gps_in_photo`)
//! 2. Submitted GPS validity (invalid → `invalid_submitted_gps`); when
//!    nothing was submitted the photo point stands in for it
//! 3. Haversine distance
//! 4. Reverse geocoding and landmark search, concurrently and best-effort
//! 5. Status and score adjustment from distance and landmark count

use std::sync::Arc;

use serde::Serialize;

use crate::config::AgentConfig;
use crate::error::Result;
use crate::extraction::{read_photo_metadata, PhotoMetadata};
use crate::geo::{round_to, GeoPoint};
use crate::location::geocoder::{NominatimClient, ReverseGeocoder};
use crate::location::landmarks::{LandmarkHit, LandmarkSource, OverpassClient};
use crate::location::lookup::{LookupFailure, LookupResult};
use crate::logging::structured::LogContext;

pub const SPOOFING_THRESHOLD_KM: f64 = 5.0;
pub const VERIFIED_THRESHOLD_KM: f64 = 0.5;
pub const SPOOFING_PENALTY: i32 = -50;
pub const VERIFIED_BONUS: i32 = 10;
pub const MAX_MISMATCH_PENALTY: f64 = 10.0;
pub const MIN_CORROBORATING_LANDMARKS: usize = 2;
/// Below this distance the submitted point reuses the photo address.
const SAME_PLACE_KM: f64 = 0.1;

pub const REASON_NO_GPS: &str = "No GPS data found in photo";
pub const REASON_INVALID_SUBMITTED_GPS: &str = "Invalid submitted GPS coordinates";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    NoGpsInPhoto,
    InvalidSubmittedGps,
    SpoofingDetected,
    Verified,
    GoodMatch,
    MinorMismatch,
    Unknown,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::NoGpsInPhoto => "no_gps_in_photo",
            VerificationStatus::InvalidSubmittedGps => "invalid_submitted_gps",
            VerificationStatus::SpoofingDetected => "spoofing_detected",
            VerificationStatus::Verified => "verified",
            VerificationStatus::GoodMatch => "good_match",
            VerificationStatus::MinorMismatch => "minor_mismatch",
            VerificationStatus::Unknown => "unknown",
        }
    }

    /// Location counts as confirmed for the storage layer.
    pub fn is_confirmed(&self) -> bool {
        matches!(self, VerificationStatus::Verified | VerificationStatus::GoodMatch)
    }
}

/// A lookup that failed and was skipped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DegradedService {
    pub service: &'static str,
    pub failure: LookupFailure,
}

#[derive(Debug, Clone, Serialize)]
pub struct LocationVerification {
    pub has_photo_gps: bool,
    pub photo_gps: Option<GeoPoint>,
    pub submitted_gps: Option<GeoPoint>,
    pub photo_address: Option<String>,
    pub submitted_address: Option<String>,
    /// Kilometres, three decimals. Absent only without photo GPS.
    pub distance_km: Option<f64>,
    pub nearby_landmarks: Vec<LandmarkHit>,
    /// Set iff `verification_status` is `SpoofingDetected`.
    pub is_spoofed: bool,
    /// Within [-50, +10].
    pub score_adjustment: i32,
    pub verification_status: VerificationStatus,
    pub penalty_reason: String,
    pub degraded_services: Vec<DegradedService>,
}

impl LocationVerification {
    fn short_circuit(
        status: VerificationStatus,
        reason: &str,
        photo_gps: Option<GeoPoint>,
    ) -> Self {
        Self {
            has_photo_gps: photo_gps.is_some(),
            photo_gps,
            submitted_gps: None,
            photo_address: None,
            submitted_address: None,
            distance_km: None,
            nearby_landmarks: Vec::new(),
            is_spoofed: false,
            score_adjustment: 0,
            verification_status: status,
            penalty_reason: reason.to_string(),
            degraded_services: Vec::new(),
        }
    }
}

/// Status verdict for a distance and a landmark count.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationVerdict {
    pub status: VerificationStatus,
    pub score_adjustment: i32,
    pub reason: String,
}

/// First matching rule wins:
/// - over 5 km: spoofing, -50
/// - under 0.5 km with 2+ landmarks: verified, +10
/// - under 0.5 km: good match, 0
/// - 0.5 to 5 km: minor mismatch, `round(-10 * d / 5)`
/// - anything else (NaN): unknown, 0
pub fn classify_location(distance_km: f64, landmark_count: usize) -> LocationVerdict {
    let (status, score_adjustment, reason) = if distance_km > SPOOFING_THRESHOLD_KM {
        (
            VerificationStatus::SpoofingDetected,
            SPOOFING_PENALTY,
            format!("Possible GPS spoofing detected (distance: {:.2} km)", distance_km),
        )
    } else if distance_km < VERIFIED_THRESHOLD_KM && landmark_count >= MIN_CORROBORATING_LANDMARKS
    {
        (
            VerificationStatus::Verified,
            VERIFIED_BONUS,
            format!(
                "Location verified with nearby landmarks ({} landmarks within 500m)",
                landmark_count
            ),
        )
    } else if distance_km < VERIFIED_THRESHOLD_KM {
        (
            VerificationStatus::GoodMatch,
            0,
            format!(
                "Photo GPS matches submitted location (distance: {:.2} km)",
                distance_km
            ),
        )
    } else if distance_km <= SPOOFING_THRESHOLD_KM {
        let penalty = (-MAX_MISMATCH_PENALTY * distance_km / SPOOFING_THRESHOLD_KM).round() as i32;
        (
            VerificationStatus::MinorMismatch,
            penalty,
            format!(
                "GPS coordinates do not match photo location (distance: {:.2} km)",
                distance_km
            ),
        )
    } else {
        (VerificationStatus::Unknown, 0, String::new())
    };

    LocationVerdict {
        status,
        score_adjustment,
        reason,
    }
}

/// Cross-checks embedded photo GPS against submitted coordinates.
pub struct LocationVerifier {
    geocoder: Arc<dyn ReverseGeocoder>,
    landmarks: Arc<dyn LandmarkSource>,
    landmark_radius_m: u32,
    max_landmarks: usize,
}

impl LocationVerifier {
    pub fn new(
        geocoder: Arc<dyn ReverseGeocoder>,
        landmarks: Arc<dyn LandmarkSource>,
        landmark_radius_m: u32,
        max_landmarks: usize,
    ) -> Self {
        Self {
            geocoder,
            landmarks,
            landmark_radius_m,
            max_landmarks,
        }
    }

    /// Verifier backed by the configured Nominatim and Overpass endpoints.
    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        Ok(Self::new(
            Arc::new(NominatimClient::from_config(config)?),
            Arc::new(OverpassClient::from_config(config)?),
            config.landmark_radius_m,
            config.max_landmarks,
        ))
    }

    /// Verify using the EXIF block of raw image bytes.
    pub fn verify_bytes(
        &self,
        data: &[u8],
        latitude: Option<f64>,
        longitude: Option<f64>,
        ctx: &LogContext,
    ) -> LocationVerification {
        let metadata = read_photo_metadata(data, ctx);
        self.verify(metadata.as_ref(), latitude, longitude, ctx)
    }

    pub fn verify(
        &self,
        metadata: Option<&PhotoMetadata>,
        latitude: Option<f64>,
        longitude: Option<f64>,
        ctx: &LogContext,
    ) -> LocationVerification {
        let ctx = ctx.with_stage("location");

        let Some(photo) = metadata.and_then(|m| m.gps) else {
            log::info!("{} LOCATION_NO_PHOTO_GPS", ctx);
            return LocationVerification::short_circuit(
                VerificationStatus::NoGpsInPhoto,
                REASON_NO_GPS,
                None,
            );
        };

        let submitted = match GeoPoint::from_parts(latitude, longitude) {
            Some(point) if !point.is_valid() => {
                log::warn!(
                    "{} LOCATION_INVALID_SUBMITTED lat={} lon={}",
                    ctx,
                    point.latitude,
                    point.longitude
                );
                return LocationVerification::short_circuit(
                    VerificationStatus::InvalidSubmittedGps,
                    REASON_INVALID_SUBMITTED_GPS,
                    Some(photo),
                );
            }
            Some(point) => point,
            None => {
                log::info!("{} LOCATION_SELF_COMPARISON reason=no_submitted_gps", ctx);
                photo
            }
        };

        let distance_km = photo.distance_km(&submitted);
        log::info!(
            "{} LOCATION_DISTANCE photo=({:.6},{:.6}) submitted=({:.6},{:.6}) km={:.3}",
            ctx,
            photo.latitude,
            photo.longitude,
            submitted.latitude,
            submitted.longitude,
            distance_km
        );

        let (addresses, landmarks) = std::thread::scope(|s| {
            let landmark_task = s.spawn(|| {
                self.landmarks
                    .nearby(photo, self.landmark_radius_m, self.max_landmarks, &ctx)
            });
            let addresses = self.geocode_pair(photo, submitted, distance_km, &ctx);
            let landmarks = landmark_task
                .join()
                .unwrap_or_else(|_| Err(LookupFailure::Transport("landmark worker panicked".into())));
            (addresses, landmarks)
        });

        let mut degraded = Vec::new();
        let (photo_address, submitted_address) = addresses;
        let photo_address = absorb(photo_address, "reverse_geocode_photo", &mut degraded, &ctx);
        let submitted_address = match submitted_address {
            Some(result) => absorb(result, "reverse_geocode_submitted", &mut degraded, &ctx),
            None => photo_address.clone(),
        };
        let mut nearby_landmarks =
            absorb(landmarks, "landmarks", &mut degraded, &ctx).unwrap_or_default();
        nearby_landmarks.truncate(self.max_landmarks);

        let verdict = classify_location(distance_km, nearby_landmarks.len());
        let is_spoofed = verdict.status == VerificationStatus::SpoofingDetected;

        if is_spoofed {
            log::warn!(
                "{} LOCATION_SPOOFING_DETECTED km={:.3} adjustment={}",
                ctx,
                distance_km,
                verdict.score_adjustment
            );
        } else {
            log::info!(
                "{} LOCATION_VERIFIED status={} adjustment={:+} landmarks={} degraded={}",
                ctx,
                verdict.status.as_str(),
                verdict.score_adjustment,
                nearby_landmarks.len(),
                degraded.len()
            );
        }

        LocationVerification {
            has_photo_gps: true,
            photo_gps: Some(photo),
            submitted_gps: Some(submitted),
            photo_address,
            submitted_address,
            distance_km: Some(round_to(distance_km, 3)),
            nearby_landmarks,
            is_spoofed,
            score_adjustment: verdict.score_adjustment,
            verification_status: verdict.status,
            penalty_reason: verdict.reason,
            degraded_services: degraded,
        }
    }

    /// Photo address, plus the submitted address when the points differ by
    /// more than `SAME_PLACE_KM` (`None` means reuse the photo address).
    fn geocode_pair(
        &self,
        photo: GeoPoint,
        submitted: GeoPoint,
        distance_km: f64,
        ctx: &LogContext,
    ) -> (LookupResult<String>, Option<LookupResult<String>>) {
        let photo_address = self.geocoder.reverse(photo, ctx).map(|a| a.short());
        let submitted_address = (distance_km > SAME_PLACE_KM)
            .then(|| self.geocoder.reverse(submitted, ctx).map(|a| a.short()));
        (photo_address, submitted_address)
    }
}

fn absorb<T>(
    result: LookupResult<T>,
    service: &'static str,
    degraded: &mut Vec<DegradedService>,
    ctx: &LogContext,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(failure) => {
            log::warn!(
                "{} LOOKUP_DEGRADED service={} error=\"{}\"",
                ctx,
                service,
                failure
            );
            degraded.push(DegradedService { service, failure });
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::geocoder::Address;
    use crate::location::landmarks::LandmarkCategory;
    use parking_lot::Mutex;
    use proptest::prelude::*;

    struct FixedGeocoder {
        calls: Mutex<Vec<GeoPoint>>,
        fail: bool,
    }

    impl ReverseGeocoder for FixedGeocoder {
        fn reverse(&self, point: GeoPoint, _ctx: &LogContext) -> LookupResult<Address> {
            self.calls.lock().push(point);
            if self.fail {
                return Err(LookupFailure::Status(503));
            }
            Ok(Address {
                road: "Mall Road".into(),
                city: "Lahore".into(),
                state: "Punjab".into(),
                ..Address::default()
            })
        }
    }

    struct FixedLandmarks(usize);

    impl LandmarkSource for FixedLandmarks {
        fn nearby(
            &self,
            center: GeoPoint,
            _radius_m: u32,
            limit: usize,
            _ctx: &LogContext,
        ) -> LookupResult<Vec<LandmarkHit>> {
            Ok((0..self.0)
                .map(|i| LandmarkHit {
                    name: format!("Place {}", i),
                    kind: "school".into(),
                    category: LandmarkCategory::Amenity,
                    distance_m: 10.0 * i as f64,
                    latitude: center.latitude,
                    longitude: center.longitude,
                })
                .take(limit)
                .collect())
        }
    }

    fn verifier(landmarks: usize, fail_geocode: bool) -> (LocationVerifier, Arc<FixedGeocoder>) {
        let geocoder = Arc::new(FixedGeocoder {
            calls: Mutex::new(Vec::new()),
            fail: fail_geocode,
        });
        let v = LocationVerifier::new(
            geocoder.clone(),
            Arc::new(FixedLandmarks(landmarks)),
            500,
            5,
        );
        (v, geocoder)
    }

    fn photo_meta(lat: f64, lon: f64) -> PhotoMetadata {
        PhotoMetadata {
            gps: Some(GeoPoint::new(lat, lon)),
            ..PhotoMetadata::default()
        }
    }

    fn ctx() -> LogContext {
        LogContext::new("test-report")
    }

    #[test]
    fn test_classification_table() {
        let v = classify_location(6.0, 0);
        assert_eq!(v.status, VerificationStatus::SpoofingDetected);
        assert_eq!(v.score_adjustment, -50);

        let v = classify_location(0.2, 3);
        assert_eq!(v.status, VerificationStatus::Verified);
        assert_eq!(v.score_adjustment, 10);

        let v = classify_location(0.2, 1);
        assert_eq!(v.status, VerificationStatus::GoodMatch);
        assert_eq!(v.score_adjustment, 0);

        let v = classify_location(2.5, 10);
        assert_eq!(v.status, VerificationStatus::MinorMismatch);
        assert_eq!(v.score_adjustment, -5);

        let v = classify_location(5.0, 0);
        assert_eq!(v.status, VerificationStatus::MinorMismatch);
        assert_eq!(v.score_adjustment, -10);

        let v = classify_location(f64::NAN, 0);
        assert_eq!(v.status, VerificationStatus::Unknown);
    }

    #[test]
    fn test_no_photo_gps() {
        let (v, geocoder) = verifier(3, false);
        let result = v.verify(None, Some(31.5), Some(74.3), &ctx());
        assert_eq!(result.verification_status, VerificationStatus::NoGpsInPhoto);
        assert_eq!(result.penalty_reason, REASON_NO_GPS);
        assert!(!result.has_photo_gps);
        assert!(result.distance_km.is_none());
        assert!(geocoder.calls.lock().is_empty());
    }

    #[test]
    fn test_invalid_submitted_gps() {
        let (v, _) = verifier(3, false);
        let meta = photo_meta(31.5204, 74.3587);
        let result = v.verify(Some(&meta), Some(95.0), Some(74.3), &ctx());
        assert_eq!(
            result.verification_status,
            VerificationStatus::InvalidSubmittedGps
        );
        assert!(!result.is_spoofed);
        assert!(result.has_photo_gps);
    }

    #[test]
    fn test_self_comparison_without_submission() {
        let (v, geocoder) = verifier(3, false);
        let meta = photo_meta(31.5204, 74.3587);
        let result = v.verify(Some(&meta), None, None, &ctx());
        assert_eq!(result.distance_km, Some(0.0));
        assert_eq!(result.verification_status, VerificationStatus::Verified);
        assert_eq!(result.submitted_gps, result.photo_gps);
        assert_eq!(result.submitted_address, result.photo_address);
        // only the photo point is geocoded
        assert_eq!(geocoder.calls.lock().len(), 1);
    }

    #[test]
    fn test_spoofing_far_submission() {
        let (v, geocoder) = verifier(0, false);
        let meta = photo_meta(31.5204, 74.3587);
        // ~10 km north
        let result = v.verify(Some(&meta), Some(31.6104), Some(74.3587), &ctx());
        assert!(result.is_spoofed);
        assert_eq!(result.score_adjustment, -50);
        assert!(result.penalty_reason.starts_with("Possible GPS spoofing detected"));
        assert_eq!(geocoder.calls.lock().len(), 2);
    }

    #[test]
    fn test_geocoder_outage_is_absorbed() {
        let (v, _) = verifier(1, true);
        let meta = photo_meta(31.5204, 74.3587);
        let result = v.verify(Some(&meta), Some(31.5210), Some(74.3590), &ctx());
        assert_eq!(result.verification_status, VerificationStatus::GoodMatch);
        assert!(result.photo_address.is_none());
        assert_eq!(result.degraded_services.len(), 1);
        assert_eq!(result.degraded_services[0].service, "reverse_geocode_photo");
        assert_eq!(
            result.degraded_services[0].failure,
            LookupFailure::Status(503)
        );
    }

    #[test]
    fn test_short_address_used() {
        let (v, _) = verifier(0, false);
        let meta = photo_meta(31.5204, 74.3587);
        let result = v.verify(Some(&meta), Some(31.5204), Some(74.3587), &ctx());
        assert_eq!(result.photo_address.as_deref(), Some("Mall Road, Lahore, Punjab"));
    }

    proptest! {
        #[test]
        fn prop_adjustment_bounded_and_spoof_iff_status(d in 0.0f64..20_000.0, n in 0usize..10) {
            let v = classify_location(d, n);
            prop_assert!((-50..=10).contains(&v.score_adjustment));
            prop_assert_eq!(
                v.status == VerificationStatus::SpoofingDetected,
                d > SPOOFING_THRESHOLD_KM
            );
        }
    }
}
