//! EXIF extraction from image bytes.
//!
//! Parses the EXIF container of a JPEG/PNG with kamadak-exif and converts
//! GPS degree/minute/second triples to signed decimal degrees:
//! `decimal = deg + min/60 + sec/3600`, negated for `S` and `W`.
//!
//! Returns `None` for images without EXIF data; that is expected for PNGs
//! and screenshots and is not logged as an error.

use std::io::Cursor;

use ::exif::{Exif, Field, In, Rational, Reader, Tag, Value};

use crate::extraction::metadata::PhotoMetadata;
use crate::geo::GeoPoint;
use crate::logging::structured::LogContext;
use crate::security::sanitizer::{is_risky_tag, sanitize_exif_text};

/// Extract photo metadata from raw file bytes.
pub fn read_photo_metadata(data: &[u8], ctx: &LogContext) -> Option<PhotoMetadata> {
    let mut cursor = Cursor::new(data);
    match Reader::new().read_from_container(&mut cursor) {
        Ok(exif) => Some(metadata_from_exif(&exif, ctx)),
        Err(e) => {
            log::debug!("{} EXIF_ABSENT reason={}", ctx, e);
            None
        }
    }
}

/// Convert a parsed EXIF block into `PhotoMetadata`.
pub fn metadata_from_exif(exif: &Exif, ctx: &LogContext) -> PhotoMetadata {
    let mut meta = PhotoMetadata::default();

    let mut lat_dms: Option<Vec<Rational>> = None;
    let mut lat_ref: Option<String> = None;
    let mut lon_dms: Option<Vec<Rational>> = None;
    let mut lon_ref: Option<String> = None;
    let mut altitude: Option<f64> = None;
    let mut below_sea_level = false;
    let mut gps_date: Option<String> = None;
    let mut gps_time: Option<Vec<Rational>> = None;

    for field in exif.fields() {
        meta.field_count += 1;

        // Thumbnail IFD duplicates are not the photo's own metadata.
        if field.ifd_num != In::PRIMARY {
            continue;
        }

        let tag_name = field.tag.to_string();
        if is_risky_tag(&tag_name) && !meta.risky_tags.contains(&tag_name) {
            meta.risky_tags.push(tag_name.clone());
        }

        match field.tag {
            Tag::GPSLatitude => lat_dms = field_rationals(field),
            Tag::GPSLatitudeRef => lat_ref = field_ascii(field),
            Tag::GPSLongitude => lon_dms = field_rationals(field),
            Tag::GPSLongitudeRef => lon_ref = field_ascii(field),
            Tag::GPSAltitude => {
                altitude = field_rationals(field)
                    .and_then(|r| r.first().copied())
                    .and_then(rational_to_f64);
            }
            Tag::GPSAltitudeRef => {
                below_sea_level = matches!(&field.value, Value::Byte(b) if b.first() == Some(&1));
            }
            Tag::GPSDateStamp => gps_date = field_ascii(field),
            Tag::GPSTimeStamp => gps_time = field_rationals(field),
            Tag::Make => {
                meta.camera_make =
                    field_ascii(field).and_then(|s| sanitize_exif_text(&tag_name, &s, ctx));
            }
            Tag::Model => {
                meta.camera_model =
                    field_ascii(field).and_then(|s| sanitize_exif_text(&tag_name, &s, ctx));
            }
            Tag::DateTime => {
                meta.date_time =
                    field_ascii(field).and_then(|s| sanitize_exif_text(&tag_name, &s, ctx));
            }
            Tag::DateTimeOriginal => {
                meta.date_time_original =
                    field_ascii(field).and_then(|s| sanitize_exif_text(&tag_name, &s, ctx));
            }
            Tag::DateTimeDigitized => {
                meta.date_time_digitized =
                    field_ascii(field).and_then(|s| sanitize_exif_text(&tag_name, &s, ctx));
            }
            _ => {}
        }
    }

    let latitude = lat_dms
        .as_deref()
        .and_then(|dms| dms_to_decimal(dms, lat_ref.as_deref()));
    let longitude = lon_dms
        .as_deref()
        .and_then(|dms| dms_to_decimal(dms, lon_ref.as_deref()));

    if let (Some(lat), Some(lon)) = (latitude, longitude) {
        let point = GeoPoint::new(lat, lon);
        if point.is_valid() {
            log::debug!("{} EXIF_GPS lat={:.6} lon={:.6}", ctx, lat, lon);
            meta.gps = Some(point);
        } else {
            log::warn!(
                "{} EXIF_GPS_INVALID lat={} lon={}",
                ctx,
                lat,
                lon
            );
        }
    } else if lat_dms.is_some() || lon_dms.is_some() {
        log::warn!(
            "{} EXIF_GPS_INCOMPLETE lat_ref={:?} lon_ref={:?}",
            ctx,
            lat_ref,
            lon_ref
        );
    }

    meta.altitude_m = altitude.map(|a| if below_sea_level { -a } else { a });

    if let (Some(date), Some(time)) = (gps_date, gps_time) {
        meta.gps_timestamp = format_gps_time(&time).map(|t| format!("{} {}", date, t));
    }

    if !meta.risky_tags.is_empty() {
        log::info!(
            "{} EXIF_RISKY_TAGS_PRESENT tags={:?}",
            ctx,
            meta.risky_tags
        );
    }

    meta
}

/// Convert a degree/minute/second triple plus hemisphere reference to
/// signed decimal degrees.
///
/// Returns `None` when the triple is short, a component is not a finite
/// number, or the reference is missing.
pub fn dms_to_decimal(dms: &[Rational], reference: Option<&str>) -> Option<f64> {
    let reference = reference?.trim();
    if reference.is_empty() || dms.len() < 3 {
        return None;
    }

    let degrees = rational_to_f64(dms[0])?;
    let minutes = rational_to_f64(dms[1])?;
    let seconds = rational_to_f64(dms[2])?;

    let decimal = degrees + minutes / 60.0 + seconds / 3600.0;

    match reference {
        "S" | "W" => Some(-decimal),
        _ => Some(decimal),
    }
}

fn rational_to_f64(r: Rational) -> Option<f64> {
    if r.denom == 0 {
        return None;
    }
    let value = r.to_f64();
    value.is_finite().then_some(value)
}

fn field_rationals(field: &Field) -> Option<Vec<Rational>> {
    match &field.value {
        Value::Rational(values) if !values.is_empty() => Some(values.clone()),
        _ => None,
    }
}

fn field_ascii(field: &Field) -> Option<String> {
    match &field.value {
        Value::Ascii(parts) => parts
            .first()
            .map(|bytes| String::from_utf8_lossy(bytes).trim_end_matches('\0').to_string()),
        _ => None,
    }
}

fn format_gps_time(hms: &[Rational]) -> Option<String> {
    if hms.len() < 3 {
        return None;
    }
    let h = rational_to_f64(hms[0])?;
    let m = rational_to_f64(hms[1])?;
    let s = rational_to_f64(hms[2])?;
    Some(format!("{:02}:{:02}:{:02}", h as u32, m as u32, s as u32))
}
