//!
//! Pure scalar functions registered on every handle.
//!
//! All of them are deterministic and free of side effects, which is what
//! lets the read-only authorizer allow function calls unconditionally.
//!
//! - `json_includes(array_text, v1, v2, ...)`
//! - `regexp_extract(input, pattern, group)`
//! - `geo_haversine(lat_a, lng_a, lat_b, lng_b)`
//! - `geo_offset_lat(lat, lng, bearing, km)`
//! - `geo_offset_lng(lat, lng, bearing, km)`
//!

use std::collections::HashSet;
use std::sync::Arc;

use regex::Regex;
use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::types::ValueRef;
use serde_json::Value as JsonValue;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

pub fn register(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;

    conn.create_scalar_function("json_includes", -1, flags, |ctx| {
        if ctx.is_empty() {
            return Err(user_error("json_includes needs at least one argument"));
        }
        let array = ctx.get::<String>(0)?;
        let wanted: Vec<String> = (1..ctx.len()).map(|i| render_raw(ctx.get_raw(i))).collect();
        json_includes(&array, &wanted).map_err(rusqlite::Error::UserFunctionError)
    })?;

    conn.create_scalar_function("regexp_extract", 3, flags, |ctx| {
        let pattern: Arc<Regex> = ctx.get_or_create_aux(1, |raw| -> Result<_, BoxError> {
            Ok(Regex::new(raw.as_str()?)?)
        })?;
        let input = ctx.get::<Option<String>>(0)?.unwrap_or_default();
        let group = ctx.get::<i64>(2)?;
        Ok(regexp_extract(&pattern, &input, group))
    })?;

    conn.create_scalar_function("geo_haversine", 4, flags, |ctx| {
        let [lat_a, lng_a, lat_b, lng_b] = float_args(ctx)?;
        Ok(haversine(lat_a, lng_a, lat_b, lng_b))
    })?;

    conn.create_scalar_function("geo_offset_lat", 4, flags, |ctx| {
        let [lat, lng, bearing, km] = float_args(ctx)?;
        Ok(offset(lat, lng, bearing, km).0)
    })?;

    conn.create_scalar_function("geo_offset_lng", 4, flags, |ctx| {
        let [lat, lng, bearing, km] = float_args(ctx)?;
        Ok(offset(lat, lng, bearing, km).1)
    })?;

    Ok(())
}

fn float_args(ctx: &Context<'_>) -> rusqlite::Result<[f64; 4]> {
    Ok([ctx.get(0)?, ctx.get(1)?, ctx.get(2)?, ctx.get(3)?])
}

fn user_error(msg: &str) -> rusqlite::Error {
    rusqlite::Error::UserFunctionError(msg.into())
}

/// True when every wanted value appears among the array's elements.
///
/// Elements and arguments are compared by their textual rendering, so
/// `1`, `1.0` and `'1'` all match each other.
pub fn json_includes(array: &str, wanted: &[String]) -> Result<bool, BoxError> {
    let elements: Vec<JsonValue> = serde_json::from_str(array)?;
    let present: HashSet<String> = elements.iter().map(render_json).collect();
    Ok(wanted.iter().all(|w| present.contains(w)))
}

fn render_json(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => i.to_string(),
            None => render_float(n.as_f64().unwrap_or(f64::NAN)),
        },
        other => other.to_string(),
    }
}

fn render_raw(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "null".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => render_float(f),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

fn render_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

/// Capture `group` of the first match, or an empty string.
pub fn regexp_extract(pattern: &Regex, input: &str, group: i64) -> String {
    let Ok(group) = usize::try_from(group) else {
        return String::new();
    };
    pattern
        .captures(input)
        .and_then(|caps| caps.get(group))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Great-circle distance in kilometres.
pub fn haversine(lat_a: f64, lng_a: f64, lat_b: f64, lng_b: f64) -> f64 {
    let (lat_a, lng_a) = (lat_a.to_radians(), lng_a.to_radians());
    let (lat_b, lng_b) = (lat_b.to_radians(), lng_b.to_radians());
    let (d_lat, d_lng) = (lat_b - lat_a, lng_b - lng_a);
    let a = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * a.sqrt().asin() * EARTH_RADIUS_KM
}

/// Destination `(lat, lng)` after travelling `km` from a point on `bearing` degrees.
pub fn offset(lat: f64, lng: f64, bearing: f64, km: f64) -> (f64, f64) {
    let d = km / EARTH_RADIUS_KM;
    let (lat, lng, bearing) = (lat.to_radians(), lng.to_radians(), bearing.to_radians());
    let lat_b = (lat.sin() * d.cos() + lat.cos() * d.sin() * bearing.cos()).asin();
    let lng_b = lng
        + (bearing.sin() * d.sin() * lat.cos()).atan2(d.cos() - lat.sin() * lat_b.sin());
    (lat_b.to_degrees(), lng_b.to_degrees())
}
