//! Geospatial helpers. Geo sets are ordinary sorted sets whose scores are 52-bit
//! interleaved geohashes, so GEOADD'ed keys answer ZRANGE and friends too.

use super::SortedSet;
use crate::error::{ZedisError, ZedisResult};
use bytes::Bytes;

const EARTH_RADIUS_M: f64 = 6372797.560856;
const STEP: u32 = 26;

pub const LON_MIN: f64 = -180.0;
pub const LON_MAX: f64 = 180.0;
pub const LAT_MIN: f64 = -85.05112878;
pub const LAT_MAX: f64 = 85.05112878;

const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

pub fn validate(lon: f64, lat: f64) -> ZedisResult<()> {
    if !(LON_MIN..=LON_MAX).contains(&lon) || !(LAT_MIN..=LAT_MAX).contains(&lat) {
        return Err(ZedisError::Generic(format!(
            "invalid longitude,latitude pair {lon:.6},{lat:.6}"
        )));
    }
    Ok(())
}

/// Spread the low 26 bits of `v` onto the even bit positions.
fn spread(v: u64) -> u64 {
    (0..STEP).fold(0, |acc, i| acc | (((v >> i) & 1) << (2 * i)))
}

fn squash(v: u64) -> u64 {
    (0..STEP).fold(0, |acc, i| acc | (((v >> (2 * i)) & 1) << i))
}

fn quantize(value: f64, min: f64, max: f64) -> u64 {
    let cells = (1u64 << STEP) as f64;
    (((value - min) / (max - min)) * cells).min(cells - 1.0) as u64
}

/// Longitude lands on the odd bits, so the top bit of the hash is a longitude bit.
fn interleave(lon: f64, lat: f64, lat_min: f64, lat_max: f64) -> u64 {
    let lat_bits = quantize(lat, lat_min, lat_max);
    let lon_bits = quantize(lon, LON_MIN, LON_MAX);
    spread(lat_bits) | (spread(lon_bits) << 1)
}

pub fn encode(lon: f64, lat: f64) -> u64 {
    interleave(lon, lat, LAT_MIN, LAT_MAX)
}

/// Centre of the cell a score denotes, as `(lon, lat)`.
pub fn decode(hash: u64) -> (f64, f64) {
    let cells = (1u64 << STEP) as f64;
    let lat_bits = squash(hash);
    let lon_bits = squash(hash >> 1);
    let centre = |bits: u64, min: f64, max: f64| {
        let width = (max - min) / cells;
        min + (bits as f64 + 0.5) * width
    };
    (
        centre(lon_bits, LON_MIN, LON_MAX).clamp(LON_MIN, LON_MAX),
        centre(lat_bits, LAT_MIN, LAT_MAX).clamp(LAT_MIN, LAT_MAX),
    )
}

/// Standard 11-character base32 geohash, as GEOHASH reports it.
pub fn to_geohash_string(lon: f64, lat: f64) -> String {
    let bits = interleave(lon, lat, -90.0, 90.0);
    (0..11)
        .map(|i| {
            let idx = if i == 10 { 0 } else { (bits >> (52 - (i + 1) * 5)) & 0x1f };
            BASE32[idx as usize] as char
        })
        .collect()
}

/// Great-circle distance in metres.
pub fn distance(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let (lat1r, lat2r) = (lat1.to_radians(), lat2.to_radians());
    let u = ((lat2r - lat1r) / 2.0).sin();
    let v = ((lon2 - lon1).to_radians() / 2.0).sin();
    let a = u * u + lat1r.cos() * lat2r.cos() * v * v;
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}

/// Metres per unit for `m`, `km`, `ft` and `mi`.
pub fn unit_factor(unit: &[u8]) -> ZedisResult<f64> {
    match unit.to_ascii_lowercase().as_slice() {
        b"m" => Ok(1.0),
        b"km" => Ok(1000.0),
        b"ft" => Ok(0.3048),
        b"mi" => Ok(1609.34),
        _ => Err(ZedisError::generic("unsupported unit provided. please use M, KM, FT, MI")),
    }
}

pub fn position(zset: &SortedSet, member: &[u8]) -> Option<(f64, f64)> {
    zset.score(member).map(|s| decode(s as u64))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Radius(f64),
    Box { width: f64, height: f64 },
}

#[derive(Debug, Clone)]
pub struct GeoMatch {
    pub member: Bytes,
    pub dist: f64,
    pub lon: f64,
    pub lat: f64,
    pub hash: u64,
}

/// Members inside `shape` around `(lon, lat)`, nearest first (or farthest first
/// when `descending`). Distances are in metres.
pub fn search(
    zset: &SortedSet,
    lon: f64,
    lat: f64,
    shape: Shape,
    descending: bool,
    count: Option<usize>,
) -> Vec<GeoMatch> {
    let mut hits: Vec<GeoMatch> = zset
        .iter()
        .filter_map(|(member, score)| {
            let hash = score as u64;
            let (mlon, mlat) = decode(hash);
            let dist = distance(lon, lat, mlon, mlat);
            let inside = match shape {
                Shape::Radius(r) => dist <= r,
                Shape::Box { width, height } => {
                    distance(lon, lat, mlon, lat) <= width / 2.0
                        && distance(lon, lat, lon, mlat) <= height / 2.0
                }
            };
            inside.then_some(GeoMatch { member, dist, lon: mlon, lat: mlat, hash })
        })
        .collect();
    hits.sort_by(|a, b| a.dist.total_cmp(&b.dist));
    if descending {
        hits.reverse();
    }
    if let Some(n) = count {
        hits.truncate(n);
    }
    hits
}
