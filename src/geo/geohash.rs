//! Geohash encoding and disc covers for the provider directory's range
//! queries. A cover maps a (center, radius) disc to a small set of
//! `[prefix, prefix~)` intervals over the lexicographic geohash order.

use crate::models::provider::GeoPoint;

const BASE32: &[u8] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Shorter edge of a geohash cell at precisions 1..=9, in kilometers.
const CELL_MIN_EDGE_KM: [f64; 9] = [
    4_992.6, 624.1, 156.0, 19.5, 4.89, 0.61, 0.153, 0.0191, 0.00477,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    North,
    South,
    East,
    West,
}

pub fn encode(lat: f64, lng: f64, precision: usize) -> String {
    let mut lat_range = (-90.0_f64, 90.0_f64);
    let mut lng_range = (-180.0_f64, 180.0_f64);
    let mut hash = String::with_capacity(precision);
    let mut ch = 0usize;
    let mut bit = 0u8;
    let mut even = true;

    while hash.len() < precision {
        if even {
            let mid = (lng_range.0 + lng_range.1) / 2.0;
            if lng >= mid {
                ch = ch * 2 + 1;
                lng_range.0 = mid;
            } else {
                ch *= 2;
                lng_range.1 = mid;
            }
        } else {
            let mid = (lat_range.0 + lat_range.1) / 2.0;
            if lat >= mid {
                ch = ch * 2 + 1;
                lat_range.0 = mid;
            } else {
                ch *= 2;
                lat_range.1 = mid;
            }
        }
        even = !even;
        bit += 1;
        if bit == 5 {
            hash.push(BASE32[ch] as char);
            ch = 0;
            bit = 0;
        }
    }

    hash
}

/// Largest precision whose cells are at least `radius_km` on their shorter
/// edge, so the center cell plus its eight neighbors covers the disc.
pub fn precision_for_radius(radius_km: f64) -> usize {
    for (i, edge) in CELL_MIN_EDGE_KM.iter().enumerate() {
        if *edge < radius_km {
            return i.max(1);
        }
    }
    CELL_MIN_EDGE_KM.len()
}

fn tables(dir: Direction, odd: bool) -> (&'static str, &'static str) {
    match (dir, odd) {
        (Direction::North, false) => ("p0r21436x8zb9dcf5h7kjnmqesgutwvy", "prxz"),
        (Direction::North, true) => ("bc01fg45238967deuvhjyznpkmstqrwx", "bcfguvyz"),
        (Direction::South, false) => ("14365h7k9dcfesgujnmqp0r2twvyx8zb", "028b"),
        (Direction::South, true) => ("238967debc01fg45kmstqrwxuvhjyznp", "0145hjnp"),
        (Direction::East, false) => ("bc01fg45238967deuvhjyznpkmstqrwx", "bcfguvyz"),
        (Direction::East, true) => ("p0r21436x8zb9dcf5h7kjnmqesgutwvy", "prxz"),
        (Direction::West, false) => ("238967debc01fg45kmstqrwxuvhjyznp", "0145hjnp"),
        (Direction::West, true) => ("14365h7k9dcfesgujnmqp0r2twvyx8zb", "028b"),
    }
}

/// Adjacent cell in the given direction, or `None` when the walk runs off
/// the poles.
pub fn adjacent(hash: &str, dir: Direction) -> Option<String> {
    let last = hash.chars().last()?;
    let odd = hash.len() % 2 == 1;
    let (neighbor, border) = tables(dir, odd);

    let mut parent = hash[..hash.len() - 1].to_string();
    if border.contains(last) {
        if parent.is_empty() {
            return None;
        }
        parent = adjacent(&parent, dir)?;
    }

    let idx = neighbor.find(last)?;
    parent.push(BASE32[idx] as char);
    Some(parent)
}

/// The up-to-eight cells surrounding `hash`.
pub fn neighbors(hash: &str) -> Vec<String> {
    let north = adjacent(hash, Direction::North);
    let south = adjacent(hash, Direction::South);

    let mut out = Vec::with_capacity(8);
    for side in [&north, &south] {
        if let Some(side) = side {
            out.push(side.clone());
            out.extend(adjacent(side, Direction::East));
            out.extend(adjacent(side, Direction::West));
        }
    }
    out.extend(adjacent(hash, Direction::East));
    out.extend(adjacent(hash, Direction::West));
    out
}

/// Half-open geohash intervals covering a disc around `center`. Every
/// geohash inside the disc falls in exactly one interval; intervals may
/// also contain points outside the disc, so callers must re-check exact
/// distance.
pub fn cover(center: &GeoPoint, radius_km: f64) -> Vec<(String, String)> {
    let precision = precision_for_radius(radius_km);
    let center_cell = encode(center.lat, center.lng, precision);

    let mut cells = neighbors(&center_cell);
    cells.push(center_cell);
    cells.sort();
    cells.dedup();

    cells
        .into_iter()
        .map(|cell| {
            // '~' sorts above every base32 digit, closing the prefix range.
            let end = format!("{cell}~");
            (cell, end)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{adjacent, cover, encode, precision_for_radius, Direction};
    use crate::models::provider::GeoPoint;

    #[test]
    fn encodes_known_value() {
        assert_eq!(encode(57.64911, 10.40744, 11), "u4pruydqqvj");
    }

    #[test]
    fn encode_is_prefix_stable() {
        let long = encode(48.8566, 2.3522, 9);
        let short = encode(48.8566, 2.3522, 5);
        assert!(long.starts_with(&short));
    }

    #[test]
    fn precision_shrinks_with_radius() {
        assert_eq!(precision_for_radius(1.0), 5);
        assert_eq!(precision_for_radius(2.0), 5);
        assert_eq!(precision_for_radius(8.0), 4);
        assert_eq!(precision_for_radius(30.0), 3);
    }

    #[test]
    fn adjacent_inverts() {
        let cell = encode(53.5511, 9.9937, 6);
        let east = adjacent(&cell, Direction::East).unwrap();
        let back = adjacent(&east, Direction::West).unwrap();
        assert_eq!(back, cell);

        let north = adjacent(&cell, Direction::North).unwrap();
        let back = adjacent(&north, Direction::South).unwrap();
        assert_eq!(back, cell);
    }

    #[test]
    fn cover_contains_points_across_cell_boundaries() {
        let center = GeoPoint {
            lat: 48.8566,
            lng: 2.3522,
        };
        let ranges = cover(&center, 1.0);
        assert!(!ranges.is_empty());

        // Points ~0.9 km out in eight compass directions must all land in
        // some interval, even when they cross into a neighbor cell.
        let dlat = 0.9 / 111.19;
        let dlng = dlat / center.lat.to_radians().cos();
        for (step_lat, step_lng) in [
            (dlat, 0.0),
            (-dlat, 0.0),
            (0.0, dlng),
            (0.0, -dlng),
            (dlat * 0.7, dlng * 0.7),
            (dlat * 0.7, -dlng * 0.7),
            (-dlat * 0.7, dlng * 0.7),
            (-dlat * 0.7, -dlng * 0.7),
        ] {
            let hash = encode(center.lat + step_lat, center.lng + step_lng, 9);
            let covered = ranges
                .iter()
                .any(|(start, end)| hash.as_str() >= start.as_str() && hash.as_str() < end.as_str());
            assert!(covered, "{hash} not covered by {ranges:?}");
        }
    }
}
