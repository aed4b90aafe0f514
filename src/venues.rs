use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use hashbrown::HashMap;
use log::{debug, info};
use serde::Deserialize;

use crate::error::Result;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Longitude (`x`) / latitude (`y`) of a venue.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Location {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct VenueRecord {
    location: Location,
}

/// Venue coordinates with a pre-computed pairwise distance matrix (metres).
#[derive(Debug, Clone, Default)]
pub struct VenueMap {
    locations: BTreeMap<String, Location>,
    distances: HashMap<(String, String), f64>,
}

impl VenueMap {
    pub fn new(locations: BTreeMap<String, Location>) -> Self {
        let mut map = VenueMap {
            locations,
            distances: HashMap::new(),
        };
        map.precompute_distances();
        map
    }

    /// Reads the `{ VENUE: { "location": { "x": lon, "y": lat } } }` file.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let records: BTreeMap<String, VenueRecord> = serde_json::from_str(json)?;
        Ok(Self::new(
            records.into_iter().map(|(name, r)| (name, r.location)).collect(),
        ))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let map = Self::from_json_str(&fs::read_to_string(path)?)?;
        info!("Loaded {} venue locations from {}", map.len(), path.display());
        Ok(map)
    }

    fn precompute_distances(&mut self) {
        let venues: Vec<(&String, &Location)> = self.locations.iter().collect();
        for (i, (a, loc_a)) in venues.iter().enumerate() {
            for (b, loc_b) in &venues[i..] {
                let distance = if a == b { 0.0 } else { haversine(loc_a, loc_b) };
                self.distances.insert(((*a).clone(), (*b).clone()), distance);
                self.distances.insert(((*b).clone(), (*a).clone()), distance);
            }
        }
        debug!("Distance matrix computed with {} entries", self.distances.len());
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn contains(&self, venue: &str) -> bool {
        self.locations.contains_key(venue)
    }

    /// Distance in metres, `None` when either venue is unknown.
    pub fn distance(&self, a: &str, b: &str) -> Option<f64> {
        if a == b {
            return self.contains(a).then_some(0.0);
        }
        self.distances.get(&(a.to_string(), b.to_string())).copied()
    }
}

/// Great-circle distance in metres.
pub fn haversine(a: &Location, b: &Location) -> f64 {
    let (lat1, lon1) = (a.y.to_radians(), a.x.to_radians());
    let (lat2, lon2) = (b.y.to_radians(), b.x.to_radians());

    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    const VENUES: &str = r#"{
        "COM1-0201": { "location": { "x": 103.7737, "y": 1.2950 } },
        "LT17":      { "location": { "x": 103.7741, "y": 1.2935 } },
        "UTSRC-LT51": { "location": { "x": 103.7727, "y": 1.3050 } }
    }"#;

    #[test]
    fn distances_are_symmetric_and_zero_on_diagonal() {
        let map = VenueMap::from_json_str(VENUES).unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map.distance("LT17", "LT17"), Some(0.0));

        let ab = map.distance("COM1-0201", "UTSRC-LT51").unwrap();
        let ba = map.distance("UTSRC-LT51", "COM1-0201").unwrap();
        assert!((ab - ba).abs() < 1e-9);
        // about 1.1 km apart
        assert!(ab > 1_000.0 && ab < 1_300.0, "got {ab}");
    }

    #[test]
    fn unknown_venue_has_no_distance() {
        let map = VenueMap::from_json_str(VENUES).unwrap();
        assert_eq!(map.distance("LT17", "NOWHERE"), None);
        assert_eq!(map.distance("NOWHERE", "NOWHERE"), None);
    }
}
