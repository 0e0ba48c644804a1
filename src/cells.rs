//! Geospatial cell resolver
//!
//! Turns bounding boxes and GPS tracks into H3 cells at the process-wide
//! resolution, and validates raw cell identifiers coming from clients.
//! Everything here is pure: no store access, no clock.

use std::collections::{BTreeSet, HashSet};

use geo::{LineString, Polygon as GeoPolygon};
use h3o::geom::{ContainmentMode, PolyfillConfig, Polygon, ToCells};
use h3o::{CellIndex, LatLng, Resolution};
use serde::{Deserialize, Serialize};

use crate::error::TerritoryError;

/// Axis-aligned box in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lng: f64,
    pub max_lat: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    pub fn new(min_lat: f64, min_lng: f64, max_lat: f64, max_lng: f64) -> Self {
        Self { min_lat, min_lng, max_lat, max_lng }
    }

    /// Reject boxes that are non-finite, out of range, or collapse to a line/point
    pub fn validate(&self) -> Result<(), TerritoryError> {
        for (name, value, limit) in [
            ("min_lat", self.min_lat, 90.0),
            ("max_lat", self.max_lat, 90.0),
            ("min_lng", self.min_lng, 180.0),
            ("max_lng", self.max_lng, 180.0),
        ] {
            if !value.is_finite() || value.abs() > limit {
                return Err(TerritoryError::InvalidRegion(format!(
                    "{} {} is outside [-{}, {}]",
                    name, value, limit, limit
                )));
            }
        }

        if self.min_lat >= self.max_lat || self.min_lng >= self.max_lng {
            return Err(TerritoryError::InvalidRegion(format!(
                "bounding box ({}, {}) - ({}, {}) has no area",
                self.min_lat, self.min_lng, self.max_lat, self.max_lng
            )));
        }

        Ok(())
    }

    /// Four-corner loop, geo order (x = lng, y = lat)
    fn to_polygon(self) -> GeoPolygon<f64> {
        let exterior = LineString::from(vec![
            (self.min_lng, self.min_lat),
            (self.max_lng, self.min_lat),
            (self.max_lng, self.max_lat),
            (self.min_lng, self.max_lat),
            (self.min_lng, self.min_lat),
        ]);
        GeoPolygon::new(exterior, vec![])
    }

    /// Equal-width longitude slices no wider than [`MAX_SLICE_LNG`].
    ///
    /// h3o reads any polygon edge spanning more than 180° of longitude as
    /// crossing the antimeridian, so wide boxes are tiled in pieces.
    fn lng_slices(self) -> Vec<BoundingBox> {
        let width = self.max_lng - self.min_lng;
        let count = (width / MAX_SLICE_LNG).ceil().max(1.0) as usize;
        let step = width / count as f64;

        (0..count)
            .map(|i| {
                let min_lng = self.min_lng + step * i as f64;
                let max_lng = if i + 1 == count { self.max_lng } else { min_lng + step };
                BoundingBox { min_lng, max_lng, ..self }
            })
            .collect()
    }
}

/// Widest longitude span handed to the polyfill in one polygon
const MAX_SLICE_LNG: f64 = 90.0;

/// All cells whose hexagon intersects the box.
///
/// `max_cells` bounds the work a single query may trigger; the check uses
/// the polyfill upper bound so oversized regions fail before any tiling.
pub fn cells_in_region(
    bbox: &BoundingBox,
    resolution: Resolution,
    max_cells: usize,
) -> Result<BTreeSet<CellIndex>, TerritoryError> {
    bbox.validate()?;

    let config = PolyfillConfig::new(resolution)
        .containment_mode(ContainmentMode::IntersectsBoundary);

    let polygons = bbox
        .lng_slices()
        .into_iter()
        .map(|slice| {
            Polygon::from_degrees(slice.to_polygon())
                .map_err(|e| TerritoryError::InvalidRegion(e.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let estimate: usize = polygons.iter().map(|p| p.max_cells_count(config)).sum();
    if estimate > max_cells {
        return Err(TerritoryError::InvalidRegion(format!(
            "region may cover up to {} cells at resolution {}, limit is {}",
            estimate,
            u8::from(resolution),
            max_cells
        )));
    }

    Ok(polygons.iter().flat_map(|p| p.to_cells(config)).collect())
}

/// Cells visited by a track of (lat, lng) points, first-visit order, no repeats
pub fn cells_along_track(
    points: &[(f64, f64)],
    resolution: Resolution,
) -> Result<Vec<CellIndex>, TerritoryError> {
    let mut seen = HashSet::new();
    let mut cells = Vec::new();

    for (i, &(lat, lng)) in points.iter().enumerate() {
        let coord = LatLng::new(lat, lng).map_err(|e| {
            TerritoryError::InvalidRegion(format!("point[{}] ({}, {}): {}", i, lat, lng, e))
        })?;
        let cell = coord.to_cell(resolution);
        if seen.insert(cell) {
            cells.push(cell);
        }
    }

    Ok(cells)
}

/// Parse a client-supplied index, requiring exactly `resolution`
pub fn validate_cell(raw: u64, resolution: Resolution) -> Result<CellIndex, TerritoryError> {
    let cell = CellIndex::try_from(raw)
        .map_err(|_| TerritoryError::Validation(format!("invalid H3 index: {}", raw)))?;

    if cell.resolution() != resolution {
        return Err(TerritoryError::Validation(format!(
            "H3 index {} is not at resolution {}",
            raw,
            u8::from(resolution)
        )));
    }

    Ok(cell)
}

/// Serde adapter: a cell as its canonical hex string
pub mod as_string {
    use h3o::CellIndex;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(cell: &CellIndex, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(cell)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<CellIndex, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}

/// Serde adapter: a list of cells as hex strings
pub mod as_string_vec {
    use h3o::CellIndex;
    use serde::{de::Error, ser::SerializeSeq, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(cells: &[CellIndex], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(cells.len()))?;
        for cell in cells {
            seq.serialize_element(&cell.to_string())?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<CellIndex>, D::Error> {
        let raw = Vec::<String>::deserialize(deserializer)?;
        raw.iter()
            .map(|s| s.parse().map_err(D::Error::custom))
            .collect()
    }
}
