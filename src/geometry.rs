use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum GeometryError {
    #[error("A polygon needs at least 3 distinct vertices, got {0}")]
    TooFewVertices(usize),

    #[error("Vertex {index} is not a finite coordinate: ({lon}, {lat})")]
    NonFiniteVertex { index: usize, lon: f64, lat: f64 },
}

/// Axis-aligned extent in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BoundingBox {
    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.west + self.east) / 2.0,
            (self.south + self.north) / 2.0,
        )
    }

    /// Closed-interval overlap test, so boxes sharing an edge intersect.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.west <= other.east
            && other.west <= self.east
            && self.south <= other.north
            && other.south <= self.north
    }
}

/// A closed ring of `(longitude, latitude)` pairs.
///
/// The ring is always stored closed: the last vertex repeats the first one.
/// Once built, a polygon never changes; it is only used as a filter or clip argument.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(try_from = "Vec<(f64, f64)>", into = "Vec<(f64, f64)>")]
pub struct Polygon {
    ring: Vec<(f64, f64)>,
}

impl Polygon {
    /// Builds a polygon from an open or closed ring of `(lon, lat)` vertices.
    ///
    /// # Errors
    ///
    /// * [`GeometryError::NonFiniteVertex`] if a coordinate is `NaN` or infinite.
    /// * [`GeometryError::TooFewVertices`] if the ring has fewer than 3 distinct vertices.
    pub fn new(vertices: Vec<(f64, f64)>) -> Result<Self, GeometryError> {
        for (index, &(lon, lat)) in vertices.iter().enumerate() {
            if !lon.is_finite() || !lat.is_finite() {
                return Err(GeometryError::NonFiniteVertex { index, lon, lat });
            }
        }

        let mut ring = vertices;
        ring.dedup();
        if ring.len() > 1 && ring.first() == ring.last() {
            ring.pop();
        }
        if ring.len() < 3 {
            return Err(GeometryError::TooFewVertices(ring.len()));
        }
        ring.push(ring[0]);
        Ok(Self { ring })
    }

    /// Rectangle covering `bounds`, listed counter-clockwise from the south-west corner.
    pub fn from_bounds(bounds: BoundingBox) -> Result<Self, GeometryError> {
        Self::new(vec![
            (bounds.west, bounds.south),
            (bounds.east, bounds.south),
            (bounds.east, bounds.north),
            (bounds.west, bounds.north),
        ])
    }

    /// The closed ring, first and last vertex coincident.
    pub fn vertices(&self) -> &[(f64, f64)] {
        &self.ring
    }

    fn edges(&self) -> impl Iterator<Item = ((f64, f64), (f64, f64))> + '_ {
        self.ring.windows(2).map(|w| (w[0], w[1]))
    }

    pub fn bounds(&self) -> BoundingBox {
        let mut bounds = BoundingBox {
            west: f64::INFINITY,
            south: f64::INFINITY,
            east: f64::NEG_INFINITY,
            north: f64::NEG_INFINITY,
        };
        for &(lon, lat) in &self.ring {
            bounds.west = bounds.west.min(lon);
            bounds.east = bounds.east.max(lon);
            bounds.south = bounds.south.min(lat);
            bounds.north = bounds.north.max(lat);
        }
        bounds
    }

    pub fn center(&self) -> (f64, f64) {
        self.bounds().center()
    }

    /// Even-odd point-in-polygon test.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        let mut inside = false;
        for ((x1, y1), (x2, y2)) in self.edges() {
            if (y1 > lat) != (y2 > lat) {
                let x_cross = x1 + (lat - y1) * (x2 - x1) / (y2 - y1);
                if lon < x_cross {
                    inside = !inside;
                }
            }
        }
        inside
    }

    /// True when the two areas share at least one point, including touching edges.
    pub fn intersects(&self, other: &Polygon) -> bool {
        if !self.bounds().intersects(&other.bounds()) {
            return false;
        }
        let vertex_inside = |a: &Polygon, b: &Polygon| {
            a.ring[..a.ring.len() - 1]
                .iter()
                .any(|&(lon, lat)| b.contains(lon, lat))
        };
        if vertex_inside(self, other) || vertex_inside(other, self) {
            return true;
        }
        self.edges()
            .any(|(a1, a2)| other.edges().any(|(b1, b2)| segments_intersect(a1, a2, b1, b2)))
    }
}

impl TryFrom<Vec<(f64, f64)>> for Polygon {
    type Error = GeometryError;

    fn try_from(vertices: Vec<(f64, f64)>) -> Result<Self, Self::Error> {
        Self::new(vertices)
    }
}

impl From<Polygon> for Vec<(f64, f64)> {
    fn from(polygon: Polygon) -> Self {
        polygon.ring
    }
}

fn orientation(p: (f64, f64), q: (f64, f64), r: (f64, f64)) -> f64 {
    (q.0 - p.0) * (r.1 - p.1) - (q.1 - p.1) * (r.0 - p.0)
}

fn on_segment(p: (f64, f64), q: (f64, f64), r: (f64, f64)) -> bool {
    r.0 >= p.0.min(q.0) && r.0 <= p.0.max(q.0) && r.1 >= p.1.min(q.1) && r.1 <= p.1.max(q.1)
}

fn segments_intersect(a1: (f64, f64), a2: (f64, f64), b1: (f64, f64), b2: (f64, f64)) -> bool {
    let d1 = orientation(b1, b2, a1);
    let d2 = orientation(b1, b2, a2);
    let d3 = orientation(a1, a2, b1);
    let d4 = orientation(a1, a2, b2);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }

    (d1 == 0.0 && on_segment(b1, b2, a1))
        || (d2 == 0.0 && on_segment(b1, b2, a2))
        || (d3 == 0.0 && on_segment(a1, a2, b1))
        || (d4 == 0.0 && on_segment(a1, a2, b2))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(west: f64, south: f64, size: f64) -> Polygon {
        Polygon::new(vec![
            (west, south),
            (west + size, south),
            (west + size, south + size),
            (west, south + size),
        ])
        .unwrap()
    }

    #[test]
    fn test_open_ring_is_closed() {
        let polygon = square(0.0, 0.0, 1.0);
        let vertices = polygon.vertices();
        assert_eq!(vertices.len(), 5);
        assert_eq!(vertices.first(), vertices.last());
    }

    #[test]
    fn test_closed_ring_is_kept_as_is() {
        let polygon =
            Polygon::new(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 0.0)]).unwrap();
        assert_eq!(polygon.vertices().len(), 4);
    }

    #[test]
    fn test_degenerate_rings_are_rejected() {
        assert_eq!(
            Polygon::new(vec![(0.0, 0.0), (1.0, 1.0), (0.0, 0.0)]),
            Err(GeometryError::TooFewVertices(2))
        );
        assert!(matches!(
            Polygon::new(vec![(0.0, 0.0), (f64::NAN, 1.0), (1.0, 0.0)]),
            Err(GeometryError::NonFiniteVertex { index: 1, .. })
        ));
    }

    #[test]
    fn test_contains() {
        let polygon = square(5.0, 52.0, 0.5);
        assert!(polygon.contains(5.25, 52.25));
        assert!(!polygon.contains(4.9, 52.25));
        assert!(!polygon.contains(5.25, 52.6));
    }

    #[test]
    fn test_contains_concave() {
        // An "L" shape: the notch at the top right is outside.
        let polygon = Polygon::new(vec![
            (0.0, 0.0),
            (2.0, 0.0),
            (2.0, 1.0),
            (1.0, 1.0),
            (1.0, 2.0),
            (0.0, 2.0),
        ])
        .unwrap();
        assert!(polygon.contains(0.5, 1.5));
        assert!(polygon.contains(1.5, 0.5));
        assert!(!polygon.contains(1.5, 1.5));
    }

    #[test]
    fn test_intersects() {
        let a = square(0.0, 0.0, 1.0);
        assert!(a.intersects(&square(0.5, 0.5, 1.0)), "overlapping");
        assert!(a.intersects(&square(0.25, 0.25, 0.1)), "contained");
        assert!(square(0.25, 0.25, 0.1).intersects(&a), "container");
        assert!(a.intersects(&square(1.0, 0.0, 1.0)), "shared edge");
        assert!(!a.intersects(&square(2.0, 2.0, 1.0)), "disjoint");
    }

    #[test]
    fn test_crossing_without_contained_vertices() {
        // A plus sign: neither rectangle has a vertex inside the other.
        let horizontal = Polygon::from_bounds(BoundingBox {
            west: 0.0,
            south: 1.0,
            east: 3.0,
            north: 2.0,
        })
        .unwrap();
        let vertical = Polygon::from_bounds(BoundingBox {
            west: 1.0,
            south: 0.0,
            east: 2.0,
            north: 3.0,
        })
        .unwrap();
        assert!(horizontal.intersects(&vertical));
    }

    #[test]
    fn test_bounds_and_center() {
        let polygon = square(-1.0, 10.0, 2.0);
        let bounds = polygon.bounds();
        assert_eq!(bounds.west, -1.0);
        assert_eq!(bounds.north, 12.0);
        assert_eq!(polygon.center(), (0.0, 11.0));
    }

    #[test]
    fn test_serde_round_trip_validates() {
        let polygon = square(0.0, 0.0, 1.0);
        let json = serde_json::to_string(&polygon).unwrap();
        let parsed: Polygon = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, polygon);

        let invalid: Result<Polygon, _> = serde_json::from_str("[[0.0, 0.0], [1.0, 1.0]]");
        assert!(invalid.is_err());
    }
}
