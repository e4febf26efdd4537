//! Point-in-polygon assignment of coordinates to administrative units
//!
//! Boundaries are scanned in input order and the first one containing the
//! point wins. Points on a shared edge therefore resolve to whichever
//! boundary comes first; overlapping polygons resolve the same way.

use geo::{BoundingRect, Coord, Intersects, MultiPolygon, Rect};

use crate::types::{AdminBoundary, UnitId};

struct IndexedBoundary {
    id: UnitId,
    bbox: Option<Rect<f64>>,
    geometry: MultiPolygon<f64>,
}

/// Immutable lookup from coordinate to containing administrative unit
pub struct AdminMatcher {
    boundaries: Vec<IndexedBoundary>,
}

impl AdminMatcher {
    pub fn new(boundaries: &[AdminBoundary]) -> Self {
        let boundaries = boundaries
            .iter()
            .map(|b| IndexedBoundary {
                id: b.id.clone(),
                bbox: b.geometry.bounding_rect(),
                geometry: b.geometry.clone(),
            })
            .collect();
        Self { boundaries }
    }

    /// Unit containing `coord`, boundary inclusive, or `None`
    pub fn locate(&self, coord: Coord<f64>) -> Option<&UnitId> {
        self.boundaries
            .iter()
            .filter(|b| b.bbox.is_some_and(|r| r.intersects(&coord)))
            .find(|b| b.geometry.intersects(&coord))
            .map(|b| &b.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, LineString, Polygon};

    fn square(id: &str, x0: f64, y0: f64, size: f64) -> AdminBoundary {
        AdminBoundary {
            id: UnitId::from(id),
            name: id.to_string(),
            geometry: MultiPolygon(vec![polygon![
                (x: x0, y: y0),
                (x: x0 + size, y: y0),
                (x: x0 + size, y: y0 + size),
                (x: x0, y: y0 + size),
            ]]),
        }
    }

    #[test]
    fn test_locate_inside_and_outside() {
        let matcher = AdminMatcher::new(&[square("A", 0.0, 0.0, 1.0), square("B", 1.0, 0.0, 1.0)]);
        assert_eq!(
            matcher.locate(Coord { x: 0.5, y: 0.5 }),
            Some(&UnitId::from("A"))
        );
        assert_eq!(
            matcher.locate(Coord { x: 1.5, y: 0.5 }),
            Some(&UnitId::from("B"))
        );
        assert_eq!(matcher.locate(Coord { x: 5.0, y: 5.0 }), None);
    }

    #[test]
    fn test_shared_edge_goes_to_first_boundary() {
        let matcher = AdminMatcher::new(&[square("A", 0.0, 0.0, 1.0), square("B", 1.0, 0.0, 1.0)]);
        assert_eq!(
            matcher.locate(Coord { x: 1.0, y: 0.5 }),
            Some(&UnitId::from("A"))
        );

        let reversed =
            AdminMatcher::new(&[square("B", 1.0, 0.0, 1.0), square("A", 0.0, 0.0, 1.0)]);
        assert_eq!(
            reversed.locate(Coord { x: 1.0, y: 0.5 }),
            Some(&UnitId::from("B"))
        );
    }

    #[test]
    fn test_hole_is_outside() {
        let exterior = LineString::from(vec![(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0)]);
        let hole = LineString::from(vec![(1.0, 1.0), (3.0, 1.0), (3.0, 3.0), (1.0, 3.0)]);
        let donut = AdminBoundary {
            id: UnitId::from("D"),
            name: "Donut".to_string(),
            geometry: MultiPolygon(vec![Polygon::new(exterior, vec![hole])]),
        };
        let matcher = AdminMatcher::new(&[donut]);
        assert_eq!(matcher.locate(Coord { x: 2.0, y: 2.0 }), None);
        assert_eq!(
            matcher.locate(Coord { x: 0.5, y: 2.0 }),
            Some(&UnitId::from("D"))
        );
    }

    #[test]
    fn test_empty_matcher() {
        let matcher = AdminMatcher::new(&[]);
        assert_eq!(matcher.locate(Coord { x: 0.0, y: 0.0 }), None);
    }
}
