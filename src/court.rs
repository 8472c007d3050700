//! Court boundary and the in/out test.

use serde::{Deserialize, Serialize};

use crate::geometry::NormalizedPoint;

/// Guards the edge-intersection division on near-horizontal edges
const EDGE_EPSILON: f64 = 1e-6;

/// Fixed court polygon in normalized frame coordinates.
///
/// The last vertex connects back to the first. With fewer than three
/// vertices there is no area, so nothing is ever contained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourtModel {
    boundary: Vec<NormalizedPoint>,
}

impl CourtModel {
    pub fn new(boundary: Vec<NormalizedPoint>) -> Self {
        Self { boundary }
    }

    /// Singles court seen from a static elevated camera behind the baseline.
    pub fn default_singles() -> Self {
        Self {
            boundary: vec![
                NormalizedPoint::new(0.16, 0.20),
                NormalizedPoint::new(0.84, 0.20),
                NormalizedPoint::new(0.92, 0.88),
                NormalizedPoint::new(0.08, 0.88),
            ],
        }
    }

    pub fn boundary(&self) -> &[NormalizedPoint] {
        &self.boundary
    }

    /// True when the boundary describes an area.
    pub fn is_valid(&self) -> bool {
        self.boundary.len() >= 3
    }

    /// Even-odd ray cast: count boundary edges crossed by a ray going right.
    pub fn contains(&self, point: NormalizedPoint) -> bool {
        if !self.is_valid() {
            return false;
        }

        let polygon = &self.boundary;
        let mut inside = false;
        let mut j = polygon.len() - 1;

        for i in 0..polygon.len() {
            let pi = polygon[i];
            let pj = polygon[j];

            let straddles = (pi.y > point.y) != (pj.y > point.y);
            if straddles {
                let x_intersect =
                    (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y + EDGE_EPSILON) + pi.x;
                if point.x < x_intersect {
                    inside = !inside;
                }
            }
            j = i;
        }

        inside
    }
}

impl Default for CourtModel {
    fn default() -> Self {
        Self::default_singles()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_point_inside_boundary() {
        let court = CourtModel::default_singles();
        assert!(court.contains(NormalizedPoint::new(0.5, 0.5)));
    }

    #[test]
    fn test_does_not_contain_point_outside_boundary() {
        let court = CourtModel::default_singles();
        assert!(!court.contains(NormalizedPoint::new(0.02, 0.5)));
        assert!(!court.contains(NormalizedPoint::new(0.5, 0.1)));
        assert!(!court.contains(NormalizedPoint::new(0.5, 0.95)));
    }

    #[test]
    fn test_trapezoid_sides() {
        let court = CourtModel::default_singles();
        // Near the top the court is narrower than near the bottom
        assert!(!court.contains(NormalizedPoint::new(0.12, 0.25)));
        assert!(court.contains(NormalizedPoint::new(0.12, 0.80)));
    }

    #[test]
    fn test_rotation_of_vertices_does_not_matter() {
        let base = CourtModel::default_singles();
        let mut rotated = base.boundary().to_vec();
        rotated.rotate_left(2);
        let rotated = CourtModel::new(rotated);

        for y in 0..20 {
            for x in 0..20 {
                let p = NormalizedPoint::new(x as f64 * 0.05 + 0.01, y as f64 * 0.05 + 0.01);
                assert_eq!(base.contains(p), rotated.contains(p), "{:?}", p);
            }
        }
    }

    #[test]
    fn test_degenerate_boundary_contains_nothing() {
        let court = CourtModel::new(vec![
            NormalizedPoint::new(0.0, 0.0),
            NormalizedPoint::new(1.0, 1.0),
        ]);
        assert!(!court.is_valid());
        assert!(!court.contains(NormalizedPoint::new(0.5, 0.5)));
        assert!(!CourtModel::new(Vec::new()).contains(NormalizedPoint::new(0.5, 0.5)));
    }
}
