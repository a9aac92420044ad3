// src/geometry.rs
//
// Click zone geometry for section segments. A click counts as a crossing of
// a segment when it falls inside an ellipse laid over the segment: centered
// at the midpoint, major axis along the segment (half its length), minor
// axis scaled by a configurable height ratio.

use crate::types::Coordinate;

/// The elliptic click zone of a single section segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentEllipse {
    pub start: Coordinate,
    pub end: Coordinate,
    /// Minor axis as a fraction of the major axis.
    pub relative_height: f64,
}

impl SegmentEllipse {
    pub fn new(start: Coordinate, end: Coordinate, relative_height: f64) -> Self {
        Self {
            start,
            end,
            relative_height,
        }
    }

    /// Whether `coordinate` lies inside the ellipse.
    ///
    /// The pixel y axis grows downward while the ellipse math assumes an
    /// upward y axis, so the y offset is mirrored before rotating into the
    /// ellipse frame. A zero-length segment contains nothing.
    pub fn contains(&self, coordinate: Coordinate) -> bool {
        let (sx, sy) = (self.start.x as f64, self.start.y as f64);
        let (ex, ey) = (self.end.x as f64, self.end.y as f64);

        let a = ((ex - sx).powi(2) + (ey - sy).powi(2)).sqrt() / 2.0;
        let b = a * self.relative_height;
        if a == 0.0 || b == 0.0 {
            return false;
        }

        let center_x = (sx + ex) / 2.0;
        let center_y = (sy + ey) / 2.0;
        let delta_x = coordinate.x as f64 - center_x;
        // Mirror: frame y grows downward.
        let delta_y = -(coordinate.y as f64) + center_y;
        let radian = (ey - sy).atan2(sx - ex);

        let along = delta_x * radian.cos() + delta_y * radian.sin();
        let across = delta_x * radian.sin() - delta_y * radian.cos();
        along.powi(2) / a.powi(2) + across.powi(2) / b.powi(2) <= 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(x: i32, y: i32) -> Coordinate {
        Coordinate::new(x, y)
    }

    /// Containment computed without the rotation shortcut: sample the
    /// ellipse as the set of points whose distance sum to the two foci is
    /// within 2a.
    fn brute_force_contains(ellipse: &SegmentEllipse, c: Coordinate) -> bool {
        let (sx, sy) = (ellipse.start.x as f64, ellipse.start.y as f64);
        let (ex, ey) = (ellipse.end.x as f64, ellipse.end.y as f64);
        let a = ((ex - sx).powi(2) + (ey - sy).powi(2)).sqrt() / 2.0;
        let b = a * ellipse.relative_height;
        if a == 0.0 || b == 0.0 {
            return false;
        }
        // Foci lie on the segment itself (major axis along the segment).
        let f = (a.powi(2) - b.powi(2)).max(0.0).sqrt();
        let cx = (sx + ex) / 2.0;
        let cy = (sy + ey) / 2.0;
        let ux = (ex - sx) / (2.0 * a);
        let uy = (ey - sy) / (2.0 * a);
        let (f1x, f1y) = (cx + f * ux, cy + f * uy);
        let (f2x, f2y) = (cx - f * ux, cy - f * uy);
        let (px, py) = (c.x as f64, c.y as f64);
        let d1 = ((px - f1x).powi(2) + (py - f1y).powi(2)).sqrt();
        let d2 = ((px - f2x).powi(2) + (py - f2y).powi(2)).sqrt();
        d1 + d2 <= 2.0 * a
    }

    #[test]
    fn test_point_on_center_is_contained() {
        let e = SegmentEllipse::new(coord(0, 0), coord(100, 0), 0.15);
        assert!(e.contains(coord(50, 0)));
    }

    #[test]
    fn test_point_near_segment_is_contained() {
        let e = SegmentEllipse::new(coord(0, 0), coord(100, 0), 0.15);
        assert!(e.contains(coord(50, 5)));
        assert!(e.contains(coord(50, -5)));
    }

    #[test]
    fn test_point_beyond_minor_axis_is_outside() {
        // b = 50 * 0.15 = 7.5 at the midpoint
        let e = SegmentEllipse::new(coord(0, 0), coord(100, 0), 0.15);
        assert!(!e.contains(coord(50, 8)));
        assert!(!e.contains(coord(50, -8)));
    }

    #[test]
    fn test_point_beyond_endpoints_is_outside() {
        let e = SegmentEllipse::new(coord(0, 0), coord(100, 0), 0.15);
        assert!(!e.contains(coord(101, 0)));
        assert!(!e.contains(coord(-1, 0)));
    }

    #[test]
    fn test_endpoints_are_contained() {
        let e = SegmentEllipse::new(coord(0, 0), coord(100, 0), 0.15);
        assert!(e.contains(coord(0, 0)));
        assert!(e.contains(coord(100, 0)));
    }

    #[test]
    fn test_diagonal_segment() {
        let e = SegmentEllipse::new(coord(0, 0), coord(100, 100), 0.2);
        assert!(e.contains(coord(50, 50)));
        // Perpendicular offset larger than the minor axis
        assert!(!e.contains(coord(35, 65)));
        // Small perpendicular offset stays inside
        assert!(e.contains(coord(47, 53)));
    }

    #[test]
    fn test_zero_length_segment_contains_nothing() {
        let e = SegmentEllipse::new(coord(50, 50), coord(50, 50), 0.5);
        assert!(!e.contains(coord(50, 50)));
        assert!(!e.contains(coord(51, 50)));
    }

    #[test]
    fn test_matches_brute_force_on_grid() {
        let ellipses = [
            SegmentEllipse::new(coord(10, 20), coord(90, 40), 0.15),
            SegmentEllipse::new(coord(0, 0), coord(0, 80), 0.3),
            SegmentEllipse::new(coord(-40, 60), coord(70, -10), 0.5),
        ];
        for e in &ellipses {
            for x in (-60..120).step_by(3) {
                for y in (-60..120).step_by(3) {
                    let p = coord(x, y);
                    // Skip points right on the boundary where the two
                    // formulations may disagree by a float ulp.
                    if on_boundary(e, p) {
                        continue;
                    }
                    assert_eq!(
                        e.contains(p),
                        brute_force_contains(e, p),
                        "ellipse {:?} point {:?}",
                        e,
                        p
                    );
                }
            }
        }
    }

    fn on_boundary(e: &SegmentEllipse, c: Coordinate) -> bool {
        let (sx, sy) = (e.start.x as f64, e.start.y as f64);
        let (ex, ey) = (e.end.x as f64, e.end.y as f64);
        let a = ((ex - sx).powi(2) + (ey - sy).powi(2)).sqrt() / 2.0;
        let b = a * e.relative_height;
        let cx = (sx + ex) / 2.0;
        let cy = (sy + ey) / 2.0;
        let dx = c.x as f64 - cx;
        let dy = -(c.y as f64) + cy;
        let r = (ey - sy).atan2(sx - ex);
        let along = dx * r.cos() + dy * r.sin();
        let across = dx * r.sin() - dy * r.cos();
        let value = along.powi(2) / a.powi(2) + across.powi(2) / b.powi(2);
        (value - 1.0).abs() < 1e-6
    }

    #[test]
    fn test_invariant_under_endpoint_swap() {
        let forward = SegmentEllipse::new(coord(10, 20), coord(90, 40), 0.25);
        let backward = SegmentEllipse::new(coord(90, 40), coord(10, 20), 0.25);
        for x in (-20..120).step_by(5) {
            for y in (-20..90).step_by(5) {
                let p = coord(x, y);
                assert_eq!(forward.contains(p), backward.contains(p), "point {:?}", p);
            }
        }
    }
}
