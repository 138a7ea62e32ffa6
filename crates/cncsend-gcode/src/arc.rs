//! Arc discretization
//!
//! Turns a G2/G3 move (start, end, offset-to-center) into short line
//! segments for length accounting and preview. Step count scales with both
//! sweep angle and radius so chordal error stays bounded without flooding
//! small arcs with segments.

use cncsend_core::{Point3, Segment};
use serde::{Deserialize, Serialize};

use crate::modal::Plane;

/// Arc winding direction (G2 = clockwise, G3 = counter-clockwise).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArcDirection {
    Clockwise,
    CounterClockwise,
}

/// Tunable step-count thresholds.
///
/// Invariant: resolution increases with radius, never decreases. The radius
/// buckets are a heuristic carried over from field use, not a derived
/// tolerance bound, which is why they stay configurable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArcTessellation {
    /// Arcs with radius below this use `coarse_step_deg`
    pub fine_radius: f64,
    /// Arcs with radius below this (but above `fine_radius`) use `medium_step_deg`
    pub medium_radius: f64,
    /// Degrees of sweep per step for small-radius arcs
    pub coarse_step_deg: f64,
    /// Degrees of sweep per step for medium-radius arcs
    pub medium_step_deg: f64,
    /// Degrees of sweep per step for large-radius arcs
    pub fine_step_deg: f64,
}

impl Default for ArcTessellation {
    fn default() -> Self {
        Self {
            fine_radius: 10.0,
            medium_radius: 50.0,
            coarse_step_deg: 10.0,
            medium_step_deg: 5.0,
            fine_step_deg: 2.0,
        }
    }
}

impl ArcTessellation {
    /// Number of rotation steps for a sweep of `angle_deg` at `radius`.
    /// Always at least 1.
    pub fn step_count(&self, radius: f64, angle_deg: f64) -> usize {
        let per_step = if radius < self.fine_radius {
            self.coarse_step_deg
        } else if radius < self.medium_radius {
            self.medium_step_deg
        } else {
            self.fine_step_deg
        };
        ((angle_deg / per_step).ceil() as usize).max(1)
    }
}

/// Discretizes circular and helical moves into line segments.
#[derive(Debug, Clone, Default)]
pub struct ArcDiscretizer {
    tessellation: ArcTessellation,
}

impl ArcDiscretizer {
    pub fn new(tessellation: ArcTessellation) -> Self {
        Self { tessellation }
    }

    /// Discretize one arc.
    ///
    /// `center_offset` is the I/J/K vector from `start` to the arc center.
    /// Returns the arc length and the ordered segment list; the first point
    /// equals `start` and the last lands on `end` within rounding.
    ///
    /// Degenerate requests (zero radius or zero sweep, which includes the
    /// start==end full-circle form) produce a single zero-length segment
    /// instead of an error so a bad line never aborts a program load.
    pub fn discretize(
        &self,
        start: Point3,
        end: Point3,
        center_offset: Point3,
        direction: ArcDirection,
        plane: Plane,
    ) -> (f64, Vec<Segment>) {
        if plane != Plane::Xy {
            // The axis remapping for G18/G19 is not pinned down; fall back
            // to the XY math rather than guess.
            tracing::warn!(plane = plane.gcode(), "arc plane not fully supported, using XY math");
        }

        let center = start + center_offset;
        let v1 = (start - center).flattened();
        let v2 = (end - center).flattened();
        let radius = v1.length();

        let mut angle = v1.angle_to(&v2);

        // The unsigned angle is ambiguous between the short and long way
        // around; the winding of v1 x v2 against the commanded direction
        // picks the long arc.
        let cross = v1.cross_z(&v2);
        if (cross > 0.0 && direction == ArcDirection::Clockwise)
            || (cross < 0.0 && direction == ArcDirection::CounterClockwise)
        {
            angle = std::f64::consts::TAU - angle;
        }

        if radius < f64::EPSILON || angle <= 0.0 {
            tracing::warn!(radius, angle, "degenerate arc treated as zero-length segment");
            return (0.0, vec![[start, end]]);
        }

        let path_length = angle * radius;

        let steps = self.tessellation.step_count(radius, angle.to_degrees());
        let sweep_sign = match direction {
            ArcDirection::Clockwise => -1.0,
            ArcDirection::CounterClockwise => 1.0,
        };
        let theta_step = sweep_sign * angle / steps as f64;
        let z_step = (end.z - start.z) / steps as f64;

        let mut points = Vec::with_capacity(steps + 1);
        points.push(start);
        for i in 1..=steps {
            let rotated = v1.rotated_z(theta_step * i as f64);
            points.push(Point3::new(
                center.x + rotated.x,
                center.y + rotated.y,
                start.z + z_step * i as f64,
            ));
        }

        let segments = points.windows(2).map(|w| [w[0], w[1]]).collect();
        (path_length, segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn quarter_cw() -> (f64, Vec<Segment>) {
        // (10,0) -> (0,-10) clockwise around the origin
        ArcDiscretizer::default().discretize(
            Point3::new(10.0, 0.0, 0.0),
            Point3::new(0.0, -10.0, 0.0),
            Point3::new(-10.0, 0.0, 0.0),
            ArcDirection::Clockwise,
            Plane::Xy,
        )
    }

    #[test]
    fn quarter_arc_length() {
        let (length, _) = quarter_cw();
        assert!((length - FRAC_PI_2 * 10.0).abs() < 1e-9);
    }

    #[test]
    fn endpoints_equal_start_and_end() {
        let (_, segments) = quarter_cw();
        let first = segments.first().unwrap()[0];
        let last = segments.last().unwrap()[1];
        assert!((first.x - 10.0).abs() < 1e-9 && first.y.abs() < 1e-9);
        assert!(last.x.abs() < 1e-9 && (last.y + 10.0).abs() < 1e-9);
    }

    #[test]
    fn long_way_around_when_winding_disagrees() {
        // (10,0) -> (0,10): the short way is CCW, so commanding CW must
        // take the 270 degree path.
        let (length, _) = ArcDiscretizer::default().discretize(
            Point3::new(10.0, 0.0, 0.0),
            Point3::new(0.0, 10.0, 0.0),
            Point3::new(-10.0, 0.0, 0.0),
            ArcDirection::Clockwise,
            Plane::Xy,
        );
        assert!((length - 1.5 * PI * 10.0).abs() < 1e-9);
    }

    #[test]
    fn chord_sum_converges_to_arc_length() {
        let (length, segments) = quarter_cw();
        let chord_sum: f64 = segments.iter().map(|s| s[0].distance_to(&s[1])).sum();
        assert!(chord_sum < length);
        assert!((length - chord_sum) / length < 0.01);
    }

    #[test]
    fn helical_z_interpolation() {
        let (_, segments) = ArcDiscretizer::default().discretize(
            Point3::new(10.0, 0.0, 0.0),
            Point3::new(0.0, -10.0, -4.0),
            Point3::new(-10.0, 0.0, 0.0),
            ArcDirection::Clockwise,
            Plane::Xy,
        );
        let last = segments.last().unwrap()[1];
        assert!((last.z + 4.0).abs() < 1e-9);
        // Z must descend monotonically along the helix
        let mut prev_z = segments[0][0].z;
        for seg in &segments {
            assert!(seg[1].z <= prev_z + 1e-12);
            prev_z = seg[1].z;
        }
    }

    #[test]
    fn zero_radius_is_degenerate() {
        let (length, segments) = ArcDiscretizer::default().discretize(
            Point3::new(5.0, 5.0, 0.0),
            Point3::new(5.0, 5.0, 0.0),
            Point3::ZERO,
            ArcDirection::Clockwise,
            Plane::Xy,
        );
        assert_eq!(length, 0.0);
        assert_eq!(segments.len(), 1);
    }

    #[test]
    fn resolution_increases_with_radius() {
        let t = ArcTessellation::default();
        let small = t.step_count(5.0, 90.0);
        let medium = t.step_count(25.0, 90.0);
        let large = t.step_count(100.0, 90.0);
        assert!(small <= medium && medium <= large);
        assert_eq!(small, 9);
        assert_eq!(medium, 18);
        assert_eq!(large, 45);
    }
}
