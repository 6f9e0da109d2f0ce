// src/lane_assignment.rs
//
// Pure lane-index geometry. Given the ordered lane-boundary polylines of a
// scene and the two ground-contact corners of an actor, decide which lane the
// actor occupies.
//
//         line idx
//  lane idx   0   lane idx   1       2
//     -1      |      0       |   1   |   N (right overflow)
//        *****|*****         |       |
//       *     |   *          |       |
//      *      |  *           |       |
//     ********|**            |       |
//
// Interior lane k is the region between boundary k and boundary k+1. A
// footprint entirely left of every boundary resolves to -1; entirely right of
// every boundary resolves to N (the boundary count). Straddling cases are
// settled by the tie-breaks below.

use crate::types::{Footprint, LaneBoundary, Point};
use tracing::warn;

/// Assign a lane index to a footprint.
///
/// Boundaries must be sorted left-to-right and non-crossing within the image.
/// An empty boundary set means an undivided road: everything is lane 0.
/// Returns `None` only for malformed input (a boundary with no samples, or a
/// boundary layout the tie-breaks cannot order), which callers treat as an
/// input-contract violation for the whole image.
pub fn assign_lane(footprint: Footprint, boundaries: &[LaneBoundary]) -> Option<i32> {
    if boundaries.is_empty() {
        return Some(0);
    }

    let left = footprint.left_bottom;
    let right = footprint.right_bottom;

    // Scan left-to-right: first boundary the left corner is left of.
    let mut right_bound: Option<(i32, Point)> = None;
    for (idx, boundary) in boundaries.iter().enumerate() {
        let anchor = anchor_at_height(boundary, left)?;
        if left.x <= anchor.x {
            right_bound = Some((idx as i32, anchor));
            break;
        }
    }
    let (right_bound, anchor) = match right_bound {
        Some(found) => found,
        // Entirely right of the rightmost boundary.
        None => return Some(boundaries.len() as i32),
    };

    // Scan right-to-left: first boundary the right corner is right of.
    let mut left_bound: Option<i32> = None;
    for (idx, boundary) in boundaries.iter().enumerate().rev() {
        let anchor = anchor_at_height(boundary, right)?;
        if right.x >= anchor.x {
            left_bound = Some(idx as i32);
            break;
        }
    }
    let left_bound = match left_bound {
        Some(found) => found,
        // Entirely left of the leftmost boundary.
        None => return Some(-1),
    };

    if right_bound == left_bound {
        // Both corners resolve to the same boundary: the footprint straddles
        // exactly one line. Whichever side reaches further down owns it.
        let left_dist = anchor.y - left.y;
        let right_dist = right.y - anchor.y;
        if left_dist > right_dist {
            Some(right_bound - 1)
        } else {
            Some(right_bound)
        }
    } else if left_bound - right_bound == 1 {
        // Footprint covers one full lane, both of its boundaries included.
        Some(right_bound)
    } else if right_bound - left_bound == 1 {
        // Footprint sits inside a single lane.
        Some(left_bound)
    } else if left_bound - right_bound > 1 {
        // Wider than one lane. Approximation: treat as centered one lane
        // right of the rightmost boundary it clears.
        Some(right_bound + 1)
    } else {
        warn!(
            "cannot order boundary indices (right_bound={}, left_bound={})",
            right_bound, left_bound
        );
        None
    }
}

/// Anchor sample of a boundary for a query point: the first sample (scanning
/// bottom-up, i.e. by decreasing y) at or above the query height. Falls back
/// to the last scanned sample when the polyline ends above the query.
fn anchor_at_height(boundary: &LaneBoundary, query: Point) -> Option<Point> {
    let mut last = None;
    for pt in &boundary.points {
        last = Some(*pt);
        if pt.y <= query.y {
            return last;
        }
    }
    match last {
        Some(pt) => {
            warn!(
                "no boundary sample at or below y={:.1}; comparing against last sample ({:.1}, {:.1})",
                query.y, pt.x, pt.y
            );
            Some(pt)
        }
        None => {
            warn!("boundary polyline has no samples");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertical_line(x: f32) -> LaneBoundary {
        // Bottom-first sample order: y decreasing.
        LaneBoundary {
            points: vec![
                Point::new(x, 720.0),
                Point::new(x, 550.0),
                Point::new(x, 400.0),
            ],
        }
    }

    fn footprint(x1: f32, x2: f32, y: f32) -> Footprint {
        Footprint {
            left_bottom: Point::new(x1, y),
            right_bottom: Point::new(x2, y),
        }
    }

    #[test]
    fn no_boundaries_means_single_lane() {
        assert_eq!(assign_lane(footprint(10.0, 50.0, 700.0), &[]), Some(0));
        assert_eq!(assign_lane(footprint(800.0, 890.0, 100.0), &[]), Some(0));
    }

    #[test]
    fn entirely_left_of_all_boundaries() {
        let lines = vec![vertical_line(300.0), vertical_line(600.0)];
        assert_eq!(assign_lane(footprint(50.0, 150.0, 700.0), &lines), Some(-1));
    }

    #[test]
    fn entirely_right_of_all_boundaries() {
        let lines = vec![vertical_line(300.0), vertical_line(600.0)];
        assert_eq!(
            assign_lane(footprint(700.0, 850.0, 700.0), &lines),
            Some(2)
        );
    }

    #[test]
    fn inside_a_lane_resolves_to_lower_adjacent_index() {
        let lines = vec![
            vertical_line(100.0),
            vertical_line(300.0),
            vertical_line(600.0),
        ];
        // Between boundaries 1 and 2: corners resolve to adjacent bounds.
        assert_eq!(
            assign_lane(footprint(405.0, 495.0, 700.0), &lines),
            Some(1)
        );
        // Between boundaries 0 and 1.
        assert_eq!(
            assign_lane(footprint(150.0, 250.0, 700.0), &lines),
            Some(0)
        );
    }

    #[test]
    fn straddling_one_boundary_breaks_tie_by_anchor_distance() {
        // Slanted boundary so the anchor sits below the footprint line and
        // the vertical distances differ.
        let slanted = LaneBoundary {
            points: vec![
                Point::new(300.0, 720.0),
                Point::new(320.0, 600.0),
                Point::new(340.0, 400.0),
            ],
        };
        let lines = vec![slanted, vertical_line(600.0)];

        // Anchor for y=650 is (320, 600): left_dist = 600 - 650 = -50,
        // right_dist = 650 - 600 = 50. Right side reaches further down, so
        // the actor belongs right of the boundary.
        assert_eq!(
            assign_lane(footprint(250.0, 400.0, 650.0), &lines),
            Some(0)
        );

        // At y=500 the anchor is (340, 400): left_dist = -100 beats nothing;
        // right_dist = 100, still resolves right.
        assert_eq!(
            assign_lane(footprint(260.0, 420.0, 500.0), &lines),
            Some(0)
        );
    }

    #[test]
    fn straddling_resolves_left_when_anchor_is_below() {
        // Anchor below the footprint line makes left_dist positive and
        // right_dist negative, pushing the actor into the left lane.
        let lines = vec![vertical_line(300.0), vertical_line(600.0)];
        // Footprint above the topmost sample (y=300 < 400): fallback anchor
        // is the last sample at y=400. left_dist = 100 > right_dist = -100.
        assert_eq!(
            assign_lane(footprint(250.0, 350.0, 300.0), &lines),
            Some(-1)
        );
    }

    #[test]
    fn footprint_covering_one_full_lane() {
        let lines = vec![
            vertical_line(100.0),
            vertical_line(300.0),
            vertical_line(600.0),
        ];
        // Left corner left of boundary 1, right corner right of boundary 2:
        // the actor covers the whole middle lane.
        assert_eq!(
            assign_lane(footprint(250.0, 650.0, 700.0), &lines),
            Some(1)
        );
    }

    #[test]
    fn footprint_spanning_many_boundaries_uses_plus_one_heuristic() {
        // Known approximation: a footprint clearing more than one boundary
        // is treated as centered one lane right of the rightmost boundary
        // its left corner clears.
        let lines = vec![
            vertical_line(100.0),
            vertical_line(300.0),
            vertical_line(600.0),
            vertical_line(800.0),
        ];
        // Left corner left of boundary 0, right corner right of boundary 2.
        assert_eq!(assign_lane(footprint(50.0, 700.0, 700.0), &lines), Some(1));
    }

    #[test]
    fn malformed_boundary_yields_none() {
        let lines = vec![LaneBoundary { points: vec![] }];
        assert_eq!(assign_lane(footprint(100.0, 200.0, 700.0), &lines), None);
    }
}
