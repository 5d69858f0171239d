//! Neighborhood coverage
//!
//! A neighborhood counts as covered when at least one reading location, static
//! or mobile, lies strictly inside its polygon. Locations on an edge do not
//! count. Without a boundary dataset every figure is zero.

use geo::{Contains, Point};
use rayon::prelude::*;
use serde::Serialize;

use crate::boundaries::NeighborhoodSet;
use crate::records::{LocatedReading, MobileReading};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoverageStats {
    pub total: usize,
    pub covered: usize,
    pub uncovered: usize,
    pub percentage: f64,
    /// Sorted names of neighborhoods with no reading inside
    pub uncovered_names: Vec<String>,
}

/// Coverage of the neighborhood set by the given reading locations.
///
/// `static_data` must already be joined with sensor locations. Passing `None`
/// for `neighborhoods` is the degraded mode used when boundaries failed to load.
pub fn coverage_statistics(
    static_data: &[LocatedReading],
    mobile_data: &[MobileReading],
    neighborhoods: Option<&NeighborhoodSet>,
) -> CoverageStats {
    let Some(neighborhoods) = neighborhoods else {
        return CoverageStats::default();
    };

    let mut points: Vec<Point<f64>> = static_data
        .iter()
        .map(LocatedReading::location)
        .chain(mobile_data.iter().map(MobileReading::location))
        .collect();
    dedup_points(&mut points);

    let covered_flags: Vec<bool> = neighborhoods
        .neighborhoods
        .par_iter()
        .map(|n| points.iter().any(|p| n.geometry.contains(p)))
        .collect();

    let total = neighborhoods.len();
    let covered = covered_flags.iter().filter(|c| **c).count();

    let mut uncovered_names: Vec<String> = neighborhoods
        .neighborhoods
        .iter()
        .zip(&covered_flags)
        .filter(|(_, covered)| !**covered)
        .map(|(n, _)| n.name.clone())
        .collect();
    uncovered_names.sort();

    CoverageStats {
        total,
        covered,
        uncovered: total - covered,
        percentage: coverage_percentage(covered, total),
        uncovered_names,
    }
}

/// `covered / total * 100`, or 0 when there is nothing to cover.
pub fn coverage_percentage(covered: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        covered as f64 / total as f64 * 100.0
    }
}

// Readings repeat the same few locations many times over
fn dedup_points(points: &mut Vec<Point<f64>>) {
    points.sort_by(|a, b| a.x().total_cmp(&b.x()).then(a.y().total_cmp(&b.y())));
    points.dedup_by(|a, b| a.x() == b.x() && a.y() == b.y());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundaries::{fixtures::TWO_SQUARES, parse_geojson};
    use crate::records::fixtures::*;
    use crate::records::join_static_locations;

    fn squares() -> NeighborhoodSet {
        parse_geojson(TWO_SQUARES, "Nbrhood").unwrap()
    }

    #[test]
    fn test_no_boundaries_is_all_zero() {
        let mobile = vec![mobile_reading("10", ts(6, 0, 0), 5.0, 0.5, 0.5)];
        let stats = coverage_statistics(&[], &mobile, None);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.covered, 0);
        assert_eq!(stats.uncovered, 0);
        assert_eq!(stats.percentage, 0.0);
        assert!(stats.uncovered_names.is_empty());
    }

    #[test]
    fn test_empty_neighborhood_set_has_zero_percentage() {
        let stats = coverage_statistics(&[], &[], Some(&NeighborhoodSet::default()));
        assert_eq!(stats, CoverageStats::default());
    }

    #[test]
    fn test_static_point_covers_one_neighborhood() {
        // x = longitude, y = latitude
        let sensors = vec![sensor("1", 0.5, 0.5)];
        let readings = vec![static_reading("1", ts(6, 0, 0), 12.0)];
        let located = join_static_locations(&readings, &sensors);

        let stats = coverage_statistics(&located, &[], Some(&squares()));
        assert_eq!(stats.total, 2);
        assert_eq!(stats.covered, 1);
        assert_eq!(stats.uncovered, 1);
        assert_eq!(stats.percentage, 50.0);
        assert_eq!(stats.uncovered_names, vec!["East".to_string()]);
    }

    #[test]
    fn test_mobile_points_cover_everything() {
        let mobile = vec![
            mobile_reading("10", ts(6, 0, 0), 5.0, 0.5, 0.5),
            mobile_reading("10", ts(6, 0, 1), 5.0, 0.5, 1.5),
        ];
        let stats = coverage_statistics(&[], &mobile, Some(&squares()));
        assert_eq!(stats.covered, 2);
        assert_eq!(stats.percentage, 100.0);
        assert!(stats.uncovered_names.is_empty());
    }

    #[test]
    fn test_point_on_shared_edge_covers_nothing() {
        let mobile = vec![mobile_reading("10", ts(6, 0, 0), 5.0, 0.5, 1.0)];
        let stats = coverage_statistics(&[], &mobile, Some(&squares()));
        assert_eq!(stats.covered, 0);
        assert_eq!(stats.uncovered_names, vec!["East".to_string(), "West".to_string()]);
    }
}
