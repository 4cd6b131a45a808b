//! Nearest-neighbour matching of a probe descriptor against the enrolled
//! population.

use crate::types::{Descriptor, Enrollment};

/// Maximum Euclidean distance for two descriptors to be the same identity.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;

/// Descriptor length produced by the reference extractor.
pub const DEFAULT_DESCRIPTOR_DIM: usize = 128;

/// Best candidate found by a scan.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub enrollment: &'a Enrollment,
    pub distance: f32,
}

/// Result of matching a probe descriptor against a population.
#[derive(Debug, Clone, Default)]
pub struct MatchResult<'a> {
    /// Closest enrollment strictly under the threshold, if any.
    pub best: Option<Candidate<'a>>,
    /// Smallest distance among compared enrollments, under the threshold or not.
    pub closest: Option<f32>,
    /// Number of enrollments actually compared.
    pub compared: usize,
    /// Enrollments skipped because their stored descriptor was unusable.
    pub skipped: Vec<&'a str>,
}

impl<'a> MatchResult<'a> {
    pub fn into_match(self) -> Option<(&'a Enrollment, f32)> {
        self.best.map(|c| (c.enrollment, c.distance))
    }
}

/// Strategy for comparing a probe descriptor against the enrolled population.
///
/// Implementations must return no match for an empty population and must
/// never select a candidate at or beyond their threshold.
pub trait Matcher {
    fn compare<'a>(&self, probe: &Descriptor, population: &'a [Enrollment]) -> MatchResult<'a>;
}

/// Linear-scan Euclidean matcher.
///
/// Iterates the population in the given order and keeps the first candidate
/// with the minimal distance, so ties resolve to the earliest enrollment.
#[derive(Debug, Clone, Copy)]
pub struct EuclideanMatcher {
    threshold: f32,
    dimension: Option<usize>,
}

impl Default for EuclideanMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_MATCH_THRESHOLD, Some(DEFAULT_DESCRIPTOR_DIM))
    }
}

impl EuclideanMatcher {
    /// `dimension` pins the expected descriptor length; with `None` the
    /// population's own descriptors define it.
    pub fn new(threshold: f32, dimension: Option<usize>) -> Self {
        Self {
            threshold,
            dimension,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    fn probe_fits(&self, probe: &Descriptor, population: &[Enrollment]) -> bool {
        if !probe.is_usable() {
            return false;
        }
        match self.dimension {
            Some(dim) => probe.len() == dim,
            // A probe no stored descriptor can be compared with is the probe's
            // fault, not the population's.
            None => {
                let mut usable = population
                    .iter()
                    .map(|e| &e.descriptor)
                    .filter(|d| d.is_usable())
                    .peekable();
                usable.peek().is_none() || usable.any(|d| d.len() == probe.len())
            }
        }
    }
}

impl Matcher for EuclideanMatcher {
    fn compare<'a>(&self, probe: &Descriptor, population: &'a [Enrollment]) -> MatchResult<'a> {
        let mut result = MatchResult::default();
        if !self.probe_fits(probe, population) {
            tracing::warn!(
                len = probe.len(),
                expected = ?self.dimension,
                "probe descriptor is unusable or of foreign dimensionality; no match"
            );
            return result;
        }

        for enrollment in population {
            let descriptor = &enrollment.descriptor;
            let distance = descriptor
                .is_usable()
                .then(|| probe.euclidean_distance(descriptor))
                .flatten();
            let Some(distance) = distance else {
                tracing::warn!(
                    id_number = %enrollment.id_number,
                    len = descriptor.len(),
                    expected = probe.len(),
                    finite = descriptor.values().iter().all(|v| v.is_finite()),
                    "skipping enrollment with malformed descriptor"
                );
                result.skipped.push(enrollment.id_number.as_str());
                continue;
            };
            result.compared += 1;
            result.closest = Some(result.closest.map_or(distance, |c| c.min(distance)));

            // Strict comparisons: the first minimum wins, the threshold itself
            // is excluded, NaN never passes.
            if distance.is_nan() || distance >= self.threshold {
                continue;
            }
            if result.best.map_or(true, |b| distance < b.distance) {
                result.best = Some(Candidate {
                    enrollment,
                    distance,
                });
            }
        }

        result
    }
}

/// Convenience wrapper returning just the match, as `(enrollment, distance)`.
pub fn match_probe<'a, M: Matcher>(
    matcher: &M,
    probe: &Descriptor,
    population: &'a [Enrollment],
) -> Option<(&'a Enrollment, f32)> {
    matcher.compare(probe, population).into_match()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Role, Status};
    use chrono::Utc;

    fn enrollment(id: &str, values: Vec<f32>) -> Enrollment {
        Enrollment {
            id_number: id.into(),
            name: format!("name-{id}"),
            role: Role::Student,
            status: Status::Active,
            descriptor: Descriptor::from_stored(values),
            visit_purpose: None,
            valid_until: None,
            email: None,
            registered_at: Utc::now(),
        }
    }

    fn matcher() -> EuclideanMatcher {
        EuclideanMatcher::new(DEFAULT_MATCH_THRESHOLD, None)
    }

    fn probe(values: Vec<f32>) -> Descriptor {
        Descriptor::new(values).unwrap()
    }

    #[test]
    fn test_empty_population_never_matches() {
        let result = matcher().compare(&probe(vec![1.0, 0.0]), &[]);
        assert!(result.best.is_none());
        assert_eq!(result.compared, 0);
    }

    #[test]
    fn test_self_match_has_zero_distance() {
        let population = vec![
            enrollment("A", vec![0.9, 0.1, 0.0]),
            enrollment("B", vec![0.1, 0.2, 0.3]),
            enrollment("C", vec![0.0, 0.0, 1.0]),
        ];
        let (found, distance) =
            match_probe(&matcher(), &population[1].descriptor.clone(), &population).unwrap();
        assert_eq!(found.id_number, "B");
        assert_eq!(distance, 0.0);
    }

    #[test]
    fn test_best_match_is_last_entry() {
        // All entries are compared; the closest one is at the end.
        let population = vec![
            enrollment("decoy1", vec![0.5, 0.0]),
            enrollment("decoy2", vec![0.0, 0.5]),
            enrollment("match", vec![0.05, 0.0]),
        ];
        let result = matcher().compare(&probe(vec![0.0, 0.0]), &population);
        assert_eq!(result.compared, 3);
        let best = result.best.unwrap();
        assert_eq!(best.enrollment.id_number, "match");
        assert!((best.distance - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_distance_equal_to_threshold_is_rejected() {
        let population = vec![enrollment("edge", vec![0.5, 0.0])];
        let m = EuclideanMatcher::new(0.5, None);
        assert!(m.compare(&probe(vec![0.0, 0.0]), &population).best.is_none());
    }

    #[test]
    fn test_distance_just_below_threshold_is_selected() {
        let population = vec![enrollment("near", vec![0.499, 0.0])];
        let m = EuclideanMatcher::new(0.5, None);
        let best = m.compare(&probe(vec![0.0, 0.0]), &population).best.unwrap();
        assert_eq!(best.enrollment.id_number, "near");
    }

    #[test]
    fn test_population_minimum_beyond_threshold_is_discarded() {
        let population = vec![
            enrollment("far1", vec![1.0, 0.0]),
            enrollment("far2", vec![0.0, 2.0]),
        ];
        let result = matcher().compare(&probe(vec![0.0, 0.0]), &population);
        assert!(result.best.is_none());
        assert_eq!(result.compared, 2);
    }

    #[test]
    fn test_ties_resolve_to_first_in_order() {
        let population = vec![
            enrollment("S1", vec![0.1, 0.0]),
            enrollment("S2", vec![0.0, 0.1]),
            enrollment("S3", vec![-0.1, 0.0]),
        ];
        let (found, _) = match_probe(&matcher(), &probe(vec![0.0, 0.0]), &population).unwrap();
        assert_eq!(found.id_number, "S1");
    }

    #[test]
    fn test_mismatched_descriptors_are_skipped_not_fatal() {
        let population = vec![
            enrollment("broken", vec![0.0, 0.0, 0.0]),
            enrollment("empty", vec![]),
            enrollment("ok", vec![0.1, 0.1]),
        ];
        let result = matcher().compare(&probe(vec![0.1, 0.1]), &population);
        assert_eq!(result.skipped, vec!["broken", "empty"]);
        assert_eq!(result.compared, 1);
        assert_eq!(result.best.unwrap().enrollment.id_number, "ok");
    }

    #[test]
    fn test_probe_with_wrong_dimension_yields_none() {
        let population = vec![enrollment("A", vec![0.0, 0.0])];
        let m = EuclideanMatcher::new(DEFAULT_MATCH_THRESHOLD, Some(128));
        let result = m.compare(&probe(vec![0.0, 0.0]), &population);
        assert!(result.best.is_none());
        assert_eq!(result.compared, 0);
    }

    #[test]
    fn test_non_finite_stored_descriptor_never_matches() {
        let population = vec![
            enrollment("NAN", vec![f32::NAN, 0.0]),
            enrollment("INF", vec![0.0, f32::INFINITY]),
        ];
        let result = matcher().compare(&probe(vec![5.0, 5.0]), &population);
        assert!(result.best.is_none());
        assert_eq!(result.skipped, vec!["NAN", "INF"]);
        assert_eq!(result.compared, 0);
        assert!(result.closest.is_none());
    }

    #[test]
    fn test_non_finite_entry_does_not_shadow_real_match() {
        let population = vec![
            enrollment("NAN", vec![f32::NAN, 0.0]),
            enrollment("ok", vec![0.1, 0.0]),
        ];
        let (found, _) = match_probe(&matcher(), &probe(vec![0.1, 0.0]), &population).unwrap();
        assert_eq!(found.id_number, "ok");
    }

    #[test]
    fn test_overflowing_distance_is_rejected() {
        let population = vec![enrollment("huge", vec![f32::MAX, f32::MAX])];
        let result = matcher().compare(&probe(vec![-f32::MAX, -f32::MAX]), &population);
        assert_eq!(result.compared, 1);
        assert!(result.best.is_none());
    }

    #[test]
    fn test_closest_reported_without_match() {
        let population = vec![
            enrollment("far1", vec![1.0, 0.0]),
            enrollment("far2", vec![0.0, 0.8]),
        ];
        let result = matcher().compare(&probe(vec![0.0, 0.0]), &population);
        assert!(result.best.is_none());
        assert!((result.closest.unwrap() - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_foreign_probe_does_not_blame_population() {
        let population = vec![
            enrollment("A", vec![0.0, 0.0]),
            enrollment("B", vec![1.0, 0.0]),
        ];
        let result = matcher().compare(&probe(vec![0.0, 0.0, 0.0]), &population);
        assert!(result.best.is_none());
        assert!(result.skipped.is_empty());
        assert_eq!(result.compared, 0);
    }

    #[test]
    fn test_default_matcher_uses_reference_constants() {
        let m = EuclideanMatcher::default();
        assert_eq!(m.threshold(), 0.6);
        let population = vec![enrollment("A", vec![0.0; 128])];
        let (found, distance) = match_probe(&m, &probe(vec![0.0; 128]), &population).unwrap();
        assert_eq!(found.id_number, "A");
        assert_eq!(distance, 0.0);
    }
}
