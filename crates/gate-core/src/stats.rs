//! Population summaries for the operator dashboard.

use serde::Serialize;

use crate::types::{Enrollment, Role, Status};

/// Enrollment counts per role and per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrollmentStats {
    pub total: usize,
    pub students: usize,
    pub lecturers: usize,
    pub staff: usize,
    pub active: usize,
    pub graduates: usize,
    pub suspended: usize,
    pub discontinued: usize,
    pub visitors: usize,
}

impl EnrollmentStats {
    pub fn from_population(population: &[Enrollment]) -> Self {
        population.iter().fold(Self::default(), |mut stats, e| {
            stats.total += 1;
            match e.role {
                Role::Student => stats.students += 1,
                Role::Lecturer => stats.lecturers += 1,
                Role::Staff => stats.staff += 1,
            }
            match e.status {
                Status::Active => stats.active += 1,
                Status::Graduate => stats.graduates += 1,
                Status::Suspended => stats.suspended += 1,
                Status::Discontinued => stats.discontinued += 1,
                Status::Visitor => stats.visitors += 1,
            }
            stats
        })
    }
}

/// Sort enrollments newest registration first, as the dashboard lists them.
pub fn newest_first(population: &mut [Enrollment]) {
    population.sort_by(|a, b| {
        b.registered_at
            .cmp(&a.registered_at)
            .then_with(|| a.id_number.cmp(&b.id_number))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Descriptor;
    use chrono::{Duration, Utc};

    fn person(id: &str, role: Role, status: Status, age_days: i64) -> Enrollment {
        Enrollment {
            id_number: id.into(),
            name: id.into(),
            role,
            status,
            descriptor: Descriptor::from_stored(vec![0.0]),
            visit_purpose: None,
            valid_until: None,
            email: None,
            registered_at: Utc::now() - Duration::days(age_days),
        }
    }

    #[test]
    fn test_counts_by_role_and_status() {
        let population = vec![
            person("S1", Role::Student, Status::Active, 1),
            person("S2", Role::Student, Status::Graduate, 2),
            person("L1", Role::Lecturer, Status::Active, 3),
            person("T1", Role::Staff, Status::Suspended, 4),
            person("V1", Role::Staff, Status::Visitor, 5),
        ];
        let stats = EnrollmentStats::from_population(&population);
        assert_eq!(stats.total, 5);
        assert_eq!(stats.students, 2);
        assert_eq!(stats.lecturers, 1);
        assert_eq!(stats.staff, 2);
        assert_eq!(stats.active, 2);
        assert_eq!(stats.suspended, 1);
        assert_eq!(stats.visitors, 1);
        assert_eq!(stats.discontinued, 0);
    }

    #[test]
    fn test_empty_population() {
        assert_eq!(EnrollmentStats::from_population(&[]), EnrollmentStats::default());
    }

    #[test]
    fn test_newest_first() {
        let mut population = vec![
            person("old", Role::Student, Status::Active, 30),
            person("new", Role::Student, Status::Active, 0),
            person("mid", Role::Student, Status::Active, 7),
        ];
        newest_first(&mut population);
        let ids: Vec<_> = population.iter().map(|e| e.id_number.as_str()).collect();
        assert_eq!(ids, ["new", "mid", "old"]);
    }
}
