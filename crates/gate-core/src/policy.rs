//! Status-driven access policy.
//!
//! Pure: depends only on the enrollment and the supplied `now`.

use chrono::{DateTime, Utc};

use crate::types::{Enrollment, ReasonCode, Status};

/// Allow/deny decision for a matched enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyDecision {
    pub granted: bool,
    pub reason: ReasonCode,
}

impl PolicyDecision {
    const fn grant() -> Self {
        Self {
            granted: true,
            reason: ReasonCode::Granted,
        }
    }

    const fn deny(reason: ReasonCode) -> Self {
        Self {
            granted: false,
            reason,
        }
    }
}

/// Evaluate whether `enrollment` may enter at `now`.
///
/// Suspended and discontinued identities are always denied, regardless of any
/// visitor window. Visitors are denied once `valid_until` has passed; a
/// visitor without `valid_until` never expires.
pub fn evaluate(enrollment: &Enrollment, now: DateTime<Utc>) -> PolicyDecision {
    match enrollment.status {
        Status::Suspended | Status::Discontinued => PolicyDecision::deny(ReasonCode::StatusDenied),
        Status::Visitor => match enrollment.valid_until {
            Some(until) if until < now => PolicyDecision::deny(ReasonCode::Expired),
            _ => PolicyDecision::grant(),
        },
        Status::Active | Status::Graduate => PolicyDecision::grant(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Descriptor, Role};
    use chrono::Duration;

    fn with_status(status: Status, valid_until: Option<DateTime<Utc>>) -> Enrollment {
        Enrollment {
            id_number: "X1".into(),
            name: "Test".into(),
            role: Role::Staff,
            status,
            descriptor: Descriptor::from_stored(vec![0.0]),
            visit_purpose: None,
            valid_until,
            email: None,
            registered_at: Utc::now(),
        }
    }

    #[test]
    fn test_active_and_graduate_are_granted() {
        let now = Utc::now();
        for status in [Status::Active, Status::Graduate] {
            let d = evaluate(&with_status(status, None), now);
            assert!(d.granted);
            assert_eq!(d.reason, ReasonCode::Granted);
        }
    }

    #[test]
    fn test_suspended_and_discontinued_are_denied() {
        let now = Utc::now();
        for status in [Status::Suspended, Status::Discontinued] {
            let d = evaluate(&with_status(status, None), now);
            assert!(!d.granted);
            assert_eq!(d.reason, ReasonCode::StatusDenied);
        }
    }

    #[test]
    fn test_suspended_denied_even_with_future_or_past_window() {
        let now = Utc::now();
        for until in [now + Duration::hours(1), now - Duration::hours(1)] {
            let d = evaluate(&with_status(Status::Suspended, Some(until)), now);
            assert_eq!(d.reason, ReasonCode::StatusDenied);
        }
    }

    #[test]
    fn test_visitor_expired_one_second_ago() {
        let now = Utc::now();
        let d = evaluate(
            &with_status(Status::Visitor, Some(now - Duration::seconds(1))),
            now,
        );
        assert!(!d.granted);
        assert_eq!(d.reason, ReasonCode::Expired);
    }

    #[test]
    fn test_visitor_within_window() {
        let now = Utc::now();
        let d = evaluate(&with_status(Status::Visitor, Some(now + Duration::hours(1))), now);
        assert!(d.granted);
    }

    #[test]
    fn test_visitor_valid_until_exactly_now_is_still_valid() {
        let now = Utc::now();
        assert!(evaluate(&with_status(Status::Visitor, Some(now)), now).granted);
    }

    #[test]
    fn test_visitor_without_expiry() {
        let d = evaluate(&with_status(Status::Visitor, None), Utc::now());
        assert_eq!(d, PolicyDecision::grant());
    }
}
