use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub(crate) fn validate_new_allocation(new: &NewAllocation) -> Result<(), EngineError> {
    // `Interval::Bounded` can be built directly, skipping `from_parts`.
    if let Interval::Bounded { from, to } = new.interval {
        Interval::bounded(from, to)?;
    }
    if new.allocation_type.trim().is_empty() {
        return Err(EngineError::Validation("allocation_type is required".into()));
    }
    if new.allocation_type.len() > MAX_ALLOCATION_TYPE_LEN {
        return Err(EngineError::LimitExceeded("allocation_type too long"));
    }
    if new.description.as_ref().is_some_and(|d| d.len() > MAX_DESCRIPTION_LEN) {
        return Err(EngineError::LimitExceeded("description too long"));
    }
    let payload_len = serde_json::to_vec(&new.payload)
        .map_err(|e| EngineError::Validation(format!("payload: {e}")))?
        .len();
    if payload_len > MAX_PAYLOAD_BYTES {
        return Err(EngineError::LimitExceeded("payload too large"));
    }
    Ok(())
}

/// Order existing allocations by end, falling back to start.
pub fn sort_allocations(allocs: &mut [Allocation]) {
    allocs.sort_by_key(|a| a.interval.sort_key());
}

/// True if `candidate` may not be placed next to `existing`.
pub fn conflicts(existing: &[Allocation], candidate: &Interval) -> bool {
    find_conflict(existing, candidate).is_some()
}

/// Return the first existing allocation, in end order, that blocks `candidate`.
///
/// A doubly-infinite candidate is blocked by anything at all.
pub fn find_conflict(existing: &[Allocation], candidate: &Interval) -> Option<Ulid> {
    let mut ordered: Vec<&Allocation> = existing.iter().collect();
    ordered.sort_by_key(|a| a.interval.sort_key());

    if matches!(candidate, Interval::Unbounded) {
        return ordered.first().map(|a| a.id);
    }
    ordered
        .into_iter()
        .find(|e| blocks(&e.interval, candidate))
        .map(|e| e.id)
}

fn blocks(existing: &Interval, candidate: &Interval) -> bool {
    let c_from = candidate.start();
    let c_to = candidate.end();
    match *existing {
        Interval::Unbounded => true,
        Interval::LeftInfinite { to } => {
            c_to.is_some_and(|t| t < to)
                || c_from.is_some_and(|f| f < to)
                || candidate.from_infinite()
        }
        Interval::RightInfinite { from } => {
            c_to.is_some_and(|t| t > from)
                || c_from.is_some_and(|f| f > from)
                || candidate.to_infinite()
        }
        Interval::Bounded { from, to } => {
            // Endpoints are exclusive: touching is fine, landing strictly inside is not.
            if c_from.is_some_and(|f| from < f && f < to) || c_to.is_some_and(|t| from < t && t < to) {
                return true;
            }
            // A finite candidate that swallows or equals the existing window.
            match *candidate {
                Interval::Bounded { from: cf, to: ct } => from.max(cf) < to.min(ct),
                _ => false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> Timestamp {
        parse_timestamp(s).unwrap()
    }

    fn at(hour: u32) -> Timestamp {
        ts(&format!("2024-01-01T{hour:02}:00:00"))
    }

    fn alloc(interval: Interval) -> Allocation {
        Allocation {
            id: Ulid::new(),
            resource_id: Ulid::new(),
            resource_type: "Car".into(),
            interval,
            allocation_type: "test".into(),
            description: None,
            payload: Payload::new(),
            created_at: at(0),
        }
    }

    fn bounded(a: u32, b: u32) -> Interval {
        Interval::bounded(at(a), at(b)).unwrap()
    }

    #[test]
    fn empty_resource_accepts_everything() {
        assert!(!conflicts(&[], &bounded(9, 10)));
        assert!(!conflicts(&[], &Interval::Unbounded));
        assert!(!conflicts(&[], &Interval::left_infinite(at(3))));
    }

    #[test]
    fn boundary_touch_is_not_a_conflict() {
        let existing = [alloc(bounded(10, 12))];
        assert!(!conflicts(&existing, &bounded(9, 10)));
        assert!(!conflicts(&existing, &bounded(12, 14)));
    }

    #[test]
    fn endpoint_inside_is_a_conflict() {
        let existing = [alloc(bounded(10, 12))];
        assert!(conflicts(&existing, &bounded(11, 13)));
        assert!(conflicts(&existing, &bounded(9, 11)));
    }

    #[test]
    fn enclosing_or_equal_bounded_is_a_conflict() {
        let existing = [alloc(bounded(10, 12))];
        assert!(conflicts(&existing, &bounded(9, 13)));
        assert!(conflicts(&existing, &bounded(10, 12)));
    }

    #[test]
    fn zero_length_existing_only_blocks_by_endpoint() {
        let existing = [alloc(bounded(10, 10))];
        assert!(!conflicts(&existing, &bounded(9, 11)));
        assert!(!conflicts(&existing, &bounded(10, 10)));
    }

    #[test]
    fn doubly_infinite_candidate_blocked_by_any_allocation() {
        let existing = [alloc(bounded(1, 2))];
        assert!(conflicts(&existing, &Interval::Unbounded));
    }

    #[test]
    fn doubly_infinite_existing_blocks_everything() {
        let existing = [alloc(Interval::Unbounded)];
        assert!(conflicts(&existing, &bounded(1, 2)));
        assert!(conflicts(&existing, &Interval::left_infinite(at(1))));
        assert!(conflicts(&existing, &Interval::right_infinite(at(23))));
    }

    #[test]
    fn left_infinite_existing() {
        let existing = [alloc(Interval::left_infinite(at(12)))];
        assert!(conflicts(&existing, &bounded(5, 6)));
        assert!(conflicts(&existing, &bounded(11, 14)));
        assert!(conflicts(&existing, &Interval::left_infinite(at(20))));
        assert!(!conflicts(&existing, &bounded(12, 14)));
        assert!(!conflicts(&existing, &Interval::right_infinite(at(12))));
        assert!(conflicts(&existing, &Interval::right_infinite(at(11))));
    }

    #[test]
    fn right_infinite_existing() {
        let existing = [alloc(Interval::right_infinite(at(13)))];
        assert!(conflicts(&existing, &bounded(12, 14)));
        assert!(conflicts(&existing, &bounded(14, 15)));
        assert!(conflicts(&existing, &Interval::right_infinite(at(20))));
        assert!(conflicts(&existing, &Interval::left_infinite(at(14))));
        assert!(!conflicts(&existing, &bounded(11, 13)));
        assert!(!conflicts(&existing, &Interval::left_infinite(at(13))));
    }

    #[test]
    fn half_open_candidate_against_bounded_checks_endpoints_only() {
        let existing = [alloc(bounded(10, 12))];
        assert!(conflicts(&existing, &Interval::right_infinite(at(11))));
        assert!(conflicts(&existing, &Interval::left_infinite(at(11))));
        assert!(!conflicts(&existing, &Interval::right_infinite(at(13))));
        assert!(!conflicts(&existing, &Interval::left_infinite(at(10))));
    }

    #[test]
    fn reports_conflict_with_earliest_end_first() {
        let late = alloc(bounded(14, 18));
        let early = alloc(bounded(8, 12));
        let existing = [late.clone(), early.clone()];
        // Candidate lands inside both windows
        assert_eq!(find_conflict(&existing, &bounded(11, 15)), Some(early.id));
    }

    #[test]
    fn sort_puts_doubly_infinite_first() {
        let mut allocs = vec![
            alloc(bounded(14, 18)),
            alloc(Interval::right_infinite(at(3))),
            alloc(Interval::Unbounded),
        ];
        sort_allocations(&mut allocs);
        assert_eq!(allocs[0].interval, Interval::Unbounded);
        assert_eq!(allocs[1].interval, Interval::right_infinite(at(3)));
        assert_eq!(allocs[2].interval, bounded(14, 18));
    }

    #[test]
    fn finite_intervals_never_share_an_open_point() {
        for a0 in 0..8 {
            for a1 in a0..8 {
                for b0 in 0..8 {
                    for b1 in b0..8 {
                        let a = bounded(a0, a1);
                        let b = bounded(b0, b1);
                        let open_overlap = a0.max(b0) < a1.min(b1);
                        if open_overlap {
                            assert!(
                                conflicts(&[alloc(a)], &b),
                                "[{a0},{a1}] vs [{b0},{b1}] must conflict"
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn deterministic_for_same_input() {
        let existing = [alloc(bounded(10, 12)), alloc(Interval::right_infinite(at(20)))];
        let candidate = bounded(11, 21);
        let first = find_conflict(&existing, &candidate);
        for _ in 0..10 {
            assert_eq!(find_conflict(&existing, &candidate), first);
        }
    }

    #[test]
    fn validation_requires_allocation_type() {
        let new = NewAllocation::new(bounded(1, 2), "  ");
        assert!(matches!(validate_new_allocation(&new), Err(EngineError::Validation(_))));
        let ok = NewAllocation::new(bounded(1, 2), "lease");
        assert!(validate_new_allocation(&ok).is_ok());
    }

    #[test]
    fn validation_rejects_reversed_window() {
        let reversed = NewAllocation::new(Interval::Bounded { from: at(12), to: at(10) }, "lease");
        assert!(matches!(validate_new_allocation(&reversed), Err(EngineError::Validation(_))));
        let instant = NewAllocation::new(Interval::Bounded { from: at(12), to: at(12) }, "lease");
        assert!(validate_new_allocation(&instant).is_ok());
    }

    #[test]
    fn validation_limits() {
        let long_type = NewAllocation::new(bounded(1, 2), "x".repeat(MAX_ALLOCATION_TYPE_LEN + 1));
        assert!(matches!(validate_new_allocation(&long_type), Err(EngineError::LimitExceeded(_))));
        let long_desc = NewAllocation::new(bounded(1, 2), "lease")
            .with_description("d".repeat(MAX_DESCRIPTION_LEN + 1));
        assert!(matches!(validate_new_allocation(&long_desc), Err(EngineError::LimitExceeded(_))));
    }
}
