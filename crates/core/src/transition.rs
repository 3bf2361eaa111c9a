use crate::model::InvestigationStatus;

/// The directed status graph. Active and Pending toggle freely; completion
/// and archival are one-way; Archived has no outgoing edges.
pub fn transition_allowed(from: InvestigationStatus, to: InvestigationStatus) -> bool {
    use InvestigationStatus::*;
    matches!(
        (from, to),
        (Active, Pending)
            | (Pending, Active)
            | (Active, Completed)
            | (Completed, Archived)
            | (Pending, Archived)
    )
}

/// Transitions into these states require lead authority (the investigation's
/// lead_investigator or a lead-role collaborator).
pub fn requires_lead(to: InvestigationStatus) -> bool {
    matches!(
        to,
        InvestigationStatus::Completed | InvestigationStatus::Archived
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use InvestigationStatus::*;

    #[test]
    fn graph_matches_the_allowed_edges_exactly() {
        let allowed = [
            (Active, Pending),
            (Pending, Active),
            (Active, Completed),
            (Completed, Archived),
            (Pending, Archived),
        ];

        for from in InvestigationStatus::ALL {
            for to in InvestigationStatus::ALL {
                let expected = allowed.contains(&(from, to));
                assert_eq!(
                    transition_allowed(from, to),
                    expected,
                    "edge {} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn archived_is_terminal() {
        for to in InvestigationStatus::ALL {
            assert!(!transition_allowed(Archived, to));
        }
    }

    #[test]
    fn lead_authority_gates_completion_and_archival() {
        assert!(requires_lead(Completed));
        assert!(requires_lead(Archived));
        assert!(!requires_lead(Active));
        assert!(!requires_lead(Pending));
    }
}
