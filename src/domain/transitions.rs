//! Status transition policy
//!
//! The transition graph is a static lookup table keyed by the current status.
//! Everything here is pure; the lifecycle service calls [`validate`] before
//! mutating a package.

use crate::domain::types::PackageStatus;
use serde::Serialize;

/// Directed transition graph (from -> allowed targets)
const TRANSITIONS: [(PackageStatus, &[PackageStatus]); 8] = [
    (PackageStatus::Registered, &[PackageStatus::Warehouse, PackageStatus::InTransit]),
    (PackageStatus::Warehouse, &[PackageStatus::InTransit, PackageStatus::Returned]),
    (
        PackageStatus::InTransit,
        &[PackageStatus::OutForDistribution, PackageStatus::Warehouse, PackageStatus::Lost],
    ),
    (
        PackageStatus::OutForDistribution,
        &[PackageStatus::OutForDelivery, PackageStatus::InTransit],
    ),
    (
        PackageStatus::OutForDelivery,
        &[PackageStatus::Delivered, PackageStatus::OutForDistribution, PackageStatus::Returned],
    ),
    (PackageStatus::Delivered, &[]),
    (PackageStatus::Returned, &[]),
    (PackageStatus::Lost, &[]),
];

/// Rejected move, carrying both ends of the attempted edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid status transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: PackageStatus,
    pub to: PackageStatus,
}

/// Statuses reachable in one step from `from`
pub fn describe(from: PackageStatus) -> &'static [PackageStatus] {
    TRANSITIONS
        .iter()
        .find(|(status, _)| *status == from)
        .map(|(_, targets)| *targets)
        .unwrap_or(&[])
}

/// True only for edges listed in the graph; self transitions are never allowed
#[inline]
pub fn is_allowed(from: PackageStatus, to: PackageStatus) -> bool {
    describe(from).contains(&to)
}

/// Full check applied to status updates: terminal packages reject every
/// target, then the graph decides
pub fn validate(from: PackageStatus, to: PackageStatus) -> Result<(), InvalidTransition> {
    if from.is_terminal() || !is_allowed(from, to) {
        return Err(InvalidTransition { from, to });
    }
    Ok(())
}

/// One row of the serialized transition table
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRow {
    pub status: PackageStatus,
    pub description: &'static str,
    pub terminal: bool,
    pub allowed: Vec<PackageStatus>,
}

/// Transition table in declaration order, for clients that render the graph
pub fn table() -> Vec<TransitionRow> {
    TRANSITIONS
        .iter()
        .map(|(status, targets)| TransitionRow {
            status: *status,
            description: status.description(),
            terminal: status.is_terminal(),
            allowed: targets.to_vec(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::PackageStatus::*;

    fn expected_edges() -> Vec<(PackageStatus, PackageStatus)> {
        vec![
            (Registered, Warehouse),
            (Registered, InTransit),
            (Warehouse, InTransit),
            (Warehouse, Returned),
            (InTransit, OutForDistribution),
            (InTransit, Warehouse),
            (InTransit, Lost),
            (OutForDistribution, OutForDelivery),
            (OutForDistribution, InTransit),
            (OutForDelivery, Delivered),
            (OutForDelivery, OutForDistribution),
            (OutForDelivery, Returned),
        ]
    }

    #[test]
    fn test_is_allowed_matches_table_for_every_pair() {
        let edges = expected_edges();
        for from in PackageStatus::ALL {
            for to in PackageStatus::ALL {
                assert_eq!(
                    is_allowed(from, to),
                    edges.contains(&(from, to)),
                    "unexpected result for {from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn test_self_transitions_rejected() {
        for status in PackageStatus::ALL {
            assert!(!is_allowed(status, status));
        }
    }

    #[test]
    fn test_terminal_statuses_have_no_moves() {
        for status in [Delivered, Returned, Lost] {
            assert!(describe(status).is_empty());
            for to in PackageStatus::ALL {
                assert_eq!(validate(status, to), Err(InvalidTransition { from: status, to }));
            }
        }
    }

    #[test]
    fn test_validate_carries_both_statuses() {
        assert!(validate(Registered, Warehouse).is_ok());
        let err = validate(Warehouse, Lost).unwrap_err();
        assert_eq!(err.from, Warehouse);
        assert_eq!(err.to, Lost);
        assert_eq!(err.to_string(), "invalid status transition: WAREHOUSE -> LOST");
    }

    #[test]
    fn test_every_status_has_a_row() {
        let rows = table();
        assert_eq!(rows.len(), PackageStatus::ALL.len());
        for (row, status) in rows.iter().zip(PackageStatus::ALL) {
            assert_eq!(row.status, status);
        }
    }

    #[test]
    fn test_table_serializes_camel_case() {
        let json = serde_json::to_value(table()).unwrap();
        assert_eq!(json[0]["status"], "REGISTERED");
        assert_eq!(json[0]["allowed"], serde_json::json!(["WAREHOUSE", "IN_TRANSIT"]));
        assert_eq!(json[5]["terminal"], true);
    }
}
