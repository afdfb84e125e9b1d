//! Insert / update / skip decisions against stored deals

use std::collections::HashMap;

use crate::domain::{CandidateTransaction, StoredTransaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Insert,
    Update,
    Skip,
}

/// Decision for one candidate
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub action: Action,
    /// Record to write: the candidate itself for inserts, the merged record
    /// for updates and skips
    pub target: CandidateTransaction,
}

/// Decide what to do with a candidate given the stored deals by fingerprint
pub fn reconcile(
    candidate: CandidateTransaction,
    existing: &HashMap<String, StoredTransaction>,
) -> Reconciliation {
    let key = candidate.identity_key().fingerprint();

    match existing.get(&key) {
        None => Reconciliation {
            action: Action::Insert,
            target: candidate,
        },
        Some(stored) => {
            let merged = candidate.merged_over(&stored.fields);
            let action = if merged == stored.fields {
                Action::Skip
            } else {
                Action::Update
            };
            Reconciliation {
                action,
                target: merged,
            }
        }
    }
}

/// Candidates left after collapsing same-key rows
#[derive(Debug, Clone, Default)]
pub struct Collapsed {
    /// One candidate per identity key, in order of first appearance
    pub candidates: Vec<CandidateTransaction>,
    /// Rows folded into a later row with the same key
    pub superseded: u64,
}

/// Fold rows sharing an identity key into one candidate
///
/// The later row is authoritative: it is merged over whatever the earlier
/// rows produced.
pub fn collapse_in_run(candidates: Vec<CandidateTransaction>) -> Collapsed {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut collapsed = Collapsed::default();

    for candidate in candidates {
        let key = candidate.identity_key().fingerprint();
        match positions.get(&key) {
            Some(&pos) => {
                let merged = candidate.merged_over(&collapsed.candidates[pos]);
                collapsed.candidates[pos] = merged;
                collapsed.superseded += 1;
            }
            None => {
                positions.insert(key, collapsed.candidates.len());
                collapsed.candidates.push(candidate);
            }
        }
    }

    collapsed
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::*;

    fn acme() -> CandidateTransaction {
        CandidateTransaction {
            company: Some("Acme FC".to_string()),
            investment_date: NaiveDate::from_ymd_opt(2023, 1, 10),
            transaction_type: Some("Acquisition".to_string()),
            sector: Some("Football".to_string()),
            ..Default::default()
        }
    }

    fn stored(fields: CandidateTransaction) -> HashMap<String, StoredTransaction> {
        let record = StoredTransaction::new(fields);
        HashMap::from([(record.identity_key.clone(), record)])
    }

    #[test]
    fn test_new_key_inserts() {
        let result = reconcile(acme(), &HashMap::new());
        assert_eq!(result.action, Action::Insert);
        assert_eq!(result.target, acme());
    }

    #[test]
    fn test_identical_skips() {
        let result = reconcile(acme(), &stored(acme()));
        assert_eq!(result.action, Action::Skip);
    }

    #[test]
    fn test_absent_fields_never_clear_stored_values() {
        let mut candidate = acme();
        candidate.sector = None;

        let result = reconcile(candidate, &stored(acme()));
        assert_eq!(result.action, Action::Skip);
        assert_eq!(result.target.sector.as_deref(), Some("Football"));
    }

    #[test]
    fn test_changed_field_updates_with_merge() {
        let mut candidate = acme();
        candidate.sector = None;
        candidate.amount = Some(Decimal::new(5_000_000, 0));

        let result = reconcile(candidate, &stored(acme()));
        assert_eq!(result.action, Action::Update);
        assert_eq!(result.target.sector.as_deref(), Some("Football"));
        assert_eq!(result.target.amount, Some(Decimal::new(5_000_000, 0)));
    }

    #[test]
    fn test_later_row_wins_in_run() {
        let mut first = acme();
        first.amount = Some(Decimal::new(100, 0));
        first.geography = Some("UK".to_string());
        let mut second = acme();
        second.amount = Some(Decimal::new(200, 0));
        let other = CandidateTransaction {
            company: Some("Beta SC".to_string()),
            ..Default::default()
        };

        let collapsed = collapse_in_run(vec![first, other, second]);
        assert_eq!(collapsed.superseded, 1);
        assert_eq!(collapsed.candidates.len(), 2);
        assert_eq!(collapsed.candidates[0].amount, Some(Decimal::new(200, 0)));
        assert_eq!(collapsed.candidates[0].geography.as_deref(), Some("UK"));
        assert_eq!(collapsed.candidates[1].company.as_deref(), Some("Beta SC"));
    }
}
