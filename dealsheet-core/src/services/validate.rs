//! Per-row acceptance rules

use rust_decimal::Decimal;

use super::coerce::CoercionWarning;
use super::normalize::Normalized;
use crate::domain::result::RowError;
use crate::domain::{CandidateTransaction, DealField};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject,
}

/// Outcome of validating one normalized row
#[derive(Debug, Clone, PartialEq)]
pub struct Validation {
    pub row_number: usize,
    pub verdict: Verdict,
    pub candidate: CandidateTransaction,
    pub reasons: Vec<RowError>,
    pub warnings: Vec<CoercionWarning>,
}

impl Validation {
    pub fn is_accepted(&self) -> bool {
        self.verdict == Verdict::Accept
    }

    /// All rejection reasons joined into one line
    pub fn reason_text(&self) -> String {
        self.reasons
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Accept or reject a normalized row
///
/// Company is required and money fields may not be negative. Coercion
/// warnings are carried along but never reject.
pub fn validate(normalized: Normalized) -> Validation {
    let Normalized {
        row_number,
        candidate,
        warnings,
    } = normalized;
    let mut reasons = Vec::new();

    if candidate.company.is_none() {
        reasons.push(RowError::MissingRequiredField {
            field: DealField::Company,
        });
    }

    for (field, value) in [
        (DealField::Amount, candidate.amount),
        (DealField::AnnualRevenue, candidate.annual_revenue),
    ] {
        if let Some(v) = value {
            if v < Decimal::ZERO {
                reasons.push(RowError::InvalidValue {
                    field,
                    reason: format!("negative amount {}", v),
                });
            }
        }
    }

    let verdict = if reasons.is_empty() {
        Verdict::Accept
    } else {
        Verdict::Reject
    };

    Validation {
        row_number,
        verdict,
        candidate,
        reasons,
        warnings,
    }
}
