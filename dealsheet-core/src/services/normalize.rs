//! Header resolution and row normalization

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use super::coerce::{
    coerce_date, coerce_investors, coerce_link, coerce_money, coerce_text, Coerced,
    CoercionWarning,
};
use crate::domain::result::{Error, Result};
use crate::domain::{CandidateTransaction, Cell, DealField, RawRow};

static NON_ALNUM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Normalize a header label: lowercase, non-alphanumeric runs become `_`
pub fn normalize_header(label: &str) -> String {
    let lowered = label.trim().to_lowercase();
    NON_ALNUM_RE
        .replace_all(&lowered, "_")
        .trim_matches('_')
        .to_string()
}

/// Field to column index mapping, resolved once per run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    columns: BTreeMap<DealField, usize>,
    /// Header labels that matched no field
    pub ignored: Vec<String>,
}

impl ColumnMap {
    /// Match header labels to fields
    ///
    /// Exact field names are matched first, then aliases; the first matching
    /// column wins and a column is never assigned twice.
    pub fn resolve(header: &[String]) -> Result<Self> {
        let normalized: Vec<String> = header.iter().map(|h| normalize_header(h)).collect();
        let mut columns = BTreeMap::new();
        let mut used = vec![false; normalized.len()];

        for field in DealField::ALL {
            if let Some(idx) = normalized.iter().position(|h| h == field.as_str()) {
                if !used[idx] {
                    columns.insert(field, idx);
                    used[idx] = true;
                }
            }
        }

        for field in DealField::ALL {
            if columns.contains_key(&field) {
                continue;
            }
            let found = normalized
                .iter()
                .enumerate()
                .find(|(idx, h)| !used[*idx] && field.aliases().contains(&h.as_str()))
                .map(|(idx, _)| idx);
            if let Some(idx) = found {
                columns.insert(field, idx);
                used[idx] = true;
            }
        }

        if !columns.contains_key(&DealField::Company) {
            return Err(Error::Schema(format!(
                "no company column in header [{}]",
                header.join(", ")
            )));
        }

        let ignored = header
            .iter()
            .zip(used)
            .filter(|(label, used)| !used && !label.trim().is_empty())
            .map(|(label, _)| label.clone())
            .collect();

        Ok(Self { columns, ignored })
    }

    pub fn column(&self, field: DealField) -> Option<usize> {
        self.columns.get(&field).copied()
    }

    /// Mapped fields with their column index, in field order
    pub fn iter(&self) -> impl Iterator<Item = (DealField, usize)> + '_ {
        self.columns.iter().map(|(field, idx)| (*field, *idx))
    }
}

/// A row mapped to a candidate, plus any coercion warnings
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub row_number: usize,
    pub candidate: CandidateTransaction,
    pub warnings: Vec<CoercionWarning>,
}

/// Map one raw row to a candidate transaction
pub fn normalize(row: &RawRow, columns: &ColumnMap) -> Normalized {
    let mut candidate = CandidateTransaction::default();
    let mut warnings = Vec::new();

    for (field, idx) in columns.iter() {
        let cell = row.cell(idx);

        match field {
            DealField::Company => candidate.company = coerce_text(cell),
            DealField::Geography => candidate.geography = coerce_text(cell),
            DealField::InvestmentStage => candidate.investment_stage = coerce_text(cell),
            DealField::Sector => candidate.sector = coerce_text(cell),
            DealField::Sport => candidate.sport = coerce_text(cell),
            DealField::TransactionType => candidate.transaction_type = coerce_text(cell),
            DealField::InvestorsBuyers => candidate.investors_buyers = coerce_investors(cell),
            DealField::Amount => {
                candidate.amount = take(field, cell, coerce_money(cell), &mut warnings)
            }
            DealField::AnnualRevenue => {
                candidate.annual_revenue = take(field, cell, coerce_money(cell), &mut warnings)
            }
            DealField::InvestmentDate => {
                candidate.investment_date = take(field, cell, coerce_date(cell), &mut warnings)
            }
            DealField::CompanyLink => {
                candidate.company_link = take(field, cell, coerce_link(cell), &mut warnings)
            }
            DealField::PressLink => {
                candidate.press_link = take(field, cell, coerce_link(cell), &mut warnings)
            }
        }
    }

    Normalized {
        row_number: row.number,
        candidate,
        warnings,
    }
}

fn take<T>(
    field: DealField,
    cell: &Cell,
    coerced: Coerced<T>,
    warnings: &mut Vec<CoercionWarning>,
) -> Option<T> {
    if let Some(message) = coerced.warning {
        warnings.push(CoercionWarning {
            field,
            raw: cell.as_text().map(|t| t.into_owned()).unwrap_or_default(),
            message,
        });
    }
    coerced.value
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::*;

    fn header(labels: &[&str]) -> Vec<String> {
        labels.iter().map(|s| s.to_string()).collect()
    }

    fn row(number: usize, cells: &[&str]) -> RawRow {
        RawRow {
            number,
            cells: cells.iter().map(|c| Cell::from(*c)).collect(),
        }
    }

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("Investors / Buyers"), "investors_buyers");
        assert_eq!(normalize_header("  Company Link "), "company_link");
        assert_eq!(normalize_header("Amount ($)"), "amount");
    }

    #[test]
    fn test_resolve_exact_and_aliases() {
        let columns = ColumnMap::resolve(&header(&[
            "Company Name",
            "Deal Size",
            "Date",
            "Stage",
            "Country",
            "Sector",
            "Notes",
            "Type",
        ]))
        .unwrap();

        assert_eq!(columns.column(DealField::Company), Some(0));
        assert_eq!(columns.column(DealField::Amount), Some(1));
        assert_eq!(columns.column(DealField::InvestmentDate), Some(2));
        assert_eq!(columns.column(DealField::InvestmentStage), Some(3));
        assert_eq!(columns.column(DealField::Geography), Some(4));
        assert_eq!(columns.column(DealField::Sector), Some(5));
        assert_eq!(columns.column(DealField::TransactionType), Some(7));
        assert_eq!(columns.column(DealField::Sport), None);
        assert_eq!(columns.ignored, vec!["Notes"]);
    }

    #[test]
    fn test_exact_name_beats_alias() {
        let columns = ColumnMap::resolve(&header(&["Name", "Company"])).unwrap();
        assert_eq!(columns.column(DealField::Company), Some(1));
        assert_eq!(columns.ignored, vec!["Name"]);
    }

    #[test]
    fn test_missing_company_column_is_fatal() {
        let err = ColumnMap::resolve(&header(&["Amount", "Sector"])).unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn test_normalize_full_row() {
        let columns = ColumnMap::resolve(&header(&[
            "Company",
            "Amount",
            "Investment Date",
            "Investment Stage",
            "Geography",
            "Sector",
            "Transaction Type",
        ]))
        .unwrap();
        let normalized = normalize(
            &row(
                2,
                &["Acme FC", "$5,000,000", "2023-01-10", "Series A", "USA", "Football", "Acquisition"],
            ),
            &columns,
        );

        let c = &normalized.candidate;
        assert_eq!(c.company.as_deref(), Some("Acme FC"));
        assert_eq!(c.amount, Some(Decimal::new(5_000_000, 0)));
        assert_eq!(c.investment_date, NaiveDate::from_ymd_opt(2023, 1, 10));
        assert_eq!(c.investment_stage.as_deref(), Some("Series A"));
        assert_eq!(c.geography.as_deref(), Some("USA"));
        assert_eq!(c.sector.as_deref(), Some("Football"));
        assert_eq!(c.transaction_type.as_deref(), Some("Acquisition"));
        assert!(normalized.warnings.is_empty());
        assert_eq!(normalized.row_number, 2);
    }

    #[test]
    fn test_short_row_and_warnings() {
        let columns =
            ColumnMap::resolve(&header(&["Company", "Date", "Amount", "Website"])).unwrap();
        let normalized = normalize(&row(4, &["Beta SC", "TBD"]), &columns);

        assert_eq!(normalized.candidate.company.as_deref(), Some("Beta SC"));
        assert_eq!(normalized.candidate.investment_date, None);
        assert_eq!(normalized.candidate.amount, None);
        assert_eq!(normalized.warnings.len(), 1);
        assert_eq!(normalized.warnings[0].field, DealField::InvestmentDate);
        assert_eq!(normalized.warnings[0].raw, "TBD");
    }
}
