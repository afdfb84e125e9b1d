//! Deal transaction domain model

use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Largest magnitude the `DECIMAL(18, 2)` money columns can hold
pub const MAX_MONEY: Decimal = Decimal::from_parts(0xA763_FFFF, 0x0DE0_B6B3, 0, false, 2);

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// How a field's cells are coerced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Money,
    Date,
    Link,
}

/// Every field a deal row can carry, in storage column order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealField {
    Company,
    Amount,
    CompanyLink,
    Geography,
    InvestmentDate,
    InvestmentStage,
    InvestorsBuyers,
    Sector,
    Sport,
    TransactionType,
    AnnualRevenue,
    PressLink,
}

impl DealField {
    pub const ALL: [DealField; 12] = [
        DealField::Company,
        DealField::Amount,
        DealField::CompanyLink,
        DealField::Geography,
        DealField::InvestmentDate,
        DealField::InvestmentStage,
        DealField::InvestorsBuyers,
        DealField::Sector,
        DealField::Sport,
        DealField::TransactionType,
        DealField::AnnualRevenue,
        DealField::PressLink,
    ];

    /// Canonical snake_case name, also the storage column name
    pub fn as_str(&self) -> &'static str {
        match self {
            DealField::Company => "company",
            DealField::Amount => "amount",
            DealField::CompanyLink => "company_link",
            DealField::Geography => "geography",
            DealField::InvestmentDate => "investment_date",
            DealField::InvestmentStage => "investment_stage",
            DealField::InvestorsBuyers => "investors_buyers",
            DealField::Sector => "sector",
            DealField::Sport => "sport",
            DealField::TransactionType => "transaction_type",
            DealField::AnnualRevenue => "annual_revenue",
            DealField::PressLink => "press_link",
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            DealField::Amount | DealField::AnnualRevenue => FieldKind::Money,
            DealField::InvestmentDate => FieldKind::Date,
            DealField::CompanyLink | DealField::PressLink => FieldKind::Link,
            _ => FieldKind::Text,
        }
    }

    /// Alternate (normalized) header names seen in deal sheets
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            DealField::Company => &["company_name", "name", "target", "organization", "organisation"],
            DealField::Amount => &[
                "deal_size",
                "deal_value",
                "value",
                "investment_amount",
                "amount_usd",
                "size",
            ],
            DealField::CompanyLink => &["company_url", "company_website", "website", "url", "link"],
            DealField::Geography => &["country", "region", "location", "geo", "hq"],
            DealField::InvestmentDate => &[
                "date",
                "deal_date",
                "announced",
                "announcement_date",
                "close_date",
                "closed",
            ],
            DealField::InvestmentStage => &["stage", "round", "series", "funding_round"],
            DealField::InvestorsBuyers => &[
                "investors",
                "buyers",
                "investor",
                "buyer",
                "acquirer",
                "acquirers",
                "investors_acquirers",
            ],
            DealField::Sector => &["industry", "category", "vertical"],
            DealField::Sport => &["sports"],
            DealField::TransactionType => &["type", "deal_type"],
            DealField::AnnualRevenue => &["revenue", "arr"],
            DealField::PressLink => &[
                "press",
                "press_release",
                "source",
                "source_link",
                "article",
                "news_link",
            ],
        }
    }
}

impl fmt::Display for DealField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A deal parsed from one sheet row, not yet confirmed persisted
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateTransaction {
    pub company: Option<String>,
    pub amount: Option<Decimal>,
    pub company_link: Option<String>,
    pub geography: Option<String>,
    pub investment_date: Option<NaiveDate>,
    pub investment_stage: Option<String>,
    pub investors_buyers: Option<String>,
    pub sector: Option<String>,
    pub sport: Option<String>,
    pub transaction_type: Option<String>,
    pub annual_revenue: Option<Decimal>,
    pub press_link: Option<String>,
}

impl CandidateTransaction {
    /// Merge `self` over `existing`
    ///
    /// Every field present here wins; absent fields keep the existing value.
    /// A scan never nulls out previously known data.
    pub fn merged_over(&self, existing: &CandidateTransaction) -> CandidateTransaction {
        fn pick<T: Clone>(new: &Option<T>, old: &Option<T>) -> Option<T> {
            new.clone().or_else(|| old.clone())
        }

        CandidateTransaction {
            company: pick(&self.company, &existing.company),
            amount: pick(&self.amount, &existing.amount),
            company_link: pick(&self.company_link, &existing.company_link),
            geography: pick(&self.geography, &existing.geography),
            investment_date: pick(&self.investment_date, &existing.investment_date),
            investment_stage: pick(&self.investment_stage, &existing.investment_stage),
            investors_buyers: pick(&self.investors_buyers, &existing.investors_buyers),
            sector: pick(&self.sector, &existing.sector),
            sport: pick(&self.sport, &existing.sport),
            transaction_type: pick(&self.transaction_type, &existing.transaction_type),
            annual_revenue: pick(&self.annual_revenue, &existing.annual_revenue),
            press_link: pick(&self.press_link, &existing.press_link),
        }
    }

    /// Identity key derived from company, investment date and transaction type
    pub fn identity_key(&self) -> IdentityKey {
        IdentityKey::new(
            self.company.as_deref(),
            self.investment_date,
            self.transaction_type.as_deref(),
        )
    }
}

/// Split a multi-investor cell on commas, semicolons and line breaks,
/// dropping blanks and case-insensitive duplicates
pub fn split_investors(raw: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut result = Vec::new();

    for part in raw.split([',', ';', '\n', '\r']) {
        let trimmed = WHITESPACE_RE.replace_all(part.trim(), " ").to_string();
        if !trimmed.is_empty() && seen.insert(trimmed.to_lowercase()) {
            result.push(trimmed);
        }
    }

    result
}

/// Stable identity of a deal across scans
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    composite: String,
}

impl IdentityKey {
    pub fn new(
        company: Option<&str>,
        investment_date: Option<NaiveDate>,
        transaction_type: Option<&str>,
    ) -> Self {
        let date = investment_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default();

        let composite = format!(
            "{}|{}|{}",
            normalize_key_part(company),
            date,
            normalize_key_part(transaction_type)
        );

        Self { composite }
    }

    /// Human-readable composite (`company|date|type`)
    pub fn composite(&self) -> &str {
        &self.composite
    }

    /// SHA256 of the composite, truncated to 16 hex chars
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.composite.as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..8])
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.composite)
    }
}

/// Lowercase, trim and collapse internal whitespace
fn normalize_key_part(part: Option<&str>) -> String {
    let lowered = part.unwrap_or("").trim().to_lowercase();
    WHITESPACE_RE.replace_all(&lowered, " ").to_string()
}

/// A deal as persisted in the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTransaction {
    pub id: Uuid,
    /// Fingerprint of the identity key
    pub identity_key: String,
    #[serde(flatten)]
    pub fields: CandidateTransaction,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredTransaction {
    /// Wrap a candidate as a new record with a fresh id
    pub fn new(fields: CandidateTransaction) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            identity_key: fields.identity_key().fingerprint(),
            fields,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
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

    #[test]
    fn test_identity_key_ignores_case_and_spacing() {
        let a = acme();
        let mut b = acme();
        b.company = Some("  ACME   fc ".to_string());
        b.transaction_type = Some("acquisition".to_string());

        assert_eq!(a.identity_key(), b.identity_key());
        assert_eq!(a.identity_key().composite(), "acme fc|2023-01-10|acquisition");
        assert_eq!(a.identity_key().fingerprint().len(), 16);
    }

    #[test]
    fn test_identity_key_distinguishes_dates() {
        let a = acme();
        let mut b = acme();
        b.investment_date = NaiveDate::from_ymd_opt(2024, 1, 10);
        assert_ne!(a.identity_key().fingerprint(), b.identity_key().fingerprint());
    }

    #[test]
    fn test_merge_keeps_existing_when_candidate_absent() {
        let existing = acme();
        let mut candidate = acme();
        candidate.sector = None;
        candidate.amount = Some(Decimal::new(5_000_000, 0));

        let merged = candidate.merged_over(&existing);
        assert_eq!(merged.sector.as_deref(), Some("Football"));
        assert_eq!(merged.amount, Some(Decimal::new(5_000_000, 0)));
    }

    #[test]
    fn test_merge_candidate_wins_when_present() {
        let existing = acme();
        let mut candidate = acme();
        candidate.sector = Some("Soccer".to_string());

        assert_eq!(candidate.merged_over(&existing).sector.as_deref(), Some("Soccer"));
    }

    #[test]
    fn test_split_investors() {
        let investors = split_investors("Sequoia; a16z,\n sequoia ,  Red   Bird ");
        assert_eq!(investors, vec!["Sequoia", "a16z", "Red Bird"]);
        assert!(split_investors(" , ; ").is_empty());
    }
}
