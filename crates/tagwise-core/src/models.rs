//! Data models for Tagwise

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Payment rail inferred from a narration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMode {
    Upi,
    Pos,
    DebitCard,
    Atm,
    AutomatedPayment,
    CreditCard,
    Other,
}

impl PaymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upi => "UPI",
            Self::Pos => "POS",
            Self::DebitCard => "Debit Card",
            Self::Atm => "ATM",
            Self::AutomatedPayment => "Automated Payment",
            Self::CreditCard => "Credit Card",
            Self::Other => "Other",
        }
    }
}

impl std::fmt::Display for PaymentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "UPI" => Ok(Self::Upi),
            "POS" => Ok(Self::Pos),
            "Debit Card" => Ok(Self::DebitCard),
            "ATM" => Ok(Self::Atm),
            "Automated Payment" => Ok(Self::AutomatedPayment),
            "Credit Card" => Ok(Self::CreditCard),
            "Other" => Ok(Self::Other),
            _ => Err(format!("Unknown payment mode: {}", s)),
        }
    }
}

/// Spending categories offered to the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Rent,
    Bills,
    Groceries,
    Salon,
    Shopping,
    Contact,
    Investments,
    Travel,
    Dineout,
    Food,
    Fun,
    /// Could not be classified
    Tbd,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rent => "Rent",
            Self::Bills => "Bills",
            Self::Groceries => "Groceries",
            Self::Salon => "Salon",
            Self::Shopping => "Shopping",
            Self::Contact => "Contact",
            Self::Investments => "Investments",
            Self::Travel => "Travel",
            Self::Dineout => "Dineout",
            Self::Food => "Food",
            Self::Fun => "Fun",
            Self::Tbd => "TBD",
        }
    }

    /// The full label set, in prompt order
    pub fn all() -> &'static [Category] {
        &[
            Self::Rent,
            Self::Bills,
            Self::Groceries,
            Self::Salon,
            Self::Shopping,
            Self::Contact,
            Self::Investments,
            Self::Travel,
            Self::Dineout,
            Self::Food,
            Self::Fun,
            Self::Tbd,
        ]
    }

    /// Comma-separated label list as shown to the model
    pub fn label_list() -> String {
        Self::all()
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::all()
            .iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| format!("Unknown category: {}", s))
    }
}

/// How a product's tag was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagSource {
    /// Seeded from a product-tag upload
    Upload,
    /// Matched against a previously tagged product by embedding similarity
    Embedding,
    /// Suggested by the AI classifier
    Ai,
    /// Set by the user
    Manual,
}

impl TagSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Embedding => "embedding",
            Self::Ai => "ai",
            Self::Manual => "manual",
        }
    }
}

impl std::str::FromStr for TagSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "upload" => Ok(Self::Upload),
            "embedding" => Ok(Self::Embedding),
            "ai" => Ok(Self::Ai),
            "manual" => Ok(Self::Manual),
            _ => Err(format!("Unknown tag source: {}", s)),
        }
    }
}

/// An upload session; scopes every product and transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// One debit row from a bank statement, before narration parsing
#[derive(Debug, Clone, PartialEq)]
pub struct StatementRow {
    pub date: NaiveDate,
    pub narration: String,
    pub debit_amount: f64,
}

/// A transaction ready to be written (narration already parsed)
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub date: NaiveDate,
    pub narration: String,
    pub debit_amount: f64,
    pub product: String,
    pub mode: PaymentMode,
}

/// A stored transaction
#[derive(Debug, Clone, Serialize)]
pub struct Transaction {
    pub id: i64,
    pub session_id: String,
    pub date: NaiveDate,
    pub narration: String,
    pub debit_amount: f64,
    pub product: String,
    pub mode: PaymentMode,
    pub tag: Option<String>,
}

/// A row of the per-session product tag table
#[derive(Debug, Clone, Serialize)]
pub struct ProductTag {
    pub id: i64,
    pub session_id: String,
    pub product: String,
    pub tag: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub source: Option<TagSource>,
}

/// A product still waiting for a tag, with its average debit amount
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnresolvedProduct {
    pub product: String,
    pub avg_amount: f64,
}

/// A tagged product with a stored embedding (embedding-match candidate)
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedEmbedding {
    pub product: String,
    pub tag: String,
    pub embedding: Vec<f32>,
}

/// A cleaned `product-tag` pair parsed from a classifier reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSuggestion {
    pub product: String,
    pub tag: String,
}

impl std::fmt::Display for TagSuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.product, self.tag)
    }
}

/// Spending total for one group (tag or payment mode)
#[derive(Debug, Clone, Serialize)]
pub struct SpendingGroup {
    pub name: String,
    pub amount: f64,
    /// Share of the session total, 0-100
    pub percentage: f64,
    pub transaction_count: i64,
}

/// A session's spending broken down one way
#[derive(Debug, Clone, Serialize)]
pub struct SpendingSummary {
    pub total: f64,
    pub transaction_count: i64,
    /// Largest first
    pub groups: Vec<SpendingGroup>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_mode_round_trip_names() {
        for mode in [
            PaymentMode::Upi,
            PaymentMode::Pos,
            PaymentMode::DebitCard,
            PaymentMode::Atm,
            PaymentMode::AutomatedPayment,
            PaymentMode::CreditCard,
            PaymentMode::Other,
        ] {
            assert_eq!(mode.as_str().parse::<PaymentMode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_category_label_list() {
        assert_eq!(
            Category::label_list(),
            "Rent, Bills, Groceries, Salon, Shopping, Contact, Investments, Travel, Dineout, Food, Fun, TBD"
        );
    }

    #[test]
    fn test_category_parse_is_case_insensitive() {
        assert_eq!("bills".parse::<Category>().unwrap(), Category::Bills);
        assert_eq!(" TBD ".parse::<Category>().unwrap(), Category::Tbd);
        assert!("Subscriptions".parse::<Category>().is_err());
    }

    #[test]
    fn test_tag_suggestion_display() {
        let s = TagSuggestion {
            product: "Airtel".into(),
            tag: "Bills".into(),
        };
        assert_eq!(s.to_string(), "Airtel-Bills");
    }

    #[test]
    fn test_session_expiry() {
        let now = Utc::now();
        let session = Session {
            session_id: "abc".into(),
            username: "asha".into(),
            created_at: now,
            expires_at: now + chrono::Duration::hours(1),
        };
        assert!(!session.is_expired_at(now));
        assert!(session.is_expired_at(now + chrono::Duration::hours(1)));
    }
}
