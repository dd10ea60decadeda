//! Narration parsing: extract the product (payee) and payment mode from a
//! bank statement narration.
//!
//! Markers are checked in a fixed order and the first match wins. Parsing is
//! total: a narration that matches nothing, or lacks the delimiter a rule
//! expects, produces an `Other` mode or an empty product rather than an error.

use crate::models::PaymentMode;

/// Result of parsing a narration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedNarration {
    pub product: String,
    pub mode: PaymentMode,
}

/// Parse a narration into product and payment mode
pub fn parse(narration: &str) -> ParsedNarration {
    let (mode, product) = if narration.contains("UPI") {
        (PaymentMode::Upi, dash_field(narration, 1))
    } else if narration.contains("POS") {
        (PaymentMode::Pos, tokens_from(narration, 2, " "))
    } else if narration.contains("ME DC") {
        (PaymentMode::DebitCard, tokens_from(narration, 4, " "))
    } else if narration.contains("ATW") {
        (PaymentMode::Atm, after_first_dash(narration))
    } else if narration.contains("SI") {
        (PaymentMode::AutomatedPayment, tokens_from(narration, 2, ""))
    } else if narration.contains("CC") {
        (PaymentMode::CreditCard, tokens_from(narration, 2, ""))
    } else {
        (PaymentMode::Other, dash_field(narration, 0))
    };

    ParsedNarration {
        product: product.trim().to_string(),
        mode,
    }
}

/// The `index`-th `-`-separated field, or empty if there are not enough fields
fn dash_field(narration: &str, index: usize) -> String {
    narration.split('-').nth(index).unwrap_or_default().to_string()
}

/// Everything after the first `-`, remaining fields joined with a space
fn after_first_dash(narration: &str) -> String {
    narration.split('-').skip(1).collect::<Vec<_>>().join(" ")
}

/// Space-split tokens from `start` onward, joined with `sep`.
///
/// Splits on single spaces so consecutive spaces produce empty tokens.
fn tokens_from(narration: &str, start: usize, sep: &str) -> String {
    narration.split(' ').skip(start).collect::<Vec<_>>().join(sep)
}
