use itertools::Itertools;
use regex::Regex;
use serde::Serialize;

/// Offers above this are treated as extraction noise (bundle prices, article
/// numbers picked up as prices).
pub const MAX_PLAUSIBLE_PRICE: f64 = 50_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    Billiger,
    Ebay,
}

impl PriceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceSource::Billiger => "billiger",
            PriceSource::Ebay => "ebay",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LookupStatus {
    Found,
    NotFound,
}

impl LookupStatus {
    /// Cell value written into the spreadsheet's Status column.
    pub fn as_cell(&self) -> &'static str {
        match self {
            LookupStatus::Found => "Found",
            LookupStatus::NotFound => "NOT FOUND",
        }
    }
}

/// One lookup's outcome. Exactly one price field is populated when the status
/// is Found; both stay empty on NotFound.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceQuote {
    pub billiger_price: Option<f64>,
    pub ebay_price: Option<f64>,
    pub source: Option<PriceSource>,
    pub status: LookupStatus,
}

impl PriceQuote {
    pub fn not_found() -> Self {
        PriceQuote {
            billiger_price: None,
            ebay_price: None,
            source: None,
            status: LookupStatus::NotFound,
        }
    }

    pub fn best_price(&self) -> Option<f64> {
        self.billiger_price.or(self.ebay_price)
    }
}

/// Convert a German-formatted price string to a number.
///
/// Strips currency symbols, whitespace and the "ab" ("from") prefix; with
/// both separators present the dot is a thousands separator and the comma the
/// decimal point, with only a comma the comma is the decimal point.
pub fn parse_price(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    let lowered = trimmed.to_lowercase();
    let without_ab = lowered
        .strip_prefix("ab")
        .map(|rest| rest.trim_start())
        .unwrap_or(&lowered);

    let mut cleaned: String = without_ab
        .chars()
        .filter(|ch| !matches!(ch, '€' | '$' | '£' | '*') && !ch.is_whitespace())
        .collect();

    if cleaned.contains(',') && cleaned.contains('.') {
        cleaned = cleaned.replace('.', "").replace(',', ".");
    } else if cleaned.contains(',') {
        cleaned = cleaned.replace(',', ".");
    }

    let number = Regex::new(r"(\d+\.?\d*)").ok()?;
    let captured = number.captures(&cleaned)?;
    captured.get(1)?.as_str().parse::<f64>().ok()
}

/// Reduce the per-merchant candidate lists to a single quote: the minimum of
/// each non-empty list competes, and the globally smallest wins. Equal
/// minimums go to billiger (stable sort, billiger inserted first).
pub fn pick_lowest(billiger: &[f64], ebay: &[f64]) -> PriceQuote {
    let mut candidates: Vec<(PriceSource, f64)> = vec![];

    if let Some(lowest) = billiger.iter().copied().reduce(f64::min) {
        log::info!("  Lowest billiger: {} EUR ({} offers)", lowest, billiger.len());
        candidates.push((PriceSource::Billiger, lowest));
    }
    if let Some(lowest) = ebay.iter().copied().reduce(f64::min) {
        log::info!("  Lowest eBay: {} EUR ({} offers)", lowest, ebay.len());
        candidates.push((PriceSource::Ebay, lowest));
    }

    let best = candidates
        .into_iter()
        .sorted_by(|a, b| a.1.total_cmp(&b.1))
        .next();

    match best {
        Some((PriceSource::Billiger, price)) => PriceQuote {
            billiger_price: Some(price),
            ebay_price: None,
            source: Some(PriceSource::Billiger),
            status: LookupStatus::Found,
        },
        Some((PriceSource::Ebay, price)) => PriceQuote {
            billiger_price: None,
            ebay_price: Some(price),
            source: Some(PriceSource::Ebay),
            status: LookupStatus::Found,
        },
        None => PriceQuote::not_found(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_price_handles_german_formats() {
        assert_eq!(parse_price("1.234,56 €"), Some(1234.56));
        assert_eq!(parse_price("19,99"), Some(19.99));
        assert_eq!(parse_price("ab 5,00"), Some(5.00));
        assert_eq!(parse_price("12.50"), Some(12.50));
        assert_eq!(parse_price("ab 1.299,00 €"), Some(1299.00));
    }

    #[test]
    fn parse_price_rejects_garbage() {
        assert_eq!(parse_price(""), None);
        assert_eq!(parse_price("n/a"), None);
        assert_eq!(parse_price("   "), None);
        assert_eq!(parse_price("kostenlos"), None);
    }

    #[test]
    fn pick_lowest_prefers_cheapest_merchant() {
        let quote = pick_lowest(&[12.5, 9.99], &[15.0]);
        assert_eq!(quote.billiger_price, Some(9.99));
        assert_eq!(quote.ebay_price, None);
        assert_eq!(quote.source, Some(PriceSource::Billiger));
        assert_eq!(quote.status, LookupStatus::Found);

        let quote = pick_lowest(&[20.0], &[8.49, 11.0]);
        assert_eq!(quote.ebay_price, Some(8.49));
        assert_eq!(quote.billiger_price, None);
        assert_eq!(quote.source, Some(PriceSource::Ebay));
    }

    #[test]
    fn pick_lowest_with_no_offers_is_not_found() {
        let quote = pick_lowest(&[], &[]);
        assert_eq!(quote.status, LookupStatus::NotFound);
        assert_eq!(quote.billiger_price, None);
        assert_eq!(quote.ebay_price, None);
        assert_eq!(quote.source, None);
    }

    #[test]
    fn equal_minimums_go_to_billiger() {
        let quote = pick_lowest(&[10.0], &[10.0]);
        assert_eq!(quote.source, Some(PriceSource::Billiger));
        assert_eq!(quote.billiger_price, Some(10.0));
        assert_eq!(quote.ebay_price, None);
    }

    #[test]
    fn status_cells_match_spreadsheet_values() {
        assert_eq!(LookupStatus::Found.as_cell(), "Found");
        assert_eq!(LookupStatus::NotFound.as_cell(), "NOT FOUND");
    }
}
