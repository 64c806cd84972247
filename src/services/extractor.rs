use regex::Regex;
use scraper::{Html, Selector};
use thirtyfour::{By, WebDriver, WebElement};

use crate::domain::{parse_price, PriceSource, MAX_PLAUSIBLE_PRICE};

/// Root of the result-card grid on a search-results page.
const CARDS_BASE: &str = "/html/body/div[3]/div[6]/div[4]/div[2]/div[5]/div[3]/div";

const MAX_RESULT_CARDS: usize = 12;

/// Offer-row strategies for a product detail page, in priority order.
const OFFER_ROW_SELECTORS: [&str; 7] = [
    r#"[class*="offer"]"#,
    r#"[class*="shop"]"#,
    r#"[class*="merchant"]"#,
    r#"[class*="dealer"]"#,
    r#"tr[class*="row"]"#,
    r#"[class*="price-list"] > div"#,
    r#"[class*="pricelist"] > div"#,
];

/// Lines carrying these terms are rental/shipping noise, not offer prices.
const NOISE_TERMS: [&str; 5] = ["monat", "mieten", "versand", "shipping", "lieferung"];

/// Scan the result cards for billiger "ab ..." fragments and eBay merchant
/// offers. Card absence after the first position ends the scan; absence at
/// the first position is tolerated once. The scan stops early once both
/// merchants have a candidate.
pub async fn extract_search_results(driver: &WebDriver) -> (Vec<f64>, Vec<f64>) {
    let mut billiger: Vec<f64> = vec![];
    let mut ebay: Vec<f64> = vec![];

    for idx in 1..=MAX_RESULT_CARDS {
        let xpath = format!("{}/div[{}]", CARDS_BASE, idx);
        let card = match driver.find(By::XPath(xpath.as_str())).await {
            Ok(card) => card,
            Err(_) => {
                if idx > 1 {
                    break;
                }
                continue;
            }
        };

        if scan_billiger_card(driver, &xpath, idx, &mut billiger).await {
            if !ebay.is_empty() {
                break;
            }
            continue;
        }

        scan_ebay_card(driver, &card, &xpath, idx, &mut ebay).await;
        if !billiger.is_empty() && !ebay.is_empty() {
            break;
        }
    }

    if billiger.is_empty() && ebay.is_empty() {
        scan_single_result(driver, &mut billiger, &mut ebay).await;
    }

    (billiger, ebay)
}

/// Read the "ab 12,34" starting-price fragment of one card. Two sub-layouts
/// exist depending on whether the card carries a rating row.
async fn scan_billiger_card(
    driver: &WebDriver,
    xpath: &str,
    idx: usize,
    prices: &mut Vec<f64>,
) -> bool {
    for sub in [
        format!("{}/div[3]/div[2]", xpath),
        format!("{}/div[2]/div[2]", xpath),
    ] {
        let Ok(element) = driver.find(By::XPath(sub.as_str())).await else {
            continue;
        };
        let Ok(text) = element.text().await else {
            continue;
        };
        if let Some(price) = starting_price(&text) {
            log::info!("  Card {}: billiger - {} EUR", idx, price);
            prices.push(price);
            return true;
        }
    }
    false
}

/// A card is an eBay offer when an adjacent image advertises the merchant in
/// its alt text; the price then sits in one of two alternate positions.
async fn scan_ebay_card(
    driver: &WebDriver,
    card: &WebElement,
    xpath: &str,
    idx: usize,
    prices: &mut Vec<f64>,
) {
    let mut is_ebay = false;
    for img_path in [
        format!("{}/div[2]/div[2]/div[2]/img", xpath),
        format!("{}/div[2]/div[2]/img", xpath),
    ] {
        let Ok(img) = driver.find(By::XPath(img_path.as_str())).await else {
            continue;
        };
        let alt = img.attr("alt").await.ok().flatten().unwrap_or_default();
        if alt.to_lowercase().contains("ebay") {
            is_ebay = true;
            break;
        }
    }
    if !is_ebay {
        is_ebay = card
            .find(By::XPath(".//img[contains(@alt, 'ebay')]"))
            .await
            .is_ok();
    }
    if !is_ebay {
        return;
    }

    for price_path in [
        format!("{}/div[2]/div[2]/div[1]", xpath),
        format!("{}/div[2]/div[1]", xpath),
    ] {
        let Ok(element) = driver.find(By::XPath(price_path.as_str())).await else {
            continue;
        };
        let Ok(text) = element.text().await else {
            continue;
        };
        if let Some(price) = price_fragment(&text) {
            log::info!("  Card {}: eBay - {} EUR", idx, price);
            prices.push(price);
            return;
        }
    }
}

/// Single-result pages drop the index from the card container; apply the same
/// billiger/eBay logic to that one non-indexed layout.
async fn scan_single_result(driver: &WebDriver, billiger: &mut Vec<f64>, ebay: &mut Vec<f64>) {
    if let Ok(element) = driver
        .find(By::XPath(format!("{}/div/div[3]/div[2]", CARDS_BASE).as_str()))
        .await
    {
        if let Ok(text) = element.text().await {
            if let Some(price) = starting_price(&text) {
                log::info!("  Single result: billiger - {} EUR", price);
                billiger.push(price);
            }
        }
    }

    let Ok(card) = driver
        .find(By::XPath(format!("{}/div", CARDS_BASE).as_str()))
        .await
    else {
        return;
    };
    if card
        .find(By::XPath(".//img[contains(@alt, 'ebay')]"))
        .await
        .is_err()
    {
        return;
    }

    for price_path in [
        format!("{}/div/div[2]/div[2]/div[1]", CARDS_BASE),
        format!("{}/div/div[2]/div[1]", CARDS_BASE),
    ] {
        let Ok(element) = driver.find(By::XPath(price_path.as_str())).await else {
            continue;
        };
        let Ok(text) = element.text().await else {
            continue;
        };
        if let Some(price) = price_fragment(&text) {
            log::info!("  Single result: eBay - {} EUR", price);
            ebay.push(price);
            return;
        }
    }
}

/// Pull per-merchant offers from a product detail page: the page source and
/// the rendered body text travel in so the heavy lifting stays pure.
pub async fn extract_product_page(driver: &WebDriver) -> (Vec<f64>, Vec<f64>) {
    let html = driver.source().await.unwrap_or_default();
    let body_text = match driver.find(By::Tag("body")).await {
        Ok(body) => body.text().await.unwrap_or_default(),
        Err(_) => String::new(),
    };
    extract_product_offers(&html, &body_text)
}

/// Offer-row selector tiers over the page markup; the first selector that
/// produces any merchant offer wins. When every tier comes up empty, fall
/// back to line-scanning the rendered body text.
pub fn extract_product_offers(html: &str, body_text: &str) -> (Vec<f64>, Vec<f64>) {
    let mut billiger: Vec<f64> = vec![];
    let mut ebay: Vec<f64> = vec![];

    let document = Html::parse_document(html);
    for selector in OFFER_ROW_SELECTORS {
        let Ok(selector) = Selector::parse(selector) else {
            continue;
        };

        for row in document.select(&selector) {
            let text = row.text().collect::<Vec<_>>().join(" ");
            let markup = row.inner_html();

            let Some(merchant) = merchant_of(&text.to_lowercase(), &markup.to_lowercase())
            else {
                continue;
            };
            let Some(price) = first_euro_price(&text) else {
                continue;
            };
            match merchant {
                PriceSource::Billiger => billiger.push(price),
                PriceSource::Ebay => ebay.push(price),
            }
        }

        if !billiger.is_empty() || !ebay.is_empty() {
            break;
        }
    }

    if billiger.is_empty() && ebay.is_empty() {
        scan_body_lines(body_text, &mut billiger, &mut ebay);
    }

    (billiger, ebay)
}

/// Line-based fallback: judge each line by the merchant context of itself and
/// its immediate neighbors, skipping rental/shipping noise lines.
fn scan_body_lines(body_text: &str, billiger: &mut Vec<f64>, ebay: &mut Vec<f64>) {
    let lines: Vec<&str> = body_text.split('\n').collect();

    for (i, line) in lines.iter().enumerate() {
        let lowered = line.to_lowercase();
        if NOISE_TERMS.iter().any(|term| lowered.contains(term)) {
            continue;
        }

        let start = i.saturating_sub(1);
        let end = (i + 2).min(lines.len());
        let context = lines[start..end].join(" ").to_lowercase();

        let is_ebay = context.contains("ebay");
        let is_billiger = context.contains("billiger") && !is_ebay;
        if !is_ebay && !is_billiger {
            continue;
        }

        for price in euro_prices(line) {
            if is_ebay {
                ebay.push(price);
            } else {
                billiger.push(price);
            }
        }
    }
}

/// eBay wins when both merchants appear in the same row.
fn merchant_of(text: &str, markup: &str) -> Option<PriceSource> {
    let is_ebay = text.contains("ebay") || markup.contains("ebay");
    let is_billiger = (text.contains("billiger") || markup.contains("billiger")) && !is_ebay;

    if is_ebay {
        Some(PriceSource::Ebay)
    } else if is_billiger {
        Some(PriceSource::Billiger)
    } else {
        None
    }
}

/// All plausible currency-suffixed prices in a text fragment.
fn euro_prices(text: &str) -> Vec<f64> {
    let Ok(pattern) = Regex::new(r"(\d+[.,]\d{2})\s*€") else {
        return vec![];
    };
    pattern
        .captures_iter(text)
        .filter_map(|captures| parse_price(captures.get(1)?.as_str()))
        .filter(|price| *price > 0.0 && *price < MAX_PLAUSIBLE_PRICE)
        .collect()
}

fn first_euro_price(text: &str) -> Option<f64> {
    euro_prices(text).into_iter().next()
}

/// First bare decimal-price fragment in a card text.
fn price_fragment(text: &str) -> Option<f64> {
    let pattern = Regex::new(r"(\d+[.,]\d{2})").ok()?;
    let captures = pattern.captures(text)?;
    parse_price(captures.get(1)?.as_str()).filter(|price| *price > 0.0)
}

/// A billiger "starting from" fragment: "ab 12,34", possibly with noise after.
fn starting_price(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if !trimmed.to_lowercase().starts_with("ab") {
        return None;
    }
    price_fragment(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starting_price_requires_the_ab_prefix() {
        assert_eq!(starting_price("ab 12,00 €"), Some(12.0));
        assert_eq!(starting_price("  Ab 299,99"), Some(299.99));
        assert_eq!(starting_price("12,00 €"), None);
        assert_eq!(starting_price("keine Angabe"), None);
    }

    #[test]
    fn price_fragment_takes_the_first_decimal() {
        assert_eq!(price_fragment("14,99 € inkl. Versand 4,95 €"), Some(14.99));
        assert_eq!(price_fragment("keine Angabe"), None);
    }

    #[test]
    fn euro_prices_require_the_currency_suffix_and_sane_range() {
        assert_eq!(euro_prices("19,99 € oder 18,50€"), vec![19.99, 18.50]);
        assert_eq!(euro_prices("19,99 ohne Währung"), Vec::<f64>::new());
        assert_eq!(euro_prices("59999,00 €"), Vec::<f64>::new());
        assert_eq!(euro_prices("0,00 €"), Vec::<f64>::new());
    }

    #[test]
    fn offer_rows_are_split_by_merchant() {
        let html = r#"
            <html><body>
              <div id="listing">
                <div class="offer-row"><span>billiger.de</span><span>22,49 €</span></div>
                <div class="offer-row"><img alt="ebay logo"><span>ebay</span><span>19,99 €</span></div>
                <div class="offer-row"><span>irrelevant Händler</span><span>17,00 €</span></div>
              </div>
            </body></html>
        "#;

        let (billiger, ebay) = extract_product_offers(html, "");
        assert_eq!(billiger, vec![22.49]);
        assert_eq!(ebay, vec![19.99]);
    }

    #[test]
    fn ebay_wins_when_both_merchants_appear_in_one_row() {
        let html = r#"
            <html><body>
              <div class="offer">billiger.de partner: ebay 15,00 €</div>
            </body></html>
        "#;

        let (billiger, ebay) = extract_product_offers(html, "");
        assert!(billiger.is_empty());
        assert_eq!(ebay, vec![15.0]);
    }

    #[test]
    fn line_scan_kicks_in_when_no_selector_matches() {
        let body_text = "Angebote\nebay\n24,90 €\nbilliger.de Bestpreis\n21,00 €\nVersand 4,95 €\n";

        let (billiger, ebay) = extract_product_offers("<html><body></body></html>", body_text);
        assert_eq!(ebay, vec![24.90]);
        assert_eq!(billiger, vec![21.00]);
    }

    #[test]
    fn one_billiger_and_one_ebay_card_resolve_to_the_cheaper_billiger() {
        use crate::domain::{pick_lowest, LookupStatus, PriceSource};

        // A billiger card reading "ab 12,00" next to an eBay card at "14,99".
        let billiger = vec![starting_price("ab 12,00 €").unwrap()];
        let ebay = vec![price_fragment("14,99").unwrap()];

        let quote = pick_lowest(&billiger, &ebay);
        assert_eq!(quote.billiger_price, Some(12.0));
        assert_eq!(quote.ebay_price, None);
        assert_eq!(quote.source, Some(PriceSource::Billiger));
        assert_eq!(quote.status, LookupStatus::Found);
    }

    #[test]
    fn noise_lines_are_excluded_from_the_line_scan() {
        let body_text = "ebay Angebot\nmieten ab 9,99 €\nLieferung 3,00 €\n";

        let (billiger, ebay) = extract_product_offers("<html><body></body></html>", body_text);
        assert!(billiger.is_empty());
        assert!(ebay.is_empty());
    }
}
