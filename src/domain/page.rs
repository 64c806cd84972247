use url::Url;

/// Transient classification of the browser's current document. Derived from
/// the URL and the page text, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    SearchResults,
    ProductPage,
    NoResults,
    ChallengePage,
    Unknown,
}

const NO_RESULT_URL_MARKER: &str = "/noresult";
const PRODUCT_URL_MARKER: &str = "/products/";

const NO_RESULT_PHRASES: [&str; 2] = ["keine produkte gefunden", "leider keine"];

const CHALLENGE_MARKERS: [&str; 4] = [
    "Nur einen Moment",
    "Just a moment",
    "Checking your browser",
    "Überprüfung Ihres Browsers",
];

/// True when the page shows an anti-bot interstitial instead of real content.
pub fn is_challenge(page_source: &str) -> bool {
    CHALLENGE_MARKERS
        .iter()
        .any(|marker| page_source.contains(marker))
}

pub fn classify(url: &Url, page_source: &str) -> PageState {
    let path = url.path();

    if path.contains(NO_RESULT_URL_MARKER) {
        return PageState::NoResults;
    }

    let lowered = page_source.to_lowercase();
    if NO_RESULT_PHRASES
        .iter()
        .any(|phrase| lowered.contains(phrase))
    {
        return PageState::NoResults;
    }

    if path.contains(PRODUCT_URL_MARKER) {
        return PageState::ProductPage;
    }

    PageState::SearchResults
}
