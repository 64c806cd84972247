use std::time::Duration;

use thirtyfour::{error::WebDriverResult, By, Key, WebDriver, WebElement};

use crate::domain::{classify, is_challenge, PageState};

use super::pacing::Pacer;
use super::session;

/// Ordered search-input strategies; the first visible and enabled match wins.
const SEARCH_BOX_SELECTORS: [&str; 5] = [
    r#"input[name="searchstring"]"#,
    r#"input[type="search"]"#,
    r#"input[placeholder*="uche"]"#,
    r#"input[id*="search"]"#,
    r#"input[class*="search"]"#,
];

const RESULT_WAIT: Duration = Duration::from_secs(12);

/// Submit a query through the on-page search box and classify where the site
/// took us. Every stage is recoverable: a missing search box or a WebDriver
/// error collapses to `None`, which the engine resolves to NotFound.
pub async fn search(driver: &WebDriver, pacer: &mut Pacer, query: &str) -> Option<PageState> {
    pacer.pause().await;

    match dispatch(driver, pacer, query).await {
        Ok(outcome) => outcome,
        Err(e) => {
            log::error!("Search error for '{}': {}", query, e);
            None
        }
    }
}

async fn dispatch(
    driver: &WebDriver,
    pacer: &mut Pacer,
    query: &str,
) -> WebDriverResult<Option<PageState>> {
    let mut search_box = find_search_box(driver).await;

    if search_box.is_none() {
        // The session may sit on a stale or interstitial page; go home once
        // and look again.
        log::debug!("Search box not found - navigating to the landing page");
        driver.goto(session::BASE_URL).await?;
        session::wait_document_ready(driver, Duration::from_secs(10)).await;
        pacer.settle(1000, 2000).await;
        session::absorb_challenge(driver).await;
        search_box = find_search_box(driver).await;
    }

    let Some(search_box) = search_box else {
        log::warn!("Search box unavailable");
        return Ok(None);
    };

    search_box.click().await?;
    pacer.settle(50, 150).await;
    search_box.send_keys(Key::Control + "a").await?;
    pacer.settle(30, 80).await;
    pacer.type_like_human(&search_box, query).await?;
    pacer.settle(150, 350).await;
    search_box.send_keys(Key::Enter + "").await?;
    log::debug!("Submitted search: {}", query);

    if !await_outcome(driver, RESULT_WAIT).await {
        log::warn!("Timeout waiting for results: {}", query);
    }
    pacer.settle(300, 700).await;

    session::absorb_challenge(driver).await;

    let url = match driver.current_url().await {
        Ok(url) => url,
        Err(_) => return Ok(Some(PageState::Unknown)),
    };
    let source = match driver.source().await {
        Ok(source) => source,
        Err(_) => return Ok(Some(PageState::Unknown)),
    };

    if is_challenge(&source) {
        return Ok(Some(PageState::ChallengePage));
    }

    Ok(Some(classify(&url, &source)))
}

/// Locate the visible search input on the current page.
pub async fn find_search_box(driver: &WebDriver) -> Option<WebElement> {
    for selector in SEARCH_BOX_SELECTORS {
        let Ok(elements) = driver.find_all(By::Css(selector)).await else {
            continue;
        };
        for element in elements {
            let displayed = element.is_displayed().await.unwrap_or(false);
            let enabled = element.is_enabled().await.unwrap_or(false);
            if displayed && enabled {
                return Some(element);
            }
        }
    }
    None
}

/// Wait until the submission visibly landed somewhere: a product or no-result
/// URL, a result-card link, or zero-results page text. Returns false on
/// timeout; extraction then proceeds on whatever state exists.
async fn await_outcome(driver: &WebDriver, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        if outcome_reached(driver).await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

async fn outcome_reached(driver: &WebDriver) -> bool {
    if let Ok(url) = driver.current_url().await {
        let path = url.path();
        if path.contains("/products/") || path.contains("/noresult") {
            return true;
        }
    }

    if let Ok(links) = driver.find_all(By::Css(r#"a[href*="/products/"]"#)).await {
        if !links.is_empty() {
            return true;
        }
    }

    if let Ok(source) = driver.source().await {
        if source.to_lowercase().contains("keine produkte") {
            return true;
        }
    }

    false
}
