use anyhow::bail;
use async_trait::async_trait;
use thirtyfour::WebDriver;

use crate::configuration::Settings;
use crate::domain::{pick_lowest, Ean, LookupStatus, PageState, PriceQuote};
use crate::progress::Progress;

use super::extractor;
use super::pacing::Pacer;
use super::search;
use super::session;

/// The one call the batch loop (and any other caller) needs from the engine.
/// Behind a trait so the loop can be exercised against a stub.
#[async_trait]
pub trait EanLookup {
    async fn get_price(&mut self, ean: &Ean) -> anyhow::Result<PriceQuote>;
}

/// The price-discovery engine: owns the one browser session, the pacer and
/// the progress sink. Not designed for parallel lookups; callers drive it
/// one code at a time.
pub struct PriceChecker {
    settings: Settings,
    pacer: Pacer,
    driver: Option<WebDriver>,
    observer: Box<dyn Progress + Send>,
}

impl PriceChecker {
    pub fn new(settings: Settings, observer: Box<dyn Progress + Send>) -> Self {
        let pacer = Pacer::new(settings.pacing.clone());
        PriceChecker {
            settings,
            pacer,
            driver: None,
            observer,
        }
    }

    /// Start the browser session and warm it up on the landing page. No-op
    /// when a session is already live. Failures here are session-fatal and
    /// surface to the caller.
    pub async fn open(&mut self) -> anyhow::Result<()> {
        if self.driver.is_some() {
            return Ok(());
        }

        let driver = session::launch(&self.settings.browser).await?;
        session::establish(&driver).await?;
        self.driver = Some(driver);
        Ok(())
    }

    /// Best-effort teardown; never raises.
    pub async fn close(&mut self) {
        if let Some(driver) = self.driver.take() {
            session::shutdown(driver).await;
        }
    }

    async fn lookup(&mut self, ean: &Ean) -> anyhow::Result<PriceQuote> {
        self.open().await?;
        let Some(driver) = self.driver.as_ref() else {
            bail!("browser session unavailable after open()");
        };

        self.observer.log(&format!("Searching EAN: {}", ean));

        let Some(state) = search::search(driver, &mut self.pacer, ean.as_ref()).await else {
            return Ok(PriceQuote::not_found());
        };

        let (billiger, ebay) = match state {
            PageState::NoResults => {
                self.observer.log("  No results page");
                (vec![], vec![])
            }
            PageState::ChallengePage => {
                self.observer
                    .warn("  Challenge page persisted - nothing to extract");
                (vec![], vec![])
            }
            PageState::Unknown => (vec![], vec![]),
            PageState::ProductPage => {
                self.observer.log("  Direct product page");
                self.pacer.settle(300, 600).await;
                extractor::extract_product_page(driver).await
            }
            PageState::SearchResults => {
                self.pacer.settle(300, 600).await;
                extractor::extract_search_results(driver).await
            }
        };

        let quote = pick_lowest(&billiger, &ebay);
        match (quote.status, quote.source, quote.best_price()) {
            (LookupStatus::Found, Some(source), Some(price)) => {
                self.observer
                    .log(&format!("  -> Best: {} EUR from {}", price, source.as_str()));
            }
            _ => self.observer.log("  -> NOT FOUND"),
        }

        Ok(quote)
    }
}

#[async_trait]
impl EanLookup for PriceChecker {
    async fn get_price(&mut self, ean: &Ean) -> anyhow::Result<PriceQuote> {
        self.lookup(ean).await
    }
}
