use std::time::Duration;

use anyhow::Context;
use fake_user_agent::get_chrome_rua;
use rand::Rng;
use thirtyfour::prelude::*;

use crate::domain::is_challenge;
use crate::configuration::BrowserSettings;

pub const BASE_URL: &str = "https://www.billiger.de";

const HEALTHY_TITLE_MARKERS: [&str; 2] = ["billiger.de", "preisvergleich"];

/// Start a Chrome session configured to look like a regular browser: fixed
/// window size, German locale, automation switches disabled, a realistic
/// user agent.
pub async fn launch(settings: &BrowserSettings) -> anyhow::Result<WebDriver> {
    let mut caps = DesiredCapabilities::chrome();
    caps.add_arg("--window-size=1920,1080")?;
    caps.add_arg("--lang=de-DE")?;
    caps.add_arg("--disable-blink-features=AutomationControlled")?;
    caps.add_arg("--disable-dev-shm-usage")?;
    caps.add_arg("--no-sandbox")?;
    caps.add_arg(&format!("--user-agent={}", get_chrome_rua()))?;
    caps.add_experimental_option("excludeSwitches", ["enable-automation"])?;
    if settings.headless {
        caps.add_arg("--headless=new")?;
    }

    log::info!("Connecting to WebDriver at {}", settings.webdriver_url);
    let driver = WebDriver::new(&settings.webdriver_url, caps)
        .await
        .context("failed to start the browser session")?;

    Ok(driver)
}

/// Navigate to the landing page and give the site a chance to hand out its
/// cookies. A missing healthy title marker is treated as a possible challenge
/// page: wait longer, then return control either way.
pub async fn establish(driver: &WebDriver) -> anyhow::Result<()> {
    log::info!("Establishing session with {}", BASE_URL);
    driver
        .goto(BASE_URL)
        .await
        .context("failed to open the landing page")?;

    wait_document_ready(driver, Duration::from_secs(10)).await;
    tokio::time::sleep(Duration::from_secs(2)).await;

    let title = driver.title().await.unwrap_or_default().to_lowercase();
    if HEALTHY_TITLE_MARKERS
        .iter()
        .any(|marker| title.contains(marker))
    {
        log::info!("Session established");
    } else {
        log::warn!("Unexpected landing page title - possible challenge, waiting longer");
        tokio::time::sleep(Duration::from_secs(5)).await;
    }

    Ok(())
}

/// Poll `document.readyState` until the page is complete. The timeout is
/// tolerated: callers proceed with whatever state the page is in.
pub async fn wait_document_ready(driver: &WebDriver, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        match driver.execute("return document.readyState", vec![]).await {
            Ok(ret) => {
                if ret
                    .convert::<String>()
                    .map(|state| state == "complete")
                    .unwrap_or(false)
                {
                    return;
                }
            }
            Err(e) => log::debug!("readyState probe failed: {}", e),
        }

        if tokio::time::Instant::now() >= deadline {
            log::warn!("Timed out waiting for document ready state");
            return;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}

/// If the current page is an anti-bot interstitial, wait one settle period so
/// it can resolve itself. Returns whether a challenge was seen. No retry
/// limit: a persisting challenge just means extraction finds nothing.
pub async fn absorb_challenge(driver: &WebDriver) -> bool {
    let source = match driver.source().await {
        Ok(source) => source,
        Err(e) => {
            log::debug!("Could not read page source for challenge check: {}", e);
            return false;
        }
    };

    if !is_challenge(&source) {
        return false;
    }

    let secs = rand::thread_rng().gen_range(5.0..10.0);
    log::warn!("Challenge page detected - waiting it out");
    tokio::time::sleep(Duration::from_secs_f64(secs)).await;
    true
}

/// Best-effort teardown; a browser that is already gone is not an error.
pub async fn shutdown(driver: WebDriver) {
    match driver.quit().await {
        Ok(()) => log::info!("WebDriver closed"),
        Err(e) => log::warn!("Error while closing the browser: {}", e),
    }
}
