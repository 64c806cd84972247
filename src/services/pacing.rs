use std::time::Duration;

use rand::Rng;
use thirtyfour::{error::WebDriverResult, WebElement};

use crate::configuration::PacingSettings;

const SHORT_COOLDOWN_EVERY: u64 = 100;
const LONG_COOLDOWN_EVERY: u64 = 500;

/// Even a misconfigured delay window never yields a zero-delay action.
const BASE_DELAY_FLOOR_SECS: f64 = 0.05;

/// What one action has to wait before touching the network.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayPlan {
    pub base: Duration,
    pub short_cooldown: Option<Duration>,
    pub long_cooldown: Option<Duration>,
}

impl DelayPlan {
    pub fn total(&self) -> Duration {
        self.base
            + self.short_cooldown.unwrap_or_default()
            + self.long_cooldown.unwrap_or_default()
    }
}

/// Compute the delay for the action with the given (1-based) request count.
/// Every 100th request pays a short cooldown, every 500th a longer one, on
/// top of the base uniform delay.
pub fn plan_delay<R: Rng>(count: u64, settings: &PacingSettings, rng: &mut R) -> DelayPlan {
    let min = settings.delay_min_secs.max(BASE_DELAY_FLOOR_SECS);
    let max = if settings.delay_max_secs > min {
        settings.delay_max_secs
    } else {
        min + 0.1
    };

    let short_cooldown = (count % SHORT_COOLDOWN_EVERY == 0)
        .then(|| Duration::from_secs_f64(rng.gen_range(3.0..6.0)));
    let long_cooldown = (count % LONG_COOLDOWN_EVERY == 0)
        .then(|| Duration::from_secs_f64(rng.gen_range(8.0..15.0)));

    DelayPlan {
        base: Duration::from_secs_f64(rng.gen_range(min..max)),
        short_cooldown,
        long_cooldown,
    }
}

/// Serializes and throttles access to the browser session. One instance per
/// engine; the request counter spans the whole session lifetime.
pub struct Pacer {
    settings: PacingSettings,
    request_count: u64,
}

impl Pacer {
    pub fn new(settings: PacingSettings) -> Self {
        Pacer {
            settings,
            request_count: 0,
        }
    }

    pub fn request_count(&self) -> u64 {
        self.request_count
    }

    /// Sleep the randomized delay in front of one network-facing action.
    pub async fn pause(&mut self) {
        self.request_count += 1;

        let plan = plan_delay(self.request_count, &self.settings, &mut rand::thread_rng());

        if plan.short_cooldown.is_some() {
            log::info!("Short pause after {} requests", self.request_count);
        }
        if plan.long_cooldown.is_some() {
            log::info!("Longer pause after {} requests", self.request_count);
        }

        tokio::time::sleep(plan.total()).await;
    }

    /// Brief settle between two interactions with the same page, within the
    /// given millisecond window.
    pub async fn settle(&self, min_ms: u64, max_ms: u64) {
        let ms = rand::thread_rng().gen_range(min_ms..max_ms);
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    /// Send keystrokes one character at a time with small random delays, the
    /// way a person types into a search box.
    pub async fn type_like_human(&self, element: &WebElement, text: &str) -> WebDriverResult<()> {
        for ch in text.chars() {
            element.send_keys(ch.to_string()).await?;
            let ms = rand::thread_rng().gen_range(20..80);
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        Ok(())
    }
}
