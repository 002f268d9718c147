//! Economic calendar collaborator
//!
//! Entries are blacked out around high-impact events of the currencies gold
//! reacts to. The feed is a ForexFactory-style JSON array:
//!
//! ```json
//! [{"title": "Non-Farm Employment Change", "country": "USD",
//!   "date": "2025-01-10T08:30:00-05:00", "impact": "High"}]
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::time::Duration as StdDuration;
use tracing::{debug, info, warn};

use crate::config::NewsConfig;
use crate::error::EngineError;

const REQUEST_TIMEOUT_SECS: u64 = 10;

/// One scheduled release
#[derive(Debug, Clone, PartialEq)]
pub struct NewsEvent {
    pub title: String,
    pub currency: String,
    pub impact: String,
    pub time: DateTime<Utc>,
}

/// Raw feed record
#[derive(Debug, Deserialize)]
struct FeedEvent {
    #[serde(default)]
    title: String,
    #[serde(default)]
    country: String,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    impact: String,
}

/// First event within `window_minutes` of `now`, on either side
pub fn blackout(
    events: &[NewsEvent],
    now: DateTime<Utc>,
    window_minutes: i64,
) -> Option<&NewsEvent> {
    let window = Duration::minutes(window_minutes);
    events.iter().find(|event| (event.time - now).abs() <= window)
}

/// Source of news blackout windows
pub trait NewsCalendar {
    /// Title of the event blacking out `now`, if any
    fn blackout(&self, now: DateTime<Utc>, window_minutes: i64) -> Option<String>;
}

/// Feed-backed calendar, refreshed at most every `refresh_hours`
#[derive(Debug, Clone)]
pub struct EconomicCalendar {
    client: reqwest::Client,
    url: String,
    refresh_every: Duration,
    impact: String,
    currencies: Vec<String>,
    events: Vec<NewsEvent>,
    last_update: Option<DateTime<Utc>>,
}

impl EconomicCalendar {
    pub fn new(config: &NewsConfig) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| EngineError::DataUnavailable(format!("HTTP client: {}", e)))?;

        Ok(EconomicCalendar {
            client,
            url: config.calendar_url.clone(),
            refresh_every: Duration::hours(config.refresh_hours),
            impact: config.impact.clone(),
            currencies: config.currencies.clone(),
            events: Vec::new(),
            last_update: None,
        })
    }

    /// Calendar preloaded with events; never fetches until they go stale
    pub fn with_events(
        config: &NewsConfig,
        events: Vec<NewsEvent>,
        now: DateTime<Utc>,
    ) -> Result<Self, EngineError> {
        let mut calendar = Self::new(config)?;
        calendar.events = events;
        calendar.last_update = Some(now);
        Ok(calendar)
    }

    pub fn events(&self) -> &[NewsEvent] {
        &self.events
    }

    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        match self.last_update {
            None => true,
            Some(last) => now - last >= self.refresh_every,
        }
    }

    /// Fetch the feed if the cached events are stale. On failure the old
    /// events are kept and the next call retries.
    pub async fn refresh(&mut self, now: DateTime<Utc>) -> Result<usize, EngineError> {
        if !self.is_stale(now) {
            return Ok(self.events.len());
        }

        let feed: Vec<FeedEvent> = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| EngineError::DataUnavailable(format!("news feed: {}", e)))?
            .json()
            .await
            .map_err(|e| EngineError::DataUnavailable(format!("news feed body: {}", e)))?;

        self.events = filter_feed(feed, &self.impact, &self.currencies);
        self.last_update = Some(now);
        info!(
            events = self.events.len(),
            impact = %self.impact,
            "News calendar updated"
        );
        Ok(self.events.len())
    }

    /// Parse a raw feed document. Exposed for offline calendars.
    pub fn parse_feed(&self, body: &str) -> Result<Vec<NewsEvent>, EngineError> {
        let feed: Vec<FeedEvent> = serde_json::from_str(body)
            .map_err(|e| EngineError::DataUnavailable(format!("news feed body: {}", e)))?;
        Ok(filter_feed(feed, &self.impact, &self.currencies))
    }
}

impl NewsCalendar for EconomicCalendar {
    fn blackout(&self, now: DateTime<Utc>, window_minutes: i64) -> Option<String> {
        blackout(&self.events, now, window_minutes).map(|event| event.title.clone())
    }
}

fn filter_feed(feed: Vec<FeedEvent>, impact: &str, currencies: &[String]) -> Vec<NewsEvent> {
    feed.into_iter()
        .filter(|e| e.impact.eq_ignore_ascii_case(impact))
        .filter(|e| currencies.iter().any(|c| c.eq_ignore_ascii_case(&e.country)))
        .filter_map(|e| {
            let raw = e.date.as_deref()?;
            match DateTime::parse_from_rfc3339(raw) {
                Ok(time) => Some(NewsEvent {
                    title: e.title,
                    currency: e.country,
                    impact: e.impact,
                    time: time.with_timezone(&Utc),
                }),
                Err(err) => {
                    debug!(date = raw, error = %err, "Skipping news event with bad timestamp");
                    None
                }
            }
        })
        .collect()
}

impl Default for EconomicCalendar {
    fn default() -> Self {
        let config = NewsConfig::default();
        EconomicCalendar {
            client: reqwest::Client::new(),
            url: config.calendar_url,
            refresh_every: Duration::hours(config.refresh_hours),
            impact: config.impact,
            currencies: config.currencies,
            events: Vec::new(),
            last_update: None,
        }
    }
}

/// Log and swallow a refresh failure; the loop keeps trading on stale events
pub async fn refresh_quietly(calendar: &mut EconomicCalendar, now: DateTime<Utc>) {
    if let Err(e) = calendar.refresh(now).await {
        warn!(error = %e, "News calendar refresh failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const FEED: &str = r#"[
        {"title": "Non-Farm Employment Change", "country": "USD", "date": "2025-01-10T08:30:00-05:00", "impact": "High"},
        {"title": "ECB Press Conference", "country": "EUR", "date": "2025-01-10T08:45:00-05:00", "impact": "High"},
        {"title": "Crude Oil Inventories", "country": "USD", "date": "2025-01-10T10:30:00-05:00", "impact": "Medium"},
        {"title": "Bank Holiday", "country": "USD", "date": "not a date", "impact": "High"},
        {"title": "No Date", "country": "USD", "impact": "High"}
    ]"#;

    #[test]
    fn test_feed_keeps_high_impact_usd_only() {
        let calendar = EconomicCalendar::default();
        let events = calendar.parse_feed(FEED).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "Non-Farm Employment Change");
        // 08:30 New York is 13:30 UTC
        assert_eq!(events[0].time, Utc.with_ymd_and_hms(2025, 1, 10, 13, 30, 0).unwrap());
    }

    #[test]
    fn test_blackout_window_both_sides() {
        let calendar = EconomicCalendar::default();
        let events = calendar.parse_feed(FEED).unwrap();
        let at = |h, m| Utc.with_ymd_and_hms(2025, 1, 10, h, m, 0).unwrap();

        assert!(blackout(&events, at(13, 0), 30).is_some());
        assert!(blackout(&events, at(14, 0), 30).is_some());
        assert!(blackout(&events, at(12, 59), 30).is_none());
        assert!(blackout(&events, at(14, 1), 30).is_none());
    }

    #[test]
    fn test_calendar_staleness() {
        let config = NewsConfig::default();
        let t0 = Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap();
        let event = NewsEvent {
            title: "CPI m/m".to_string(),
            currency: "USD".to_string(),
            impact: "High".to_string(),
            time: t0 + Duration::hours(1),
        };
        let calendar = EconomicCalendar::with_events(&config, vec![event], t0).unwrap();

        assert!(!calendar.is_stale(t0 + Duration::hours(3)));
        assert!(calendar.is_stale(t0 + Duration::hours(4)));
        assert_eq!(
            calendar.blackout(t0 + Duration::minutes(45), 30).as_deref(),
            Some("CPI m/m")
        );
    }
}
