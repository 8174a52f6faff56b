//! Weather skill
//!
//! Pulls a place name out of the message, geocodes it, then renders either
//! the current conditions or the next 24 hours of 3-hourly forecast.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Offset, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{info, warn};

use super::{Reply, SkillKind};

pub const WEATHER_HELP: &str =
    "🌦️ Tell me which place you mean, for example \"weather in London\" or \"Paris weather\".";
pub const WEATHER_APOLOGY: &str =
    "🌧️ Sorry, I couldn't fetch the weather right now. Please try again later.";

/// 3-hour steps covering the next day
pub const FORECAST_ENTRIES: usize = 8;

static FORECAST_INTENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:forecast(?:s|ed|ing)?|tomorrow|next|weeks?|weekly|weekend)\b")
        .expect("forecast regex")
});

/// Location rules, tried in order; the first that yields a place wins
static LOCATION_RULES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\bin\s+(.+)",
        r"(?i)\bat\s+(.+)",
        r"(?i)^(.+?)\s+weather\b",
        r"(?i)\bweather\s+(?:(?:in|at|for)\s+)?(.+)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("location regex"))
    .collect()
});

const LEADING_NOISE: &[&str] = &[
    "what", "what's", "whats", "how", "how's", "hows", "is", "the", "tell", "me", "show",
    "give", "today's", "todays", "current", "currently", "and",
];

const TRAILING_NOISE: &[&str] = &[
    "today", "tomorrow", "tonight", "now", "right", "please", "currently", "forecast", "forecasts",
    "weather", "next", "weekly", "this", "week", "weekend", "for", "on", "the", "is", "like", "moment", "hours", "days",
];

#[derive(Debug, Clone, PartialEq)]
pub struct GeoLocation {
    pub name: String,
    pub country: String,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CurrentConditions {
    pub observed_at: DateTime<Utc>,
    /// Seconds east of UTC at the location
    pub utc_offset_secs: i32,
    pub temp: f64,
    pub feels_like: f64,
    pub description: String,
    pub humidity: u32,
    pub wind_speed: f64,
    pub cloud_cover: u32,
    pub sunrise: DateTime<Utc>,
    pub sunset: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastEntry {
    pub at: DateTime<Utc>,
    pub temp: f64,
    pub feels_like: f64,
    pub description: String,
    pub humidity: u32,
    pub wind_speed: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Forecast {
    pub utc_offset_secs: i32,
    pub entries: Vec<ForecastEntry>,
}

#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("weather service unavailable: {0}")]
    Unavailable(String),
}

/// Geocoding + weather data provider
#[async_trait]
pub trait WeatherApi: Send + Sync {
    async fn geocode(&self, query: &str) -> Result<Option<GeoLocation>, WeatherError>;
    async fn current(&self, lat: f64, lon: f64) -> Result<CurrentConditions, WeatherError>;
    async fn forecast(&self, lat: f64, lon: f64) -> Result<Forecast, WeatherError>;
}

pub fn wants_forecast(text: &str) -> bool {
    FORECAST_INTENT.is_match(text)
}

/// Find the place a weather question is about
pub fn extract_location(text: &str) -> Option<String> {
    let text = text.trim();
    LOCATION_RULES.iter().find_map(|rule| {
        rule.captures(text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| clean_location(m.as_str()))
    })
}

fn clean_location(raw: &str) -> Option<String> {
    let cut = raw
        .split(|c| matches!(c, '?' | '!' | ',' | ';'))
        .next()
        .unwrap_or("")
        .trim()
        .trim_end_matches('.');

    let mut words: Vec<&str> = cut.split_whitespace().collect();
    while let Some(last) = words.last() {
        let lower = last.to_lowercase();
        if TRAILING_NOISE.contains(&lower.as_str()) || !lower.chars().any(char::is_alphabetic) {
            words.pop();
        } else {
            break;
        }
    }
    while let Some(first) = words.first() {
        if LEADING_NOISE.contains(&first.to_lowercase().as_str()) {
            words.remove(0);
        } else {
            break;
        }
    }

    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

pub struct WeatherSkill {
    api: Arc<dyn WeatherApi>,
}

impl WeatherSkill {
    pub fn new(api: Arc<dyn WeatherApi>) -> Self {
        Self { api }
    }

    pub async fn answer(&self, text: &str) -> Reply {
        let Some(location) = extract_location(text) else {
            return Reply::fallback(WEATHER_HELP, SkillKind::Weather);
        };

        if wants_forecast(text) {
            self.get_forecast(&location).await
        } else {
            self.get_current_weather(&location).await
        }
    }

    pub async fn get_current_weather(&self, query: &str) -> Reply {
        let location = match self.resolve(query).await {
            Ok(location) => location,
            Err(reply) => return reply,
        };

        match self.api.current(location.lat, location.lon).await {
            Ok(conditions) => Reply::answer(render_current(&location, &conditions), SkillKind::Weather),
            Err(e) => {
                warn!("Current weather for {} failed: {}", location.name, e);
                Reply::fallback(WEATHER_APOLOGY, SkillKind::Weather)
            }
        }
    }

    pub async fn get_forecast(&self, query: &str) -> Reply {
        let location = match self.resolve(query).await {
            Ok(location) => location,
            Err(reply) => return reply,
        };

        match self.api.forecast(location.lat, location.lon).await {
            Ok(forecast) => Reply::answer(render_forecast(&location, &forecast), SkillKind::Weather),
            Err(e) => {
                warn!("Forecast for {} failed: {}", location.name, e);
                Reply::fallback(WEATHER_APOLOGY, SkillKind::Weather)
            }
        }
    }

    async fn resolve(&self, query: &str) -> Result<GeoLocation, Reply> {
        match self.api.geocode(query).await {
            Ok(Some(location)) => {
                info!("Resolved \"{}\" to {}, {}", query, location.name, location.country);
                Ok(location)
            }
            Ok(None) => Err(Reply::fallback(
                format!("📍 Sorry, I couldn't find the location \"{}\".", query),
                SkillKind::Weather,
            )),
            Err(e) => {
                warn!("Geocoding \"{}\" failed: {}", query, e);
                Err(Reply::fallback(WEATHER_APOLOGY, SkillKind::Weather))
            }
        }
    }
}

fn local_offset(utc_offset_secs: i32) -> FixedOffset {
    FixedOffset::east_opt(utc_offset_secs).unwrap_or_else(|| Utc.fix())
}

pub fn render_current(location: &GeoLocation, c: &CurrentConditions) -> String {
    let tz = local_offset(c.utc_offset_secs);
    let mut out = String::new();
    let _ = writeln!(out, "🌤️ Weather in {}, {}", location.name, location.country);
    let _ = writeln!(
        out,
        "🕒 Updated: {}",
        c.observed_at.with_timezone(&tz).format("%a %d %b %H:%M")
    );
    let _ = writeln!(
        out,
        "🌡️ Temperature: {}°C (feels like {}°C)",
        c.temp.round() as i64,
        c.feels_like.round() as i64
    );
    let _ = writeln!(out, "☁️ Condition: {}", c.description);
    let _ = writeln!(out, "💧 Humidity: {}%", c.humidity);
    let _ = writeln!(out, "💨 Wind: {} m/s", c.wind_speed);
    let _ = writeln!(out, "🌫️ Cloud cover: {}%", c.cloud_cover);
    let _ = writeln!(out, "🌅 Sunrise: {}", c.sunrise.with_timezone(&tz).format("%H:%M"));
    let _ = write!(out, "🌇 Sunset: {}", c.sunset.with_timezone(&tz).format("%H:%M"));
    out
}

pub fn render_forecast(location: &GeoLocation, forecast: &Forecast) -> String {
    let tz = local_offset(forecast.utc_offset_secs);
    let mut out = format!(
        "📅 Forecast for {}, {} (next 24 hours):",
        location.name, location.country
    );
    for entry in forecast.entries.iter().take(FORECAST_ENTRIES) {
        let _ = write!(
            out,
            "\n{}: {}°C (feels like {}°C), {}, 💧 {}%, 💨 {} m/s",
            entry.at.with_timezone(&tz).format("%a %H:%M"),
            entry.temp.round() as i64,
            entry.feels_like.round() as i64,
            entry.description,
            entry.humidity,
            entry.wind_speed
        );
    }
    out
}
