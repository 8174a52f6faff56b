//! OpenWeather-backed weather provider (geocoding, current, 5 day / 3 hour)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::weather::{
    CurrentConditions, Forecast, ForecastEntry, GeoLocation, WeatherApi, WeatherError,
    FORECAST_ENTRIES,
};

#[derive(Debug, Deserialize)]
struct GeoHit {
    name: String,
    #[serde(default)]
    country: String,
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
struct MainBlock {
    temp: f64,
    feels_like: f64,
    humidity: u32,
}

#[derive(Debug, Deserialize)]
struct ConditionBlock {
    description: String,
}

#[derive(Debug, Deserialize, Default)]
struct WindBlock {
    #[serde(default)]
    speed: f64,
}

#[derive(Debug, Deserialize, Default)]
struct CloudBlock {
    #[serde(default)]
    all: u32,
}

#[derive(Debug, Deserialize)]
struct SunBlock {
    sunrise: i64,
    sunset: i64,
}

#[derive(Debug, Deserialize)]
struct CurrentResponse {
    dt: i64,
    #[serde(default)]
    timezone: i32,
    main: MainBlock,
    #[serde(default)]
    weather: Vec<ConditionBlock>,
    #[serde(default)]
    wind: WindBlock,
    #[serde(default)]
    clouds: CloudBlock,
    sys: SunBlock,
}

#[derive(Debug, Deserialize)]
struct ForecastItem {
    dt: i64,
    main: MainBlock,
    #[serde(default)]
    weather: Vec<ConditionBlock>,
    #[serde(default)]
    wind: WindBlock,
}

#[derive(Debug, Deserialize)]
struct ForecastCity {
    #[serde(default)]
    timezone: i32,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    list: Vec<ForecastItem>,
    city: ForecastCity,
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, WeatherError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| WeatherError::Unavailable(format!("bad timestamp {}", secs)))
}

fn describe(conditions: &[ConditionBlock]) -> String {
    conditions
        .first()
        .map(|c| c.description.clone())
        .unwrap_or_else(|| "unknown".to_string())
}

impl TryFrom<CurrentResponse> for CurrentConditions {
    type Error = WeatherError;

    fn try_from(r: CurrentResponse) -> Result<Self, Self::Error> {
        Ok(CurrentConditions {
            observed_at: timestamp(r.dt)?,
            utc_offset_secs: r.timezone,
            temp: r.main.temp,
            feels_like: r.main.feels_like,
            description: describe(&r.weather),
            humidity: r.main.humidity,
            wind_speed: r.wind.speed,
            cloud_cover: r.clouds.all,
            sunrise: timestamp(r.sys.sunrise)?,
            sunset: timestamp(r.sys.sunset)?,
        })
    }
}

impl TryFrom<ForecastResponse> for Forecast {
    type Error = WeatherError;

    fn try_from(r: ForecastResponse) -> Result<Self, Self::Error> {
        let entries = r
            .list
            .into_iter()
            .take(FORECAST_ENTRIES)
            .map(|item| {
                Ok(ForecastEntry {
                    at: timestamp(item.dt)?,
                    temp: item.main.temp,
                    feels_like: item.main.feels_like,
                    description: describe(&item.weather),
                    humidity: item.main.humidity,
                    wind_speed: item.wind.speed,
                })
            })
            .collect::<Result<Vec<_>, WeatherError>>()?;
        Ok(Forecast {
            utc_offset_secs: r.city.timezone,
            entries,
        })
    }
}

pub struct OpenWeatherClient {
    client: reqwest::Client,
    base_url: String,
    /// `None` leaves the client unconfigured; every call fails
    api_key: Option<String>,
}

impl OpenWeatherClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, WeatherError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| WeatherError::Unavailable("no API key configured".into()))?;

        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .query(params)
            .query(&[("appid", key)])
            .send()
            .await
            .map_err(|e| WeatherError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WeatherError::Unavailable(format!("{} returned {}", path, status)));
        }

        response
            .json()
            .await
            .map_err(|e| WeatherError::Unavailable(format!("unexpected body from {}: {}", path, e)))
    }
}

#[async_trait]
impl WeatherApi for OpenWeatherClient {
    async fn geocode(&self, query: &str) -> Result<Option<GeoLocation>, WeatherError> {
        let hits: Vec<GeoHit> = self
            .get_json(
                "/geo/1.0/direct",
                &[("q", query.to_string()), ("limit", "1".to_string())],
            )
            .await?;
        Ok(hits.into_iter().next().map(|hit| GeoLocation {
            name: hit.name,
            country: hit.country,
            lat: hit.lat,
            lon: hit.lon,
        }))
    }

    async fn current(&self, lat: f64, lon: f64) -> Result<CurrentConditions, WeatherError> {
        let response: CurrentResponse = self
            .get_json(
                "/data/2.5/weather",
                &[
                    ("lat", lat.to_string()),
                    ("lon", lon.to_string()),
                    ("units", "metric".to_string()),
                ],
            )
            .await?;
        response.try_into()
    }

    async fn forecast(&self, lat: f64, lon: f64) -> Result<Forecast, WeatherError> {
        let response: ForecastResponse = self
            .get_json(
                "/data/2.5/forecast",
                &[
                    ("lat", lat.to_string()),
                    ("lon", lon.to_string()),
                    ("units", "metric".to_string()),
                    ("cnt", FORECAST_ENTRIES.to_string()),
                ],
            )
            .await?;
        response.try_into()
    }
}
