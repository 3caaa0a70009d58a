// callplan-cli/src/tools/forecast.rs
use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use callplan_core::async_trait;
use callplan_core::execution::{FuncExecutor, FuncResult};
use callplan_core::progress;
use callplan_core::CancellationToken;
use serde::Deserialize;
use serde_json::{json, Value};

const OPEN_METEO_URL: &str = "https://api.open-meteo.com/v1/forecast";

#[derive(Debug, Clone, Copy, Deserialize)]
struct Coordinates {
    lat: f64,
    lon: f64,
}

#[derive(Deserialize)]
struct WeatherData {
    hourly: Hourly,
}

#[derive(Deserialize)]
struct Hourly {
    temperature_2m: Vec<f64>,
    windspeed_10m: Vec<f64>,
}

/// Fetches an hourly forecast from Open-Meteo and summarizes it.
pub struct GetWeatherForecast {
    http: reqwest::Client,
}

impl GetWeatherForecast {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl FuncExecutor for GetWeatherForecast {
    async fn call(
        &self,
        _cancel: CancellationToken,
        args: HashMap<String, Value>,
        progress: Arc<dyn progress::Stream>,
    ) -> Result<FuncResult> {
        let coordinates: Coordinates = args
            .get("coordinates")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .context("invalid coordinates argument")?
            .context("coordinates argument is required")?;

        let Coordinates { lat, lon } = coordinates;
        progress.send(&format!("Retrieving weather forecast for {lat}, {lon}..."));

        let response = self
            .http
            .get(OPEN_METEO_URL)
            .query(&[
                ("latitude", lat.to_string()),
                ("longitude", lon.to_string()),
                ("hourly", "temperature_2m,windspeed_10m".to_string()),
            ])
            .send()
            .await
            .context("forecast request failed")?;

        let weather: WeatherData = response
            .json()
            .await
            .context("failed to decode forecast response")?;

        let temperature = weather.hourly.temperature_2m;
        let windspeed = weather.hourly.windspeed_10m;

        let value = json!({ "temperature": &temperature, "windspeed": &windspeed });

        Ok(FuncResult::found(
            value,
            FuncResult::formatter(move || {
                let (min_temp, max_temp) = min_max(&temperature);
                let (min_wind, max_wind) = min_max(&windspeed);

                let mut output =
                    format!("Here is the weather forecast for {lat}, {lon}:\n\n");
                output.push_str(&format!(
                    "Temperature Summary:\n- Average Temperature: {:.1} C\n- Minimum Temperature: {:.1} C\n- Maximum Temperature: {:.1} C\n\n",
                    average(&temperature),
                    min_temp,
                    max_temp
                ));
                output.push_str(&format!(
                    "Wind Speed Summary:\n- Average Wind Speed: {:.1} km/h\n- Minimum Wind Speed: {:.1} km/h\n- Maximum Wind Speed: {:.1} km/h\n",
                    average(&windspeed),
                    min_wind,
                    max_wind
                ));
                Ok(output)
            }),
        ))
    }
}

fn average(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

fn min_max(data: &[f64]) -> (f64, f64) {
    data.iter().fold((f64::MAX, f64::MIN), |(min, max), &value| {
        (min.min(value), max.max(value))
    })
}
