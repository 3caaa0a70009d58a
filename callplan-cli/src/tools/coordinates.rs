// callplan-cli/src/tools/coordinates.rs
use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use callplan_core::async_trait;
use callplan_core::execution::{FuncExecutor, FuncResult};
use callplan_core::progress;
use callplan_core::CancellationToken;
use serde::Deserialize;
use serde_json::{json, Value};

const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org/search";

#[derive(Deserialize)]
struct NominatimEntry {
    lat: String,
    lon: String,
}

/// Geocodes a city name through Nominatim.
pub struct GetCoordinates {
    http: reqwest::Client,
}

impl GetCoordinates {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl FuncExecutor for GetCoordinates {
    async fn call(
        &self,
        _cancel: CancellationToken,
        args: HashMap<String, Value>,
        progress: Arc<dyn progress::Stream>,
    ) -> Result<FuncResult> {
        let Some(city) = args.get("city").and_then(Value::as_str) else {
            bail!("city argument is required");
        };

        progress.send(&format!("Retrieving coordinates for {city}..."));

        let response = self
            .http
            .get(NOMINATIM_URL)
            .query(&[("q", city), ("format", "json")])
            .send()
            .await
            .context("geocoding request failed")?;

        if !response.status().is_success() {
            bail!(
                "failed to retrieve coordinates for {}: {}",
                city,
                response.status()
            );
        }

        let entries: Vec<NominatimEntry> = response
            .json()
            .await
            .context("failed to decode geocoding response")?;

        let Some(entry) = entries.first() else {
            return Ok(FuncResult::not_found(Some(FuncResult::formatter(|| {
                Ok("Location not found".to_string())
            }))));
        };

        let lat: f64 = entry.lat.parse().context("invalid latitude in response")?;
        let lon: f64 = entry.lon.parse().context("invalid longitude in response")?;

        Ok(FuncResult::found(
            json!({ "lat": lat, "lon": lon }),
            FuncResult::formatter(move || {
                Ok(format!("Latitude: {lat:.6}, Longitude: {lon:.6}"))
            }),
        ))
    }
}
