// callplan-cli/src/tools/mod.rs

//! Example weather tools: geocoding via Nominatim and forecasts via
//! Open-Meteo.

use std::sync::Arc;

use callplan_core::execution::{FuncExecutor, Orchestrator};
use callplan_core::tools::{FuncDefinition, ToolSet, TypeInfo};
use callplan_core::Tools;

mod coordinates;
mod forecast;

pub use coordinates::GetCoordinates;
pub use forecast::GetWeatherForecast;

pub struct WeatherTools {
    http: reqwest::Client,
}

impl WeatherTools {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

fn named(type_name: &str) -> TypeInfo {
    TypeInfo {
        type_name: type_name.to_string(),
        ..TypeInfo::default()
    }
}

fn described(type_name: &str, description: &str) -> TypeInfo {
    TypeInfo {
        type_name: type_name.to_string(),
        description: description.to_string(),
        ..TypeInfo::default()
    }
}

impl Tools for WeatherTools {
    fn available_tools(&self) -> ToolSet {
        ToolSet {
            functions: vec![
                FuncDefinition {
                    name: "get_coordinates".to_string(),
                    description:
                        "Retrieve the latitude and longitude for a given location (city name)."
                            .to_string(),
                    parameters: TypeInfo {
                        type_name: "object".to_string(),
                        properties: Some(
                            [(
                                "city".to_string(),
                                described(
                                    "string",
                                    "The city name, e.g. Berlin, London, New York City",
                                ),
                            )]
                            .into_iter()
                            .collect(),
                        ),
                        required: vec!["city".to_string()],
                        ..TypeInfo::default()
                    },
                    returns: named("coordinates_value"),
                },
                FuncDefinition {
                    name: "get_weather_forecast".to_string(),
                    description:
                        "Retrieve the weather forecast for a given location (latitude and longitude)."
                            .to_string(),
                    parameters: TypeInfo {
                        type_name: "object".to_string(),
                        properties: Some(
                            [(
                                "coordinates".to_string(),
                                described(
                                    "coordinates_value",
                                    "The latitude and longitude of the location.",
                                ),
                            )]
                            .into_iter()
                            .collect(),
                        ),
                        required: vec!["coordinates".to_string()],
                        ..TypeInfo::default()
                    },
                    returns: named("weather_forecast_value"),
                },
            ],
            type_definitions: [
                (
                    "coordinates_value".to_string(),
                    TypeInfo {
                        type_name: "object".to_string(),
                        properties: Some(
                            [
                                (
                                    "lat".to_string(),
                                    described("number", "Latitude of the location"),
                                ),
                                (
                                    "lon".to_string(),
                                    described("number", "Longitude of the location"),
                                ),
                            ]
                            .into_iter()
                            .collect(),
                        ),
                        ..TypeInfo::default()
                    },
                ),
                (
                    "weather_forecast_value".to_string(),
                    TypeInfo {
                        type_name: "object".to_string(),
                        properties: Some(
                            [
                                (
                                    "temperature".to_string(),
                                    TypeInfo {
                                        type_name: "array".to_string(),
                                        description: "List of hourly temperatures (C).".to_string(),
                                        items: Some(Box::new(named("number"))),
                                        ..TypeInfo::default()
                                    },
                                ),
                                (
                                    "windspeed".to_string(),
                                    TypeInfo {
                                        type_name: "array".to_string(),
                                        description: "List of hourly wind speeds (km/h)."
                                            .to_string(),
                                        items: Some(Box::new(named("number"))),
                                        ..TypeInfo::default()
                                    },
                                ),
                            ]
                            .into_iter()
                            .collect(),
                        ),
                        ..TypeInfo::default()
                    },
                ),
            ]
            .into_iter()
            .collect(),
        }
    }

    fn register_with(&self, orchestrator: &mut Orchestrator) -> anyhow::Result<()> {
        orchestrator.register_function(
            "get_coordinates",
            Arc::new(GetCoordinates::new(self.http.clone())) as Arc<dyn FuncExecutor>,
        );
        orchestrator.register_function(
            "get_weather_forecast",
            Arc::new(GetWeatherForecast::new(self.http.clone())) as Arc<dyn FuncExecutor>,
        );
        Ok(())
    }
}
