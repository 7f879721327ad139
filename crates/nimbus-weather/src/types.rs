use serde::{Deserialize, Serialize};

/// Short condition descriptor (e.g. `"Clouds"`, `"scattered clouds"`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub main: String,
    pub description: String,
}

/// Temperatures as reported by the service (Kelvin, `units=standard`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Temperature {
    pub temp: f64,
    pub feels_like: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wind {
    /// Meters per second
    pub speed: f64,
    /// Direction in degrees, when reported
    #[serde(default)]
    pub deg: Option<i32>,
}

/// Sunrise/sunset as unix timestamps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub sunrise: i64,
    pub sunset: i64,
}

/// Current weather observation for one city
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherData {
    #[serde(rename = "weather", default)]
    pub conditions: Vec<Condition>,
    #[serde(rename = "main")]
    pub temperature: Temperature,
    #[serde(default)]
    pub visibility: u32,
    pub wind: Wind,
    /// Observation time (unix seconds)
    #[serde(rename = "dt")]
    pub datetime: i64,
    #[serde(rename = "sys")]
    pub system: SystemInfo,
    /// Shift from UTC in seconds
    #[serde(default)]
    pub timezone: i32,
    pub name: String,
}

impl WeatherData {
    /// The primary condition, if the service reported any
    pub fn condition(&self) -> Option<&Condition> {
        self.conditions.first()
    }

    #[cfg(test)]
    pub(crate) fn sample(name: &str) -> Self {
        Self {
            conditions: vec![Condition {
                main: "Clear".to_string(),
                description: "clear sky".to_string(),
            }],
            temperature: Temperature {
                temp: 293.15,
                feels_like: 292.0,
            },
            visibility: 10_000,
            wind: Wind {
                speed: 3.5,
                deg: Some(180),
            },
            datetime: 1_700_000_000,
            system: SystemInfo {
                sunrise: 1_699_950_000,
                sunset: 1_699_990_000,
            },
            timezone: 3600,
            name: name.to_string(),
        }
    }
}
