use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{LocationField, LookupError};

/// Offset between the Celsius and Kelvin scales.
pub const KELVIN_OFFSET: f64 = 273.15;

pub fn celsius_to_kelvin(celsius: f64) -> f64 {
    celsius + KELVIN_OFFSET
}

/// Address record resolved from a postal code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Location {
    pub code: String,
    pub street: String,
    pub district: String,
    pub city: String,
    pub region_code: String,
}

impl Location {
    /// Decode a location-directory payload.
    ///
    /// Absent fields stay empty. A field that is present with anything but a
    /// string (including `null`) is rejected with the error naming it, and the
    /// directory's `erro` marker turns into [`LookupError::ZipcodeNotFound`].
    pub fn from_json(body: &[u8]) -> Result<Self, LookupError> {
        let raw: RawLocation = serde_json::from_slice(body).map_err(LookupError::DecodeResponse)?;
        Location::try_from(raw)
    }
}

#[derive(Debug, Deserialize)]
struct RawLocation {
    #[serde(default, deserialize_with = "present")]
    erro: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    cep: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    logradouro: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    bairro: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    localidade: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    uf: Option<Value>,
}

impl TryFrom<RawLocation> for Location {
    type Error = LookupError;

    fn try_from(raw: RawLocation) -> Result<Self, Self::Error> {
        if raw.erro.as_ref().is_some_and(is_not_found_marker) {
            return Err(LookupError::ZipcodeNotFound);
        }

        Ok(Location {
            code: text_field(raw.cep, LocationField::Code)?,
            street: text_field(raw.logradouro, LocationField::Street)?,
            district: text_field(raw.bairro, LocationField::District)?,
            city: text_field(raw.localidade, LocationField::City)?,
            region_code: text_field(raw.uf, LocationField::RegionCode)?,
        })
    }
}

/// Keeps an explicit `null` distinguishable from a missing key.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

// The directory has answered both `true` and `"true"` over the years.
fn is_not_found_marker(value: &Value) -> bool {
    matches!(value, Value::Bool(true)) || value.as_str() == Some("true")
}

fn text_field(value: Option<Value>, field: LocationField) -> Result<String, LookupError> {
    match value {
        None => Ok(String::new()),
        Some(Value::String(text)) => Ok(text),
        Some(_) => Err(LookupError::InvalidLocationField(field)),
    }
}

/// Current conditions for a named location.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Weather {
    pub location: WeatherLocation,
    pub current: CurrentWeather,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherLocation {
    pub name: String,
    pub region: String,
    pub country: String,
    #[serde(default)]
    pub lat: f64,
    #[serde(default)]
    pub lon: f64,
    #[serde(default)]
    pub tz_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrentWeather {
    pub temp_c: f64,
    pub temp_f: f64,
    /// Always derived from `temp_c`; the provider value is never read.
    #[serde(skip_deserializing)]
    pub temp_k: f64,
    #[serde(default)]
    pub humidity: u8,
    #[serde(default)]
    pub wind_kph: f64,
    #[serde(default)]
    pub condition: Condition,
    #[serde(default)]
    pub last_updated: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub icon: String,
}

impl Weather {
    /// Decode a weather-provider payload and derive the Kelvin temperature.
    pub fn from_json(body: &[u8]) -> Result<Self, LookupError> {
        let mut document: Value =
            serde_json::from_slice(body).map_err(LookupError::DecodeResponse)?;

        let location = document
            .get_mut("location")
            .map(Value::take)
            .ok_or(LookupError::InvalidLocationData)?;
        let location: WeatherLocation =
            serde_json::from_value(location).map_err(|_| LookupError::InvalidLocationData)?;

        let current = document
            .get_mut("current")
            .map(Value::take)
            .ok_or(LookupError::InvalidCurrentData)?;
        let mut current: CurrentWeather =
            serde_json::from_value(current).map_err(|_| LookupError::InvalidCurrentData)?;
        current.temp_k = celsius_to_kelvin(current.temp_c);

        Ok(Weather { location, current })
    }
}
