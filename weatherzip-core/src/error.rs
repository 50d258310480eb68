use std::fmt;

use thiserror::Error;

/// A field of a location-lookup payload that must be a string when present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationField {
    Code,
    Street,
    District,
    City,
    RegionCode,
}

impl LocationField {
    /// Key used by the location directory in its JSON payload.
    pub fn key(&self) -> &'static str {
        match self {
            LocationField::Code => "cep",
            LocationField::Street => "logradouro",
            LocationField::District => "bairro",
            LocationField::City => "localidade",
            LocationField::RegionCode => "uf",
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            LocationField::Code => "zipcode",
            LocationField::Street => "street",
            LocationField::District => "neighborhood",
            LocationField::City => "location",
            LocationField::RegionCode => "federative unit",
        }
    }
}

impl fmt::Display for LocationField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Every way a CEP-to-weather lookup can fail.
///
/// Variants are compared by kind (`matches!`), never by message, so the
/// use case hands them up the stack without wrapping.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("invalid zipcode")]
    InvalidZipcode,

    #[error("zipcode not found")]
    ZipcodeNotFound,

    #[error("invalid {0} data")]
    InvalidLocationField(LocationField),

    #[error("location not found")]
    LocationNotFound,

    #[error("unexpected bad request error")]
    UnexpectedBadRequest,

    #[error("parameter 'q' not provided")]
    ParameterNotProvided,

    #[error("API request URL is invalid")]
    ApiUrlIsInvalid,

    #[error("invalid JSON body in bulk request")]
    JsonBodyIsInvalid,

    #[error("too many locations in bulk request")]
    TooManyLocations,

    #[error("internal application error")]
    InternalApplication,

    #[error("invalid location data")]
    InvalidLocationData,

    #[error("invalid current weather data")]
    InvalidCurrentData,

    #[error("failed to create request: {0}")]
    CreateRequest(#[source] reqwest::Error),

    #[error("failed to make request: {0}")]
    MakeRequest(#[source] reqwest::Error),

    #[error("unexpected status code: {0}")]
    UnexpectedStatusCode(u16),

    #[error("failed to decode response: {0}")]
    DecodeResponse(#[source] serde_json::Error),
}

impl LookupError {
    /// Translate a weather provider error code found in a 400 body.
    pub fn from_weather_code(code: i64) -> Self {
        match code {
            1003 => LookupError::ParameterNotProvided,
            1005 => LookupError::ApiUrlIsInvalid,
            1006 => LookupError::LocationNotFound,
            9000 => LookupError::JsonBodyIsInvalid,
            9001 => LookupError::TooManyLocations,
            9999 => LookupError::InternalApplication,
            _ => LookupError::UnexpectedBadRequest,
        }
    }
}

/// A host probe could not produce a reading.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("cpu statistics unavailable: {0}")]
    Cpu(String),

    #[error("memory statistics unavailable: {0}")]
    Memory(String),
}
