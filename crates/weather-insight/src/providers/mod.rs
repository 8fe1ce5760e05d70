use thiserror::Error;

use crate::model::{CurrentConditions, LocatedForecast, LocationMatch};

pub mod gemini;
pub mod weatherapi;

/// Weather data collaborator. Implementations validate the provider payload
/// before returning typed records.
pub trait WeatherApi {
    fn fetch_forecast(&self, location: &str, days: u8) -> Result<LocatedForecast, ProviderError>;
    fn fetch_current(&self, location: &str) -> Result<CurrentConditions, ProviderError>;
    fn search_locations(&self, query: &str) -> Result<Vec<LocationMatch>, ProviderError>;
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("location not found: {0}")]
    Lookup(String),
    #[error("weather api rejected credentials: {0}")]
    Auth(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("http error ({status}): {message}")]
    Http { status: u16, message: String },
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_messages_name_the_failure() {
        assert_eq!(
            ProviderError::Lookup("Atlantis".to_string()).to_string(),
            "location not found: Atlantis"
        );
        assert_eq!(
            ProviderError::Http {
                status: 503,
                message: "unavailable".to_string()
            }
            .to_string(),
            "http error (503): unavailable"
        );
    }
}
