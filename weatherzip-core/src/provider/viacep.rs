use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use crate::{LookupError, model::Location};

use super::{LocationProvider, execute};

/// Marker replaced by the postal code in the URL template.
pub const CEP_PLACEHOLDER: &str = "{cep}";

/// Location lookup against a ViaCEP-compatible directory.
#[derive(Debug, Clone)]
pub struct ViaCepProvider {
    url_template: String,
    http: Client,
}

impl ViaCepProvider {
    /// `url_template` must contain [`CEP_PLACEHOLDER`], e.g.
    /// `https://viacep.com.br/ws/{cep}/json/`.
    pub fn new(url_template: impl Into<String>) -> Self {
        Self::with_client(url_template, Client::new())
    }

    pub fn with_client(url_template: impl Into<String>, http: Client) -> Self {
        Self { url_template: url_template.into(), http }
    }

    fn url_for(&self, cep: &str) -> String {
        self.url_template.replace(CEP_PLACEHOLDER, cep)
    }
}

#[async_trait]
impl LocationProvider for ViaCepProvider {
    async fn get_location(&self, cep: &str) -> Result<Location, LookupError> {
        let request =
            self.http.get(self.url_for(cep)).build().map_err(LookupError::CreateRequest)?;
        let (status, body) = execute(&self.http, request).await?;

        // The directory rejects malformed codes with a bare 400.
        if status == StatusCode::BAD_REQUEST {
            return Err(LookupError::InvalidZipcode);
        }
        if !status.is_success() {
            return Err(LookupError::UnexpectedStatusCode(status.as_u16()));
        }

        Location::from_json(&body)
    }
}
