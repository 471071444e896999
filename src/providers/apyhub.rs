use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::core::currency::{CurrencyRateProvider, RateDate};

const CONVERT_ENDPOINT: &str = "/data/convert/currency/multiple";
const API_KEY_HEADER: &str = "apy-token";

/// Client for the ApyHub currency conversion API.
///
/// Every call asks for a single target so each rate can be cached on its own.
pub struct ApyHubProvider {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl ApyHubProvider {
    pub fn new(base_url: &str, api_key: Option<&str>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("ratecache/1.0")
            .timeout(timeout)
            .build()?;
        Ok(ApyHubProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(str::to_string),
            client,
        })
    }
}

#[derive(Serialize, Debug)]
struct ConvertRequest<'a> {
    source: &'a str,
    targets: [&'a str; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<&'a str>,
}

#[async_trait]
impl CurrencyRateProvider for ApyHubProvider {
    #[instrument(
        name = "ApyHubRateFetch",
        skip(self),
        fields(source = %source, target = %target, date = %date)
    )]
    async fn get_rate(&self, source: &str, target: &str, date: &RateDate) -> Result<f64> {
        let pair = format!("{source}_{target}");
        let url = format!("{}{}", self.base_url, CONVERT_ENDPOINT);
        debug!("Requesting currency rate from {}", url);

        let body = ConvertRequest {
            source,
            targets: [target],
            date: date.as_param(),
        };
        let mut request = self.client.post(&url).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.header(API_KEY_HEADER, api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {} for currency pair: {}", e, pair))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "HTTP error: {} for currency pair: {}",
                response.status(),
                pair
            ));
        }

        let text = response.text().await?;

        let data: HashMap<String, Value> = serde_json::from_str(&text)
            .map_err(|e| anyhow!("Failed to parse JSON response for {}: {}", pair, e))?;

        // Zero and null count as missing, the API uses them for unknown pairs
        data.get(&pair)
            .and_then(Value::as_f64)
            .filter(|rate| *rate != 0.0)
            .ok_or_else(|| anyhow!("No rate data found for currency pair: {}", pair))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mock_response(response: ResponseTemplate) -> MockServer {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(CONVERT_ENDPOINT))
            .respond_with(response)
            .mount(&mock_server)
            .await;
        mock_server
    }

    fn provider(mock_server: &MockServer) -> ApyHubProvider {
        ApyHubProvider::new(&mock_server.uri(), Some("test-key"), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_successful_rate_fetch() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(CONVERT_ENDPOINT))
            .and(header("apy-token", "test-key"))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({"source": "usd", "targets": ["eur"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"usd_eur": 1.18})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let rate = provider(&mock_server)
            .get_rate("usd", "eur", &RateDate::Today)
            .await
            .expect("Failed to get rate");
        assert_eq!(rate, 1.18);
    }

    #[tokio::test]
    async fn test_date_is_forwarded() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(CONVERT_ENDPOINT))
            .and(body_json(
                json!({"source": "usd", "targets": ["inr"], "date": "2023-10-01"}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"usd_inr": 83.2})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let rate = provider(&mock_server)
            .get_rate("usd", "inr", &RateDate::On("2023-10-01".to_string()))
            .await
            .unwrap();
        assert_eq!(rate, 83.2);
    }

    #[tokio::test]
    async fn test_no_rate_found() {
        let mock_server =
            mock_response(ResponseTemplate::new(200).set_body_json(json!({"usd_gbp": 0.8}))).await;

        let result = provider(&mock_server)
            .get_rate("usd", "eur", &RateDate::Today)
            .await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "No rate data found for currency pair: usd_eur"
        );
    }

    #[tokio::test]
    async fn test_falsy_rates_are_missing() {
        for body in [
            json!({"usd_eur": 0}),
            json!({"usd_eur": null}),
            json!({"usd_eur": "1.18"}),
        ] {
            let mock_server = mock_response(ResponseTemplate::new(200).set_body_json(body)).await;

            let result = provider(&mock_server)
                .get_rate("usd", "eur", &RateDate::Today)
                .await;
            assert!(result.is_err());
        }
    }

    #[tokio::test]
    async fn test_api_error_response() {
        let mock_server = mock_response(ResponseTemplate::new(500)).await;

        let result = provider(&mock_server)
            .get_rate("usd", "eur", &RateDate::Today)
            .await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "HTTP error: 500 Internal Server Error for currency pair: usd_eur"
        );
    }

    #[tokio::test]
    async fn test_malformed_response() {
        let mock_server =
            mock_response(ResponseTemplate::new(200).set_body_string("<html>oops</html>")).await;

        let result = provider(&mock_server)
            .get_rate("usd", "eur", &RateDate::Today)
            .await;
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to parse JSON response for usd_eur")
        );
    }

    #[tokio::test]
    async fn test_timeout() {
        let mock_server = mock_response(
            ResponseTemplate::new(200)
                .set_body_json(json!({"usd_eur": 1.18}))
                .set_delay(Duration::from_millis(500)),
        )
        .await;
        let provider =
            ApyHubProvider::new(&mock_server.uri(), None, Duration::from_millis(50)).unwrap();

        let result = provider.get_rate("usd", "eur", &RateDate::Today).await;
        assert!(result.unwrap_err().to_string().starts_with("Request error"));
    }
}
