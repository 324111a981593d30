use crate::error::QuoteError;
use serde::Deserialize;

/// Live valuation data for one symbol, as served by the backend.
///
/// The table holding these is replaced wholesale on every poll cycle, so a
/// value is only ever as fresh as the last committed cycle.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LiveQuote {
    pub cmp: f64,
    pub pe_ratio: String,
    pub latest_earnings: String,
}

impl LiveQuote {
    /// Placeholder substituted when a fetch fails. Classifies the holding
    /// as a loser until a later cycle succeeds for its symbol.
    pub fn sentinel() -> LiveQuote {
        LiveQuote {
            cmp: 0.0,
            pe_ratio: "N/A".to_string(),
            latest_earnings: "N/A".to_string(),
        }
    }
}

/// Client for the quote backend. Holds the base URL resolved once at
/// startup; one outbound request per `fetch` call, single attempt, no
/// retry, no caching.
#[derive(Clone)]
pub struct QuoteClient {
    client: reqwest::Client,
    base_url: String,
}

impl QuoteClient {
    pub fn new(base_url: &str) -> QuoteClient {
        QuoteClient {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn fetch(&self, symbol: &str) -> Result<LiveQuote, QuoteError> {
        let url = format!("{}/api/stocks/{}", self.base_url, symbol);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(QuoteError::Status(
                response.status().as_u16(),
                symbol.to_string(),
            ));
        }

        Ok(response.json::<LiveQuote>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quote_body() {
        let body = r#"{"cmp": 1520.75, "peRatio": "24.3", "latestEarnings": "2026-07-18"}"#;
        let quote: LiveQuote = serde_json::from_str(body).unwrap();
        assert_eq!(quote.cmp, 1520.75);
        assert_eq!(quote.pe_ratio, "24.3");
        assert_eq!(quote.latest_earnings, "2026-07-18");
    }

    #[test]
    fn test_sentinel() {
        let quote = LiveQuote::sentinel();
        assert_eq!(quote.cmp, 0.0);
        assert_eq!(quote.pe_ratio, "N/A");
        assert_eq!(quote.latest_earnings, "N/A");
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = QuoteClient::new("http://localhost:8080/");
        assert_eq!(client.base_url, "http://localhost:8080");
    }
}
