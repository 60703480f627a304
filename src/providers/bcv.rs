use crate::core::clock::Clock;
use crate::core::config::UpstreamConfig;
use crate::core::rates::{FetchError, RateSnapshot, RateSource};
use crate::core::value_date;
use crate::providers::util::parse_rate_text;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::FixedOffset;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use rust_decimal::Decimal;
use scraper::{Html, Selector};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Scrapes the official USD and EUR rates from the BCV home page.
pub struct BcvRateSource {
    client: reqwest::Client,
    url: String,
    usd_selector: Selector,
    eur_selector: Selector,
    offset: FixedOffset,
    clock: Arc<dyn Clock>,
}

impl BcvRateSource {
    pub fn new(config: &UpstreamConfig, offset: FixedOffset, clock: Arc<dyn Clock>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("es-ES,es;q=0.9,en;q=0.8"),
        );

        if config.accept_invalid_certs {
            warn!(url = %config.url, "TLS certificate verification is disabled for the upstream");
        }

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(BcvRateSource {
            client,
            url: config.url.clone(),
            usd_selector: parse_selector(&config.usd_selector)?,
            eur_selector: parse_selector(&config.eur_selector)?,
            offset,
            clock,
        })
    }
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| anyhow!("Invalid selector '{}': {}", selector, e))
}

fn describe_transport_error(err: &reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::timeout()
    } else {
        FetchError::Network(format!("No se pudo conectar al BCV ({err})"))
    }
}

/// Pulls both rates out of the page. A missing or unreadable anchor leaves
/// that currency empty; only a body that is not markup is an error.
pub(crate) fn extract_rates(
    body: &str,
    usd_selector: &Selector,
    eur_selector: &Selector,
) -> std::result::Result<(Option<Decimal>, Option<Decimal>), FetchError> {
    if !body.contains('<') {
        return Err(FetchError::ParseFailure(
            "response body contains no markup".to_string(),
        ));
    }

    let document = Html::parse_document(body);
    let anchor_value = |selector: &Selector, currency: &str| {
        let Some(element) = document.select(selector).next() else {
            warn!(currency, "Rate anchor not found in page");
            return None;
        };
        let text: String = element.text().collect();
        let value = parse_rate_text(&text);
        if value.is_none() {
            warn!(currency, text = %text.trim(), "Rate anchor holds no usable number");
        }
        value
    };

    Ok((
        anchor_value(usd_selector, "USD"),
        anchor_value(eur_selector, "EUR"),
    ))
}

#[async_trait]
impl RateSource for BcvRateSource {
    #[instrument(name = "BcvRateFetch", skip(self), fields(url = %self.url))]
    async fn fetch_rates(&self) -> std::result::Result<RateSnapshot, FetchError> {
        debug!("Requesting rates page from {}", self.url);

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| describe_transport_error(&e))?;

        debug!(status = %response.status(), "Received BCV response");

        if response.status() != StatusCode::OK {
            return Err(FetchError::http_status(response.status().as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| describe_transport_error(&e))?;

        if body.trim().is_empty() {
            return Err(FetchError::empty_response());
        }

        let (usd, eur) = extract_rates(&body, &self.usd_selector, &self.eur_selector)?;
        let observed_at = value_date::local_time(self.clock.now(), self.offset);
        let snapshot = RateSnapshot::new(observed_at, usd, eur);

        debug!(
            usd = ?snapshot.usd.as_ref().map(|q| q.value()),
            eur = ?snapshot.eur.as_ref().map(|q| q.value()),
            value_date = %snapshot.value_date,
            "Parsed BCV rates"
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::FixedClock;
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal_macros::dec;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAGE: &str = r#"<html><body>
        <div id="euro" class="col-sm-12"><div class="field-content">
            <span> EUR </span><strong> 47,81230000 </strong></div></div>
        <div id="dolar" class="col-sm-12"><div class="field-content">
            <span> USD </span><strong> 41,23450000 </strong></div></div>
    </body></html>"#;

    fn selectors() -> (Selector, Selector) {
        let config = UpstreamConfig::default();
        (
            parse_selector(&config.usd_selector).unwrap(),
            parse_selector(&config.eur_selector).unwrap(),
        )
    }

    pub async fn create_mock_server(response: ResponseTemplate) -> MockServer {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(response)
            .mount(&mock_server)
            .await;

        mock_server
    }

    fn source_for(server: &MockServer, now: chrono::DateTime<Utc>) -> BcvRateSource {
        let config = UpstreamConfig {
            url: format!("{}/", server.uri()),
            timeout_secs: 2,
            ..Default::default()
        };
        BcvRateSource::new(
            &config,
            value_date::caracas_offset(),
            Arc::new(FixedClock::new(now)),
        )
        .unwrap()
    }

    #[test]
    fn test_extract_rates() {
        let (usd_sel, eur_sel) = selectors();
        let (usd, eur) = extract_rates(PAGE, &usd_sel, &eur_sel).unwrap();
        assert_eq!(usd, Some(dec!(41.23450000)));
        assert_eq!(eur, Some(dec!(47.81230000)));
    }

    #[test]
    fn test_extract_partial_rates() {
        let (usd_sel, eur_sel) = selectors();
        let page = r#"<html><body><div id="dolar"><strong>41,23</strong></div></body></html>"#;
        let (usd, eur) = extract_rates(page, &usd_sel, &eur_sel).unwrap();
        assert_eq!(usd, Some(dec!(41.23)));
        assert_eq!(eur, None);

        let page = r#"<div id="euro"><strong>sin datos</strong></div>"#;
        let (usd, eur) = extract_rates(page, &usd_sel, &eur_sel).unwrap();
        assert_eq!((usd, eur), (None, None));
    }

    #[test]
    fn test_extract_rejects_non_markup() {
        let (usd_sel, eur_sel) = selectors();
        let result = extract_rates("Service Unavailable", &usd_sel, &eur_sel);
        assert!(matches!(result, Err(FetchError::ParseFailure(_))));
    }

    #[test]
    fn test_invalid_selector() {
        let config = UpstreamConfig {
            usd_selector: "div##".to_string(),
            ..Default::default()
        };
        let result = BcvRateSource::new(
            &config,
            value_date::caracas_offset(),
            Arc::new(FixedClock::new(Utc::now())),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_successful_fetch() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .and(header_exists("accept-language"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .expect(1)
            .mount(&mock_server)
            .await;

        // Thursday 10:00 in Caracas
        let now = Utc.with_ymd_and_hms(2025, 11, 20, 14, 0, 0).unwrap();
        let snapshot = source_for(&mock_server, now).fetch_rates().await.unwrap();

        assert_eq!(snapshot.usd.as_ref().unwrap().value(), dec!(41.23));
        assert_eq!(snapshot.usd.as_ref().unwrap().display_text(), "41,23");
        assert_eq!(snapshot.eur.as_ref().unwrap().value(), dec!(47.81));
        assert_eq!(
            snapshot.value_date,
            NaiveDate::from_ymd_opt(2025, 11, 20).unwrap()
        );
        assert!(!snapshot.date_adjusted);
    }

    #[tokio::test]
    async fn test_friday_afternoon_fetch_is_adjusted() {
        let mock_server =
            create_mock_server(ResponseTemplate::new(200).set_body_string(PAGE)).await;

        // Friday 12:00 in Caracas
        let now = Utc.with_ymd_and_hms(2025, 11, 21, 16, 0, 0).unwrap();
        let snapshot = source_for(&mock_server, now).fetch_rates().await.unwrap();

        assert!(snapshot.date_adjusted);
        assert_eq!(
            snapshot.observed_date,
            NaiveDate::from_ymd_opt(2025, 11, 21).unwrap()
        );
        assert_eq!(
            snapshot.value_date,
            NaiveDate::from_ymd_opt(2025, 11, 24).unwrap()
        );
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let mock_server = create_mock_server(ResponseTemplate::new(503)).await;
        let result = source_for(&mock_server, Utc::now()).fetch_rates().await;
        assert_eq!(result.unwrap_err(), FetchError::http_status(503));
    }

    #[tokio::test]
    async fn test_empty_body() {
        let mock_server =
            create_mock_server(ResponseTemplate::new(200).set_body_string("  \n")).await;
        let result = source_for(&mock_server, Utc::now()).fetch_rates().await;
        assert_eq!(result.unwrap_err(), FetchError::empty_response());
    }

    #[tokio::test]
    async fn test_non_markup_body() {
        let mock_server =
            create_mock_server(ResponseTemplate::new(200).set_body_string("upstream down")).await;
        let result = source_for(&mock_server, Utc::now()).fetch_rates().await;
        assert!(matches!(result, Err(FetchError::ParseFailure(_))));
    }

    #[tokio::test]
    async fn test_timeout() {
        let mock_server = create_mock_server(
            ResponseTemplate::new(200)
                .set_body_string(PAGE)
                .set_delay(Duration::from_secs(5)),
        )
        .await;
        let result = source_for(&mock_server, Utc::now()).fetch_rates().await;
        assert_eq!(result.unwrap_err(), FetchError::timeout());
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let mock_server = MockServer::start().await;
        let uri = mock_server.uri();
        drop(mock_server);

        let config = UpstreamConfig {
            url: uri,
            timeout_secs: 2,
            ..Default::default()
        };
        let source = BcvRateSource::new(
            &config,
            value_date::caracas_offset(),
            Arc::new(FixedClock::new(Utc::now())),
        )
        .unwrap();
        let err = source.fetch_rates().await.unwrap_err();
        assert!(matches!(err, FetchError::Network(_)));
        assert!(err.to_string().starts_with("Error: No se pudo conectar al BCV"));
    }
}
