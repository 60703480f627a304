//! JSON rate service consumed by the widget front-end.
//!
//! Every response is a JSON object: either the rate payload or `{"error": ...}`.
//! Upstream failures and handler panics are turned into the error shape, and
//! caching is forbidden so each poll reaches the scraper.

use crate::core::rates::{FetchError, Quote, RateSnapshot, RateSource};
use axum::{
    Json, Router,
    extract::State,
    http::{HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;
use tower_http::{
    catch_panic::CatchPanicLayer, cors::CorsLayer, set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tracing::{error, info};

pub const RATES_PATH: &str = "/api/tasas";
/// Path served by the PHP widget this service replaces.
pub const LEGACY_RATES_PATH: &str = "/scraper_bcv.php";
pub const INTERNAL_ERROR_MESSAGE: &str = "Error interno del servidor";
pub const NOT_FOUND_MESSAGE: &str = "Ruta no encontrada";
pub const METHOD_NOT_ALLOWED_MESSAGE: &str = "Método no permitido";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotePayload {
    #[serde(with = "rust_decimal::serde::float")]
    pub valor: Decimal,
    pub formateado: String,
}

impl From<&Quote> for QuotePayload {
    fn from(quote: &Quote) -> Self {
        QuotePayload {
            valor: quote.value(),
            formateado: quote.display_text().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatePayload {
    pub fecha: String,
    pub fecha_corta: String,
    pub fecha_valor: NaiveDate,
    pub fecha_ajustada: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usd: Option<QuotePayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eur: Option<QuotePayload>,
}

impl From<&RateSnapshot> for RatePayload {
    fn from(snapshot: &RateSnapshot) -> Self {
        RatePayload {
            fecha: snapshot.value_date_text(),
            fecha_corta: snapshot.short_date(),
            fecha_valor: snapshot.value_date,
            fecha_ajustada: snapshot.date_adjusted,
            usd: snapshot.usd.as_ref().map(QuotePayload::from),
            eur: snapshot.eur.as_ref().map(QuotePayload::from),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RateResponse {
    Rates(RatePayload),
    Error { error: String },
}

impl RateResponse {
    pub fn error(message: impl Into<String>) -> Self {
        RateResponse::Error {
            error: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RateResponse::Error { .. })
    }
}

impl From<&RateSnapshot> for RateResponse {
    fn from(snapshot: &RateSnapshot) -> Self {
        RateResponse::Rates(RatePayload::from(snapshot))
    }
}

impl From<&FetchError> for RateResponse {
    fn from(err: &FetchError) -> Self {
        RateResponse::error(err.to_string())
    }
}

/// Wraps a [`RateSource`]: one upstream call per request.
pub struct RateService {
    source: Arc<dyn RateSource>,
}

impl RateService {
    pub fn new(source: Arc<dyn RateSource>) -> Self {
        RateService { source }
    }

    pub async fn fetch_snapshot(&self) -> Result<RateSnapshot, FetchError> {
        self.source.fetch_rates().await
    }

    pub async fn handle_request(&self) -> RateResponse {
        match self.fetch_snapshot().await {
            Ok(snapshot) => {
                info!(
                    value_date = %snapshot.value_date,
                    adjusted = snapshot.date_adjusted,
                    "Rates served"
                );
                RateResponse::from(&snapshot)
            }
            Err(e) => {
                if let FetchError::ParseFailure(detail) = &e {
                    error!(%detail, "Could not parse upstream page");
                }
                error!(error = %e, "Rate fetch failed");
                RateResponse::from(&e)
            }
        }
    }
}

async fn get_rates(State(service): State<Arc<RateService>>) -> Json<RateResponse> {
    Json(service.handle_request().await)
}

async fn not_found() -> (StatusCode, Json<RateResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(RateResponse::error(NOT_FOUND_MESSAGE)),
    )
}

async fn method_not_allowed() -> (StatusCode, Json<RateResponse>) {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(RateResponse::error(METHOD_NOT_ALLOWED_MESSAGE)),
    )
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(detail, "Rate handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(RateResponse::error(INTERNAL_ERROR_MESSAGE)),
    )
        .into_response()
}

/// Builds the HTTP router for the rate service.
pub fn router(service: Arc<RateService>) -> Router {
    Router::new()
        .route(RATES_PATH, get(get_rates).fallback(method_not_allowed))
        .route(LEGACY_RATES_PATH, get(get_rates).fallback(method_not_allowed))
        .fallback(not_found)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-store, must-revalidate"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::PRAGMA,
            HeaderValue::from_static("no-cache"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::EXPIRES,
            HeaderValue::from_static("0"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-widget-version"),
            HeaderValue::from_static(env!("CARGO_PKG_VERSION")),
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    struct StaticSource(Result<RateSnapshot, FetchError>);

    #[async_trait]
    impl RateSource for StaticSource {
        async fn fetch_rates(&self) -> Result<RateSnapshot, FetchError> {
            self.0.clone()
        }
    }

    struct PanickingSource;

    #[async_trait]
    impl RateSource for PanickingSource {
        async fn fetch_rates(&self) -> Result<RateSnapshot, FetchError> {
            panic!("selector engine blew up")
        }
    }

    fn thursday_snapshot() -> RateSnapshot {
        let observed = NaiveDate::from_ymd_opt(2025, 11, 20)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        RateSnapshot::new(observed, Some(dec!(41.23)), Some(dec!(47.81)))
    }

    fn service(source: impl RateSource + 'static) -> Arc<RateService> {
        Arc::new(RateService::new(Arc::new(source)))
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, serde_json::from_slice(&body).unwrap())
    }

    #[test]
    fn test_payload_matches_wire_schema() {
        let response = RateResponse::from(&thursday_snapshot());
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(
            value,
            json!({
                "fecha": "Fecha valor: jueves, 20 de noviembre de 2025",
                "fecha_corta": "20/11/2025",
                "fecha_valor": "2025-11-20",
                "fecha_ajustada": false,
                "usd": { "valor": 41.23, "formateado": "41,23" },
                "eur": { "valor": 47.81, "formateado": "47,81" }
            })
        );
    }

    #[test]
    fn test_absent_currency_is_omitted() {
        let observed = NaiveDate::from_ymd_opt(2025, 11, 22)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let snapshot = RateSnapshot::new(observed, None, Some(dec!(47.81)));
        let value = serde_json::to_value(RateResponse::from(&snapshot)).unwrap();
        assert!(value.get("usd").is_none());
        assert_eq!(value["fecha_ajustada"], json!(true));
        assert_eq!(value["fecha_valor"], json!("2025-11-24"));
    }

    #[test]
    fn test_error_response_shape() {
        let value =
            serde_json::to_value(RateResponse::from(&FetchError::http_status(500))).unwrap();
        assert_eq!(
            value,
            json!({ "error": "Error: No se pudo conectar al BCV (HTTP 500)" })
        );

        let parsed: RateResponse = serde_json::from_value(value).unwrap();
        assert!(parsed.is_error());
    }

    #[tokio::test]
    async fn test_handle_request() {
        let ok = service(StaticSource(Ok(thursday_snapshot())));
        assert!(!ok.handle_request().await.is_error());

        let failing = service(StaticSource(Err(FetchError::empty_response())));
        assert_eq!(
            failing.handle_request().await,
            RateResponse::error("Error: No se recibió respuesta del BCV")
        );
    }

    #[tokio::test]
    async fn test_route_sets_headers() {
        let app = router(service(StaticSource(Ok(thursday_snapshot()))));
        let (status, headers, body) = get(app, RATES_PATH).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            headers[header::CONTENT_TYPE],
            "application/json; charset=utf-8"
        );
        assert_eq!(
            headers[header::CACHE_CONTROL],
            "no-cache, no-store, must-revalidate"
        );
        assert_eq!(headers["x-widget-version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(body["usd"]["valor"], json!(41.23));
    }

    #[tokio::test]
    async fn test_cors_headers() {
        let app = router(service(StaticSource(Ok(thursday_snapshot()))));
        let response = app
            .oneshot(
                Request::builder()
                    .uri(RATES_PATH)
                    .header(header::ORIGIN, "https://example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn test_legacy_path_and_fetch_error() {
        let app = router(service(StaticSource(Err(FetchError::http_status(502)))));
        let (status, headers, body) = get(app, LEGACY_RATES_PATH).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::PRAGMA], "no-cache");
        assert_eq!(
            body,
            json!({ "error": "Error: No se pudo conectar al BCV (HTTP 502)" })
        );
    }

    #[tokio::test]
    async fn test_unknown_path_and_method_answer_json() {
        let app = router(service(StaticSource(Ok(thursday_snapshot()))));
        let (status, headers, body) = get(app.clone(), "/api/tasa").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(
            headers[header::CONTENT_TYPE],
            "application/json; charset=utf-8"
        );
        assert_eq!(body, json!({ "error": NOT_FOUND_MESSAGE }));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(RATES_PATH)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({ "error": METHOD_NOT_ALLOWED_MESSAGE }));
    }

    #[tokio::test]
    async fn test_panic_becomes_json_error() {
        let app = router(service(PanickingSource));
        let (status, headers, body) = get(app, RATES_PATH).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            headers[header::CONTENT_TYPE],
            "application/json; charset=utf-8"
        );
        assert_eq!(body, json!({ "error": INTERNAL_ERROR_MESSAGE }));
    }
}
