//! Lightspeed Retail (X-Series) API client
//!
//! All consignment traffic goes through [`ConsignmentGateway::request`]. The
//! higher-level helpers are provided methods on the trait so a test double
//! only has to answer raw requests.

use std::collections::HashMap;
use std::time::Duration;

use rand::Rng;
use reqwest::{
    header::{ACCEPT, CONTENT_TYPE},
    Client, Method,
};
use serde::Serialize;
use serde_json::{json, Value};
use shared::{as_int, ConsignmentStatus, StockAdjustment, StockOperation};

use crate::config::LightspeedConfig;
use crate::error::{AppError, AppResult};

/// Uniform result of one API call. Transport failures are `status == 0`.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayResponse {
    pub ok: bool,
    pub status: u16,
    #[serde(skip)]
    pub headers: HashMap<String, String>,
    pub body: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GatewayResponse {
    pub fn transport_error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            status: 0,
            headers: HashMap::new(),
            body: Value::Null,
            error: Some(message.into()),
        }
    }

    /// Payload object, unwrapping the `{data: ...}` envelope when present
    pub fn data(&self) -> &Value {
        match self.body.get("data") {
            Some(inner) if inner.is_object() || inner.is_array() => inner,
            _ => &self.body,
        }
    }

    /// Best human-readable failure message
    pub fn message(&self, fallback: &str) -> String {
        self.body
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| self.error.clone())
            .unwrap_or_else(|| fallback.to_string())
    }
}

/// Consignment created upstream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedConsignment {
    pub id: String,
    pub reference: Option<String>,
}

/// Lines currently on a consignment
#[derive(Debug, Clone)]
pub struct ProductList {
    pub response: GatewayResponse,
    pub lines: Vec<Value>,
}

impl ProductList {
    /// `(product_id, count)` for every line
    pub fn counts(&self) -> std::collections::BTreeMap<String, i64> {
        self.lines
            .iter()
            .filter_map(|line| {
                let pid = shared::value_str(line.get("product_id"))?;
                let count = line
                    .get("count")
                    .and_then(Value::as_f64)
                    .map(|c| c.round() as i64)
                    .unwrap_or_else(|| as_int(line.get("count")));
                Some((pid, count))
            })
            .collect()
    }
}

#[axum::async_trait]
pub trait ConsignmentGateway: Send + Sync {
    /// Issue one API call. `Err` only for local misconfiguration; HTTP and
    /// transport failures come back as a non-ok [`GatewayResponse`].
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> AppResult<GatewayResponse>;

    async fn get_consignment(&self, id: &str) -> AppResult<GatewayResponse> {
        self.request(Method::GET, &format!("consignments/{}", id), None)
            .await
    }

    async fn consignment_totals(&self, id: &str) -> AppResult<GatewayResponse> {
        self.request(Method::GET, &format!("consignments/{}/totals", id), None)
            .await
    }

    async fn delete_consignment(&self, id: &str) -> AppResult<GatewayResponse> {
        self.request(Method::DELETE, &format!("consignments/{}", id), None)
            .await
    }

    /// Create a consignment; the id is read from `data.id` or `id`
    async fn create_consignment(
        &self,
        payload: Value,
    ) -> AppResult<(GatewayResponse, Option<CreatedConsignment>)> {
        let resp = self
            .request(Method::POST, "consignments", Some(payload))
            .await?;
        let created = if resp.ok {
            let data = resp.data();
            shared::value_str(data.get("id")).map(|id| CreatedConsignment {
                id,
                reference: shared::value_str(data.get("reference")),
            })
        } else {
            None
        };
        Ok((resp, created))
    }

    /// Change status by re-sending the current header with the new status
    async fn update_consignment_status(
        &self,
        id: &str,
        status: ConsignmentStatus,
    ) -> AppResult<GatewayResponse> {
        let current = self.get_consignment(id).await?;
        if !current.ok || !current.data().is_object() {
            return Ok(current);
        }
        let c = current.data();
        let payload = json!({
            "type": c.get("type").cloned().unwrap_or(Value::Null),
            "outlet_id": c.get("outlet_id").cloned().unwrap_or(Value::Null),
            "source_outlet_id": c.get("source_outlet_id").cloned().unwrap_or(Value::Null),
            "status": status.as_str(),
            "name": c.get("name").cloned().unwrap_or(Value::Null),
            "reference": c.get("reference").cloned().unwrap_or(Value::Null),
        });
        self.request(Method::PUT, &format!("consignments/{}", id), Some(payload))
            .await
    }

    async fn list_products(&self, consignment_id: &str) -> AppResult<ProductList> {
        let response = self
            .request(
                Method::GET,
                &format!("consignments/{}/products", consignment_id),
                None,
            )
            .await?;
        let lines = if response.ok {
            response.data().as_array().cloned().unwrap_or_default()
        } else {
            Vec::new()
        };
        Ok(ProductList { response, lines })
    }

    async fn add_product(
        &self,
        consignment_id: &str,
        product_id: &str,
        count: i64,
        cost: Option<rust_decimal::Decimal>,
        received: Option<i64>,
    ) -> AppResult<GatewayResponse> {
        let mut payload = json!({ "product_id": product_id, "count": count });
        if let Some(received) = received {
            payload["received"] = json!(received);
        }
        if let Some(cost) = cost {
            payload["cost"] = decimal_json(cost);
        }
        tracing::debug!(consignment_id, product_id, count, "Adding consignment product");
        self.request(
            Method::POST,
            &format!("consignments/{}/products", consignment_id),
            Some(payload),
        )
        .await
    }

    async fn update_product(
        &self,
        consignment_id: &str,
        product_id: &str,
        fields: Value,
    ) -> AppResult<GatewayResponse> {
        tracing::debug!(consignment_id, product_id, fields = %fields, "Updating consignment product");
        self.request(
            Method::PUT,
            &format!("consignments/{}/products/{}", consignment_id, product_id),
            Some(fields),
        )
        .await
    }

    /// Read-modify-write of an outlet's inventory count for one product
    async fn update_outlet_stock(
        &self,
        outlet_id: &str,
        product_id: &str,
        quantity: i64,
        operation: StockOperation,
    ) -> AppResult<StockAdjustment> {
        let path = format!("products/{}/outlets/{}", product_id, outlet_id);
        let mut adjustment = StockAdjustment {
            product_id: product_id.to_string(),
            outlet_id: outlet_id.to_string(),
            operation,
            quantity,
            previous_stock: None,
            new_stock: None,
            success: false,
        };

        let current = self.request(Method::GET, &path, None).await?;
        if !current.ok {
            tracing::warn!(
                outlet_id,
                product_id,
                status = current.status,
                "Failed to read current stock level"
            );
            return Ok(adjustment);
        }

        let previous = as_int(current.data().get("inventory_count"));
        let next = operation.apply(previous, quantity);
        adjustment.previous_stock = Some(previous);
        adjustment.new_stock = Some(next);

        let result = self
            .request(Method::PATCH, &path, Some(json!({ "inventory_count": next })))
            .await?;
        adjustment.success = result.ok;
        Ok(adjustment)
    }
}

/// Prices go over the wire as JSON numbers
pub fn decimal_json(value: rust_decimal::Decimal) -> Value {
    use rust_decimal::prelude::ToPrimitive;
    value
        .to_f64()
        .map(|f| json!(f))
        .unwrap_or_else(|| Value::String(value.to_string()))
}

/// Delay before a retry: the `Retry-After` seconds when the header holds a
/// number, otherwise a random 200-700 ms. Never longer than `cap`.
pub fn retry_delay(retry_after: Option<&str>, cap: Duration) -> Duration {
    let delay = match retry_after.and_then(|v| v.trim().parse::<u64>().ok()) {
        Some(secs) => Duration::from_secs(secs),
        None => Duration::from_millis(rand::thread_rng().gen_range(200..=700)),
    };
    delay.min(cap)
}

fn is_retryable(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}

/// HTTP implementation of [`ConsignmentGateway`]
#[derive(Clone)]
pub struct LightspeedClient {
    client: Client,
    token: String,
    base_url: String,
    retries: u32,
    timeout: Duration,
}

impl LightspeedClient {
    /// Create a new LightspeedClient from configuration
    pub fn new(config: &LightspeedConfig) -> AppResult<Self> {
        Self::with_base_url(config, config.api_base())
    }

    /// Create a new LightspeedClient with custom base URL (for testing)
    pub fn with_base_url(config: &LightspeedConfig, base_url: String) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| AppError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            token: config.api_token.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            retries: config.retries,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    async fn send_once(&self, method: &Method, url: &str, body: Option<&Value>) -> GatewayResponse {
        let mut req = self
            .client
            .request(method.clone(), url)
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json");
        if let Some(body) = body {
            req = req.body(body.to_string());
        }

        let resp = match req.send().await {
            Ok(resp) => resp,
            Err(e) => return GatewayResponse::transport_error(format!("transport error: {}", e)),
        };

        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|v| (k.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let text = match resp.text().await {
            Ok(text) => text,
            Err(e) => return GatewayResponse::transport_error(format!("body read error: {}", e)),
        };
        let body = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        GatewayResponse {
            ok: (200..300).contains(&status),
            status,
            headers,
            body,
            error: None,
        }
    }
}

#[axum::async_trait]
impl ConsignmentGateway for LightspeedClient {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> AppResult<GatewayResponse> {
        if self.token.trim().is_empty() {
            return Err(AppError::Configuration(
                "LS_API_TOKEN is not configured".to_string(),
            ));
        }

        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut retries_left = self.retries;

        loop {
            let resp = self.send_once(&method, &url, body.as_ref()).await;

            if is_retryable(resp.status) && retries_left > 0 {
                let delay = retry_delay(
                    resp.headers.get("retry-after").map(String::as_str),
                    self.timeout,
                );
                tracing::debug!(
                    %method,
                    path,
                    status = resp.status,
                    delay_ms = delay.as_millis() as u64,
                    retries_left,
                    "Retrying Lightspeed request"
                );
                tokio::time::sleep(delay).await;
                retries_left -= 1;
                continue;
            }

            if resp.ok {
                tracing::debug!(%method, path, status = resp.status, "Lightspeed request succeeded");
            } else {
                tracing::warn!(
                    %method,
                    path,
                    status = resp.status,
                    error = ?resp.error,
                    body = %resp.body,
                    "Lightspeed request failed"
                );
            }
            return Ok(resp);
        }
    }
}
