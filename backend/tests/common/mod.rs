//! Shared test doubles
//!
//! `FakeLightspeed` keeps consignment lines and outlet stock in memory and
//! records every request it answers.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use reqwest::Method;
use serde_json::{json, Value};
use transfer_manager::error::AppResult;
use transfer_manager::external::lightspeed::{ConsignmentGateway, GatewayResponse};

#[derive(Debug, Clone)]
pub struct Call {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

#[derive(Default)]
pub struct FakeLightspeed {
    pub calls: Mutex<Vec<Call>>,
    pub lines: Mutex<BTreeMap<String, i64>>,
    pub stock: Mutex<HashMap<(String, String), i64>>,
    pub created: Mutex<u32>,
    pub consignment_type: Mutex<String>,
    pub refuse_status_changes: Mutex<bool>,
}

impl FakeLightspeed {
    pub fn new() -> Arc<Self> {
        let fake = Self::default();
        *fake.consignment_type.lock().unwrap() = "STOCK".to_string();
        Arc::new(fake)
    }

    pub fn with_lines(self: Arc<Self>, lines: &[(&str, i64)]) -> Arc<Self> {
        let mut map = self.lines.lock().unwrap();
        for (pid, count) in lines {
            map.insert(pid.to_string(), *count);
        }
        drop(map);
        self
    }

    pub fn set_stock(&self, outlet: &str, product: &str, count: i64) {
        self.stock
            .lock()
            .unwrap()
            .insert((outlet.to_string(), product.to_string()), count);
    }

    pub fn stock(&self, outlet: &str, product: &str) -> i64 {
        self.stock
            .lock()
            .unwrap()
            .get(&(outlet.to_string(), product.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: Method, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.method == method && c.path.starts_with(prefix))
            .count()
    }

    pub fn respond(status: u16, body: Value) -> GatewayResponse {
        GatewayResponse {
            ok: (200..300).contains(&status),
            status,
            headers: HashMap::new(),
            body,
            error: None,
        }
    }
}

#[axum::async_trait]
impl ConsignmentGateway for FakeLightspeed {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> AppResult<GatewayResponse> {
        self.calls.lock().unwrap().push(Call {
            method: method.clone(),
            path: path.to_string(),
            body: body.clone(),
        });

        let segments: Vec<&str> = path.split('/').collect();
        let resp = match (method.as_str(), segments.as_slice()) {
            ("POST", ["consignments"]) => {
                let n = {
                    let mut created = self.created.lock().unwrap();
                    *created += 1;
                    *created
                };
                Self::respond(
                    201,
                    json!({ "data": { "id": format!("cons-{}", n), "reference": format!("REF-{}", n) } }),
                )
            }
            ("GET", ["consignments", id]) => {
                let kind = self.consignment_type.lock().unwrap().clone();
                Self::respond(
                    200,
                    json!({ "data": {
                        "id": id,
                        "type": kind,
                        "status": "SENT",
                        "outlet_id": "dest",
                        "source_outlet_id": "src",
                        "name": "Transfer TR-000000000001",
                    } }),
                )
            }
            ("PUT", ["consignments", _]) => {
                if *self.refuse_status_changes.lock().unwrap() {
                    Self::respond(422, json!({ "message": "status change refused" }))
                } else {
                    Self::respond(200, json!({ "data": body.unwrap_or(Value::Null) }))
                }
            }
            ("DELETE", ["consignments", _]) => Self::respond(204, Value::Null),
            ("GET", ["consignments", _, "totals"]) => {
                Self::respond(200, json!({ "data": { "total_count": 0 } }))
            }
            ("GET", ["consignments", _, "products"]) => {
                let lines: Vec<Value> = self
                    .lines
                    .lock()
                    .unwrap()
                    .iter()
                    .map(|(pid, count)| json!({ "product_id": pid, "count": count }))
                    .collect();
                Self::respond(200, json!({ "data": lines }))
            }
            ("POST", ["consignments", _, "products"]) => {
                let body = body.unwrap_or(Value::Null);
                let pid = body["product_id"].as_str().unwrap_or_default().to_string();
                let count = body["count"].as_i64().unwrap_or(0);
                self.lines.lock().unwrap().insert(pid, count);
                Self::respond(201, json!({ "data": body }))
            }
            ("PUT", ["consignments", _, "products", pid]) => {
                let body = body.unwrap_or(Value::Null);
                if let Some(count) = body["count"].as_i64() {
                    self.lines.lock().unwrap().insert(pid.to_string(), count);
                }
                Self::respond(200, json!({ "data": body }))
            }
            ("GET", ["products", pid, "outlets", outlet]) => {
                Self::respond(200, json!({ "data": { "inventory_count": self.stock(outlet, pid) } }))
            }
            ("PATCH", ["products", pid, "outlets", outlet]) => {
                let next = body
                    .as_ref()
                    .and_then(|b| b["inventory_count"].as_i64())
                    .unwrap_or(0);
                self.set_stock(outlet, pid, next);
                Self::respond(200, json!({ "data": { "inventory_count": next } }))
            }
            _ => Self::respond(404, json!({ "message": "no such route" })),
        };
        Ok(resp)
    }
}
