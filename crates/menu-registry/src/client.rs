//! HTTP client for the metadata endpoint.
//!
//! `GET {base_url}/items?id={id}` answers with either a record or an array
//! holding the record. An empty array or a 404 means the id is unknown.

use crate::error::{RegistryError, RegistryResult};
use crate::source::{BoxFuture, MetadataSource};
use menu_core::{ItemId, MetadataRecord};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for fetching item metadata.
pub struct MetadataClient {
    client: Client,
    base_url: String,
}

impl MetadataClient {
    /// Create a new metadata client.
    ///
    /// # Arguments
    /// * `base_url` - API root, e.g. `http://localhost:3000/api`
    pub fn new(base_url: impl Into<String>) -> RegistryResult<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> RegistryResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RegistryError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn items_url(&self) -> String {
        format!("{}/items", self.base_url)
    }

    /// Fetch metadata for a single item.
    pub async fn fetch_item(&self, id: &ItemId) -> RegistryResult<MetadataRecord> {
        debug!(item_id = %id, "Fetching item metadata");

        let response = self
            .client
            .get(self.items_url())
            .query(&[("id", id.as_str())])
            .send()
            .await
            .map_err(|e| RegistryError::HttpClient(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound(id.clone()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(item_id = %id, %status, "Metadata endpoint returned error status");
            return Err(RegistryError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RegistryError::HttpClient(format!("Failed to read response: {e}")))?;

        parse_item_response(id, body)
    }
}

impl MetadataSource for MetadataClient {
    fn fetch(&self, id: ItemId) -> BoxFuture<'_, RegistryResult<MetadataRecord>> {
        Box::pin(async move { self.fetch_item(&id).await })
    }
}

/// Extract the record for `id` from an endpoint response body.
pub fn parse_item_response(
    id: &ItemId,
    body: serde_json::Value,
) -> RegistryResult<MetadataRecord> {
    let value = match body {
        serde_json::Value::Array(items) => match items.into_iter().next() {
            Some(first) => first,
            None => return Err(RegistryError::NotFound(id.clone())),
        },
        serde_json::Value::Null => return Err(RegistryError::NotFound(id.clone())),
        object @ serde_json::Value::Object(_) => object,
        other => {
            return Err(RegistryError::UnexpectedPayload(format!(
                "expected object or array, got {other}"
            )))
        }
    };

    let record: MetadataRecord = serde_json::from_value(value)?;
    if &record.id != id {
        return Err(RegistryError::UnexpectedPayload(format!(
            "requested {id}, endpoint returned {}",
            record.id
        )));
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;

    fn record_json(id: &str) -> serde_json::Value {
        json!({
            "id": id,
            "name": "Kofola",
            "type": "drink",
            "description": "herbal cola",
            "cuisineCountry": "CZE",
            "createdAt": "2024-05-01T09:00:00Z"
        })
    }

    #[test]
    fn test_parse_singleton_array() {
        let id = ItemId::new("kofola");
        let record = parse_item_response(&id, json!([record_json("kofola")])).unwrap();
        assert_eq!(record.name, "Kofola");
    }

    #[test]
    fn test_parse_plain_object() {
        let id = ItemId::new("kofola");
        let record = parse_item_response(&id, record_json("kofola")).unwrap();
        assert_eq!(record.id, id);
    }

    #[test]
    fn test_parse_empty_array_is_not_found() {
        let id = ItemId::new("ghost");
        let err = parse_item_response(&id, json!([])).unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }

    #[test]
    fn test_parse_mismatched_id_is_rejected() {
        let id = ItemId::new("kofola");
        let err = parse_item_response(&id, json!([record_json("pilsner")])).unwrap_err();
        assert!(matches!(err, RegistryError::UnexpectedPayload(_)));
    }

    #[test]
    fn test_parse_missing_fields_is_decode_error() {
        let id = ItemId::new("kofola");
        let err = parse_item_response(&id, json!([{ "id": "kofola" }])).unwrap_err();
        assert_eq!(err.reason(), "decode");
    }

    #[tokio::test]
    async fn test_fetch_item_over_http() {
        let app = Router::new().route(
            "/api/items",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                match q.get("id").map(String::as_str) {
                    Some("kofola") => Json(json!([record_json("kofola")])),
                    _ => Json(json!([])),
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = MetadataClient::new(format!("http://{addr}/api/")).unwrap();
        let record = client.fetch_item(&ItemId::new("kofola")).await.unwrap();
        assert_eq!(record.cuisine_country, "CZE");

        let err = client.fetch_item(&ItemId::new("ghost")).await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }
}
