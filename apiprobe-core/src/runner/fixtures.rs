//! Foreign-key fixture patching.
//!
//! Generated request bodies carry placeholder UUIDs in reference fields
//! (`categoryId`, `userId`, ...). Before sending, those are rewritten to
//! ids that actually exist on the backend so referential-integrity
//! checks do not reject otherwise-valid requests.

use std::collections::HashMap;

use log::debug;
use serde_json::Value as JsonValue;

use crate::client::{ApiClient, ApiRequest};
use crate::generator::PLACEHOLDER_UUID;
use crate::spec::Method;

/// Foreign-key fields and the collection endpoint that owns each.
const REFERENCE_FIELDS: [(&str, &str); 4] = [
    ("categoryId", "/api/categories"),
    ("productId", "/api/products"),
    ("userId", "/api/users"),
    ("salespersonId", "/api/salespersons"),
];

/// Rewrites reference fields to live ids, caching each lookup for the
/// lifetime of the patcher (one run).
#[derive(Default)]
pub struct ReferencePatcher {
    cache: HashMap<&'static str, String>,
}

impl ReferencePatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces every known foreign-key field in `value` with an id
    /// fetched from the owning collection. Falls back to the placeholder
    /// UUID when the collection is empty or unreachable.
    pub async fn patch(&mut self, client: &dyn ApiClient, value: &mut JsonValue) {
        for (field, collection) in REFERENCE_FIELDS {
            if !mentions_field(value, field) {
                continue;
            }
            let id = self.lookup(client, field, collection).await;
            rewrite_field(value, field, &id);
        }
    }

    async fn lookup(
        &mut self,
        client: &dyn ApiClient,
        field: &'static str,
        collection: &str,
    ) -> String {
        if let Some(id) = self.cache.get(field) {
            return id.clone();
        }
        let id = fetch_first_id(client, collection).await.unwrap_or_else(|| {
            debug!("no existing record under {collection}; keeping placeholder id");
            PLACEHOLDER_UUID.to_string()
        });
        self.cache.insert(field, id.clone());
        id
    }
}

fn mentions_field(value: &JsonValue, field: &str) -> bool {
    match value {
        JsonValue::Object(map) => map
            .iter()
            .any(|(key, child)| key == field || mentions_field(child, field)),
        JsonValue::Array(items) => items.iter().any(|item| mentions_field(item, field)),
        _ => false,
    }
}

fn rewrite_field(value: &mut JsonValue, field: &str, id: &str) {
    match value {
        JsonValue::Object(map) => {
            for (key, child) in map.iter_mut() {
                if key == field && child.is_string() {
                    *child = JsonValue::String(id.to_string());
                } else {
                    rewrite_field(child, field, id);
                }
            }
        }
        JsonValue::Array(items) => {
            for item in items.iter_mut() {
                rewrite_field(item, field, id);
            }
        }
        _ => {}
    }
}

async fn fetch_first_id(client: &dyn ApiClient, collection: &str) -> Option<String> {
    let response = client
        .send(ApiRequest::new(Method::Get, collection))
        .await
        .ok()?;
    if !response.is_success() {
        return None;
    }
    first_id(&response.json?)
}

/// Accepts both bare arrays and `{ "items": [...] }` / `{ "data": [...] }`
/// envelopes.
fn first_id(body: &JsonValue) -> Option<String> {
    let items = match body {
        JsonValue::Array(items) => items,
        JsonValue::Object(map) => map
            .get("items")
            .or_else(|| map.get("data"))
            .and_then(JsonValue::as_array)?,
        _ => return None,
    };
    items.first()?.get("id")?.as_str().map(str::to_string)
}
