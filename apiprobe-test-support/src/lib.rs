//! In-process mock e-commerce backend for integration tests.
//!
//! Serves the fixed CRUD surface the engine probes, with referential
//! integrity checks (a product must name an existing category, an order
//! an existing user and products) answered with the
//! `{ "error": string, "details"?: array }` envelope. State is seeded
//! with one record per collection so foreign-key lookups always find
//! something.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use ctor::ctor;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

#[ctor]
fn init_test_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default())
        .is_test(true)
        .try_init();
}

pub const ORDER_STATUSES: [&str; 5] =
    ["PENDING", "PROCESSING", "SHIPPED", "DELIVERED", "CANCELLED"];

/// Ids of the records seeded at spawn time.
#[derive(Clone, Debug)]
pub struct SeedIds {
    pub category_id: String,
    pub user_id: String,
    pub product_id: String,
    pub salesperson_id: String,
}

#[derive(Default)]
struct StoreInner {
    products: Vec<JsonValue>,
    categories: Vec<JsonValue>,
    users: Vec<JsonValue>,
    orders: Vec<JsonValue>,
    salespersons: Vec<JsonValue>,
}

#[derive(Clone, Default)]
struct Store {
    inner: Arc<Mutex<StoreInner>>,
}

impl Store {
    fn seeded() -> (Self, SeedIds) {
        let store = Store::default();
        let seed = SeedIds {
            category_id: new_id(),
            user_id: new_id(),
            product_id: new_id(),
            salesperson_id: new_id(),
        };
        {
            let mut inner = store.lock();
            inner.categories.push(json!({
                "id": seed.category_id,
                "name": "Electronics",
                "description": "Devices and gadgets",
                "createdAt": Utc::now().to_rfc3339(),
            }));
            inner.users.push(json!({
                "id": seed.user_id,
                "name": "Seed User",
                "email": "seed@example.com",
                "createdAt": Utc::now().to_rfc3339(),
            }));
            inner.products.push(json!({
                "id": seed.product_id,
                "name": "Seed Widget",
                "description": "Always in stock",
                "price": 19.99,
                "stockQuantity": 100,
                "categoryId": seed.category_id,
                "createdAt": Utc::now().to_rfc3339(),
            }));
            inner.salespersons.push(json!({
                "id": seed.salesperson_id,
                "name": "Seed Seller",
                "email": "seller@example.com",
                "region": "north",
                "createdAt": Utc::now().to_rfc3339(),
            }));
        }
        (store, seed)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreInner> {
        self.inner.lock().expect("store lock")
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn error_body(message: &str, details: Vec<String>) -> JsonValue {
    if details.is_empty() {
        json!({ "error": message })
    } else {
        json!({ "error": message, "details": details })
    }
}

fn find_by_id(records: &[JsonValue], id: &str) -> Option<JsonValue> {
    records
        .iter()
        .find(|record| record["id"] == id)
        .cloned()
}

#[derive(Deserialize)]
struct PageParams {
    page: Option<usize>,
    #[serde(rename = "pageSize")]
    page_size: Option<usize>,
}

fn paged(records: &[JsonValue], params: &PageParams) -> Vec<JsonValue> {
    let page = params.page.unwrap_or(1).max(1);
    let page_size = params.page_size.unwrap_or(20).max(1);
    records
        .iter()
        .skip((page - 1) * page_size)
        .take(page_size)
        .cloned()
        .collect()
}

// ---- products ----

async fn list_products(
    State(store): State<Store>,
    Query(params): Query<PageParams>,
) -> Json<JsonValue> {
    let inner = store.lock();
    Json(JsonValue::Array(paged(&inner.products, &params)))
}

fn validate_product(body: &JsonValue, inner: &StoreInner, create: bool) -> Vec<String> {
    let mut details = Vec::new();
    if create || body.get("name").is_some() {
        match body.get("name").and_then(JsonValue::as_str) {
            Some(name) if !name.is_empty() && name.chars().count() <= 200 => {}
            _ => details.push("name must be a string of 1..=200 characters".to_string()),
        }
    }
    if create || body.get("price").is_some() {
        match body.get("price").and_then(JsonValue::as_f64) {
            Some(price) if price > 0.0 => {}
            _ => details.push("price must be a positive number".to_string()),
        }
    }
    if create || body.get("stockQuantity").is_some() {
        match body.get("stockQuantity").and_then(JsonValue::as_i64) {
            Some(quantity) if quantity >= 0 => {}
            _ => details.push("stockQuantity must be a non-negative integer".to_string()),
        }
    }
    if create || body.get("categoryId").is_some() {
        match body.get("categoryId").and_then(JsonValue::as_str) {
            Some(id) if find_by_id(&inner.categories, id).is_some() => {}
            _ => details.push("categoryId must reference an existing category".to_string()),
        }
    }
    details
}

async fn create_product(
    State(store): State<Store>,
    Json(body): Json<JsonValue>,
) -> (StatusCode, Json<JsonValue>) {
    let mut inner = store.lock();
    let details = validate_product(&body, &inner, true);
    if !details.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(error_body("invalid product", details)),
        );
    }
    let product = json!({
        "id": new_id(),
        "name": body["name"],
        "description": body.get("description").cloned().unwrap_or(JsonValue::Null),
        "price": body["price"],
        "stockQuantity": body["stockQuantity"],
        "categoryId": body["categoryId"],
        "createdAt": Utc::now().to_rfc3339(),
    });
    inner.products.push(product.clone());
    (StatusCode::CREATED, Json(product))
}

async fn get_product(
    State(store): State<Store>,
    Path(id): Path<String>,
) -> (StatusCode, Json<JsonValue>) {
    let inner = store.lock();
    match find_by_id(&inner.products, &id) {
        Some(product) => (StatusCode::OK, Json(product)),
        None => (
            StatusCode::NOT_FOUND,
            Json(error_body("product not found", Vec::new())),
        ),
    }
}

async fn update_product(
    State(store): State<Store>,
    Path(id): Path<String>,
    Json(body): Json<JsonValue>,
) -> (StatusCode, Json<JsonValue>) {
    let mut inner = store.lock();
    let details = validate_product(&body, &inner, false);
    if !details.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(error_body("invalid product", details)),
        );
    }
    let Some(product) = inner
        .products
        .iter_mut()
        .find(|product| product["id"] == id.as_str())
    else {
        return (
            StatusCode::NOT_FOUND,
            Json(error_body("product not found", Vec::new())),
        );
    };
    if let (Some(target), Some(patch)) = (product.as_object_mut(), body.as_object()) {
        for (key, value) in patch {
            target.insert(key.clone(), value.clone());
        }
        target.insert("id".to_string(), json!(id));
    }
    (StatusCode::OK, Json(product.clone()))
}

// ---- categories ----

async fn list_categories(State(store): State<Store>) -> Json<JsonValue> {
    Json(JsonValue::Array(store.lock().categories.clone()))
}

async fn create_category(
    State(store): State<Store>,
    Json(body): Json<JsonValue>,
) -> (StatusCode, Json<JsonValue>) {
    match body.get("name").and_then(JsonValue::as_str) {
        Some(name) if !name.is_empty() && name.chars().count() <= 100 => {}
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(error_body(
                    "invalid category",
                    vec!["name must be a string of 1..=100 characters".to_string()],
                )),
            )
        }
    }
    let category = json!({
        "id": new_id(),
        "name": body["name"],
        "description": body.get("description").cloned().unwrap_or(JsonValue::Null),
        "createdAt": Utc::now().to_rfc3339(),
    });
    store.lock().categories.push(category.clone());
    (StatusCode::CREATED, Json(category))
}

async fn get_category(
    State(store): State<Store>,
    Path(id): Path<String>,
) -> (StatusCode, Json<JsonValue>) {
    match find_by_id(&store.lock().categories, &id) {
        Some(category) => (StatusCode::OK, Json(category)),
        None => (
            StatusCode::NOT_FOUND,
            Json(error_body("category not found", Vec::new())),
        ),
    }
}

// ---- users ----

async fn list_users(State(store): State<Store>) -> Json<JsonValue> {
    Json(JsonValue::Array(store.lock().users.clone()))
}

async fn create_user(
    State(store): State<Store>,
    Json(body): Json<JsonValue>,
) -> (StatusCode, Json<JsonValue>) {
    let mut details = Vec::new();
    match body.get("name").and_then(JsonValue::as_str) {
        Some(name) if !name.is_empty() => {}
        _ => details.push("name must be a non-empty string".to_string()),
    }
    match body.get("email").and_then(JsonValue::as_str) {
        Some(email) if email.contains('@') => {}
        _ => details.push("email must contain '@'".to_string()),
    }
    if let Some(password) = body.get("password") {
        match password.as_str() {
            Some(password) if password.chars().count() >= 8 => {}
            _ => details.push("password must be at least 8 characters".to_string()),
        }
    }
    if !details.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(error_body("invalid user", details)),
        );
    }
    let user = json!({
        "id": new_id(),
        "name": body["name"],
        "email": body["email"],
        "picture": body.get("picture").cloned().unwrap_or(JsonValue::Null),
        "createdAt": Utc::now().to_rfc3339(),
    });
    store.lock().users.push(user.clone());
    (StatusCode::CREATED, Json(user))
}

async fn get_user(
    State(store): State<Store>,
    Path(id): Path<String>,
) -> (StatusCode, Json<JsonValue>) {
    match find_by_id(&store.lock().users, &id) {
        Some(user) => (StatusCode::OK, Json(user)),
        None => (
            StatusCode::NOT_FOUND,
            Json(error_body("user not found", Vec::new())),
        ),
    }
}

// ---- orders ----

#[derive(Deserialize)]
struct OrderListParams {
    #[serde(rename = "userId")]
    user_id: Option<String>,
}

async fn list_orders(
    State(store): State<Store>,
    Query(params): Query<OrderListParams>,
) -> Json<JsonValue> {
    let inner = store.lock();
    let orders = inner
        .orders
        .iter()
        .filter(|order| match &params.user_id {
            Some(user_id) => order["userId"] == user_id.as_str(),
            None => true,
        })
        .cloned()
        .collect();
    Json(JsonValue::Array(orders))
}

async fn create_order(
    State(store): State<Store>,
    Json(body): Json<JsonValue>,
) -> (StatusCode, Json<JsonValue>) {
    let mut inner = store.lock();
    let mut details = Vec::new();
    match body.get("userId").and_then(JsonValue::as_str) {
        Some(id) if find_by_id(&inner.users, id).is_some() => {}
        _ => details.push("userId must reference an existing user".to_string()),
    }
    if let Some(salesperson_id) = body.get("salespersonId").and_then(JsonValue::as_str) {
        if find_by_id(&inner.salespersons, salesperson_id).is_none() {
            details.push("salespersonId must reference an existing salesperson".to_string());
        }
    }
    let mut total = 0.0;
    match body.get("orderItems").and_then(JsonValue::as_array) {
        Some(items) if !items.is_empty() => {
            for item in items {
                let quantity = item.get("quantity").and_then(JsonValue::as_i64).unwrap_or(0);
                if quantity < 1 {
                    details.push("quantity must be at least 1".to_string());
                }
                match item.get("productId").and_then(JsonValue::as_str) {
                    Some(id) => match find_by_id(&inner.products, id) {
                        Some(product) => {
                            total += product["price"].as_f64().unwrap_or(0.0) * quantity as f64;
                        }
                        None => details
                            .push("productId must reference an existing product".to_string()),
                    },
                    None => details.push("orderItems entries need a productId".to_string()),
                }
            }
        }
        _ => details.push("orderItems must contain at least one item".to_string()),
    }
    if !details.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(error_body("invalid order", details)),
        );
    }
    let order = json!({
        "id": new_id(),
        "userId": body["userId"],
        "salespersonId": body.get("salespersonId").cloned().unwrap_or(JsonValue::Null),
        "orderItems": body["orderItems"],
        "status": "PENDING",
        "totalAmount": total,
        "createdAt": Utc::now().to_rfc3339(),
    });
    inner.orders.push(order.clone());
    (StatusCode::CREATED, Json(order))
}

async fn get_order(
    State(store): State<Store>,
    Path(id): Path<String>,
) -> (StatusCode, Json<JsonValue>) {
    match find_by_id(&store.lock().orders, &id) {
        Some(order) => (StatusCode::OK, Json(order)),
        None => (
            StatusCode::NOT_FOUND,
            Json(error_body("order not found", Vec::new())),
        ),
    }
}

async fn update_order_status(
    State(store): State<Store>,
    Path(id): Path<String>,
    Json(body): Json<JsonValue>,
) -> (StatusCode, Json<JsonValue>) {
    let status = body.get("status").and_then(JsonValue::as_str);
    let Some(status) = status.filter(|status| ORDER_STATUSES.contains(status)) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(error_body(
                "invalid status",
                vec![format!("status must be one of {ORDER_STATUSES:?}")],
            )),
        );
    };
    let mut inner = store.lock();
    let Some(order) = inner
        .orders
        .iter_mut()
        .find(|order| order["id"] == id.as_str())
    else {
        return (
            StatusCode::NOT_FOUND,
            Json(error_body("order not found", Vec::new())),
        );
    };
    order["status"] = json!(status);
    (StatusCode::OK, Json(order.clone()))
}

// ---- salespersons ----

async fn list_salespersons(State(store): State<Store>) -> Json<JsonValue> {
    Json(JsonValue::Array(store.lock().salespersons.clone()))
}

async fn create_salesperson(
    State(store): State<Store>,
    Json(body): Json<JsonValue>,
) -> (StatusCode, Json<JsonValue>) {
    match body.get("name").and_then(JsonValue::as_str) {
        Some(name) if !name.is_empty() => {}
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(error_body(
                    "invalid salesperson",
                    vec!["name must be a non-empty string".to_string()],
                )),
            )
        }
    }
    let salesperson = json!({
        "id": new_id(),
        "name": body["name"],
        "email": body.get("email").cloned().unwrap_or(JsonValue::Null),
        "phone": body.get("phone").cloned().unwrap_or(JsonValue::Null),
        "region": body.get("region").cloned().unwrap_or(JsonValue::Null),
        "createdAt": Utc::now().to_rfc3339(),
    });
    store.lock().salespersons.push(salesperson.clone());
    (StatusCode::CREATED, Json(salesperson))
}

async fn get_salesperson(
    State(store): State<Store>,
    Path(id): Path<String>,
) -> (StatusCode, Json<JsonValue>) {
    match find_by_id(&store.lock().salespersons, &id) {
        Some(salesperson) => (StatusCode::OK, Json(salesperson)),
        None => (
            StatusCode::NOT_FOUND,
            Json(error_body("salesperson not found", Vec::new())),
        ),
    }
}

async fn update_salesperson(
    State(store): State<Store>,
    Path(id): Path<String>,
    Json(body): Json<JsonValue>,
) -> (StatusCode, Json<JsonValue>) {
    let mut inner = store.lock();
    let Some(salesperson) = inner
        .salespersons
        .iter_mut()
        .find(|salesperson| salesperson["id"] == id.as_str())
    else {
        return (
            StatusCode::NOT_FOUND,
            Json(error_body("salesperson not found", Vec::new())),
        );
    };
    if let (Some(target), Some(patch)) = (salesperson.as_object_mut(), body.as_object()) {
        for (key, value) in patch {
            target.insert(key.clone(), value.clone());
        }
        target.insert("id".to_string(), json!(id));
    }
    (StatusCode::OK, Json(salesperson.clone()))
}

async fn delete_salesperson(State(store): State<Store>, Path(id): Path<String>) -> StatusCode {
    let mut inner = store.lock();
    let before = inner.salespersons.len();
    inner
        .salespersons
        .retain(|salesperson| salesperson["id"] != id.as_str());
    if inner.salespersons.len() < before {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

// ---- synthetic latency ----

async fn delayed_ok(Path(ms): Path<u64>) -> Json<JsonValue> {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    Json(json!([]))
}

fn router(store: Store) -> Router {
    Router::new()
        .route("/api/products", get(list_products).post(create_product))
        .route("/api/products/:id", get(get_product).put(update_product))
        .route("/api/categories", get(list_categories).post(create_category))
        .route("/api/categories/:id", get(get_category))
        .route("/api/users", get(list_users).post(create_user))
        .route("/api/users/:id", get(get_user))
        .route("/api/orders", get(list_orders).post(create_order))
        .route("/api/orders/:id", get(get_order))
        .route("/api/orders/:id/status", put(update_order_status))
        .route(
            "/api/salespersons",
            get(list_salespersons).post(create_salesperson),
        )
        .route(
            "/api/salespersons/:id",
            get(get_salesperson)
                .put(update_salesperson)
                .delete(delete_salesperson),
        )
        .route("/api/delay/:ms", get(delayed_ok))
        .with_state(store)
}

/// A running mock backend on an ephemeral port.
pub struct MockBackend {
    addr: SocketAddr,
    handle: tokio::task::JoinHandle<()>,
    /// Ids seeded into each collection at spawn time.
    pub seed: SeedIds,
}

impl MockBackend {
    pub async fn spawn() -> Self {
        let (store, seed) = Store::seeded();
        let app = router(store);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock backend");
        let addr = listener.local_addr().expect("mock backend addr");
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve mock backend");
        });
        Self { addr, handle, seed }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// The e-commerce demo specification, including the Order ↔ User ↔
/// Product ↔ Category reference cycle.
pub fn demo_spec() -> JsonValue {
    json!({
        "openapi": "3.0.0",
        "info": { "title": "Demo e-commerce API", "version": "1.0.0" },
        "paths": {
            "/api/products": {
                "get": {
                    "summary": "List products",
                    "parameters": [
                        { "name": "page", "in": "query", "schema": { "type": "integer" } },
                        { "name": "pageSize", "in": "query", "schema": { "type": "integer" } }
                    ],
                    "responses": {
                        "200": {
                            "content": {
                                "application/json": {
                                    "schema": {
                                        "type": "array",
                                        "items": { "$ref": "#/components/schemas/Product" }
                                    }
                                }
                            }
                        }
                    }
                },
                "post": {
                    "summary": "Create a product",
                    "requestBody": {
                        "content": {
                            "application/json": {
                                "schema": { "$ref": "#/components/schemas/ProductInput" }
                            }
                        }
                    },
                    "responses": {
                        "201": {
                            "content": {
                                "application/json": {
                                    "schema": { "$ref": "#/components/schemas/Product" }
                                }
                            }
                        }
                    }
                }
            },
            "/api/products/{id}": {
                "get": {
                    "summary": "Fetch one product",
                    "responses": {
                        "200": {
                            "content": {
                                "application/json": {
                                    "schema": { "$ref": "#/components/schemas/Product" }
                                }
                            }
                        }
                    }
                }
            },
            "/api/orders": {
                "post": {
                    "summary": "Create an order",
                    "requestBody": {
                        "content": {
                            "application/json": {
                                "schema": { "$ref": "#/components/schemas/OrderInput" }
                            }
                        }
                    },
                    "responses": {
                        "201": {
                            "content": {
                                "application/json": {
                                    "schema": { "$ref": "#/components/schemas/Order" }
                                }
                            }
                        }
                    }
                }
            }
        },
        "components": {
            "schemas": {
                "Product": {
                    "type": "object",
                    "properties": {
                        "id": { "type": "string", "format": "uuid" },
                        "name": { "type": "string", "minLength": 1, "maxLength": 200 },
                        "description": { "type": "string", "nullable": true },
                        "price": { "type": "number", "minimum": 0.01 },
                        "stockQuantity": { "type": "integer", "minimum": 0 },
                        "categoryId": { "type": "string", "format": "uuid" },
                        "category": { "$ref": "#/components/schemas/Category" },
                        "createdAt": { "type": "string", "format": "date-time" }
                    },
                    "required": ["id", "name", "price", "stockQuantity", "categoryId"]
                },
                "ProductInput": {
                    "type": "object",
                    "properties": {
                        "name": { "type": "string", "minLength": 1, "maxLength": 200 },
                        "description": { "type": "string" },
                        "price": { "type": "number", "minimum": 0.01 },
                        "stockQuantity": { "type": "integer", "minimum": 0 },
                        "categoryId": { "type": "string", "format": "uuid" }
                    },
                    "required": ["name", "price", "stockQuantity", "categoryId"],
                    "additionalProperties": false
                },
                "Category": {
                    "type": "object",
                    "properties": {
                        "id": { "type": "string", "format": "uuid" },
                        "name": { "type": "string", "minLength": 1, "maxLength": 100 },
                        "products": {
                            "type": "array",
                            "items": { "$ref": "#/components/schemas/Product" }
                        }
                    },
                    "required": ["id", "name"]
                },
                "User": {
                    "type": "object",
                    "properties": {
                        "id": { "type": "string", "format": "uuid" },
                        "name": { "type": "string", "minLength": 1 },
                        "email": { "type": "string", "format": "email" },
                        "orders": {
                            "type": "array",
                            "items": { "$ref": "#/components/schemas/Order" }
                        }
                    },
                    "required": ["id", "name", "email"]
                },
                "OrderItem": {
                    "type": "object",
                    "properties": {
                        "productId": { "type": "string", "format": "uuid" },
                        "product": { "$ref": "#/components/schemas/Product" },
                        "quantity": { "type": "integer", "minimum": 1 }
                    },
                    "required": ["productId", "quantity"]
                },
                "Order": {
                    "type": "object",
                    "properties": {
                        "id": { "type": "string", "format": "uuid" },
                        "userId": { "type": "string", "format": "uuid" },
                        "user": { "$ref": "#/components/schemas/User" },
                        "orderItems": {
                            "type": "array",
                            "minItems": 1,
                            "items": { "$ref": "#/components/schemas/OrderItem" }
                        },
                        "status": { "type": "string", "enum": ORDER_STATUSES },
                        "totalAmount": { "type": "number", "minimum": 0 }
                    },
                    "required": ["id", "userId", "orderItems", "status"]
                },
                "OrderInput": {
                    "type": "object",
                    "properties": {
                        "userId": { "type": "string", "format": "uuid" },
                        "salespersonId": { "type": "string", "format": "uuid" },
                        "orderItems": {
                            "type": "array",
                            "minItems": 1,
                            "items": {
                                "type": "object",
                                "properties": {
                                    "productId": { "type": "string", "format": "uuid" },
                                    "quantity": { "type": "integer", "minimum": 1 }
                                },
                                "required": ["productId", "quantity"],
                                "additionalProperties": false
                            }
                        }
                    },
                    "required": ["userId", "orderItems"],
                    "additionalProperties": false
                }
            }
        }
    })
}
