//! Typed records from loosely-shaped JSON objects.
//!
//! Fields are looked up under every key the backend has used for them; the
//! first present key wins. Duplicate spellings in one object are therefore
//! harmless, which is not the case for serde aliases.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::envelope::{self, CreateResult, ListBody};
use super::{coerce, dates};
use crate::constants::{ORDERS_LIST_KEY, PRODUCTS_LIST_KEY, PRODUCT_PHOTO_BASE64_FIELD};
use crate::error::NormalizeError;
use crate::types::{placeholder_id, Order, OrderItem, Product, RestaurantProfile};

static NULL: Value = Value::Null;

/// Read-only view over a JSON object with multi-key lookups.
struct Fields<'a>(&'a Map<String, Value>);

impl<'a> Fields<'a> {
    fn get(&self, keys: &[&str]) -> &'a Value {
        keys.iter()
            .find_map(|key| self.0.get(*key).filter(|v| !v.is_null()))
            .unwrap_or(&NULL)
    }

    fn has(&self, keys: &[&str]) -> bool {
        !self.get(keys).is_null()
    }

    fn string(&self, keys: &[&str]) -> String {
        coerce::string(self.get(keys))
    }

    fn optional_string(&self, keys: &[&str]) -> Option<String> {
        coerce::optional_string(self.get(keys))
    }

    fn decimal(&self, keys: &[&str]) -> Decimal {
        coerce::decimal(self.get(keys))
    }

    fn quantity(&self, keys: &[&str]) -> u32 {
        coerce::quantity(self.get(keys))
    }

    fn bool_or(&self, keys: &[&str], default: bool) -> bool {
        match self.get(keys) {
            Value::Null => default,
            value => coerce::boolean(value),
        }
    }

    fn object(&self, keys: &[&str]) -> Option<&'a Map<String, Value>> {
        self.get(keys).as_object()
    }
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

pub fn order_from_value(value: &Value) -> Option<Order> {
    let map = value.as_object()?;
    let f = Fields(map);

    let items = match f.get(&["items", "orderItems", "products"]) {
        Value::Array(items) => items.iter().filter_map(order_item_from_value).collect(),
        _ => Vec::new(),
    };

    Some(Order {
        id: f.string(&["_id", "id", "orderId", "order_id"]),
        status: f.string(&["status", "orderStatus", "order_status"]),
        total_amount: f.decimal(&["totalAmount", "total_amount", "total", "price"]),
        items,
        cook_time: f.quantity(&["cookTime", "cook_time", "cookingTime"]),
        takeaway: f.bool_or(&["takeAway", "takeaway", "take_away", "isTakeaway"], false),
        scheduled_at: dates::date_value(f.get(&["scheduleDate", "scheduledTime", "schedule_date"])),
        placed_at: dates::date_value(f.get(&["Time", "createdAt", "orderTime", "created_at"])),
    })
}

fn order_item_from_value(value: &Value) -> Option<OrderItem> {
    let f = Fields(value.as_object()?);
    Some(OrderItem {
        id: f.string(&["_id", "productId", "product_id", "id"]),
        name: f.string(&["name", "product_name", "productName"]),
        quantity: f.quantity(&["quantity", "qty"]),
        unit_price: f.decimal(&["price", "product_price", "unitPrice"]),
    })
}

// ---------------------------------------------------------------------------
// Products
// ---------------------------------------------------------------------------

pub fn product_from_value(value: &Value) -> Option<Product> {
    let f = Fields(value.as_object()?);
    Some(Product {
        id: f.string(&["_id", "id", "productId", "product_id"]),
        name: f.string(&["product_name", "name", "productName"]),
        description: f.string(&["description", "product_description"]),
        price: coerce::minor_units(f.get(&["product_price", "price"])),
        category: f.string(&["food_category", "category"]),
        restaurant_id: f.string(&["restaurant_id", "restaurantId", "restaurantid"]),
        is_available: f.bool_or(&["availability", "isAvailable", "is_available", "available"], true),
        is_featured: f.bool_or(&["isFeatured", "featured", "is_featured"], false),
        extra_time: f.quantity(&["extraTime", "extra_time"]),
        image: None,
        image_url: f.optional_string(&["product_photo_url", "imageUrl", "image_url", "photoUrl"]),
    })
}

/// Text fields of a product as the create/update endpoints expect them.
pub fn product_form_fields(product: &Product) -> Vec<(&'static str, String)> {
    vec![
        ("product_name", product.name.clone()),
        ("description", product.description.clone()),
        ("product_price", product.price.to_string()),
        ("food_category", product.category.clone()),
        ("restaurant_id", product.restaurant_id.clone()),
        ("availability", product.is_available.to_string()),
        ("isFeatured", product.is_featured.to_string()),
        ("extraTime", product.extra_time.to_string()),
    ]
}

/// JSON body used when multipart submission is not accepted. The image, if
/// any, travels base64-encoded.
pub fn product_to_json(product: &Product) -> Value {
    let mut map = Map::new();
    if !product.id.is_empty() && !product.has_placeholder_id() {
        map.insert("_id".into(), json!(product.id));
    }
    for (key, value) in product_form_fields(product) {
        map.insert(key.into(), Value::String(value));
    }
    map.insert("product_price".into(), json!(product.price));
    map.insert("availability".into(), json!(product.is_available));
    map.insert("isFeatured".into(), json!(product.is_featured));
    map.insert("extraTime".into(), json!(product.extra_time));
    if let Some(image) = &product.image {
        map.insert(PRODUCT_PHOTO_BASE64_FIELD.into(), json!(STANDARD.encode(image)));
    }
    Value::Object(map)
}

/// Merge a create response into the record that was submitted.
///
/// The submitted record is trusted for every field the response does not
/// supply; an unreadable response gets a synthesized placeholder id.
pub fn resolve_created_product(submitted: &Product, result: CreateResult) -> Product {
    match result {
        CreateResult::Id(id) => Product {
            id,
            ..submitted.clone()
        },
        CreateResult::Record(value) => {
            let Some(mut decoded) = product_from_value(&value) else {
                return with_placeholder(submitted);
            };
            if decoded.id.is_empty() {
                decoded.id = placeholder_id();
            }
            if decoded.name.is_empty() {
                decoded.name = submitted.name.clone();
            }
            if decoded.restaurant_id.is_empty() {
                decoded.restaurant_id = submitted.restaurant_id.clone();
            }
            decoded.image = submitted.image.clone();
            decoded
        }
        CreateResult::Unparseable => with_placeholder(submitted),
    }
}

fn with_placeholder(submitted: &Product) -> Product {
    let id = placeholder_id();
    warn!(placeholder = %id, "Create response carried no id, using placeholder");
    Product {
        id,
        ..submitted.clone()
    }
}

// ---------------------------------------------------------------------------
// Lists
// ---------------------------------------------------------------------------

fn decode_elements<T>(body: ListBody, what: &str, decode: fn(&Value) -> Option<T>) -> Vec<T> {
    if let ListBody::NoResults(Some(message)) = &body {
        debug!(%message, "{what} list reported no results");
    }
    body.into_elements()
        .iter()
        .filter_map(|element| {
            let decoded = decode(element);
            if decoded.is_none() {
                warn!(element = %element, "Skipping non-object {what} element");
            }
            decoded
        })
        .collect()
}

/// Decode an order list body. Only a body that is not JSON (and not an HTML
/// page) is an error.
pub fn decode_orders(body: &[u8]) -> Result<Vec<Order>, NormalizeError> {
    decode_list(body, ORDERS_LIST_KEY, "order", order_from_value)
}

pub fn decode_products(body: &[u8]) -> Result<Vec<Product>, NormalizeError> {
    decode_list(body, PRODUCTS_LIST_KEY, "product", product_from_value)
}

fn decode_list<T>(
    body: &[u8],
    key: &str,
    what: &str,
    decode: fn(&Value) -> Option<T>,
) -> Result<Vec<T>, NormalizeError> {
    match envelope::classify_list(body, key) {
        ListBody::Malformed(reason) => Err(NormalizeError::Malformed(reason)),
        ListBody::Html => {
            warn!("{what} list answered with an HTML page, treating as empty");
            Ok(Vec::new())
        }
        shape => Ok(decode_elements(shape, what, decode)),
    }
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

/// Identity data extracted from a login or registration response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AuthPayload {
    pub user_id: Option<String>,
    pub token: Option<String>,
    pub restaurant_id: Option<String>,
    pub restaurant: RestaurantProfile,
    /// The response object as received, persisted for later fallbacks.
    pub raw: Value,
}

const USER_ID_KEYS: [&str; 4] = ["_id", "id", "userId", "user_id"];
const TOKEN_KEYS: [&str; 3] = ["token", "accessToken", "access_token"];
const RESTAURANT_ID_KEYS: [&str; 3] = ["restaurantid", "restaurantId", "restaurant_id"];
const RESTAURANT_NAME_KEYS: [&str; 3] = ["restaurantName", "restaurant_Name", "restaurant_name"];
const CUISINE_KEYS: [&str; 2] = ["cuisine", "cuisines"];
const ESTIMATED_TIME_KEYS: [&str; 2] = ["estimatedTime", "estimated_time"];

/// Accepts a flat object, an object with a nested `user`, or a bare id string.
pub fn decode_auth(body: &[u8]) -> Result<AuthPayload, NormalizeError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| NormalizeError::Malformed(e.to_string()))?;

    match &value {
        Value::String(id) if !id.trim().is_empty() => Ok(AuthPayload {
            user_id: Some(id.trim().to_string()),
            raw: value.clone(),
            ..Default::default()
        }),
        Value::Object(map) => Ok(auth_from_object(map, value.clone())),
        other => Err(NormalizeError::UnexpectedShape(format!(
            "auth response is neither object nor id: {other}"
        ))),
    }
}

fn auth_from_object(map: &Map<String, Value>, raw: Value) -> AuthPayload {
    let top = Fields(map);
    let nested_user = top.object(&["user", "data"]).map(Fields);
    let nested_restaurant = top
        .object(&["restaurant"])
        .or_else(|| nested_user.as_ref().and_then(|u| u.object(&["restaurant"])))
        .map(Fields);

    // Every lookup prefers the nested user, then the top level, then a nested
    // restaurant object.
    let scopes: Vec<&Fields> = nested_user
        .iter()
        .chain(std::iter::once(&top))
        .chain(nested_restaurant.iter())
        .collect();
    let find = |keys: &[&str]| scopes.iter().find_map(|f| f.optional_string(keys));

    let user_id = nested_user
        .as_ref()
        .and_then(|u| u.optional_string(&USER_ID_KEYS))
        .or_else(|| top.optional_string(&USER_ID_KEYS));

    let restaurant_id = find(&RESTAURANT_ID_KEYS).or_else(|| {
        nested_restaurant
            .as_ref()
            .and_then(|r| r.optional_string(&["_id", "id"]))
    });

    let estimated_time = scopes
        .iter()
        .find(|f| f.has(&ESTIMATED_TIME_KEYS))
        .map(|f| f.quantity(&ESTIMATED_TIME_KEYS))
        .unwrap_or_default();

    AuthPayload {
        user_id,
        token: find(&TOKEN_KEYS),
        restaurant_id,
        restaurant: RestaurantProfile {
            name: find(&RESTAURANT_NAME_KEYS).unwrap_or_default(),
            cuisine: find(&CUISINE_KEYS).unwrap_or_default(),
            estimated_time,
        },
        raw,
    }
}

/// Restaurant id recorded in a persisted raw auth response, if any.
pub fn restaurant_id_from_raw(raw: &Value) -> Option<String> {
    let map = raw.as_object()?;
    auth_from_object(map, Value::Null).restaurant_id
}
