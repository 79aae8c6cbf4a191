/// Application name
pub const APP_NAME: &str = "QSkipper";

/// Default backend base URL
pub const DEFAULT_API_URL: &str = "https://qskipperbackend.onrender.com";

// ---------------------------------------------------------------------------
// Endpoints
// ---------------------------------------------------------------------------

pub const LOGIN_PATH: &str = "/resturant-login";
pub const REGISTER_PATH: &str = "/resturant-register";
pub const PRODUCTS_PATH: &str = "/get_all_product";
pub const CREATE_PRODUCT_PATH: &str = "/create-product";
pub const UPDATE_PRODUCT_PATH: &str = "/update-product";
pub const DELETE_PRODUCT_PATH: &str = "/delete-product";
pub const ORDERS_PATH: &str = "/get-order";
pub const COMPLETE_ORDER_PATH: &str = "/order-complete";
pub const UPDATE_RESTAURANT_PATH: &str = "/update-restaurant";

/// Envelope key of the product list response
pub const PRODUCTS_LIST_KEY: &str = "products";

/// Envelope key of the order list response
pub const ORDERS_LIST_KEY: &str = "all_orders";

// ---------------------------------------------------------------------------
// Persisted key-value store keys
// ---------------------------------------------------------------------------

pub const KEY_AUTH_TOKEN: &str = "qskipper_auth_token";
pub const KEY_USER_ID: &str = "qskipper_user_id";
pub const KEY_RESTAURANT_ID: &str = "restaurant_id";
pub const KEY_RESTAURANT_DATA: &str = "restaurant_data";
pub const KEY_RESTAURANT_RAW_DATA: &str = "restaurant_raw_data";
pub const KEY_IS_RESTAURANT_REGISTERED: &str = "is_restaurant_registered";

/// Restaurant-related keys removed explicitly on logout
pub const RESTAURANT_KEYS: [&str; 4] = [
    KEY_RESTAURANT_ID,
    KEY_RESTAURANT_DATA,
    KEY_RESTAURANT_RAW_DATA,
    KEY_IS_RESTAURANT_REGISTERED,
];

/// Any persisted key containing one of these fragments is swept on logout
pub const LOGOUT_SWEEP_FRAGMENTS: [&str; 7] = [
    "user",
    "auth",
    "token",
    "restaurant",
    "profile",
    "login",
    "qskipper",
];

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Prefix of ids synthesized client-side when a create response carries none
pub const PLACEHOLDER_ID_PREFIX: &str = "local-";

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

/// Longest edge of a product photo before upload
pub const PRODUCT_IMAGE_MAX_EDGE: u32 = 800;

/// Longest edge of a restaurant banner before upload
pub const BANNER_IMAGE_MAX_EDGE: u32 = 1200;

/// Target encoded size of an uploaded image (500 KB)
pub const UPLOAD_TARGET_BYTES: usize = 500 * 1024;

/// Upper bound of the JPEG quality search
pub const MAX_QUALITY_ITERATIONS: u32 = 6;

/// Multipart file field and JSON base64 field for product photos
pub const PRODUCT_PHOTO_FIELD: &str = "product_photo";
pub const PRODUCT_PHOTO_BASE64_FIELD: &str = "product_photo64Image";

/// Multipart file field for restaurant banners
pub const BANNER_PHOTO_FIELD: &str = "bannerPhoto64Image";
