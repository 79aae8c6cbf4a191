//! Menu management.
//!
//! Writes carrying an image go out as multipart first and fall back to JSON
//! with the image base64-encoded. Both target the same endpoint.

use reqwest::multipart::{Form, Part};
use reqwest::Method;
use tracing::{debug, info};

use qskipper_shared::constants::{
    CREATE_PRODUCT_PATH, DELETE_PRODUCT_PATH, PRODUCTS_PATH, PRODUCT_IMAGE_MAX_EDGE,
    PRODUCT_PHOTO_FIELD, UPDATE_PRODUCT_PATH,
};
use qskipper_shared::normalize::records::{product_form_fields, product_to_json};
use qskipper_shared::normalize::{
    classify_create, decode_products, product_from_value, resolve_created_product, CreateResult,
};
use qskipper_shared::{is_placeholder_id, Product};

use crate::error::{ApiError, Result};
use crate::fallback::FallbackChain;
use crate::gateway::{ApiGateway, RawResponse};
use crate::session::SessionHandle;

#[derive(Debug, Clone)]
pub struct ProductService {
    gateway: ApiGateway,
    session: SessionHandle,
}

fn product_form(product: &Product) -> Result<Form> {
    let mut form = Form::new();
    for (name, value) in product_form_fields(product) {
        form = form.text(name, value);
    }
    if let Some(image) = &product.image {
        let part = Part::bytes(image.to_vec())
            .file_name("product.jpg")
            .mime_str("image/jpeg")?;
        form = form.part(PRODUCT_PHOTO_FIELD, part);
    }
    Ok(form)
}

/// Prefer the record the backend echoed; fall back to what was submitted.
fn merge_updated(submitted: &Product, body: &[u8]) -> Product {
    match classify_create(body) {
        CreateResult::Record(value) => match product_from_value(&value) {
            Some(mut echoed) => {
                if echoed.id.is_empty() {
                    echoed.id = submitted.id.clone();
                }
                if echoed.restaurant_id.is_empty() {
                    echoed.restaurant_id = submitted.restaurant_id.clone();
                }
                if echoed.name.is_empty() {
                    echoed.name = submitted.name.clone();
                }
                echoed.image = None;
                echoed
            }
            None => submitted.clone(),
        },
        CreateResult::Id(_) | CreateResult::Unparseable => submitted.clone(),
    }
}

impl ProductService {
    pub fn new(gateway: ApiGateway, session: SessionHandle) -> Self {
        Self { gateway, session }
    }

    /// Products of the resolved restaurant. Unresolved identity means no
    /// request and no products.
    pub async fn fetch_products(&self, explicit: Option<&str>) -> Result<Vec<Product>> {
        let resolution = self.session.resolve_restaurant(explicit).await?;
        let Some(restaurant_id) = resolution.id() else {
            debug!("No restaurant identity, skipping product fetch");
            return Ok(Vec::new());
        };

        let path = format!("{PRODUCTS_PATH}/{restaurant_id}");
        let products = self.gateway.fetch_list(&path, decode_products, true).await?;
        debug!(restaurant_id, count = products.len(), "Fetched products");
        Ok(products)
    }

    /// The product must be scoped to the resolved restaurant.
    async fn check_scope(&self, product: &Product) -> Result<()> {
        if product.restaurant_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("product has no restaurant id".into()));
        }
        let resolved = self.session.resolve_restaurant(None).await?.require()?;
        if product.restaurant_id.trim() != resolved {
            return Err(ApiError::InvalidInput(format!(
                "product belongs to restaurant {} but the session is scoped to {}",
                product.restaurant_id, resolved
            )));
        }
        Ok(())
    }

    async fn prepare_upload(&self, product: &Product) -> Result<Product> {
        let mut prepared = product.clone();
        if let Some(image) = product.image.clone() {
            prepared.image = Some(super::compress_upload(image, PRODUCT_IMAGE_MAX_EDGE).await?);
        }
        Ok(prepared)
    }

    async fn submit(
        &self,
        operation: &'static str,
        method: Method,
        path: &str,
        product: &Product,
    ) -> Result<RawResponse> {
        let gateway = &self.gateway;
        let multipart_method = method.clone();
        FallbackChain::new(operation)
            .then("multipart", move || async move {
                let form = product_form(product)?;
                gateway.send_multipart(multipart_method, path, form).await
            })
            .then("json", move || async move {
                gateway
                    .send_json(method, path, &product_to_json(product))
                    .await
            })
            .run()
            .await
            .into_result()
    }

    #[tracing::instrument(skip(self, product), fields(name = %product.name))]
    pub async fn create_product(&self, product: &Product) -> Result<Product> {
        self.check_scope(product).await?;
        let upload = self.prepare_upload(product).await?;

        let response = self
            .submit("create_product", Method::POST, CREATE_PRODUCT_PATH, &upload)
            .await?;
        let mut created = resolve_created_product(&upload, classify_create(&response.body));
        created.image = product.image.clone();

        self.invalidate_listing().await;
        info!(product_id = %created.id, placeholder = created.has_placeholder_id(), "Product created");
        Ok(created)
    }

    #[tracing::instrument(skip(self, product), fields(product_id = %product.id))]
    pub async fn update_product(&self, product: &Product) -> Result<Product> {
        require_backend_id(&product.id)?;
        self.check_scope(product).await?;
        let upload = self.prepare_upload(product).await?;

        let path = format!("{UPDATE_PRODUCT_PATH}/{}", product.id);
        let response = self
            .submit("update_product", Method::PUT, &path, &upload)
            .await?;
        let mut updated = merge_updated(product, &response.body);
        updated.image = product.image.clone();

        self.invalidate_listing().await;
        info!(product_id = %updated.id, "Product updated");
        Ok(updated)
    }

    /// Toggle availability. Sent as JSON only; the image is not re-uploaded.
    pub async fn set_availability(&self, product: &Product, available: bool) -> Result<Product> {
        require_backend_id(&product.id)?;
        self.check_scope(product).await?;

        let mut changed = product.clone();
        changed.is_available = available;
        changed.image = None;

        let path = format!("{UPDATE_PRODUCT_PATH}/{}", product.id);
        let response = self
            .gateway
            .send_json(Method::PUT, &path, &product_to_json(&changed))
            .await?;
        let mut updated = merge_updated(&changed, &response.body);
        updated.image = product.image.clone();

        self.invalidate_listing().await;
        debug!(product_id = %updated.id, available, "Availability changed");
        Ok(updated)
    }

    pub async fn delete_product(&self, product_id: &str) -> Result<()> {
        require_backend_id(product_id)?;
        let path = format!("{DELETE_PRODUCT_PATH}/{product_id}");
        self.gateway.delete(&path).await?;
        self.invalidate_listing().await;
        info!(product_id, "Product deleted");
        Ok(())
    }

    async fn invalidate_listing(&self) {
        self.gateway
            .response_cache()
            .invalidate_prefix(PRODUCTS_PATH)
            .await;
    }
}

fn require_backend_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(ApiError::InvalidInput("product id is required".into()));
    }
    if is_placeholder_id(id) {
        return Err(ApiError::InvalidInput(format!(
            "product {id} has not been confirmed by the backend"
        )));
    }
    Ok(())
}
