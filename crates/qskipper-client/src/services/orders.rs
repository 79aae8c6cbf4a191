use reqwest::Method;
use serde_json::json;
use tracing::{debug, info};

use qskipper_shared::constants::{COMPLETE_ORDER_PATH, ORDERS_PATH};
use qskipper_shared::normalize::decode_orders;
use qskipper_shared::Order;

use crate::error::{ApiError, Result};
use crate::gateway::ApiGateway;
use crate::session::SessionHandle;

#[derive(Debug, Clone)]
pub struct OrderService {
    gateway: ApiGateway,
    session: SessionHandle,
}

impl OrderService {
    pub fn new(gateway: ApiGateway, session: SessionHandle) -> Self {
        Self { gateway, session }
    }

    /// Orders of the resolved restaurant. Always fetched fresh.
    pub async fn fetch_orders(&self, explicit: Option<&str>) -> Result<Vec<Order>> {
        let resolution = self.session.resolve_restaurant(explicit).await?;
        let Some(restaurant_id) = resolution.id() else {
            debug!("No restaurant identity, skipping order fetch");
            return Ok(Vec::new());
        };

        let path = format!("{ORDERS_PATH}/{restaurant_id}");
        let orders = self.gateway.fetch_list(&path, decode_orders, false).await?;
        debug!(restaurant_id, count = orders.len(), "Fetched orders");
        Ok(orders)
    }

    /// Mark an order completed. The local record is patched once the backend
    /// accepts (200 or 202), without waiting for a refetch.
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id))]
    pub async fn complete_order(&self, order: &mut Order) -> Result<()> {
        if order.id.trim().is_empty() {
            return Err(ApiError::InvalidInput("order id is required".into()));
        }

        let path = format!("{COMPLETE_ORDER_PATH}/{}", order.id);
        let response = self
            .gateway
            .send_json(Method::PUT, &path, &json!({ "status": "completed" }))
            .await?;

        order.mark_completed();
        info!(status = response.status, "Order completed");
        Ok(())
    }
}
