//! # qskipper-admin
//!
//! Headless restaurant-admin client. Rehydrates the persisted session and,
//! when signed in, prints a summary of the restaurant's orders and menu.

use tracing::{info, warn};

use qskipper_client::{init_tracing, AppContext, ClientConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    info!("Starting qskipper-admin v{}", env!("CARGO_PKG_VERSION"));

    let config = ClientConfig::from_env();
    info!(?config, "Loaded configuration");

    let ctx = AppContext::open(config).await?;
    let identity = ctx.session.rehydrate().await?;

    if !identity.is_authenticated() {
        info!("No session present, sign in from a front end first");
        return Ok(());
    }

    let orders = match ctx.orders.fetch_orders(None).await {
        Ok(orders) => orders,
        Err(e) => {
            warn!(error = %e, "Failed to fetch orders");
            Vec::new()
        }
    };
    let products = match ctx.products.fetch_products(None).await {
        Ok(products) => products,
        Err(e) => {
            warn!(error = %e, "Failed to fetch products");
            Vec::new()
        }
    };

    let active = orders.iter().filter(|o| o.is_active()).count();
    let available = products.iter().filter(|p| p.is_available).count();
    info!(
        restaurant = %identity.restaurant.name,
        restaurant_id = ?identity.restaurant_id,
        orders = orders.len(),
        active_orders = active,
        products = products.len(),
        available_products = available,
        "Restaurant summary"
    );

    Ok(())
}
