//! # qskipper-client
//!
//! Restaurant-admin client core: an HTTP gateway with fallback strategies and
//! a short-lived response cache, a single-writer session store, and the domain
//! services built over them. [`AppContext`] wires everything together.

pub mod config;
pub mod error;
pub mod fallback;
pub mod gateway;
pub mod resolver;
pub mod response_cache;
pub mod services;
pub mod session;

#[cfg(test)]
mod test_support;

use qskipper_store::{ImageCache, KeyValueStore};
use tracing_subscriber::{fmt, EnvFilter};

pub use crate::config::ClientConfig;
pub use crate::error::{ApiError, Result};
pub use crate::gateway::ApiGateway;
pub use crate::session::{spawn_session, SessionHandle};
use crate::services::{AuthService, ImageService, OrderService, ProductService, RestaurantService};

/// Install the global `fmt` subscriber. `RUST_LOG` takes precedence over the
/// built-in filter. Calling this more than once is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("qskipper_client=debug,qskipper_store=info,qskipper_shared=info,warn")
    });

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}

/// Everything a front end needs, built once and passed around by clone.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub config: ClientConfig,
    pub images: ImageCache,
    pub session: SessionHandle,
    pub gateway: ApiGateway,
    pub auth: AuthService,
    pub products: ProductService,
    pub orders: OrderService,
    pub restaurant: RestaurantService,
    pub image_service: ImageService,
}

impl AppContext {
    /// Open the on-disk database and image cache named by `config`.
    pub async fn open(config: ClientConfig) -> Result<Self> {
        let db = config.open_database()?;
        let images = ImageCache::open(
            config.image_cache_dir()?,
            config.image_memory_cap_bytes,
            config.image_disk_cap_bytes,
        )
        .await?;
        Self::with_store(config, Box::new(db), images)
    }

    /// Build over an arbitrary key-value store. Must run inside a tokio
    /// runtime since the session actor is spawned here.
    pub fn with_store(
        config: ClientConfig,
        store: Box<dyn KeyValueStore>,
        images: ImageCache,
    ) -> Result<Self> {
        let session = spawn_session(store, Some(images.clone()));
        let gateway = ApiGateway::new(&config, session.clone())?;

        Ok(Self {
            auth: AuthService::new(gateway.clone(), session.clone()),
            products: ProductService::new(gateway.clone(), session.clone()),
            orders: OrderService::new(gateway.clone(), session.clone()),
            restaurant: RestaurantService::new(gateway.clone(), session.clone()),
            image_service: ImageService::new(gateway.clone(), images.clone()),
            config,
            images,
            session,
            gateway,
        })
    }
}
