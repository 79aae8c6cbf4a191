//! In-process fake backend and wiring for gateway and service tests.

use std::time::Duration;

use axum::Router;
use tempfile::TempDir;

use qskipper_shared::constants::{
    KEY_AUTH_TOKEN, KEY_RESTAURANT_DATA, KEY_RESTAURANT_ID, KEY_USER_ID,
};
use qskipper_store::ImageCache;

use crate::config::ClientConfig;
use crate::gateway::ApiGateway;
use crate::session::tests::SharedStore;
use crate::session::{spawn_session, SessionHandle};

/// Serve `router` on an ephemeral localhost port and return its base URL.
pub(crate) async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

pub(crate) struct Harness {
    pub store: SharedStore,
    pub images: ImageCache,
    pub session: SessionHandle,
    pub gateway: ApiGateway,
    _dir: TempDir,
}

/// Fake backend plus a client wired to it. A signed-in harness holds user
/// `u1`, token `tok` and restaurant `r1`.
pub(crate) async fn harness(router: Router, signed_in: bool) -> Harness {
    let base = serve(router).await;
    let dir = TempDir::new().unwrap();

    let config = ClientConfig {
        api_url: base,
        read_timeout: Duration::from_secs(5),
        write_timeout: Duration::from_secs(5),
        data_dir: Some(dir.path().to_path_buf()),
        ..Default::default()
    };

    let store = SharedStore::default();
    if signed_in {
        store.set(KEY_USER_ID, "u1");
        store.set(KEY_AUTH_TOKEN, "tok");
        store.set(KEY_RESTAURANT_ID, "r1");
        store.set(
            KEY_RESTAURANT_DATA,
            r#"{"name":"Chai Point","cuisine":"Indian","estimatedTime":20}"#,
        );
    }

    let images = ImageCache::open(config.image_cache_dir().unwrap(), 1024 * 1024, 4 * 1024 * 1024)
        .await
        .unwrap();
    let session = spawn_session(Box::new(store.clone()), Some(images.clone()));
    let gateway = ApiGateway::new(&config, session.clone()).unwrap();

    Harness {
        store,
        images,
        session,
        gateway,
        _dir: dir,
    }
}

/// A small valid PNG.
pub(crate) fn sample_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}
