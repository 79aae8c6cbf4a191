//! Session identity store.
//!
//! A single actor task owns the persisted [`KeyValueStore`] and the
//! in-memory [`SessionIdentity`]; every mutation is a command sent over an
//! mpsc channel, so logout can never interleave with a login. The current
//! identity is published on a watch channel, so reads need no round trip.

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use qskipper_shared::constants::{
    KEY_AUTH_TOKEN, KEY_IS_RESTAURANT_REGISTERED, KEY_RESTAURANT_DATA, KEY_RESTAURANT_ID,
    KEY_RESTAURANT_RAW_DATA, KEY_USER_ID, LOGOUT_SWEEP_FRAGMENTS, RESTAURANT_KEYS,
};
use qskipper_shared::normalize::records::restaurant_id_from_raw;
use qskipper_shared::normalize::AuthPayload;
use qskipper_shared::{RestaurantProfile, SessionIdentity};
use qskipper_store::{ImageCache, KeyValueStore};

use crate::error::{ApiError, Result};
use crate::resolver::{self, IdentitySources, Resolution};

enum SessionCommand {
    Rehydrate(oneshot::Sender<SessionIdentity>),
    Establish {
        payload: AuthPayload,
        reply: oneshot::Sender<Result<SessionIdentity>>,
    },
    SetRestaurant {
        restaurant_id: Option<String>,
        profile: RestaurantProfile,
        reply: oneshot::Sender<Result<SessionIdentity>>,
    },
    IdentitySources {
        explicit: Option<String>,
        reply: oneshot::Sender<IdentitySources>,
    },
    Logout(oneshot::Sender<Result<()>>),
}

/// Cloneable handle to the session actor.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::Sender<SessionCommand>,
    state_rx: watch::Receiver<SessionIdentity>,
}

impl std::fmt::Debug for SessionCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionCommand::Rehydrate(_) => "Rehydrate",
            SessionCommand::Establish { .. } => "Establish",
            SessionCommand::SetRestaurant { .. } => "SetRestaurant",
            SessionCommand::IdentitySources { .. } => "IdentitySources",
            SessionCommand::Logout(_) => "Logout",
        };
        f.write_str(name)
    }
}

/// Start the session actor. The persisted identity is loaded before this
/// returns, so [`SessionHandle::current`] is immediately meaningful.
///
/// `images` is cleared as the last step of logout.
pub fn spawn_session(store: Box<dyn KeyValueStore>, images: Option<ImageCache>) -> SessionHandle {
    let identity = load_identity(&*store);
    info!(
        authenticated = identity.is_authenticated(),
        restaurant = ?identity.restaurant_id,
        "Session rehydrated"
    );

    let (cmd_tx, mut cmd_rx) = mpsc::channel::<SessionCommand>(64);
    let (state_tx, state_rx) = watch::channel(identity.clone());

    let mut actor = SessionActor {
        store,
        images,
        identity,
        state_tx,
    };

    tokio::spawn(async move {
        while let Some(cmd) = cmd_rx.recv().await {
            debug!(command = ?cmd, "Session command");
            match cmd {
                SessionCommand::Rehydrate(reply) => {
                    actor.identity = load_identity(&*actor.store);
                    actor.publish();
                    let _ = reply.send(actor.identity.clone());
                }
                SessionCommand::Establish { payload, reply } => {
                    let _ = reply.send(actor.establish(payload));
                }
                SessionCommand::SetRestaurant {
                    restaurant_id,
                    profile,
                    reply,
                } => {
                    let _ = reply.send(actor.set_restaurant(restaurant_id, profile));
                }
                SessionCommand::IdentitySources { explicit, reply } => {
                    let _ = reply.send(actor.identity_sources(explicit));
                }
                SessionCommand::Logout(reply) => {
                    let _ = reply.send(actor.logout().await);
                }
            }
        }
        info!("Session handles dropped, session store stopped");
    });

    SessionHandle { cmd_tx, state_rx }
}

impl SessionHandle {
    pub fn current(&self) -> SessionIdentity {
        self.state_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionIdentity> {
        self.state_rx.clone()
    }

    pub fn user_id(&self) -> Option<String> {
        self.state_rx
            .borrow()
            .user_id
            .clone()
            .filter(|id| !id.trim().is_empty())
    }

    pub fn token(&self) -> Option<String> {
        self.state_rx.borrow().token.clone()
    }

    /// True iff a non-empty user id is held. The token plays no part.
    pub fn is_authenticated(&self) -> bool {
        self.state_rx.borrow().is_authenticated()
    }

    async fn request<R>(
        &self,
        command: impl FnOnce(oneshot::Sender<R>) -> SessionCommand,
    ) -> Result<R> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(command(reply))
            .await
            .map_err(|_| ApiError::Session)?;
        rx.await.map_err(|_| ApiError::Session)
    }

    /// Re-read the persisted identity.
    pub async fn rehydrate(&self) -> Result<SessionIdentity> {
        self.request(SessionCommand::Rehydrate).await
    }

    /// Persist a successful login or registration.
    pub async fn establish(&self, payload: AuthPayload) -> Result<SessionIdentity> {
        self.request(|reply| SessionCommand::Establish { payload, reply })
            .await?
    }

    /// Replace the restaurant snapshot. `None` keeps the current id.
    pub async fn set_restaurant(
        &self,
        restaurant_id: Option<String>,
        profile: RestaurantProfile,
    ) -> Result<SessionIdentity> {
        self.request(|reply| SessionCommand::SetRestaurant {
            restaurant_id,
            profile,
            reply,
        })
        .await?
    }

    pub async fn identity_sources(&self, explicit: Option<&str>) -> Result<IdentitySources> {
        let explicit = explicit.map(str::to_string);
        self.request(|reply| SessionCommand::IdentitySources { explicit, reply })
            .await
    }

    pub async fn resolve_restaurant(&self, explicit: Option<&str>) -> Result<Resolution> {
        let sources = self.identity_sources(explicit).await?;
        Ok(resolver::resolve(&sources))
    }

    /// Clear the session. Idempotent. The in-memory identity is cleared even
    /// when persistence fails, in which case the first failure is returned.
    pub async fn logout(&self) -> Result<()> {
        self.request(SessionCommand::Logout).await?
    }
}

struct SessionActor {
    store: Box<dyn KeyValueStore>,
    images: Option<ImageCache>,
    identity: SessionIdentity,
    state_tx: watch::Sender<SessionIdentity>,
}

impl SessionActor {
    fn publish(&self) {
        self.state_tx.send_replace(self.identity.clone());
    }

    fn establish(&mut self, payload: AuthPayload) -> Result<SessionIdentity> {
        let user_id = payload
            .user_id
            .as_ref()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ApiError::Decode("auth response carried no user id".into()))?;

        // A restaurant id left over from the same user survives a response
        // that omits it; another user's never does.
        let same_user = self.identity.user_id.as_deref() == Some(user_id.as_str());
        let restaurant_id = payload.restaurant_id.clone().or_else(|| {
            if same_user {
                self.identity.restaurant_id.clone()
            } else {
                None
            }
        });

        if let Err(e) = self.persist_login(&user_id, &payload, restaurant_id.as_deref()) {
            // The user id is what makes a persisted session; without it a
            // partial write rehydrates as signed out.
            warn!(error = %e, "Failed to persist login, discarding session");
            if let Err(e) = self.store.remove(KEY_USER_ID) {
                warn!(error = %e, "Failed to discard persisted user id");
            }
            self.identity = SessionIdentity::default();
            self.publish();
            return Err(e);
        }

        self.identity = SessionIdentity {
            user_id: Some(user_id),
            token: payload.token,
            restaurant_id,
            restaurant: payload.restaurant,
        };
        self.publish();

        info!(
            user_id = ?self.identity.user_id,
            restaurant_id = ?self.identity.restaurant_id,
            "Session established"
        );
        Ok(self.identity.clone())
    }

    /// Writes the user id last, after everything it vouches for.
    fn persist_login(
        &mut self,
        user_id: &str,
        payload: &AuthPayload,
        restaurant_id: Option<&str>,
    ) -> Result<()> {
        match &payload.token {
            Some(token) => self.store.set(KEY_AUTH_TOKEN, token)?,
            None => {
                self.store.remove(KEY_AUTH_TOKEN)?;
            }
        }
        if let Some(id) = restaurant_id {
            self.store.set(KEY_RESTAURANT_ID, id)?;
            self.store.set(KEY_IS_RESTAURANT_REGISTERED, "true")?;
        }
        self.store.set_json(KEY_RESTAURANT_DATA, &payload.restaurant)?;
        if !payload.raw.is_null() {
            self.store.set(KEY_RESTAURANT_RAW_DATA, &payload.raw.to_string())?;
        }
        self.store.set(KEY_USER_ID, user_id)?;
        Ok(())
    }

    fn set_restaurant(
        &mut self,
        restaurant_id: Option<String>,
        profile: RestaurantProfile,
    ) -> Result<SessionIdentity> {
        let restaurant_id = restaurant_id
            .filter(|id| !id.trim().is_empty())
            .or_else(|| self.identity.restaurant_id.clone());

        if let Some(id) = &restaurant_id {
            self.store.set(KEY_RESTAURANT_ID, id)?;
            self.store.set(KEY_IS_RESTAURANT_REGISTERED, "true")?;
        }
        self.store.set_json(KEY_RESTAURANT_DATA, &profile)?;

        self.identity.restaurant_id = restaurant_id;
        self.identity.restaurant = profile;
        self.publish();

        debug!(restaurant_id = ?self.identity.restaurant_id, "Restaurant snapshot updated");
        Ok(self.identity.clone())
    }

    fn identity_sources(&self, explicit: Option<String>) -> IdentitySources {
        let user_profile = read_key(&*self.store, KEY_RESTAURANT_RAW_DATA)
            .and_then(|raw| serde_json::from_str::<Value>(&raw).ok())
            .and_then(|raw| restaurant_id_from_raw(&raw));

        IdentitySources {
            explicit,
            persisted: read_key(&*self.store, KEY_RESTAURANT_ID),
            session_cached: self.identity.restaurant_id.clone(),
            user_profile,
        }
    }

    async fn logout(&mut self) -> Result<()> {
        self.identity = SessionIdentity::default();
        self.publish();

        let mut first_error: Option<ApiError> = None;
        let mut removed = 0usize;

        let explicit_keys = [KEY_AUTH_TOKEN, KEY_USER_ID]
            .into_iter()
            .chain(RESTAURANT_KEYS);
        for key in explicit_keys {
            match self.store.remove(key) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(key, error = %e, "Failed to remove session key");
                    first_error.get_or_insert(e.into());
                }
            }
        }

        match self.store.keys() {
            Ok(keys) => {
                for key in keys.into_iter().filter(|k| is_swept(k)) {
                    match self.store.remove(&key) {
                        Ok(true) => removed += 1,
                        Ok(false) => {}
                        Err(e) => {
                            warn!(key = %key, error = %e, "Failed to sweep session key");
                            first_error.get_or_insert(e.into());
                        }
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to list keys for logout sweep");
                first_error.get_or_insert(e.into());
            }
        }

        if let Some(images) = &self.images {
            if let Err(e) = images.clear().await {
                warn!(error = %e, "Failed to clear image cache on logout");
                first_error.get_or_insert(e.into());
            }
        }

        info!(removed, clean = first_error.is_none(), "Logged out");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn is_swept(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    LOGOUT_SWEEP_FRAGMENTS
        .iter()
        .any(|fragment| key.contains(fragment))
}

fn read_key(store: &dyn KeyValueStore, key: &str) -> Option<String> {
    match store.get(key) {
        Ok(value) => value.filter(|v| !v.trim().is_empty()),
        Err(e) => {
            warn!(key, error = %e, "Failed to read session key");
            None
        }
    }
}

fn load_identity(store: &dyn KeyValueStore) -> SessionIdentity {
    let restaurant = match store.get_json::<RestaurantProfile>(KEY_RESTAURANT_DATA) {
        Ok(profile) => profile.unwrap_or_default(),
        Err(e) => {
            warn!(error = %e, "Ignoring unreadable restaurant snapshot");
            RestaurantProfile::default()
        }
    };

    SessionIdentity {
        user_id: read_key(store, KEY_USER_ID),
        token: read_key(store, KEY_AUTH_TOKEN),
        restaurant_id: read_key(store, KEY_RESTAURANT_ID),
        restaurant,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use bytes::Bytes;
    use qskipper_shared::CacheKey;
    use qskipper_store::{MemoryStore, StoreError};
    use serde_json::json;
    use tempfile::TempDir;

    /// A store the test keeps a handle on after boxing it into the actor.
    #[derive(Clone, Default)]
    pub(crate) struct SharedStore {
        pub inner: Arc<Mutex<MemoryStore>>,
        pub fail_removes: bool,
        /// Writes to this key fail.
        pub fail_set: Option<&'static str>,
    }

    impl SharedStore {
        pub fn get(&self, key: &str) -> Option<String> {
            self.inner.lock().unwrap().get(key).unwrap()
        }

        pub fn set(&self, key: &str, value: &str) {
            self.inner.lock().unwrap().set(key, value).unwrap();
        }
    }

    impl KeyValueStore for SharedStore {
        fn get(&self, key: &str) -> qskipper_store::Result<Option<String>> {
            self.inner.lock().unwrap().get(key)
        }

        fn set(&mut self, key: &str, value: &str) -> qskipper_store::Result<()> {
            if self.fail_set.is_some_and(|k| k == key) {
                return Err(StoreError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "disk full",
                )));
            }
            self.inner.lock().unwrap().set(key, value)
        }

        fn remove(&mut self, key: &str) -> qskipper_store::Result<bool> {
            if self.fail_removes {
                return Err(StoreError::Io(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "read-only store",
                )));
            }
            self.inner.lock().unwrap().remove(key)
        }

        fn keys(&self) -> qskipper_store::Result<Vec<String>> {
            self.inner.lock().unwrap().keys()
        }
    }

    fn login_payload() -> AuthPayload {
        AuthPayload {
            user_id: Some("u1".into()),
            token: Some("tok".into()),
            restaurant_id: Some("r1".into()),
            restaurant: RestaurantProfile {
                name: "Chai Point".into(),
                cuisine: "Indian".into(),
                estimated_time: 20,
            },
            raw: json!({"id": "u1", "restaurantid": "r1"}),
        }
    }

    #[tokio::test]
    async fn rehydrates_persisted_identity() {
        let store = SharedStore::default();
        store.set(KEY_USER_ID, "u9");
        store.set(KEY_RESTAURANT_ID, "r9");
        store.set(
            KEY_RESTAURANT_DATA,
            r#"{"name":"Dosa Hut","cuisine":"South Indian","estimatedTime":"15"}"#,
        );

        let session = spawn_session(Box::new(store), None);
        assert!(session.is_authenticated());
        assert_eq!(session.user_id().as_deref(), Some("u9"));
        assert_eq!(session.token(), None);

        let current = session.current();
        assert_eq!(current.restaurant_id.as_deref(), Some("r9"));
        assert_eq!(current.restaurant.name, "Dosa Hut");
        assert_eq!(current.restaurant.estimated_time, 15);
    }

    #[tokio::test]
    async fn token_alone_is_not_a_session() {
        let store = SharedStore::default();
        store.set(KEY_AUTH_TOKEN, "tok");
        let session = spawn_session(Box::new(store), None);
        assert!(!session.is_authenticated());
        assert_eq!(session.token().as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn establish_persists_identity() {
        let store = SharedStore::default();
        let session = spawn_session(Box::new(store.clone()), None);

        let identity = session.establish(login_payload()).await.unwrap();
        assert!(identity.is_authenticated());
        assert!(session.is_authenticated());
        assert_eq!(store.get(KEY_USER_ID).as_deref(), Some("u1"));
        assert_eq!(store.get(KEY_AUTH_TOKEN).as_deref(), Some("tok"));
        assert_eq!(store.get(KEY_RESTAURANT_ID).as_deref(), Some("r1"));
        assert_eq!(store.get(KEY_IS_RESTAURANT_REGISTERED).as_deref(), Some("true"));
        assert!(store.get(KEY_RESTAURANT_RAW_DATA).is_some());

        // A fresh actor over the same store sees the same identity.
        let again = spawn_session(Box::new(store), None);
        assert_eq!(again.current(), session.current());
    }

    #[tokio::test]
    async fn failed_login_write_leaves_no_half_session() {
        let store = SharedStore::default();
        store.set(KEY_USER_ID, "previous");
        let failing = SharedStore {
            fail_set: Some(KEY_RESTAURANT_DATA),
            ..store.clone()
        };
        let session = spawn_session(Box::new(failing), None);
        assert!(session.is_authenticated());

        assert!(matches!(
            session.establish(login_payload()).await,
            Err(ApiError::Store(_))
        ));
        assert!(!session.is_authenticated());
        assert_eq!(store.get(KEY_USER_ID), None);

        let cold = spawn_session(Box::new(store), None);
        assert!(!cold.is_authenticated());
    }

    #[tokio::test]
    async fn establish_requires_a_user_id() {
        let session = spawn_session(Box::new(SharedStore::default()), None);
        let payload = AuthPayload {
            token: Some("tok".into()),
            ..Default::default()
        };
        assert!(matches!(
            session.establish(payload).await,
            Err(ApiError::Decode(_))
        ));
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn identity_sources_cover_every_tier() {
        let store = SharedStore::default();
        let session = spawn_session(Box::new(store.clone()), None);
        session.establish(login_payload()).await.unwrap();

        let sources = session.identity_sources(Some("explicit")).await.unwrap();
        assert_eq!(sources.explicit.as_deref(), Some("explicit"));
        assert_eq!(sources.persisted.as_deref(), Some("r1"));
        assert_eq!(sources.session_cached.as_deref(), Some("r1"));
        assert_eq!(sources.user_profile.as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn raw_profile_is_the_last_resort() {
        let store = SharedStore::default();
        store.set(KEY_USER_ID, "u1");
        store.set(KEY_RESTAURANT_RAW_DATA, r#"{"user":{"_id":"u1","restaurantId":"r7"}}"#);
        let session = spawn_session(Box::new(store), None);

        let sources = session.identity_sources(None).await.unwrap();
        assert_eq!(sources.persisted, None);
        assert_eq!(sources.session_cached, None);
        assert_eq!(
            session.resolve_restaurant(None).await.unwrap(),
            Resolution::Resolved("r7".into())
        );
        assert_eq!(
            session.resolve_restaurant(Some("r8")).await.unwrap(),
            Resolution::Resolved("r8".into())
        );
    }

    #[tokio::test]
    async fn logout_sweeps_keys_and_images() {
        let dir = TempDir::new().unwrap();
        let images = ImageCache::open(dir.path().join("images"), 1024, 4096)
            .await
            .unwrap();
        let key = CacheKey::for_identity("https://cdn.example.com/banner.jpg");
        images.put(&key, Bytes::from_static(b"img")).await.unwrap();

        let store = SharedStore::default();
        store.set("user_preferences", "{}");
        store.set("lastLoginEmail", "a@b.c");
        store.set("theme", "dark");
        let session = spawn_session(Box::new(store.clone()), Some(images.clone()));
        session.establish(login_payload()).await.unwrap();

        session.logout().await.unwrap();
        assert!(!session.is_authenticated());
        assert_eq!(session.user_id(), None);
        assert_eq!(session.current(), SessionIdentity::default());
        assert_eq!(
            store.inner.lock().unwrap().keys().unwrap(),
            vec!["theme".to_string()]
        );
        assert!(images.get(&key).await.is_none());

        session.logout().await.unwrap();
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn failed_logout_still_clears_authentication() {
        let store = SharedStore::default();
        store.set(KEY_USER_ID, "u1");
        let failing = SharedStore {
            fail_removes: true,
            ..store.clone()
        };
        let session = spawn_session(Box::new(failing), None);
        assert!(session.is_authenticated());

        assert!(matches!(session.logout().await, Err(ApiError::Store(_))));
        assert!(!session.is_authenticated());
        assert_eq!(session.user_id(), None);

        // Retrying fails the same way and leaves the session cleared.
        assert!(session.logout().await.is_err());
        assert!(!session.is_authenticated());
        assert_eq!(session.user_id(), None);
    }

    #[test]
    fn sweep_matches_case_insensitively() {
        assert!(is_swept("UserProfile"));
        assert!(is_swept("qskipper_last_sync"));
        assert!(is_swept("AUTH_STATE"));
        assert!(!is_swept("theme"));
        assert!(!is_swept("onboarding_seen"));
    }
}
