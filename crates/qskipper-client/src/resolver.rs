//! Restaurant identity resolution.
//!
//! API calls are scoped by a restaurant id that may be known from several
//! partially reliable places. Precedence, first non-blank wins:
//!
//! 1. an id passed explicitly by the caller
//! 2. the persisted `restaurant_id` key
//! 3. the in-memory session's cached restaurant id
//! 4. the restaurant id recorded on the authenticated user's profile

use tracing::debug;

use crate::error::ApiError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentitySources {
    pub explicit: Option<String>,
    pub persisted: Option<String>,
    pub session_cached: Option<String>,
    pub user_profile: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(String),
    Unresolved,
}

impl Resolution {
    pub fn id(&self) -> Option<&str> {
        match self {
            Resolution::Resolved(id) => Some(id),
            Resolution::Unresolved => None,
        }
    }

    /// Writes need an identity; an unresolved one is rejected before any
    /// request is built.
    pub fn require(self) -> Result<String, ApiError> {
        match self {
            Resolution::Resolved(id) => Ok(id),
            Resolution::Unresolved => Err(ApiError::InvalidInput(
                "restaurant id could not be resolved".into(),
            )),
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

pub fn resolve(sources: &IdentitySources) -> Resolution {
    let candidates = [
        ("explicit", &sources.explicit),
        ("persisted", &sources.persisted),
        ("session", &sources.session_cached),
        ("user_profile", &sources.user_profile),
    ];

    for (source, value) in candidates {
        if let Some(id) = non_blank(value) {
            debug!(source, restaurant_id = id, "Resolved restaurant identity");
            return Resolution::Resolved(id.to_string());
        }
    }

    debug!("Restaurant identity unresolved");
    Resolution::Unresolved
}
