//! Session and user types held by the token store.

use serde::{Deserialize, Serialize};

/// The signed-in user as reported by the auth service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub person_id: Option<String>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

/// Persisted client-side session.
///
/// Everything here is cleared together: there is no state in which a user
/// or organization id survives without the tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Bearer token attached to every outbound request.
    pub access_token: String,
    /// Credential exchanged at `/auth/refresh` when the access token is rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Cached identity from login or `/auth/me`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    /// Cached organization id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    /// Unix timestamp of the last token write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refreshed_at: Option<i64>,
}

impl Session {
    /// Build a session from a login response.
    ///
    /// The organization id is seeded from the user record.
    pub fn new(access_token: String, refresh_token: Option<String>, user: Option<User>) -> Self {
        let organization_id = user.as_ref().and_then(|u| u.organization_id.clone());
        Self {
            access_token,
            refresh_token,
            user,
            organization_id,
            refreshed_at: Some(chrono::Utc::now().timestamp()),
        }
    }

    /// Replace the token pair. A missing rotated refresh token keeps the old one.
    pub fn rotate(&mut self, access_token: String, refresh_token: Option<String>) {
        self.access_token = access_token;
        if let Some(rt) = refresh_token.filter(|rt| !rt.is_empty()) {
            self.refresh_token = Some(rt);
        }
        self.refreshed_at = Some(chrono::Utc::now().timestamp());
    }
}

/// Snapshot of the session for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub authenticated: bool,
    pub username: Option<String>,
    pub organization_id: Option<String>,
    /// Seconds since the tokens were last written, if known.
    pub token_age_secs: Option<u64>,
}

impl SessionStatus {
    pub(crate) fn from_session(session: Option<&Session>) -> Self {
        match session {
            Some(s) => Self {
                authenticated: !s.access_token.is_empty(),
                username: s.user.as_ref().map(|u| u.username.clone()),
                organization_id: s.organization_id.clone(),
                token_age_secs: s.refreshed_at.map(|at| {
                    let now = chrono::Utc::now().timestamp();
                    if now > at { (now - at) as u64 } else { 0 }
                }),
            },
            None => Self {
                authenticated: false,
                username: None,
                organization_id: None,
                token_age_secs: None,
            },
        }
    }
}
