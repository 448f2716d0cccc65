// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Session-backed request context and sign-in extractors

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Json, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_sessions::Session;

use crate::i18n::Locale;
use crate::identity::UserIdentity;

/// Session keys
pub mod keys {
    pub const USER: &str = "user";
    pub const LOCALE: &str = "locale";
    pub const OAUTH_STATE: &str = "oauth_state";
    pub const NOTICE: &str = "notice";
}

/// The signed-in user as kept in the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: String,
    pub email: String,
    pub name: String,
    pub picture: Option<String>,
}

impl From<UserIdentity> for CurrentUser {
    fn from(identity: UserIdentity) -> Self {
        Self {
            id: identity.subject,
            email: identity.email,
            name: identity.name,
            picture: identity.picture,
        }
    }
}

/// Who is asking and in which language to answer, built fresh for every request
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user: Option<CurrentUser>,
    pub locale: Locale,
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(session) = parts.extensions.get::<Session>() else {
            return Ok(Self { user: None, locale: Locale::default() });
        };

        let user = session.get::<CurrentUser>(keys::USER).await.ok().flatten();
        let locale = session
            .get::<Locale>(keys::LOCALE)
            .await
            .ok()
            .flatten()
            .unwrap_or_default();

        Ok(Self { user, locale })
    }
}

/// Extractor that requires a signed-in user.
///
/// API routes answer 401; pages redirect to the login screen.
pub struct RequireUser(pub CurrentUser);

pub enum AuthRejection {
    RedirectToLogin,
    Unauthorized,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::RedirectToLogin => Redirect::to("/login").into_response(),
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "success": false, "error": "Not authenticated" })),
            )
                .into_response(),
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequireUser
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let rejection = if parts.uri.path().starts_with("/api/") {
            AuthRejection::Unauthorized
        } else {
            AuthRejection::RedirectToLogin
        };

        let Some(session) = parts.extensions.get::<Session>() else {
            return Err(rejection);
        };

        match session.get::<CurrentUser>(keys::USER).await {
            Ok(Some(user)) => Ok(Self(user)),
            _ => Err(rejection),
        }
    }
}
