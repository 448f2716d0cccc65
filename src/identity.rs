// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Google OAuth2 sign-in

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::IdentityConfig;
use crate::{RaseedError, Result};

/// Who signed in, as reported by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    #[serde(alias = "id")]
    pub subject: String,
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub picture: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Where to send the browser to start sign-in
    fn authorization_url(&self, state: &str) -> Result<String>;

    /// Trade an authorization code for the user's identity
    async fn exchange(&self, code: &str) -> Result<UserIdentity>;
}

/// Random value tying a callback to the session that started sign-in
pub fn new_state() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

pub struct GoogleIdentity {
    client: Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    auth_url: String,
    token_url: String,
    userinfo_url: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct UserInfo {
    #[serde(alias = "id")]
    sub: String,
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

impl GoogleIdentity {
    pub fn new(config: &IdentityConfig) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;

        Ok(Self {
            client,
            client_id: config.client_id.clone().unwrap_or_default(),
            client_secret: config.client_secret.clone().unwrap_or_default(),
            redirect_uri: config.redirect_uri.clone(),
            auth_url: config.auth_url.clone(),
            token_url: config.token_url.clone(),
            userinfo_url: config.userinfo_url.clone(),
        })
    }

    fn ensure_configured(&self) -> Result<()> {
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err(RaseedError::AuthFailure("Google sign-in is not configured".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityProvider for GoogleIdentity {
    fn authorization_url(&self, state: &str) -> Result<String> {
        self.ensure_configured()?;
        let url = Url::parse_with_params(
            &self.auth_url,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", "openid email profile"),
                ("access_type", "online"),
                ("prompt", "select_account"),
                ("state", state),
            ],
        )
        .map_err(|e| RaseedError::Config(format!("Invalid auth URL {}: {}", self.auth_url, e)))?;
        Ok(url.into())
    }

    async fn exchange(&self, code: &str) -> Result<UserIdentity> {
        self.ensure_configured()?;
        let auth_err = |e: reqwest::Error| RaseedError::AuthFailure(e.to_string());

        debug!("Exchanging authorization code");
        let response = self.client
            .post(&self.token_url)
            .form(&[
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(auth_err)?;

        if !response.status().is_success() {
            return Err(RaseedError::AuthFailure(format!(
                "token endpoint returned status {}",
                response.status()
            )));
        }
        let token: TokenResponse = response.json().await.map_err(auth_err)?;

        let response = self.client
            .get(&self.userinfo_url)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(auth_err)?;

        if !response.status().is_success() {
            return Err(RaseedError::AuthFailure(format!(
                "userinfo endpoint returned status {}",
                response.status()
            )));
        }
        let info: UserInfo = response.json().await.map_err(auth_err)?;
        info.into_identity()
    }
}

impl UserInfo {
    fn into_identity(self) -> Result<UserIdentity> {
        let email = self
            .email
            .filter(|e| !e.is_empty())
            .ok_or_else(|| RaseedError::AuthFailure("account has no email address".to_string()))?;

        Ok(UserIdentity {
            subject: self.sub,
            name: self.name.unwrap_or_else(|| email.clone()),
            email,
            picture: self.picture,
        })
    }
}
