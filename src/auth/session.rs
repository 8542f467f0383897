//! Account operations layered on the request pipeline.

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::store::TokenStore;
use crate::http::{ApiClient, RequestOptions, Transport};
use crate::notify::Notifier;
use crate::runtime::Runtime;

pub const LOGIN_ENDPOINT: &str = "/auth/login";
pub const REGISTER_ENDPOINT: &str = "/auth/register";
pub const PROFILE_ENDPOINT: &str = "/auth/profile";
pub const UPDATE_PROFILE_ENDPOINT: &str = "/users/profile";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Patient,
    Physiotherapist,
    Admin,
}

impl std::str::FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "patient" => Ok(Role::Patient),
            "physiotherapist" => Ok(Role::Physiotherapist),
            "admin" => Ok(Role::Admin),
            other => anyhow::bail!(
                "Unknown role '{}', expected patient, physiotherapist or admin",
                other
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterData {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

/// Fields to change on the signed-in user. `None` leaves a field as it is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_picture: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    access_token: String,
    refresh_token: String,
    user: User,
}

/// The signed-in state of one user, backed by the client's token store.
pub struct Session<'a, T: Transport, S: TokenStore, R: Runtime, N: Notifier> {
    client: &'a ApiClient<T, S, R, N>,
}

impl<'a, T: Transport, S: TokenStore, R: Runtime, N: Notifier> Session<'a, T, S, R, N> {
    pub fn new(client: &'a ApiClient<T, S, R, N>) -> Self {
        Self { client }
    }

    pub fn is_authenticated(&self) -> bool {
        self.client.tokens().get().access_token.is_some()
    }

    #[tracing::instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<User> {
        let response = self
            .client
            .post::<AuthResponse, _>(
                LOGIN_ENDPOINT,
                &LoginRequest { email, password },
                RequestOptions::new().with_auth(false),
            )
            .await?;

        self.store(response.data)
    }

    #[tracing::instrument(skip(self, data), fields(email = %data.email))]
    pub async fn register(&self, data: &RegisterData) -> Result<User> {
        let response = self
            .client
            .post::<AuthResponse, _>(
                REGISTER_ENDPOINT,
                data,
                RequestOptions::new().with_auth(false),
            )
            .await?;

        self.store(response.data)
    }

    #[tracing::instrument(skip(self))]
    pub async fn profile(&self) -> Result<User> {
        let response = self
            .client
            .get::<User>(PROFILE_ENDPOINT, RequestOptions::new())
            .await?;
        Ok(response.data)
    }

    /// Sends only the fields set in `changes` and returns the updated user.
    #[tracing::instrument(skip(self))]
    pub async fn update_profile(&self, changes: &ProfileUpdate) -> Result<User> {
        if changes.is_empty() {
            anyhow::bail!("Nothing to update");
        }

        let response = self
            .client
            .put::<User, _>(UPDATE_PROFILE_ENDPOINT, changes, RequestOptions::new())
            .await?;
        info!("Profile updated for {}", response.data.email);
        Ok(response.data)
    }

    #[tracing::instrument(skip(self))]
    pub fn logout(&self) -> Result<()> {
        self.client
            .tokens()
            .clear()
            .context("Failed to clear stored tokens")?;
        info!("Signed out");
        Ok(())
    }

    fn store(&self, auth: AuthResponse) -> Result<User> {
        self.client
            .tokens()
            .set(&auth.access_token, &auth.refresh_token)
            .context("Failed to store tokens")?;
        debug!("Signed in as {}", auth.user.email);
        Ok(auth.user)
    }
}
