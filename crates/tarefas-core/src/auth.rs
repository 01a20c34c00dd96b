use parking_lot::Mutex;
use tarefas_shared::{Credentials, Registration, TokenResponse, User};
use tracing::{info, instrument, warn};

use crate::error::{Error, Result};
use crate::transport::{ApiClient, Body, Method};

pub struct AuthService {
    api: ApiClient,
    current: Mutex<Option<User>>,
}

impl AuthService {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            current: Mutex::new(None),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.api.tokens().load().is_some()
    }

    /// Last profile fetched during this session.
    pub fn current_user(&self) -> Option<User> {
        self.current.lock().clone()
    }

    /// Exchanges credentials for a token, stores it, and loads the profile.
    /// Any failure leaves no token behind.
    #[instrument(skip(self, credentials), fields(username = %credentials.username))]
    pub async fn login(&self, credentials: &Credentials) -> Result<User> {
        validate_credentials(&credentials.username, &credentials.password)?;

        match self.try_login(credentials).await {
            Ok(user) => {
                info!(username = %user.username, "logged in");
                Ok(user)
            }
            Err(err) => {
                warn!(error = %err, "login failed");
                self.api.tokens().clear();
                *self.current.lock() = None;
                Err(err)
            }
        }
    }

    async fn try_login(&self, credentials: &Credentials) -> Result<User> {
        let form = Body::Form(vec![
            ("username".to_string(), credentials.username.clone()),
            ("password".to_string(), credentials.password.clone()),
        ]);
        let token: TokenResponse = self.api.call_as("/token", Method::Post, Some(form), true).await?;
        if token.access_token.is_empty() {
            return Err(Error::Decode("server returned no access token".to_string()));
        }
        self.api.tokens().save(&token.access_token)?;

        self.fetch_current_user()
            .await?
            .ok_or(Error::Unauthenticated)
    }

    /// Creates the account, then logs in with the same credentials.
    #[instrument(skip(self, registration), fields(username = %registration.username))]
    pub async fn register(&self, registration: &Registration) -> Result<User> {
        validate_credentials(&registration.username, &registration.password)?;
        if registration.name.trim().is_empty() {
            return Err(Error::Validation("name cannot be empty".to_string()));
        }

        self.api
            .call("/register", Method::Post, Some(Body::json(registration)?), true)
            .await?;

        self.login(&Credentials {
            username: registration.username.clone(),
            password: registration.password.clone(),
        })
        .await
    }

    /// Ends the session. The local token is dropped even when the server
    /// cannot be told.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        if self.is_authenticated()
            && let Err(err) = self.api.call("/logout", Method::Post, None, false).await
        {
            warn!(error = %err, "server-side logout failed; clearing local session anyway");
        }
        self.api.tokens().clear();
        *self.current.lock() = None;
        info!("logged out");
    }

    /// `Ok(None)` when no token is stored.
    pub async fn fetch_current_user(&self) -> Result<Option<User>> {
        if !self.is_authenticated() {
            return Ok(None);
        }
        let user: User = self.api.call_as("/users/me", Method::Get, None, false).await?;
        *self.current.lock() = Some(user.clone());
        Ok(Some(user))
    }
}

fn validate_credentials(username: &str, password: &str) -> Result<()> {
    if username.trim().is_empty() {
        return Err(Error::Validation("username cannot be empty".to_string()));
    }
    if password.is_empty() {
        return Err(Error::Validation("password cannot be empty".to_string()));
    }
    Ok(())
}

/// Checks the password confirmation typed at registration.
pub fn confirm_password(password: &str, confirmation: &str) -> Result<()> {
    if password != confirmation {
        return Err(Error::Validation("passwords do not match".to_string()));
    }
    Ok(())
}
