// Profile statistics fetched from the relay's HTTP API.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, COOKIE};
use thiserror::Error;
use tracing::debug;

use tictactoe_core::Profile;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("profile request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("profile request returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

/// Something that can produce the local player's profile counters.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn fetch(&self) -> Result<Profile, ProfileError>;
}

/// `GET {http_url}/api/user/profile` with the session cookie.
#[derive(Debug, Clone)]
pub struct ProfileClient {
    client: reqwest::Client,
    url: String,
    session_token: Option<String>,
}

impl ProfileClient {
    pub fn new(http_url: &str, session_token: Option<String>) -> Self {
        ProfileClient {
            client: reqwest::Client::new(),
            url: format!("{}/api/user/profile", http_url.trim_end_matches('/')),
            session_token,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ProfileSource for ProfileClient {
    async fn fetch(&self) -> Result<Profile, ProfileError> {
        let mut request = self
            .client
            .get(&self.url)
            .header(ACCEPT, "application/json");
        if let Some(token) = &self.session_token {
            request = request.header(COOKIE, format!("session={token}"));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProfileError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let profile: Profile = response.json().await?;
        debug!(?profile, "profile fetched");
        Ok(profile)
    }
}
