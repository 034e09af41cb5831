//! reqwest client for the admin REST API

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::types::{
    AuthSession, ListQuery, LoginRequest, Page, ProfileUpdate, Resource, Role, User,
};
use crate::channel::events::Reading;
use crate::config::ApiConfig;

pub struct ApiClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;

        debug!("API client created for {}", config.base_url);

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, self.url(path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder, what: &str) -> Result<T> {
        let resp = builder
            .send()
            .await
            .with_context(|| format!("failed to send {} request", what))?;
        let resp = check_status(resp, what).await?;
        resp.json::<T>()
            .await
            .with_context(|| format!("failed to decode {} response", what))
    }

    /// Sign in and keep the access token for later requests
    pub async fn login(&mut self, email: &str, password: &str) -> Result<AuthSession> {
        info!("Signing in as {}", email);
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let session: AuthSession = self
            .send(
                self.request(Method::POST, "/auth/login").json(&body),
                "login",
            )
            .await?;
        self.token = Some(session.access_token.clone());
        info!("Signed in as {} ({})", session.user.email, session.user.role);
        Ok(session)
    }

    pub async fn profile(&self) -> Result<User> {
        self.send(self.request(Method::GET, "/auth/profile"), "profile")
            .await
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User> {
        self.send(
            self.request(Method::PATCH, "/users/profile").json(update),
            "profile update",
        )
        .await
    }

    pub async fn roles(&self) -> Result<Vec<Role>> {
        self.send(self.request(Method::GET, "/roles"), "roles").await
    }

    pub async fn list_resources<R: Resource>(&self, query: &ListQuery) -> Result<Page<R>> {
        debug!("Listing {} page {}", R::NAME, query.page);
        self.send(
            self.request(Method::GET, R::PATH).query(&query.to_params()),
            R::NAME,
        )
        .await
    }

    pub async fn get_resource<R: Resource>(&self, id: &str) -> Result<R> {
        self.send(
            self.request(Method::GET, &format!("{}/{}", R::PATH, id)),
            R::NAME,
        )
        .await
    }

    pub async fn create_resource<R: Resource>(&self, draft: &R::Draft) -> Result<R> {
        let created: R = self
            .send(self.request(Method::POST, R::PATH).json(draft), R::NAME)
            .await?;
        info!("Created {} {}", R::NAME, created.id());
        Ok(created)
    }

    pub async fn update_resource<R: Resource>(&self, id: &str, draft: &R::Draft) -> Result<R> {
        let updated: R = self
            .send(
                self.request(Method::PATCH, &format!("{}/{}", R::PATH, id))
                    .json(draft),
                R::NAME,
            )
            .await?;
        info!("Updated {} {}", R::NAME, id);
        Ok(updated)
    }

    pub async fn delete_resource<R: Resource>(&self, id: &str) -> Result<()> {
        let resp = self
            .request(Method::DELETE, &format!("{}/{}", R::PATH, id))
            .send()
            .await
            .with_context(|| format!("failed to send {} delete request", R::NAME))?;
        check_status(resp, R::NAME).await?;
        info!("Deleted {} {}", R::NAME, id);
        Ok(())
    }

    /// Stored readings of one device, newest first
    pub async fn device_readings(&self, device_id: &str, query: &ListQuery) -> Result<Page<Reading>> {
        self.send(
            self.request(Method::GET, &format!("/devices/{}/readings", device_id))
                .query(&query.to_params()),
            "device readings",
        )
        .await
    }
}

async fn check_status(resp: Response, what: &str) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body_text = resp.text().await.unwrap_or_default();
    if status == StatusCode::UNAUTHORIZED {
        anyhow::bail!(
            "{} request was not authorized (status {}): sign in again",
            what,
            status
        );
    }
    anyhow::bail!("{} request failed with status {}: {}", what, status, body_text);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let client = ApiClient::new(&ApiConfig {
            base_url: "https://garden.example.com/api/".to_string(),
            timeout_secs: 5,
        })
        .unwrap();
        assert_eq!(
            client.url("/plant-families"),
            "https://garden.example.com/api/plant-families"
        );
    }

    #[test]
    fn test_empty_token_is_ignored() {
        let client = ApiClient::new(&ApiConfig::default())
            .unwrap()
            .with_token(Some(String::new()));
        assert_eq!(client.token(), None);

        let client = client.with_token(Some("tok-abc".to_string()));
        assert_eq!(client.token(), Some("tok-abc"));
    }
}
