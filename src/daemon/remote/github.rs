use anyhow::Result;
use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT},
    Client, StatusCode,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::utils::secret::Secret;

/// The account the access token belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Identity {
    pub login: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryCreation {
    Created,
    AlreadyExists,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("hosting provider answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("request to the hosting provider failed")]
    Transport(#[from] reqwest::Error),
}

/// Calls the tracker makes against the hosting provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HostingProvider: Send + Sync {
    async fn current_user(&self, token: &Secret) -> Result<Identity, ProviderError>;

    /// Creates a private repository owned by the token's account. An existing repository with
    /// the same name is not an error.
    async fn create_private_repository(
        &self,
        token: &Secret,
        name: &str,
        description: &str,
    ) -> Result<RepositoryCreation, ProviderError>;
}

#[derive(Serialize)]
struct CreateRepository<'a> {
    name: &'a str,
    private: bool,
    description: &'a str,
}

#[derive(Deserialize, Default)]
struct ValidationFailure {
    #[serde(default)]
    errors: Vec<ValidationError>,
}

#[derive(Deserialize)]
struct ValidationError {
    #[serde(default)]
    field: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ValidationFailure {
    fn name_already_exists(&self) -> bool {
        self.errors.iter().any(|e| {
            e.field.as_deref() == Some("name")
                && e.message
                    .as_deref()
                    .is_some_and(|m| m.contains("already exists"))
        })
    }
}

/// [HostingProvider] for the GitHub REST api.
pub struct GithubClient {
    http: Client,
    api_url: String,
}

impl GithubClient {
    pub fn new(api_url: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("codetally/", env!("CARGO_PKG_VERSION"))),
        );
        let http = Client::builder().default_headers(headers).build()?;
        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_owned(),
        })
    }
}

#[async_trait]
impl HostingProvider for GithubClient {
    #[instrument(skip_all)]
    async fn current_user(&self, token: &Secret) -> Result<Identity, ProviderError> {
        let response = self
            .http
            .get(format!("{}/user", self.api_url))
            .bearer_auth(token.expose())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let identity: Identity = response.json().await?;
        debug!("Token belongs to {}", identity.login);
        Ok(identity)
    }

    #[instrument(skip(self, token, description))]
    async fn create_private_repository(
        &self,
        token: &Secret,
        name: &str,
        description: &str,
    ) -> Result<RepositoryCreation, ProviderError> {
        let response = self
            .http
            .post(format!("{}/user/repos", self.api_url))
            .bearer_auth(token.expose())
            .json(&CreateRepository {
                name,
                private: true,
                description,
            })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(RepositoryCreation::Created);
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::UNPROCESSABLE_ENTITY
            && serde_json::from_str::<ValidationFailure>(&body)
                .unwrap_or_default()
                .name_already_exists()
        {
            debug!("Repository {name} already exists");
            return Ok(RepositoryCreation::AlreadyExists);
        }

        Err(ProviderError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use httpmock::{Method::GET, Method::POST, MockServer};
    use serde_json::json;

    use super::{GithubClient, HostingProvider, ProviderError, RepositoryCreation};
    use crate::utils::secret::Secret;

    #[tokio::test]
    async fn current_user_sends_bearer_token() -> Result<()> {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/user")
                    .header("authorization", "Bearer token-1")
                    .header("accept", "application/vnd.github+json");
                then.status(200).json_body(json!({ "login": "octocat", "id": 1 }));
            })
            .await;

        let client = GithubClient::new(&server.base_url())?;
        let identity = client.current_user(&Secret::new("token-1")).await?;

        mock.assert_async().await;
        assert_eq!(identity.login, "octocat");
        Ok(())
    }

    #[tokio::test]
    async fn current_user_rejects_bad_token() -> Result<()> {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/user");
                then.status(401).body("{\"message\":\"Bad credentials\"}");
            })
            .await;

        let client = GithubClient::new(&server.base_url())?;
        let error = client.current_user(&Secret::new("nope")).await.unwrap_err();

        assert!(matches!(error, ProviderError::Status { status: 401, .. }));
        Ok(())
    }

    #[tokio::test]
    async fn create_repository_requests_private_repo() -> Result<()> {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/user/repos").json_body(json!({
                    "name": "code-tracking-stats",
                    "private": true,
                    "description": "Private repo for code tracking"
                }));
                then.status(201).json_body(json!({ "name": "code-tracking-stats" }));
            })
            .await;

        let client = GithubClient::new(&server.base_url())?;
        let created = client
            .create_private_repository(
                &Secret::new("token"),
                "code-tracking-stats",
                "Private repo for code tracking",
            )
            .await?;

        mock.assert_async().await;
        assert_eq!(created, RepositoryCreation::Created);
        Ok(())
    }

    #[tokio::test]
    async fn existing_repository_counts_as_success() -> Result<()> {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/user/repos");
                then.status(422).json_body(json!({
                    "message": "Repository creation failed.",
                    "errors": [{
                        "resource": "Repository",
                        "code": "custom",
                        "field": "name",
                        "message": "name already exists on this account"
                    }]
                }));
            })
            .await;

        let client = GithubClient::new(&server.base_url())?;
        let created = client
            .create_private_repository(&Secret::new("token"), "stats", "")
            .await?;

        assert_eq!(created, RepositoryCreation::AlreadyExists);
        Ok(())
    }

    #[tokio::test]
    async fn other_validation_failures_are_errors() -> Result<()> {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/user/repos");
                then.status(422).json_body(json!({
                    "message": "Repository creation failed.",
                    "errors": [{ "field": "name", "message": "name is too long" }]
                }));
            })
            .await;

        let client = GithubClient::new(&server.base_url())?;
        let error = client
            .create_private_repository(&Secret::new("token"), "stats", "")
            .await
            .unwrap_err();

        assert!(matches!(error, ProviderError::Status { status: 422, .. }));
        Ok(())
    }
}
