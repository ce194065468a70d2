use reqwest::{header, Client as HttpClient, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::plex::PlexServer;
use crate::auth::Credentials;
use crate::error::{AuthFailure, Error, Result};

const PLEX_TV_URL: &str = "https://plex.tv";
const CLIENTS_URL: &str = "https://clients.plex.tv";
pub const PRODUCT: &str = "plex-upgrade";
const MEDIA_SERVER_PRODUCT: &str = "Plex Media Server";
// plex.tv error code for a missing two-factor code
const VERIFICATION_CODE_REQUIRED: u32 = 1029;

/// How this client introduces itself to Plex
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub product: String,
    pub version: String,
    pub device_name: String,
    pub platform: String,
    /// Stable per device, so the account's device list doesn't grow every run
    pub client_identifier: String,
}

impl ClientIdentity {
    pub fn detect() -> Self {
        let device_name = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());
        Self::for_device(&device_name)
    }

    pub fn for_device(device_name: &str) -> Self {
        let hash = blake3::hash(format!("{}:{}", PRODUCT, device_name).as_bytes());
        Self {
            product: PRODUCT.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            device_name: device_name.to_string(),
            platform: std::env::consts::OS.to_string(),
            client_identifier: hash.to_hex().as_str()[..32].to_string(),
        }
    }

    pub(crate) fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(header::ACCEPT, "application/json")
            .header("X-Plex-Product", &self.product)
            .header("X-Plex-Version", &self.version)
            .header("X-Plex-Device-Name", &self.device_name)
            .header("X-Plex-Platform", &self.platform)
            .header("X-Plex-Client-Identifier", &self.client_identifier)
    }
}

pub(crate) fn http_client(timeout: Duration) -> Result<HttpClient> {
    Ok(HttpClient::builder().timeout(timeout).build()?)
}

/// A connection endpoint of a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub uri: String,
    #[serde(default)]
    pub local: bool,
    #[serde(default)]
    pub relay: bool,
}

/// A device registered to the account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub name: String,
    #[serde(default)]
    pub product: String,
    pub client_identifier: String,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

impl Resource {
    pub fn is_media_server(&self) -> bool {
        self.product == MEDIA_SERVER_PRODUCT
    }

    /// Local connections first, relayed ones last
    pub fn preferred_connections(&self) -> Vec<&Connection> {
        let mut connections: Vec<&Connection> = self.connections.iter().collect();
        connections.sort_by_key(|c| (c.relay, !c.local));
        connections
    }
}

/// Only media servers can host playlists
pub fn media_servers(resources: Vec<Resource>) -> Vec<Resource> {
    resources.into_iter().filter(Resource::is_media_server).collect()
}

pub fn find_resource<'a>(resources: &'a [Resource], name: &str) -> Result<&'a Resource> {
    resources
        .iter()
        .find(|r| r.name == name)
        .ok_or_else(|| Error::ResourceNotFound(name.to_string()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserResponse {
    username: Option<String>,
    auth_token: String,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorsResponse {
    #[serde(default)]
    errors: Vec<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: Option<u32>,
    message: Option<String>,
}

/// Classify a refused login
fn auth_failure(status: StatusCode, body: &str, token_login: bool) -> AuthFailure {
    let parsed: ErrorsResponse = serde_json::from_str(body).unwrap_or_default();

    if parsed
        .errors
        .iter()
        .any(|e| e.code == Some(VERIFICATION_CODE_REQUIRED))
    {
        return AuthFailure::VerificationCodeRequired;
    }

    if status == StatusCode::UNAUTHORIZED {
        return if token_login {
            AuthFailure::InvalidToken
        } else {
            AuthFailure::InvalidCredentials
        };
    }

    let message = parsed
        .errors
        .into_iter()
        .find_map(|e| e.message)
        .unwrap_or_else(|| format!("plex.tv returned {}", status));
    AuthFailure::Rejected(message)
}

/// A signed-in plex.tv account
#[derive(Debug, Clone)]
pub struct PlexAccount {
    http_client: HttpClient,
    identity: ClientIdentity,
    timeout: Duration,
    token: String,
    username: Option<String>,
}

impl PlexAccount {
    pub async fn sign_in(
        credentials: &Credentials,
        identity: ClientIdentity,
        timeout: Duration,
    ) -> Result<Self> {
        let http_client = http_client(timeout)?;

        let (request, token_login) = match credentials {
            Credentials::Token(token) => (
                http_client
                    .get(format!("{}/api/v2/user", PLEX_TV_URL))
                    .header("X-Plex-Token", token),
                true,
            ),
            Credentials::Password {
                username,
                password,
                verification_code,
            } => {
                let mut form = vec![
                    ("login", username.as_str()),
                    ("password", password.as_str()),
                    ("rememberMe", "true"),
                ];
                if let Some(code) = verification_code {
                    form.push(("verificationCode", code.as_str()));
                }
                (
                    http_client
                        .post(format!("{}/api/v2/users/signin", PLEX_TV_URL))
                        .form(&form),
                    false,
                )
            }
        };

        let response = identity.apply(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Auth(auth_failure(status, &body, token_login)));
        }

        let user: UserResponse = response.json().await?;
        tracing::info!(
            "Signed in as {}",
            user.username.as_deref().unwrap_or("<unknown>")
        );

        Ok(Self {
            http_client,
            identity,
            timeout,
            token: user.auth_token,
            username: user.username,
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    /// Every device registered to the account
    pub async fn resources(&self) -> Result<Vec<Resource>> {
        let request = self
            .http_client
            .get(format!("{}/api/v2/resources", CLIENTS_URL))
            .header("X-Plex-Token", &self.token)
            .query(&[("includeHttps", "1"), ("includeRelay", "1")]);

        let response = self.identity.apply(request).send().await?;
        match response.status() {
            status if status.is_success() => Ok(response.json().await?),
            StatusCode::UNAUTHORIZED => Err(Error::Auth(AuthFailure::InvalidToken)),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(Error::Other(anyhow::anyhow!(
                    "Failed to list resources: {} - {}",
                    status,
                    body
                )))
            }
        }
    }

    /// Connect to a server resource, trying its connections in order of preference
    pub async fn connect(&self, resource: &Resource) -> Result<PlexServer> {
        let token = resource.access_token.as_deref().unwrap_or(&self.token);

        for connection in resource.preferred_connections() {
            match PlexServer::connect(&connection.uri, token, self.identity.clone(), self.timeout)
                .await
            {
                Ok(server) => {
                    tracing::info!("Connected to {} via {}", resource.name, connection.uri);
                    return Ok(server);
                }
                Err(e) => {
                    tracing::debug!("Connection {} failed: {}", connection.uri, e);
                }
            }
        }

        Err(Error::ResourceNotFound(format!(
            "{} is not reachable on any of its {} connections",
            resource.name,
            resource.connections.len()
        )))
    }
}
