//! Typed Rust client for the Cloud Firestore v1 REST API.
//!
//! Covers the subset needed for a small document model:
//! documents (get, patch with update mask, create) and structured queries.
//!
//! Authenticates with a service-account key (RS256 JWT bearer grant), or
//! talks to a local emulator without credentials.

mod types;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use tokio::sync::Mutex;

pub use types::*;
use types::{TokenClaims, TokenResponse};

const BASE_URL: &str = "https://firestore.googleapis.com/v1";
const DATASTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";
const TOKEN_LIFETIME_SECS: i64 = 3600;
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("firestore api request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("firestore api {endpoint} returned {status}: {body}")]
    Api {
        endpoint: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("invalid service account credentials: {0}")]
    Credentials(String),

    #[error("failed to sign token assertion: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("invalid document id {0:?}")]
    InvalidDocumentId(String),

    #[error("invalid base url: {0}")]
    BaseUrl(String),
}

impl Error {
    /// True when the API reported that the target document does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status, .. } if *status == reqwest::StatusCode::NOT_FOUND)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl ServiceAccountKey {
    /// Read a service-account JSON key file.
    pub fn from_file(path: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Credentials(format!("{path}: {e}")))?;
        serde_json::from_str(&raw).map_err(|e| Error::Credentials(format!("{path}: {e}")))
    }
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

enum Auth {
    ServiceAccount {
        key: ServiceAccountKey,
        cached: Mutex<Option<CachedToken>>,
    },
    Emulator,
}

/// Client for the Firestore REST API, scoped to one database.
#[derive(Clone)]
pub struct FirestoreClient {
    base_url: String,
    database: String,
    auth: Arc<Auth>,
    http: reqwest::Client,
}

impl FirestoreClient {
    /// Authenticate with a service-account key. `project_id` defaults to the
    /// key's own project.
    pub fn with_service_account(key: ServiceAccountKey, project_id: Option<String>) -> Self {
        let project = project_id.unwrap_or_else(|| key.project_id.clone());
        Self {
            base_url: BASE_URL.into(),
            database: format!("projects/{project}/databases/(default)"),
            auth: Arc::new(Auth::ServiceAccount {
                key,
                cached: Mutex::new(None),
            }),
            http: reqwest::Client::new(),
        }
    }

    /// Talk to a local emulator at `host` (e.g. `localhost:8080`).
    pub fn emulator(host: &str, project_id: impl Into<String>) -> Self {
        Self {
            base_url: format!("http://{host}/v1"),
            database: format!("projects/{}/databases/(default)", project_id.into()),
            auth: Arc::new(Auth::Emulator),
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}/documents{path}", self.base_url, self.database)
    }

    /// URL of `collection` or of one document in it. Each segment is
    /// percent-encoded, so an id can never leave its collection.
    fn document_url(&self, collection: &str, id: Option<&str>) -> Result<reqwest::Url> {
        let mut segments = vec![collection];
        segments.extend(id);
        if let Some(bad) = segments.iter().find(|s| !is_valid_id(s)) {
            return Err(Error::InvalidDocumentId(bad.to_string()));
        }

        let mut url = reqwest::Url::parse(&self.url(""))
            .map_err(|e| Error::BaseUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| Error::BaseUrl(self.base_url.clone()))?
            .extend(segments);
        Ok(url)
    }

    async fn auth(&self) -> Result<String> {
        match &*self.auth {
            Auth::Emulator => Ok("Bearer owner".into()),
            Auth::ServiceAccount { key, cached } => {
                let mut cached = cached.lock().await;
                if let Some(token) = cached.as_ref()
                    && token.expires_at > Instant::now() + TOKEN_REFRESH_MARGIN
                {
                    return Ok(format!("Bearer {}", token.token));
                }

                let fresh = self.fetch_access_token(key).await?;
                let header = format!("Bearer {}", fresh.token);
                *cached = Some(fresh);
                Ok(header)
            }
        }
    }

    async fn fetch_access_token(&self, key: &ServiceAccountKey) -> Result<CachedToken> {
        let now = chrono::Utc::now().timestamp();
        let claims = TokenClaims {
            iss: &key.client_email,
            scope: DATASTORE_SCOPE,
            aud: &key.token_uri,
            iat: now,
            exp: now + TOKEN_LIFETIME_SECS,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = key.private_key_id.clone();
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())?;
        let assertion = jsonwebtoken::encode(&header, &claims, &signing_key)?;

        let resp = self
            .http
            .post(&key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;

        let token: TokenResponse = Self::check(resp, "token exchange").await?.json().await?;
        tracing::debug!(expires_in = token.expires_in, "firestore: access token refreshed");

        Ok(CachedToken {
            token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        })
    }

    async fn check(resp: reqwest::Response, endpoint: &'static str) -> Result<reqwest::Response> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Api {
                endpoint,
                status,
                body,
            });
        }
        Ok(resp)
    }

    // ── Documents ───────────────────────────────────────────────────

    /// Fetch a document, returning `None` if it does not exist.
    pub async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let resp = self
            .http
            .get(self.document_url(collection, Some(id))?)
            .header("Authorization", self.auth().await?)
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        Self::check(resp, "get document")
            .await?
            .json()
            .await
            .map(Some)
            .map_err(Error::from)
    }

    /// Patch the fields named in `mask`. Masked fields missing from `fields`
    /// are deleted. With `require_exists` the call fails with 404 instead of
    /// creating the document.
    pub async fn patch_document(
        &self,
        collection: &str,
        id: &str,
        fields: HashMap<String, Value>,
        mask: &[String],
        require_exists: bool,
    ) -> Result<Document> {
        let mut query: Vec<(&str, &str)> = mask
            .iter()
            .map(|path| ("updateMask.fieldPaths", path.as_str()))
            .collect();
        if require_exists {
            query.push(("currentDocument.exists", "true"));
        }

        let resp = self
            .http
            .patch(self.document_url(collection, Some(id))?)
            .header("Authorization", self.auth().await?)
            .query(&query)
            .json(&WriteFields { fields })
            .send()
            .await?;

        Self::check(resp, "patch document")
            .await?
            .json()
            .await
            .map_err(Error::from)
    }

    /// Create a document with a server-assigned id.
    pub async fn create_document(
        &self,
        collection: &str,
        fields: HashMap<String, Value>,
    ) -> Result<Document> {
        let resp = self
            .http
            .post(self.document_url(collection, None)?)
            .header("Authorization", self.auth().await?)
            .json(&WriteFields { fields })
            .send()
            .await?;

        Self::check(resp, "create document")
            .await?
            .json()
            .await
            .map_err(Error::from)
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// Run a structured query and return the matching documents in order.
    pub async fn run_query(&self, query: StructuredQuery) -> Result<Vec<Document>> {
        let resp = self
            .http
            .post(format!("{}/{}/documents:runQuery", self.base_url, self.database))
            .header("Authorization", self.auth().await?)
            .json(&RunQueryRequest {
                structured_query: query,
            })
            .send()
            .await?;

        let results: Vec<RunQueryResponse> =
            Self::check(resp, "run query").await?.json().await?;

        Ok(results.into_iter().filter_map(|r| r.document).collect())
    }
}

/// Firestore rejects ids that are empty, are `.` or `..`, or contain `/`.
fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && id != "." && id != ".." && !id.contains('/')
}
