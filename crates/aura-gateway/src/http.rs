//! HTTP gateway.
//!
//! Talks to a PostgREST-style REST surface (`/rest/v1/{table}`) plus the
//! companion auth endpoint. Row-level security on the backend scopes every
//! call to the bearer identity; this client only shapes requests.
//!
//! Committed mutations are echoed into the local change-feed registry so
//! reconcilers observe them. A server-push transport would feed the same
//! registry; the reconciler's dedupe makes double delivery harmless.

use crate::feed::FeedRegistry;
use async_trait::async_trait;
use aura_core::config::GatewayConfig;
use aura_core::error::AuraError;
use aura_core::model::Session;
use aura_core::traits::{ChangeEvent, ChangeKind, Collection, Gateway, Subscription};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    anon_key: String,
    session: Mutex<Option<AuthState>>,
    feeds: FeedRegistry,
}

#[derive(Clone)]
struct AuthState {
    session: Session,
    access_token: String,
}

#[derive(Deserialize)]
struct AuthResponse {
    access_token: String,
    user: AuthUser,
}

#[derive(Deserialize)]
struct AuthUser {
    id: Uuid,
    #[serde(default)]
    is_anonymous: bool,
}

/// Column a collection is scoped by when selecting for an owner.
fn owner_column(collection: Collection) -> Option<&'static str> {
    match collection {
        Collection::Tasks | Collection::Groups | Collection::Tags => Some("owner_id"),
        Collection::Settings | Collection::Profiles => Some("user_id"),
        // Scoped transitively (via parent row) or by backend policy.
        Collection::Subtasks | Collection::TaskTags | Collection::AdminKeys => None,
    }
}

/// Column a collection's rows are addressed by.
fn id_column(collection: Collection) -> &'static str {
    match collection {
        Collection::Settings | Collection::Profiles => "user_id",
        _ => "id",
    }
}

fn select_url(base: &str, collection: Collection, owner: Uuid) -> String {
    let table = collection.table_name();
    match owner_column(collection) {
        Some(column) => format!("{base}/rest/v1/{table}?{column}=eq.{owner}&select=*"),
        None => format!("{base}/rest/v1/{table}?select=*"),
    }
}

fn row_url(base: &str, collection: Collection, id: Uuid) -> String {
    let table = collection.table_name();
    let column = id_column(collection);
    format!("{base}/rest/v1/{table}?{column}=eq.{id}")
}

impl HttpGateway {
    /// Create from config values.
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            session: Mutex::new(None),
            feeds: FeedRegistry::new(),
        }
    }

    fn bearer(&self) -> String {
        self.session
            .lock()
            .expect("lock poisoned")
            .as_ref()
            .map(|s| s.access_token.clone())
            .unwrap_or_else(|| self.anon_key.clone())
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(self.bearer())
    }

    /// Send a mutating request expecting `return=representation`, mapping
    /// an empty representation to `NotFound`.
    async fn send_returning(
        &self,
        builder: reqwest::RequestBuilder,
        collection: Collection,
        context: &str,
    ) -> Result<Value, AuraError> {
        let table = collection.table_name();
        let resp = builder
            .header("Prefer", "return=representation")
            .send()
            .await
            .map_err(|e| AuraError::Gateway(format!("{table} {context} failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(AuraError::NotFound(format!("{table}: {text}")));
            }
            return Err(AuraError::Gateway(format!(
                "{table} {context} returned {status}: {text}"
            )));
        }

        let rows: Vec<Value> = resp
            .json()
            .await
            .map_err(|e| AuraError::Gateway(format!("{table}: failed to parse response: {e}")))?;
        rows.into_iter()
            .next()
            .ok_or_else(|| AuraError::NotFound(format!("{table}: no row matched")))
    }

    fn publish(&self, collection: Collection, row: &Value, kind: ChangeKind) {
        let owner = row
            .get("owner_id")
            .or_else(|| row.get("user_id"))
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok());
        if let Some(owner) = owner {
            self.feeds.publish(
                collection,
                owner,
                ChangeEvent {
                    kind,
                    row: row.clone(),
                },
            );
        }
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn select(&self, collection: Collection, owner: Uuid) -> Result<Vec<Value>, AuraError> {
        let table = collection.table_name();
        let url = select_url(&self.base_url, collection, owner);
        debug!("gateway: GET {table} for {owner}");

        let resp = self
            .request(reqwest::Method::GET, &url)
            .send()
            .await
            .map_err(|e| AuraError::Gateway(format!("{table} select failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(AuraError::Gateway(format!(
                "{table} select returned {status}: {text}"
            )));
        }

        resp.json()
            .await
            .map_err(|e| AuraError::Gateway(format!("{table}: failed to parse rows: {e}")))
    }

    async fn insert(&self, collection: Collection, row: Value) -> Result<Value, AuraError> {
        let table = collection.table_name();
        let url = format!("{}/rest/v1/{table}", self.base_url);
        debug!("gateway: POST {table}");

        let builder = self.request(reqwest::Method::POST, &url).json(&row);
        let stored = self.send_returning(builder, collection, "insert").await?;
        self.publish(collection, &stored, ChangeKind::Insert);
        Ok(stored)
    }

    async fn update(
        &self,
        collection: Collection,
        id: Uuid,
        patch: Value,
    ) -> Result<Value, AuraError> {
        let table = collection.table_name();
        let url = row_url(&self.base_url, collection, id);
        debug!("gateway: PATCH {table} {id}");

        let builder = self.request(reqwest::Method::PATCH, &url).json(&patch);
        let stored = self.send_returning(builder, collection, "update").await?;
        self.publish(collection, &stored, ChangeKind::Update);
        Ok(stored)
    }

    async fn delete(&self, collection: Collection, id: Uuid) -> Result<(), AuraError> {
        let table = collection.table_name();
        let url = row_url(&self.base_url, collection, id);
        debug!("gateway: DELETE {table} {id}");

        let builder = self.request(reqwest::Method::DELETE, &url);
        let removed = self.send_returning(builder, collection, "delete").await?;
        self.publish(collection, &removed, ChangeKind::Delete);
        Ok(())
    }

    fn subscribe(&self, collection: Collection, owner: Uuid) -> Subscription {
        self.feeds.subscribe(collection, owner)
    }

    async fn session(&self) -> Result<Option<Session>, AuraError> {
        Ok(self
            .session
            .lock()
            .expect("lock poisoned")
            .as_ref()
            .map(|s| s.session))
    }

    async fn sign_in_anonymously(&self) -> Result<Session, AuraError> {
        let url = format!("{}/auth/v1/signup", self.base_url);
        debug!("gateway: POST auth/signup (anonymous)");

        let resp = self
            .client
            .post(&url)
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| AuraError::Gateway(format!("anonymous sign-in failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(AuraError::Gateway(format!(
                "anonymous sign-in returned {status}: {text}"
            )));
        }

        let auth: AuthResponse = resp
            .json()
            .await
            .map_err(|e| AuraError::Gateway(format!("failed to parse auth response: {e}")))?;

        let session = Session {
            user_id: auth.user.id,
            anonymous: auth.user.is_anonymous,
        };
        *self.session.lock().expect("lock poisoned") = Some(AuthState {
            session,
            access_token: auth.access_token,
        });
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_url_owner_scoped() {
        let owner = Uuid::new_v4();
        let url = select_url("https://x.example.co", Collection::Tasks, owner);
        assert_eq!(
            url,
            format!("https://x.example.co/rest/v1/tasks?owner_id=eq.{owner}&select=*")
        );
    }

    #[test]
    fn test_select_url_per_user_rows() {
        let owner = Uuid::new_v4();
        let url = select_url("https://x.example.co", Collection::Settings, owner);
        assert!(url.contains("user_settings?user_id=eq."));
    }

    #[test]
    fn test_select_url_unowned() {
        let url = select_url("https://x.example.co", Collection::AdminKeys, Uuid::new_v4());
        assert_eq!(url, "https://x.example.co/rest/v1/admin_api_keys?select=*");
    }

    #[test]
    fn test_row_url_id_column() {
        let id = Uuid::new_v4();
        assert!(row_url("https://x", Collection::Tasks, id).ends_with(&format!("tasks?id=eq.{id}")));
        assert!(row_url("https://x", Collection::Profiles, id)
            .ends_with(&format!("user_profiles?user_id=eq.{id}")));
    }

    #[test]
    fn test_auth_response_parsing() {
        let json = r#"{"access_token":"tok","user":{"id":"8f7f2f9e-55a2-4a3a-9d9a-1f2e3d4c5b6a","is_anonymous":true}}"#;
        let auth: AuthResponse = serde_json::from_str(json).unwrap();
        assert_eq!(auth.access_token, "tok");
        assert!(auth.user.is_anonymous);
    }
}
