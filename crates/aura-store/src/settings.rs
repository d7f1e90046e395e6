//! User settings store (singleton row per user).

use aura_core::crypto::ApiKeyCipher;
use aura_core::error::AuraError;
use aura_core::model::UserSettings;
use aura_core::traits::{Collection, Gateway};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::reconcile::VersionGate;

/// Partial settings update.
#[derive(Debug, Clone, Default)]
pub struct SettingsPatch {
    pub speed_weight: Option<u8>,
    pub importance_weight: Option<u8>,
    pub auto_ranking: Option<bool>,
    pub auto_subtasks: Option<bool>,
    pub auto_tagging: Option<bool>,
    pub theme: Option<String>,
}

pub struct SettingsStore {
    pub(crate) gateway: Arc<dyn Gateway>,
    pub(crate) settings: Option<UserSettings>,
    pub(crate) loading: bool,
    pub(crate) last_error: Option<String>,
    pub(crate) gate: VersionGate,
}

impl SettingsStore {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self {
            gateway,
            settings: None,
            loading: false,
            last_error: None,
            gate: VersionGate::default(),
        }
    }

    pub fn settings(&self) -> Option<&UserSettings> {
        self.settings.as_ref()
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn record_error(&mut self, context: &str, err: &AuraError) {
        warn!("settings: {context}: {err}");
        self.last_error = Some(format!("{context}: {err}"));
    }

    /// Load the user's settings row, creating the defaults row on first use.
    pub async fn load_or_create(&mut self, owner: Option<Uuid>) -> bool {
        let Some(owner) = owner else {
            self.record_error("load settings", &AuraError::Unauthenticated);
            return false;
        };
        self.loading = true;
        let result = self.fetch_or_create(owner).await;
        self.loading = false;
        match result {
            Ok(settings) => {
                self.settings = Some(settings);
                self.last_error = None;
                true
            }
            Err(e) => {
                self.record_error("load settings", &e);
                false
            }
        }
    }

    async fn fetch_or_create(&self, owner: Uuid) -> Result<UserSettings, AuraError> {
        let rows = self.gateway.select(Collection::Settings, owner).await?;
        if let Some(row) = rows.into_iter().next() {
            return Ok(serde_json::from_value(row)?);
        }
        let defaults = UserSettings::for_user(owner);
        let row = serde_json::to_value(&defaults)?;
        self.gateway.insert(Collection::Settings, row).await?;
        Ok(defaults)
    }

    pub async fn update(&mut self, owner: Option<Uuid>, patch: SettingsPatch) -> bool {
        let Some(owner) = owner else {
            self.record_error("update settings", &AuraError::Unauthenticated);
            return false;
        };
        let Some(snapshot) = self.settings.clone().filter(|s| s.user_id == owner) else {
            self.record_error("update settings", &AuraError::Unauthenticated);
            return false;
        };

        let version = self.gate.begin(owner);
        let mut row = serde_json::Map::new();
        if let Some(settings) = self.settings.as_mut() {
            if let Some(v) = patch.speed_weight {
                settings.speed_weight = v;
                row.insert("speed_weight".into(), json!(v));
            }
            if let Some(v) = patch.importance_weight {
                settings.importance_weight = v;
                row.insert("importance_weight".into(), json!(v));
            }
            if let Some(v) = patch.auto_ranking {
                settings.auto_ranking = v;
                row.insert("auto_ranking".into(), json!(v));
            }
            if let Some(v) = patch.auto_subtasks {
                settings.auto_subtasks = v;
                row.insert("auto_subtasks".into(), json!(v));
            }
            if let Some(v) = patch.auto_tagging {
                settings.auto_tagging = v;
                row.insert("auto_tagging".into(), json!(v));
            }
            if let Some(v) = &patch.theme {
                settings.theme = v.clone();
                row.insert("theme".into(), json!(v));
            }
        }

        match self
            .gateway
            .update(Collection::Settings, owner, serde_json::Value::Object(row))
            .await
        {
            Ok(_) => {
                self.gate.settle(owner, version);
                self.last_error = None;
                true
            }
            Err(e) => {
                self.settings = Some(snapshot);
                self.gate.settle(owner, version);
                self.record_error("update settings", &e);
                false
            }
        }
    }

    /// Store (or clear) the user's own AI key, encrypted at rest.
    pub async fn set_api_key(
        &mut self,
        owner: Option<Uuid>,
        plaintext: Option<&str>,
        cipher: &ApiKeyCipher,
    ) -> bool {
        let Some(owner) = owner else {
            self.record_error("set api key", &AuraError::Unauthenticated);
            return false;
        };
        let Some(snapshot) = self.settings.clone().filter(|s| s.user_id == owner) else {
            self.record_error("set api key", &AuraError::Unauthenticated);
            return false;
        };

        let encrypted = match plaintext {
            Some(key) => match cipher.encrypt(key) {
                Ok(blob) => Some(blob),
                Err(e) => {
                    self.record_error("set api key", &e);
                    return false;
                }
            },
            None => None,
        };

        let version = self.gate.begin(owner);
        if let Some(settings) = self.settings.as_mut() {
            settings.ai_api_key = encrypted.clone();
        }

        let patch = json!({ "ai_api_key": encrypted });
        match self.gateway.update(Collection::Settings, owner, patch).await {
            Ok(_) => {
                self.gate.settle(owner, version);
                self.last_error = None;
                true
            }
            Err(e) => {
                self.settings = Some(snapshot);
                self.gate.settle(owner, version);
                self.record_error("set api key", &e);
                false
            }
        }
    }

    /// Decrypt the stored AI key. Fails closed: tampered or undecryptable
    /// ciphertext yields `None`.
    pub fn api_key(&self, cipher: &ApiKeyCipher) -> Option<String> {
        let blob = self.settings.as_ref()?.ai_api_key.as_deref()?;
        match cipher.decrypt(blob) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!("settings: stored api key unreadable: {e}");
                None
            }
        }
    }
}
