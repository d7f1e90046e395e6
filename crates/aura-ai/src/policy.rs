//! Key fallback policy.
//!
//! AI calls are paid for by an API key: the user's own key when configured,
//! otherwise a shared pool of admin keys tried in shuffled order. Failures
//! are classified by message: key failures (invalid key, quota, permission,
//! transport) fall through to the next key; content failures (safety
//! filters, malformed output) are attributable to the request itself and
//! end the chain immediately with a deterministic default.

use crate::parse;
use aura_core::model::AdminApiKey;
use aura_core::traits::{Collection, Gateway, TextGenerator};
use chrono::Utc;
use rand::seq::SliceRandom;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Emoji used when no AI suggestion is available.
const FALLBACK_EMOJI: &str = "📝";

/// How a key-bearing attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiFailure {
    /// The key is at fault; the next key may still work.
    Key,
    /// The content is at fault; retrying with another key cannot help.
    Content,
}

/// Classify a provider error message by substring. Transport failures are
/// tagged `request failed` by the generator and count as key failures so
/// an unreachable service still exercises the fallback chain.
pub fn classify(message: &str) -> AiFailure {
    const KEY_PATTERNS: [&str; 4] = [
        "API key not valid",
        "quota",
        "permission denied",
        "request failed",
    ];
    if KEY_PATTERNS.iter().any(|p| message.contains(p)) {
        AiFailure::Key
    } else {
        AiFailure::Content
    }
}

/// Why a default value was returned instead of an AI result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// No user key and no active admin keys exist at all.
    NoKeys,
    /// Keys exist but every attempt failed.
    Exhausted,
    /// A content failure ended the chain.
    ContentBlocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Ai,
    Fallback(FallbackReason),
}

#[derive(Debug, Clone)]
pub struct PolicyResult<T> {
    pub value: T,
    pub source: Source,
}

/// AI-derived scores and suggested subtasks for one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRanking {
    pub speed_score: u8,
    pub importance_score: u8,
    pub subtasks: Vec<String>,
}

#[derive(Deserialize)]
struct RawRanking {
    speed_score: i64,
    importance_score: i64,
    #[serde(default)]
    subtasks: Vec<String>,
}

enum Attempt {
    Success(String),
    ContentBlocked,
    NoKeys,
    Exhausted,
}

pub struct KeyPolicy {
    gateway: Arc<dyn Gateway>,
    generator: Arc<dyn TextGenerator>,
    model: String,
}

impl KeyPolicy {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        generator: Arc<dyn TextGenerator>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            generator,
            model: model.into(),
        }
    }

    /// Score a task 1-20 on speed and importance and suggest subtasks.
    /// `weights` are the user's configured speed/importance percentages,
    /// used for the deterministic default.
    pub async fn rank_task(
        &self,
        user_id: Uuid,
        user_key: Option<&str>,
        title: &str,
        description: Option<&str>,
        weights: (u8, u8),
    ) -> PolicyResult<TaskRanking> {
        let default = TaskRanking {
            speed_score: parse::weight_to_score(weights.0),
            importance_score: parse::weight_to_score(weights.1),
            subtasks: Vec::new(),
        };
        let prompt = ranking_prompt(title, description);

        match self.generate_with_fallback(user_id, user_key, &prompt).await {
            Attempt::Success(text) => match parse_ranking(&text) {
                Some(ranking) => PolicyResult {
                    value: ranking,
                    source: Source::Ai,
                },
                None => {
                    warn!("ranking response had no usable JSON");
                    PolicyResult {
                        value: default,
                        source: Source::Fallback(FallbackReason::ContentBlocked),
                    }
                }
            },
            Attempt::ContentBlocked => PolicyResult {
                value: default,
                source: Source::Fallback(FallbackReason::ContentBlocked),
            },
            Attempt::NoKeys => PolicyResult {
                value: default,
                source: Source::Fallback(FallbackReason::NoKeys),
            },
            Attempt::Exhausted => PolicyResult {
                value: default,
                source: Source::Fallback(FallbackReason::Exhausted),
            },
        }
    }

    /// Suggest a single emoji for a group or task name.
    pub async fn suggest_emoji(
        &self,
        user_id: Uuid,
        user_key: Option<&str>,
        name: &str,
    ) -> PolicyResult<String> {
        let prompt = format!(
            "Suggest one emoji that best represents \"{name}\". \
             Reply with the emoji only, no other text."
        );

        match self.generate_with_fallback(user_id, user_key, &prompt).await {
            Attempt::Success(text) => match parse::extract_emoji(&text) {
                Some(emoji) => PolicyResult {
                    value: emoji,
                    source: Source::Ai,
                },
                None => {
                    warn!("emoji response had no glyph");
                    PolicyResult {
                        value: FALLBACK_EMOJI.to_string(),
                        source: Source::Fallback(FallbackReason::ContentBlocked),
                    }
                }
            },
            Attempt::ContentBlocked => PolicyResult {
                value: FALLBACK_EMOJI.to_string(),
                source: Source::Fallback(FallbackReason::ContentBlocked),
            },
            Attempt::NoKeys => PolicyResult {
                value: FALLBACK_EMOJI.to_string(),
                source: Source::Fallback(FallbackReason::NoKeys),
            },
            Attempt::Exhausted => PolicyResult {
                value: FALLBACK_EMOJI.to_string(),
                source: Source::Fallback(FallbackReason::Exhausted),
            },
        }
    }

    /// Run the fallback chain: user key, then each active admin key in
    /// shuffled order. A content failure ends the chain before the pool is
    /// even fetched when it happens on the user's key.
    async fn generate_with_fallback(
        &self,
        user_id: Uuid,
        user_key: Option<&str>,
        prompt: &str,
    ) -> Attempt {
        let mut attempted = false;

        if let Some(key) = user_key {
            attempted = true;
            match self.generator.generate(prompt, &self.model, key).await {
                Ok(text) => return Attempt::Success(text),
                Err(e) => match classify(&e.to_string()) {
                    AiFailure::Key => {
                        debug!("user key failed, falling back to admin pool: {e}")
                    }
                    AiFailure::Content => {
                        warn!("content failure on user key, not retrying: {e}");
                        return Attempt::ContentBlocked;
                    }
                },
            }
        }

        let mut pool = self.active_admin_keys(user_id).await;
        pool.shuffle(&mut rand::thread_rng());

        for admin in pool {
            attempted = true;
            match self.generator.generate(prompt, &self.model, &admin.key).await {
                Ok(text) => {
                    self.touch_key(admin.id);
                    return Attempt::Success(text);
                }
                Err(e) => match classify(&e.to_string()) {
                    AiFailure::Key => debug!("admin key {} failed: {e}", admin.id),
                    AiFailure::Content => {
                        warn!("content failure on admin key, not retrying: {e}");
                        return Attempt::ContentBlocked;
                    }
                },
            }
        }

        if attempted {
            Attempt::Exhausted
        } else {
            Attempt::NoKeys
        }
    }

    async fn active_admin_keys(&self, user_id: Uuid) -> Vec<AdminApiKey> {
        let rows = match self.gateway.select(Collection::AdminKeys, user_id).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!("failed to fetch admin key pool: {e}");
                return Vec::new();
            }
        };
        rows.into_iter()
            .filter_map(|row| match serde_json::from_value::<AdminApiKey>(row) {
                Ok(key) => Some(key),
                Err(e) => {
                    warn!("skipping malformed admin key row: {e}");
                    None
                }
            })
            .filter(|key| key.is_active)
            .collect()
    }

    /// Record that an admin key was used. Fire-and-forget: the ranking
    /// result must not wait on, or fail with, this bookkeeping write.
    fn touch_key(&self, id: Uuid) {
        let gateway = self.gateway.clone();
        tokio::spawn(async move {
            let patch = json!({ "last_used_at": Utc::now() });
            if let Err(e) = gateway.update(Collection::AdminKeys, id, patch).await {
                warn!("failed to record admin key use: {e}");
            }
        });
    }
}

fn ranking_prompt(title: &str, description: Option<&str>) -> String {
    let mut prompt = format!(
        "Rate the following task on two 1-20 scales: speed_score (how \
         quickly it can be done; higher = faster) and importance_score. \
         Then propose up to four concrete subtasks.\n\nTask: {title}"
    );
    if let Some(description) = description {
        prompt.push_str(&format!("\nDescription: {description}"));
    }
    prompt.push_str(
        "\n\nReply with strict JSON only: \
         {\"speed_score\": n, \"importance_score\": n, \"subtasks\": [\"...\"]}",
    );
    prompt
}

fn parse_ranking(text: &str) -> Option<TaskRanking> {
    let json = parse::extract_json_object(text)?;
    let raw: RawRanking = serde_json::from_str(json).ok()?;
    Some(TaskRanking {
        speed_score: parse::clamp_score(raw.speed_score),
        importance_score: parse::clamp_score(raw.importance_score),
        subtasks: raw.subtasks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use aura_core::error::AuraError;
    use aura_gateway::MemoryGateway;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Generator scripted per api key: each key maps to a fixed outcome,
    /// and every attempt is recorded.
    struct ScriptedGenerator {
        outcomes: HashMap<String, Result<String, String>>,
        attempts: Mutex<Vec<String>>,
    }

    impl ScriptedGenerator {
        fn new(outcomes: Vec<(&str, Result<&str, &str>)>) -> Self {
            Self {
                outcomes: outcomes
                    .into_iter()
                    .map(|(k, v)| {
                        (
                            k.to_string(),
                            v.map(str::to_string).map_err(str::to_string),
                        )
                    })
                    .collect(),
                attempts: Mutex::new(Vec::new()),
            }
        }

        fn attempts(&self) -> Vec<String> {
            self.attempts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(
            &self,
            _prompt: &str,
            _model: &str,
            api_key: &str,
        ) -> Result<String, AuraError> {
            self.attempts.lock().unwrap().push(api_key.to_string());
            match self.outcomes.get(api_key) {
                Some(Ok(text)) => Ok(text.clone()),
                Some(Err(message)) => Err(AuraError::Provider(message.clone())),
                None => Err(AuraError::Provider("API key not valid".to_string())),
            }
        }
    }

    fn admin_key_row(id: Uuid, key: &str, active: bool) -> serde_json::Value {
        json!({ "id": id, "key": key, "is_active": active })
    }

    fn policy(
        gateway: Arc<MemoryGateway>,
        generator: Arc<ScriptedGenerator>,
    ) -> KeyPolicy {
        KeyPolicy::new(gateway, generator, "gemini-2.0-flash")
    }

    async fn wait_for_touch(gateway: &MemoryGateway) -> usize {
        for _ in 0..100 {
            tokio::task::yield_now().await;
            let touched = gateway
                .rows(Collection::AdminKeys)
                .iter()
                .filter(|row| row.get("last_used_at").is_some())
                .count();
            if touched > 0 {
                return touched;
            }
        }
        0
    }

    const RANKING_JSON: &str =
        r#"{"speed_score": 14, "importance_score": 9, "subtasks": ["outline", "draft"]}"#;

    #[test]
    fn test_classify() {
        assert_eq!(classify("API key not valid. Please pass a valid key."), AiFailure::Key);
        assert_eq!(classify("Resource exhausted: quota exceeded"), AiFailure::Key);
        assert_eq!(classify("permission denied for model"), AiFailure::Key);
        assert_eq!(classify("gemini request failed: connection refused"), AiFailure::Key);
        assert_eq!(classify("Blocked for SAFETY reasons"), AiFailure::Content);
        assert_eq!(classify("something unrecognized"), AiFailure::Content);
    }

    #[tokio::test]
    async fn test_user_key_success_skips_pool() {
        let gateway = Arc::new(MemoryGateway::new());
        gateway.seed(
            Collection::AdminKeys,
            vec![admin_key_row(Uuid::new_v4(), "admin-1", true)],
        );
        let generator = Arc::new(ScriptedGenerator::new(vec![("user-key", Ok(RANKING_JSON))]));
        let policy = policy(gateway.clone(), generator.clone());

        let result = policy
            .rank_task(Uuid::new_v4(), Some("user-key"), "Write report", None, (50, 50))
            .await;

        assert_eq!(result.source, Source::Ai);
        assert_eq!(result.value.speed_score, 14);
        assert_eq!(result.value.subtasks, vec!["outline", "draft"]);
        assert_eq!(generator.attempts(), vec!["user-key"]);
    }

    #[tokio::test]
    async fn test_bad_user_key_falls_back_to_admin_and_touches_once() {
        let gateway = Arc::new(MemoryGateway::new());
        let admin_id = Uuid::new_v4();
        gateway.seed(
            Collection::AdminKeys,
            vec![admin_key_row(admin_id, "admin-1", true)],
        );
        let generator = Arc::new(ScriptedGenerator::new(vec![
            ("user-key", Err("API key not valid")),
            ("admin-1", Ok(RANKING_JSON)),
        ]));
        let policy = policy(gateway.clone(), generator.clone());

        let result = policy
            .rank_task(Uuid::new_v4(), Some("user-key"), "Write report", None, (50, 50))
            .await;

        assert_eq!(result.source, Source::Ai);
        assert_eq!(generator.attempts(), vec!["user-key", "admin-1"]);
        assert_eq!(wait_for_touch(&gateway).await, 1);
    }

    #[tokio::test]
    async fn test_safety_failure_short_circuits_to_default() {
        let gateway = Arc::new(MemoryGateway::new());
        gateway.seed(
            Collection::AdminKeys,
            vec![admin_key_row(Uuid::new_v4(), "admin-1", true)],
        );
        let generator = Arc::new(ScriptedGenerator::new(vec![(
            "user-key",
            Err("Candidate was blocked due to SAFETY"),
        )]));
        let policy = policy(gateway.clone(), generator.clone());

        let result = policy
            .rank_task(Uuid::new_v4(), Some("user-key"), "Write report", None, (60, 40))
            .await;

        assert_eq!(result.source, Source::Fallback(FallbackReason::ContentBlocked));
        // Weight-derived defaults, empty subtasks.
        assert_eq!(result.value.speed_score, 12);
        assert_eq!(result.value.importance_score, 8);
        assert!(result.value.subtasks.is_empty());
        // The pool was never tried and never touched.
        assert_eq!(generator.attempts(), vec!["user-key"]);
        assert_eq!(wait_for_touch(&gateway).await, 0);
    }

    #[tokio::test]
    async fn test_no_keys_at_all() {
        let gateway = Arc::new(MemoryGateway::new());
        let generator = Arc::new(ScriptedGenerator::new(vec![]));
        let policy = policy(gateway.clone(), generator.clone());

        let result = policy
            .rank_task(Uuid::new_v4(), None, "Write report", None, (50, 50))
            .await;

        assert_eq!(result.source, Source::Fallback(FallbackReason::NoKeys));
        assert_eq!(result.value.speed_score, 10);
        assert!(generator.attempts().is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_pool_is_distinct_from_no_keys() {
        let gateway = Arc::new(MemoryGateway::new());
        gateway.seed(
            Collection::AdminKeys,
            vec![
                admin_key_row(Uuid::new_v4(), "admin-1", true),
                admin_key_row(Uuid::new_v4(), "admin-2", true),
            ],
        );
        // Every key fails with a key failure.
        let generator = Arc::new(ScriptedGenerator::new(vec![
            ("admin-1", Err("quota exceeded")),
            ("admin-2", Err("API key not valid")),
        ]));
        let policy = policy(gateway.clone(), generator.clone());

        let result = policy.rank_task(Uuid::new_v4(), None, "t", None, (50, 50)).await;

        assert_eq!(result.source, Source::Fallback(FallbackReason::Exhausted));
        assert_eq!(generator.attempts().len(), 2);
    }

    #[tokio::test]
    async fn test_inactive_keys_are_not_tried() {
        let gateway = Arc::new(MemoryGateway::new());
        gateway.seed(
            Collection::AdminKeys,
            vec![
                admin_key_row(Uuid::new_v4(), "retired", false),
                admin_key_row(Uuid::new_v4(), "live", true),
            ],
        );
        let generator = Arc::new(ScriptedGenerator::new(vec![("live", Ok(RANKING_JSON))]));
        let policy = policy(gateway.clone(), generator.clone());

        let result = policy.rank_task(Uuid::new_v4(), None, "t", None, (50, 50)).await;

        assert_eq!(result.source, Source::Ai);
        assert_eq!(generator.attempts(), vec!["live"]);
    }

    #[tokio::test]
    async fn test_scores_are_clamped() {
        let gateway = Arc::new(MemoryGateway::new());
        let generator = Arc::new(ScriptedGenerator::new(vec![(
            "user-key",
            Ok(r#"{"speed_score": 95, "importance_score": -2}"#),
        )]));
        let policy = policy(gateway.clone(), generator.clone());

        let result = policy
            .rank_task(Uuid::new_v4(), Some("user-key"), "t", None, (50, 50))
            .await;

        assert_eq!(result.value.speed_score, 20);
        assert_eq!(result.value.importance_score, 1);
    }

    #[tokio::test]
    async fn test_suggest_emoji_and_fallback_glyph() {
        let gateway = Arc::new(MemoryGateway::new());
        let generator = Arc::new(ScriptedGenerator::new(vec![("user-key", Ok("🚀 sure!"))]));
        let policy = KeyPolicy::new(gateway.clone(), generator, "gemini-2.0-flash");

        let result = policy
            .suggest_emoji(Uuid::new_v4(), Some("user-key"), "Launch prep")
            .await;
        assert_eq!(result.value, "🚀");
        assert_eq!(result.source, Source::Ai);

        // No keys anywhere: the fixed glyph.
        let generator = Arc::new(ScriptedGenerator::new(vec![]));
        let policy = KeyPolicy::new(gateway, generator, "gemini-2.0-flash");
        let result = policy.suggest_emoji(Uuid::new_v4(), None, "Launch prep").await;
        assert_eq!(result.value, "📝");
        assert_eq!(result.source, Source::Fallback(FallbackReason::NoKeys));
    }
}
