//! Session turns and session storage.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::{
    CommitPolicy, Feedback, REGENERATE_SUFFIX, Recollection, SessionSettings, TurnError,
    TurnReply,
};
use crate::embedding::Embedder;
use crate::llm::{GenerationError, MessageRole, TextGenerator};
use crate::memory::{
    ContextAssembler, DecayReport, MemoryConfig, MemoryError, MemoryManager, Snapshot,
    SnapshotError,
};
use crate::mood::{MoodProvider, system_prompt};

/// External collaborators shared by every session.
#[derive(Debug, Clone)]
pub struct SessionServices {
    pub embedder: Arc<dyn Embedder>,
    pub generator: Arc<dyn TextGenerator>,
    pub mood: Arc<dyn MoodProvider>,
}

/// One user's conversation memory.
///
/// Cloning is cheap and yields a handle to the same session.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    user: String,
    memory: Mutex<MemoryManager>,
    feedback: Mutex<Vec<Feedback>>,
    services: SessionServices,
    settings: SessionSettings,
    created_at: DateTime<Utc>,
    last_activity: RwLock<DateTime<Utc>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Session {
    fn new(
        user: String,
        memory: MemoryManager,
        services: SessionServices,
        settings: SessionSettings,
    ) -> Self {
        let now = Utc::now();
        Self {
            inner: Arc::new(SessionInner {
                user,
                memory: Mutex::new(memory),
                feedback: Mutex::new(Vec::new()),
                services,
                settings,
                created_at: now,
                last_activity: RwLock::new(now),
            }),
        }
    }

    #[must_use]
    pub fn user(&self) -> &str {
        &self.inner.user
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    #[must_use]
    pub fn last_activity(&self) -> DateTime<Utc> {
        *self
            .inner
            .last_activity
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn touch(&self) {
        let mut guard = self
            .inner
            .last_activity
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = Utc::now();
    }

    /// Run `f` against the memory under the session lock.
    pub fn with_memory<R>(&self, f: impl FnOnce(&MemoryManager) -> R) -> R {
        f(&lock(&self.inner.memory))
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.with_memory(MemoryManager::len)
    }

    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.with_memory(Snapshot::capture)
    }

    /// The `k` stored topics nearest to `text`, best first. Memory is only
    /// read and the threshold is not applied.
    pub async fn recall(&self, text: &str, k: usize) -> Result<Vec<Recollection>, TurnError> {
        if text.trim().is_empty() {
            return Err(TurnError::EmptyMessage);
        }
        let embedding = self.inner.services.embedder.embed_checked(text).await?;
        let memory = lock(&self.inner.memory);
        Ok(memory
            .rank(&embedding, k)
            .into_iter()
            .filter_map(|m| {
                let node = memory.node(m.node)?;
                Some(Recollection {
                    node: m.node,
                    similarity: m.similarity,
                    message_count: node.message_count(),
                    latest: node.messages().next_back().map(|msg| msg.content.clone()),
                })
            })
            .collect())
    }

    /// Answer `text`, committing it to memory per the commit policy.
    #[instrument(skip(self, text), fields(user = %self.inner.user))]
    pub async fn respond(&self, text: &str) -> Result<TurnReply, TurnError> {
        self.run_turn(text, text, true).await
    }

    /// Ask again after an unhelpful reply. The message was already
    /// committed by [`Session::respond`], so memory is only read.
    #[instrument(skip(self, text), fields(user = %self.inner.user))]
    pub async fn regenerate(&self, text: &str) -> Result<TurnReply, TurnError> {
        let prompt = format!("{text}{REGENERATE_SUFFIX}");
        self.run_turn(text, &prompt, false).await
    }

    async fn run_turn(
        &self,
        text: &str,
        prompt: &str,
        commit: bool,
    ) -> Result<TurnReply, TurnError> {
        if text.trim().is_empty() {
            return Err(TurnError::EmptyMessage);
        }
        self.touch();

        let services = &self.inner.services;
        let settings = &self.inner.settings;

        let embedding = services.embedder.embed_checked(text).await?;
        let mood = services.mood.detect(text, &embedding).await;
        let system = system_prompt(mood, settings.coaching);
        let assembler = ContextAssembler::new()
            .with_history_limit(settings.history_limit)
            .with_token_budget(settings.token_budget);

        let commit_first = commit && settings.commit_policy == CommitPolicy::BeforeGenerate;
        let (context, mut node, mut merged) = {
            let mut memory = lock(&self.inner.memory);
            if commit_first {
                let outcome = memory.add_to_memory(&embedding, text, MessageRole::User)?;
                let context = assembler.assemble(&system, prompt, memory.node(outcome.node()));
                (context, Some(outcome.node()), outcome.is_merge())
            } else {
                let matched = memory.find_match(&embedding);
                let context =
                    assembler.assemble(&system, prompt, matched.and_then(|m| memory.node(m.node)));
                (context, matched.map(|m| m.node), matched.is_some())
            }
        };

        debug!(
            %mood,
            messages = context.messages.len(),
            history = context.history_used,
            "Requesting reply"
        );

        let timeout = settings.generation_timeout;
        let pending = services.generator.generate(&context.messages);
        let reply = match tokio::time::timeout(timeout, pending).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs(), "Generation timed out");
                return Err(GenerationError::Timeout(timeout).into());
            }
        };

        if commit && !commit_first {
            let outcome =
                lock(&self.inner.memory).add_to_memory(&embedding, text, MessageRole::User)?;
            node = Some(outcome.node());
            merged = outcome.is_merge();
        }

        metrics::counter!("session.turns").increment(1);
        info!(node = ?node, merged, "Turn complete");

        Ok(TurnReply {
            reply,
            mood,
            node,
            merged,
            history_used: context.history_used,
        })
    }

    /// Store a 1 to 5 rating for the latest reply.
    pub fn record_feedback(&self, score: u8) -> Result<Feedback, TurnError> {
        if !(1..=5).contains(&score) {
            return Err(TurnError::InvalidFeedback(score));
        }
        let feedback = Feedback {
            score,
            at: Utc::now(),
        };
        lock(&self.inner.feedback).push(feedback);
        debug!(user = %self.inner.user, score, "Recorded feedback");
        Ok(feedback)
    }

    #[must_use]
    pub fn feedback(&self) -> Vec<Feedback> {
        lock(&self.inner.feedback).clone()
    }

    /// Apply time decay to this session's memory.
    pub fn tick(&self) -> DecayReport {
        self.tick_at(Utc::now())
    }

    pub fn tick_at(&self, now: DateTime<Utc>) -> DecayReport {
        lock(&self.inner.memory).decay_memory_at(now)
    }
}

/// Thread-safe map of user id to [`Session`].
#[derive(Debug, Clone)]
pub struct SessionStore {
    inner: Arc<SessionStoreInner>,
}

#[derive(Debug)]
struct SessionStoreInner {
    sessions: RwLock<HashMap<String, Session>>,
    /// Empty memory cloned for every new session.
    template: MemoryManager,
    services: SessionServices,
    settings: SessionSettings,
}

impl SessionStore {
    /// Fails when `memory_config` is out of range.
    pub fn new(
        memory_config: MemoryConfig,
        services: SessionServices,
        settings: SessionSettings,
    ) -> Result<Self, MemoryError> {
        let template = MemoryManager::new(memory_config)?;
        Ok(Self {
            inner: Arc::new(SessionStoreInner {
                sessions: RwLock::new(HashMap::new()),
                template,
                services,
                settings,
            }),
        })
    }

    #[must_use]
    pub fn memory_config(&self) -> &MemoryConfig {
        self.inner.template.config()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Session>> {
        self.inner
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Session>> {
        self.inner
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn make_session(&self, user: &str, memory: MemoryManager) -> Session {
        Session::new(
            user.to_string(),
            memory,
            self.inner.services.clone(),
            self.inner.settings.clone(),
        )
    }

    #[must_use]
    pub fn get(&self, user: &str) -> Option<Session> {
        self.read().get(user).cloned()
    }

    /// The user's session, created with empty memory on first use.
    #[must_use]
    pub fn get_or_create(&self, user: &str) -> Session {
        if let Some(session) = self.get(user) {
            return session;
        }

        let mut guard = self.write();
        if let Some(session) = guard.get(user) {
            return session.clone();
        }
        let session = self.make_session(user, self.inner.template.clone());
        guard.insert(user.to_string(), session.clone());
        info!(user, "Created session");
        session
    }

    /// Install a session around an existing memory, replacing any session
    /// the user already had.
    pub fn restore(&self, user: &str, snapshot: Snapshot) -> Result<Session, SnapshotError> {
        let memory = snapshot.restore(self.memory_config().clone())?;
        let session = self.make_session(user, memory);
        self.write().insert(user.to_string(), session.clone());
        info!(user, nodes = session.node_count(), "Restored session from snapshot");
        Ok(session)
    }

    pub fn remove(&self, user: &str) -> Option<Session> {
        self.write().remove(user)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn user_ids(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Decay every session's memory. Returns the number of retired nodes.
    pub fn decay_all(&self) -> usize {
        self.decay_all_at(Utc::now())
    }

    pub fn decay_all_at(&self, now: DateTime<Utc>) -> usize {
        // Snapshot the handles so no store lock is held while sessions lock.
        let sessions: Vec<Session> = self.read().values().cloned().collect();
        sessions
            .iter()
            .map(|s| s.tick_at(now).retired.len())
            .sum()
    }

    /// Run [`SessionStore::decay_all`] every `interval` on the tokio runtime.
    pub fn spawn_decay_task(&self, interval: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let retired = store.decay_all();
                if retired > 0 {
                    debug!(retired, sessions = store.len(), "Decay pass retired nodes");
                }
            }
        })
    }
}
