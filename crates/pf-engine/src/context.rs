use async_trait::async_trait;
use pf_core::Clock;
use pf_core::GameError;
use pf_core::GameResult;
use pf_core::Settings;
use pf_sync::LockGuard;
use pf_sync::LockName;
use pf_sync::LockService;
use pf_sync::QueueService;
use pf_validate::PhraseValidator;
use std::sync::Arc;
use std::time::Duration;
use std::time::SystemTime;

/// Source of prompts for new QF prompt rounds. Seed data loading is an
/// external concern; the engine only asks for the next prompt text.
#[async_trait]
pub trait PromptSource: Send + Sync {
    async fn random_prompt(&self) -> GameResult<String>;
}

/// Fixed prompt list, rotated at random.
pub struct StaticPrompts {
    prompts: Vec<String>,
}

impl StaticPrompts {
    pub fn new(prompts: Vec<String>) -> Self {
        Self { prompts }
    }
}

#[async_trait]
impl PromptSource for StaticPrompts {
    async fn random_prompt(&self) -> GameResult<String> {
        use rand::seq::IndexedRandom;
        self.prompts
            .choose(&mut rand::rng())
            .cloned()
            .ok_or(GameError::NoEligibleWork)
    }
}

/// Dependency handles every service shares: config, clock, the lock and
/// queue services, the validator, and the prompt source. Passed explicitly;
/// nothing in the coordinator reads global state.
pub struct CoordinatorContext {
    pub settings: Settings,
    pub clock: Arc<dyn Clock>,
    pub locks: Arc<dyn LockService>,
    pub queues: Arc<dyn QueueService>,
    pub validator: Arc<dyn PhraseValidator>,
    pub prompts: Arc<dyn PromptSource>,
}

impl CoordinatorContext {
    pub fn now(&self) -> SystemTime {
        self.clock.now()
    }
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.round_lock_timeout_seconds)
    }
    /// Acquire a named lock with the configured round-flow timeout.
    pub async fn lock(&self, name: LockName) -> GameResult<LockGuard> {
        self.locks.lock(name, self.lock_timeout()).await
    }
}
