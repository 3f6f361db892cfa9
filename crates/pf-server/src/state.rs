use async_trait::async_trait;
use pf_ai::ContentCache;
use pf_ai::ImpostorCorpus;
use pf_ai::IrBackupOrchestrator;
use pf_ai::LlmProvider;
use pf_ai::PartyAiOrchestrator;
use pf_ai::QfBackupOrchestrator;
use pf_ai::QuipCorpus;
use pf_ai::UnconfiguredProvider;
use pf_core::Component;
use pf_core::GameError;
use pf_core::GameResult;
use pf_core::Settings;
use pf_core::SystemClock;
use pf_database::Database;
use pf_engine::CoordinatorContext;
use pf_engine::StaticPrompts;
use pf_matching::EmbeddingProvider;
use pf_matching::Embeddings;
use pf_realtime::Broadcaster;
use pf_sync::MemoryLocks;
use pf_sync::MemoryQueues;
use pf_validate::RuleValidator;
use std::sync::Arc;

/// Default prompt rotation for QF rounds; real deployments load a corpus.
const SEED_PROMPTS: &[&str] = &[
    "things you shout at a wedding",
    "worst superhero power",
    "rejected ice cream flavors",
    "signs your houseplant hates you",
    "what cats think about",
    "terrible campaign slogans",
    "sounds that wake you at 3am",
    "worst things to say in an elevator",
    "items banned from the break room",
    "unlikely fortune cookie messages",
    "hobbies nobody admits to",
    "what robots dream about",
];

/// Embedding calls are external; without a wired client they surface as
/// `ProviderUnavailable` and TL guessing stays offline.
pub struct UnconfiguredEmbeddings;

#[async_trait]
impl EmbeddingProvider for UnconfiguredEmbeddings {
    async fn generate_embedding(&self, _text: &str, _model: &str) -> GameResult<Vec<Component>> {
        Err(GameError::ProviderUnavailable(
            "no embedding client configured".to_string(),
        ))
    }
    fn provider_name(&self) -> &str {
        "unconfigured"
    }
}

/// Everything the handlers share. Cloned per worker by actix.
#[derive(Clone)]
pub struct AppState {
    pub ctx: Arc<CoordinatorContext>,
    pub database: Database,
    pub broadcaster: Arc<Broadcaster>,
    pub cache: Arc<ContentCache>,
    pub embeddings: Arc<Embeddings>,
    pub party_ai: Arc<PartyAiOrchestrator>,
}

/// Wire the whole coordinator for a single-instance deployment: in-memory
/// locks and queues, in-process validator, injected providers.
pub fn compose(
    settings: Settings,
    database: Database,
    llm: Option<Arc<dyn LlmProvider>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
) -> AppState {
    let embedding_model = settings.embedding_model.clone();
    let ai_model = settings.ai_openai_model.clone();
    let ctx = Arc::new(CoordinatorContext {
        validator: Arc::new(RuleValidator::new(&settings)),
        prompts: Arc::new(StaticPrompts::new(
            SEED_PROMPTS.iter().map(|p| p.to_string()).collect(),
        )),
        clock: Arc::new(SystemClock),
        locks: Arc::new(MemoryLocks::new()),
        queues: Arc::new(MemoryQueues::new()),
        settings,
    });
    let broadcaster = Arc::new(Broadcaster::new());
    let llm = llm.unwrap_or_else(|| Arc::new(UnconfiguredProvider));
    let embedder = embedder.unwrap_or_else(|| Arc::new(UnconfiguredEmbeddings));
    let cache = Arc::new(ContentCache::new(
        ctx.clone(),
        llm,
        ai_model,
        QuipCorpus::from_csv(include_str!("../data/prompt_completions.csv")),
        ImpostorCorpus::from_csv(include_str!("../data/fakes.csv")),
    ));
    let embeddings = Arc::new(Embeddings::new(embedder, embedding_model));
    let party_ai = Arc::new(PartyAiOrchestrator::new(
        ctx.clone(),
        database.clone(),
        broadcaster.clone(),
        cache.clone(),
    ));
    AppState {
        ctx,
        database,
        broadcaster,
        cache,
        embeddings,
        party_ai,
    }
}

impl AppState {
    pub fn qf_backup(&self) -> QfBackupOrchestrator {
        QfBackupOrchestrator::new(self.ctx.clone(), self.database.clone(), self.cache.clone())
    }
    pub fn ir_backup(&self) -> IrBackupOrchestrator {
        IrBackupOrchestrator::new(self.ctx.clone(), self.database.clone(), self.cache.clone())
    }
}
