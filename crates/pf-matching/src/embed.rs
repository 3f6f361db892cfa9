use async_trait::async_trait;
use pf_core::Component;
use pf_core::GameResult;
use pf_records::CacheRepository;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::Mutex;
use tokio_postgres::GenericClient;

/// External embedding backend. This is the single root method for provider
/// calls; everything else goes through the cache tiers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn generate_embedding(&self, text: &str, model: &str) -> GameResult<Vec<Component>>;
    fn provider_name(&self) -> &str;
}

/// Two-tier embedding cache: a process-local map for session performance,
/// then the persistent `(phrase, model, provider)` store, then the provider.
pub struct Embeddings {
    provider: Arc<dyn EmbeddingProvider>,
    model: String,
    memory: Mutex<HashMap<String, Vec<Component>>>,
}

impl Embeddings {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            memory: Mutex::new(HashMap::new()),
        }
    }

    fn normalize(text: &str) -> String {
        text.trim().to_lowercase()
    }

    /// Resolve an embedding, filling both cache tiers on a miss.
    pub async fn embedding<C: GenericClient + Sync>(
        &self,
        db: &C,
        text: &str,
        now: SystemTime,
    ) -> GameResult<Vec<Component>> {
        let key = Self::normalize(text);
        if let Some(hit) = self.memory.lock().await.get(&key) {
            log::trace!("[embeddings] memory hit for {:?}", &key);
            return Ok(hit.clone());
        }
        if let Some(stored) = db
            .cached_embedding(&key, &self.model, self.provider.provider_name())
            .await?
        {
            log::debug!("[embeddings] store hit for {:?}", &key);
            self.memory.lock().await.insert(key, stored.clone());
            return Ok(stored);
        }
        let fresh = self
            .provider
            .generate_embedding(text, &self.model)
            .await?;
        db.store_embedding(
            &key,
            &self.model,
            self.provider.provider_name(),
            &fresh,
            now,
        )
        .await?;
        self.memory.lock().await.insert(key, fresh.clone());
        Ok(fresh)
    }

    /// Resolve many embeddings sequentially through the same tiers.
    pub async fn embeddings<C: GenericClient + Sync>(
        &self,
        db: &C,
        texts: &[String],
        now: SystemTime,
    ) -> GameResult<Vec<Vec<Component>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embedding(db, text, now).await?);
        }
        Ok(out)
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}
