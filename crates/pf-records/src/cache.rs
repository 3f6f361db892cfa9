use crate::Round;
use pf_core::Component;
use pf_core::ID;
use pf_core::Unique;
use pf_database::EMBEDDINGS;
use pf_database::IMPOSTOR_CACHES;
use pf_database::PgErr;
use pf_database::QUIP_CACHES;
use pf_database::QUIP_PHRASES;
use pf_database::QUIP_USAGE;
use pf_database::Schema;
use std::time::SystemTime;
use tokio_postgres::GenericClient;
use tokio_postgres::Row;

/// Cache of validated quip responses for one normalized prompt.
#[derive(Debug, Clone)]
pub struct QuipCache {
    pub cache_id: ID<QuipCache>,
    pub prompt_text: String,
    pub provider: String,
    pub model: String,
    pub created_at: SystemTime,
}

impl Unique for QuipCache {
    fn id(&self) -> ID<Self> {
        self.cache_id
    }
}

impl From<Row> for QuipCache {
    fn from(row: Row) -> Self {
        Self {
            cache_id: ID::from(row.get::<_, uuid::Uuid>("cache_id")),
            prompt_text: row.get("prompt_text"),
            provider: row.get("provider"),
            model: row.get("model"),
            created_at: row.get("created_at"),
        }
    }
}

impl Schema for QuipCache {
    fn name() -> &'static str {
        QUIP_CACHES
    }
    fn creates() -> &'static str {
        const_format::concatcp!(
            "CREATE TABLE IF NOT EXISTS ",
            QUIP_CACHES,
            " (
                cache_id     UUID PRIMARY KEY,
                prompt_text  TEXT NOT NULL,
                provider     TEXT NOT NULL,
                model        TEXT NOT NULL,
                created_at   TIMESTAMPTZ NOT NULL
            );"
        )
    }
    fn indices() -> &'static str {
        const_format::concatcp!(
            "CREATE INDEX IF NOT EXISTS ai_quip_caches_prompt ON ",
            QUIP_CACHES,
            " (prompt_text, created_at);"
        )
    }
}

/// One validated phrase inside a quip cache.
#[derive(Debug, Clone)]
pub struct QuipPhrase {
    pub phrase_id: ID<QuipPhrase>,
    pub cache_id: ID<QuipCache>,
    pub phrase_text: String,
    pub created_at: SystemTime,
}

impl From<Row> for QuipPhrase {
    fn from(row: Row) -> Self {
        Self {
            phrase_id: ID::from(row.get::<_, uuid::Uuid>("phrase_id")),
            cache_id: ID::from(row.get::<_, uuid::Uuid>("cache_id")),
            phrase_text: row.get("phrase_text"),
            created_at: row.get("created_at"),
        }
    }
}

impl Schema for QuipPhrase {
    fn name() -> &'static str {
        QUIP_PHRASES
    }
    fn creates() -> &'static str {
        const_format::concatcp!(
            "CREATE TABLE IF NOT EXISTS ",
            QUIP_PHRASES,
            " (
                phrase_id    UUID PRIMARY KEY,
                cache_id     UUID NOT NULL,
                phrase_text  TEXT NOT NULL,
                created_at   TIMESTAMPTZ NOT NULL
            );"
        )
    }
}

/// Marker type for quip phrase usage rows.
pub struct QuipPhraseUsage;

impl Schema for QuipPhraseUsage {
    fn name() -> &'static str {
        QUIP_USAGE
    }
    fn creates() -> &'static str {
        const_format::concatcp!(
            "CREATE TABLE IF NOT EXISTS ",
            QUIP_USAGE,
            " (
                usage_id         UUID PRIMARY KEY,
                phrase_id        UUID NOT NULL,
                prompt_round_id  UUID NOT NULL,
                created_at       TIMESTAMPTZ NOT NULL
            );"
        )
    }
}

/// Cache of validated impostor phrases for one prompt round. At most one
/// cache per prompt round; phrases are consumed (removed) by backup copies
/// and read in place by hints.
#[derive(Debug, Clone)]
pub struct ImpostorCache {
    pub cache_id: ID<ImpostorCache>,
    pub prompt_round_id: ID<Round>,
    pub original_phrase: String,
    pub prompt_text: String,
    pub validated_phrases: Vec<String>,
    pub provider: String,
    pub model: String,
    pub used_for_backup_copy: bool,
    pub used_for_hints: bool,
    pub created_at: SystemTime,
}

impl Unique for ImpostorCache {
    fn id(&self) -> ID<Self> {
        self.cache_id
    }
}

impl From<Row> for ImpostorCache {
    fn from(row: Row) -> Self {
        Self {
            cache_id: ID::from(row.get::<_, uuid::Uuid>("cache_id")),
            prompt_round_id: ID::from(row.get::<_, uuid::Uuid>("prompt_round_id")),
            original_phrase: row.get("original_phrase"),
            prompt_text: row.get("prompt_text"),
            validated_phrases: row.get("validated_phrases"),
            provider: row.get("provider"),
            model: row.get("model"),
            used_for_backup_copy: row.get("used_for_backup_copy"),
            used_for_hints: row.get("used_for_hints"),
            created_at: row.get("created_at"),
        }
    }
}

impl Schema for ImpostorCache {
    fn name() -> &'static str {
        IMPOSTOR_CACHES
    }
    fn creates() -> &'static str {
        const_format::concatcp!(
            "CREATE TABLE IF NOT EXISTS ",
            IMPOSTOR_CACHES,
            " (
                cache_id              UUID PRIMARY KEY,
                prompt_round_id       UUID NOT NULL UNIQUE,
                original_phrase       TEXT NOT NULL,
                prompt_text           TEXT NOT NULL,
                validated_phrases     TEXT[] NOT NULL,
                provider              TEXT NOT NULL,
                model                 TEXT NOT NULL,
                used_for_backup_copy  BOOLEAN NOT NULL DEFAULT FALSE,
                used_for_hints        BOOLEAN NOT NULL DEFAULT FALSE,
                created_at            TIMESTAMPTZ NOT NULL
            );"
        )
    }
}

/// Marker type for the persistent embedding cache keyed
/// (phrase, model, provider).
pub struct EmbeddingRecord;

impl Schema for EmbeddingRecord {
    fn name() -> &'static str {
        EMBEDDINGS
    }
    fn creates() -> &'static str {
        const_format::concatcp!(
            "CREATE TABLE IF NOT EXISTS ",
            EMBEDDINGS,
            " (
                phrase      TEXT NOT NULL,
                model       TEXT NOT NULL,
                provider    TEXT NOT NULL,
                embedding   REAL[] NOT NULL,
                created_at  TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (phrase, model, provider)
            );"
        )
    }
}

#[allow(async_fn_in_trait)]
pub trait CacheRepository {
    async fn quip_cache_for_prompt(&self, prompt_text: &str)
    -> Result<Option<QuipCache>, PgErr>;
    async fn insert_quip_cache(&self, cache: &QuipCache) -> Result<(), PgErr>;
    async fn insert_quip_phrase(&self, phrase: &QuipPhrase) -> Result<(), PgErr>;
    /// Phrases in a cache with usage counts, least-used (then oldest) first.
    async fn quip_phrases_least_used(
        &self,
        cache: ID<QuipCache>,
    ) -> Result<Vec<(QuipPhrase, i64)>, PgErr>;
    async fn record_quip_usage(
        &self,
        phrase: ID<QuipPhrase>,
        prompt_round: ID<Round>,
        now: SystemTime,
    ) -> Result<(), PgErr>;
    /// Every phrase ever cached for a prompt key, across all its caches.
    async fn phrases_cached_for_prompt(&self, prompt_text: &str) -> Result<Vec<String>, PgErr>;
    async fn impostor_cache_for_round(
        &self,
        prompt_round: ID<Round>,
    ) -> Result<Option<ImpostorCache>, PgErr>;
    async fn insert_impostor_cache(&self, cache: &ImpostorCache) -> Result<(), PgErr>;
    async fn update_impostor_phrases(
        &self,
        cache: ID<ImpostorCache>,
        phrases: &[String],
    ) -> Result<(), PgErr>;
    async fn mark_impostor_used(
        &self,
        cache: ID<ImpostorCache>,
        backup_copy: bool,
        hints: bool,
    ) -> Result<(), PgErr>;
    async fn delete_impostor_cache(&self, cache: ID<ImpostorCache>) -> Result<(), PgErr>;
    /// Phrases used by caches whose original phrase is in the given set.
    async fn impostor_phrases_for_originals(
        &self,
        originals: &[String],
    ) -> Result<Vec<String>, PgErr>;
    async fn cached_embedding(
        &self,
        phrase: &str,
        model: &str,
        provider: &str,
    ) -> Result<Option<Vec<Component>>, PgErr>;
    async fn store_embedding(
        &self,
        phrase: &str,
        model: &str,
        provider: &str,
        embedding: &[Component],
        now: SystemTime,
    ) -> Result<(), PgErr>;
}

impl<C: GenericClient + Sync> CacheRepository for C {
    async fn quip_cache_for_prompt(
        &self,
        prompt_text: &str,
    ) -> Result<Option<QuipCache>, PgErr> {
        self.query_opt(
            const_format::concatcp!(
                "SELECT * FROM ",
                QUIP_CACHES,
                " WHERE prompt_text = $1 ORDER BY created_at DESC LIMIT 1"
            ),
            &[&prompt_text],
        )
        .await
        .map(|opt| opt.map(QuipCache::from))
    }

    async fn insert_quip_cache(&self, cache: &QuipCache) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "INSERT INTO ",
                QUIP_CACHES,
                " (cache_id, prompt_text, provider, model, created_at)
                 VALUES ($1, $2, $3, $4, $5)"
            ),
            &[
                &cache.cache_id.inner(),
                &cache.prompt_text,
                &cache.provider,
                &cache.model,
                &cache.created_at,
            ],
        )
        .await
        .map(|_| ())
    }

    async fn insert_quip_phrase(&self, phrase: &QuipPhrase) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "INSERT INTO ",
                QUIP_PHRASES,
                " (phrase_id, cache_id, phrase_text, created_at) VALUES ($1, $2, $3, $4)"
            ),
            &[
                &phrase.phrase_id.inner(),
                &phrase.cache_id.inner(),
                &phrase.phrase_text,
                &phrase.created_at,
            ],
        )
        .await
        .map(|_| ())
    }

    async fn quip_phrases_least_used(
        &self,
        cache: ID<QuipCache>,
    ) -> Result<Vec<(QuipPhrase, i64)>, PgErr> {
        self.query(
            const_format::concatcp!(
                "SELECT p.*, COALESCE(u.uses, 0) AS uses
                 FROM ",
                QUIP_PHRASES,
                " p
                 LEFT JOIN (
                     SELECT phrase_id, COUNT(*) AS uses FROM ",
                QUIP_USAGE,
                "     GROUP BY phrase_id
                 ) u ON u.phrase_id = p.phrase_id
                 WHERE p.cache_id = $1
                 ORDER BY COALESCE(u.uses, 0) ASC, p.created_at ASC"
            ),
            &[&cache.inner()],
        )
        .await
        .map(|rows| {
            rows.into_iter()
                .map(|row| {
                    let uses: i64 = row.get("uses");
                    (QuipPhrase::from(row), uses)
                })
                .collect()
        })
    }

    async fn record_quip_usage(
        &self,
        phrase: ID<QuipPhrase>,
        prompt_round: ID<Round>,
        now: SystemTime,
    ) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "INSERT INTO ",
                QUIP_USAGE,
                " (usage_id, phrase_id, prompt_round_id, created_at) VALUES ($1, $2, $3, $4)"
            ),
            &[
                &uuid::Uuid::now_v7(),
                &phrase.inner(),
                &prompt_round.inner(),
                &now,
            ],
        )
        .await
        .map(|_| ())
    }

    async fn phrases_cached_for_prompt(&self, prompt_text: &str) -> Result<Vec<String>, PgErr> {
        self.query(
            const_format::concatcp!(
                "SELECT p.phrase_text FROM ",
                QUIP_PHRASES,
                " p JOIN ",
                QUIP_CACHES,
                " c ON c.cache_id = p.cache_id WHERE c.prompt_text = $1"
            ),
            &[&prompt_text],
        )
        .await
        .map(|rows| rows.into_iter().map(|row| row.get(0)).collect())
    }

    async fn impostor_cache_for_round(
        &self,
        prompt_round: ID<Round>,
    ) -> Result<Option<ImpostorCache>, PgErr> {
        self.query_opt(
            const_format::concatcp!(
                "SELECT * FROM ",
                IMPOSTOR_CACHES,
                " WHERE prompt_round_id = $1"
            ),
            &[&prompt_round.inner()],
        )
        .await
        .map(|opt| opt.map(ImpostorCache::from))
    }

    async fn insert_impostor_cache(&self, cache: &ImpostorCache) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "INSERT INTO ",
                IMPOSTOR_CACHES,
                " (cache_id, prompt_round_id, original_phrase, prompt_text,
                   validated_phrases, provider, model, used_for_backup_copy,
                   used_for_hints, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
            ),
            &[
                &cache.cache_id.inner(),
                &cache.prompt_round_id.inner(),
                &cache.original_phrase,
                &cache.prompt_text,
                &cache.validated_phrases,
                &cache.provider,
                &cache.model,
                &cache.used_for_backup_copy,
                &cache.used_for_hints,
                &cache.created_at,
            ],
        )
        .await
        .map(|_| ())
    }

    async fn update_impostor_phrases(
        &self,
        cache: ID<ImpostorCache>,
        phrases: &[String],
    ) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "UPDATE ",
                IMPOSTOR_CACHES,
                " SET validated_phrases = $2 WHERE cache_id = $1"
            ),
            &[&cache.inner(), &phrases],
        )
        .await
        .map(|_| ())
    }

    async fn mark_impostor_used(
        &self,
        cache: ID<ImpostorCache>,
        backup_copy: bool,
        hints: bool,
    ) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "UPDATE ",
                IMPOSTOR_CACHES,
                " SET used_for_backup_copy = used_for_backup_copy OR $2,
                      used_for_hints = used_for_hints OR $3
                 WHERE cache_id = $1"
            ),
            &[&cache.inner(), &backup_copy, &hints],
        )
        .await
        .map(|_| ())
    }

    async fn delete_impostor_cache(&self, cache: ID<ImpostorCache>) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!("DELETE FROM ", IMPOSTOR_CACHES, " WHERE cache_id = $1"),
            &[&cache.inner()],
        )
        .await
        .map(|_| ())
    }

    async fn impostor_phrases_for_originals(
        &self,
        originals: &[String],
    ) -> Result<Vec<String>, PgErr> {
        self.query(
            const_format::concatcp!(
                "SELECT UNNEST(validated_phrases) FROM ",
                IMPOSTOR_CACHES,
                " WHERE LOWER(original_phrase) = ANY($1)"
            ),
            &[&originals],
        )
        .await
        .map(|rows| rows.into_iter().map(|row| row.get(0)).collect())
    }

    async fn cached_embedding(
        &self,
        phrase: &str,
        model: &str,
        provider: &str,
    ) -> Result<Option<Vec<Component>>, PgErr> {
        self.query_opt(
            const_format::concatcp!(
                "SELECT embedding FROM ",
                EMBEDDINGS,
                " WHERE phrase = $1 AND model = $2 AND provider = $3"
            ),
            &[&phrase, &model, &provider],
        )
        .await
        .map(|opt| opt.map(|row| row.get(0)))
    }

    async fn store_embedding(
        &self,
        phrase: &str,
        model: &str,
        provider: &str,
        embedding: &[Component],
        now: SystemTime,
    ) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "INSERT INTO ",
                EMBEDDINGS,
                " (phrase, model, provider, embedding, created_at)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT (phrase, model, provider) DO NOTHING"
            ),
            &[&phrase, &model, &provider, &embedding, &now],
        )
        .await
        .map(|_| ())
    }
}
