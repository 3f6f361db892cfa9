use crate::ImpostorCorpus;
use crate::LlmProvider;
use crate::QuipCorpus;
use crate::build_backronym_prompt;
use crate::build_backronym_vote_prompt;
use crate::build_impostor_prompt;
use crate::build_quip_prompt;
use crate::build_vote_prompt;
use crate::parse_choice;
use crate::split_candidates;
use pf_core::GameError;
use pf_core::GameResult;
use pf_core::ID;
use pf_engine::CoordinatorContext;
use pf_records::CacheRepository;
use pf_records::ImpostorCache;
use pf_records::Phraseset;
use pf_records::QuipCache;
use pf_records::QuipPhrase;
use pf_records::Round;
use pf_records::RoundRepository;
use pf_sync::LockName;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_postgres::GenericClient;

/// Generation can sit behind a slow provider; cache builders hold their
/// per-prompt lock across the whole call.
const GENERATION_LOCK_TIMEOUT: Duration = Duration::from_secs(120);
const REVALIDATION_LOCK_TIMEOUT: Duration = Duration::from_secs(30);
/// An impostor cache is healthy while it holds at least this many phrases.
const MIN_VALID_PHRASES: usize = 3;
/// Impostor caches store at most this many phrases.
const MAX_CACHED_PHRASES: usize = 5;

/// One fallback word per letter so a short provider response can be padded
/// into a structurally valid backronym.
const LETTER_WORDS: &[&str] = &[
    "APPLE", "BANJO", "CIRCUS", "DONUT", "ECHO", "FIDDLE", "GOOSE", "HAMMOCK", "IGLOO", "JELLY",
    "KAZOO", "LLAMA", "MANGO", "NOODLE", "OTTER", "PICKLE", "QUILT", "RACCOON", "SOCKS", "TUBA",
    "UMBRELLA", "VELCRO", "WAFFLE", "XYLOPHONE", "YODEL", "ZIPPER",
];

/// The content cache: pre-validated candidate phrases per prompt (quips)
/// and per prompt round (impostors), built under a per-prompt lock, fed
/// first from the static corpora and only then from the provider.
pub struct ContentCache {
    ctx: Arc<CoordinatorContext>,
    llm: Arc<dyn LlmProvider>,
    model: String,
    quip_corpus: QuipCorpus,
    impostor_corpus: ImpostorCorpus,
}

impl ContentCache {
    pub fn new(
        ctx: Arc<CoordinatorContext>,
        llm: Arc<dyn LlmProvider>,
        model: String,
        quip_corpus: QuipCorpus,
        impostor_corpus: ImpostorCorpus,
    ) -> Self {
        Self {
            ctx,
            llm,
            model,
            quip_corpus,
            impostor_corpus,
        }
    }

    fn provider_label(&self) -> String {
        self.llm.name().to_string()
    }

    fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.ctx.settings.ai_timeout_seconds)
    }

    fn free_words(&self) -> Vec<String> {
        self.ctx
            .validator
            .common_words()
            .iter()
            .filter(|w| w.len() > 3)
            .cloned()
            .collect()
    }

    // ------------------------------------------------------------------
    // Quip cache (keyed by normalized prompt)
    // ------------------------------------------------------------------

    /// Produce a quip for a prompt round, building the cache on first use.
    /// Consumption is least-used-first and recorded per round.
    pub async fn generate_quip_response<C: GenericClient + Sync>(
        &self,
        db: &C,
        prompt_text: &str,
        prompt_round: ID<Round>,
    ) -> GameResult<String> {
        let cache = self.get_or_create_quip_cache(db, prompt_text).await?;
        let phrase = self.select_least_used(db, &cache).await?;
        db.record_quip_usage(phrase.phrase_id, prompt_round, self.ctx.now())
            .await?;
        log::info!(
            "[ai] quip cache {} served {:?} for round {}",
            cache.cache_id,
            phrase.phrase_text,
            prompt_round
        );
        Ok(phrase.phrase_text)
    }

    async fn select_least_used<C: GenericClient + Sync>(
        &self,
        db: &C,
        cache: &QuipCache,
    ) -> GameResult<QuipPhrase> {
        let ranked = db.quip_phrases_least_used(cache.cache_id).await?;
        ranked
            .into_iter()
            .next()
            .map(|(phrase, _uses)| phrase)
            .ok_or_else(|| GameError::AiGenerationFailed("quip cache is empty".into()))
    }

    async fn get_or_create_quip_cache<C: GenericClient + Sync>(
        &self,
        db: &C,
        prompt_text: &str,
    ) -> GameResult<QuipCache> {
        let normalized = prompt_text.trim().to_string();
        if normalized.is_empty() {
            return Err(GameError::AiGenerationFailed("empty prompt".into()));
        }
        let lock_name = LockName::content("quip", normalized.to_lowercase());
        let guard = self
            .ctx
            .locks
            .lock(lock_name, GENERATION_LOCK_TIMEOUT)
            .await;
        match guard {
            Ok(_guard) => self.build_quip_cache(db, &normalized).await,
            // Another holder may have built it while we waited.
            Err(GameError::LockTimeout(_)) => db
                .quip_cache_for_prompt(&normalized)
                .await?
                .ok_or_else(|| {
                    GameError::AiGenerationFailed("quip cache unavailable after lock timeout".into())
                }),
            Err(e) => Err(e),
        }
    }

    async fn build_quip_cache<C: GenericClient + Sync>(
        &self,
        db: &C,
        prompt: &str,
    ) -> GameResult<QuipCache> {
        if let Some(existing) = db.quip_cache_for_prompt(prompt).await? {
            let phrases = db.quip_phrases_least_used(existing.cache_id).await?;
            if !phrases.is_empty() {
                return Ok(existing);
            }
        }

        // The static corpus goes first; phrases already handed out for this
        // prompt key are filtered by exact text across all caches.
        let used: HashSet<String> = db
            .phrases_cached_for_prompt(prompt)
            .await?
            .into_iter()
            .map(|p| p.to_lowercase())
            .collect();
        let mut validated = Vec::new();
        for candidate in self.quip_corpus.phrases_for(prompt) {
            if used.contains(&candidate.to_lowercase()) {
                continue;
            }
            if self.quip_candidate_ok(candidate, prompt).await {
                validated.push(candidate.clone());
            }
        }
        if !validated.is_empty() {
            log::info!(
                "[ai] built quip cache for {:?} from corpus ({} phrases)",
                prompt,
                validated.len()
            );
            return self
                .store_quip_cache(db, prompt, validated, "csv_cache", "pre_generated")
                .await;
        }

        // Corpus exhausted: ask the provider.
        let ai_prompt = build_quip_prompt(prompt, &self.free_words());
        let response = self
            .llm
            .generate_response(&ai_prompt, &self.model, self.llm_timeout())
            .await?;
        let mut validated = Vec::new();
        for candidate in split_candidates(&response) {
            if self.quip_candidate_ok(&candidate, prompt).await {
                validated.push(candidate);
            }
        }
        if validated.is_empty() {
            return Err(GameError::AiGenerationFailed(format!(
                "no valid quip candidates for {:?}",
                prompt
            )));
        }
        log::info!(
            "[ai] generated {} quip phrase(s) for {:?} via {}",
            validated.len(),
            prompt,
            self.provider_label()
        );
        let provider = self.provider_label();
        let model = self.model.clone();
        self.store_quip_cache(db, prompt, validated, &provider, &model)
            .await
    }

    async fn quip_candidate_ok(&self, candidate: &str, prompt: &str) -> bool {
        let candidate = candidate.trim();
        if candidate.chars().count() < 4 || candidate.chars().count() > 100 {
            return false;
        }
        self.ctx
            .validator
            .validate_prompt_phrase(candidate, prompt)
            .await
            .is_ok()
    }

    async fn store_quip_cache<C: GenericClient + Sync>(
        &self,
        db: &C,
        prompt: &str,
        phrases: Vec<String>,
        provider: &str,
        model: &str,
    ) -> GameResult<QuipCache> {
        let cache = QuipCache {
            cache_id: ID::default(),
            prompt_text: prompt.to_string(),
            provider: provider.to_string(),
            model: model.to_string(),
            created_at: self.ctx.now(),
        };
        db.insert_quip_cache(&cache).await?;
        for phrase_text in phrases {
            db.insert_quip_phrase(&QuipPhrase {
                phrase_id: ID::default(),
                cache_id: cache.cache_id,
                phrase_text,
                created_at: self.ctx.now(),
            })
            .await?;
        }
        Ok(cache)
    }

    // ------------------------------------------------------------------
    // Impostor cache (keyed by prompt round)
    // ------------------------------------------------------------------

    /// Get or build the impostor cache for a prompt round. Lock contention
    /// falls back to a cache built by the other holder.
    pub async fn impostor_cache<C: GenericClient + Sync>(
        &self,
        db: &C,
        prompt_round: &Round,
    ) -> GameResult<ImpostorCache> {
        let lock_name = LockName::content("impostor", prompt_round.round_id);
        for attempt in 0..3u32 {
            match self
                .ctx
                .locks
                .lock(lock_name.clone(), GENERATION_LOCK_TIMEOUT)
                .await
            {
                Ok(_guard) => return self.build_impostor_cache(db, prompt_round).await,
                Err(GameError::LockTimeout(_)) => {
                    if let Some(existing) =
                        db.impostor_cache_for_round(prompt_round.round_id).await?
                    {
                        return Ok(existing);
                    }
                    if attempt == 2 {
                        return Err(GameError::AiGenerationFailed(
                            "could not acquire generation lock and no cache exists".into(),
                        ));
                    }
                    tokio::time::sleep(Duration::from_millis(250 * u64::from(attempt + 1))).await;
                }
                Err(e) => return Err(e),
            }
        }
        unreachable!("lock retry loop returns")
    }

    async fn build_impostor_cache<C: GenericClient + Sync>(
        &self,
        db: &C,
        prompt_round: &Round,
    ) -> GameResult<ImpostorCache> {
        if let Some(existing) = db.impostor_cache_for_round(prompt_round.round_id).await? {
            return Ok(existing);
        }
        let original = prompt_round
            .submitted_phrase
            .clone()
            .ok_or_else(|| GameError::AiGenerationFailed("prompt has no phrase yet".into()))?;
        let other_copy = db.first_copy_phrase(prompt_round.round_id).await?;

        // Corpus equivalence sets first, filtered against phrases already
        // cached anywhere for this original.
        let equivalence: Vec<String> = self.impostor_corpus.impostors_for(&original);
        if !equivalence.is_empty() {
            let mut keys: Vec<String> = equivalence.iter().map(|p| p.to_lowercase()).collect();
            keys.push(original.to_lowercase());
            let used: HashSet<String> = db
                .impostor_phrases_for_originals(&keys)
                .await?
                .into_iter()
                .map(|p| p.to_lowercase())
                .collect();
            let mut validated = Vec::new();
            for candidate in equivalence {
                if used.contains(&candidate.to_lowercase()) {
                    continue;
                }
                if self
                    .ctx
                    .validator
                    .validate_copy(
                        &candidate,
                        &original,
                        other_copy.as_deref(),
                        Some(&prompt_round.prompt_text),
                    )
                    .await
                    .is_ok()
                {
                    validated.push(candidate);
                }
            }
            if validated.len() >= MIN_VALID_PHRASES {
                validated.truncate(MAX_CACHED_PHRASES);
                log::info!(
                    "[ai] built impostor cache for {} from corpus ({} phrases)",
                    prompt_round.round_id,
                    validated.len()
                );
                return self
                    .store_impostor_cache(
                        db,
                        prompt_round,
                        &original,
                        validated,
                        "csv_cache",
                        "pre_generated",
                    )
                    .await;
            }
        }

        // Provider path: up to two attempts, feeding the first valid phrase
        // back as the other copy so the second attempt diversifies.
        let mut other_copy = other_copy;
        let mut last_count = 0;
        for attempt in 0..2u32 {
            let ai_prompt =
                build_impostor_prompt(&original, other_copy.as_deref(), &self.free_words());
            let response = self
                .llm
                .generate_response(&ai_prompt, &self.model, self.llm_timeout())
                .await?;
            let mut validated: Vec<String> = Vec::new();
            for candidate in split_candidates(&response) {
                let candidate = candidate.to_uppercase();
                if validated.iter().any(|v| *v == candidate) {
                    continue;
                }
                if self
                    .ctx
                    .validator
                    .validate_copy(
                        &candidate,
                        &original,
                        other_copy.as_deref(),
                        Some(&prompt_round.prompt_text),
                    )
                    .await
                    .is_ok()
                {
                    validated.push(candidate);
                }
            }
            if validated.len() >= MIN_VALID_PHRASES {
                validated.truncate(MAX_CACHED_PHRASES);
                let provider = self.provider_label();
                let model = self.model.clone();
                return self
                    .store_impostor_cache(db, prompt_round, &original, validated, &provider, &model)
                    .await;
            }
            last_count = validated.len();
            if attempt == 0 && other_copy.is_none() {
                if let Some(first) = validated.into_iter().next() {
                    log::info!(
                        "[ai] retrying impostor generation with other_copy {:?}",
                        first
                    );
                    other_copy = Some(first);
                    continue;
                }
            }
            break;
        }
        Err(GameError::AiGenerationFailed(format!(
            "only {} valid impostor phrase(s) (need {}) for round {}",
            last_count, MIN_VALID_PHRASES, prompt_round.round_id
        )))
    }

    async fn store_impostor_cache<C: GenericClient + Sync>(
        &self,
        db: &C,
        prompt_round: &Round,
        original: &str,
        phrases: Vec<String>,
        provider: &str,
        model: &str,
    ) -> GameResult<ImpostorCache> {
        let cache = ImpostorCache {
            cache_id: ID::default(),
            prompt_round_id: prompt_round.round_id,
            original_phrase: original.to_string(),
            prompt_text: prompt_round.prompt_text.clone(),
            validated_phrases: phrases,
            provider: provider.to_string(),
            model: model.to_string(),
            used_for_backup_copy: false,
            used_for_hints: false,
            created_at: self.ctx.now(),
        };
        db.insert_impostor_cache(&cache).await?;
        Ok(cache)
    }

    /// Take a phrase for a backup copy. Phrases are removed on consumption
    /// so consecutive backups differ; an emptied cache is rebuilt.
    pub async fn consume_impostor_phrase<C: GenericClient + Sync>(
        &self,
        db: &C,
        prompt_round: &Round,
    ) -> GameResult<String> {
        let mut cache = self.impostor_cache(db, prompt_round).await?;
        if cache.validated_phrases.is_empty() {
            log::warn!(
                "[ai] impostor cache for {} is empty, regenerating",
                prompt_round.round_id
            );
            db.delete_impostor_cache(cache.cache_id).await?;
            cache = self.impostor_cache(db, prompt_round).await?;
        }
        if cache.validated_phrases.is_empty() {
            return Err(GameError::AiGenerationFailed("impostor cache empty".into()));
        }
        let index = rand::rng().random_range(0..cache.validated_phrases.len());
        let selected = cache.validated_phrases.remove(index);
        db.update_impostor_phrases(cache.cache_id, &cache.validated_phrases)
            .await?;
        db.mark_impostor_used(cache.cache_id, true, false).await?;
        log::info!(
            "[ai] served impostor {:?} ({} left in cache)",
            selected,
            cache.validated_phrases.len()
        );
        Ok(selected)
    }

    /// Hints reuse the same cache without consuming: every player sees the
    /// same three phrases.
    pub async fn hints<C: GenericClient + Sync>(
        &self,
        db: &C,
        prompt_round: &Round,
        count: usize,
    ) -> GameResult<Vec<String>> {
        if count == 0 {
            return Err(GameError::AiGenerationFailed("hint count must be >= 1".into()));
        }
        let cache = self.impostor_cache(db, prompt_round).await?;
        db.mark_impostor_used(cache.cache_id, false, true).await?;
        let hints: Vec<String> = cache.validated_phrases.iter().take(count).cloned().collect();
        if hints.is_empty() {
            return Err(GameError::AiGenerationFailed(
                "impostor cache has no phrases for hints".into(),
            ));
        }
        Ok(hints)
    }

    /// After the first human copy lands, every cached phrase must also
    /// clear the new other-copy constraint. Below the minimum the cache is
    /// torn down and rebuilt.
    pub async fn revalidate_after_first_copy<C: GenericClient + Sync>(
        &self,
        db: &C,
        prompt_round: &Round,
    ) -> GameResult<Option<ImpostorCache>> {
        let lock_name = LockName::content("impostor", prompt_round.round_id);
        let guard = self
            .ctx
            .locks
            .lock(lock_name, REVALIDATION_LOCK_TIMEOUT)
            .await;
        let _guard = match guard {
            Ok(guard) => guard,
            Err(GameError::LockTimeout(_)) => {
                log::warn!(
                    "[ai] revalidation lock busy for {}, skipping",
                    prompt_round.round_id
                );
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let Some(cache) = db.impostor_cache_for_round(prompt_round.round_id).await? else {
            return Ok(None);
        };
        let original = cache.original_phrase.clone();
        let other_copy = db.first_copy_phrase(prompt_round.round_id).await?;
        let mut surviving = Vec::new();
        for phrase in &cache.validated_phrases {
            if self
                .ctx
                .validator
                .validate_copy(
                    phrase,
                    &original,
                    other_copy.as_deref(),
                    Some(&prompt_round.prompt_text),
                )
                .await
                .is_ok()
            {
                surviving.push(phrase.clone());
            } else {
                log::info!("[ai] cached impostor invalidated by first copy: {:?}", phrase);
            }
        }
        if surviving.len() >= MIN_VALID_PHRASES {
            db.update_impostor_phrases(cache.cache_id, &surviving).await?;
            let mut updated = cache;
            updated.validated_phrases = surviving;
            return Ok(Some(updated));
        }
        log::info!(
            "[ai] impostor cache for {} fell below {} after revalidation, rebuilding",
            prompt_round.round_id,
            MIN_VALID_PHRASES
        );
        db.delete_impostor_cache(cache.cache_id).await?;
        drop(_guard);
        self.impostor_cache(db, prompt_round).await.map(Some)
    }

    // ------------------------------------------------------------------
    // Direct generation (votes, backronyms)
    // ------------------------------------------------------------------

    /// Choose which of the three phrases looks original. The shuffle is
    /// seeded per voter so repeated calls are reproducible.
    pub async fn generate_vote_choice(
        &self,
        phraseset: &Phraseset,
        seed: u64,
    ) -> GameResult<String> {
        let mut phrases = vec![
            phraseset.original_phrase.clone(),
            phraseset.copy_phrase_1.clone(),
            phraseset.copy_phrase_2.clone(),
        ];
        let mut rng = SmallRng::seed_from_u64(seed);
        phrases.shuffle(&mut rng);
        let prompt = build_vote_prompt(&phraseset.prompt_text, &phrases);
        let response = self
            .llm
            .generate_response(&prompt, &self.model, self.llm_timeout())
            .await?;
        let choice = parse_choice(&response, phrases.len());
        let chosen = phrases[choice].clone();
        log::info!(
            "[ai] voted {:?} ({})",
            chosen,
            if chosen == phraseset.original_phrase {
                "correct"
            } else {
                "fooled"
            }
        );
        Ok(chosen)
    }

    /// Generate a backronym for a word, padding or trimming the provider's
    /// response into exactly one well-formed word per letter.
    pub async fn generate_backronym(&self, word: &str) -> GameResult<Vec<String>> {
        let target: Vec<char> = word
            .chars()
            .filter(|c| c.is_alphabetic())
            .map(|c| c.to_ascii_uppercase())
            .collect();
        let prompt = build_backronym_prompt(word);
        let response = self
            .llm
            .generate_response(&prompt, &self.model, self.llm_timeout())
            .await?;
        let raw: Vec<String> = response.split_whitespace().map(str::to_string).collect();
        if raw.len() != target.len() {
            log::warn!(
                "[ai] backronym for {} came back with {} word(s), fixing up",
                word,
                raw.len()
            );
        }
        let mut words = Vec::with_capacity(target.len());
        for (index, letter) in target.iter().enumerate() {
            let candidate = raw
                .get(index)
                .map(|w| {
                    w.chars()
                        .filter(|c| c.is_alphabetic())
                        .collect::<String>()
                        .to_uppercase()
                })
                .unwrap_or_default();
            let fits = candidate.starts_with(*letter)
                && (2..=15).contains(&candidate.chars().count());
            words.push(if fits {
                candidate
            } else {
                fallback_word(*letter)
            });
        }
        Ok(words)
    }

    /// Pick a backronym entry to vote for.
    pub async fn generate_backronym_vote(
        &self,
        word: &str,
        entries: &[Vec<String>],
    ) -> GameResult<usize> {
        let rendered: Vec<String> = entries.iter().map(|words| words.join(" ")).collect();
        let prompt = build_backronym_vote_prompt(word, &rendered);
        let response = self
            .llm
            .generate_response(&prompt, &self.model, self.llm_timeout())
            .await?;
        Ok(parse_choice(&response, entries.len()))
    }
}

/// A well-formed word starting with the given letter.
fn fallback_word(letter: char) -> String {
    if !letter.is_ascii_alphabetic() {
        return "WORD".to_string();
    }
    let index = (letter.to_ascii_uppercase() as usize) - ('A' as usize);
    LETTER_WORDS[index].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_words_cover_the_alphabet() {
        for (index, letter) in ('A'..='Z').enumerate() {
            let word = fallback_word(letter);
            assert!(word.starts_with(letter), "{} -> {}", letter, word);
            assert_eq!(index, (letter as usize) - ('A' as usize));
        }
    }

    #[test]
    fn fallback_handles_junk_letters() {
        assert_eq!(fallback_word('?'), "WORD");
    }
}
