use std::str::FromStr;

use crate::Coins;
use crate::Similarity;

/// Parse an environment variable, falling back to the built-in default.
/// Malformed values are logged and ignored rather than aborting startup.
fn env_or<T: FromStr + Copy>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                log::warn!("ignoring malformed {}={:?}", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Every tunable the coordinator core consumes. Constructed once at startup
/// and handed to services through the coordinator context; no module-level
/// singletons.
#[derive(Debug, Clone)]
pub struct Settings {
    // Initial / bonus economy
    pub qf_starting_wallet: Coins,
    pub ir_initial_balance: Coins,
    pub tl_starting_balance: Coins,
    pub daily_bonus_amount: Coins,
    pub ir_daily_bonus_amount: Coins,
    pub tl_daily_bonus_amount: Coins,

    // Round pricing
    pub prompt_cost: Coins,
    pub copy_cost_normal: Coins,
    pub copy_cost_discount: Coins,
    pub vote_cost: Coins,
    pub hint_cost: Coins,
    pub ir_backronym_entry_cost: Coins,
    pub ir_vote_cost: Coins,
    pub tl_entry_cost: Coins,

    // Payouts
    pub prize_pool_base: Coins,
    pub vote_payout_correct: Coins,
    pub ir_vote_reward_correct: Coins,
    pub tl_max_payout: Coins,
    pub tl_payout_exponent: f64,
    pub tl_vault_rake_percent: i64,
    pub ir_vault_rake_percent: i64,
    pub qf_vault_rake_percent: i64,
    pub abandoned_penalty: Coins,

    // Timing
    pub prompt_round_seconds: u64,
    pub copy_round_seconds: u64,
    pub vote_round_seconds: u64,
    pub grace_period_seconds: u64,
    pub ir_rapid_entry_timer_minutes: u64,
    pub ir_rapid_voting_timer_minutes: u64,
    pub ir_standard_voting_timer_minutes: u64,
    pub ir_rapid_entry_timeout_minutes: u64,

    // QF vote finalization
    pub vote_max_votes: i64,
    pub vote_minimum_threshold: i64,
    pub vote_minimum_window_minutes: u64,
    pub vote_closing_threshold: i64,
    pub vote_closing_window_minutes: u64,

    // AI orchestration
    pub ai_backup_delay_minutes: u64,
    pub ai_backup_batch_size: usize,
    pub ai_backup_sleep_minutes: u64,
    pub ir_ai_backup_delay_minutes: u64,
    pub ai_stale_threshold_days: u64,
    pub ai_stale_check_interval_hours: u64,
    pub ai_timeout_seconds: u64,
    pub ai_provider: AiProvider,
    pub openai_api_key: String,
    pub gemini_api_key: String,
    pub ai_openai_model: String,
    pub ai_gemini_model: String,
    pub embedding_model: String,

    // Concurrency
    pub round_lock_timeout_seconds: u64,
    pub copy_round_max_attempts: usize,

    // TL matching
    pub tl_match_threshold: Similarity,
    pub tl_cluster_join_threshold: Similarity,
    pub tl_cluster_duplicate_threshold: Similarity,
    pub tl_topic_threshold: Similarity,
    pub tl_self_similarity_threshold: Similarity,
    pub tl_active_corpus_cap: usize,

    // Anti-abuse
    pub max_outstanding_quips: i64,
    pub guest_max_outstanding_quips: i64,
    pub guest_vote_lockout_threshold: i64,
    pub guest_vote_lockout_hours: u64,
    pub abandoned_prompt_cooldown_hours: u64,

    // Phrase validation shape
    pub phrase_min_words: usize,
    pub phrase_max_words: usize,
    pub phrase_max_length: usize,
    pub phrase_min_char_per_word: usize,
    pub phrase_max_char_per_word: usize,
    pub significant_word_min_length: usize,
}

/// Which LLM backend the content cache talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiProvider {
    OpenAi,
    Gemini,
    None,
}

impl FromStr for AiProvider {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "gemini" => Ok(Self::Gemini),
            "none" => Ok(Self::None),
            _ => Err(()),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            qf_starting_wallet: 5000,
            ir_initial_balance: 1000,
            tl_starting_balance: 1000,
            daily_bonus_amount: 100,
            ir_daily_bonus_amount: 100,
            tl_daily_bonus_amount: 100,

            prompt_cost: 100,
            copy_cost_normal: 50,
            copy_cost_discount: 40,
            vote_cost: 10,
            hint_cost: 10,
            ir_backronym_entry_cost: 100,
            ir_vote_cost: 10,
            tl_entry_cost: 100,

            prize_pool_base: 200,
            vote_payout_correct: 20,
            ir_vote_reward_correct: 20,
            tl_max_payout: 300,
            tl_payout_exponent: 1.5,
            tl_vault_rake_percent: 30,
            ir_vault_rake_percent: 30,
            qf_vault_rake_percent: 30,
            abandoned_penalty: 5,

            prompt_round_seconds: 180,
            copy_round_seconds: 180,
            vote_round_seconds: 60,
            grace_period_seconds: 5,
            ir_rapid_entry_timer_minutes: 2,
            ir_rapid_voting_timer_minutes: 2,
            ir_standard_voting_timer_minutes: 30,
            ir_rapid_entry_timeout_minutes: 30,

            vote_max_votes: 20,
            vote_minimum_threshold: 3,
            vote_minimum_window_minutes: 60,
            vote_closing_threshold: 5,
            vote_closing_window_minutes: 5,

            ai_backup_delay_minutes: 30,
            ai_backup_batch_size: 10,
            ai_backup_sleep_minutes: 30,
            ir_ai_backup_delay_minutes: 2,
            ai_stale_threshold_days: 2,
            ai_stale_check_interval_hours: 6,
            ai_timeout_seconds: 90,
            ai_provider: AiProvider::OpenAi,
            openai_api_key: String::new(),
            gemini_api_key: String::new(),
            ai_openai_model: "gpt-5-nano".to_string(),
            ai_gemini_model: "gemini-2.5-flash-lite".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),

            round_lock_timeout_seconds: 30,
            copy_round_max_attempts: 10,

            tl_match_threshold: 0.55,
            tl_cluster_join_threshold: 0.75,
            tl_cluster_duplicate_threshold: 0.90,
            tl_topic_threshold: 0.40,
            tl_self_similarity_threshold: 0.80,
            tl_active_corpus_cap: 1000,

            max_outstanding_quips: 10,
            guest_max_outstanding_quips: 3,
            guest_vote_lockout_threshold: 3,
            guest_vote_lockout_hours: 24,
            abandoned_prompt_cooldown_hours: 24,

            phrase_min_words: 2,
            phrase_max_words: 5,
            phrase_max_length: 100,
            phrase_min_char_per_word: 2,
            phrase_max_char_per_word: 15,
            significant_word_min_length: 4,
        }
    }
}

impl Settings {
    /// Load settings from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            qf_starting_wallet: env_or("QF_STARTING_WALLET", d.qf_starting_wallet),
            ir_initial_balance: env_or("IR_INITIAL_BALANCE", d.ir_initial_balance),
            tl_starting_balance: env_or("TL_STARTING_BALANCE", d.tl_starting_balance),
            daily_bonus_amount: env_or("DAILY_BONUS_AMOUNT", d.daily_bonus_amount),
            ir_daily_bonus_amount: env_or("IR_DAILY_BONUS_AMOUNT", d.ir_daily_bonus_amount),
            tl_daily_bonus_amount: env_or("TL_DAILY_BONUS_AMOUNT", d.tl_daily_bonus_amount),

            prompt_cost: env_or("PROMPT_COST", d.prompt_cost),
            copy_cost_normal: env_or("COPY_COST_NORMAL", d.copy_cost_normal),
            copy_cost_discount: env_or("COPY_COST_DISCOUNT", d.copy_cost_discount),
            vote_cost: env_or("VOTE_COST", d.vote_cost),
            hint_cost: env_or("HINT_COST", d.hint_cost),
            ir_backronym_entry_cost: env_or("IR_BACKRONYM_ENTRY_COST", d.ir_backronym_entry_cost),
            ir_vote_cost: env_or("IR_VOTE_COST", d.ir_vote_cost),
            tl_entry_cost: env_or("TL_ENTRY_COST", d.tl_entry_cost),

            prize_pool_base: env_or("PRIZE_POOL_BASE", d.prize_pool_base),
            vote_payout_correct: env_or("VOTE_PAYOUT_CORRECT", d.vote_payout_correct),
            ir_vote_reward_correct: env_or("IR_VOTE_REWARD_CORRECT", d.ir_vote_reward_correct),
            tl_max_payout: env_or("TL_MAX_PAYOUT", d.tl_max_payout),
            tl_payout_exponent: env_or("TL_PAYOUT_EXPONENT", d.tl_payout_exponent),
            tl_vault_rake_percent: env_or("TL_VAULT_RAKE_PERCENT", d.tl_vault_rake_percent),
            ir_vault_rake_percent: env_or("IR_VAULT_RAKE_PERCENT", d.ir_vault_rake_percent),
            qf_vault_rake_percent: env_or("QF_VAULT_RAKE_PERCENT", d.qf_vault_rake_percent),
            abandoned_penalty: env_or("ABANDONED_PENALTY", d.abandoned_penalty),

            prompt_round_seconds: env_or("PROMPT_ROUND_SECONDS", d.prompt_round_seconds),
            copy_round_seconds: env_or("COPY_ROUND_SECONDS", d.copy_round_seconds),
            vote_round_seconds: env_or("VOTE_ROUND_SECONDS", d.vote_round_seconds),
            grace_period_seconds: env_or("GRACE_PERIOD_SECONDS", d.grace_period_seconds),
            ir_rapid_entry_timer_minutes: env_or(
                "IR_RAPID_ENTRY_TIMER_MINUTES",
                d.ir_rapid_entry_timer_minutes,
            ),
            ir_rapid_voting_timer_minutes: env_or(
                "IR_RAPID_VOTING_TIMER_MINUTES",
                d.ir_rapid_voting_timer_minutes,
            ),
            ir_standard_voting_timer_minutes: env_or(
                "IR_STANDARD_VOTING_TIMER_MINUTES",
                d.ir_standard_voting_timer_minutes,
            ),
            ir_rapid_entry_timeout_minutes: env_or(
                "IR_RAPID_ENTRY_TIMEOUT_MINUTES",
                d.ir_rapid_entry_timeout_minutes,
            ),

            vote_max_votes: env_or("VOTE_MAX_VOTES", d.vote_max_votes),
            vote_minimum_threshold: env_or("VOTE_MINIMUM_THRESHOLD", d.vote_minimum_threshold),
            vote_minimum_window_minutes: env_or(
                "VOTE_MINIMUM_WINDOW_MINUTES",
                d.vote_minimum_window_minutes,
            ),
            vote_closing_threshold: env_or("VOTE_CLOSING_THRESHOLD", d.vote_closing_threshold),
            vote_closing_window_minutes: env_or(
                "VOTE_CLOSING_WINDOW_MINUTES",
                d.vote_closing_window_minutes,
            ),

            ai_backup_delay_minutes: env_or("AI_BACKUP_DELAY_MINUTES", d.ai_backup_delay_minutes),
            ai_backup_batch_size: env_or("AI_BACKUP_BATCH_SIZE", d.ai_backup_batch_size),
            ai_backup_sleep_minutes: env_or("AI_BACKUP_SLEEP_MINUTES", d.ai_backup_sleep_minutes),
            ir_ai_backup_delay_minutes: env_or(
                "IR_AI_BACKUP_DELAY_MINUTES",
                d.ir_ai_backup_delay_minutes,
            ),
            ai_stale_threshold_days: env_or("AI_STALE_THRESHOLD_DAYS", d.ai_stale_threshold_days),
            ai_stale_check_interval_hours: env_or(
                "AI_STALE_CHECK_INTERVAL_HOURS",
                d.ai_stale_check_interval_hours,
            ),
            ai_timeout_seconds: env_or("AI_TIMEOUT_SECONDS", d.ai_timeout_seconds),
            ai_provider: std::env::var("AI_PROVIDER")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(d.ai_provider),
            openai_api_key: env_string("OPENAI_API_KEY", &d.openai_api_key),
            gemini_api_key: env_string("GEMINI_API_KEY", &d.gemini_api_key),
            ai_openai_model: env_string("AI_OPENAI_MODEL", &d.ai_openai_model),
            ai_gemini_model: env_string("AI_GEMINI_MODEL", &d.ai_gemini_model),
            embedding_model: env_string("EMBEDDING_MODEL", &d.embedding_model),

            round_lock_timeout_seconds: env_or(
                "ROUND_LOCK_TIMEOUT_SECONDS",
                d.round_lock_timeout_seconds,
            ),
            copy_round_max_attempts: env_or("COPY_ROUND_MAX_ATTEMPTS", d.copy_round_max_attempts),

            tl_match_threshold: env_or("TL_MATCH_THRESHOLD", d.tl_match_threshold),
            tl_cluster_join_threshold: env_or(
                "TL_CLUSTER_JOIN_THRESHOLD",
                d.tl_cluster_join_threshold,
            ),
            tl_cluster_duplicate_threshold: env_or(
                "TL_CLUSTER_DUPLICATE_THRESHOLD",
                d.tl_cluster_duplicate_threshold,
            ),
            tl_topic_threshold: env_or("TL_TOPIC_THRESHOLD", d.tl_topic_threshold),
            tl_self_similarity_threshold: env_or(
                "TL_SELF_SIMILARITY_THRESHOLD",
                d.tl_self_similarity_threshold,
            ),
            tl_active_corpus_cap: env_or("TL_ACTIVE_CORPUS_CAP", d.tl_active_corpus_cap),

            max_outstanding_quips: env_or("MAX_OUTSTANDING_QUIPS", d.max_outstanding_quips),
            guest_max_outstanding_quips: env_or(
                "GUEST_MAX_OUTSTANDING_QUIPS",
                d.guest_max_outstanding_quips,
            ),
            guest_vote_lockout_threshold: env_or(
                "GUEST_VOTE_LOCKOUT_THRESHOLD",
                d.guest_vote_lockout_threshold,
            ),
            guest_vote_lockout_hours: env_or(
                "GUEST_VOTE_LOCKOUT_HOURS",
                d.guest_vote_lockout_hours,
            ),
            abandoned_prompt_cooldown_hours: env_or(
                "ABANDONED_PROMPT_COOLDOWN_HOURS",
                d.abandoned_prompt_cooldown_hours,
            ),

            phrase_min_words: env_or("PHRASE_MIN_WORDS", d.phrase_min_words),
            phrase_max_words: env_or("PHRASE_MAX_WORDS", d.phrase_max_words),
            phrase_max_length: env_or("PHRASE_MAX_LENGTH", d.phrase_max_length),
            phrase_min_char_per_word: env_or(
                "PHRASE_MIN_CHAR_PER_WORD",
                d.phrase_min_char_per_word,
            ),
            phrase_max_char_per_word: env_or(
                "PHRASE_MAX_CHAR_PER_WORD",
                d.phrase_max_char_per_word,
            ),
            significant_word_min_length: env_or(
                "SIGNIFICANT_WORD_MIN_LENGTH",
                d.significant_word_min_length,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_game_constants() {
        let s = Settings::default();
        assert_eq!(s.prompt_cost, 100);
        assert_eq!(s.copy_cost_normal, 50);
        assert_eq!(s.vote_cost, 10);
        assert_eq!(s.tl_max_payout, 300);
        assert_eq!(s.grace_period_seconds, 5);
        assert_eq!(s.tl_match_threshold, 0.55);
        assert_eq!(s.tl_active_corpus_cap, 1000);
    }
}
