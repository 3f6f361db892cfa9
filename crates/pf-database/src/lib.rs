//! Database plumbing for the coordinator.
//!
//! ## Connectivity
//!
//! - [`db()`] — Establishes a shared connection from `DB_URL`
//! - [`Database`] — Opens one connection per unit of work, the pattern used
//!   by parallel AI submission tasks that each need an isolated session
//!
//! ## Serialization
//!
//! - [`Schema`] — Table metadata and DDL generation per persisted entity
//!
//! ## Table Names
//!
//! Constants for all persistent entities: players, rounds, phrasesets,
//! backronym sets, TL corpora, ledgers, party sessions, and caches.
mod traits;

pub use traits::*;

use std::sync::Arc;
use tokio_postgres::Client;

/// PostgreSQL error type alias.
pub type PgErr = tokio_postgres::Error;

/// Establishes a shared database connection.
///
/// Connects to PostgreSQL using the `DB_URL` environment variable and
/// returns an `Arc<Client>` suitable for sharing across async tasks.
///
/// # Panics
///
/// Panics if `DB_URL` is not set or if connection fails.
pub async fn db() -> Arc<Client> {
    log::info!("connecting to database");
    let ref url = std::env::var("DB_URL").expect("DB_URL must be set");
    Arc::new(connect(url).await.expect("database connection failed"))
}

async fn connect(url: &str) -> Result<Client, PgErr> {
    let tls = tokio_postgres::tls::NoTls;
    let (client, connection) = tokio_postgres::connect(url, tls).await?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            log::error!("database connection error: {}", e);
        }
    });
    client
        .execute("SET client_min_messages TO WARNING", &[])
        .await?;
    Ok(client)
}

/// Connection factory handing out one client per unit of work.
///
/// Concurrent tasks must not share a session; each AI submission task, each
/// sweeper pass, and each request handler borrows its own client and opens
/// its own transactions on it.
#[derive(Clone)]
pub struct Database {
    url: String,
}

impl Database {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
    pub fn from_env() -> Self {
        Self::new(std::env::var("DB_URL").expect("DB_URL must be set"))
    }
    /// Open a fresh session. The caller owns it for the duration of its
    /// unit of work and drops it afterwards.
    pub async fn session(&self) -> Result<Client, PgErr> {
        connect(&self.url).await
    }
}

/// Table for player accounts.
#[rustfmt::skip]
pub const PLAYERS:            &str = "players";
/// Table for per-game wallet/vault subrecords.
#[rustfmt::skip]
pub const PLAYER_GAME_DATA:   &str = "player_game_data";
/// Table for billable rounds across all games.
#[rustfmt::skip]
pub const ROUNDS:             &str = "rounds";
/// Table for completed prompt+copies triples open for voting.
#[rustfmt::skip]
pub const PHRASESETS:         &str = "phrasesets";
/// Table for individual votes on phrasesets.
#[rustfmt::skip]
pub const VOTES:              &str = "votes";
/// Table for IR backronym sets.
#[rustfmt::skip]
pub const BACKRONYM_SETS:     &str = "backronym_sets";
/// Table for entries within a backronym set.
#[rustfmt::skip]
pub const BACKRONYM_ENTRIES:  &str = "backronym_entries";
/// Table for votes within a backronym set.
#[rustfmt::skip]
pub const BACKRONYM_VOTES:    &str = "backronym_votes";
/// Table tracking recent word usage for set creation.
#[rustfmt::skip]
pub const BACKRONYM_WORDS:    &str = "backronym_words";
/// Table for TL prompts.
#[rustfmt::skip]
pub const TL_PROMPTS:         &str = "tl_prompts";
/// Table for the TL answer corpus.
#[rustfmt::skip]
pub const TL_ANSWERS:         &str = "tl_answers";
/// Table for TL semantic clusters.
#[rustfmt::skip]
pub const TL_CLUSTERS:        &str = "tl_clusters";
/// Table for TL guessing rounds with frozen snapshots.
#[rustfmt::skip]
pub const TL_ROUNDS:          &str = "tl_rounds";
/// Table for guesses within TL rounds.
#[rustfmt::skip]
pub const TL_GUESSES:         &str = "tl_guesses";
/// Table for the money ledger.
#[rustfmt::skip]
pub const TRANSACTIONS:       &str = "transactions";
/// Table for party sessions.
#[rustfmt::skip]
pub const PARTY_SESSIONS:     &str = "party_sessions";
/// Table for party participants.
#[rustfmt::skip]
pub const PARTY_PARTICIPANTS: &str = "party_participants";
/// Table linking rounds to party sessions.
#[rustfmt::skip]
pub const PARTY_ROUNDS:       &str = "party_rounds";
/// Table linking phrasesets to party sessions.
#[rustfmt::skip]
pub const PARTY_PHRASESETS:   &str = "party_phrasesets";
/// Table for per-prompt quip caches.
#[rustfmt::skip]
pub const QUIP_CACHES:        &str = "ai_quip_caches";
/// Table for phrases inside a quip cache.
#[rustfmt::skip]
pub const QUIP_PHRASES:       &str = "ai_quip_phrases";
/// Table for quip phrase usage records.
#[rustfmt::skip]
pub const QUIP_USAGE:         &str = "ai_quip_phrase_usage";
/// Table for per-prompt-round impostor caches.
#[rustfmt::skip]
pub const IMPOSTOR_CACHES:    &str = "ai_impostor_caches";
/// Table for the persistent embedding cache.
#[rustfmt::skip]
pub const EMBEDDINGS:         &str = "phrase_embeddings";
/// Table for daily bonus claims.
#[rustfmt::skip]
pub const DAILY_BONUSES:      &str = "daily_bonuses";
/// Table for idempotent result views.
#[rustfmt::skip]
pub const RESULT_VIEWS:       &str = "result_views";
