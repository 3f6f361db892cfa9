use crate::Player;
use pf_core::ID;
use pf_core::Unique;
use pf_database::BACKRONYM_ENTRIES;
use pf_database::BACKRONYM_SETS;
use pf_database::BACKRONYM_VOTES;
use pf_database::BACKRONYM_WORDS;
use pf_database::PgErr;
use pf_database::Schema;
use std::time::SystemTime;
use tokio_postgres::GenericClient;
use tokio_postgres::Row;

/// IR set lifecycle. There is deliberately no `closing` state here: timer
/// driven finalization goes straight from voting to finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetStatus {
    Open,
    Voting,
    Finalized,
}

impl SetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Voting => "voting",
            Self::Finalized => "finalized",
        }
    }
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "voting" => Some(Self::Voting),
            "finalized" => Some(Self::Finalized),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrMode {
    Standard,
    Rapid,
}

impl IrMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Rapid => "rapid",
        }
    }
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "standard" => Some(Self::Standard),
            "rapid" => Some(Self::Rapid),
            _ => None,
        }
    }
}

/// A 5-entry backronym race for one random word.
#[derive(Debug, Clone)]
pub struct BackronymSet {
    pub set_id: ID<BackronymSet>,
    pub word: String,
    pub mode: IrMode,
    pub status: SetStatus,
    pub entry_count: i32,
    pub vote_count: i32,
    pub non_participant_vote_count: i32,
    pub created_at: SystemTime,
    pub last_human_entry_at: Option<SystemTime>,
    pub last_human_vote_at: Option<SystemTime>,
    pub first_participant_joined_at: Option<SystemTime>,
    pub transitions_to_voting_at: Option<SystemTime>,
    pub voting_finalized_at: Option<SystemTime>,
    pub finalized_at: Option<SystemTime>,
}

impl BackronymSet {
    pub fn new(word: String, mode: IrMode, now: SystemTime) -> Self {
        Self {
            set_id: ID::default(),
            word,
            mode,
            status: SetStatus::Open,
            entry_count: 0,
            vote_count: 0,
            non_participant_vote_count: 0,
            created_at: now,
            last_human_entry_at: None,
            last_human_vote_at: None,
            first_participant_joined_at: None,
            transitions_to_voting_at: None,
            voting_finalized_at: None,
            finalized_at: None,
        }
    }
}

impl Unique for BackronymSet {
    fn id(&self) -> ID<Self> {
        self.set_id
    }
}

impl From<Row> for BackronymSet {
    fn from(row: Row) -> Self {
        let status: String = row.get("status");
        let mode: String = row.get("mode");
        Self {
            set_id: ID::from(row.get::<_, uuid::Uuid>("set_id")),
            word: row.get("word"),
            mode: IrMode::parse(&mode).expect("valid ir mode"),
            status: SetStatus::parse(&status).expect("valid set status"),
            entry_count: row.get("entry_count"),
            vote_count: row.get("vote_count"),
            non_participant_vote_count: row.get("non_participant_vote_count"),
            created_at: row.get("created_at"),
            last_human_entry_at: row.get("last_human_entry_at"),
            last_human_vote_at: row.get("last_human_vote_at"),
            first_participant_joined_at: row.get("first_participant_joined_at"),
            transitions_to_voting_at: row.get("transitions_to_voting_at"),
            voting_finalized_at: row.get("voting_finalized_at"),
            finalized_at: row.get("finalized_at"),
        }
    }
}

impl Schema for BackronymSet {
    fn name() -> &'static str {
        BACKRONYM_SETS
    }
    fn creates() -> &'static str {
        const_format::concatcp!(
            "CREATE TABLE IF NOT EXISTS ",
            BACKRONYM_SETS,
            " (
                set_id                       UUID PRIMARY KEY,
                word                         TEXT NOT NULL,
                mode                         TEXT NOT NULL,
                status                       TEXT NOT NULL,
                entry_count                  INTEGER NOT NULL DEFAULT 0,
                vote_count                   INTEGER NOT NULL DEFAULT 0,
                non_participant_vote_count   INTEGER NOT NULL DEFAULT 0,
                created_at                   TIMESTAMPTZ NOT NULL,
                last_human_entry_at          TIMESTAMPTZ,
                last_human_vote_at           TIMESTAMPTZ,
                first_participant_joined_at  TIMESTAMPTZ,
                transitions_to_voting_at     TIMESTAMPTZ,
                voting_finalized_at          TIMESTAMPTZ,
                finalized_at                 TIMESTAMPTZ
            );"
        )
    }
    fn indices() -> &'static str {
        const_format::concatcp!(
            "CREATE INDEX IF NOT EXISTS backronym_sets_status ON ",
            BACKRONYM_SETS,
            " (status, created_at);"
        )
    }
}

/// One player's backronym words for a set.
#[derive(Debug, Clone)]
pub struct BackronymEntry {
    pub entry_id: ID<BackronymEntry>,
    pub set_id: ID<BackronymSet>,
    pub player_id: ID<Player>,
    pub backronym_text: Vec<String>,
    pub is_ai: bool,
    pub received_votes: i32,
    pub submitted_at: SystemTime,
}

impl From<Row> for BackronymEntry {
    fn from(row: Row) -> Self {
        Self {
            entry_id: ID::from(row.get::<_, uuid::Uuid>("entry_id")),
            set_id: ID::from(row.get::<_, uuid::Uuid>("set_id")),
            player_id: ID::from(row.get::<_, uuid::Uuid>("player_id")),
            backronym_text: row.get("backronym_text"),
            is_ai: row.get("is_ai"),
            received_votes: row.get("received_votes"),
            submitted_at: row.get("submitted_at"),
        }
    }
}

impl Schema for BackronymEntry {
    fn name() -> &'static str {
        BACKRONYM_ENTRIES
    }
    fn creates() -> &'static str {
        const_format::concatcp!(
            "CREATE TABLE IF NOT EXISTS ",
            BACKRONYM_ENTRIES,
            " (
                entry_id        UUID PRIMARY KEY,
                set_id          UUID NOT NULL,
                player_id       UUID NOT NULL,
                backronym_text  TEXT[] NOT NULL,
                is_ai           BOOLEAN NOT NULL DEFAULT FALSE,
                received_votes  INTEGER NOT NULL DEFAULT 0,
                submitted_at    TIMESTAMPTZ NOT NULL
            );"
        )
    }
    fn indices() -> &'static str {
        const_format::concatcp!(
            "CREATE INDEX IF NOT EXISTS backronym_entries_set ON ",
            BACKRONYM_ENTRIES,
            " (set_id);"
        )
    }
}

/// One vote inside a backronym set.
#[derive(Debug, Clone)]
pub struct BackronymVote {
    pub vote_id: ID<BackronymVote>,
    pub set_id: ID<BackronymSet>,
    pub player_id: ID<Player>,
    pub chosen_entry_id: ID<BackronymEntry>,
    pub is_participant_voter: bool,
    pub is_ai: bool,
    pub created_at: SystemTime,
}

impl From<Row> for BackronymVote {
    fn from(row: Row) -> Self {
        Self {
            vote_id: ID::from(row.get::<_, uuid::Uuid>("vote_id")),
            set_id: ID::from(row.get::<_, uuid::Uuid>("set_id")),
            player_id: ID::from(row.get::<_, uuid::Uuid>("player_id")),
            chosen_entry_id: ID::from(row.get::<_, uuid::Uuid>("chosen_entry_id")),
            is_participant_voter: row.get("is_participant_voter"),
            is_ai: row.get("is_ai"),
            created_at: row.get("created_at"),
        }
    }
}

impl Schema for BackronymVote {
    fn name() -> &'static str {
        BACKRONYM_VOTES
    }
    fn creates() -> &'static str {
        const_format::concatcp!(
            "CREATE TABLE IF NOT EXISTS ",
            BACKRONYM_VOTES,
            " (
                vote_id               UUID PRIMARY KEY,
                set_id                UUID NOT NULL,
                player_id             UUID NOT NULL,
                chosen_entry_id       UUID NOT NULL,
                is_participant_voter  BOOLEAN NOT NULL,
                is_ai                 BOOLEAN NOT NULL DEFAULT FALSE,
                created_at            TIMESTAMPTZ NOT NULL
            );"
        )
    }
    fn indices() -> &'static str {
        const_format::concatcp!(
            "CREATE INDEX IF NOT EXISTS backronym_votes_set ON ",
            BACKRONYM_VOTES,
            " (set_id);"
        )
    }
}

/// Marker type for word-usage rows (no entity struct needed).
pub struct BackronymWordUsage;

impl Schema for BackronymWordUsage {
    fn name() -> &'static str {
        BACKRONYM_WORDS
    }
    fn creates() -> &'static str {
        const_format::concatcp!(
            "CREATE TABLE IF NOT EXISTS ",
            BACKRONYM_WORDS,
            " (
                word     TEXT NOT NULL,
                set_id   UUID NOT NULL,
                used_at  TIMESTAMPTZ NOT NULL
            );"
        )
    }
    fn indices() -> &'static str {
        const_format::concatcp!(
            "CREATE INDEX IF NOT EXISTS backronym_words_used ON ",
            BACKRONYM_WORDS,
            " (word, used_at);"
        )
    }
}

#[allow(async_fn_in_trait)]
pub trait BackronymRepository {
    async fn insert_set(&self, set: &BackronymSet) -> Result<(), PgErr>;
    async fn set(&self, id: ID<BackronymSet>) -> Result<Option<BackronymSet>, PgErr>;
    async fn insert_entry(&self, entry: &BackronymEntry) -> Result<(), PgErr>;
    async fn insert_set_vote(&self, vote: &BackronymVote) -> Result<(), PgErr>;
    async fn entries(&self, id: ID<BackronymSet>) -> Result<Vec<BackronymEntry>, PgErr>;
    async fn set_votes(&self, id: ID<BackronymSet>) -> Result<Vec<BackronymVote>, PgErr>;
    async fn has_entry(&self, id: ID<BackronymSet>, player: ID<Player>) -> Result<bool, PgErr>;
    async fn has_set_vote(&self, id: ID<BackronymSet>, player: ID<Player>) -> Result<bool, PgErr>;
    /// Most recent open set with capacity the player has not entered.
    async fn available_set_for_entry(
        &self,
        exclude: ID<Player>,
        created_after: SystemTime,
    ) -> Result<Option<BackronymSet>, PgErr>;
    /// Compare-and-increment; returns false when the set was already full.
    async fn claim_entry_slot(&self, id: ID<BackronymSet>) -> Result<bool, PgErr>;
    async fn record_entry_effects(
        &self,
        id: ID<BackronymSet>,
        human: bool,
        now: SystemTime,
        first_join: bool,
        voting_timer: Option<SystemTime>,
    ) -> Result<(), PgErr>;
    async fn record_vote_effects(
        &self,
        id: ID<BackronymSet>,
        entry: ID<BackronymEntry>,
        human: bool,
        participant: bool,
        now: SystemTime,
    ) -> Result<(), PgErr>;
    /// Idempotent open → voting transition; true when this call flipped it.
    async fn set_voting_status(
        &self,
        id: ID<BackronymSet>,
        deadline: SystemTime,
    ) -> Result<bool, PgErr>;
    /// Idempotent voting → finalized transition; true when this call flipped it.
    async fn set_finalized_status(
        &self,
        id: ID<BackronymSet>,
        now: SystemTime,
    ) -> Result<bool, PgErr>;
    async fn stalled_open_sets(&self, cutoff: SystemTime) -> Result<Vec<BackronymSet>, PgErr>;
    async fn stalled_voting_sets(&self, cutoff: SystemTime) -> Result<Vec<BackronymSet>, PgErr>;
    /// Open sets whose entry timer has elapsed.
    async fn due_voting_transitions(&self, now: SystemTime) -> Result<Vec<BackronymSet>, PgErr>;
    /// Voting sets whose voting timer has elapsed.
    async fn due_finalizations(&self, now: SystemTime) -> Result<Vec<BackronymSet>, PgErr>;
    async fn word_used_since(&self, word: &str, cutoff: SystemTime) -> Result<bool, PgErr>;
    async fn record_word_usage(
        &self,
        word: &str,
        set: ID<BackronymSet>,
        now: SystemTime,
    ) -> Result<(), PgErr>;
}

impl<C: GenericClient + Sync> BackronymRepository for C {
    async fn insert_set(&self, set: &BackronymSet) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "INSERT INTO ",
                BACKRONYM_SETS,
                " (set_id, word, mode, status, entry_count, vote_count,
                   non_participant_vote_count, created_at, last_human_entry_at,
                   last_human_vote_at, first_participant_joined_at,
                   transitions_to_voting_at, voting_finalized_at, finalized_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"
            ),
            &[
                &set.set_id.inner(),
                &set.word,
                &set.mode.as_str(),
                &set.status.as_str(),
                &set.entry_count,
                &set.vote_count,
                &set.non_participant_vote_count,
                &set.created_at,
                &set.last_human_entry_at,
                &set.last_human_vote_at,
                &set.first_participant_joined_at,
                &set.transitions_to_voting_at,
                &set.voting_finalized_at,
                &set.finalized_at,
            ],
        )
        .await
        .map(|_| ())
    }

    async fn set(&self, id: ID<BackronymSet>) -> Result<Option<BackronymSet>, PgErr> {
        self.query_opt(
            const_format::concatcp!("SELECT * FROM ", BACKRONYM_SETS, " WHERE set_id = $1"),
            &[&id.inner()],
        )
        .await
        .map(|opt| opt.map(BackronymSet::from))
    }

    async fn insert_entry(&self, entry: &BackronymEntry) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "INSERT INTO ",
                BACKRONYM_ENTRIES,
                " (entry_id, set_id, player_id, backronym_text, is_ai, received_votes,
                   submitted_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)"
            ),
            &[
                &entry.entry_id.inner(),
                &entry.set_id.inner(),
                &entry.player_id.inner(),
                &entry.backronym_text,
                &entry.is_ai,
                &entry.received_votes,
                &entry.submitted_at,
            ],
        )
        .await
        .map(|_| ())
    }

    async fn insert_set_vote(&self, vote: &BackronymVote) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "INSERT INTO ",
                BACKRONYM_VOTES,
                " (vote_id, set_id, player_id, chosen_entry_id, is_participant_voter,
                   is_ai, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)"
            ),
            &[
                &vote.vote_id.inner(),
                &vote.set_id.inner(),
                &vote.player_id.inner(),
                &vote.chosen_entry_id.inner(),
                &vote.is_participant_voter,
                &vote.is_ai,
                &vote.created_at,
            ],
        )
        .await
        .map(|_| ())
    }

    async fn entries(&self, id: ID<BackronymSet>) -> Result<Vec<BackronymEntry>, PgErr> {
        self.query(
            const_format::concatcp!(
                "SELECT * FROM ",
                BACKRONYM_ENTRIES,
                " WHERE set_id = $1 ORDER BY submitted_at ASC"
            ),
            &[&id.inner()],
        )
        .await
        .map(|rows| rows.into_iter().map(BackronymEntry::from).collect())
    }

    async fn set_votes(&self, id: ID<BackronymSet>) -> Result<Vec<BackronymVote>, PgErr> {
        self.query(
            const_format::concatcp!(
                "SELECT * FROM ",
                BACKRONYM_VOTES,
                " WHERE set_id = $1 ORDER BY created_at ASC"
            ),
            &[&id.inner()],
        )
        .await
        .map(|rows| rows.into_iter().map(BackronymVote::from).collect())
    }

    async fn has_entry(&self, id: ID<BackronymSet>, player: ID<Player>) -> Result<bool, PgErr> {
        self.query_opt(
            const_format::concatcp!(
                "SELECT 1 FROM ",
                BACKRONYM_ENTRIES,
                " WHERE set_id = $1 AND player_id = $2 LIMIT 1"
            ),
            &[&id.inner(), &player.inner()],
        )
        .await
        .map(|opt| opt.is_some())
    }

    async fn has_set_vote(&self, id: ID<BackronymSet>, player: ID<Player>) -> Result<bool, PgErr> {
        self.query_opt(
            const_format::concatcp!(
                "SELECT 1 FROM ",
                BACKRONYM_VOTES,
                " WHERE set_id = $1 AND player_id = $2 LIMIT 1"
            ),
            &[&id.inner(), &player.inner()],
        )
        .await
        .map(|opt| opt.is_some())
    }

    async fn available_set_for_entry(
        &self,
        exclude: ID<Player>,
        created_after: SystemTime,
    ) -> Result<Option<BackronymSet>, PgErr> {
        self.query_opt(
            const_format::concatcp!(
                "SELECT * FROM ",
                BACKRONYM_SETS,
                " WHERE status = 'open' AND entry_count < 5 AND created_at >= $2
                   AND set_id NOT IN (
                     SELECT set_id FROM ",
                BACKRONYM_ENTRIES,
                "     WHERE player_id = $1
                   )
                 ORDER BY created_at DESC LIMIT 1"
            ),
            &[&exclude.inner(), &created_after],
        )
        .await
        .map(|opt| opt.map(BackronymSet::from))
    }

    async fn claim_entry_slot(&self, id: ID<BackronymSet>) -> Result<bool, PgErr> {
        self.execute(
            const_format::concatcp!(
                "UPDATE ",
                BACKRONYM_SETS,
                " SET entry_count = entry_count + 1
                 WHERE set_id = $1 AND status = 'open' AND entry_count < 5"
            ),
            &[&id.inner()],
        )
        .await
        .map(|n| n > 0)
    }

    async fn record_entry_effects(
        &self,
        id: ID<BackronymSet>,
        human: bool,
        now: SystemTime,
        first_join: bool,
        voting_timer: Option<SystemTime>,
    ) -> Result<(), PgErr> {
        if human {
            self.execute(
                const_format::concatcp!(
                    "UPDATE ",
                    BACKRONYM_SETS,
                    " SET last_human_entry_at = $2,
                          first_participant_joined_at =
                              CASE WHEN $3 THEN COALESCE(first_participant_joined_at, $2)
                                   ELSE first_participant_joined_at END,
                          transitions_to_voting_at = COALESCE($4, transitions_to_voting_at)
                     WHERE set_id = $1"
                ),
                &[&id.inner(), &now, &first_join, &voting_timer],
            )
            .await?;
        }
        Ok(())
    }

    async fn record_vote_effects(
        &self,
        id: ID<BackronymSet>,
        entry: ID<BackronymEntry>,
        human: bool,
        participant: bool,
        now: SystemTime,
    ) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "UPDATE ",
                BACKRONYM_SETS,
                " SET vote_count = vote_count + 1,
                      non_participant_vote_count = non_participant_vote_count
                          + CASE WHEN $3 THEN 0 ELSE 1 END,
                      last_human_vote_at = CASE WHEN $4 THEN $2 ELSE last_human_vote_at END
                 WHERE set_id = $1"
            ),
            &[&id.inner(), &now, &participant, &human],
        )
        .await?;
        self.execute(
            const_format::concatcp!(
                "UPDATE ",
                BACKRONYM_ENTRIES,
                " SET received_votes = received_votes + 1 WHERE entry_id = $1"
            ),
            &[&entry.inner()],
        )
        .await
        .map(|_| ())
    }

    async fn set_voting_status(
        &self,
        id: ID<BackronymSet>,
        deadline: SystemTime,
    ) -> Result<bool, PgErr> {
        self.execute(
            const_format::concatcp!(
                "UPDATE ",
                BACKRONYM_SETS,
                " SET status = 'voting', voting_finalized_at = $2
                 WHERE set_id = $1 AND status = 'open'"
            ),
            &[&id.inner(), &deadline],
        )
        .await
        .map(|n| n > 0)
    }

    async fn set_finalized_status(
        &self,
        id: ID<BackronymSet>,
        now: SystemTime,
    ) -> Result<bool, PgErr> {
        self.execute(
            const_format::concatcp!(
                "UPDATE ",
                BACKRONYM_SETS,
                " SET status = 'finalized', finalized_at = $2
                 WHERE set_id = $1 AND status = 'voting'"
            ),
            &[&id.inner(), &now],
        )
        .await
        .map(|n| n > 0)
    }

    async fn stalled_open_sets(&self, cutoff: SystemTime) -> Result<Vec<BackronymSet>, PgErr> {
        self.query(
            const_format::concatcp!(
                "SELECT * FROM ",
                BACKRONYM_SETS,
                " WHERE status = 'open' AND entry_count < 5 AND created_at <= $1
                 ORDER BY created_at ASC"
            ),
            &[&cutoff],
        )
        .await
        .map(|rows| rows.into_iter().map(BackronymSet::from).collect())
    }

    async fn stalled_voting_sets(&self, cutoff: SystemTime) -> Result<Vec<BackronymSet>, PgErr> {
        self.query(
            const_format::concatcp!(
                "SELECT * FROM ",
                BACKRONYM_SETS,
                " WHERE status = 'voting' AND vote_count < 5
                   AND COALESCE(first_participant_joined_at, created_at) <= $1
                 ORDER BY created_at ASC"
            ),
            &[&cutoff],
        )
        .await
        .map(|rows| rows.into_iter().map(BackronymSet::from).collect())
    }

    async fn due_voting_transitions(&self, now: SystemTime) -> Result<Vec<BackronymSet>, PgErr> {
        self.query(
            const_format::concatcp!(
                "SELECT * FROM ",
                BACKRONYM_SETS,
                " WHERE status = 'open' AND transitions_to_voting_at IS NOT NULL
                   AND transitions_to_voting_at <= $1"
            ),
            &[&now],
        )
        .await
        .map(|rows| rows.into_iter().map(BackronymSet::from).collect())
    }

    async fn due_finalizations(&self, now: SystemTime) -> Result<Vec<BackronymSet>, PgErr> {
        self.query(
            const_format::concatcp!(
                "SELECT * FROM ",
                BACKRONYM_SETS,
                " WHERE status = 'voting' AND voting_finalized_at IS NOT NULL
                   AND voting_finalized_at <= $1"
            ),
            &[&now],
        )
        .await
        .map(|rows| rows.into_iter().map(BackronymSet::from).collect())
    }

    async fn word_used_since(&self, word: &str, cutoff: SystemTime) -> Result<bool, PgErr> {
        self.query_opt(
            const_format::concatcp!(
                "SELECT 1 FROM ",
                BACKRONYM_WORDS,
                " WHERE word = $1 AND used_at >= $2 LIMIT 1"
            ),
            &[&word, &cutoff],
        )
        .await
        .map(|opt| opt.is_some())
    }

    async fn record_word_usage(
        &self,
        word: &str,
        set: ID<BackronymSet>,
        now: SystemTime,
    ) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "INSERT INTO ",
                BACKRONYM_WORDS,
                " (word, set_id, used_at) VALUES ($1, $2, $3)"
            ),
            &[&word, &set.inner(), &now],
        )
        .await
        .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ir_status_has_no_closing_state() {
        assert_eq!(SetStatus::parse("closing"), None);
        for s in [SetStatus::Open, SetStatus::Voting, SetStatus::Finalized] {
            assert_eq!(SetStatus::parse(s.as_str()), Some(s));
        }
    }

    #[test]
    fn new_set_starts_open_and_empty() {
        let set = BackronymSet::new("FROG".into(), IrMode::Rapid, SystemTime::UNIX_EPOCH);
        assert_eq!(set.status, SetStatus::Open);
        assert_eq!(set.entry_count, 0);
        assert!(set.transitions_to_voting_at.is_none());
    }
}
