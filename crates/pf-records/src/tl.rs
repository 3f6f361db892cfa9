use crate::Player;
use pf_core::Coins;
use pf_core::Component;
use pf_core::ID;
use pf_core::Unique;
use pf_database::PgErr;
use pf_database::Schema;
use pf_database::TL_ANSWERS;
use pf_database::TL_CLUSTERS;
use pf_database::TL_GUESSES;
use pf_database::TL_PROMPTS;
use pf_database::TL_ROUNDS;
use std::time::SystemTime;
use tokio_postgres::GenericClient;
use tokio_postgres::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlRoundStatus {
    Active,
    Completed,
    Abandoned,
}

impl TlRoundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
        }
    }
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "abandoned" => Some(Self::Abandoned),
            _ => None,
        }
    }
}

/// A TL prompt against which answers accumulate.
#[derive(Debug, Clone)]
pub struct TlPrompt {
    pub prompt_id: ID<TlPrompt>,
    pub text: String,
    pub is_active: bool,
    pub created_at: SystemTime,
}

impl Unique for TlPrompt {
    fn id(&self) -> ID<Self> {
        self.prompt_id
    }
}

impl From<Row> for TlPrompt {
    fn from(row: Row) -> Self {
        Self {
            prompt_id: ID::from(row.get::<_, uuid::Uuid>("prompt_id")),
            text: row.get("text"),
            is_active: row.get("is_active"),
            created_at: row.get("created_at"),
        }
    }
}

impl Schema for TlPrompt {
    fn name() -> &'static str {
        TL_PROMPTS
    }
    fn creates() -> &'static str {
        const_format::concatcp!(
            "CREATE TABLE IF NOT EXISTS ",
            TL_PROMPTS,
            " (
                prompt_id   UUID PRIMARY KEY,
                text        TEXT NOT NULL,
                is_active   BOOLEAN NOT NULL DEFAULT TRUE,
                created_at  TIMESTAMPTZ NOT NULL
            );"
        )
    }
}

/// One answer in the TL corpus, with its embedding and usage stats.
#[derive(Debug, Clone)]
pub struct TlAnswer {
    pub answer_id: ID<TlAnswer>,
    pub prompt_id: ID<TlPrompt>,
    pub text: String,
    pub embedding: Vec<Component>,
    pub cluster_id: Option<ID<TlCluster>>,
    /// Distinct players who gave this answer, capped for weighting.
    pub answer_players_count: i32,
    pub shows: i32,
    pub contributed_matches: i32,
    pub is_active: bool,
    pub created_at: SystemTime,
}

impl Unique for TlAnswer {
    fn id(&self) -> ID<Self> {
        self.answer_id
    }
}

impl From<Row> for TlAnswer {
    fn from(row: Row) -> Self {
        Self {
            answer_id: ID::from(row.get::<_, uuid::Uuid>("answer_id")),
            prompt_id: ID::from(row.get::<_, uuid::Uuid>("prompt_id")),
            text: row.get("text"),
            embedding: row.get("embedding"),
            cluster_id: row.get::<_, Option<uuid::Uuid>>("cluster_id").map(ID::from),
            answer_players_count: row.get("answer_players_count"),
            shows: row.get("shows"),
            contributed_matches: row.get("contributed_matches"),
            is_active: row.get("is_active"),
            created_at: row.get("created_at"),
        }
    }
}

impl Schema for TlAnswer {
    fn name() -> &'static str {
        TL_ANSWERS
    }
    fn creates() -> &'static str {
        const_format::concatcp!(
            "CREATE TABLE IF NOT EXISTS ",
            TL_ANSWERS,
            " (
                answer_id             UUID PRIMARY KEY,
                prompt_id             UUID NOT NULL,
                text                  TEXT NOT NULL,
                embedding             REAL[] NOT NULL,
                cluster_id            UUID,
                answer_players_count  INTEGER NOT NULL DEFAULT 1,
                shows                 INTEGER NOT NULL DEFAULT 0,
                contributed_matches   INTEGER NOT NULL DEFAULT 0,
                is_active             BOOLEAN NOT NULL DEFAULT TRUE,
                created_at            TIMESTAMPTZ NOT NULL
            );"
        )
    }
    fn indices() -> &'static str {
        const_format::concatcp!(
            "CREATE INDEX IF NOT EXISTS tl_answers_prompt_active ON ",
            TL_ANSWERS,
            " (prompt_id, is_active);
             CREATE INDEX IF NOT EXISTS tl_answers_cluster ON ",
            TL_ANSWERS,
            " (cluster_id);"
        )
    }
}

/// A semantic cluster of answers under one prompt. The centroid is the
/// running arithmetic mean of member embeddings; cluster identity is stable
/// even as the centroid drifts.
#[derive(Debug, Clone)]
pub struct TlCluster {
    pub cluster_id: ID<TlCluster>,
    pub prompt_id: ID<TlPrompt>,
    pub centroid: Vec<Component>,
    pub size: i32,
    pub example_answer_id: ID<TlAnswer>,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

impl Unique for TlCluster {
    fn id(&self) -> ID<Self> {
        self.cluster_id
    }
}

impl From<Row> for TlCluster {
    fn from(row: Row) -> Self {
        Self {
            cluster_id: ID::from(row.get::<_, uuid::Uuid>("cluster_id")),
            prompt_id: ID::from(row.get::<_, uuid::Uuid>("prompt_id")),
            centroid: row.get("centroid"),
            size: row.get("size"),
            example_answer_id: ID::from(row.get::<_, uuid::Uuid>("example_answer_id")),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

impl Schema for TlCluster {
    fn name() -> &'static str {
        TL_CLUSTERS
    }
    fn creates() -> &'static str {
        const_format::concatcp!(
            "CREATE TABLE IF NOT EXISTS ",
            TL_CLUSTERS,
            " (
                cluster_id         UUID PRIMARY KEY,
                prompt_id          UUID NOT NULL,
                centroid           REAL[] NOT NULL,
                size               INTEGER NOT NULL CHECK (size >= 1),
                example_answer_id  UUID NOT NULL,
                created_at         TIMESTAMPTZ NOT NULL,
                updated_at         TIMESTAMPTZ NOT NULL
            );"
        )
    }
    fn indices() -> &'static str {
        const_format::concatcp!(
            "CREATE INDEX IF NOT EXISTS tl_clusters_prompt ON ",
            TL_CLUSTERS,
            " (prompt_id);"
        )
    }
}

/// A TL guessing round with its frozen snapshot.
#[derive(Debug, Clone)]
pub struct TlRound {
    pub round_id: ID<TlRound>,
    pub player_id: ID<Player>,
    pub prompt_id: ID<TlPrompt>,
    pub snapshot_answer_ids: Vec<uuid::Uuid>,
    pub snapshot_cluster_ids: Vec<uuid::Uuid>,
    pub snapshot_total_weight: f64,
    pub matched_clusters: Vec<uuid::Uuid>,
    pub strikes: i32,
    pub status: TlRoundStatus,
    pub final_coverage: Option<f64>,
    pub gross_payout: Option<Coins>,
    pub created_at: SystemTime,
    pub ended_at: Option<SystemTime>,
}

impl Unique for TlRound {
    fn id(&self) -> ID<Self> {
        self.round_id
    }
}

impl From<Row> for TlRound {
    fn from(row: Row) -> Self {
        let status: String = row.get("status");
        Self {
            round_id: ID::from(row.get::<_, uuid::Uuid>("round_id")),
            player_id: ID::from(row.get::<_, uuid::Uuid>("player_id")),
            prompt_id: ID::from(row.get::<_, uuid::Uuid>("prompt_id")),
            snapshot_answer_ids: row.get("snapshot_answer_ids"),
            snapshot_cluster_ids: row.get("snapshot_cluster_ids"),
            snapshot_total_weight: row.get("snapshot_total_weight"),
            matched_clusters: row.get("matched_clusters"),
            strikes: row.get("strikes"),
            status: TlRoundStatus::parse(&status).expect("valid tl round status"),
            final_coverage: row.get("final_coverage"),
            gross_payout: row.get("gross_payout"),
            created_at: row.get("created_at"),
            ended_at: row.get("ended_at"),
        }
    }
}

impl Schema for TlRound {
    fn name() -> &'static str {
        TL_ROUNDS
    }
    fn creates() -> &'static str {
        const_format::concatcp!(
            "CREATE TABLE IF NOT EXISTS ",
            TL_ROUNDS,
            " (
                round_id               UUID PRIMARY KEY,
                player_id              UUID NOT NULL,
                prompt_id              UUID NOT NULL,
                snapshot_answer_ids    UUID[] NOT NULL,
                snapshot_cluster_ids   UUID[] NOT NULL,
                snapshot_total_weight  DOUBLE PRECISION NOT NULL,
                matched_clusters       UUID[] NOT NULL DEFAULT '{}',
                strikes                INTEGER NOT NULL DEFAULT 0,
                status                 TEXT NOT NULL,
                final_coverage         DOUBLE PRECISION,
                gross_payout           BIGINT,
                created_at             TIMESTAMPTZ NOT NULL,
                ended_at               TIMESTAMPTZ
            );"
        )
    }
    fn indices() -> &'static str {
        const_format::concatcp!(
            "CREATE INDEX IF NOT EXISTS tl_rounds_player_status ON ",
            TL_ROUNDS,
            " (player_id, status);"
        )
    }
}

/// One guess inside a TL round.
#[derive(Debug, Clone)]
pub struct TlGuess {
    pub guess_id: ID<TlGuess>,
    pub round_id: ID<TlRound>,
    pub text: String,
    pub embedding: Vec<Component>,
    pub was_match: bool,
    pub matched_cluster_ids: Vec<uuid::Uuid>,
    pub caused_strike: bool,
    pub created_at: SystemTime,
}

impl From<Row> for TlGuess {
    fn from(row: Row) -> Self {
        Self {
            guess_id: ID::from(row.get::<_, uuid::Uuid>("guess_id")),
            round_id: ID::from(row.get::<_, uuid::Uuid>("round_id")),
            text: row.get("text"),
            embedding: row.get("embedding"),
            was_match: row.get("was_match"),
            matched_cluster_ids: row.get("matched_cluster_ids"),
            caused_strike: row.get("caused_strike"),
            created_at: row.get("created_at"),
        }
    }
}

impl Schema for TlGuess {
    fn name() -> &'static str {
        TL_GUESSES
    }
    fn creates() -> &'static str {
        const_format::concatcp!(
            "CREATE TABLE IF NOT EXISTS ",
            TL_GUESSES,
            " (
                guess_id             UUID PRIMARY KEY,
                round_id             UUID NOT NULL,
                text                 TEXT NOT NULL,
                embedding            REAL[] NOT NULL,
                was_match            BOOLEAN NOT NULL,
                matched_cluster_ids  UUID[] NOT NULL DEFAULT '{}',
                caused_strike        BOOLEAN NOT NULL,
                created_at           TIMESTAMPTZ NOT NULL
            );"
        )
    }
    fn indices() -> &'static str {
        const_format::concatcp!(
            "CREATE INDEX IF NOT EXISTS tl_guesses_round ON ",
            TL_GUESSES,
            " (round_id);"
        )
    }
}

#[allow(async_fn_in_trait)]
pub trait TlRepository {
    async fn insert_prompt(&self, prompt: &TlPrompt) -> Result<(), PgErr>;
    async fn prompt(&self, id: ID<TlPrompt>) -> Result<Option<TlPrompt>, PgErr>;
    async fn random_active_prompt(&self) -> Result<Option<TlPrompt>, PgErr>;
    async fn insert_answer(&self, answer: &TlAnswer) -> Result<(), PgErr>;
    async fn active_answers(&self, prompt: ID<TlPrompt>, limit: i64)
    -> Result<Vec<TlAnswer>, PgErr>;
    async fn answers_by_ids(&self, ids: &[uuid::Uuid]) -> Result<Vec<TlAnswer>, PgErr>;
    /// Active answers belonging to any of the given clusters.
    async fn active_answers_in_clusters(
        &self,
        cluster_ids: &[uuid::Uuid],
    ) -> Result<Vec<TlAnswer>, PgErr>;
    async fn deactivate_answer(&self, id: ID<TlAnswer>) -> Result<(), PgErr>;
    async fn insert_cluster(&self, cluster: &TlCluster) -> Result<(), PgErr>;
    async fn clusters_for_prompt(&self, prompt: ID<TlPrompt>) -> Result<Vec<TlCluster>, PgErr>;
    async fn update_centroid(
        &self,
        id: ID<TlCluster>,
        centroid: &[Component],
        size: i32,
        now: SystemTime,
    ) -> Result<(), PgErr>;
    async fn set_answer_cluster(
        &self,
        answer: ID<TlAnswer>,
        cluster: ID<TlCluster>,
    ) -> Result<(), PgErr>;
    async fn insert_tl_round(&self, round: &TlRound) -> Result<(), PgErr>;
    async fn tl_round(&self, id: ID<TlRound>) -> Result<Option<TlRound>, PgErr>;
    async fn active_tl_round(&self, player: ID<Player>) -> Result<Option<TlRound>, PgErr>;
    async fn update_round_progress(
        &self,
        id: ID<TlRound>,
        matched_clusters: &[uuid::Uuid],
        strikes: i32,
    ) -> Result<(), PgErr>;
    async fn finalize_tl_round(
        &self,
        id: ID<TlRound>,
        coverage: f64,
        gross: Coins,
        now: SystemTime,
    ) -> Result<(), PgErr>;
    async fn abandon_tl_round(&self, id: ID<TlRound>, now: SystemTime) -> Result<(), PgErr>;
    async fn insert_guess(&self, guess: &TlGuess) -> Result<(), PgErr>;
    async fn guess_texts(&self, round: ID<TlRound>) -> Result<Vec<String>, PgErr>;
    async fn guess_count(&self, round: ID<TlRound>) -> Result<i64, PgErr>;
    async fn increment_shows(&self, answer_ids: &[uuid::Uuid]) -> Result<(), PgErr>;
    async fn increment_contributed(
        &self,
        answer_ids: &[uuid::Uuid],
        cluster_ids: &[uuid::Uuid],
    ) -> Result<(), PgErr>;
}

impl<C: GenericClient + Sync> TlRepository for C {
    async fn insert_prompt(&self, prompt: &TlPrompt) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "INSERT INTO ",
                TL_PROMPTS,
                " (prompt_id, text, is_active, created_at) VALUES ($1, $2, $3, $4)"
            ),
            &[
                &prompt.prompt_id.inner(),
                &prompt.text,
                &prompt.is_active,
                &prompt.created_at,
            ],
        )
        .await
        .map(|_| ())
    }

    async fn prompt(&self, id: ID<TlPrompt>) -> Result<Option<TlPrompt>, PgErr> {
        self.query_opt(
            const_format::concatcp!("SELECT * FROM ", TL_PROMPTS, " WHERE prompt_id = $1"),
            &[&id.inner()],
        )
        .await
        .map(|opt| opt.map(TlPrompt::from))
    }

    async fn random_active_prompt(&self) -> Result<Option<TlPrompt>, PgErr> {
        self.query_opt(
            const_format::concatcp!(
                "SELECT * FROM ",
                TL_PROMPTS,
                " WHERE is_active ORDER BY RANDOM() LIMIT 1"
            ),
            &[],
        )
        .await
        .map(|opt| opt.map(TlPrompt::from))
    }

    async fn insert_answer(&self, answer: &TlAnswer) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "INSERT INTO ",
                TL_ANSWERS,
                " (answer_id, prompt_id, text, embedding, cluster_id, answer_players_count,
                   shows, contributed_matches, is_active, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
            ),
            &[
                &answer.answer_id.inner(),
                &answer.prompt_id.inner(),
                &answer.text,
                &answer.embedding,
                &answer.cluster_id.map(|id| id.inner()),
                &answer.answer_players_count,
                &answer.shows,
                &answer.contributed_matches,
                &answer.is_active,
                &answer.created_at,
            ],
        )
        .await
        .map(|_| ())
    }

    async fn active_answers(
        &self,
        prompt: ID<TlPrompt>,
        limit: i64,
    ) -> Result<Vec<TlAnswer>, PgErr> {
        self.query(
            const_format::concatcp!(
                "SELECT * FROM ",
                TL_ANSWERS,
                " WHERE prompt_id = $1 AND is_active ORDER BY created_at ASC LIMIT $2"
            ),
            &[&prompt.inner(), &limit],
        )
        .await
        .map(|rows| rows.into_iter().map(TlAnswer::from).collect())
    }

    async fn answers_by_ids(&self, ids: &[uuid::Uuid]) -> Result<Vec<TlAnswer>, PgErr> {
        self.query(
            const_format::concatcp!("SELECT * FROM ", TL_ANSWERS, " WHERE answer_id = ANY($1)"),
            &[&ids],
        )
        .await
        .map(|rows| rows.into_iter().map(TlAnswer::from).collect())
    }

    async fn active_answers_in_clusters(
        &self,
        cluster_ids: &[uuid::Uuid],
    ) -> Result<Vec<TlAnswer>, PgErr> {
        self.query(
            const_format::concatcp!(
                "SELECT * FROM ",
                TL_ANSWERS,
                " WHERE cluster_id = ANY($1) AND is_active"
            ),
            &[&cluster_ids],
        )
        .await
        .map(|rows| rows.into_iter().map(TlAnswer::from).collect())
    }

    async fn deactivate_answer(&self, id: ID<TlAnswer>) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "UPDATE ",
                TL_ANSWERS,
                " SET is_active = FALSE WHERE answer_id = $1"
            ),
            &[&id.inner()],
        )
        .await
        .map(|_| ())
    }

    async fn insert_cluster(&self, cluster: &TlCluster) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "INSERT INTO ",
                TL_CLUSTERS,
                " (cluster_id, prompt_id, centroid, size, example_answer_id, created_at,
                   updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)"
            ),
            &[
                &cluster.cluster_id.inner(),
                &cluster.prompt_id.inner(),
                &cluster.centroid,
                &cluster.size,
                &cluster.example_answer_id.inner(),
                &cluster.created_at,
                &cluster.updated_at,
            ],
        )
        .await
        .map(|_| ())
    }

    async fn clusters_for_prompt(&self, prompt: ID<TlPrompt>) -> Result<Vec<TlCluster>, PgErr> {
        self.query(
            const_format::concatcp!("SELECT * FROM ", TL_CLUSTERS, " WHERE prompt_id = $1"),
            &[&prompt.inner()],
        )
        .await
        .map(|rows| rows.into_iter().map(TlCluster::from).collect())
    }

    async fn update_centroid(
        &self,
        id: ID<TlCluster>,
        centroid: &[Component],
        size: i32,
        now: SystemTime,
    ) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "UPDATE ",
                TL_CLUSTERS,
                " SET centroid = $2, size = $3, updated_at = $4 WHERE cluster_id = $1"
            ),
            &[&id.inner(), &centroid, &size, &now],
        )
        .await
        .map(|_| ())
    }

    async fn set_answer_cluster(
        &self,
        answer: ID<TlAnswer>,
        cluster: ID<TlCluster>,
    ) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "UPDATE ",
                TL_ANSWERS,
                " SET cluster_id = $2 WHERE answer_id = $1"
            ),
            &[&answer.inner(), &cluster.inner()],
        )
        .await
        .map(|_| ())
    }

    async fn insert_tl_round(&self, round: &TlRound) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "INSERT INTO ",
                TL_ROUNDS,
                " (round_id, player_id, prompt_id, snapshot_answer_ids, snapshot_cluster_ids,
                   snapshot_total_weight, matched_clusters, strikes, status, final_coverage,
                   gross_payout, created_at, ended_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
            ),
            &[
                &round.round_id.inner(),
                &round.player_id.inner(),
                &round.prompt_id.inner(),
                &round.snapshot_answer_ids,
                &round.snapshot_cluster_ids,
                &round.snapshot_total_weight,
                &round.matched_clusters,
                &round.strikes,
                &round.status.as_str(),
                &round.final_coverage,
                &round.gross_payout,
                &round.created_at,
                &round.ended_at,
            ],
        )
        .await
        .map(|_| ())
    }

    async fn tl_round(&self, id: ID<TlRound>) -> Result<Option<TlRound>, PgErr> {
        self.query_opt(
            const_format::concatcp!("SELECT * FROM ", TL_ROUNDS, " WHERE round_id = $1"),
            &[&id.inner()],
        )
        .await
        .map(|opt| opt.map(TlRound::from))
    }

    async fn active_tl_round(&self, player: ID<Player>) -> Result<Option<TlRound>, PgErr> {
        self.query_opt(
            const_format::concatcp!(
                "SELECT * FROM ",
                TL_ROUNDS,
                " WHERE player_id = $1 AND status = 'active' LIMIT 1"
            ),
            &[&player.inner()],
        )
        .await
        .map(|opt| opt.map(TlRound::from))
    }

    async fn update_round_progress(
        &self,
        id: ID<TlRound>,
        matched_clusters: &[uuid::Uuid],
        strikes: i32,
    ) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "UPDATE ",
                TL_ROUNDS,
                " SET matched_clusters = $2, strikes = $3 WHERE round_id = $1"
            ),
            &[&id.inner(), &matched_clusters, &strikes],
        )
        .await
        .map(|_| ())
    }

    async fn finalize_tl_round(
        &self,
        id: ID<TlRound>,
        coverage: f64,
        gross: Coins,
        now: SystemTime,
    ) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "UPDATE ",
                TL_ROUNDS,
                " SET status = 'completed', final_coverage = $2, gross_payout = $3,
                      ended_at = $4
                 WHERE round_id = $1 AND status = 'active'"
            ),
            &[&id.inner(), &coverage, &gross, &now],
        )
        .await
        .map(|_| ())
    }

    async fn abandon_tl_round(&self, id: ID<TlRound>, now: SystemTime) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "UPDATE ",
                TL_ROUNDS,
                " SET status = 'abandoned', ended_at = $2
                 WHERE round_id = $1 AND status = 'active'"
            ),
            &[&id.inner(), &now],
        )
        .await
        .map(|_| ())
    }

    async fn insert_guess(&self, guess: &TlGuess) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "INSERT INTO ",
                TL_GUESSES,
                " (guess_id, round_id, text, embedding, was_match, matched_cluster_ids,
                   caused_strike, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
            ),
            &[
                &guess.guess_id.inner(),
                &guess.round_id.inner(),
                &guess.text,
                &guess.embedding,
                &guess.was_match,
                &guess.matched_cluster_ids,
                &guess.caused_strike,
                &guess.created_at,
            ],
        )
        .await
        .map(|_| ())
    }

    async fn guess_texts(&self, round: ID<TlRound>) -> Result<Vec<String>, PgErr> {
        self.query(
            const_format::concatcp!(
                "SELECT text FROM ",
                TL_GUESSES,
                " WHERE round_id = $1 ORDER BY created_at ASC"
            ),
            &[&round.inner()],
        )
        .await
        .map(|rows| rows.into_iter().map(|row| row.get(0)).collect())
    }

    async fn guess_count(&self, round: ID<TlRound>) -> Result<i64, PgErr> {
        self.query_one(
            const_format::concatcp!("SELECT COUNT(*) FROM ", TL_GUESSES, " WHERE round_id = $1"),
            &[&round.inner()],
        )
        .await
        .map(|row| row.get(0))
    }

    async fn increment_shows(&self, answer_ids: &[uuid::Uuid]) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "UPDATE ",
                TL_ANSWERS,
                " SET shows = shows + 1 WHERE answer_id = ANY($1)"
            ),
            &[&answer_ids],
        )
        .await
        .map(|_| ())
    }

    async fn increment_contributed(
        &self,
        answer_ids: &[uuid::Uuid],
        cluster_ids: &[uuid::Uuid],
    ) -> Result<(), PgErr> {
        self.execute(
            const_format::concatcp!(
                "UPDATE ",
                TL_ANSWERS,
                " SET contributed_matches = contributed_matches + 1
                 WHERE answer_id = ANY($1) AND cluster_id = ANY($2)"
            ),
            &[&answer_ids, &cluster_ids],
        )
        .await
        .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tl_round_status_round_trips() {
        for s in [
            TlRoundStatus::Active,
            TlRoundStatus::Completed,
            TlRoundStatus::Abandoned,
        ] {
            assert_eq!(TlRoundStatus::parse(s.as_str()), Some(s));
        }
    }
}
