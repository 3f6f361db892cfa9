use crate::Player;
use pf_core::Coins;
use pf_core::GameType;
use pf_core::ID;
use pf_database::DAILY_BONUSES;
use pf_database::PgErr;
use pf_database::RESULT_VIEWS;
use pf_database::Schema;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;
use tokio_postgres::GenericClient;
use tokio_postgres::Row;

/// Days since the UNIX epoch, the claim granularity for daily bonuses.
pub fn day_index(now: SystemTime) -> i64 {
    now.duration_since(UNIX_EPOCH)
        .map(|d| (d.as_secs() / 86_400) as i64)
        .unwrap_or(0)
}

/// Marker type for bonus claim rows.
pub struct DailyBonus;

impl Schema for DailyBonus {
    fn name() -> &'static str {
        DAILY_BONUSES
    }
    fn creates() -> &'static str {
        const_format::concatcp!(
            "CREATE TABLE IF NOT EXISTS ",
            DAILY_BONUSES,
            " (
                player_id   UUID NOT NULL,
                game        TEXT NOT NULL,
                claimed_on  BIGINT NOT NULL,
                created_at  TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (player_id, game, claimed_on)
            );"
        )
    }
}

/// Records that a participant has seen a finalized outcome. The stored
/// payout makes repeat reads idempotent.
#[derive(Debug, Clone)]
pub struct ResultView {
    pub view_id: ID<ResultView>,
    pub player_id: ID<Player>,
    /// What kind of content was viewed ("phraseset" or "backronym_set").
    pub kind: String,
    pub content_id: uuid::Uuid,
    pub payout: Coins,
    pub first_viewed_at: SystemTime,
}

impl From<Row> for ResultView {
    fn from(row: Row) -> Self {
        Self {
            view_id: ID::from(row.get::<_, uuid::Uuid>("view_id")),
            player_id: ID::from(row.get::<_, uuid::Uuid>("player_id")),
            kind: row.get("kind"),
            content_id: row.get("content_id"),
            payout: row.get("payout"),
            first_viewed_at: row.get("first_viewed_at"),
        }
    }
}

impl Schema for ResultView {
    fn name() -> &'static str {
        RESULT_VIEWS
    }
    fn creates() -> &'static str {
        const_format::concatcp!(
            "CREATE TABLE IF NOT EXISTS ",
            RESULT_VIEWS,
            " (
                view_id          UUID PRIMARY KEY,
                player_id        UUID NOT NULL,
                kind             TEXT NOT NULL,
                content_id       UUID NOT NULL,
                payout           BIGINT NOT NULL,
                first_viewed_at  TIMESTAMPTZ NOT NULL,
                UNIQUE (player_id, content_id)
            );"
        )
    }
}

#[allow(async_fn_in_trait)]
pub trait ExtrasRepository {
    /// Claim the daily bonus for the given day. False when already claimed.
    async fn try_claim_bonus(
        &self,
        player: ID<Player>,
        game: GameType,
        day: i64,
        now: SystemTime,
    ) -> Result<bool, PgErr>;
    /// Create the view if absent, then return the stored record. Repeat
    /// calls return the original payout unchanged.
    async fn get_or_create_view(&self, view: &ResultView) -> Result<ResultView, PgErr>;
}

impl<C: GenericClient + Sync> ExtrasRepository for C {
    async fn try_claim_bonus(
        &self,
        player: ID<Player>,
        game: GameType,
        day: i64,
        now: SystemTime,
    ) -> Result<bool, PgErr> {
        self.execute(
            const_format::concatcp!(
                "INSERT INTO ",
                DAILY_BONUSES,
                " (player_id, game, claimed_on, created_at) VALUES ($1, $2, $3, $4)
                 ON CONFLICT (player_id, game, claimed_on) DO NOTHING"
            ),
            &[&player.inner(), &game.as_str(), &day, &now],
        )
        .await
        .map(|n| n > 0)
    }

    async fn get_or_create_view(&self, view: &ResultView) -> Result<ResultView, PgErr> {
        self.execute(
            const_format::concatcp!(
                "INSERT INTO ",
                RESULT_VIEWS,
                " (view_id, player_id, kind, content_id, payout, first_viewed_at)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (player_id, content_id) DO NOTHING"
            ),
            &[
                &view.view_id.inner(),
                &view.player_id.inner(),
                &view.kind,
                &view.content_id,
                &view.payout,
                &view.first_viewed_at,
            ],
        )
        .await?;
        self.query_one(
            const_format::concatcp!(
                "SELECT * FROM ",
                RESULT_VIEWS,
                " WHERE player_id = $1 AND content_id = $2"
            ),
            &[&view.player_id.inner(), &view.content_id],
        )
        .await
        .map(ResultView::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn day_index_rolls_at_utc_midnight() {
        let day_zero = UNIX_EPOCH + Duration::from_secs(86_399);
        let day_one = UNIX_EPOCH + Duration::from_secs(86_400);
        assert_eq!(day_index(day_zero), 0);
        assert_eq!(day_index(day_one), 1);
    }
}
