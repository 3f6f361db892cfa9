//! The money ledger.
//!
//! Every operation runs inside the caller's unit of work: if the enclosing
//! transaction rolls back, neither the balance change nor the ledger row is
//! visible. Negative balances are impossible by construction; concurrent
//! debits on one player serialize on the wallet row.
//!
//! ## Operations
//!
//! - [`Ledger::debit_wallet`] — conditional subtract, `InsufficientBalance`
//!   with no state change on shortfall
//! - [`Ledger::credit_wallet`] / [`Ledger::credit_vault`] — unconditional adds
//! - [`Ledger::credit_split`] — one ledger row for a wallet+vault payout pair
//! - [`Ledger::process_payout`] — many credits for one finalized content item
//! - [`Ledger::claim_daily_bonus`] — at most one claim per UTC day
//!
//! ## Money math
//!
//! - [`split_payout`] / [`rake`] — pure, tested against the boundary
//!   scenarios in the game rules
mod math;

pub use math::*;

use pf_core::Coins;
use pf_core::GameError;
use pf_core::GameResult;
use pf_core::GameType;
use pf_core::ID;
use pf_database::PLAYER_GAME_DATA;
use pf_records::ExtrasRepository;
use pf_records::Player;
use pf_records::Transaction;
use pf_records::TransactionRepository;
use pf_records::day_index;
use pf_records::kind;
use std::time::SystemTime;
use tokio_postgres::GenericClient;

/// One credited share within a payout batch.
#[derive(Debug, Clone)]
pub struct PayoutShare {
    pub player: ID<Player>,
    pub wallet_amount: Coins,
    pub vault_amount: Coins,
    pub kind: &'static str,
}

#[allow(async_fn_in_trait)]
pub trait Ledger {
    /// Atomically subtract from the wallet and append a ledger row. Fails
    /// with [`GameError::InsufficientBalance`] and no state change if the
    /// wallet cannot cover the amount.
    async fn debit_wallet(
        &self,
        player: ID<Player>,
        game: GameType,
        amount: Coins,
        kind: &str,
        reference: Option<uuid::Uuid>,
        now: SystemTime,
    ) -> GameResult<Transaction>;
    async fn credit_wallet(
        &self,
        player: ID<Player>,
        game: GameType,
        amount: Coins,
        kind: &str,
        reference: Option<uuid::Uuid>,
        now: SystemTime,
    ) -> GameResult<Transaction>;
    async fn credit_vault(
        &self,
        player: ID<Player>,
        game: GameType,
        amount: Coins,
        kind: &str,
        reference: Option<uuid::Uuid>,
        now: SystemTime,
    ) -> GameResult<Transaction>;
    /// Credit wallet and vault together as one ledger row, the shape every
    /// raked payout takes.
    async fn credit_split(
        &self,
        player: ID<Player>,
        game: GameType,
        wallet_amount: Coins,
        vault_amount: Coins,
        kind: &str,
        reference: Option<uuid::Uuid>,
        now: SystemTime,
    ) -> GameResult<Transaction>;
    /// Apply a batch of payout shares for one finalized content item.
    async fn process_payout(
        &self,
        game: GameType,
        reference: uuid::Uuid,
        shares: &[PayoutShare],
        now: SystemTime,
    ) -> GameResult<Vec<Transaction>>;
    /// Credit the per-game daily bonus at most once per UTC day.
    async fn claim_daily_bonus(
        &self,
        player: ID<Player>,
        game: GameType,
        amount: Coins,
        now: SystemTime,
    ) -> GameResult<Transaction>;
}

async fn apply_balance<C: GenericClient + Sync>(
    db: &C,
    player: ID<Player>,
    game: GameType,
    wallet_delta: Coins,
    vault_delta: Coins,
    guard_wallet: bool,
) -> GameResult<Coins> {
    let guard = if guard_wallet {
        const_format::concatcp!(
            "UPDATE ",
            PLAYER_GAME_DATA,
            " SET wallet = wallet + $3, vault = vault + $4
             WHERE player_id = $1 AND game = $2 AND wallet + $3 >= 0
             RETURNING wallet"
        )
    } else {
        const_format::concatcp!(
            "UPDATE ",
            PLAYER_GAME_DATA,
            " SET wallet = wallet + $3, vault = vault + $4
             WHERE player_id = $1 AND game = $2
             RETURNING wallet"
        )
    };
    let updated = db
        .query_opt(
            guard,
            &[&player.inner(), &game.as_str(), &wallet_delta, &vault_delta],
        )
        .await?;
    match updated {
        Some(row) => Ok(row.get(0)),
        None => {
            let exists = db
                .query_opt(
                    const_format::concatcp!(
                        "SELECT 1 FROM ",
                        PLAYER_GAME_DATA,
                        " WHERE player_id = $1 AND game = $2"
                    ),
                    &[&player.inner(), &game.as_str()],
                )
                .await?;
            match exists {
                Some(_) => Err(GameError::InsufficientBalance),
                None => Err(GameError::PlayerNotFound),
            }
        }
    }
}

async fn append_row<C: GenericClient + Sync>(
    db: &C,
    player: ID<Player>,
    game: GameType,
    amount: Coins,
    balance_after: Coins,
    kind: &str,
    reference: Option<uuid::Uuid>,
    vault_contribution: Coins,
    now: SystemTime,
) -> GameResult<Transaction> {
    let txn = Transaction {
        transaction_id: ID::default(),
        player_id: player,
        game,
        amount,
        balance_after,
        kind: kind.to_string(),
        reference_id: reference,
        vault_contribution,
        created_at: now,
    };
    db.insert_transaction(&txn).await?;
    Ok(txn)
}

impl<C: GenericClient + Sync> Ledger for C {
    async fn debit_wallet(
        &self,
        player: ID<Player>,
        game: GameType,
        amount: Coins,
        kind: &str,
        reference: Option<uuid::Uuid>,
        now: SystemTime,
    ) -> GameResult<Transaction> {
        debug_assert!(amount >= 0, "debit amounts are non-negative");
        let balance = apply_balance(self, player, game, -amount, 0, true).await?;
        log::debug!(
            "[ledger] debit {} {} from {} (balance {})",
            amount,
            kind,
            player,
            balance
        );
        append_row(self, player, game, -amount, balance, kind, reference, 0, now).await
    }

    async fn credit_wallet(
        &self,
        player: ID<Player>,
        game: GameType,
        amount: Coins,
        kind: &str,
        reference: Option<uuid::Uuid>,
        now: SystemTime,
    ) -> GameResult<Transaction> {
        let balance = apply_balance(self, player, game, amount, 0, false).await?;
        append_row(self, player, game, amount, balance, kind, reference, 0, now).await
    }

    async fn credit_vault(
        &self,
        player: ID<Player>,
        game: GameType,
        amount: Coins,
        kind: &str,
        reference: Option<uuid::Uuid>,
        now: SystemTime,
    ) -> GameResult<Transaction> {
        let balance = apply_balance(self, player, game, 0, amount, false).await?;
        append_row(
            self, player, game, 0, balance, kind, reference, amount, now,
        )
        .await
    }

    async fn credit_split(
        &self,
        player: ID<Player>,
        game: GameType,
        wallet_amount: Coins,
        vault_amount: Coins,
        kind: &str,
        reference: Option<uuid::Uuid>,
        now: SystemTime,
    ) -> GameResult<Transaction> {
        let balance = apply_balance(self, player, game, wallet_amount, vault_amount, false).await?;
        append_row(
            self,
            player,
            game,
            wallet_amount,
            balance,
            kind,
            reference,
            vault_amount,
            now,
        )
        .await
    }

    async fn process_payout(
        &self,
        game: GameType,
        reference: uuid::Uuid,
        shares: &[PayoutShare],
        now: SystemTime,
    ) -> GameResult<Vec<Transaction>> {
        let mut rows = Vec::with_capacity(shares.len());
        for share in shares {
            if share.wallet_amount == 0 && share.vault_amount == 0 {
                continue;
            }
            let txn = self
                .credit_split(
                    share.player,
                    game,
                    share.wallet_amount,
                    share.vault_amount,
                    share.kind,
                    Some(reference),
                    now,
                )
                .await?;
            rows.push(txn);
        }
        log::info!(
            "[ledger] payout {} applied {} credit(s) for {}",
            reference,
            rows.len(),
            game
        );
        Ok(rows)
    }

    async fn claim_daily_bonus(
        &self,
        player: ID<Player>,
        game: GameType,
        amount: Coins,
        now: SystemTime,
    ) -> GameResult<Transaction> {
        let claimed = self.try_claim_bonus(player, game, day_index(now), now).await?;
        if !claimed {
            return Err(GameError::AlreadyClaimed);
        }
        self.credit_wallet(player, game, amount, kind::DAILY_BONUS, None, now)
            .await
    }
}
