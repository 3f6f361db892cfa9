use crate::AppState;
use crate::dto::*;
use actix_web::HttpResponse;
use actix_web::web;
use pf_core::GameError;
use pf_core::GameResult;
use pf_core::GameType;
use pf_core::ID;
use pf_engine::RoundEngine;
use pf_ledger::Ledger;
use pf_records::Player;
use pf_records::PlayerGameData;
use pf_records::PlayerRepository;
use pf_records::RoundRepository;
use pf_records::kind;
use rand::Rng;
use tokio_postgres::GenericClient;

pub(crate) async fn load_player<C: GenericClient + Sync>(
    db: &C,
    id: uuid::Uuid,
) -> GameResult<Player> {
    db.player(ID::from(id)).await?.ok_or(GameError::PlayerNotFound)
}

/// Create a guest account with wallets for all three games. Guests are
/// soft-anonymized later, never hard-deleted.
pub async fn create_guest(state: web::Data<AppState>, body: web::Json<GuestBody>) -> HttpResponse {
    let result: GameResult<Player> = async {
        let mut client = state.database.session().await?;
        let tx = client.transaction().await?;
        let username = match &body.username {
            Some(name) => name.clone(),
            None => format!("guest{}", rand::rng().random_range(100_000..1_000_000)),
        };
        if tx.username_taken(&username.to_lowercase()).await? {
            return Err(GameError::InvalidPhrase("username is taken".to_string()));
        }
        let now = state.ctx.now();
        let player = Player::new(username, None, true, now);
        tx.create_player(&player).await?;
        let settings = &state.ctx.settings;
        for (game, starting) in [
            (GameType::Qf, settings.qf_starting_wallet),
            (GameType::Ir, settings.ir_initial_balance),
            (GameType::Tl, settings.tl_starting_balance),
        ] {
            tx.create_game_data(&PlayerGameData::new(player.player_id, game, 0))
                .await?;
            tx.credit_wallet(
                player.player_id,
                game,
                starting,
                kind::STARTING_BALANCE,
                None,
                now,
            )
            .await?;
        }
        tx.commit().await?;
        Ok(player)
    }
    .await;
    match result {
        Ok(player) => HttpResponse::Ok().json(serde_json::json!({
            "player_id": player.player_id.inner(),
            "username": player.username,
            "is_guest": player.is_guest,
        })),
        Err(e) => error_response(&e),
    }
}

pub async fn claim_bonus(state: web::Data<AppState>, body: web::Json<BonusBody>) -> HttpResponse {
    let result: GameResult<i64> = async {
        let settings = &state.ctx.settings;
        let (game, amount) = match body.game.as_str() {
            "qf" => (GameType::Qf, settings.daily_bonus_amount),
            "ir" => (GameType::Ir, settings.ir_daily_bonus_amount),
            "tl" => (GameType::Tl, settings.tl_daily_bonus_amount),
            _ => return Err(GameError::InvalidPhrase("unknown game".into())),
        };
        let mut client = state.database.session().await?;
        let tx = client.transaction().await?;
        let player = load_player(&tx, body.player_id).await?;
        let txn = tx
            .claim_daily_bonus(player.player_id, game, amount, state.ctx.now())
            .await?;
        tx.commit().await?;
        Ok(txn.amount)
    }
    .await;
    match result {
        Ok(amount) => HttpResponse::Ok().json(serde_json::json!({ "amount": amount })),
        Err(e) => error_response(&e),
    }
}

pub async fn start_prompt(state: web::Data<AppState>, body: web::Json<PlayerBody>) -> HttpResponse {
    let result = async {
        let mut client = state.database.session().await?;
        let tx = client.transaction().await?;
        let player = load_player(&tx, body.player_id).await?;
        let engine = RoundEngine::new(state.ctx.clone());
        let round = engine.start_prompt_round(&tx, &player).await?;
        tx.commit().await?;
        Ok(round)
    }
    .await;
    match result {
        Ok(round) => HttpResponse::Ok().json(RoundResponse::from_round(&round)),
        Err(e) => error_response(&e),
    }
}

pub async fn submit_prompt(state: web::Data<AppState>, body: web::Json<SubmitBody>) -> HttpResponse {
    let result = async {
        let mut client = state.database.session().await?;
        let tx = client.transaction().await?;
        let player = load_player(&tx, body.player_id).await?;
        let engine = RoundEngine::new(state.ctx.clone());
        let outcome = engine
            .submit_prompt(&tx, ID::from(body.round_id), &body.phrase, &player)
            .await?;
        tx.commit().await?;
        Ok(outcome)
    }
    .await;
    match result {
        Ok(outcome) => HttpResponse::Ok().json(serde_json::json!({
            "round": RoundResponse::from_round(&outcome.round),
        })),
        Err(e) => error_response(&e),
    }
}

pub async fn start_copy(state: web::Data<AppState>, body: web::Json<PlayerBody>) -> HttpResponse {
    let result = async {
        let mut client = state.database.session().await?;
        let tx = client.transaction().await?;
        let player = load_player(&tx, body.player_id).await?;
        let engine = RoundEngine::new(state.ctx.clone());
        let round = engine.start_copy_round(&tx, &player, None, None).await?;
        // The copier imitates the original; surface it with the round.
        let original = match round.prompt_round_id {
            Some(prompt_id) => tx
                .round(prompt_id)
                .await?
                .and_then(|r| r.submitted_phrase),
            None => None,
        };
        tx.commit().await?;
        Ok((round, original))
    }
    .await;
    match result {
        Ok((round, original)) => HttpResponse::Ok().json(serde_json::json!({
            "round": RoundResponse::from_round(&round),
            "original_phrase": original,
        })),
        Err(e) => error_response(&e),
    }
}

pub async fn submit_copy(state: web::Data<AppState>, body: web::Json<SubmitBody>) -> HttpResponse {
    let result = async {
        let mut client = state.database.session().await?;
        let tx = client.transaction().await?;
        let player = load_player(&tx, body.player_id).await?;
        let engine = RoundEngine::new(state.ctx.clone());
        let outcome = engine
            .submit_copy(&tx, ID::from(body.round_id), &body.phrase, &player)
            .await?;
        let prompt_round = match outcome.round.prompt_round_id {
            Some(prompt_id) => tx.round(prompt_id).await?,
            None => None,
        };
        tx.commit().await?;
        // The first human copy changes what the cached impostors must
        // avoid; revalidate off the request path.
        if outcome.first_copy {
            if let Some(prompt_round) = prompt_round {
                let cache = state.cache.clone();
                let database = state.database.clone();
                tokio::spawn(async move {
                    match database.session().await {
                        Ok(db) => {
                            if let Err(error) =
                                cache.revalidate_after_first_copy(&db, &prompt_round).await
                            {
                                log::warn!("cache revalidation failed: {}", error);
                            }
                        }
                        Err(error) => log::warn!("cache revalidation session failed: {}", error),
                    }
                });
            }
        }
        Ok(outcome)
    }
    .await;
    match result {
        Ok(outcome) => HttpResponse::Ok().json(serde_json::json!({
            "round": RoundResponse::from_round(&outcome.round),
            "phraseset_created": outcome.phraseset_created.map(|id| id.inner()),
        })),
        Err(e) => error_response(&e),
    }
}

pub async fn start_vote(state: web::Data<AppState>, body: web::Json<PlayerBody>) -> HttpResponse {
    let result = async {
        let mut client = state.database.session().await?;
        let tx = client.transaction().await?;
        let player = load_player(&tx, body.player_id).await?;
        let engine = RoundEngine::new(state.ctx.clone());
        let (round, phraseset) = engine.start_vote_round(&tx, &player, None, None).await?;
        tx.commit().await?;
        Ok((round, phraseset))
    }
    .await;
    match result {
        Ok((round, set)) => HttpResponse::Ok().json(serde_json::json!({
            "round": RoundResponse::from_round(&round),
            "phraseset_id": set.phraseset_id.inner(),
            "prompt_text": set.prompt_text,
            "phrases": [set.original_phrase, set.copy_phrase_1, set.copy_phrase_2],
        })),
        Err(e) => error_response(&e),
    }
}

pub async fn submit_vote(state: web::Data<AppState>, body: web::Json<VoteBody>) -> HttpResponse {
    let result = async {
        let mut client = state.database.session().await?;
        let tx = client.transaction().await?;
        let player = load_player(&tx, body.player_id).await?;
        let engine = RoundEngine::new(state.ctx.clone());
        let outcome = engine
            .submit_vote(
                &tx,
                ID::from(body.round_id),
                ID::from(body.phraseset_id),
                &body.phrase,
                &player,
            )
            .await?;
        tx.commit().await?;
        Ok(outcome)
    }
    .await;
    match result {
        Ok(outcome) => HttpResponse::Ok().json(serde_json::json!({
            "round": RoundResponse::from_round(&outcome.round),
            "correct": outcome.correct,
        })),
        Err(e) => error_response(&e),
    }
}

pub async fn abandon_round(
    state: web::Data<AppState>,
    body: web::Json<AbandonBody>,
) -> HttpResponse {
    let result = async {
        let mut client = state.database.session().await?;
        let tx = client.transaction().await?;
        let player = load_player(&tx, body.player_id).await?;
        let engine = RoundEngine::new(state.ctx.clone());
        let round = engine
            .abandon_round(&tx, ID::from(body.round_id), &player)
            .await?;
        tx.commit().await?;
        Ok(round)
    }
    .await;
    match result {
        Ok(round) => HttpResponse::Ok().json(RoundResponse::from_round(&round)),
        Err(e) => error_response(&e),
    }
}

/// First view of a finalized phraseset freezes the payout display.
pub async fn view_results(
    state: web::Data<AppState>,
    path: web::Path<uuid::Uuid>,
    body: web::Json<PlayerBody>,
) -> HttpResponse {
    let phraseset_id = path.into_inner();
    let result = async {
        let mut client = state.database.session().await?;
        let tx = client.transaction().await?;
        let player = load_player(&tx, body.player_id).await?;
        let engine = RoundEngine::new(state.ctx.clone());
        let view = engine
            .view_phraseset_results(&tx, ID::from(phraseset_id), &player)
            .await?;
        tx.commit().await?;
        Ok(view)
    }
    .await;
    match result {
        Ok(view) => HttpResponse::Ok().json(serde_json::json!({
            "content_id": view.content_id,
            "payout": view.payout,
        })),
        Err(e) => error_response(&e),
    }
}

/// Paid hints for a copy round: three cached impostor phrases, shared by
/// every player who asks.
pub async fn buy_hints(state: web::Data<AppState>, body: web::Json<HintBody>) -> HttpResponse {
    let result = async {
        let mut client = state.database.session().await?;
        let tx = client.transaction().await?;
        let player = load_player(&tx, body.player_id).await?;
        let copy_round = tx
            .round(ID::from(body.round_id))
            .await?
            .ok_or(GameError::RoundNotFound)?;
        if copy_round.player_id != player.player_id {
            return Err(GameError::Unauthorized);
        }
        let prompt_round = match copy_round.prompt_round_id {
            Some(id) => tx.round(id).await?.ok_or(GameError::RoundNotFound)?,
            None => return Err(GameError::RoundNotFound),
        };
        tx.debit_wallet(
            player.player_id,
            GameType::Qf,
            state.ctx.settings.hint_cost,
            kind::HINT_PURCHASE,
            Some(copy_round.round_id.inner()),
            state.ctx.now(),
        )
        .await?;
        let hints = state.cache.hints(&tx, &prompt_round, 3).await?;
        tx.commit().await?;
        Ok(hints)
    }
    .await;
    match result {
        Ok(hints) => HttpResponse::Ok().json(serde_json::json!({ "hints": hints })),
        Err(e) => error_response(&e),
    }
}
