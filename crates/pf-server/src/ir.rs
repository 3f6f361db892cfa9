use crate::AppState;
use crate::dto::*;
use crate::qf::load_player;
use actix_web::HttpResponse;
use actix_web::web;
use pf_core::GameResult;
use pf_core::ID;
use pf_engine::IrEngine;
use pf_records::IrMode;

pub async fn join_set(state: web::Data<AppState>, body: web::Json<JoinSetBody>) -> HttpResponse {
    let result = async {
        let mut client = state.database.session().await?;
        let tx = client.transaction().await?;
        let player = load_player(&tx, body.player_id).await?;
        let mode = body
            .mode
            .as_deref()
            .and_then(IrMode::parse)
            .unwrap_or(IrMode::Rapid);
        let ir = IrEngine::new(state.ctx.clone());
        let set = ir.join_set(&tx, &player, mode).await?;
        tx.commit().await?;
        Ok(set)
    }
    .await;
    match result {
        Ok(set) => HttpResponse::Ok().json(serde_json::json!({
            "set_id": set.set_id.inner(),
            "word": set.word,
            "mode": set.mode.as_str(),
            "status": set.status.as_str(),
            "entry_count": set.entry_count,
        })),
        Err(e) => error_response(&e),
    }
}

pub async fn add_entry(
    state: web::Data<AppState>,
    path: web::Path<uuid::Uuid>,
    body: web::Json<EntryBody>,
) -> HttpResponse {
    let set_id = path.into_inner();
    let result = async {
        let mut client = state.database.session().await?;
        let tx = client.transaction().await?;
        let player = load_player(&tx, body.player_id).await?;
        let ir = IrEngine::new(state.ctx.clone());
        let entry = ir
            .add_entry(&tx, ID::from(set_id), &player, body.words.clone(), false)
            .await?;
        tx.commit().await?;
        Ok(entry)
    }
    .await;
    match result {
        Ok(entry) => HttpResponse::Ok().json(serde_json::json!({
            "entry_id": entry.entry_id.inner(),
            "backronym_text": entry.backronym_text,
        })),
        Err(e) => error_response(&e),
    }
}

pub async fn add_vote(
    state: web::Data<AppState>,
    path: web::Path<uuid::Uuid>,
    body: web::Json<SetVoteBody>,
) -> HttpResponse {
    let set_id = path.into_inner();
    let result = async {
        let mut client = state.database.session().await?;
        let tx = client.transaction().await?;
        let player = load_player(&tx, body.player_id).await?;
        let ir = IrEngine::new(state.ctx.clone());
        let vote = ir
            .add_vote(
                &tx,
                ID::from(set_id),
                &player,
                ID::from(body.entry_id),
                false,
            )
            .await?;
        tx.commit().await?;
        Ok(vote)
    }
    .await;
    match result {
        Ok(vote) => HttpResponse::Ok().json(serde_json::json!({
            "vote_id": vote.vote_id.inner(),
            "is_participant_voter": vote.is_participant_voter,
        })),
        Err(e) => error_response(&e),
    }
}

/// First view freezes the payout; every later view reads the same record.
pub async fn view_results(
    state: web::Data<AppState>,
    path: web::Path<uuid::Uuid>,
    body: web::Json<PlayerBody>,
) -> HttpResponse {
    let set_id = path.into_inner();
    let result: GameResult<_> = async {
        let mut client = state.database.session().await?;
        let tx = client.transaction().await?;
        let player = load_player(&tx, body.player_id).await?;
        let ir = IrEngine::new(state.ctx.clone());
        let view = ir.view_results(&tx, ID::from(set_id), &player).await?;
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
