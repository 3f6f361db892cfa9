use crate::AppState;
use crate::dto::*;
use crate::qf::load_player;
use actix_web::HttpResponse;
use actix_web::web;
use pf_core::ID;
use pf_engine::TlEngine;

pub async fn start_round(state: web::Data<AppState>, body: web::Json<PlayerBody>) -> HttpResponse {
    let result = async {
        let mut client = state.database.session().await?;
        let tx = client.transaction().await?;
        let player = load_player(&tx, body.player_id).await?;
        let tl = TlEngine::new(state.ctx.clone(), state.embeddings.clone());
        let (round, prompt_text) = tl.start_round(&tx, &player).await?;
        tx.commit().await?;
        Ok((round, prompt_text))
    }
    .await;
    match result {
        Ok((round, prompt_text)) => HttpResponse::Ok().json(serde_json::json!({
            "round_id": round.round_id.inner(),
            "prompt_text": prompt_text,
            "snapshot_size": round.snapshot_answer_ids.len(),
            "status": round.status.as_str(),
        })),
        Err(e) => error_response(&e),
    }
}

pub async fn submit_guess(
    state: web::Data<AppState>,
    path: web::Path<uuid::Uuid>,
    body: web::Json<GuessBody>,
) -> HttpResponse {
    let round_id = path.into_inner();
    let result = async {
        let mut client = state.database.session().await?;
        let tx = client.transaction().await?;
        let player = load_player(&tx, body.player_id).await?;
        let tl = TlEngine::new(state.ctx.clone(), state.embeddings.clone());
        let outcome = tl
            .submit_guess(&tx, ID::from(round_id), &player, &body.guess)
            .await?;
        tx.commit().await?;
        Ok(outcome)
    }
    .await;
    match result {
        Ok(outcome) => HttpResponse::Ok().json(serde_json::json!({
            "was_match": outcome.was_match,
            "matched_answer_count": outcome.matched_answer_count,
            "matched_cluster_ids": outcome.matched_cluster_ids,
            "strikes": outcome.strikes,
            "coverage": outcome.coverage,
            "round_status": outcome.status.as_str(),
            "gross_payout": outcome.gross_payout,
        })),
        Err(e) => error_response(&e),
    }
}

pub async fn abandon_round(
    state: web::Data<AppState>,
    path: web::Path<uuid::Uuid>,
    body: web::Json<PlayerBody>,
) -> HttpResponse {
    let round_id = path.into_inner();
    let result = async {
        let mut client = state.database.session().await?;
        let tx = client.transaction().await?;
        let player = load_player(&tx, body.player_id).await?;
        let tl = TlEngine::new(state.ctx.clone(), state.embeddings.clone());
        let refund = tl.abandon_round(&tx, ID::from(round_id), &player).await?;
        tx.commit().await?;
        Ok(refund)
    }
    .await;
    match result {
        Ok(refund) => HttpResponse::Ok().json(serde_json::json!({
            "status": "abandoned",
            "refund_amount": refund,
        })),
        Err(e) => error_response(&e),
    }
}
