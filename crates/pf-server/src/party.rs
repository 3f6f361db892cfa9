use crate::AppState;
use crate::dto::*;
use crate::qf::load_player;
use actix_web::HttpRequest;
use actix_web::HttpResponse;
use actix_web::web;
use pf_core::ID;
use pf_party::PartyConfig;
use pf_party::PartyCoordinator;
use pf_party::PartyService;
use pf_party::PartySubmit;
use pf_party::session_results;
use pf_records::PartySession;

fn coordinator(state: &AppState) -> PartyCoordinator {
    PartyCoordinator::new(state.ctx.clone(), state.broadcaster.clone())
}

fn party(state: &AppState) -> PartyService {
    PartyService::new(state.ctx.clone(), state.broadcaster.clone())
}

/// Kick the AI fill for a session off the request path. Called whenever a
/// phase transition may have created AI work.
fn trigger_ai_fill(state: &AppState, session_id: ID<PartySession>) {
    let orchestrator = state.party_ai.clone();
    tokio::spawn(async move {
        if let Err(error) = orchestrator.process_ai_submissions(session_id).await {
            log::error!("[party {}] ai fill failed: {}", session_id, error);
        }
    });
}

fn submit_response(
    state: &AppState,
    session_id: ID<PartySession>,
    result: PartySubmit,
) -> HttpResponse {
    if result.advanced_to.is_some() {
        trigger_ai_fill(state, session_id);
    }
    HttpResponse::Ok().json(serde_json::json!({
        "round": RoundResponse::from_round(&result.outcome.round),
        "correct": result.outcome.correct,
        "phraseset_created": result.outcome.phraseset_created.map(|id| id.inner()),
        "advanced_to": result.advanced_to.map(|p| p.as_str()),
    }))
}

pub async fn create_session(
    state: web::Data<AppState>,
    body: web::Json<CreatePartyBody>,
) -> HttpResponse {
    let result = async {
        let mut client = state.database.session().await?;
        let tx = client.transaction().await?;
        let player = load_player(&tx, body.player_id).await?;
        let defaults = PartyConfig::default();
        let config = PartyConfig {
            min_players: body.min_players.unwrap_or(defaults.min_players),
            max_players: body.max_players.unwrap_or(defaults.max_players),
            prompts_per_player: body.prompts_per_player.unwrap_or(defaults.prompts_per_player),
            copies_per_player: body.copies_per_player.unwrap_or(defaults.copies_per_player),
            votes_per_player: body.votes_per_player.unwrap_or(defaults.votes_per_player),
        };
        let session = party(&state).create_session(&tx, &player, config).await?;
        tx.commit().await?;
        Ok(session)
    }
    .await;
    match result {
        Ok(session) => HttpResponse::Ok().json(serde_json::json!({
            "session_id": session.session_id.inner(),
            "party_code": session.party_code,
            "status": session.status.as_str(),
            "current_phase": session.current_phase.as_str(),
        })),
        Err(e) => error_response(&e),
    }
}

pub async fn join_session(
    state: web::Data<AppState>,
    path: web::Path<uuid::Uuid>,
    body: web::Json<PlayerBody>,
) -> HttpResponse {
    let session_id = ID::from(path.into_inner());
    let result = async {
        let mut client = state.database.session().await?;
        let tx = client.transaction().await?;
        let player = load_player(&tx, body.player_id).await?;
        let participant = party(&state).join_session(&tx, session_id, &player).await?;
        tx.commit().await?;
        Ok(participant)
    }
    .await;
    match result {
        Ok(participant) => HttpResponse::Ok().json(serde_json::json!({
            "participant_id": participant.participant_id.inner(),
            "status": participant.status.as_str(),
        })),
        Err(e) => error_response(&e),
    }
}

pub async fn leave_session(
    state: web::Data<AppState>,
    path: web::Path<uuid::Uuid>,
    body: web::Json<PlayerBody>,
) -> HttpResponse {
    let session_id = ID::from(path.into_inner());
    let result = async {
        let mut client = state.database.session().await?;
        let tx = client.transaction().await?;
        let player = load_player(&tx, body.player_id).await?;
        let deleted = party(&state).leave_session(&tx, session_id, &player).await?;
        tx.commit().await?;
        Ok(deleted)
    }
    .await;
    match result {
        Ok(deleted) => HttpResponse::Ok().json(serde_json::json!({ "session_deleted": deleted })),
        Err(e) => error_response(&e),
    }
}

pub async fn mark_ready(
    state: web::Data<AppState>,
    path: web::Path<uuid::Uuid>,
    body: web::Json<PlayerBody>,
) -> HttpResponse {
    let session_id = ID::from(path.into_inner());
    let result = async {
        let mut client = state.database.session().await?;
        let tx = client.transaction().await?;
        let player = load_player(&tx, body.player_id).await?;
        party(&state).mark_ready(&tx, session_id, &player).await?;
        tx.commit().await?;
        Ok(())
    }
    .await;
    match result {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({ "ready": true })),
        Err(e) => error_response(&e),
    }
}

pub async fn start_session(
    state: web::Data<AppState>,
    path: web::Path<uuid::Uuid>,
    body: web::Json<PlayerBody>,
) -> HttpResponse {
    let session_id = ID::from(path.into_inner());
    let result = async {
        let mut client = state.database.session().await?;
        let tx = client.transaction().await?;
        let player = load_player(&tx, body.player_id).await?;
        let session = party(&state).start_session(&tx, session_id, &player).await?;
        tx.commit().await?;
        Ok(session)
    }
    .await;
    match result {
        Ok(session) => {
            // Entering PROMPT may already have AI work to do.
            trigger_ai_fill(&state, session.session_id);
            HttpResponse::Ok().json(serde_json::json!({
                "session_id": session.session_id.inner(),
                "status": session.status.as_str(),
                "current_phase": session.current_phase.as_str(),
            }))
        }
        Err(e) => error_response(&e),
    }
}

pub async fn start_prompt(
    state: web::Data<AppState>,
    path: web::Path<uuid::Uuid>,
    body: web::Json<PlayerBody>,
) -> HttpResponse {
    let session_id = ID::from(path.into_inner());
    let result = async {
        let mut client = state.database.session().await?;
        let tx = client.transaction().await?;
        let player = load_player(&tx, body.player_id).await?;
        let round = coordinator(&state)
            .start_party_prompt_round(&tx, session_id, &player)
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

pub async fn submit_prompt(
    state: web::Data<AppState>,
    path: web::Path<uuid::Uuid>,
    body: web::Json<SubmitBody>,
) -> HttpResponse {
    let session_id = ID::from(path.into_inner());
    let result = async {
        let mut client = state.database.session().await?;
        let tx = client.transaction().await?;
        let player = load_player(&tx, body.player_id).await?;
        let submit = coordinator(&state)
            .submit_party_prompt(&tx, session_id, &player, ID::from(body.round_id), &body.phrase)
            .await?;
        tx.commit().await?;
        Ok(submit)
    }
    .await;
    match result {
        Ok(submit) => submit_response(&state, session_id, submit),
        Err(e) => error_response(&e),
    }
}

pub async fn start_copy(
    state: web::Data<AppState>,
    path: web::Path<uuid::Uuid>,
    body: web::Json<PlayerBody>,
) -> HttpResponse {
    let session_id = ID::from(path.into_inner());
    let result = async {
        let mut client = state.database.session().await?;
        let tx = client.transaction().await?;
        let player = load_player(&tx, body.player_id).await?;
        let round = coordinator(&state)
            .start_party_copy_round(&tx, session_id, &player)
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

pub async fn submit_copy(
    state: web::Data<AppState>,
    path: web::Path<uuid::Uuid>,
    body: web::Json<SubmitBody>,
) -> HttpResponse {
    let session_id = ID::from(path.into_inner());
    let result = async {
        let mut client = state.database.session().await?;
        let tx = client.transaction().await?;
        let player = load_player(&tx, body.player_id).await?;
        let submit = coordinator(&state)
            .submit_party_copy(&tx, session_id, &player, ID::from(body.round_id), &body.phrase)
            .await?;
        tx.commit().await?;
        Ok(submit)
    }
    .await;
    match result {
        Ok(submit) => submit_response(&state, session_id, submit),
        Err(e) => error_response(&e),
    }
}

pub async fn start_vote(
    state: web::Data<AppState>,
    path: web::Path<uuid::Uuid>,
    body: web::Json<PlayerBody>,
) -> HttpResponse {
    let session_id = ID::from(path.into_inner());
    let result = async {
        let mut client = state.database.session().await?;
        let tx = client.transaction().await?;
        let player = load_player(&tx, body.player_id).await?;
        let pair = coordinator(&state)
            .start_party_vote_round(&tx, session_id, &player)
            .await?;
        tx.commit().await?;
        Ok(pair)
    }
    .await;
    match result {
        Ok((round, set)) => HttpResponse::Ok().json(serde_json::json!({
            "round": RoundResponse::from_round(&round),
            "phraseset_id": set.phraseset_id.inner(),
            "phrases": [set.original_phrase, set.copy_phrase_1, set.copy_phrase_2],
        })),
        Err(e) => error_response(&e),
    }
}

pub async fn submit_vote(
    state: web::Data<AppState>,
    path: web::Path<uuid::Uuid>,
    body: web::Json<VoteBody>,
) -> HttpResponse {
    let session_id = ID::from(path.into_inner());
    let result = async {
        let mut client = state.database.session().await?;
        let tx = client.transaction().await?;
        let player = load_player(&tx, body.player_id).await?;
        let submit = coordinator(&state)
            .submit_party_vote(
                &tx,
                session_id,
                &player,
                ID::from(body.round_id),
                ID::from(body.phraseset_id),
                &body.phrase,
            )
            .await?;
        tx.commit().await?;
        Ok(submit)
    }
    .await;
    match result {
        Ok(submit) => submit_response(&state, session_id, submit),
        Err(e) => error_response(&e),
    }
}

pub async fn results(state: web::Data<AppState>, path: web::Path<uuid::Uuid>) -> HttpResponse {
    let session_id = path.into_inner();
    let result = async {
        let client = state.database.session().await?;
        session_results(&client, ID::from(session_id)).await
    }
    .await;
    match result {
        Ok(results) => {
            let rankings: Vec<serde_json::Value> = results
                .rankings
                .iter()
                .map(|s| {
                    serde_json::json!({
                        "rank": s.rank,
                        "player_id": s.player_id.inner(),
                        "username": s.username,
                        "spent": s.spent,
                        "earned": s.earned,
                        "net": s.net,
                        "votes_on_originals": s.votes_on_originals,
                        "votes_fooled": s.votes_fooled,
                        "vote_accuracy": s.vote_accuracy,
                    })
                })
                .collect();
            let award = |a: &Option<pf_party::Award>| {
                a.as_ref().map(|a| {
                    serde_json::json!({
                        "player_id": a.player_id.inner(),
                        "username": a.username,
                        "metric": a.metric,
                    })
                })
            };
            HttpResponse::Ok().json(serde_json::json!({
                "session_id": results.session_id.inner(),
                "party_code": results.party_code,
                "rankings": rankings,
                "awards": {
                    "best_writer": award(&results.best_writer),
                    "top_impostor": award(&results.top_impostor),
                    "sharpest_voter": award(&results.sharpest_voter),
                },
            }))
        }
        Err(e) => error_response(&e),
    }
}

/// WebSocket bridge: register the connection with the broadcaster, flip
/// lobby presence, pump outbound events until the socket closes.
pub async fn websocket(
    state: web::Data<AppState>,
    path: web::Path<uuid::Uuid>,
    query: web::Query<WsQuery>,
    req: HttpRequest,
    stream: web::Payload,
) -> actix_web::Result<HttpResponse> {
    let session_uuid = path.into_inner();
    let player_id = query.player_id;
    let context = query.context.clone();

    let (response, mut ws_session, mut msg_stream) = actix_ws::handle(&req, stream)?;
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    state
        .broadcaster
        .connect(session_uuid, player_id, tx, context.clone())
        .await;

    // Presence flip runs best-effort in its own unit of work.
    {
        let state = state.clone();
        let context = context.clone();
        tokio::spawn(async move {
            let Ok(db) = state.database.session().await else {
                return;
            };
            let Ok(player) = load_player(&db, player_id).await else {
                return;
            };
            let service = party(&state);
            if let Err(error) = service
                .on_connect(&db, ID::from(session_uuid), &player, context.as_deref())
                .await
            {
                log::warn!("[party {}] presence connect failed: {}", session_uuid, error);
            }
        });
    }

    let state = state.clone();
    actix_web::rt::spawn(async move {
        use futures::StreamExt;
        'sesh: loop {
            tokio::select! {
                biased;
                event = rx.recv() => match event {
                    Some(json) => if ws_session.text(json).await.is_err() { break 'sesh },
                    None => break 'sesh,
                },
                msg = msg_stream.next() => match msg {
                    Some(Ok(actix_ws::Message::Ping(bytes))) => {
                        if ws_session.pong(&bytes).await.is_err() { break 'sesh }
                    }
                    Some(Ok(actix_ws::Message::Close(_))) => break 'sesh,
                    Some(Err(_)) => break 'sesh,
                    None => break 'sesh,
                    _ => continue 'sesh,
                },
            }
        }
        state.broadcaster.disconnect(session_uuid, player_id).await;
        if let Ok(db) = state.database.session().await {
            if let Ok(player) = load_player(&db, player_id).await {
                let service = party(&state);
                let _ = service
                    .on_disconnect(&db, ID::from(session_uuid), &player, context.as_deref())
                    .await;
            }
        }
        log::debug!("[party {}] ws closed for {}", session_uuid, player_id);
    });
    Ok(response)
}
