use actix_web::HttpResponse;
use pf_core::GameError;
use serde::Deserialize;
use serde::Serialize;

/// Map a domain error onto an HTTP response. Kinds stay visible to clients
/// as machine-readable tags.
pub fn error_response(error: &GameError) -> HttpResponse {
    let body = serde_json::json!({ "error": error.to_string() });
    match error {
        GameError::InsufficientBalance => HttpResponse::PaymentRequired().json(body),
        GameError::InvalidPhrase(_) | GameError::TooSimilar(_) => {
            HttpResponse::UnprocessableEntity().json(body)
        }
        GameError::RoundNotFound
        | GameError::SessionNotFound
        | GameError::SetNotFound
        | GameError::PlayerNotFound => HttpResponse::NotFound().json(body),
        GameError::Unauthorized => HttpResponse::Forbidden().json(body),
        GameError::AlreadyInRound
        | GameError::AlreadyVoted
        | GameError::AlreadyInSession
        | GameError::AlreadyClaimed
        | GameError::AlreadySubmitted
        | GameError::SessionFull
        | GameError::SessionAlreadyStarted
        | GameError::NotHost
        | GameError::NotEnoughPlayers
        | GameError::WrongPhase(_)
        | GameError::RoundExpired
        | GameError::RoundNotActive
        | GameError::RoundHasGuesses
        | GameError::SetNotOpen
        | GameError::SetNotVoting
        | GameError::VoteLockout
        | GameError::OutstandingLimit => HttpResponse::Conflict().json(body),
        GameError::NoEligibleWork => HttpResponse::NotFound().json(body),
        GameError::LockTimeout(_) => HttpResponse::ServiceUnavailable().json(body),
        GameError::AiGenerationFailed(_)
        | GameError::ProviderUnavailable(_)
        | GameError::Internal(_)
        | GameError::Store(_) => {
            log::error!("internal failure surfaced to client: {}", error);
            HttpResponse::InternalServerError().json(body)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PlayerBody {
    pub player_id: uuid::Uuid,
}

#[derive(Debug, Deserialize)]
pub struct GuestBody {
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BonusBody {
    pub player_id: uuid::Uuid,
    pub game: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitBody {
    pub player_id: uuid::Uuid,
    pub round_id: uuid::Uuid,
    pub phrase: String,
}

#[derive(Debug, Deserialize)]
pub struct VoteBody {
    pub player_id: uuid::Uuid,
    pub round_id: uuid::Uuid,
    pub phraseset_id: uuid::Uuid,
    pub phrase: String,
}

#[derive(Debug, Deserialize)]
pub struct AbandonBody {
    pub player_id: uuid::Uuid,
    pub round_id: uuid::Uuid,
}

#[derive(Debug, Deserialize)]
pub struct HintBody {
    pub player_id: uuid::Uuid,
    pub round_id: uuid::Uuid,
}

#[derive(Debug, Deserialize)]
pub struct JoinSetBody {
    pub player_id: uuid::Uuid,
    pub mode: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EntryBody {
    pub player_id: uuid::Uuid,
    pub words: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetVoteBody {
    pub player_id: uuid::Uuid,
    pub entry_id: uuid::Uuid,
}

#[derive(Debug, Deserialize)]
pub struct GuessBody {
    pub player_id: uuid::Uuid,
    pub guess: String,
}

#[derive(Debug, Deserialize)]
pub struct CreatePartyBody {
    pub player_id: uuid::Uuid,
    pub min_players: Option<i32>,
    pub max_players: Option<i32>,
    pub prompts_per_player: Option<i32>,
    pub copies_per_player: Option<i32>,
    pub votes_per_player: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub player_id: uuid::Uuid,
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RoundResponse {
    pub round_id: uuid::Uuid,
    pub round_type: String,
    pub status: String,
    pub prompt_text: String,
    pub cost: i64,
    pub expires_at_epoch_secs: u64,
}

impl RoundResponse {
    pub fn from_round(round: &pf_records::Round) -> Self {
        Self {
            round_id: round.round_id.inner(),
            round_type: round.round_type.as_str().to_string(),
            status: round.status.as_str().to_string(),
            prompt_text: round.prompt_text.clone(),
            cost: round.cost,
            expires_at_epoch_secs: round
                .expires_at
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        }
    }
}
