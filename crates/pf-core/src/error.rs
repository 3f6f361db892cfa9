use std::fmt;

/// Domain error taxonomy for the coordinator.
///
/// Kinds map one-to-one onto user-visible failure modes; storage and
/// provider failures carry their source. Services return these rather than
/// driving control flow through panics, which are reserved for invariant
/// violations.
#[derive(Debug)]
pub enum GameError {
    /// Wallet debit would go negative; no state change occurred.
    InsufficientBalance,
    /// Phrase failed validation; the round stays active so the player can retry.
    InvalidPhrase(String),
    /// The work matcher found nothing eligible for this player.
    NoEligibleWork,
    AlreadyInRound,
    AlreadyVoted,
    AlreadyInSession,
    /// Daily bonus already claimed for the current UTC day.
    AlreadyClaimed,
    AlreadySubmitted,
    SessionNotFound,
    SessionFull,
    SessionAlreadyStarted,
    NotHost,
    NotEnoughPlayers,
    /// Operation attempted outside its session phase.
    WrongPhase(String),
    RoundNotFound,
    RoundNotActive,
    /// Submission arrived past `expires_at + grace`; never auto-retried.
    RoundExpired,
    /// TL rounds cannot be abandoned once a guess exists.
    RoundHasGuesses,
    Unauthorized,
    /// Named lock acquisition timed out.
    LockTimeout(String),
    /// AI generation produced nothing usable; content remains stalled.
    AiGenerationFailed(String),
    /// Embedding or LLM provider was unreachable.
    ProviderUnavailable(String),
    /// Underlying store failure.
    Store(tokio_postgres::Error),
    /// Guess was too similar to a prior guess in the same round.
    TooSimilar(String),
    SetNotFound,
    SetNotOpen,
    SetNotVoting,
    PlayerNotFound,
    /// Guest is locked out of voting after consecutive incorrect votes.
    VoteLockout,
    /// Too many submitted prompts still waiting for copies.
    OutstandingLimit,
    /// Invariant-adjacent failure with context; logged and bubbled up.
    Internal(String),
}

impl fmt::Display for GameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientBalance => write!(f, "insufficient_balance"),
            Self::InvalidPhrase(reason) => write!(f, "invalid_phrase: {}", reason),
            Self::NoEligibleWork => write!(f, "no_eligible_work"),
            Self::AlreadyInRound => write!(f, "already_in_round"),
            Self::AlreadyVoted => write!(f, "already_voted"),
            Self::AlreadyInSession => write!(f, "already_in_session"),
            Self::AlreadyClaimed => write!(f, "already_claimed"),
            Self::AlreadySubmitted => write!(f, "already_submitted"),
            Self::SessionNotFound => write!(f, "session_not_found"),
            Self::SessionFull => write!(f, "session_full"),
            Self::SessionAlreadyStarted => write!(f, "session_already_started"),
            Self::NotHost => write!(f, "not_host"),
            Self::NotEnoughPlayers => write!(f, "not_enough_players"),
            Self::WrongPhase(phase) => write!(f, "wrong_phase: {}", phase),
            Self::RoundNotFound => write!(f, "round_not_found"),
            Self::RoundNotActive => write!(f, "round_not_active"),
            Self::RoundExpired => write!(f, "round_expired"),
            Self::RoundHasGuesses => write!(f, "round_has_guesses"),
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::LockTimeout(name) => write!(f, "lock_timeout: {}", name),
            Self::AiGenerationFailed(why) => write!(f, "ai_generation_failed: {}", why),
            Self::ProviderUnavailable(who) => write!(f, "provider_unavailable: {}", who),
            Self::Store(e) => write!(f, "store_error: {}", e),
            Self::TooSimilar(note) => write!(f, "too_similar: {}", note),
            Self::SetNotFound => write!(f, "set_not_found"),
            Self::SetNotOpen => write!(f, "set_not_open"),
            Self::SetNotVoting => write!(f, "set_not_in_voting_phase"),
            Self::PlayerNotFound => write!(f, "player_not_found"),
            Self::VoteLockout => write!(f, "vote_lockout"),
            Self::OutstandingLimit => write!(f, "too_many_outstanding_prompts"),
            Self::Internal(context) => write!(f, "internal_error: {}", context),
        }
    }
}

impl std::error::Error for GameError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<tokio_postgres::Error> for GameError {
    fn from(e: tokio_postgres::Error) -> Self {
        Self::Store(e)
    }
}

impl GameError {
    /// Whether the AI orchestrator's backoff loop should retry this failure.
    /// Only lock timeouts and transient store errors qualify; everything
    /// else fails fast.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::LockTimeout(_) => true,
            Self::Store(e) => e.is_closed() || e.as_db_error().is_none(),
            _ => false,
        }
    }
}

/// Convenience alias for service results.
pub type GameResult<T> = Result<T, GameError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_timeout_is_retryable() {
        assert!(GameError::LockTimeout("player:x".into()).is_retryable());
    }

    #[test]
    fn domain_errors_fail_fast() {
        assert!(!GameError::InsufficientBalance.is_retryable());
        assert!(!GameError::InvalidPhrase("too short".into()).is_retryable());
        assert!(!GameError::RoundExpired.is_retryable());
    }

    #[test]
    fn display_is_kind_tagged() {
        assert_eq!(
            GameError::InvalidPhrase("needs 2 words".into()).to_string(),
            "invalid_phrase: needs 2 words"
        );
        assert_eq!(GameError::NoEligibleWork.to_string(), "no_eligible_work");
    }
}
