use serde::Deserialize;
use serde::Serialize;

/// Per-participant progress counters carried on progress events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressCounts {
    pub prompts_submitted: i32,
    pub copies_submitted: i32,
    pub votes_submitted: i32,
}

/// Session-wide progress summary for the current phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionProgress {
    pub players_done_with_phase: usize,
    pub total_players: usize,
}

/// Everything a party session can tell its subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PartyEvent {
    PlayerJoined {
        session_id: uuid::Uuid,
        player_id: uuid::Uuid,
        username: String,
    },
    PlayerLeft {
        session_id: uuid::Uuid,
        player_id: uuid::Uuid,
        new_host_id: Option<uuid::Uuid>,
    },
    PlayerReady {
        session_id: uuid::Uuid,
        player_id: uuid::Uuid,
    },
    HostPing {
        session_id: uuid::Uuid,
        message: String,
    },
    SessionStarted {
        session_id: uuid::Uuid,
    },
    PhaseTransition {
        session_id: uuid::Uuid,
        old_phase: String,
        new_phase: String,
        message: String,
    },
    ProgressUpdate {
        session_id: uuid::Uuid,
        player_id: uuid::Uuid,
        username: String,
        action: String,
        progress: ProgressCounts,
        session_progress: SessionProgress,
    },
    SessionCompleted {
        session_id: uuid::Uuid,
    },
    SessionUpdate {
        session_id: uuid::Uuid,
        reason: String,
        message: String,
    },
}

impl PartyEvent {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("party events serialize")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_tag_their_type() {
        let event = PartyEvent::PhaseTransition {
            session_id: uuid::Uuid::now_v7(),
            old_phase: "PROMPT".into(),
            new_phase: "COPY".into(),
            message: "All prompts submitted".into(),
        };
        let json = event.to_json();
        assert!(json.contains("\"type\":\"phase_transition\""));
        assert!(json.contains("\"new_phase\":\"COPY\""));
    }
}
