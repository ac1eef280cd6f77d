use thiserror::Error;

/// Errors surfaced to command adapters.
///
/// Input validation variants are raised before any state change; once a
/// mutation has begun all writes for the operation run inside a single
/// storage transaction, so a late error never leaves partial state behind.
#[derive(Debug, Error)]
pub enum GameError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("action '{action}' requires reputation {required} but {player} has {actual}")]
    ThresholdNotMet {
        action: String,
        required: i64,
        player: String,
        actual: i64,
    },

    #[error("not enough {faction} influence (have {have}, need {need})")]
    InsufficientInfluence {
        faction: String,
        have: i64,
        need: i64,
    },

    #[error("action '{action}' is on cooldown for {remaining} more digest(s)")]
    CooldownActive { action: String, remaining: i64 },

    #[error("game is paused: {reason}")]
    GamePaused { reason: String },

    #[error("narrative enhancer failed: {0}")]
    EnhancerFailure(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl GameError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, GameError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_particulars() {
        let err = GameError::ThresholdNotMet {
            action: "recruitment".into(),
            required: 5,
            player: "alice".into(),
            actual: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("recruitment"));
        assert!(msg.contains('5'));
        assert!(msg.contains("alice"));

        let err = GameError::InsufficientInfluence {
            faction: "academia".into(),
            have: 1,
            need: 4,
        };
        assert!(err.to_string().contains("academia"));
    }
}
