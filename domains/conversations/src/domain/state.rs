//! State machines for conversation and message status
//!
//! Conversation states: Active ↔ Archived, either → Deleted (terminal)
//! Message states: Pending → Sent → Delivered, any non-terminal → Error (terminal)

pub use thicode_common::StateError;

// ============================================================================
// Conversation State Machine
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversationState {
    Active,
    Archived,
    Deleted,
}

impl ConversationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Deleted)
    }

    /// Get all valid next states from current state
    pub fn valid_transitions(&self) -> &'static [ConversationState] {
        match self {
            Self::Active => &[Self::Archived, Self::Deleted],
            Self::Archived => &[Self::Active, Self::Deleted],
            Self::Deleted => &[],
        }
    }
}

impl std::fmt::Display for ConversationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Archived => write!(f, "archived"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

/// Events that trigger conversation state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationEvent {
    Archive,
    /// Reactivate an archived conversation
    Restore,
    Delete,
}

impl std::fmt::Display for ConversationEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Archive => write!(f, "archive"),
            Self::Restore => write!(f, "restore"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

pub struct ConversationStateMachine;

impl ConversationStateMachine {
    /// Attempt a state transition
    pub fn transition(
        current: ConversationState,
        event: ConversationEvent,
    ) -> Result<ConversationState, StateError> {
        if current.is_terminal() {
            return Err(StateError::TerminalState(current.to_string()));
        }

        match (current, event) {
            (ConversationState::Active, ConversationEvent::Archive) => {
                Ok(ConversationState::Archived)
            }
            (ConversationState::Archived, ConversationEvent::Restore) => {
                Ok(ConversationState::Active)
            }
            (_, ConversationEvent::Delete) => Ok(ConversationState::Deleted),
            _ => Err(StateError::InvalidTransition {
                from: current.to_string(),
                event: event.to_string(),
            }),
        }
    }
}

// ============================================================================
// Message State Machine
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageState {
    Pending,
    Sent,
    Delivered,
    Error,
}

impl MessageState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error)
    }

    pub fn valid_transitions(&self) -> &'static [MessageState] {
        match self {
            Self::Pending => &[Self::Sent, Self::Error],
            Self::Sent => &[Self::Delivered, Self::Error],
            Self::Delivered => &[Self::Error],
            Self::Error => &[],
        }
    }
}

impl std::fmt::Display for MessageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Sent => write!(f, "sent"),
            Self::Delivered => write!(f, "delivered"),
            Self::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageEvent {
    Send,
    Deliver,
    Fail,
}

impl std::fmt::Display for MessageEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Send => write!(f, "send"),
            Self::Deliver => write!(f, "deliver"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

pub struct MessageStateMachine;

impl MessageStateMachine {
    pub fn transition(current: MessageState, event: MessageEvent) -> Result<MessageState, StateError> {
        if current.is_terminal() {
            return Err(StateError::TerminalState(current.to_string()));
        }

        match (current, event) {
            (MessageState::Pending, MessageEvent::Send) => Ok(MessageState::Sent),
            (MessageState::Sent, MessageEvent::Deliver) => Ok(MessageState::Delivered),
            (_, MessageEvent::Fail) => Ok(MessageState::Error),
            _ => Err(StateError::InvalidTransition {
                from: current.to_string(),
                event: event.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_to_archived() {
        let result = ConversationStateMachine::transition(
            ConversationState::Active,
            ConversationEvent::Archive,
        );
        assert_eq!(result, Ok(ConversationState::Archived));
    }

    #[test]
    fn test_archived_to_active() {
        let result = ConversationStateMachine::transition(
            ConversationState::Archived,
            ConversationEvent::Restore,
        );
        assert_eq!(result, Ok(ConversationState::Active));
    }

    #[test]
    fn test_active_cannot_restore() {
        let result = ConversationStateMachine::transition(
            ConversationState::Active,
            ConversationEvent::Restore,
        );
        assert!(matches!(result, Err(StateError::InvalidTransition { .. })));
    }

    #[test]
    fn test_archived_cannot_archive() {
        let result = ConversationStateMachine::transition(
            ConversationState::Archived,
            ConversationEvent::Archive,
        );
        assert!(matches!(result, Err(StateError::InvalidTransition { .. })));
    }

    #[test]
    fn test_delete_from_active_and_archived() {
        for state in [ConversationState::Active, ConversationState::Archived] {
            assert_eq!(
                ConversationStateMachine::transition(state, ConversationEvent::Delete),
                Ok(ConversationState::Deleted)
            );
        }
    }

    #[test]
    fn test_deleted_is_terminal() {
        for event in [
            ConversationEvent::Archive,
            ConversationEvent::Restore,
            ConversationEvent::Delete,
        ] {
            let result = ConversationStateMachine::transition(ConversationState::Deleted, event);
            assert!(matches!(result, Err(StateError::TerminalState(_))));
        }
        assert!(ConversationState::Deleted.valid_transitions().is_empty());
    }

    #[test]
    fn test_conversation_transitions_match_machine() {
        let events = [
            ConversationEvent::Archive,
            ConversationEvent::Restore,
            ConversationEvent::Delete,
        ];
        for state in [ConversationState::Active, ConversationState::Archived] {
            for event in events {
                if let Ok(next) = ConversationStateMachine::transition(state, event) {
                    assert!(state.valid_transitions().contains(&next));
                }
            }
        }
    }

    #[test]
    fn test_message_happy_path() {
        let sent = MessageStateMachine::transition(MessageState::Pending, MessageEvent::Send);
        assert_eq!(sent, Ok(MessageState::Sent));
        let delivered = MessageStateMachine::transition(MessageState::Sent, MessageEvent::Deliver);
        assert_eq!(delivered, Ok(MessageState::Delivered));
    }

    #[test]
    fn test_message_cannot_deliver_before_send() {
        let result = MessageStateMachine::transition(MessageState::Pending, MessageEvent::Deliver);
        assert!(matches!(result, Err(StateError::InvalidTransition { .. })));
    }

    #[test]
    fn test_message_cannot_send_twice() {
        let result = MessageStateMachine::transition(MessageState::Sent, MessageEvent::Send);
        assert!(matches!(result, Err(StateError::InvalidTransition { .. })));
    }

    #[test]
    fn test_message_fail_from_any_live_state() {
        for state in [
            MessageState::Pending,
            MessageState::Sent,
            MessageState::Delivered,
        ] {
            assert_eq!(
                MessageStateMachine::transition(state, MessageEvent::Fail),
                Ok(MessageState::Error)
            );
        }
    }

    #[test]
    fn test_message_error_is_terminal() {
        let result = MessageStateMachine::transition(MessageState::Error, MessageEvent::Fail);
        assert!(matches!(result, Err(StateError::TerminalState(_))));
    }
}
