use repochat_api::MessageRole;
use repochat_api::StoredMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl From<MessageRole> for Role {
    fn from(role: MessageRole) -> Self {
        match role {
            MessageRole::User => Role::User,
            MessageRole::Assistant => Role::Assistant,
        }
    }
}

impl From<Role> for MessageRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => MessageRole::User,
            Role::Assistant => MessageRole::Assistant,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    pub ordinal: u64,
}

/// Ordered conversation turns.
///
/// Turns are only ever added at the end. At most one turn is open (still
/// receiving fragments) and it is always the last one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    turns: Vec<ConversationTurn>,
    open: bool,
    next_ordinal: u64,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a transcript from stored history. Every turn is closed.
    pub fn from_history(history: impl IntoIterator<Item = StoredMessage>) -> Self {
        let mut transcript = Self::new();
        for message in history {
            transcript.push_turn(message.role.into(), message.content);
        }
        transcript
    }

    /// Fold one fragment into the transcript.
    ///
    /// Extends the last turn when it is open and has the same role; otherwise
    /// starts a new open turn. An empty fragment never creates a turn.
    pub fn append(&mut self, role: Role, fragment: &str) {
        if let Some(last) = self.turns.last_mut()
            && self.open
            && last.role == role
        {
            last.content.push_str(fragment);
            return;
        }
        if fragment.is_empty() {
            return;
        }
        self.start(role, fragment.to_string());
        self.open = true;
    }

    /// Add a complete, closed turn.
    pub fn push_turn(&mut self, role: Role, content: impl Into<String>) {
        self.start(role, content.into());
        self.open = false;
    }

    /// The owning exchange finished, successfully or not.
    pub fn close_open_turn(&mut self) {
        self.open = false;
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&ConversationTurn> {
        self.turns.last()
    }

    pub fn open_turn(&self) -> Option<&ConversationTurn> {
        self.turns.last().filter(|_| self.open)
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    fn start(&mut self, role: Role, content: String) {
        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        self.turns.push(ConversationTurn {
            role,
            content,
            ordinal,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn fragments_extend_the_open_turn_in_arrival_order() {
        let mut transcript = Transcript::new();
        transcript.push_turn(Role::User, "What does module X do?");
        for fragment in ["The ", "module ", "handles parsing."] {
            transcript.append(Role::Assistant, fragment);
        }
        transcript.close_open_turn();

        assert_eq!(
            transcript.turns(),
            &[
                ConversationTurn {
                    role: Role::User,
                    content: "What does module X do?".to_string(),
                    ordinal: 0,
                },
                ConversationTurn {
                    role: Role::Assistant,
                    content: "The module handles parsing.".to_string(),
                    ordinal: 1,
                },
            ]
        );
        assert_eq!(transcript.open_turn(), None);
    }

    #[test]
    fn closed_turn_is_never_extended() {
        let mut transcript = Transcript::new();
        transcript.append(Role::Assistant, "first");
        transcript.close_open_turn();
        transcript.append(Role::Assistant, "second");

        let contents: Vec<_> = transcript.turns().iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
        assert_eq!(transcript.open_turn().map(|t| t.ordinal), Some(1));
    }

    #[test]
    fn empty_fragments_without_an_open_turn_create_nothing() {
        let mut transcript = Transcript::new();
        transcript.append(Role::Assistant, "");
        transcript.close_open_turn();
        assert!(transcript.is_empty());
    }

    #[test]
    fn role_change_closes_the_previous_turn() {
        let mut transcript = Transcript::new();
        transcript.append(Role::User, "hi");
        transcript.append(Role::Assistant, "hello");
        transcript.append(Role::User, " again");

        let roles: Vec<_> = transcript.turns().iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User]);
        let ordinals: Vec<_> = transcript.turns().iter().map(|t| t.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2]);
    }

    #[test]
    fn history_maps_wire_roles() {
        let transcript = Transcript::from_history([
            StoredMessage {
                role: MessageRole::User,
                content: "q".to_string(),
                created_at: None,
            },
            StoredMessage {
                role: MessageRole::Assistant,
                content: "a".to_string(),
                created_at: None,
            },
        ]);
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.last().map(|t| t.role), Some(Role::Assistant));
        assert_eq!(transcript.open_turn(), None);
    }
}
