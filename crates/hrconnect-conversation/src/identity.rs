use hrconnect_core::ConversationId;

/// What an identity update did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityChange {
    Unchanged,
    /// A fresh session adopted its first id.
    Assigned(ConversationId),
    Switched {
        from: ConversationId,
        to: ConversationId,
    },
    Cleared(ConversationId),
}

impl IdentityChange {
    pub fn is_changed(&self) -> bool {
        !matches!(self, IdentityChange::Unchanged)
    }
}

/// Server-assigned id of the active conversation. `None` means a fresh chat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConversationIdentity {
    current: Option<ConversationId>,
}

impl ConversationIdentity {
    pub fn new(current: Option<ConversationId>) -> Self {
        Self { current }
    }

    pub fn get(&self) -> Option<ConversationId> {
        self.current
    }

    pub fn set(&mut self, next: Option<ConversationId>) -> IdentityChange {
        let change = match (self.current, next) {
            (a, b) if a == b => IdentityChange::Unchanged,
            (None, Some(to)) => IdentityChange::Assigned(to),
            (Some(from), Some(to)) => IdentityChange::Switched { from, to },
            (Some(from), None) => IdentityChange::Cleared(from),
            (None, None) => IdentityChange::Unchanged,
        };
        self.current = next;
        change
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_transitions() {
        let mut identity = ConversationIdentity::default();
        assert_eq!(identity.set(None), IdentityChange::Unchanged);
        assert_eq!(
            identity.set(Some(ConversationId(7))),
            IdentityChange::Assigned(ConversationId(7))
        );
        assert_eq!(identity.set(Some(ConversationId(7))), IdentityChange::Unchanged);
        assert_eq!(
            identity.set(Some(ConversationId(9))),
            IdentityChange::Switched {
                from: ConversationId(7),
                to: ConversationId(9)
            }
        );
        assert_eq!(identity.set(None), IdentityChange::Cleared(ConversationId(9)));
        assert_eq!(identity.get(), None);
    }
}
