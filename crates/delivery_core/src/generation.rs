use std::sync::atomic::{AtomicU64, Ordering};

use shared::domain::ConversationId;

/// Captured when an async request is issued; checked before its result is
/// applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationToken {
    context: ConversationId,
    value: u64,
}

impl GenerationToken {
    pub fn context(&self) -> &ConversationId {
        &self.context
    }

    pub fn value(&self) -> u64 {
        self.value
    }
}

/// Issues monotonically increasing tokens. Only the most recently issued token
/// is current, whatever context it was issued for.
#[derive(Debug, Default)]
pub struct GenerationGuard {
    latest: AtomicU64,
}

impl GenerationGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_generation(&self, context: &ConversationId) -> GenerationToken {
        let value = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        GenerationToken {
            context: context.clone(),
            value,
        }
    }

    pub fn is_current(&self, token: &GenerationToken) -> bool {
        self.latest.load(Ordering::SeqCst) == token.value
    }

    /// Retires the current token without issuing a replacement.
    pub fn invalidate(&self) {
        self.latest.fetch_add(1, Ordering::SeqCst);
    }

    pub fn latest(&self) -> u64 {
        self.latest.load(Ordering::SeqCst)
    }
}
