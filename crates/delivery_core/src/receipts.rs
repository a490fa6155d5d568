use std::collections::HashMap;

use shared::domain::{AccountId, ConversationId, MemberInfo, MessageId};
use tracing::debug;

/// A "seen" receipt whose target message has not been materialized yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReceipt {
    pub conversation_id: ConversationId,
    pub message_id: MessageId,
    pub account_id: AccountId,
    pub member_info: MemberInfo,
}

type ReceiptKey = (ConversationId, MessageId);

/// Receipts keyed by `(conversation, message)`. Ids are canonicalized on
/// construction, so lookups are case-insensitive.
#[derive(Debug, Default)]
pub struct PendingReceiptQueue {
    entries: HashMap<ReceiptKey, Vec<PendingReceipt>>,
}

impl PendingReceiptQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(
        &mut self,
        conversation_id: ConversationId,
        message_id: MessageId,
        account_id: AccountId,
        member_info: MemberInfo,
    ) {
        let queued = self
            .entries
            .entry((conversation_id.clone(), message_id.clone()))
            .or_default();

        // A repeat receipt from the same reader keeps its slot.
        if let Some(existing) = queued
            .iter_mut()
            .find(|receipt| receipt.account_id == account_id)
        {
            existing.member_info = member_info;
            return;
        }

        debug!(
            conversation_id = %conversation_id,
            message_id = %message_id,
            account_id = %account_id,
            "receipts: queued receipt for unloaded message"
        );
        queued.push(PendingReceipt {
            conversation_id,
            message_id,
            account_id,
            member_info,
        });
    }

    /// Removes every receipt queued for the key and hands each to `apply` in
    /// insertion order. Absent keys are a no-op.
    pub fn flush<F>(
        &mut self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
        mut apply: F,
    ) -> usize
    where
        F: FnMut(PendingReceipt),
    {
        let Some(queued) = self
            .entries
            .remove(&(conversation_id.clone(), message_id.clone()))
        else {
            return 0;
        };
        let flushed = queued.len();
        for receipt in queued {
            apply(receipt);
        }
        flushed
    }

    pub fn clear_conversation(&mut self, conversation_id: &ConversationId) -> usize {
        let mut dropped = 0;
        self.entries.retain(|(queued_conversation, _), queued| {
            if queued_conversation == conversation_id {
                dropped += queued.len();
                false
            } else {
                true
            }
        });
        dropped
    }

    pub fn pending_for(
        &self,
        conversation_id: &ConversationId,
        message_id: &MessageId,
    ) -> &[PendingReceipt] {
        self.entries
            .get(&(conversation_id.clone(), message_id.clone()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[path = "tests/receipts_tests.rs"]
mod tests;
