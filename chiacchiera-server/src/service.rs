//! Message service: the one write path shared by the HTTP API and the real-time gateway.
//!
//! Order of every mutation: membership check, durable store write, then fan-out to the
//! group room. A failed write returns before anything is published.
//!
//! Every mutation of a message holds that message's write lock from the store write until
//! its event is published, so the events of one message leave in the order the writes
//! completed. Different messages never wait on each other.

use std::sync::Arc;

use chiacchiera_core::{
    models::{Message, MessageKind, User},
    utils::new_id,
    CreateMessageRequest, ListMessagesResponse, MessageDeleted, MessageRead, Pagination, ServerEvent,
};
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{ChatError, Result};
use crate::groups::{ensure_member, GroupDirectory};
use crate::presence::Presence;
use crate::store::{MessageStore, NewMessage};

pub const DEFAULT_PAGE_LIMIT: u64 = 50;
pub const MAX_PAGE_LIMIT: u64 = 100;

/// Server-side pagination policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_limit: u64,
    pub max_limit: u64,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_PAGE_LIMIT,
            max_limit: MAX_PAGE_LIMIT,
        }
    }
}

fn positive(raw: Option<&str>) -> Option<u64> {
    raw.and_then(|s| s.trim().parse::<u64>().ok()).filter(|n| *n > 0)
}

impl PageLimits {
    /// Turns raw `page` / `limit` query values into `(page, limit)`.
    /// Anything that is not a positive integer falls back to the default; `limit` is capped.
    pub fn resolve(&self, page: Option<&str>, limit: Option<&str>) -> (u64, u64) {
        let page = positive(page).unwrap_or(1);
        let limit = positive(limit)
            .unwrap_or(self.default_limit)
            .min(self.max_limit.max(1));
        (page, limit)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Checks a client draft and turns it into a store record for `sender`.
fn validate_draft(group_id: &str, sender: &User, draft: CreateMessageRequest) -> Result<NewMessage> {
    let kind = draft.kind.unwrap_or_default();
    if kind == MessageKind::System {
        return Err(ChatError::invalid("system messages cannot be sent by clients"));
    }
    let media_url = non_blank(draft.media_url);
    let media_type = non_blank(draft.media_type);
    if kind == MessageKind::Text && draft.content.trim().is_empty() {
        return Err(ChatError::invalid("content is required"));
    }
    if kind.requires_media() && media_url.is_none() {
        return Err(ChatError::invalid("mediaUrl is required for image and file messages"));
    }
    if media_url.is_some() && media_type.is_none() {
        return Err(ChatError::invalid("mediaType is required when mediaUrl is set"));
    }
    Ok(NewMessage {
        message_id: new_id(),
        group_id: group_id.to_string(),
        sender: sender.clone(),
        content: draft.content,
        kind,
        media_url,
        media_type,
        reply_to: non_blank(draft.reply_to),
    })
}

/// Per-message write locks. An entry lives only while someone holds or waits for it.
#[derive(Clone, Default)]
struct WriteLocks(Arc<DashMap<String, Arc<Mutex<()>>>>);

struct WriteGuard {
    locks: WriteLocks,
    message_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl WriteLocks {
    async fn acquire(&self, message_id: &str) -> WriteGuard {
        let mutex = Arc::clone(self.0.entry(message_id.to_string()).or_default().value());
        let guard = mutex.lock_owned().await;
        WriteGuard {
            locks: self.clone(),
            message_id: message_id.to_string(),
            guard: Some(guard),
        }
    }

    fn len(&self) -> usize {
        self.0.len()
    }
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        self.guard.take();
        // the map's own Arc is the last one: nobody holds or waits for this lock
        self.locks
            .0
            .remove_if(&self.message_id, |_, m| Arc::strong_count(m) == 1);
    }
}

#[derive(Clone)]
pub struct MessageService {
    store: MessageStore,
    groups: Arc<dyn GroupDirectory>,
    presence: Arc<dyn Presence>,
    limits: PageLimits,
    locks: WriteLocks,
}

impl MessageService {
    pub fn new(
        store: MessageStore,
        groups: Arc<dyn GroupDirectory>,
        presence: Arc<dyn Presence>,
        limits: PageLimits,
    ) -> Self {
        Self {
            store,
            groups,
            presence,
            limits,
            locks: WriteLocks::default(),
        }
    }

    /// Write locks currently alive.
    pub fn pending_write_locks(&self) -> usize {
        self.locks.len()
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn limits(&self) -> PageLimits {
        self.limits
    }

    /// A live message of `group_id`; deleted messages and messages of other groups are `NotFound`.
    async fn live_message(&self, group_id: &str, message_id: &str) -> Result<Message> {
        match self.store.get(message_id).await? {
            Some(m) if m.group_id == group_id && !m.deleted => Ok(m),
            _ => Err(ChatError::not_found("message not found")),
        }
    }

    /// Appends a message sent by `sender` and broadcasts `newMessage` and `chat message` to the room.
    pub async fn send(&self, sender: &User, group_id: &str, draft: CreateMessageRequest) -> Result<Message> {
        ensure_member(self.groups.as_ref(), group_id, &sender.user_id).await?;
        let new = validate_draft(group_id, sender, draft)?;
        let _guard = self.locks.acquire(&new.message_id).await;
        let message = self.store.append(new).await?;

        tracing::info!(group_id, message_id = %message.message_id, sender = %sender.user_id, "message stored");
        self.presence
            .publish(group_id, &ServerEvent::NewMessage(message.clone()), None);
        self.presence
            .publish(group_id, &ServerEvent::ChatMessage(message.clone()), None);
        Ok(message)
    }

    pub async fn edit(&self, actor: &User, group_id: &str, message_id: &str, content: &str) -> Result<Message> {
        ensure_member(self.groups.as_ref(), group_id, &actor.user_id).await?;
        if content.trim().is_empty() {
            return Err(ChatError::invalid("content is required"));
        }
        let _guard = self.locks.acquire(message_id).await;
        self.live_message(group_id, message_id).await?;
        let message = self.store.edit(message_id, &actor.user_id, content).await?;

        self.presence
            .publish(group_id, &ServerEvent::MessageEdited(message.clone()), None);
        Ok(message)
    }

    /// Soft-deletes a message. Only the sender may delete.
    pub async fn delete(&self, actor: &User, group_id: &str, message_id: &str) -> Result<()> {
        ensure_member(self.groups.as_ref(), group_id, &actor.user_id).await?;
        let _guard = self.locks.acquire(message_id).await;
        let message = self.live_message(group_id, message_id).await?;
        if message.sender_id != actor.user_id {
            return Err(ChatError::unauthorized("only the sender can delete a message"));
        }
        self.store.soft_delete(message_id, &actor.user_id).await?;

        tracing::info!(group_id, message_id, by = %actor.user_id, "message deleted");
        self.presence.publish(
            group_id,
            &ServerEvent::MessageDeleted(MessageDeleted {
                message_id: message_id.to_string(),
                group_id: group_id.to_string(),
                deleted_by: actor.user_id.clone(),
            }),
            None,
        );
        Ok(())
    }

    /// Records a read receipt and broadcasts `messageRead` to the whole room, reader included.
    pub async fn mark_read(&self, reader: &User, group_id: &str, message_id: &str) -> Result<Message> {
        ensure_member(self.groups.as_ref(), group_id, &reader.user_id).await?;
        let _guard = self.locks.acquire(message_id).await;
        self.live_message(group_id, message_id).await?;
        self.store.mark_read(message_id, &reader.user_id).await?;
        let message = self
            .store
            .get(message_id)
            .await?
            .ok_or_else(|| ChatError::not_found("message not found"))?;

        self.presence.publish(
            group_id,
            &ServerEvent::MessageRead(MessageRead {
                message_id: message_id.to_string(),
                group_id: group_id.to_string(),
                user_id: reader.user_id.clone(),
                read_by: message.read_by.clone(),
            }),
            None,
        );
        Ok(message)
    }

    /// History page for a member. `page` and `limit` are raw query values.
    pub async fn list(
        &self,
        reader: &User,
        group_id: &str,
        page: Option<&str>,
        limit: Option<&str>,
    ) -> Result<ListMessagesResponse> {
        ensure_member(self.groups.as_ref(), group_id, &reader.user_id).await?;
        let (page, limit) = self.limits.resolve(page, limit);
        let (messages, total) = self.store.list(group_id, page, limit).await?;
        Ok(ListMessagesResponse {
            messages,
            pagination: Pagination::new(total, page, limit),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> User {
        User {
            user_id: "u1".to_string(),
            username: "alice".to_string(),
            avatar_url: Some("https://cdn/a.png".to_string()),
            role: "user".to_string(),
            created_at: "2025-11-02T10:00:00Z".to_string(),
        }
    }

    fn draft(content: &str) -> CreateMessageRequest {
        CreateMessageRequest {
            content: content.to_string(),
            kind: None,
            media_url: None,
            media_type: None,
            reply_to: None,
        }
    }

    #[tokio::test]
    async fn write_locks_serialize_and_are_released() {
        let locks = WriteLocks::default();
        let first = locks.acquire("m1").await;
        let other = locks.acquire("m2").await;
        assert_eq!(locks.len(), 2);

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _g = locks.acquire("m1").await;
            })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(first);
        waiter.await.expect("waiter");
        drop(other);
        assert_eq!(locks.len(), 0);
    }

    #[test]
    fn page_limits_fall_back_to_defaults() {
        let limits = PageLimits::default();
        assert_eq!(limits.resolve(None, None), (1, 50));
        assert_eq!(limits.resolve(Some("3"), Some("20")), (3, 20));
        assert_eq!(limits.resolve(Some("0"), Some("-5")), (1, 50));
        assert_eq!(limits.resolve(Some("abc"), Some("2.5")), (1, 50));
        assert_eq!(limits.resolve(Some("2"), Some("1000")), (2, 100));
    }

    #[test]
    fn text_draft_takes_sender_from_session() {
        let new = validate_draft("g", &alice(), draft("hello")).expect("valid");
        assert_eq!(new.kind, MessageKind::Text);
        assert_eq!(new.sender.user_id, "u1");
        assert_eq!(new.sender.avatar_url.as_deref(), Some("https://cdn/a.png"));
    }

    #[test]
    fn invalid_drafts_are_rejected() {
        let err = validate_draft("g", &alice(), draft("   ")).unwrap_err();
        assert!(matches!(err, ChatError::InvalidArgument(_)));

        let mut image = draft("");
        image.kind = Some(MessageKind::Image);
        assert!(matches!(
            validate_draft("g", &alice(), image.clone()),
            Err(ChatError::InvalidArgument(_))
        ));

        image.media_url = Some("https://cdn/x.png".to_string());
        assert!(matches!(
            validate_draft("g", &alice(), image.clone()),
            Err(ChatError::InvalidArgument(_))
        ));

        image.media_type = Some("image/png".to_string());
        assert!(validate_draft("g", &alice(), image).is_ok());

        let mut system = draft("joined");
        system.kind = Some(MessageKind::System);
        assert!(matches!(
            validate_draft("g", &alice(), system),
            Err(ChatError::InvalidArgument(_))
        ));
    }
}
