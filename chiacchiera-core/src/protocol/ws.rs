/* This file defines how data "travel" through the web socket.
    Every frame is an envelope { type, payload }; frames sent by the client may also carry
    a requestId, echoed by the server in the Ack so that failures are visible to the client.
    ClientEvent -> events from client (authenticate, joinGroup, leaveGroup, chat message, user typing, read receipt)
    ServerEvent -> events from server (fan-out events, ack, authOk, error)
*/
use serde::{Deserialize, Serialize};

use crate::{
    error::Error,
    models::{Message, MessageKind, User},
};

/// Frame inviato dal client: envelope { type, payload } più un requestId opzionale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientFrame {
    /// Se presente, il server risponde con un Ack che lo riporta in `inReplyTo`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(flatten)]
    pub event: ClientEvent,
}

impl ClientFrame {
    pub fn new(event: ClientEvent) -> Self {
        Self { request_id: None, event }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

/// Client → Server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientEvent {
    /// Primo frame, se il token non è stato passato in query string.
    #[serde(rename = "authenticate")]
    Authenticate(Authenticate),
    #[serde(rename = "joinGroup")]
    JoinGroup(GroupRef),
    #[serde(rename = "leaveGroup")]
    LeaveGroup(GroupRef),
    /// Richiesta di inviare un messaggio.
    #[serde(rename = "chat message")]
    ChatMessage(SendMessage),
    #[serde(rename = "user typing")]
    Typing(Typing),
    #[serde(rename = "read receipt")]
    ReadReceipt(ReadReceipt),
}

impl ClientEvent {
    /// Nome dell'evento sul wire, utile nei log.
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Authenticate(_) => "authenticate",
            ClientEvent::JoinGroup(_) => "joinGroup",
            ClientEvent::LeaveGroup(_) => "leaveGroup",
            ClientEvent::ChatMessage(_) => "chat message",
            ClientEvent::Typing(_) => "user typing",
            ClientEvent::ReadReceipt(_) => "read receipt",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authenticate {
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRef {
    pub group_id: String,
}

/// Payload per l'intento di invio messaggio (C→S).
/// Il mittente non fa parte del payload: viene preso dalla sessione autenticata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    pub group_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<MessageKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Typing {
    pub group_id: String,
    #[serde(default = "default_true")]
    pub is_typing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub message_id: String,
    pub group_id: String,
}

/// Server → Client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerEvent {
    /// Autenticazione riuscita, contiene l'utente della sessione.
    #[serde(rename = "authOk")]
    AuthOk(User),
    /// Nuovo messaggio persistito (origine HTTP o WS, indistinguibili).
    #[serde(rename = "newMessage")]
    NewMessage(Message),
    /// Stesso messaggio sotto il nome storico dell'evento di chat.
    #[serde(rename = "chat message")]
    ChatMessage(Message),
    #[serde(rename = "messageEdited")]
    MessageEdited(Message),
    #[serde(rename = "messageDeleted")]
    MessageDeleted(MessageDeleted),
    #[serde(rename = "messageRead")]
    MessageRead(MessageRead),
    #[serde(rename = "user typing")]
    UserTyping(UserTyping),
    /// Riscontro ad un frame con requestId.
    #[serde(rename = "ack")]
    Ack(Ack),
    /// Errore fuori banda (es. autenticazione fallita).
    #[serde(rename = "error")]
    Error(Error),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::AuthOk(_) => "authOk",
            ServerEvent::NewMessage(_) => "newMessage",
            ServerEvent::ChatMessage(_) => "chat message",
            ServerEvent::MessageEdited(_) => "messageEdited",
            ServerEvent::MessageDeleted(_) => "messageDeleted",
            ServerEvent::MessageRead(_) => "messageRead",
            ServerEvent::UserTyping(_) => "user typing",
            ServerEvent::Ack(_) => "ack",
            ServerEvent::Error(_) => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDeleted {
    pub message_id: String,
    pub group_id: String,
    pub deleted_by: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRead {
    pub message_id: String,
    pub group_id: String,
    /// Utente che ha appena letto.
    pub user_id: String,
    /// Stato completo di readBy dopo la scrittura.
    pub read_by: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTyping {
    pub group_id: String,
    pub user_id: String,
    pub username: String,
    pub is_typing: bool,
}

/// Stato dell'acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AckStatus {
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "error")]
    Error,
}

/// Risposta del server ad un frame (S→C), inviata solo alla connessione che l'ha originato.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ack {
    /// requestId del frame a cui rispondiamo.
    pub in_reply_to: String,
    pub status: AckStatus,
    /// Presente se status = ok e il frame ha toccato un messaggio
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// Echo utile per client (facoltativo)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Presente se status = error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Error>,
}

impl Ack {
    pub fn ok(in_reply_to: impl Into<String>) -> Self {
        Self {
            in_reply_to: in_reply_to.into(),
            status: AckStatus::Ok,
            message_id: None,
            created_at: None,
            group_id: None,
            content: None,
            error: None,
        }
    }

    /// Ack positivo con l'echo del messaggio coinvolto.
    pub fn for_message(in_reply_to: impl Into<String>, message: &Message) -> Self {
        Self {
            message_id: Some(message.message_id.clone()),
            created_at: Some(message.created_at.clone()),
            group_id: Some(message.group_id.clone()),
            content: Some(message.content.clone()),
            ..Self::ok(in_reply_to)
        }
    }

    pub fn for_group(in_reply_to: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            group_id: Some(group_id.into()),
            ..Self::ok(in_reply_to)
        }
    }

    pub fn failed(in_reply_to: impl Into<String>, error: Error) -> Self {
        Self {
            status: AckStatus::Error,
            error: Some(error),
            ..Self::ok(in_reply_to)
        }
    }
}
