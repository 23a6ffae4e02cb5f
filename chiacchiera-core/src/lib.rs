//! chiacchiera-core: tipi condivisi tra client e server (modelli, DTO HTTP, frame WS, errori).
//! Niente I/O o dipendenze non compatibili con WASM.

pub mod models;
pub mod protocol;
pub mod error;
pub mod utils;

// Re-export utili per ridurre i percorsi nei crate client/server
pub use error::Error;
pub use models::{group::Group, message::Message, message::MessageKind, message::ReplyPreview, user::User};
pub use protocol::ws::{
    Ack, AckStatus, Authenticate, ClientEvent, ClientFrame, GroupRef, MessageDeleted, MessageRead,
    ReadReceipt, SendMessage, ServerEvent, Typing, UserTyping,
};
pub use protocol::http::{
    AddMemberRequest, CreateGroupRequest, CreateMessageRequest, EditMessageRequest, GroupResponse,
    ListGroupsResponse, ListMessagesResponse, LoginRequest, LoginResponse, Pagination,
    RegisterRequest, RegisterResponse,
};
pub use utils::{new_id, now_timestamp};
