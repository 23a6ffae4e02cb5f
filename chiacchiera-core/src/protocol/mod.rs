pub mod ws;
pub mod http;

// Re-export comodi
pub use ws::{
    Ack, AckStatus, Authenticate, ClientEvent, ClientFrame, GroupRef, MessageDeleted, MessageRead,
    ReadReceipt, SendMessage, ServerEvent, Typing, UserTyping,
};
pub use http::{
    AddMemberRequest, CreateGroupRequest, CreateMessageRequest, EditMessageRequest, GroupResponse,
    ListGroupsResponse, ListMessagesResponse, LoginRequest, LoginResponse, Pagination,
    RegisterRequest, RegisterResponse,
};
