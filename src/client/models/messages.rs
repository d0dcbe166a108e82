use crate::client::models::app_state::ScopeToken;
use crate::client::services::command_dispatcher::InputKey;
use crate::common::error::{BackendError, ChatError};
use crate::common::models::{ChatGroup, ChatMessage};

#[derive(Debug, Clone)]
pub enum Message {
    NoOp,
    // Identity
    NameInputChanged(String),
    SubmitName,
    EditName,
    CancelEditName,
    // Groups
    GroupsLoaded(Result<Vec<ChatGroup>, BackendError>),
    GroupPushed(ChatGroup),
    SelectGroup(String),
    // Messages of the selected group, tagged with the scope they were requested for
    MessagesLoaded(ScopeToken, Result<Vec<ChatMessage>, BackendError>),
    MessagePushed(ScopeToken, ChatMessage),
    // Composer
    MessageInputChanged(String),
    KeyPressed(InputKey),
    SuggestionClicked(String),
    Submit,
    MessageSent(Result<ChatMessage, ChatError>),
    JoinResult(Result<ChatGroup, ChatError>),
    ReplyTo(String),
    CancelReply,
    AttachmentInputChanged(String),
    AttachImage,
    ClearAttachment,
    // Group creation
    OpenCreateGroup,
    CancelCreateGroup,
    CreateGroupNameChanged(String),
    CreateGroupPrivateToggled(bool),
    SubmitCreateGroup,
    GroupCreated(Result<ChatGroup, ChatError>),
    DismissAlert,
}
