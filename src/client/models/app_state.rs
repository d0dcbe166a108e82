use log::{debug, info, warn};

use crate::client::models::live_collection::LiveCollection;
use crate::client::services::chat_service::{NewGroupRequest, OutgoingMessage};
use crate::client::services::command_dispatcher::{
    self, CommandDispatcher, InputKey, KeyOutcome, Submission,
};
use crate::client::utils::identity_store::IdentityStore;
use crate::common::error::{BackendError, ChatError};
use crate::common::models::{ChatGroup, ChatMessage};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AppState {
    #[default]
    NamePrompt,
    Chat,
    CreateGroup,
}

/// Generation of the selected group. Results tagged with an older token are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ScopeToken(pub u64);

/// What a submit asks the caller to do over the network
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitAction {
    Join { code: String },
    Post(OutgoingMessage),
}

/// How a reply target renders
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReplyPreview<'a> {
    Found(&'a ChatMessage),
    /// The referenced message is not in the local collection
    Missing,
}

/// Client state owned by the top-level view and passed down to everything else.
#[derive(Debug)]
pub struct ChatAppState {
    pub app_state: AppState,
    pub identity: IdentityStore,
    pub name_input: String,
    pub groups: LiveCollection<ChatGroup>,
    pub messages: LiveCollection<ChatMessage>,
    pub current_group: Option<String>,
    pub scope: ScopeToken,
    pub message_input: String,
    pub reply_to: Option<String>,
    pub attachment: Option<String>,
    pub attachment_input: String,
    pub dispatcher: CommandDispatcher,
    /// Blocking alert text; the view keeps it up until dismissed
    pub alert: Option<String>,
    pub create_group_name: String,
    pub create_group_private: bool,
    pub loading_messages: bool,
    pub sending: bool,
}

impl ChatAppState {
    pub fn new(identity: IdentityStore) -> Self {
        let app_state = if identity.is_set() { AppState::Chat } else { AppState::NamePrompt };
        Self {
            app_state,
            identity,
            name_input: String::new(),
            groups: LiveCollection::new(),
            messages: LiveCollection::new(),
            current_group: None,
            scope: ScopeToken::default(),
            message_input: String::new(),
            reply_to: None,
            attachment: None,
            attachment_input: String::new(),
            dispatcher: CommandDispatcher::new(),
            alert: None,
            create_group_name: String::new(),
            create_group_private: false,
            loading_messages: false,
            sending: false,
        }
    }

    /// Chat functionality is reachable only once a display name exists.
    pub fn is_ready(&self) -> bool {
        self.identity.is_set()
    }

    pub fn username(&self) -> &str {
        self.identity.name().unwrap_or("")
    }

    /// Applies the name typed in the prompt. Returns true if the name was accepted.
    pub fn submit_name(&mut self) -> bool {
        let typed = self.name_input.clone();
        self.set_name(&typed)
    }

    pub fn set_name(&mut self, name: &str) -> bool {
        match self.identity.set_name(name) {
            Ok(false) => return false,
            Ok(true) => {}
            Err(e) => {
                warn!("[IDENTITY] {}", e);
                self.alert = Some(ChatError::Identity(e.to_string()).to_string());
            }
        }
        self.name_input.clear();
        if self.app_state == AppState::NamePrompt {
            self.app_state = AppState::Chat;
        }
        true
    }

    pub fn open_name_prompt(&mut self) {
        self.name_input = self.username().to_string();
        self.app_state = AppState::NamePrompt;
    }

    pub fn is_own_message(&self, msg: &ChatMessage) -> bool {
        self.identity.name().is_some_and(|n| n == msg.user_id)
    }

    // ---- groups ----

    pub fn apply_initial_groups(&mut self, result: Result<Vec<ChatGroup>, BackendError>) {
        match result {
            Ok(groups) => {
                let listed: Vec<ChatGroup> = groups
                    .into_iter()
                    .filter(|g| !g.is_private || self.groups.contains(&g.id))
                    .collect();
                let kept = self.groups.merge_initial(listed);
                debug!("[SYNC] {} groups loaded ({} pushed earlier kept)", self.groups.len(), kept);
            }
            // left as it was: no retry, nothing shown
            Err(e) => warn!("[SYNC] Loading groups failed: {}", e),
        }
    }

    /// Private groups only enter through their invite code or by being created here.
    pub fn apply_group_insert(&mut self, group: ChatGroup) -> bool {
        if group.is_private {
            debug!("[SYNC] Private group {} not listed", group.id);
            return false;
        }
        self.groups.upsert_if_absent(group)
    }

    pub fn current_group(&self) -> Option<&ChatGroup> {
        self.current_group.as_deref().and_then(|id| self.groups.get(id))
    }

    /// Switches the active group: clears messages and the reply target and opens a new scope.
    pub fn select_group(&mut self, group_id: &str) -> ScopeToken {
        self.scope = ScopeToken(self.scope.0 + 1);
        self.current_group = Some(group_id.to_string());
        self.messages.clear();
        self.reply_to = None;
        self.loading_messages = true;
        if self.app_state == AppState::CreateGroup {
            self.app_state = AppState::Chat;
        }
        info!("[SYNC] Selected group {} (scope {})", group_id, self.scope.0);
        self.scope
    }

    pub fn is_current_scope(&self, scope: ScopeToken) -> bool {
        scope == self.scope && self.current_group.is_some()
    }

    // ---- messages ----

    /// Initial read for a scope. Ignored (returns false) when the scope was superseded.
    pub fn apply_initial_messages(
        &mut self,
        scope: ScopeToken,
        result: Result<Vec<ChatMessage>, BackendError>,
    ) -> bool {
        if !self.is_current_scope(scope) {
            debug!("[SYNC] Dropping stale read for scope {}", scope.0);
            return false;
        }
        self.loading_messages = false;
        match result {
            Ok(messages) => {
                let group = self.current_group.clone().unwrap_or_default();
                self.messages.merge_initial(messages.into_iter().filter(|m| m.group_id == group));
                true
            }
            Err(e) => {
                warn!("[SYNC] Loading messages failed: {}", e);
                false
            }
        }
    }

    /// Pushed insert for a scope. Stale scopes and other groups' messages are dropped.
    pub fn apply_message_insert(&mut self, scope: ScopeToken, msg: ChatMessage) -> bool {
        if !self.is_current_scope(scope) || self.current_group.as_deref() != Some(msg.group_id.as_str()) {
            return false;
        }
        self.messages.upsert_if_absent(msg)
    }

    pub fn set_reply_target(&mut self, message_id: Option<String>) {
        self.reply_to = message_id;
    }

    pub fn reply_preview(&self, message_id: &str) -> ReplyPreview<'_> {
        match self.messages.get(message_id) {
            Some(m) => ReplyPreview::Found(m),
            None => ReplyPreview::Missing,
        }
    }

    pub fn set_attachment(&mut self, attachment: Option<String>) {
        self.attachment = attachment.map(|a| a.trim().to_string()).filter(|a| !a.is_empty());
    }

    // ---- input and commands ----

    pub fn on_input_changed(&mut self, text: String) {
        self.dispatcher.on_input(&text);
        self.message_input = text;
    }

    /// Routes a key through the suggestion list; returns true when the input should be submitted.
    pub fn on_key(&mut self, key: InputKey) -> bool {
        match self.dispatcher.handle_key(key) {
            KeyOutcome::Completed(text) => {
                self.message_input = text;
                false
            }
            KeyOutcome::Submit => true,
            KeyOutcome::Handled | KeyOutcome::Ignored => false,
        }
    }

    /// A suggestion clicked with the mouse, same as highlighting it and pressing Tab.
    pub fn pick_suggestion(&mut self, name: &str) {
        self.message_input = format!("{} ", name);
        self.dispatcher.dismiss();
    }

    /// Works out what the current input means.
    ///
    /// Validation no-ops and `/help` yield `None`; a malformed `/join` raises the alert
    /// and leaves the input as typed.
    pub fn prepare_submit(&mut self) -> Option<SubmitAction> {
        if !self.is_ready() || self.sending {
            return None;
        }
        let submission = match command_dispatcher::parse_submission(&self.message_input) {
            Ok(s) => s,
            Err(e) => {
                self.alert = Some(e.to_string());
                return None;
            }
        };
        match submission {
            Submission::Join { code } => Some(SubmitAction::Join { code }),
            Submission::Help => {
                debug!("[CMD] /help submitted");
                None
            }
            Submission::Empty if self.attachment.is_none() => None,
            Submission::Empty => self.outgoing(String::new()),
            Submission::Post { content } => self.outgoing(content),
        }
    }

    fn outgoing(&mut self, content: String) -> Option<SubmitAction> {
        let group_id = self.current_group.clone()?;
        let user_id = self.identity.name()?.to_string();
        self.sending = true;
        Some(SubmitAction::Post(OutgoingMessage {
            content,
            group_id,
            user_id,
            reply_to: self.reply_to.clone(),
            attachment: self.attachment.clone(),
        }))
    }

    /// Result of a message insert.
    pub fn complete_post(&mut self, result: Result<ChatMessage, ChatError>) {
        self.sending = false;
        match result {
            Ok(msg) => {
                self.message_input.clear();
                self.dispatcher.on_input("");
                self.reply_to = None;
                self.attachment = None;
                self.attachment_input.clear();
                self.alert = None;
                if self.current_group.as_deref() == Some(msg.group_id.as_str()) {
                    self.messages.upsert_if_absent(msg);
                }
            }
            Err(e) => {
                warn!("[SYNC] {}", e);
                self.alert = Some(e.to_string());
            }
        }
    }

    /// Result of an invite-code lookup. On success the group is added and selected.
    pub fn complete_join(&mut self, result: Result<ChatGroup, ChatError>) -> Option<ScopeToken> {
        match result {
            Ok(group) => {
                let id = group.id.clone();
                info!("[CMD] Joined group {} by invite code", id);
                self.groups.upsert_if_absent(group);
                self.message_input.clear();
                self.dispatcher.on_input("");
                Some(self.select_group(&id))
            }
            Err(e) => {
                self.alert = Some(e.to_string());
                None
            }
        }
    }

    // ---- group creation ----

    pub fn open_create_group(&mut self) {
        self.create_group_name.clear();
        self.create_group_private = false;
        self.app_state = AppState::CreateGroup;
    }

    pub fn cancel_create_group(&mut self) {
        self.app_state = AppState::Chat;
    }

    pub fn prepare_create_group(&mut self) -> Option<NewGroupRequest> {
        let name = self.create_group_name.trim();
        if name.is_empty() || !self.is_ready() {
            return None;
        }
        Some(NewGroupRequest { name: name.to_string(), is_private: self.create_group_private })
    }

    pub fn complete_create_group(&mut self, result: Result<ChatGroup, ChatError>) -> Option<ScopeToken> {
        match result {
            Ok(group) => {
                let id = group.id.clone();
                self.groups.upsert_if_absent(group);
                self.create_group_name.clear();
                self.create_group_private = false;
                Some(self.select_group(&id))
            }
            Err(e) => {
                self.alert = Some(e.to_string());
                None
            }
        }
    }

    pub fn dismiss_alert(&mut self) {
        self.alert = None;
    }
}
