use log::{debug, info, warn};

use crate::client::models::app_state::{ChatAppState, ScopeToken, SubmitAction};
use crate::client::services::chat_service::{ChatService, LiveFeed};
use crate::common::error::{BackendError, ChatError};
use crate::common::models::{ChatGroup, ChatMessage};

/// One live event applied to the session state
#[derive(Debug, Clone, PartialEq)]
pub enum LiveUpdate {
    Group(ChatGroup),
    Message(ChatMessage),
    /// Already known, or for a scope that is no longer current
    Ignored,
    /// Every open channel has closed
    Closed,
}

/// What a submitted line turned into
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Nothing,
    Sent(ChatMessage),
    Joined(ChatGroup),
    Failed(String),
}

/// Drives a [`ChatAppState`] against a [`ChatService`]: initial reads, push
/// channels and the network side of submit. Used by the terminal client.
pub struct ChatSession {
    pub state: ChatAppState,
    service: ChatService,
    groups_feed: Option<LiveFeed<ChatGroup>>,
    messages_feed: Option<(ScopeToken, LiveFeed<ChatMessage>)>,
}

impl ChatSession {
    pub fn new(state: ChatAppState, service: ChatService) -> Self {
        Self { state, service, groups_feed: None, messages_feed: None }
    }

    pub fn service(&self) -> &ChatService {
        &self.service
    }

    /// Opens the groups channel, then loads the current groups.
    ///
    /// Pushes delivered while the read is in flight stay buffered in the channel and
    /// are merged by [`ChatSession::next_update`], so nothing is lost either way.
    pub async fn start(&mut self) {
        match self.service.subscribe_groups().await {
            Ok(feed) => self.groups_feed = Some(feed),
            Err(e) => warn!("[SYNC] Could not open groups channel: {}", e),
        }
        let groups = self.service.load_groups().await;
        self.state.apply_initial_groups(groups);
        info!("[SYNC] Session started with {} groups", self.state.groups.len());
    }

    pub fn set_name(&mut self, name: &str) -> bool {
        self.state.set_name(name)
    }

    /// Switches to `group_id`, releasing the previous group's channel first.
    pub async fn select_group(&mut self, group_id: &str) -> ScopeToken {
        let scope = self.state.select_group(group_id);
        self.open_messages(scope, group_id).await;
        scope
    }

    async fn open_messages(&mut self, scope: ScopeToken, group_id: &str) {
        if let Some((old, feed)) = self.messages_feed.take() {
            debug!("[SYNC] Closing {} (scope {})", feed.topic(), old.0);
            feed.unsubscribe();
        }
        match self.service.subscribe_messages(group_id).await {
            Ok(feed) => self.messages_feed = Some((scope, feed)),
            Err(e) => warn!("[SYNC] Could not open messages channel for {}: {}", group_id, e),
        }
        let messages = self.service.load_messages(group_id).await;
        self.state.apply_initial_messages(scope, messages);
    }

    /// Reopens the channels the backend closed and reloads what they missed.
    pub async fn resume(&mut self) {
        if self.groups_feed.is_none() {
            self.start().await;
        }
        if self.messages_feed.is_none() {
            if let Some(group_id) = self.state.current_group.clone() {
                let scope = self.state.scope;
                self.open_messages(scope, &group_id).await;
            }
        }
    }

    /// Submits the current input: posts a message or runs a command.
    pub async fn submit(&mut self) -> SubmitOutcome {
        let Some(action) = self.state.prepare_submit() else {
            return match &self.state.alert {
                Some(alert) => SubmitOutcome::Failed(alert.clone()),
                None => SubmitOutcome::Nothing,
            };
        };
        match action {
            SubmitAction::Post(outgoing) => {
                let result = self.service.send_message(&outgoing).await;
                let sent = result.clone();
                self.state.complete_post(result);
                match sent {
                    Ok(msg) => SubmitOutcome::Sent(msg),
                    Err(e) => SubmitOutcome::Failed(e.to_string()),
                }
            }
            SubmitAction::Join { code } => {
                info!("[CMD] Looking up invite code");
                let result = self.service.find_group_by_invite_code(&code).await;
                let found = result.clone();
                if let Some(scope) = self.state.complete_join(result) {
                    let group_id = self.state.current_group.clone().unwrap_or_default();
                    self.open_messages(scope, &group_id).await;
                }
                match found {
                    Ok(group) => SubmitOutcome::Joined(group),
                    Err(e) => SubmitOutcome::Failed(e.to_string()),
                }
            }
        }
    }

    /// Types `text` into the input and submits it.
    pub async fn submit_text(&mut self, text: &str) -> SubmitOutcome {
        self.state.on_input_changed(text.to_string());
        self.submit().await
    }

    pub async fn create_group(&mut self, name: &str, is_private: bool) -> Result<ChatGroup, ChatError> {
        self.state.create_group_name = name.to_string();
        self.state.create_group_private = is_private;
        let Some(request) = self.state.prepare_create_group() else {
            return Err(ChatError::CreateGroup(BackendError::rejected("group name is empty")));
        };
        let result = self.service.create_group(&request).await;
        let created = result.clone();
        if let Some(scope) = self.state.complete_create_group(result) {
            let group_id = self.state.current_group.clone().unwrap_or_default();
            self.open_messages(scope, &group_id).await;
        }
        created
    }

    /// Waits for the next push on either channel and applies it.
    pub async fn next_update(&mut self) -> LiveUpdate {
        enum Pushed {
            Group(Option<ChatGroup>),
            Message(ScopeToken, Option<ChatMessage>),
        }

        let pushed = match (&mut self.groups_feed, &mut self.messages_feed) {
            (None, None) => return LiveUpdate::Closed,
            (Some(groups), None) => Pushed::Group(groups.next().await),
            (None, Some((scope, messages))) => Pushed::Message(*scope, messages.next().await),
            (Some(groups), Some((scope, messages))) => {
                let scope = *scope;
                tokio::select! {
                    g = groups.next() => Pushed::Group(g),
                    m = messages.next() => Pushed::Message(scope, m),
                }
            }
        };

        match pushed {
            Pushed::Group(Some(group)) => self.apply_group(group),
            Pushed::Message(scope, Some(msg)) => self.apply_message(scope, msg),
            Pushed::Group(None) => {
                warn!("[SYNC] Groups channel closed");
                self.groups_feed = None;
                self.closed_or_ignored()
            }
            Pushed::Message(_, None) => {
                warn!("[SYNC] Messages channel closed");
                self.messages_feed = None;
                self.closed_or_ignored()
            }
        }
    }

    /// Applies every push already delivered, without waiting. Returns how many were new.
    pub fn apply_pending(&mut self) -> usize {
        let mut groups = Vec::new();
        if let Some(feed) = self.groups_feed.as_mut() {
            while let Some(g) = feed.try_next() {
                groups.push(g);
            }
        }
        let mut messages = Vec::new();
        if let Some((scope, feed)) = self.messages_feed.as_mut() {
            while let Some(m) = feed.try_next() {
                messages.push((*scope, m));
            }
        }
        let mut added = 0;
        for g in groups {
            if self.apply_group(g) != LiveUpdate::Ignored {
                added += 1;
            }
        }
        for (scope, m) in messages {
            if self.apply_message(scope, m) != LiveUpdate::Ignored {
                added += 1;
            }
        }
        added
    }

    fn apply_group(&mut self, group: ChatGroup) -> LiveUpdate {
        if self.state.apply_group_insert(group.clone()) {
            LiveUpdate::Group(group)
        } else {
            LiveUpdate::Ignored
        }
    }

    fn apply_message(&mut self, scope: ScopeToken, msg: ChatMessage) -> LiveUpdate {
        if self.state.apply_message_insert(scope, msg.clone()) {
            LiveUpdate::Message(msg)
        } else {
            LiveUpdate::Ignored
        }
    }

    fn closed_or_ignored(&self) -> LiveUpdate {
        if self.groups_feed.is_none() && self.messages_feed.is_none() {
            LiveUpdate::Closed
        } else {
            LiveUpdate::Ignored
        }
    }

    /// Releases both channels.
    pub fn shutdown(&mut self) {
        if let Some(feed) = self.groups_feed.take() {
            feed.unsubscribe();
        }
        if let Some((_, feed)) = self.messages_feed.take() {
            feed.unsubscribe();
        }
    }
}
