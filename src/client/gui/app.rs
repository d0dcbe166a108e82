use iced::futures::SinkExt;
use iced::keyboard::{self, key::Named};
use iced::widget::{scrollable, Column};
use iced::{Application, Command, Element, Event, Subscription, Theme};
use log::{info, warn};

use crate::client::gui::views::{create_group, group_chat, name_prompt};
use crate::client::gui::widgets::{alert, message_list};
use crate::client::models::app_state::{AppState, ChatAppState, ScopeToken, SubmitAction};
use crate::client::models::messages::Message;
use crate::client::services::chat_service::{ChatService, FeedEvent};
use crate::client::services::command_dispatcher::InputKey;
use crate::client::utils::identity_store::IdentityStore;

pub struct AppFlags {
    pub service: ChatService,
    pub identity: IdentityStore,
}

pub struct ChatApp {
    pub state: ChatAppState,
    pub chat_service: ChatService,
}

impl ChatApp {
    fn load_groups(&self) -> Command<Message> {
        let svc = self.chat_service.clone();
        Command::perform(async move { svc.load_groups().await }, Message::GroupsLoaded)
    }

    fn load_messages(&self, scope: ScopeToken) -> Command<Message> {
        let Some(group_id) = self.state.current_group.clone() else {
            return Command::none();
        };
        let svc = self.chat_service.clone();
        Command::perform(
            async move { svc.load_messages(&group_id).await },
            move |result| Message::MessagesLoaded(scope, result),
        )
    }

    fn scroll_to_bottom() -> Command<Message> {
        scrollable::snap_to(message_list::scroll_id(), scrollable::RelativeOffset::END)
    }
}

impl Application for ChatApp {
    type Message = Message;
    type Theme = Theme;
    type Executor = iced::executor::Default;
    type Flags = AppFlags;

    fn new(flags: AppFlags) -> (Self, Command<Message>) {
        let app = ChatApp {
            state: ChatAppState::new(flags.identity),
            chat_service: flags.service,
        };
        let cmd = if app.state.is_ready() { app.load_groups() } else { Command::none() };
        (app, cmd)
    }

    fn title(&self) -> String {
        match self.state.current_group() {
            Some(group) => format!("Charla - {}", group.name),
            None => "Charla".to_string(),
        }
    }

    fn update(&mut self, message: Message) -> Command<Message> {
        match message {
            Message::NoOp => {}
            Message::NameInputChanged(name) => self.state.name_input = name,
            Message::SubmitName => {
                let first_time = !self.state.is_ready();
                if self.state.submit_name() && first_time {
                    return self.load_groups();
                }
            }
            Message::EditName => self.state.open_name_prompt(),
            Message::CancelEditName => self.state.app_state = AppState::Chat,
            Message::GroupsLoaded(result) => self.state.apply_initial_groups(result),
            Message::GroupPushed(group) => {
                self.state.apply_group_insert(group);
            }
            Message::SelectGroup(group_id) => {
                if self.state.current_group.as_deref() == Some(group_id.as_str()) {
                    return Command::none();
                }
                let scope = self.state.select_group(&group_id);
                return self.load_messages(scope);
            }
            Message::MessagesLoaded(scope, result) => {
                if self.state.apply_initial_messages(scope, result) {
                    return Self::scroll_to_bottom();
                }
            }
            Message::MessagePushed(scope, msg) => {
                if self.state.apply_message_insert(scope, msg) {
                    return Self::scroll_to_bottom();
                }
            }
            Message::MessageInputChanged(text) => self.state.on_input_changed(text),
            Message::KeyPressed(key) => {
                if self.state.on_key(key) {
                    return self.update(Message::Submit);
                }
            }
            Message::SuggestionClicked(name) => self.state.pick_suggestion(&name),
            Message::Submit => match self.state.prepare_submit() {
                Some(SubmitAction::Post(outgoing)) => {
                    let svc = self.chat_service.clone();
                    return Command::perform(
                        async move { svc.send_message(&outgoing).await },
                        Message::MessageSent,
                    );
                }
                Some(SubmitAction::Join { code }) => {
                    info!("[CMD] Joining by invite code");
                    let svc = self.chat_service.clone();
                    return Command::perform(
                        async move { svc.find_group_by_invite_code(&code).await },
                        Message::JoinResult,
                    );
                }
                None => {}
            },
            Message::MessageSent(result) => {
                let ok = result.is_ok();
                self.state.complete_post(result);
                if ok {
                    return Self::scroll_to_bottom();
                }
            }
            Message::JoinResult(result) => {
                if let Some(scope) = self.state.complete_join(result) {
                    return self.load_messages(scope);
                }
            }
            Message::ReplyTo(id) => self.state.set_reply_target(Some(id)),
            Message::CancelReply => self.state.set_reply_target(None),
            Message::AttachmentInputChanged(text) => self.state.attachment_input = text,
            Message::AttachImage => {
                let input = self.state.attachment_input.clone();
                self.state.set_attachment(Some(input));
            }
            Message::ClearAttachment => {
                self.state.set_attachment(None);
                self.state.attachment_input.clear();
            }
            Message::OpenCreateGroup => self.state.open_create_group(),
            Message::CancelCreateGroup => self.state.cancel_create_group(),
            Message::CreateGroupNameChanged(name) => self.state.create_group_name = name,
            Message::CreateGroupPrivateToggled(private) => self.state.create_group_private = private,
            Message::SubmitCreateGroup => {
                if let Some(request) = self.state.prepare_create_group() {
                    let svc = self.chat_service.clone();
                    return Command::perform(
                        async move { svc.create_group(&request).await },
                        Message::GroupCreated,
                    );
                }
            }
            Message::GroupCreated(result) => {
                if let Some(scope) = self.state.complete_create_group(result) {
                    return self.load_messages(scope);
                }
            }
            Message::DismissAlert => self.state.dismiss_alert(),
        }
        Command::none()
    }

    fn subscription(&self) -> Subscription<Message> {
        if !self.state.is_ready() {
            return Subscription::none();
        }
        let mut subs = vec![groups_feed(self.chat_service.clone()), keyboard_keys()];
        if let Some(group_id) = &self.state.current_group {
            subs.push(messages_feed(self.chat_service.clone(), group_id.clone(), self.state.scope));
        }
        Subscription::batch(subs)
    }

    fn view(&self) -> Element<Message> {
        let screen = match &self.state.app_state {
            AppState::NamePrompt => name_prompt::view(&self.state),
            AppState::Chat => group_chat::view(&self.state),
            AppState::CreateGroup => create_group::view(&self.state),
        };
        match &self.state.alert {
            Some(text) => Column::new().push(alert::view(text)).push(screen).into(),
            None => screen,
        }
    }
}

// The groups channel lives as long as the app shows the chat. A lost channel is
// reopened and the list reloaded, since inserts in the gap were never pushed.
fn groups_feed(service: ChatService) -> Subscription<Message> {
    iced::subscription::channel("groups-feed", 100, move |mut output| async move {
        let mut feed = service.follow_groups();
        loop {
            let message = match feed.next().await {
                FeedEvent::Item(group) => Message::GroupPushed(group),
                FeedEvent::Resumed => Message::GroupsLoaded(service.load_groups().await),
            };
            if output.send(message).await.is_err() {
                break;
            }
        }
        warn!("[SYNC] Groups feed stopped");
        loop {
            std::future::pending::<()>().await;
        }
    })
}

// Keyed on (group, scope): a new selection starts a new channel and iced drops
// the previous one, which releases it.
fn messages_feed(service: ChatService, group_id: String, scope: ScopeToken) -> Subscription<Message> {
    let id = ("messages-feed", group_id.clone(), scope);
    iced::subscription::channel(id, 100, move |mut output| async move {
        let mut feed = service.follow_messages(&group_id);
        loop {
            let message = match feed.next().await {
                FeedEvent::Item(msg) => Message::MessagePushed(scope, msg),
                FeedEvent::Resumed => Message::MessagesLoaded(scope, service.load_messages(&group_id).await),
            };
            if output.send(message).await.is_err() {
                break;
            }
        }
        warn!("[SYNC] Messages feed for {} stopped", group_id);
        loop {
            std::future::pending::<()>().await;
        }
    })
}

// Enter arrives through the text input's on_submit.
fn keyboard_keys() -> Subscription<Message> {
    iced::event::listen_with(|event, _status| match event {
        Event::Keyboard(keyboard::Event::KeyPressed { key: keyboard::Key::Named(named), .. }) => {
            let key = match named {
                Named::ArrowUp => InputKey::Up,
                Named::ArrowDown => InputKey::Down,
                Named::Tab => InputKey::Tab,
                Named::Escape => InputKey::Escape,
                _ => return None,
            };
            Some(Message::KeyPressed(key))
        }
        _ => None,
    })
}
