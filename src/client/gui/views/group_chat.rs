use iced::{Element, Length, Alignment, Color, Font};
use iced::widget::{Column, Row, Text, TextInput, Button, Container, Scrollable, Space};
use crate::client::models::messages::Message;
use crate::client::models::app_state::ChatAppState;
use crate::client::gui::widgets::{command_suggestions, message_list};
use crate::client::services::command_dispatcher::InputKey;

// Color palette per chat moderna (WhatsApp-like)
const BG_MAIN: Color = Color::from_rgb(0.06, 0.07, 0.18);
const SIDEBAR_BG: Color = Color::from_rgb(0.10, 0.11, 0.24);
const INPUT_BG: Color = Color::from_rgb(0.12, 0.13, 0.26);
const TEXT_PRIMARY: Color = Color::WHITE;
const TEXT_SECONDARY: Color = Color::from_rgb(0.7, 0.7, 0.7);

const BOLD_FONT: Font = Font {
    family: iced::font::Family::SansSerif,
    weight: iced::font::Weight::Bold,
    ..Font::DEFAULT
};

pub fn view(state: &ChatAppState) -> Element<Message> {
    let content = Row::new()
        .push(build_sidebar(state))
        .push(build_chat_pane(state))
        .width(Length::Fill)
        .height(Length::Fill);

    Container::new(content)
        .width(Length::Fill)
        .height(Length::Fill)
        .style(iced::theme::Container::Custom(Box::new(|_: &iced::Theme| {
            iced::widget::container::Appearance {
                background: Some(iced::Background::Color(BG_MAIN)),
                ..Default::default()
            }
        })))
        .into()
}

fn build_sidebar(state: &ChatAppState) -> Element<Message> {
    let profile = Row::new()
        .spacing(8)
        .align_items(Alignment::Center)
        .push(Text::new(state.username()).font(BOLD_FONT).size(16).style(TEXT_PRIMARY))
        .push(Space::new(Length::Fill, Length::Fixed(0.0)))
        .push(
            Button::new(Text::new("Edit").size(12))
                .on_press(Message::EditName)
                .style(iced::theme::Button::Secondary)
                .padding([4, 8]),
        );

    let mut groups = Column::new().spacing(4);
    if state.groups.is_empty() {
        groups = groups.push(Text::new("No groups yet").size(13).style(TEXT_SECONDARY));
    }
    for group in state.groups.iter() {
        let selected = state.current_group.as_deref() == Some(group.id.as_str());
        let label = if group.is_private {
            format!("🔒 {}", group.name)
        } else {
            format!("# {}", group.name)
        };
        groups = groups.push(
            Button::new(Text::new(label).size(14))
                .on_press(Message::SelectGroup(group.id.clone()))
                .style(if selected { iced::theme::Button::Primary } else { iced::theme::Button::Text })
                .width(Length::Fill)
                .padding([8, 10]),
        );
    }

    let new_group_btn = Button::new(Text::new("+ New group").size(14))
        .on_press(Message::OpenCreateGroup)
        .style(iced::theme::Button::Primary)
        .width(Length::Fill)
        .padding([8, 10]);

    let column = Column::new()
        .spacing(12)
        .padding(12)
        .push(profile)
        .push(Scrollable::new(groups).height(Length::Fill))
        .push(new_group_btn);

    Container::new(column)
        .width(Length::Fixed(240.0))
        .height(Length::Fill)
        .style(iced::theme::Container::Custom(Box::new(|_: &iced::Theme| {
            iced::widget::container::Appearance {
                background: Some(iced::Background::Color(SIDEBAR_BG)),
                text_color: Some(TEXT_PRIMARY),
                ..Default::default()
            }
        })))
        .into()
}

fn build_chat_pane(state: &ChatAppState) -> Element<Message> {
    let Some(group) = state.current_group() else {
        let placeholder = Container::new(
            Text::new("Select a group, create one, or type /join <code> below")
                .size(14)
                .style(TEXT_SECONDARY),
        )
        .width(Length::Fill)
        .height(Length::Fill)
        .center_x()
        .center_y();
        return Column::new()
            .push(placeholder)
            .push(build_input_area(state))
            .width(Length::Fill)
            .height(Length::Fill)
            .into();
    };

    let mut group_info = Column::new()
        .spacing(2)
        .push(Text::new(&group.name).font(BOLD_FONT).size(20).style(TEXT_PRIMARY));
    match (&group.invite_code, &group.description) {
        (Some(code), _) if group.is_private => {
            group_info = group_info.push(Text::new(format!("Invite code: {}", code)).size(12).style(TEXT_SECONDARY));
        }
        (_, Some(description)) => {
            group_info = group_info.push(Text::new(description).size(12).style(TEXT_SECONDARY));
        }
        _ => {}
    }

    let header = Container::new(group_info)
        .padding([12, 16])
        .width(Length::Fill)
        .style(iced::theme::Container::Custom(Box::new(|_: &iced::Theme| {
            iced::widget::container::Appearance {
                background: Some(iced::Background::Color(INPUT_BG)),
                ..Default::default()
            }
        })));

    Column::new()
        .push(header)
        .push(message_list::view(state))
        .push(build_input_area(state))
        .width(Length::Fill)
        .height(Length::Fill)
        .into()
}

fn build_input_area(state: &ChatAppState) -> Element<Message> {
    let mut area = Column::new().spacing(8);

    if let Some(popup) = command_suggestions::view(&state.dispatcher) {
        area = area.push(popup);
    }

    if let Some(target) = &state.reply_to {
        area = area.push(
            Row::new()
                .spacing(8)
                .align_items(Alignment::Center)
                .push(Text::new("Replying to").size(12).style(TEXT_SECONDARY))
                .push(message_list::quote(state.reply_preview(target)))
                .push(
                    Button::new(Text::new("✕").size(12))
                        .on_press(Message::CancelReply)
                        .style(iced::theme::Button::Text),
                ),
        );
    }

    let attachment_row: Element<Message> = match &state.attachment {
        Some(path) => Row::new()
            .spacing(8)
            .align_items(Alignment::Center)
            .push(Text::new(format!("Attached: {}", path)).size(12).style(TEXT_SECONDARY))
            .push(
                Button::new(Text::new("Remove").size(12))
                    .on_press(Message::ClearAttachment)
                    .style(iced::theme::Button::Destructive)
                    .padding([4, 8]),
            )
            .into(),
        None => Row::new()
            .spacing(8)
            .align_items(Alignment::Center)
            .push(
                TextInput::new("Image file path or URL", &state.attachment_input)
                    .on_input(Message::AttachmentInputChanged)
                    .on_submit(Message::AttachImage)
                    .padding(6)
                    .size(12)
                    .width(Length::Fill),
            )
            .push(
                Button::new(Text::new("Attach").size(12))
                    .on_press(Message::AttachImage)
                    .style(iced::theme::Button::Secondary)
                    .padding([6, 10]),
            )
            .into(),
    };
    area = area.push(attachment_row);

    let raw_input = TextInput::new("Write a message or /command...", &state.message_input)
        .on_input(Message::MessageInputChanged)
        .on_submit(Message::KeyPressed(InputKey::Enter))
        .padding(12)
        .size(14)
        .width(Length::Fill);

    let message_input = Container::new(raw_input)
        .padding(0)
        .width(Length::Fill)
        .style(iced::theme::Container::Custom(Box::new(|_: &iced::Theme| {
            iced::widget::container::Appearance {
                background: Some(iced::Background::Color(INPUT_BG)),
                border: iced::Border {
                    radius: 20.0.into(),
                    width: 1.0,
                    color: Color::from_rgb(0.3, 0.3, 0.3),
                },
                ..Default::default()
            }
        })));

    let mut send_button = Button::new(Text::new(if state.sending { "Sending..." } else { "Send" }).size(14))
        .style(iced::theme::Button::Primary)
        .padding([12, 16]);
    if !state.sending {
        send_button = send_button.on_press(Message::Submit);
    }

    area = area.push(
        Row::new()
            .spacing(8)
            .align_items(Alignment::Center)
            .push(message_input)
            .push(send_button),
    );

    Container::new(area)
        .padding([12, 16])
        .width(Length::Fill)
        .style(iced::theme::Container::Custom(Box::new(|_: &iced::Theme| {
            iced::widget::container::Appearance {
                background: Some(iced::Background::Color(INPUT_BG)),
                border: iced::Border {
                    width: 1.0,
                    color: Color::from_rgb(0.2, 0.2, 0.2),
                    ..Default::default()
                },
                ..Default::default()
            }
        })))
        .into()
}
