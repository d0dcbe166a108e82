// Scrollable list of the selected group's messages
use iced::{Element, Length, Color, Font};
use iced::widget::{Column, Row, Text, Button, Container, Scrollable, Space, scrollable};
use crate::client::models::messages::Message;
use crate::client::models::app_state::{ChatAppState, ReplyPreview};
use crate::common::models::ChatMessage;

const CHAT_BG: Color = Color::from_rgb(0.08, 0.09, 0.20);
const MY_MESSAGE_BG: Color = Color::from_rgb(0.0, 0.7, 0.3);
const OTHER_MESSAGE_BG: Color = Color::from_rgb(0.2, 0.4, 0.8);
const QUOTE_BG: Color = Color::from_rgba(0.0, 0.0, 0.0, 0.25);
const TEXT_PRIMARY: Color = Color::WHITE;
const TEXT_SECONDARY: Color = Color::from_rgb(0.7, 0.7, 0.7);

const BOLD_FONT: Font = Font {
    family: iced::font::Family::SansSerif,
    weight: iced::font::Weight::Bold,
    ..Font::DEFAULT
};

const QUOTE_CHARS: usize = 60;

pub fn scroll_id() -> scrollable::Id {
    scrollable::Id::new("group_messages_scroll")
}

pub fn view(state: &ChatAppState) -> Element<'_, Message> {
    let mut messages_column = Column::new().spacing(8).padding([12, 16]);

    if state.messages.is_empty() {
        let placeholder = if state.loading_messages {
            "Loading messages..."
        } else {
            "No messages yet. Start the conversation!"
        };
        messages_column = messages_column.push(
            Container::new(Text::new(placeholder).size(14).style(TEXT_SECONDARY))
                .width(Length::Fill)
                .center_x()
                .padding(20),
        );
    } else {
        for msg in state.messages.iter() {
            messages_column = messages_column.push(bubble(state, msg, state.is_own_message(msg)));
        }
    }

    messages_column = messages_column.push(Space::new(Length::Fixed(0.0), Length::Fixed(20.0)));

    let scrollable_messages = Scrollable::new(messages_column)
        .width(Length::Fill)
        .height(Length::Fill)
        .id(scroll_id());

    Container::new(scrollable_messages)
        .width(Length::Fill)
        .height(Length::Fill)
        .style(iced::theme::Container::Custom(Box::new(|_: &iced::Theme| {
            iced::widget::container::Appearance {
                background: Some(iced::Background::Color(CHAT_BG)),
                ..Default::default()
            }
        })))
        .into()
}

/// Quoted reply target shown above a message or above the composer
pub fn quote<'a>(preview: ReplyPreview<'_>) -> Element<'a, Message> {
    let (author, body) = match preview {
        ReplyPreview::Found(target) => (target.user_id.clone(), target.preview(QUOTE_CHARS)),
        ReplyPreview::Missing => (String::new(), "original message unavailable".to_string()),
    };
    let mut col = Column::new().spacing(2);
    if !author.is_empty() {
        col = col.push(Text::new(author).size(11).font(BOLD_FONT).style(TEXT_SECONDARY));
    }
    col = col.push(Text::new(body).size(12).style(TEXT_SECONDARY));

    Container::new(col)
        .padding([4, 8])
        .width(Length::Fill)
        .style(iced::theme::Container::Custom(Box::new(|_: &iced::Theme| {
            iced::widget::container::Appearance {
                background: Some(iced::Background::Color(QUOTE_BG)),
                border: iced::Border {
                    radius: 6.0.into(),
                    ..Default::default()
                },
                ..Default::default()
            }
        })))
        .into()
}

fn bubble<'a>(state: &'a ChatAppState, msg: &'a ChatMessage, is_my_message: bool) -> Element<'a, Message> {
    let bubble_color = if is_my_message { MY_MESSAGE_BG } else { OTHER_MESSAGE_BG };

    let mut content = Column::new().spacing(2);
    if !is_my_message {
        content = content.push(
            Text::new(&msg.user_id)
                .size(15)
                .font(BOLD_FONT)
                .style(Color::from_rgb(1.0, 1.0, 0.8)),
        );
    }
    if let Some(target) = &msg.reply_to {
        content = content.push(quote(state.reply_preview(target)));
    }
    if let Some(url) = msg.image_url.as_deref().filter(|_| msg.has_image()) {
        content = content.push(Text::new(format!("[image] {}", url)).size(12).style(TEXT_SECONDARY));
    }
    if !msg.content.is_empty() {
        content = content.push(Text::new(&msg.content).size(14).style(TEXT_PRIMARY));
    }

    let footer = Row::new()
        .spacing(8)
        .push(
            Text::new(msg.created_at.format("%H:%M").to_string())
                .size(10)
                .style(TEXT_SECONDARY),
        )
        .push(Space::new(Length::Fill, Length::Fixed(0.0)))
        .push(
            Button::new(Text::new("Reply").size(10))
                .on_press(Message::ReplyTo(msg.id.clone()))
                .style(iced::theme::Button::Text)
                .padding(0),
        );
    content = content
        .push(Space::new(Length::Fixed(0.0), Length::Fixed(4.0)))
        .push(footer);

    let bubble = Container::new(content)
        .padding([8, 12])
        .style(iced::theme::Container::Custom(Box::new(move |_: &iced::Theme| {
            iced::widget::container::Appearance {
                background: Some(iced::Background::Color(bubble_color)),
                border: iced::Border {
                    radius: 12.0.into(),
                    ..Default::default()
                },
                ..Default::default()
            }
        })))
        .width(Length::Fixed(320.0));

    let alignment = if is_my_message {
        iced::alignment::Horizontal::Right
    } else {
        iced::alignment::Horizontal::Left
    };

    Container::new(bubble)
        .width(Length::Fill)
        .align_x(alignment)
        .into()
}
