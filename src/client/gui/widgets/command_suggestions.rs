// Popup listing the commands matching the current "/..." input
use iced::{Element, Length, Color, Font};
use iced::widget::{Column, Row, Text, Button, Container};
use crate::client::models::messages::Message;
use crate::client::services::command_dispatcher::CommandDispatcher;

const POPUP_BG: Color = Color::from_rgb(0.14, 0.15, 0.30);
const TEXT_PRIMARY: Color = Color::WHITE;
const TEXT_SECONDARY: Color = Color::from_rgb(0.7, 0.7, 0.7);

const BOLD_FONT: Font = Font {
    family: iced::font::Family::SansSerif,
    weight: iced::font::Weight::Bold,
    ..Font::DEFAULT
};

/// `None` while the dispatcher is idle.
pub fn view(dispatcher: &CommandDispatcher) -> Option<Element<'static, Message>> {
    if !dispatcher.is_suggesting() {
        return None;
    }
    let mut list = Column::new().spacing(2);
    for (i, cmd) in dispatcher.suggestions().iter().enumerate() {
        let row = Row::new()
            .spacing(12)
            .push(Text::new(cmd.usage).font(BOLD_FONT).size(13).style(TEXT_PRIMARY))
            .push(Text::new(cmd.description).size(12).style(TEXT_SECONDARY));
        let style = if i == dispatcher.selected_index() {
            iced::theme::Button::Primary
        } else {
            iced::theme::Button::Text
        };
        list = list.push(
            Button::new(row)
                .on_press(Message::SuggestionClicked(cmd.name.to_string()))
                .style(style)
                .width(Length::Fill)
                .padding([6, 10]),
        );
    }

    Some(
        Container::new(list)
            .padding(4)
            .width(Length::Fill)
            .style(iced::theme::Container::Custom(Box::new(|_: &iced::Theme| {
                iced::widget::container::Appearance {
                    background: Some(iced::Background::Color(POPUP_BG)),
                    border: iced::Border {
                        radius: 8.0.into(),
                        width: 1.0,
                        color: Color::from_rgb(0.3, 0.3, 0.4),
                    },
                    ..Default::default()
                }
            })))
            .into(),
    )
}
