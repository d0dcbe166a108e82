// Blocking alert banner with a dismiss button
use iced::{Element, Length, Alignment, Color};
use iced::widget::{Row, Text, Button, Container, Space};
use crate::client::models::messages::Message;

const ALERT_BG: Color = Color::from_rgb(0.55, 0.12, 0.15);

pub fn view(msg: &str) -> Element<'_, Message> {
    let row = Row::new()
        .spacing(12)
        .align_items(Alignment::Center)
        .push(Text::new(msg).size(14).style(Color::WHITE))
        .push(Space::new(Length::Fill, Length::Fixed(0.0)))
        .push(
            Button::new(Text::new("OK").size(14))
                .on_press(Message::DismissAlert)
                .style(iced::theme::Button::Secondary)
                .padding([6, 14]),
        );

    Container::new(row)
        .padding([10, 16])
        .width(Length::Fill)
        .style(iced::theme::Container::Custom(Box::new(|_: &iced::Theme| {
            iced::widget::container::Appearance {
                background: Some(iced::Background::Color(ALERT_BG)),
                ..Default::default()
            }
        })))
        .into()
}
