use iced::{Element, Length, Alignment, Color, Font};
use iced::widget::{Column, Text, TextInput, Button, Container, Space};
use crate::client::models::messages::Message;
use crate::client::models::app_state::ChatAppState;

const BG_MAIN: Color = Color::from_rgb(0.06, 0.07, 0.18);
const CARD_BG: Color = Color::from_rgb(0.18, 0.19, 0.36);
const INPUT_BG: Color = Color::from_rgb(0.12, 0.13, 0.26);
const TEXT_PRIMARY: Color = Color::WHITE;
const TEXT_SECONDARY: Color = Color::from_rgb(0.7, 0.7, 0.7);

const BOLD_FONT: Font = Font {
    family: iced::font::Family::SansSerif,
    weight: iced::font::Weight::Bold,
    ..Font::DEFAULT
};

fn bg_main_appearance(_: &iced::Theme) -> iced::widget::container::Appearance {
    iced::widget::container::Appearance {
        background: Some(iced::Background::Color(BG_MAIN)),
        text_color: Some(TEXT_PRIMARY),
        ..Default::default()
    }
}

fn card_appearance(_: &iced::Theme) -> iced::widget::container::Appearance {
    iced::widget::container::Appearance {
        background: Some(iced::Background::Color(CARD_BG)),
        text_color: Some(TEXT_PRIMARY),
        border: iced::Border {
            width: 0.0,
            color: Color::TRANSPARENT,
            radius: 16.0.into(),
        },
        shadow: iced::Shadow {
            offset: iced::Vector::new(0.0, 4.0),
            blur_radius: 12.0,
            color: Color::from_rgba(0.0, 0.0, 0.0, 0.3),
        },
    }
}

fn input_appearance(_: &iced::Theme) -> iced::widget::container::Appearance {
    iced::widget::container::Appearance {
        background: Some(iced::Background::Color(INPUT_BG)),
        text_color: Some(TEXT_PRIMARY),
        border: iced::Border {
            width: 1.0,
            color: Color::from_rgb(0.3, 0.3, 0.4),
            radius: 12.0.into(),
        },
        ..Default::default()
    }
}

/// First screen when no display name is stored, and the "change name" screen afterwards.
pub fn view(state: &ChatAppState) -> Element<Message> {
    let name_valid = !state.name_input.trim().is_empty();
    let changing = state.is_ready();

    let title = Text::new(if changing { "Change your name" } else { "Welcome to Charla" })
        .font(BOLD_FONT)
        .size(26)
        .style(TEXT_PRIMARY);
    let subtitle = Text::new("Pick the name other people will see next to your messages")
        .size(14)
        .style(TEXT_SECONDARY);

    let input = Container::new(
        TextInput::new("Your name", &state.name_input)
            .on_input(Message::NameInputChanged)
            .on_submit(Message::SubmitName)
            .padding(12)
            .size(16)
            .width(Length::Fill),
    )
    .style(iced::theme::Container::Custom(Box::new(input_appearance)));

    let mut continue_btn = Button::new(Text::new("Continue").size(16))
        .style(iced::theme::Button::Primary)
        .padding([12, 24]);
    if name_valid {
        continue_btn = continue_btn.on_press(Message::SubmitName);
    }

    let mut card = Column::new()
        .spacing(16)
        .align_items(Alignment::Center)
        .push(title)
        .push(subtitle)
        .push(input)
        .push(continue_btn);
    if changing {
        card = card.push(
            Button::new(Text::new("Cancel").size(14))
                .on_press(Message::CancelEditName)
                .style(iced::theme::Button::Secondary)
                .padding([8, 16]),
        );
    }

    let card = Container::new(card)
        .padding(32)
        .width(Length::Fixed(420.0))
        .style(iced::theme::Container::Custom(Box::new(card_appearance)));

    Container::new(
        Column::new()
            .align_items(Alignment::Center)
            .push(Space::new(Length::Fill, Length::Fixed(80.0)))
            .push(card),
    )
    .width(Length::Fill)
    .height(Length::Fill)
    .center_x()
    .style(iced::theme::Container::Custom(Box::new(bg_main_appearance)))
    .into()
}
