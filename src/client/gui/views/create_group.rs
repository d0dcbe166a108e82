use iced::{Element, Length, Alignment, Color, Font};
use iced::widget::{Column, Row, Text, TextInput, Button, Container, Space, Checkbox};
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

pub fn view(state: &ChatAppState) -> Element<Message> {
    let submit_enabled = !state.create_group_name.trim().is_empty();

    let title = Column::new()
        .spacing(4)
        .align_items(Alignment::Center)
        .push(Text::new("Create New Group").font(BOLD_FONT).size(24).style(TEXT_PRIMARY))
        .push(
            Text::new("Private groups get an invite code others can /join with")
                .size(14)
                .style(TEXT_SECONDARY),
        );

    let name_field = Column::new()
        .spacing(8)
        .push(Text::new("Group Name").size(14).style(TEXT_SECONDARY))
        .push(
            Container::new(
                TextInput::new("Enter group name", &state.create_group_name)
                    .on_input(Message::CreateGroupNameChanged)
                    .on_submit(if submit_enabled { Message::SubmitCreateGroup } else { Message::NoOp })
                    .width(Length::Fill)
                    .padding(12)
                    .size(14),
            )
            .style(iced::theme::Container::Custom(Box::new(input_appearance))),
        );

    let private_toggle = Checkbox::new("Private (invite only)", state.create_group_private)
        .on_toggle(Message::CreateGroupPrivateToggled)
        .text_size(14);

    let mut create_btn = Button::new(Text::new("Create").size(14))
        .style(iced::theme::Button::Primary)
        .padding([12, 24]);
    if submit_enabled {
        create_btn = create_btn.on_press(Message::SubmitCreateGroup);
    }
    let cancel_btn = Button::new(Text::new("Cancel").size(14))
        .on_press(Message::CancelCreateGroup)
        .style(iced::theme::Button::Secondary)
        .padding([12, 24]);

    let buttons = Row::new()
        .spacing(12)
        .push(Space::new(Length::Fill, Length::Fixed(0.0)))
        .push(cancel_btn)
        .push(create_btn);

    let card = Container::new(
        Column::new()
            .spacing(20)
            .push(title)
            .push(name_field)
            .push(private_toggle)
            .push(buttons),
    )
    .padding(32)
    .width(Length::Fixed(480.0))
    .style(iced::theme::Container::Custom(Box::new(card_appearance)));

    Container::new(
        Column::new()
            .align_items(Alignment::Center)
            .push(Space::new(Length::Fill, Length::Fixed(60.0)))
            .push(card),
    )
    .width(Length::Fill)
    .height(Length::Fill)
    .center_x()
    .style(iced::theme::Container::Custom(Box::new(bg_main_appearance)))
    .into()
}
