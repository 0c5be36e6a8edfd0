//! # Main Display Module
//!
//! Layout of the widget: the drop area with its picker button, then the
//! selected file's details, the play/pause button and, while playing,
//! the visualizer.

use iced::widget::{button, column, container, text, Space};
use iced::{Alignment, Border, Color, Element, Length};
use visualizer_core::selection::SelectedFile;

use crate::widgets::visualizer::Visualizer;

/// Creates the complete main application view
pub fn create_main_view(data: crate::AppDisplayData<'_>) -> Element<'_, crate::Message> {
    let mut content = column![create_drop_area()]
        .spacing(20)
        .align_x(Alignment::Center);

    if let Some(file) = data.selected {
        content = content.push(create_audio_info(file, data));
    }

    container(content.padding(20))
        .width(Length::Fill)
        .height(Length::Fill)
        .center_x(Length::Fill)
        .center_y(Length::Fill)
        .into()
}

/// Dashed-looking box that explains the drop gesture, plus the picker button.
fn create_drop_area() -> Element<'static, crate::Message> {
    let label = text("Drag & Drop Audio File Here").size(20);
    let picker = button(text("Choose file...").size(14))
        .padding([6, 12])
        .on_press(crate::Message::PickFile);

    container(
        column![label, Space::with_height(10), picker]
            .align_x(Alignment::Center),
    )
    .padding(30)
    .style(|_theme| container::Style {
        border: Border {
            color: Color::from_rgb(0.6, 0.6, 0.6),
            width: 2.0,
            radius: 8.0.into(),
        },
        ..container::Style::default()
    })
    .into()
}

/// File details, transport button and (while playing) the visualizer.
fn create_audio_info<'a>(
    file: &SelectedFile,
    data: crate::AppDisplayData<'a>,
) -> Element<'a, crate::Message> {
    let details = column![
        text("File selected:").size(22),
        text(format!("Name: {}", file.name)).size(16),
        text(format!("Size: {} bytes", file.size)).size(16),
    ]
    .spacing(4);

    let label = if data.is_playing { "Pause" } else { "Play" };
    let play_button = button(text(label).size(18))
        .padding([8, 24])
        .on_press(crate::Message::TogglePlay)
        .style(|_theme, _status| button::Style {
            background: Some(iced::Background::Color(Color::from_rgb(0.8, 0.2, 0.2))),
            text_color: Color::WHITE,
            border: Border {
                radius: 20.0.into(),
                ..Border::default()
            },
            ..button::Style::default()
        });

    let mut info = column![details, play_button]
        .spacing(15)
        .align_x(Alignment::Center);

    if data.is_playing {
        info = info.push(Visualizer::new(data.frame).view());
    }

    info.into()
}
