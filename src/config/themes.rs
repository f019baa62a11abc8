use ratatui::style::Color;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn toggle(self) -> Self {
        match self {
            Theme::Dark => Theme::Light,
            Theme::Light => Theme::Dark,
        }
    }

    pub fn palette(self) -> Palette {
        match self {
            Theme::Dark => Palette {
                background: (0x1c, 0x1c, 0x1a),
                text: (0xe2, 0xe0, 0xd6),
                accent: Color::Rgb(0xe0, 0xa8, 0x4e),
                muted: Color::Rgb(0x7a, 0x78, 0x70),
                surface: Color::Rgb(0x2a, 0x2a, 0x27),
                unsaved: Color::Rgb(0xe0, 0x6c, 0x4e),
            },
            Theme::Light => Palette {
                background: (0xf7, 0xf5, 0xee),
                text: (0x2b, 0x2b, 0x2b),
                accent: Color::Rgb(0xb0, 0x6a, 0x10),
                muted: Color::Rgb(0x8a, 0x86, 0x7c),
                surface: Color::Rgb(0xe9, 0xe5, 0xda),
                unsaved: Color::Rgb(0xc0, 0x3a, 0x20),
            },
        }
    }

    /// Hint shown next to the theme toggle: the theme a toggle would switch to.
    pub fn toggle_hint(self) -> &'static str {
        match self {
            Theme::Dark => "Light mode",
            Theme::Light => "Dark mode",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Palette {
    pub background: (u8, u8, u8),
    pub text: (u8, u8, u8),
    pub accent: Color,
    pub muted: Color,
    pub surface: Color,
    pub unsaved: Color,
}

impl Palette {
    pub fn background_color(&self) -> Color {
        let (r, g, b) = self.background;
        Color::Rgb(r, g, b)
    }

    /// Blends `fg` toward the background; `percent` of 100 keeps `fg` as is.
    pub fn blend(&self, fg: (u8, u8, u8), percent: u8) -> Color {
        let weight = u16::from(percent.min(100));
        let mix = |f: u8, b: u8| -> u8 {
            let f = u16::from(f);
            let b = u16::from(b);
            ((f * weight + b * (100 - weight)) / 100) as u8
        };
        let (br, bg, bb) = self.background;
        Color::Rgb(mix(fg.0, br), mix(fg.1, bg), mix(fg.2, bb))
    }
}
