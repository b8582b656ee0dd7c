use std::fmt;

use serde::{Deserialize, Serialize};

/// RGBW color as held by a fixture between writes.
///
/// Channels are kept as `f32` so fades can accumulate fractional steps; they
/// are clamped to `[0, 255]` only when converted to wire bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub w: f32,
}

impl Color {
    pub const BLACK: Color = Color::rgbw(0.0, 0.0, 0.0, 0.0);

    pub const fn rgbw(r: f32, g: f32, b: f32, w: f32) -> Self {
        Self { r, g, b, w }
    }

    /// Builds a color from wire-level byte values.
    pub fn from_bytes([r, g, b, w]: [u8; 4]) -> Self {
        Self::rgbw(r as f32, g as f32, b as f32, w as f32)
    }

    pub fn get(&self, channel: ColorChannel) -> f32 {
        match channel {
            ColorChannel::Red => self.r,
            ColorChannel::Green => self.g,
            ColorChannel::Blue => self.b,
            ColorChannel::White => self.w,
        }
    }

    pub fn set(&mut self, channel: ColorChannel, value: f32) {
        match channel {
            ColorChannel::Red => self.r = value,
            ColorChannel::Green => self.g = value,
            ColorChannel::Blue => self.b = value,
            ColorChannel::White => self.w = value,
        }
    }

    /// Returns true when every channel is below `threshold`.
    pub fn all_below(&self, threshold: f32) -> bool {
        ColorChannel::ALL
            .iter()
            .all(|channel| self.get(*channel) < threshold)
    }

    /// Wire bytes in r, g, b, w order.
    pub fn to_bytes(&self) -> [u8; 4] {
        [
            to_dmx(self.r),
            to_dmx(self.g),
            to_dmx(self.b),
            to_dmx(self.w),
        ]
    }
}

/// Converts a float channel value to a DMX byte, clamping to `[0, 255]`.
pub fn to_dmx(value: f32) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.clamp(0.0, 255.0) as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorChannel {
    Red,
    Green,
    Blue,
    White,
}

impl ColorChannel {
    pub const ALL: [ColorChannel; 4] = [
        ColorChannel::Red,
        ColorChannel::Green,
        ColorChannel::Blue,
        ColorChannel::White,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ColorChannel::Red => "red",
            ColorChannel::Green => "green",
            ColorChannel::Blue => "blue",
            ColorChannel::White => "white",
        }
    }
}

impl fmt::Display for ColorChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Channel offsets of a model, relative to a fixture's base address.
///
/// `None` means the model has no wiring for that function.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelLayout {
    #[serde(default)]
    pub red: Option<u8>,
    #[serde(default)]
    pub green: Option<u8>,
    #[serde(default)]
    pub blue: Option<u8>,
    #[serde(default)]
    pub white: Option<u8>,
    #[serde(default)]
    pub tilt: Option<u8>,
    #[serde(default)]
    pub pan: Option<u8>,
    #[serde(default)]
    pub motor_speed: Option<u8>,
    #[serde(default)]
    pub brightness: Option<u8>,
}

impl ChannelLayout {
    pub fn color(&self, channel: ColorChannel) -> Option<u8> {
        match channel {
            ColorChannel::Red => self.red,
            ColorChannel::Green => self.green,
            ColorChannel::Blue => self.blue,
            ColorChannel::White => self.white,
        }
    }

    /// Pairs each wired color channel with its offset, in r, g, b, w order.
    pub fn color_channels(&self) -> impl Iterator<Item = (ColorChannel, u8)> + '_ {
        ColorChannel::ALL
            .into_iter()
            .filter_map(|channel| self.color(channel).map(|offset| (channel, offset)))
    }
}
