//! Bijective `u32` <-> RGBA colour encoding and colour sketches.

use std::fmt;

use image::Rgba;

use crate::error::{Result, ThorError};

/// One 8-bit RGBA colour.
///
/// Channels are private and the hex form is derived on demand, so the
/// textual form always matches the channel bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Colour {
    r: u8,
    g: u8,
    b: u8,
    a: u8,
}

/// A single colour channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    R,
    G,
    B,
    A,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            Channel::R => "R",
            Channel::G => "G",
            Channel::B => "B",
            Channel::A => "A",
        };
        f.write_str(c)
    }
}

impl TryFrom<char> for Channel {
    type Error = ThorError;

    fn try_from(c: char) -> Result<Self> {
        match c.to_ascii_uppercase() {
            'R' => Ok(Channel::R),
            'G' => Ok(Channel::G),
            'B' => Ok(Channel::B),
            'A' => Ok(Channel::A),
            _ => Err(ThorError::Format(format!(
                "unknown colour channel `{}` (expected one of R, G, B, A)",
                c
            ))),
        }
    }
}

/// How colours are written in text exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notation {
    /// `#RRGGBBAA`
    Hex,
    /// `rgba(r,g,b,a)`
    Rgba,
}

impl Colour {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Colour { r, g, b, a }
    }

    /// Slice a 32-bit value into channels, least significant byte first:
    /// bits 0-7 -> R, 8-15 -> G, 16-23 -> B, 24-31 -> A.
    pub const fn from_u32(value: u32) -> Self {
        let [r, g, b, a] = value.to_le_bytes();
        Colour { r, g, b, a }
    }

    /// Inverse of [`Colour::from_u32`].
    pub const fn to_u32(self) -> u32 {
        u32::from_le_bytes([self.r, self.g, self.b, self.a])
    }

    /// Parse `RRGGBBAA`, with or without a leading `#`.
    pub fn from_hex(text: &str) -> Result<Self> {
        let digits = text.strip_prefix('#').unwrap_or(text);
        let invalid = || ThorError::Format(format!("invalid hex colour: {:?}", text));
        if digits.len() != 8 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let byte = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| invalid());
        Ok(Colour {
            r: byte(0)?,
            g: byte(2)?,
            b: byte(4)?,
            a: byte(6)?,
        })
    }

    pub fn r(&self) -> u8 {
        self.r
    }

    pub fn g(&self) -> u8 {
        self.g
    }

    pub fn b(&self) -> u8 {
        self.b
    }

    pub fn a(&self) -> u8 {
        self.a
    }

    pub fn channel(&self, channel: Channel) -> u8 {
        match channel {
            Channel::R => self.r,
            Channel::G => self.g,
            Channel::B => self.b,
            Channel::A => self.a,
        }
    }

    pub fn hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}{:02X}", self.r, self.g, self.b, self.a)
    }

    pub fn rgba(&self) -> String {
        format!("rgba({},{},{},{})", self.r, self.g, self.b, self.a)
    }

    pub fn render(&self, notation: Notation) -> String {
        match notation {
            Notation::Hex => self.hex(),
            Notation::Rgba => self.rgba(),
        }
    }

    /// Returns a copy with `by` added to one channel.
    pub fn adjust(self, channel: Channel, by: u8) -> Result<Self> {
        let value = self.channel(channel);
        let adjusted = value
            .checked_add(by)
            .ok_or(ThorError::ChannelOverflow { channel, value, by })?;
        let mut out = self;
        match channel {
            Channel::R => out.r = adjusted,
            Channel::G => out.g = adjusted,
            Channel::B => out.b = adjusted,
            Channel::A => out.a = adjusted,
        }
        Ok(out)
    }

    pub fn with_alpha(self, a: u8) -> Self {
        Colour { a, ..self }
    }

    pub fn to_pixel(self) -> Rgba<u8> {
        Rgba([self.r, self.g, self.b, self.a])
    }

    pub fn to_bytes(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub fn from_bytes([r, g, b, a]: [u8; 4]) -> Self {
        Colour { r, g, b, a }
    }
}

impl fmt::Display for Colour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex())
    }
}

/// Encode raw sketch values, rejecting anything outside the 32-bit domain.
pub fn encode_raw(id: &str, values: &[u64]) -> Result<Vec<Colour>> {
    values
        .iter()
        .enumerate()
        .map(|(index, &value)| {
            u32::try_from(value)
                .map(Colour::from_u32)
                .map_err(|_| ThorError::Overflow {
                    id: id.to_string(),
                    index,
                    value,
                })
        })
        .collect()
}

/// A fixed-length colour vector tagged with an identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColourSketch {
    id: String,
    colours: Vec<Colour>,
}

impl ColourSketch {
    pub fn new(id: impl Into<String>, values: &[u32]) -> Result<Self> {
        Self::from_colours(id, values.iter().copied().map(Colour::from_u32).collect())
    }

    pub fn from_colours(id: impl Into<String>, colours: Vec<Colour>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(ThorError::MissingId);
        }
        Ok(ColourSketch { id, colours })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn len(&self) -> usize {
        self.colours.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colours.is_empty()
    }

    pub fn colours(&self) -> &[Colour] {
        &self.colours
    }

    /// Comma-joined colours, without the identifier.
    pub fn csv_line(&self, notation: Notation) -> String {
        self.colours
            .iter()
            .map(|c| c.render(notation))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// One image row.
    pub fn pixels(&self) -> Vec<Rgba<u8>> {
        self.colours.iter().map(|c| c.to_pixel()).collect()
    }

    /// Returns a new sketch with `by` added to one channel of every element.
    pub fn adjust(&self, channel: Channel, by: u8) -> Result<Self> {
        let colours = self
            .colours
            .iter()
            .enumerate()
            .map(|(i, c)| {
                c.adjust(channel, by).map_err(|_| ThorError::ElementOverflow {
                    id: self.id.clone(),
                    index: i,
                    channel,
                    value: c.channel(channel),
                    by,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ColourSketch {
            id: self.id.clone(),
            colours,
        })
    }

    pub fn with_alpha(&self, a: u8) -> Self {
        ColourSketch {
            id: self.id.clone(),
            colours: self.colours.iter().map(|c| c.with_alpha(a)).collect(),
        }
    }
}
