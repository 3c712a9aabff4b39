//! The JPEG marker catalog (ITU-T T.81, Table B.1).

use std::fmt;

/// The second byte of a `0xFF 0xXX` marker.
///
/// Markers are kept as a plain byte so that unknown or reserved codes can be carried through the
/// decoder (and reported in errors) without loss.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Marker(pub u8);

impl Marker {
    /// Baseline DCT.
    pub const SOF0: Self = Self(0xC0);
    /// Extended sequential DCT.
    pub const SOF1: Self = Self(0xC1);
    /// Progressive DCT.
    pub const SOF2: Self = Self(0xC2);
    /// Lossless (sequential).
    pub const SOF3: Self = Self(0xC3);
    /// Define Huffman table(s).
    pub const DHT: Self = Self(0xC4);
    /// Differential sequential DCT.
    pub const SOF5: Self = Self(0xC5);
    /// Differential progressive DCT.
    pub const SOF6: Self = Self(0xC6);
    /// Differential lossless (sequential).
    pub const SOF7: Self = Self(0xC7);
    /// Reserved for JPEG extensions.
    pub const JPG: Self = Self(0xC8);
    /// Extended sequential DCT, arithmetic coding.
    pub const SOF9: Self = Self(0xC9);
    /// Progressive DCT, arithmetic coding.
    pub const SOF10: Self = Self(0xCA);
    /// Lossless (sequential), arithmetic coding.
    pub const SOF11: Self = Self(0xCB);
    /// Define arithmetic coding conditioning(s).
    pub const DAC: Self = Self(0xCC);
    /// Differential sequential DCT, arithmetic coding.
    pub const SOF13: Self = Self(0xCD);
    /// Differential progressive DCT, arithmetic coding.
    pub const SOF14: Self = Self(0xCE);
    /// Differential lossless (sequential), arithmetic coding.
    pub const SOF15: Self = Self(0xCF);
    pub const RST0: Self = Self(0xD0);
    pub const RST7: Self = Self(0xD7);
    /// Start of image.
    pub const SOI: Self = Self(0xD8);
    /// End of image.
    pub const EOI: Self = Self(0xD9);
    /// Start of scan.
    pub const SOS: Self = Self(0xDA);
    /// Define quantization table(s).
    pub const DQT: Self = Self(0xDB);
    /// Define number of lines.
    pub const DNL: Self = Self(0xDC);
    /// Define restart interval.
    pub const DRI: Self = Self(0xDD);
    /// Define hierarchical progression.
    pub const DHP: Self = Self(0xDE);
    /// Expand reference component(s).
    pub const EXP: Self = Self(0xDF);
    pub const APP0: Self = Self(0xE0);
    pub const APP15: Self = Self(0xEF);
    pub const JPG0: Self = Self(0xF0);
    pub const JPG13: Self = Self(0xFD);
    /// Comment.
    pub const COM: Self = Self(0xFE);
    /// For temporary private use in arithmetic coding.
    pub const TEM: Self = Self(0x01);

    /// Returns the full 16-bit marker code, e.g. `0xFFD8` for SOI.
    #[inline]
    pub fn code(self) -> u16 {
        0xFF00 | u16::from(self.0)
    }

    /// Returns whether this marker begins a frame header (any `SOFn`).
    ///
    /// DHT, JPG and DAC share the `0xC_` range but are not frame markers.
    pub fn is_frame(self) -> bool {
        matches!(self.0, 0xC0..=0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF)
    }

    /// Returns whether this is a frame marker of an arithmetic-coded process.
    pub fn is_arithmetic_frame(self) -> bool {
        matches!(self.0, 0xC9..=0xCB | 0xCD..=0xCF)
    }

    /// Returns `n` if this is an `RSTn` marker.
    pub fn rst_index(self) -> Option<u8> {
        match self.0 {
            0xD0..=0xD7 => Some(self.0 - 0xD0),
            _ => None,
        }
    }

    /// Returns `n` if this is an `APPn` marker.
    pub fn app_index(self) -> Option<u8> {
        match self.0 {
            0xE0..=0xEF => Some(self.0 - 0xE0),
            _ => None,
        }
    }

    /// The `RSTn` marker expected after `n` restart intervals (modulo 8).
    pub fn rst(n: u8) -> Self {
        Self(0xD0 + n % 8)
    }
}

impl fmt::Debug for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            Self::SOF0 => "SOF0",
            Self::SOF1 => "SOF1",
            Self::SOF2 => "SOF2",
            Self::SOF3 => "SOF3",
            Self::DHT => "DHT",
            Self::SOF5 => "SOF5",
            Self::SOF6 => "SOF6",
            Self::SOF7 => "SOF7",
            Self::JPG => "JPG",
            Self::SOF9 => "SOF9",
            Self::SOF10 => "SOF10",
            Self::SOF11 => "SOF11",
            Self::DAC => "DAC",
            Self::SOF13 => "SOF13",
            Self::SOF14 => "SOF14",
            Self::SOF15 => "SOF15",
            Self::SOI => "SOI",
            Self::EOI => "EOI",
            Self::SOS => "SOS",
            Self::DQT => "DQT",
            Self::DNL => "DNL",
            Self::DRI => "DRI",
            Self::DHP => "DHP",
            Self::EXP => "EXP",
            Self::COM => "COM",
            Self::TEM => "TEM",
            _ => {
                if let Some(n) = self.rst_index() {
                    return write!(f, "RST{n}");
                }
                if let Some(n) = self.app_index() {
                    return write!(f, "APP{n}");
                }
                return write!(f, "Marker(ff {:02x})", self.0);
            }
        };
        f.write_str(name)
    }
}
