//! MSB-first bit reader over entropy-coded scan data.

use std::io::Read;

use crate::error::{Error, ErrorKind, Repr, Result};
use crate::marker::Marker;
use crate::reader::ByteStream;

/// Why the bit reader stopped handing out bits.
#[derive(Debug)]
pub(crate) enum Interrupt {
    /// A DNL segment was embedded in the scan data. Carries the number of lines it defines.
    EndOfScan { lines: u16 },
    /// A marker other than DNL follows the scan data. It has been pushed back into the
    /// [`ByteStream`], so the caller can read it again.
    Marker { marker: Marker, offset: u64 },
    Error(Error),
}

impl From<Error> for Interrupt {
    fn from(e: Error) -> Self {
        Self::Error(e)
    }
}

impl Interrupt {
    /// Converts the interrupt into a hard error, for places where the scan cannot end.
    pub(crate) fn into_error(self) -> Error {
        match self {
            Interrupt::EndOfScan { .. } => {
                Error::header("unexpected DNL segment inside a data unit")
            }
            Interrupt::Marker { marker, offset } => {
                Error::from(Repr::UnexpectedMarker { marker, offset })
            }
            Interrupt::Error(e) => e,
        }
    }
}

/// Reads the payload of a DNL segment whose marker has already been consumed, returning the
/// number of lines it defines.
pub(crate) fn read_dnl<R: Read>(stream: &mut ByteStream<R>) -> Result<u16> {
    let offset = stream.position();
    let len = stream.read_u16()?;
    if len != 4 {
        return Err(Error::malformed(
            Marker::DNL,
            offset,
            format!("length must be 4, got {len}"),
        ));
    }
    stream.read_u16()
}

pub(crate) struct BitReader<'a, R> {
    stream: &'a mut ByteStream<R>,
    bits: u8,
    /// Selects the next bit of `bits` to hand out. 0 when `bits` is exhausted.
    mask: u8,
}

impl<'a, R: Read> BitReader<'a, R> {
    pub(crate) fn new(stream: &'a mut ByteStream<R>) -> Self {
        Self {
            stream,
            bits: 0,
            mask: 0,
        }
    }

    /// Returns the offset of the next unread byte of scan data.
    pub(crate) fn position(&self) -> u64 {
        self.stream.position()
    }

    pub(crate) fn stream(&mut self) -> &mut ByteStream<R> {
        self.stream
    }

    /// Discards any bits left over from the current byte.
    ///
    /// Entropy-coded segments are padded with 1-bits up to a byte boundary before every marker,
    /// so this is done at every restart marker.
    pub(crate) fn realign(&mut self) {
        self.bits = 0;
        self.mask = 0;
    }

    fn refill(&mut self) -> Result<(), Interrupt> {
        let offset = self.stream.position();
        match self.stream.read_byte() {
            Ok(byte) => {
                self.bits = byte;
                self.mask = 0b1000_0000;
                Ok(())
            }
            Err(e) => {
                let (ErrorKind::UnexpectedMarker, Some(marker)) = (e.kind(), e.marker()) else {
                    return Err(e.into());
                };
                if marker != Marker::DNL {
                    self.stream.unread();
                    return Err(Interrupt::Marker { marker, offset });
                }

                let lines = read_dnl(self.stream)?;
                log::debug!("DNL at offset {offset}: {lines} lines");
                Err(Interrupt::EndOfScan { lines })
            }
        }
    }

    pub(crate) fn next_bit(&mut self) -> Result<u16, Interrupt> {
        if self.mask == 0 {
            self.refill()?;
        }

        let bit = self.bits & self.mask != 0;
        self.mask >>= 1;
        Ok(u16::from(bit))
    }

    /// Reads `count` bits, most significant bit first. `count` must not exceed 16.
    pub(crate) fn receive(&mut self, count: u8) -> Result<u16, Interrupt> {
        debug_assert!(count <= 16);
        let mut value = 0;
        for _ in 0..count {
            value = (value << 1) | self.next_bit()?;
        }
        Ok(value)
    }
}
