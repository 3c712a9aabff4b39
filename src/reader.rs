//! Marker-aware byte access over an arbitrary [`Read`] source.
//!
//! JPEG data consists of two kinds of byte sequences: marker segment parameters, which are read
//! verbatim, and entropy-coded scan data, in which every data byte `0xFF` is followed by a stuffed
//! `0x00` so that it cannot be confused with a marker. [`ByteStream`] exposes both: the
//! `read_byte`/`read_marker` pair tokenizes stuffed data, the `read_u8`/`read_u16`/`read_bytes`
//! family reads segment parameters.

use std::io::{self, Read};
use std::mem;

use bytemuck::AnyBitPattern;

use crate::error::{Error, Repr, Result};
use crate::marker::Marker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Token {
    Byte(u8),
    Marker(Marker),
}

pub struct ByteStream<R> {
    inner: R,
    /// Number of bytes consumed from `inner`.
    position: u64,
    /// The most recently read token and the offset it started at.
    last: Option<(Token, u64)>,
    pushed_back: bool,
}

impl<R: Read> ByteStream<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            position: 0,
            last: None,
            pushed_back: false,
        }
    }

    /// Returns the offset of the next token in the input.
    pub fn position(&self) -> u64 {
        match self.last {
            Some((_, offset)) if self.pushed_back => offset,
            _ => self.position,
        }
    }

    fn next_raw(&mut self) -> Result<u8> {
        let mut buf = [0];
        match self.inner.read_exact(&mut buf) {
            Ok(()) => {
                self.position += 1;
                Ok(buf[0])
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                Err(Error::exhausted(self.position))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) fn read_token(&mut self) -> Result<Token> {
        if self.pushed_back {
            if let Some((token, _)) = self.last {
                self.pushed_back = false;
                return Ok(token);
            }
        }

        let offset = self.position;
        let byte = self.next_raw()?;
        let token = if byte != 0xFF {
            Token::Byte(byte)
        } else {
            // Any number of `0xFF` fill bytes may precede a marker.
            let mut code = self.next_raw()?;
            while code == 0xFF {
                code = self.next_raw()?;
            }
            match code {
                0x00 => Token::Byte(0xFF),
                code => Token::Marker(Marker(code)),
            }
        };

        self.last = Some((token, offset));
        Ok(token)
    }

    /// Pushes the most recently read token back, so that the next read returns it again.
    ///
    /// Only a single token of pushback is available.
    pub fn unread(&mut self) {
        debug_assert!(!self.pushed_back, "`unread` called twice in a row");
        if self.last.is_some() {
            self.pushed_back = true;
        }
    }

    /// Reads one byte of entropy-coded data, undoing `0xFF 0x00` byte stuffing.
    ///
    /// Fails with [`ErrorKind::UnexpectedMarker`](crate::ErrorKind::UnexpectedMarker) if the
    /// next token is a marker.
    pub fn read_byte(&mut self) -> Result<u8> {
        let offset = self.position();
        match self.read_token()? {
            Token::Byte(byte) => Ok(byte),
            Token::Marker(marker) => Err(Error::from(Repr::UnexpectedMarker { marker, offset })),
        }
    }

    /// Reads a `0xFF 0xXX` marker.
    ///
    /// Fails with [`ErrorKind::UnexpectedByte`](crate::ErrorKind::UnexpectedByte) if the next
    /// token is an ordinary byte.
    pub fn read_marker(&mut self) -> Result<Marker> {
        let offset = self.position();
        match self.read_token()? {
            Token::Marker(marker) => Ok(marker),
            Token::Byte(byte) => Err(Error::from(Repr::UnexpectedByte { byte, offset })),
        }
    }

    /// Reads a single segment parameter byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        if self.pushed_back {
            let offset = self.position();
            return match self.read_token()? {
                Token::Byte(byte) => Ok(byte),
                Token::Marker(marker) => {
                    Err(Error::from(Repr::UnexpectedMarker { marker, offset }))
                }
            };
        }
        self.last = None;
        self.next_raw()
    }

    /// Reads a big-endian 16-bit segment parameter.
    pub fn read_u16(&mut self) -> Result<u16> {
        let b = [self.read_u8()?, self.read_u8()?];
        Ok(u16::from_be_bytes(b))
    }

    /// Reads `count` segment parameter bytes.
    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(count);
        for _ in 0..count {
            bytes.push(self.read_u8()?);
        }
        Ok(bytes)
    }

    /// Reads `count` instances of a plain-old-data segment structure.
    pub(crate) fn read_objs<T: AnyBitPattern>(&mut self, count: usize) -> Result<Vec<T>> {
        assert_eq!(mem::align_of::<T>(), 1);

        let bytes = self.read_bytes(count * mem::size_of::<T>())?;
        Ok(bytes
            .chunks_exact(mem::size_of::<T>())
            .map(bytemuck::pod_read_unaligned)
            .collect())
    }

    /// Reads a segment length field and returns the number of payload bytes that follow it.
    ///
    /// The length parameter counts the two length bytes themselves, but not the `FF xx` marker.
    pub(crate) fn read_length(&mut self, marker: Marker) -> Result<u16> {
        let offset = self.position();
        let len = self.read_u16()?;
        if len < 2 {
            return Err(Error::malformed(
                marker,
                offset,
                format!("invalid segment length {len}"),
            ));
        }
        Ok(len - 2)
    }

    /// Consumes the rest of the input, returning the number of bytes that were left.
    pub(crate) fn drain(&mut self) -> Result<u64> {
        let mut count = 0;
        if self.pushed_back {
            count += self.position - self.position();
            self.pushed_back = false;
        }
        count += io::copy(&mut self.inner, &mut io::sink())?;
        self.position += count;
        Ok(count)
    }
}
