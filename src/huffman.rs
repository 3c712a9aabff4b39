//! Canonical Huffman tables (ITU-T T.81, Annex C) and symbol decoding (Annex F.2.2.3).

use core::fmt;
use std::io::Read;

use crate::bits::{BitReader, Interrupt};
use crate::error::{Error, Repr, Result};
use crate::marker::Marker;

/// Longest code length a JPEG Huffman table can describe.
pub const MAX_CODE_LENGTH: usize = 16;

/// Table class of a Huffman table (`Tc`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableClass {
    Dc = 0,
    Ac = 1,
}

impl TableClass {
    pub(crate) fn from_tc(tc: u8) -> Option<Self> {
        match tc {
            0 => Some(Self::Dc),
            1 => Some(Self::Ac),
            _ => None,
        }
    }
}

#[derive(Clone, Copy)]
struct Code {
    /// The code bits, stored in the least significant `length` bits.
    code: u16,
    /// Length of the huffman code in bits.
    length: u8,
    /// Decoded value. Meaning depends on table class (AC/DC).
    value: u8,
}

/// A Huffman decoding table built from a DHT segment.
///
/// The `mincode`/`maxcode`/`valptr` arrays are indexed by code length (1-16); index 0 is unused.
pub struct HuffmanTable {
    class: TableClass,
    target: u8,
    codes: Vec<Code>,
    mincode: [i32; MAX_CODE_LENGTH + 1],
    /// -1 for code lengths that have no codes, so that no code of that length is ever accepted.
    maxcode: [i32; MAX_CODE_LENGTH + 1],
    valptr: [usize; MAX_CODE_LENGTH + 1],
}

impl HuffmanTable {
    /// Builds the decoding table from the `BITS` list (number of codes of each length 1-16) and
    /// the `HUFFVAL` list (symbol values in order of increasing code length).
    pub fn build(
        class: TableClass,
        target: u8,
        num_codes_per_length: &[u8; 16],
        values: &[u8],
    ) -> Result<Self> {
        let num_values: usize = num_codes_per_length.iter().map(|&n| usize::from(n)).sum();
        if num_values != values.len() {
            return Err(Error::header(format!(
                "huffman table declares {num_values} codes, but {} values were given",
                values.len()
            )));
        }

        // `Generate_size_table` and `Generate_code_table`: codes of the same length are
        // consecutive integers, and moving on to the next length appends a 0 bit.
        let mut codes = Vec::with_capacity(num_values);
        let mut next_code: u32 = 0;
        let mut value_iter = values.iter();
        for (code_length, &code_count) in num_codes_per_length.iter().enumerate() {
            let code_length = (code_length + 1) as u8; // 1-based

            for _ in 0..code_count {
                if next_code >= 1 << code_length {
                    return Err(Error::header(format!(
                        "huffman table ({class:?} {target}) has too many codes of length {code_length}"
                    )));
                }
                // `value_iter` has exactly as many items as there are codes.
                let value = value_iter.next().copied().unwrap_or_default();
                codes.push(Code {
                    code: next_code as u16,
                    length: code_length,
                    value,
                });
                next_code += 1;
            }

            next_code <<= 1;
        }

        // `Decoder_tables`: first and last code of every length, and where its values start.
        let mut mincode = [0; MAX_CODE_LENGTH + 1];
        let mut maxcode = [-1; MAX_CODE_LENGTH + 1];
        let mut valptr = [0; MAX_CODE_LENGTH + 1];
        let mut j = 0;
        for length in 1..=MAX_CODE_LENGTH {
            let count = usize::from(num_codes_per_length[length - 1]);
            if count == 0 {
                continue;
            }
            valptr[length] = j;
            mincode[length] = i32::from(codes[j].code);
            j += count;
            maxcode[length] = i32::from(codes[j - 1].code);
        }

        Ok(Self {
            class,
            target,
            codes,
            mincode,
            maxcode,
            valptr,
        })
    }

    /// Returns the table class (DC or AC).
    #[inline]
    pub fn class(&self) -> TableClass {
        self.class
    }

    /// Returns the table destination identifier (0-3).
    #[inline]
    pub fn target(&self) -> u8 {
        self.target
    }

    /// Returns the number of codes in the table.
    #[inline]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Returns `(code, length, value)` for every code, in code order.
    pub fn codes(&self) -> impl Iterator<Item = (u16, u8, u8)> + '_ {
        self.codes.iter().map(|c| (c.code, c.length, c.value))
    }

    /// Decodes a single symbol (`DECODE`, Figure F.16).
    pub(crate) fn decode<R: Read>(&self, bits: &mut BitReader<'_, R>) -> Result<u8, Interrupt> {
        let mut code = i32::from(bits.next_bit()?);
        let mut length = 1;
        while code > self.maxcode[length] {
            length += 1;
            if length > MAX_CODE_LENGTH {
                return Err(Error::from(Repr::HuffmanDecodeFailure {
                    offset: bits.position(),
                })
                .into());
            }
            code = (code << 1) | i32::from(bits.next_bit()?);
        }

        let index = self.valptr[length] + (code - self.mincode[length]) as usize;
        Ok(self.codes[index].value)
    }
}

impl fmt::Debug for HuffmanTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for code in &self.codes {
            writeln!(
                f,
                "{} {:02$b} -> {3:02x}",
                code.length,
                code.code,
                usize::from(code.length),
                code.value,
            )?;
        }
        Ok(())
    }
}

/// Reads one table specification from a DHT segment. Returns the table and the number of
/// segment bytes it occupied.
pub(crate) fn read_table<R: Read>(
    stream: &mut crate::reader::ByteStream<R>,
) -> Result<(HuffmanTable, usize)> {
    let offset = stream.position();
    let tcth = stream.read_u8()?;
    let (tc, th) = (tcth >> 4, tcth & 0xf);
    let Some(class) = TableClass::from_tc(tc) else {
        return Err(Error::malformed(
            Marker::DHT,
            offset,
            format!("invalid table class Tc={tc} (only 0 and 1 are valid)"),
        ));
    };
    if th > 3 {
        return Err(Error::malformed(
            Marker::DHT,
            offset,
            format!("invalid table destination Th={th} (0-3 are allowed)"),
        ));
    }

    let mut num_codes_per_length = [0; 16];
    for count in &mut num_codes_per_length {
        *count = stream.read_u8()?;
    }
    let num_values = num_codes_per_length.iter().map(|&n| usize::from(n)).sum();
    let values = stream.read_bytes(num_values)?;

    let table = HuffmanTable::build(class, th, &num_codes_per_length, &values)
        .map_err(|e| Error::malformed(Marker::DHT, offset, e.to_string()))?;
    Ok((table, 1 + 16 + num_values))
}
