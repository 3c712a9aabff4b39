//! Entropy-coded scan decoding.
//!
//! A scan is a sequence of MCUs, optionally split into restart intervals by `RSTn` markers. Every
//! data unit is Huffman-decoded into 64 quantized coefficients (DC differentially predicted, AC
//! run-length coded), dequantized, transformed back into samples by the inverse DCT and level
//! shifted into the unsigned sample range.

use std::io::Read;

use crate::bits::{self, BitReader, Interrupt};
use crate::error::{Error, Repr, Result};
use crate::header::{ComponentBinding, ScanPlan};
use crate::idct;
use crate::marker::Marker;
use crate::reader::ByteStream;

/// An 8x8 block of level-shifted samples, row-major.
pub type SampleBlock = [u16; 64];

/// The result of decoding a scan.
#[derive(Debug)]
pub(crate) struct ScanOutput {
    /// Decoded data units of every component of the [`ScanPlan`], in the order they were coded.
    pub blocks: Vec<Vec<SampleBlock>>,
    /// Number of MCUs decoded.
    pub mcus: usize,
    /// Number of lines defined by a DNL segment that ended the scan.
    pub lines: Option<u16>,
}

/// Sign-extends the `t`-bit magnitude `v` into a coefficient (`EXTEND`, Figure F.12).
pub fn extend(v: u16, t: u8) -> i32 {
    if t == 0 {
        return 0;
    }
    let v = i32::from(v);
    if v < 1 << (t - 1) {
        v - (1 << t) + 1
    } else {
        v
    }
}

enum Restart {
    Resume,
    End { lines: Option<u16> },
}

/// Decodes the entropy-coded data following a scan header.
///
/// `interval` is the restart interval in effect for the scan, `precision` the frame's sample
/// precision. On return, the marker that ended the scan (if any) has been pushed back into
/// `stream`.
pub(crate) fn decode_scan<R: Read>(
    stream: &mut ByteStream<R>,
    plan: &ScanPlan,
    interval: Option<u16>,
    precision: u8,
) -> Result<ScanOutput> {
    let interval = interval.filter(|&ri| ri != 0).map(usize::from);
    let mut bits = BitReader::new(stream);
    let mut predictors = vec![0; plan.components.len()];
    let mut blocks: Vec<Vec<SampleBlock>> = plan
        .components
        .iter()
        .map(|c| Vec::with_capacity(plan.mcu_count.unwrap_or(0) * c.units_per_mcu))
        .collect();
    let mut mcus = 0;
    let mut next_rst = 0;
    let mut lines = None;

    loop {
        if plan.mcu_count == Some(mcus) {
            break;
        }

        if let Some(ri) = interval {
            if mcus > 0 && mcus % ri == 0 {
                match restart(&mut bits, next_rst)? {
                    Restart::Resume => {
                        log::trace!("RST{next_rst} after {mcus} MCUs");
                        next_rst = (next_rst + 1) % 8;
                        predictors.fill(0);
                    }
                    Restart::End { lines: l } => {
                        lines = l;
                        break;
                    }
                }
            }
        }

        match decode_mcu(&mut bits, plan, &mut predictors, &mut blocks, precision) {
            Ok(()) => mcus += 1,
            // A marker or DNL segment right at an MCU boundary ends the scan.
            Err((0, Interrupt::Marker { marker, offset })) => {
                log::trace!("scan data ended by {marker:?} at offset {offset}");
                break;
            }
            Err((0, Interrupt::EndOfScan { lines: l })) => {
                lines = Some(l);
                break;
            }
            Err((_, interrupt)) => return Err(interrupt.into_error()),
        }
    }

    if let Some(count) = plan.mcu_count {
        if mcus < count {
            log::warn!("scan ended after {mcus} of {count} MCUs");
        }
    }
    log::trace!("decoded {mcus} MCUs");

    Ok(ScanOutput {
        blocks,
        mcus,
        lines,
    })
}

/// Handles a restart interval boundary: expects `RST{expected}`.
fn restart<R: Read>(bits: &mut BitReader<'_, R>, expected: u8) -> Result<Restart> {
    bits.realign();
    let stream = bits.stream();
    let offset = stream.position();
    let marker = stream.read_marker()?;
    match marker.rst_index() {
        Some(n) if n == expected => Ok(Restart::Resume),
        Some(_) => Err(Error::from(Repr::RestartSequence {
            expected,
            found: marker,
            offset,
        })),
        None if marker == Marker::DNL => {
            let lines = bits::read_dnl(stream)?;
            log::debug!("DNL at offset {offset}: {lines} lines");
            Ok(Restart::End { lines: Some(lines) })
        }
        None => {
            stream.unread();
            Ok(Restart::End { lines: None })
        }
    }
}

/// Decodes one MCU, appending its data units to `blocks`.
///
/// On failure, also returns how many data units of the MCU were complete.
fn decode_mcu<R: Read>(
    bits: &mut BitReader<'_, R>,
    plan: &ScanPlan,
    predictors: &mut [i32],
    blocks: &mut [Vec<SampleBlock>],
    precision: u8,
) -> Result<(), (usize, Interrupt)> {
    let mut done = 0;
    for (i, component) in plan.components.iter().enumerate() {
        for _ in 0..component.units_per_mcu {
            let block = decode_data_unit(bits, component, &mut predictors[i], precision)
                .map_err(|e| (done, e))?;
            blocks[i].push(block);
            done += 1;
        }
    }
    Ok(())
}

fn decode_data_unit<R: Read>(
    bits: &mut BitReader<'_, R>,
    component: &ComponentBinding,
    predictor: &mut i32,
    precision: u8,
) -> Result<SampleBlock, Interrupt> {
    let mut zz = [0; 64];

    let t = component.dc.decode(bits)?;
    if t > 16 {
        return Err(invalid_symbol(bits, "DC magnitude category above 16"));
    }
    let diff = extend(bits.receive(t)?, t);
    *predictor = predictor.wrapping_add(diff);
    zz[0] = *predictor;

    let mut k = 1;
    while k < 64 {
        let rs = component.ac.decode(bits)?;
        let (r, s) = (rs >> 4, rs & 0xf);
        if s == 0 {
            if r == 15 {
                // ZRL: a run of 16 zero coefficients.
                k += 16;
                continue;
            }
            // EOB
            break;
        }

        k += usize::from(r);
        if k > 63 {
            return Err(invalid_symbol(bits, "AC run extends past the end of the block"));
        }
        zz[k] = extend(bits.receive(s)?, s);
        k += 1;
    }

    component.quant.dequantize(&mut zz);
    let samples = idct::idct(&idct::unzigzag(&zz));
    Ok(idct::level_shift(&samples, precision))
}

fn invalid_symbol<R: Read>(bits: &BitReader<'_, R>, reason: &'static str) -> Interrupt {
    Error::from(Repr::InvalidSymbol {
        offset: bits.position(),
        reason,
    })
    .into()
}
