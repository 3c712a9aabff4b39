//! A decoder for sequential, Huffman-coded JPEG images (ITU-T T.81).
//!
//! The decoder produces one sample plane per frame component. Color conversion and any further
//! processing of the planes are left to the caller.
//!
//! ```no_run
//! # fn main() -> Result<(), jpegdec::Error> {
//! let jpeg = std::fs::read("image.jpg")?;
//! let image = jpegdec::decode(&jpeg)?;
//! for plane in image.planes() {
//!     println!("component {}: {}x{}", plane.id(), plane.width(), plane.height());
//! }
//! # Ok(())
//! # }
//! ```

mod bits;
mod error;
mod header;
mod huffman;
mod idct;
mod image;
mod marker;
mod options;
mod reader;
mod scan;
mod tables;
#[cfg(test)]
mod tests;

use std::io::Read;

use error::{Repr, Result};

pub use error::{Error, ErrorKind};
pub use header::{padding, FrameComponent, FrameHeader, ScanComponent, ScanHeader};
pub use huffman::{HuffmanTable, TableClass};
pub use idct::{fdct, idct, level_shift, unzigzag, Block, UNZIGZAG};
pub use image::{BlockLayout, BlockMap, ComponentBlocks, Image, Plane};
pub use marker::Marker;
pub use options::DecoderOptions;
pub use reader::ByteStream;
pub use scan::{extend, SampleBlock};
pub use tables::{AppSegment, DensityUnit, Jfif, MiscTables, QuantizationTable};

/// Decodes an in-memory JPEG image with the default [`DecoderOptions`].
pub fn decode(jpeg: &[u8]) -> Result<Image> {
    Decoder::new(jpeg).decode()
}

/// A JPEG decoder reading from an [`io::Read`][std::io::Read] source.
///
/// Input is consumed one byte at a time, so readers that perform system calls should be wrapped
/// in a [`BufReader`][std::io::BufReader].
pub struct Decoder<R> {
    stream: ByteStream<R>,
    options: DecoderOptions,
}

impl<R: Read> Decoder<R> {
    pub fn new(reader: R) -> Self {
        Self::with_options(reader, DecoderOptions::default())
    }

    pub fn with_options(reader: R, options: DecoderOptions) -> Self {
        Self {
            stream: ByteStream::new(reader),
            options,
        }
    }

    /// Decodes the image and assembles its sample planes.
    pub fn decode(self) -> Result<Image> {
        let frame = self.decode_blocks()?;
        Ok(frame.to_image())
    }

    /// Decodes the image into per-component data units, without assembling them into planes.
    ///
    /// If this returns an error, it either means that the JPEG stream is malformed, or that it
    /// uses a coding process this library does not support (progressive, lossless, hierarchical or
    /// arithmetic coding).
    pub fn decode_blocks(self) -> Result<DecodedFrame> {
        macro_rules! bail {
            ($($args:tt)*) => {
                return Err(Error::header(format!(
                    $($args)*
                )))
            };
        }

        let Self {
            mut stream,
            options,
        } = self;
        let stream = &mut stream;
        let offset = stream.position();
        let marker = stream.read_marker()?;
        if marker != Marker::SOI {
            return Err(Error::from(Repr::UnexpectedMarker { marker, offset }));
        }

        let mut tables = tables::read_misc_tables(stream)?;

        let offset = stream.position();
        let marker = stream.read_marker()?;
        check_frame_type(marker, offset)?;
        let mut frame = header::read_frame_header(stream, marker, offset)?;
        let valid_precision = match marker {
            Marker::SOF0 => frame.P() == 8,
            _ => frame.P() == 8 || frame.P() == 12,
        };
        if !valid_precision {
            return Err(Error::malformed(
                marker,
                offset,
                format!("sample precision of {} bits is not allowed", frame.P()),
            ));
        }
        check_pixel_limit(&options, &frame)?;

        let mut blocks = BlockMap::default();
        let mut scans = 0;
        loop {
            let local = tables::read_misc_tables(stream)?;
            tables = tables.cascade(&local);

            let offset = stream.position();
            let marker = stream.read_marker()?;
            match marker {
                Marker::SOS => {
                    let scan = header::read_scan_header(stream, offset)?;
                    if !scan.is_sequential() {
                        return Err(Error::unsupported(format!(
                            "scan with Ss={}, Se={}, Ah={}, Al={}",
                            scan.Ss(),
                            scan.Se(),
                            scan.Ah(),
                            scan.Al(),
                        )));
                    }
                    if frame.Y() == 0 && scans > 0 {
                        bail!("frame height was not defined by a DNL segment after the first scan");
                    }

                    let plan = header::bind_components(&frame, &tables, &scan)?;
                    log::trace!("scan plan: {plan:?}");
                    let out =
                        scan::decode_scan(stream, &plan, tables.restart_interval(), frame.P())?;

                    if let Some(lines) = out.lines {
                        apply_dnl(&mut frame, lines)?;
                        check_pixel_limit(&options, &frame)?;
                    }
                    if frame.Y() == 0 {
                        bail!("frame height is 0, but no DNL segment follows the first scan");
                    }

                    for (binding, component_blocks) in plan.components.iter().zip(out.blocks) {
                        let layout = if plan.is_interleaved() {
                            BlockLayout::Interleaved {
                                h: binding.h,
                                v: binding.v,
                                mcus_per_line: plan.mcus_per_line,
                            }
                        } else {
                            BlockLayout::Raster {
                                blocks_per_line: plan.mcus_per_line,
                            }
                        };
                        blocks.insert(ComponentBlocks::new(binding.id, layout, component_blocks))?;
                    }
                    scans += 1;
                }
                Marker::DNL => {
                    let lines = bits::read_dnl(stream)?;
                    log::debug!("DNL at offset {offset}: {lines} lines");
                    apply_dnl(&mut frame, lines)?;
                    check_pixel_limit(&options, &frame)?;
                }
                Marker::EOI => break,
                _ => return Err(Error::from(Repr::UnexpectedMarker { marker, offset })),
            }
        }

        if scans == 0 {
            bail!("frame contains no scans");
        }

        let offset = stream.position();
        let trailing = stream.drain()?;
        if trailing != 0 {
            if options.strict_trailing_data {
                bail!("{trailing} trailing bytes after EOI at offset {offset}");
            }
            log::warn!("ignoring {trailing} trailing bytes after EOI");
        }

        Ok(DecodedFrame {
            frame,
            tables,
            blocks,
        })
    }
}

fn check_pixel_limit(options: &DecoderOptions, frame: &FrameHeader) -> Result<()> {
    let Some(limit) = options.pixel_limit else {
        return Ok(());
    };
    let samples = frame
        .components()
        .iter()
        .map(|c| {
            let (w, h) = image::padded_size(frame, c.Hi(), c.Vi());
            w.saturating_mul(h)
        })
        .fold(0usize, usize::saturating_add);
    if samples > limit {
        return Err(Error::from(Repr::LimitExceeded(format!(
            "frame of {}x{} has {samples} samples, but only {limit} are allowed",
            frame.X(),
            frame.Y(),
        ))));
    }
    Ok(())
}

fn check_frame_type(marker: Marker, offset: u64) -> Result<()> {
    let process = match marker {
        Marker::SOF0 | Marker::SOF1 => return Ok(()),
        Marker::SOF2 => "progressive DCT",
        Marker::SOF3 => "lossless",
        Marker::SOF5 | Marker::SOF6 | Marker::SOF7 => "hierarchical",
        m if m.is_arithmetic_frame() => "arithmetic coding",
        _ => return Err(Error::from(Repr::UnexpectedMarker { marker, offset })),
    };
    Err(Error::unsupported(format!("{process} ({marker:?})")))
}

fn apply_dnl(frame: &mut FrameHeader, lines: u16) -> Result<()> {
    if frame.Y() != 0 {
        return Err(Error::header(format!(
            "DNL segment defines {lines} lines, but the frame header already defined {}",
            frame.Y()
        )));
    }
    if lines == 0 {
        return Err(Error::header("DNL segment defines 0 lines"));
    }
    frame.set_lines(lines);
    Ok(())
}

/// The decoded data units of a frame, along with its headers and tables.
#[derive(Debug)]
pub struct DecodedFrame {
    frame: FrameHeader,
    tables: MiscTables,
    blocks: BlockMap,
}

impl DecodedFrame {
    /// Returns the frame header. If the height was defined by a DNL segment, it is included.
    #[inline]
    pub fn header(&self) -> &FrameHeader {
        &self.frame
    }

    /// Returns the tables in effect at the end of the frame, along with all COM and APPn segments.
    #[inline]
    pub fn tables(&self) -> &MiscTables {
        &self.tables
    }

    #[inline]
    pub fn blocks(&self) -> &BlockMap {
        &self.blocks
    }

    /// Lays out the data units of all components into sample planes.
    pub fn to_image(&self) -> Image {
        image::assemble(&self.frame, &self.blocks)
    }
}
