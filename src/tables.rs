//! Table-specification and miscellaneous marker segments (DQT, DHT, DRI, COM, APPn).

use std::fmt;
use std::io::Read;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::huffman::{self, HuffmanTable, TableClass};
use crate::marker::Marker;
use crate::reader::ByteStream;

/// A quantization table defined by a DQT segment.
#[derive(Clone)]
pub struct QuantizationTable {
    precision: u8,
    target: u8,
    /// Table elements in zig-zag order.
    values: [u16; 64],
}

impl QuantizationTable {
    pub fn new(precision: u8, target: u8, values: [u16; 64]) -> Self {
        Self {
            precision,
            target,
            values,
        }
    }

    /// Returns the element precision in bits (8 or 16).
    #[inline]
    pub fn precision(&self) -> u8 {
        self.precision
    }

    /// Returns the destination identifier (0-3).
    #[inline]
    pub fn target(&self) -> u8 {
        self.target
    }

    /// Returns the table elements, in zig-zag order.
    #[inline]
    pub fn values(&self) -> &[u16; 64] {
        &self.values
    }

    /// Multiplies every zig-zag ordered coefficient with the matching table element.
    pub(crate) fn dequantize(&self, coefficients: &mut [i32; 64]) {
        for (c, &q) in coefficients.iter_mut().zip(&self.values) {
            *c = c.saturating_mul(i32::from(q));
        }
    }
}

impl fmt::Debug for QuantizationTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuantizationTable")
            .field("Pq", &(self.precision / 8 - 1))
            .field("Tq", &self.target)
            .field("Qk", &self.values)
            .finish()
    }
}

/// An `APPn` segment, kept verbatim.
#[derive(Clone)]
pub struct AppSegment {
    n: u8,
    data: Vec<u8>,
}

impl AppSegment {
    /// Returns the type of APP marker (the `n` in `APPn`), in range `0..=15`.
    #[inline]
    pub fn n(&self) -> u8 {
        self.n
    }

    /// Returns the segment payload, excluding the marker and length field.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Debug for AppSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "APP{}({} bytes)", self.n, self.data.len())
    }
}

/// The tables and parameters in effect at some point of the stream.
///
/// Each region of miscellaneous segments (before the frame header, and before every scan)
/// produces one of these. Regions are combined with [`MiscTables::cascade`].
#[derive(Clone, Default)]
pub struct MiscTables {
    /// Indexed by `[class][target]`.
    huffman: [[Option<Arc<HuffmanTable>>; 4]; 2],
    quant: [Option<Arc<QuantizationTable>>; 4],
    /// `None` if no DRI segment was seen.
    interval: Option<u16>,
    comments: Vec<Vec<u8>>,
    apps: Vec<AppSegment>,
}

impl MiscTables {
    pub fn huffman(&self, class: TableClass, target: u8) -> Option<&Arc<HuffmanTable>> {
        self.huffman[class as usize]
            .get(usize::from(target))
            .and_then(Option::as_ref)
    }

    pub fn quant(&self, target: u8) -> Option<&Arc<QuantizationTable>> {
        self.quant.get(usize::from(target)).and_then(Option::as_ref)
    }

    /// Returns the restart interval in MCUs, if a DRI segment defined one.
    ///
    /// An interval of 0 disables restart markers.
    #[inline]
    pub fn restart_interval(&self) -> Option<u16> {
        self.interval
    }

    /// Returns the payloads of all COM segments, in stream order.
    pub fn comments(&self) -> impl Iterator<Item = &[u8]> {
        self.comments.iter().map(Vec::as_slice)
    }

    /// Returns all APPn segments, in stream order.
    pub fn app_segments(&self) -> &[AppSegment] {
        &self.apps
    }

    /// Returns the JFIF header, if the first APP0 segment contains one.
    pub fn jfif(&self) -> Result<Option<Jfif>> {
        match self.apps.iter().find(|app| app.n == 0) {
            Some(app) => read_jfif(&app.data),
            None => Ok(None),
        }
    }

    pub(crate) fn set_huffman(&mut self, table: HuffmanTable) {
        let class = table.class() as usize;
        let target = usize::from(table.target());
        self.huffman[class][target] = Some(Arc::new(table));
    }

    pub(crate) fn set_quant(&mut self, table: QuantizationTable) {
        let target = usize::from(table.target());
        self.quant[target] = Some(Arc::new(table));
    }

    /// Returns a new snapshot in which every table or parameter defined by `overlay` replaces the
    /// one in `self`. `self` and `overlay` are left untouched.
    ///
    /// Recorded COM and APPn segments of both are kept, `self`'s first.
    pub fn cascade(&self, overlay: &MiscTables) -> MiscTables {
        let mut out = self.clone();
        for (slots, overlay_slots) in out.huffman.iter_mut().zip(&overlay.huffman) {
            cascade_slots(slots, overlay_slots);
        }
        cascade_slots(&mut out.quant, &overlay.quant);
        if overlay.interval.is_some() {
            out.interval = overlay.interval;
        }
        out.comments.extend(overlay.comments.iter().cloned());
        out.apps.extend(overlay.apps.iter().cloned());
        out
    }
}

fn cascade_slots<T>(slots: &mut [Option<Arc<T>>; 4], overlay: &[Option<Arc<T>>; 4]) {
    for (slot, table) in slots.iter_mut().zip(overlay) {
        if let Some(table) = table {
            *slot = Some(table.clone());
        }
    }
}

impl fmt::Debug for MiscTables {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = |tables: &[Option<Arc<HuffmanTable>>; 4]| {
            tables
                .iter()
                .enumerate()
                .filter_map(|(i, t)| t.as_ref().map(|_| i))
                .collect::<Vec<_>>()
        };
        f.debug_struct("MiscTables")
            .field("dc", &slots(&self.huffman[0]))
            .field("ac", &slots(&self.huffman[1]))
            .field(
                "quant",
                &self
                    .quant
                    .iter()
                    .enumerate()
                    .filter_map(|(i, t)| t.as_ref().map(|_| i))
                    .collect::<Vec<_>>(),
            )
            .field("interval", &self.interval)
            .field("comments", &self.comments.len())
            .field("apps", &self.apps)
            .finish()
    }
}

/// Reads a region of table-specification and miscellaneous segments.
///
/// Stops at (and pushes back) the first marker that does not belong in such a region, which is
/// usually a frame header, SOS or EOI.
pub(crate) fn read_misc_tables<R: Read>(stream: &mut ByteStream<R>) -> Result<MiscTables> {
    let mut tables = MiscTables::default();
    loop {
        let offset = stream.position();
        let marker = stream.read_marker()?;
        match marker {
            Marker::DQT => read_dqt(stream, offset, &mut tables)?,
            Marker::DHT => read_dht(stream, offset, &mut tables)?,
            Marker::DRI => {
                let interval = read_dri(stream, offset)?;
                tables.interval = Some(interval);
            }
            Marker::COM => {
                let len = stream.read_length(marker)?;
                let com = stream.read_bytes(len.into())?;
                log::debug!("COM at offset {offset}: \"{}\"", com.escape_ascii());
                tables.comments.push(com);
            }
            Marker::DAC => {
                return Err(Error::unsupported(
                    "arithmetic coding conditioning (DAC segment)",
                ))
            }
            Marker::DHP | Marker::EXP => {
                return Err(Error::unsupported(format!(
                    "hierarchical coding ({marker:?} segment)"
                )))
            }
            Marker::TEM => {}
            m if m.app_index().is_some() => {
                let n = m.0 - Marker::APP0.0;
                let len = stream.read_length(marker)?;
                let data = stream.read_bytes(len.into())?;
                log::debug!("APP{n} at offset {offset}: {len} bytes");
                tables.apps.push(AppSegment { n, data });
            }
            m if m == Marker::JPG
                || (Marker::JPG0.0..=Marker::JPG13.0).contains(&m.0)
                || m.0 < Marker::SOF0.0 =>
            {
                // Extensions and reserved markers all carry a length field.
                let len = stream.read_length(marker)?;
                stream.read_bytes(len.into())?;
                log::debug!("skipping {marker:?} segment at offset {offset} ({len} bytes)");
            }
            _ => {
                stream.unread();
                return Ok(tables);
            }
        }
    }
}

fn read_dqt<R: Read>(
    stream: &mut ByteStream<R>,
    offset: u64,
    tables: &mut MiscTables,
) -> Result<()> {
    let mut remaining = usize::from(stream.read_length(Marker::DQT)?);
    while remaining > 0 {
        let table_offset = stream.position();
        let pqtq = stream.read_u8()?;
        let (pq, tq) = (pqtq >> 4, pqtq & 0xf);
        let size = match pq {
            0 => 1 + 64,
            1 => 1 + 128,
            _ => {
                return Err(Error::malformed(
                    Marker::DQT,
                    table_offset,
                    format!("invalid element precision Pq={pq}"),
                ))
            }
        };
        if tq > 3 {
            return Err(Error::malformed(
                Marker::DQT,
                table_offset,
                format!("invalid table destination Tq={tq} (0-3 are allowed)"),
            ));
        }
        if size > remaining {
            return Err(Error::malformed(
                Marker::DQT,
                offset,
                format!("table {tq} needs {size} bytes, but only {remaining} are left"),
            ));
        }

        let mut values = [0; 64];
        for value in &mut values {
            *value = match pq {
                0 => u16::from(stream.read_u8()?),
                _ => stream.read_u16()?,
            };
        }
        let precision = 8 * (pq + 1);
        log::debug!("DQT at offset {offset}: table {tq} ({precision}-bit)");
        tables.set_quant(QuantizationTable::new(precision, tq, values));
        remaining -= size;
    }
    Ok(())
}

fn read_dht<R: Read>(
    stream: &mut ByteStream<R>,
    offset: u64,
    tables: &mut MiscTables,
) -> Result<()> {
    let mut remaining = usize::from(stream.read_length(Marker::DHT)?);
    while remaining > 0 {
        let (table, size) = huffman::read_table(stream)?;
        if size > remaining {
            return Err(Error::malformed(
                Marker::DHT,
                offset,
                format!(
                    "table {:?} {} needs {size} bytes, but only {remaining} are left",
                    table.class(),
                    table.target(),
                ),
            ));
        }
        log::debug!(
            "DHT at offset {offset}: {:?} table {} ({} codes)",
            table.class(),
            table.target(),
            table.len(),
        );
        tables.set_huffman(table);
        remaining -= size;
    }
    Ok(())
}

fn read_dri<R: Read>(stream: &mut ByteStream<R>, offset: u64) -> Result<u16> {
    let len = stream.read_u16()?;
    if len != 4 {
        return Err(Error::malformed(
            Marker::DRI,
            offset,
            format!("length must be 4, got {len}"),
        ));
    }
    let interval = stream.read_u16()?;
    log::debug!("DRI at offset {offset}: {interval} MCUs");
    Ok(interval)
}

/// The JFIF header stored in an APP0 segment.
#[derive(Debug, Clone)]
pub struct Jfif {
    major_version: u8,
    minor_version: u8,
    unit: DensityUnit,
    xdensity: u16,
    ydensity: u16,
    xthumbnail: u8,
    ythumbnail: u8,
    thumbnail: Vec<u8>,
}

impl Jfif {
    #[inline]
    pub fn major_version(&self) -> u8 {
        self.major_version
    }

    #[inline]
    pub fn minor_version(&self) -> u8 {
        self.minor_version
    }

    #[inline]
    pub fn unit(&self) -> DensityUnit {
        self.unit
    }

    #[inline]
    pub fn density_x(&self) -> u16 {
        self.xdensity
    }

    #[inline]
    pub fn density_y(&self) -> u16 {
        self.ydensity
    }

    #[inline]
    pub fn thumbnail_width(&self) -> u8 {
        self.xthumbnail
    }

    #[inline]
    pub fn thumbnail_height(&self) -> u8 {
        self.ythumbnail
    }

    /// Returns the uncompressed RGB thumbnail.
    #[inline]
    pub fn thumbnail_data(&self) -> &[u8] {
        &self.thumbnail
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum DensityUnit {
    None,
    DotsPerInch,
    DotsPerCm,
}

fn read_jfif(data: &[u8]) -> Result<Option<Jfif>> {
    const JFIF: &[u8] = b"JFIF\0";

    if !data.starts_with(JFIF) {
        return Ok(None); // Not a JFIF header.
    }

    let mut reader = ByteStream::new(&data[JFIF.len()..]);
    let major_version = reader.read_u8()?;
    let minor_version = reader.read_u8()?;
    let unit = match reader.read_u8()? {
        0 => DensityUnit::None,
        1 => DensityUnit::DotsPerInch,
        2 => DensityUnit::DotsPerCm,
        e => {
            return Err(Error::header(format!(
                "JFIF header specifies invalid density unit {e}"
            )))
        }
    };
    let xdensity = reader.read_u16()?;
    let ydensity = reader.read_u16()?;
    let xthumbnail = reader.read_u8()?;
    let ythumbnail = reader.read_u8()?;
    let thumbnail = reader.read_bytes(usize::from(xthumbnail) * usize::from(ythumbnail) * 3)?;
    let remaining = reader.drain()?;
    if remaining != 0 {
        log::warn!(
            "APP0 segment has a length of {} bytes, but {remaining} remain after the JFIF header",
            data.len() + 2,
        );
    }
    Ok(Some(Jfif {
        major_version,
        minor_version,
        unit,
        xdensity,
        ydensity,
        xthumbnail,
        ythumbnail,
        thumbnail,
    }))
}
