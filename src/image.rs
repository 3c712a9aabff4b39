//! Assembly of decoded data units into per-component sample planes.

use std::fmt;

use crate::error::{Error, Result};
use crate::header::{padding, FrameHeader};
use crate::scan::SampleBlock;

/// How the data units of a component are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockLayout {
    /// Coded in an interleaved scan: MCUs of `h * v` data units each, in raster order with
    /// `mcus_per_line` MCUs per row. Within an MCU, data units are in raster order too.
    Interleaved {
        h: usize,
        v: usize,
        mcus_per_line: usize,
    },
    /// Coded alone in a scan: data units in raster order, `blocks_per_line` per row.
    Raster { blocks_per_line: usize },
}

impl BlockLayout {
    /// Returns the position of the top left sample of data unit `index`.
    pub fn block_origin(&self, index: usize) -> (usize, usize) {
        match *self {
            BlockLayout::Interleaved {
                h,
                v,
                mcus_per_line,
            } => {
                let (mcu, unit) = (index / (h * v), index % (h * v));
                let mcu_x = (mcu % mcus_per_line) * 8 * h;
                let mcu_y = (mcu / mcus_per_line) * 8 * v;
                (mcu_x + (unit % h) * 8, mcu_y + (unit / h) * 8)
            }
            BlockLayout::Raster { blocks_per_line } => {
                ((index % blocks_per_line) * 8, (index / blocks_per_line) * 8)
            }
        }
    }
}

/// The decoded data units of one frame component.
pub struct ComponentBlocks {
    id: u8,
    layout: BlockLayout,
    blocks: Vec<SampleBlock>,
}

impl ComponentBlocks {
    pub(crate) fn new(id: u8, layout: BlockLayout, blocks: Vec<SampleBlock>) -> Self {
        Self { id, layout, blocks }
    }

    /// Returns the identifier of the frame component.
    #[inline]
    pub fn id(&self) -> u8 {
        self.id
    }

    #[inline]
    pub fn layout(&self) -> BlockLayout {
        self.layout
    }

    /// Returns the data units in the order they were decoded.
    #[inline]
    pub fn blocks(&self) -> &[SampleBlock] {
        &self.blocks
    }
}

impl fmt::Debug for ComponentBlocks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentBlocks")
            .field("id", &self.id)
            .field("layout", &self.layout)
            .field("blocks", &self.blocks.len())
            .finish()
    }
}

/// Decoded data units of every component coded so far, keyed by component identifier.
#[derive(Debug, Default)]
pub struct BlockMap {
    components: Vec<ComponentBlocks>,
}

impl BlockMap {
    pub fn get(&self, id: u8) -> Option<&ComponentBlocks> {
        self.components.iter().find(|c| c.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ComponentBlocks> {
        self.components.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Adds the blocks of a component. Every component may only be coded once per frame.
    pub(crate) fn insert(&mut self, blocks: ComponentBlocks) -> Result<()> {
        if self.get(blocks.id).is_some() {
            return Err(Error::header(format!(
                "component {} is coded in more than one scan",
                blocks.id
            )));
        }
        self.components.push(blocks);
        Ok(())
    }
}

/// The samples of one component.
///
/// The plane is stored at its padded size (whole MCUs), of which the top left
/// [`Plane::width`] x [`Plane::height`] samples are part of the image.
pub struct Plane {
    id: u8,
    h: u8,
    v: u8,
    width: usize,
    height: usize,
    padded_width: usize,
    padded_height: usize,
    samples: Vec<u16>,
}

impl Plane {
    #[inline]
    pub fn id(&self) -> u8 {
        self.id
    }

    /// Returns the horizontal and vertical sampling factors of the component.
    #[inline]
    pub fn sampling_factors(&self) -> (u8, u8) {
        (self.h, self.v)
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn padded_width(&self) -> usize {
        self.padded_width
    }

    #[inline]
    pub fn padded_height(&self) -> usize {
        self.padded_height
    }

    /// Returns all samples of the padded plane, row-major.
    #[inline]
    pub fn padded_samples(&self) -> &[u16] {
        &self.samples
    }

    /// Returns row `y` of the image, cropped to [`Plane::width`].
    pub fn row(&self, y: usize) -> &[u16] {
        let start = y * self.padded_width;
        &self.samples[start..start + self.width]
    }

    #[inline]
    pub fn sample(&self, x: usize, y: usize) -> u16 {
        self.row(y)[x]
    }

    /// Returns the cropped plane, row-major.
    pub fn cropped(&self) -> Vec<u16> {
        (0..self.height).flat_map(|y| self.row(y)).copied().collect()
    }
}

impl fmt::Debug for Plane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plane")
            .field("id", &self.id)
            .field("sampling_factors", &(self.h, self.v))
            .field("size", &(self.width, self.height))
            .field("padded_size", &(self.padded_width, self.padded_height))
            .finish()
    }
}

/// A decoded image: one plane per frame component, in frame order.
#[derive(Debug)]
pub struct Image {
    width: u16,
    height: u16,
    precision: u8,
    planes: Vec<Plane>,
}

impl Image {
    #[inline]
    pub fn width(&self) -> u16 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u16 {
        self.height
    }

    /// Returns the sample precision in bits.
    #[inline]
    pub fn precision(&self) -> u8 {
        self.precision
    }

    #[inline]
    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    pub fn plane(&self, id: u8) -> Option<&Plane> {
        self.planes.iter().find(|p| p.id == id)
    }
}

/// Returns the padded size of a component's plane.
pub(crate) fn padded_size(frame: &FrameHeader, h: u8, v: u8) -> (usize, usize) {
    let (hmax, vmax) = (usize::from(frame.Hmax()), usize::from(frame.Vmax()));
    let width = padding(8 * hmax, usize::from(frame.X())) * usize::from(h) / hmax;
    let height = padding(8 * vmax, usize::from(frame.Y())) * usize::from(v) / vmax;
    (width, height)
}

/// Lays out the decoded blocks of every frame component into planes.
///
/// Components that were not coded in any scan produce a plane of zeroes. Samples of data units
/// that lie outside the padded plane are dropped.
pub fn assemble(frame: &FrameHeader, blocks: &BlockMap) -> Image {
    let planes = frame
        .components()
        .iter()
        .map(|fc| {
            let (padded_width, padded_height) = padded_size(frame, fc.Hi(), fc.Vi());
            let (width, height) = frame.component_dimensions(fc);
            let mut samples = vec![0; padded_width * padded_height];

            match blocks.get(fc.Ci()) {
                Some(component) => {
                    for (index, block) in component.blocks.iter().enumerate() {
                        let (x0, y0) = component.layout.block_origin(index);
                        for (by, row) in block.chunks_exact(8).enumerate() {
                            let y = y0 + by;
                            if y >= padded_height || x0 >= padded_width {
                                break;
                            }
                            let len = 8.min(padded_width - x0);
                            let start = y * padded_width + x0;
                            samples[start..start + len].copy_from_slice(&row[..len]);
                        }
                    }
                }
                None => log::warn!("component {} was not coded in any scan", fc.Ci()),
            }

            Plane {
                id: fc.Ci(),
                h: fc.Hi(),
                v: fc.Vi(),
                width,
                height,
                padded_width,
                padded_height,
                samples,
            }
        })
        .collect();

    Image {
        width: frame.X(),
        height: frame.Y(),
        precision: frame.P(),
        planes,
    }
}
