//! Frame (SOF) and scan (SOS) headers, and the binding of scan components to their tables.

#![allow(non_snake_case)]

use std::fmt;
use std::io::Read;
use std::sync::Arc;

use bytemuck::{AnyBitPattern, Pod, Zeroable};

use crate::error::{Error, Result};
use crate::huffman::{HuffmanTable, TableClass};
use crate::marker::Marker;
use crate::reader::ByteStream;
use crate::tables::{MiscTables, QuantizationTable};

/// Returns the smallest multiple of `x` that is at least `i`.
pub fn padding(x: usize, i: usize) -> usize {
    i.div_ceil(x) * x
}

#[derive(Clone, Copy, Zeroable, Pod)]
#[repr(C)]
pub struct FrameComponent {
    Ci: u8,
    HiVi: u8,
    Tqi: u8,
}

impl FrameComponent {
    /// Returns this component's component identifier.
    ///
    /// The component identifier is an arbitrary 8-bit value that uniquely identifies each
    /// component. The scan header refers to components using their identifier.
    #[inline]
    pub fn Ci(&self) -> u8 {
        self.Ci
    }

    /// Returns the horizontal sampling factor for this component.
    ///
    /// This number also specifies the number of "horizontal data units" encoded in each MCU.
    #[inline]
    pub fn Hi(&self) -> u8 {
        self.HiVi >> 4
    }

    /// Returns the vertical sampling factor for this component.
    #[inline]
    pub fn Vi(&self) -> u8 {
        self.HiVi & 0xf
    }

    /// Returns the index of the quantization table to use for this component (0-3).
    #[inline]
    pub fn Tqi(&self) -> u8 {
        self.Tqi
    }
}

impl fmt::Debug for FrameComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameComponent")
            .field("Ci", &self.Ci)
            .field("Hi", &self.Hi())
            .field("Vi", &self.Vi())
            .field("Tqi", &self.Tqi)
            .finish()
    }
}

/// A parsed SOF segment.
#[derive(Debug, Clone)]
pub struct FrameHeader {
    marker: Marker,
    /// Sample precision in bits.
    P: u8,
    Y: u16,
    X: u16,
    components: Vec<FrameComponent>,
    Hmax: u8,
    Vmax: u8,
}

impl FrameHeader {
    /// Returns the SOF marker that introduced this frame.
    #[inline]
    pub fn marker(&self) -> Marker {
        self.marker
    }

    /// Returns the sample precision in bits.
    #[inline]
    pub fn P(&self) -> u8 {
        self.P
    }

    /// Returns the number of lines in the image (the height of the frame).
    ///
    /// This is 0 if the height is defined by a DNL segment that has not been read yet.
    #[inline]
    pub fn Y(&self) -> u16 {
        self.Y
    }

    /// Returns the number of samples per line (the width of the frame).
    #[inline]
    pub fn X(&self) -> u16 {
        self.X
    }

    #[inline]
    pub fn components(&self) -> &[FrameComponent] {
        &self.components
    }

    #[inline]
    pub fn Hmax(&self) -> u8 {
        self.Hmax
    }

    #[inline]
    pub fn Vmax(&self) -> u8 {
        self.Vmax
    }

    pub fn component(&self, id: u8) -> Option<&FrameComponent> {
        self.components.iter().find(|c| c.Ci == id)
    }

    /// Returns the width and height of `component` in samples, before any padding.
    pub fn component_dimensions(&self, component: &FrameComponent) -> (usize, usize) {
        let width = (usize::from(self.X) * usize::from(component.Hi()))
            .div_ceil(usize::from(self.Hmax));
        let height = (usize::from(self.Y) * usize::from(component.Vi()))
            .div_ceil(usize::from(self.Vmax));
        (width, height)
    }

    /// Returns the number of MCUs in each row of an interleaved scan.
    pub fn mcus_per_line(&self) -> usize {
        usize::from(self.X).div_ceil(8 * usize::from(self.Hmax))
    }

    /// Returns the number of MCU rows of an interleaved scan.
    pub fn mcu_rows(&self) -> usize {
        usize::from(self.Y).div_ceil(8 * usize::from(self.Vmax))
    }

    /// Sets the number of lines, as defined by a DNL segment.
    pub(crate) fn set_lines(&mut self, lines: u16) {
        self.Y = lines;
    }
}

/// Reads the frame header following `marker`, which must be a SOF marker.
pub(crate) fn read_frame_header<R: Read>(
    stream: &mut ByteStream<R>,
    marker: Marker,
    offset: u64,
) -> Result<FrameHeader> {
    if !marker.is_frame() {
        return Err(Error::header(format!(
            "expected a frame header, found {marker:?}"
        )));
    }

    let len = stream.read_length(marker)?;
    let P = stream.read_u8()?;
    let Y = stream.read_u16()?;
    let X = stream.read_u16()?;
    let num_components = stream.read_u8()?;
    let expected_len = 6 + 3 * u16::from(num_components);
    if len != expected_len {
        return Err(Error::malformed(
            marker,
            offset,
            format!("length is {len}, but {num_components} components need {expected_len}"),
        ));
    }
    if num_components == 0 {
        return Err(Error::malformed(marker, offset, "frame has no components"));
    }
    if X == 0 {
        return Err(Error::malformed(marker, offset, "frame has a width of 0"));
    }

    let components = stream.read_objs::<FrameComponent>(num_components.into())?;
    for (i, c) in components.iter().enumerate() {
        if !(1..=4).contains(&c.Hi()) || !(1..=4).contains(&c.Vi()) {
            return Err(Error::malformed(
                marker,
                offset,
                format!("invalid sampling factors for component {}: {c:?}", c.Ci),
            ));
        }
        if c.Tqi > 3 {
            return Err(Error::malformed(
                marker,
                offset,
                format!("invalid quantization table Tq={} for component {}", c.Tqi, c.Ci),
            ));
        }
        if components[..i].iter().any(|other| other.Ci == c.Ci) {
            return Err(Error::malformed(
                marker,
                offset,
                format!("duplicate component identifier {}", c.Ci),
            ));
        }
    }

    let Hmax = components.iter().map(|c| c.Hi()).max().unwrap_or(1);
    let Vmax = components.iter().map(|c| c.Vi()).max().unwrap_or(1);
    let frame = FrameHeader {
        marker,
        P,
        Y,
        X,
        components,
        Hmax,
        Vmax,
    };
    log::debug!("{marker:?} at offset {offset}: {X}x{Y}, P={P}, {num_components} components");
    Ok(frame)
}

#[derive(Clone, Copy, AnyBitPattern)]
#[repr(C)]
pub struct ScanComponent {
    Csj: u8,
    TdjTaj: u8,
}

impl ScanComponent {
    /// Returns the scan component selector.
    ///
    /// This matches the [`FrameComponent::Ci`] of the frame component coded in this scan.
    #[inline]
    pub fn Csj(&self) -> u8 {
        self.Csj
    }

    /// Returns the DC entropy coding table destination selector.
    #[inline]
    pub fn Tdj(&self) -> u8 {
        self.TdjTaj >> 4
    }

    /// Returns the AC entropy coding table destination selector.
    #[inline]
    pub fn Taj(&self) -> u8 {
        self.TdjTaj & 0xf
    }
}

impl fmt::Debug for ScanComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanComponent")
            .field("Csj", &self.Csj)
            .field("Tdj", &self.Tdj())
            .field("Taj", &self.Taj())
            .finish()
    }
}

/// A parsed SOS segment.
#[derive(Debug, Clone)]
pub struct ScanHeader {
    components: Vec<ScanComponent>,
    Ss: u8,
    Se: u8,
    AhAl: u8,
}

impl ScanHeader {
    #[inline]
    pub fn components(&self) -> &[ScanComponent] {
        &self.components
    }

    #[inline]
    pub fn Ss(&self) -> u8 {
        self.Ss
    }

    #[inline]
    pub fn Se(&self) -> u8 {
        self.Se
    }

    #[inline]
    pub fn Ah(&self) -> u8 {
        self.AhAl >> 4
    }

    #[inline]
    pub fn Al(&self) -> u8 {
        self.AhAl & 0xf
    }

    /// Returns whether the spectral selection and successive approximation parameters are the
    /// fixed values of a sequential DCT scan.
    pub fn is_sequential(&self) -> bool {
        self.Ss == 0 && self.Se == 63 && self.AhAl == 0
    }
}

/// Reads the scan header following an SOS marker at `offset`.
pub(crate) fn read_scan_header<R: Read>(
    stream: &mut ByteStream<R>,
    offset: u64,
) -> Result<ScanHeader> {
    let len = stream.read_length(Marker::SOS)?;
    let num_components = stream.read_u8()?;
    let expected_len = 4 + 2 * u16::from(num_components);
    if len != expected_len {
        return Err(Error::malformed(
            Marker::SOS,
            offset,
            format!("length is {len}, but {num_components} components need {expected_len}"),
        ));
    }
    if !(1..=4).contains(&num_components) {
        return Err(Error::malformed(
            Marker::SOS,
            offset,
            format!("invalid number of scan components {num_components}"),
        ));
    }

    let components = stream.read_objs::<ScanComponent>(num_components.into())?;
    let Ss = stream.read_u8()?;
    let Se = stream.read_u8()?;
    let AhAl = stream.read_u8()?;
    let scan = ScanHeader {
        components,
        Ss,
        Se,
        AhAl,
    };
    log::debug!("SOS at offset {offset}: {:?}", scan.components);
    Ok(scan)
}

/// Everything needed to decode the data units of one component in a scan.
pub(crate) struct ComponentBinding {
    pub id: u8,
    pub h: usize,
    pub v: usize,
    pub width: usize,
    pub height: usize,
    pub units_per_mcu: usize,
    pub quant: Arc<QuantizationTable>,
    pub dc: Arc<HuffmanTable>,
    pub ac: Arc<HuffmanTable>,
}

impl fmt::Debug for ComponentBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentBinding")
            .field("id", &self.id)
            .field("h", &self.h)
            .field("v", &self.v)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("units_per_mcu", &self.units_per_mcu)
            .field("quant", &self.quant.target())
            .field("dc", &self.dc.target())
            .field("ac", &self.ac.target())
            .finish()
    }
}

/// The resolved layout of a scan.
#[derive(Debug)]
pub(crate) struct ScanPlan {
    pub components: Vec<ComponentBinding>,
    /// Number of MCUs in the scan, or `None` if the frame height is still unknown (pending DNL).
    pub mcu_count: Option<usize>,
    pub mcus_per_line: usize,
}

impl ScanPlan {
    /// Returns whether the scan codes more than one component, with MCUs of several data units.
    pub fn is_interleaved(&self) -> bool {
        self.components.len() > 1
    }
}

/// Resolves the components of `scan` against `frame` and the tables in `tables`.
pub(crate) fn bind_components(
    frame: &FrameHeader,
    tables: &MiscTables,
    scan: &ScanHeader,
) -> Result<ScanPlan> {
    let mut components = Vec::with_capacity(scan.components.len());
    for sc in &scan.components {
        let Some(fc) = frame.component(sc.Csj) else {
            return Err(Error::header(format!(
                "scan references component {}, which is not part of the frame",
                sc.Csj
            )));
        };
        let Some(quant) = tables.quant(fc.Tqi) else {
            return Err(Error::header(format!(
                "component {} uses quantization table {}, which is not defined",
                fc.Ci, fc.Tqi
            )));
        };
        let Some(dc) = tables.huffman(TableClass::Dc, sc.Tdj()) else {
            return Err(Error::header(format!(
                "component {} uses DC table {}, which is not defined",
                fc.Ci,
                sc.Tdj()
            )));
        };
        let Some(ac) = tables.huffman(TableClass::Ac, sc.Taj()) else {
            return Err(Error::header(format!(
                "component {} uses AC table {}, which is not defined",
                fc.Ci,
                sc.Taj()
            )));
        };

        let (width, height) = frame.component_dimensions(fc);
        let (h, v) = (usize::from(fc.Hi()), usize::from(fc.Vi()));
        components.push(ComponentBinding {
            id: fc.Ci,
            h,
            v,
            width,
            height,
            units_per_mcu: h * v,
            quant: quant.clone(),
            dc: dc.clone(),
            ac: ac.clone(),
        });
    }

    let lines_known = frame.Y != 0;
    if let [single] = &mut components[..] {
        // Non-interleaved: every MCU is a single data unit, in raster order over the component.
        single.units_per_mcu = 1;
        let mcus_per_line = single.width.div_ceil(8);
        let mcu_count = lines_known.then(|| mcus_per_line * single.height.div_ceil(8));
        return Ok(ScanPlan {
            components,
            mcu_count,
            mcus_per_line,
        });
    }

    // Interleaved: the MCU grid covers the whole frame, in units of 8*Hmax x 8*Vmax samples.
    let mcus_per_line = frame.mcus_per_line();
    let rows = frame.mcu_rows();

    Ok(ScanPlan {
        components,
        mcu_count: lines_known.then_some(mcus_per_line * rows),
        mcus_per_line,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn frame(bytes: &[u8]) -> Result<FrameHeader> {
        let mut stream = ByteStream::new(bytes);
        let marker = stream.read_marker()?;
        read_frame_header(&mut stream, marker, 0)
    }

    fn scan(bytes: &[u8]) -> Result<ScanHeader> {
        let mut stream = ByteStream::new(bytes);
        stream.read_marker()?;
        read_scan_header(&mut stream, 0)
    }

    fn check_frame(bytes: &[u8], expect: expect_test::Expect) {
        let out = match frame(bytes) {
            Ok(f) => format!("{f:?}"),
            Err(e) => format!("error: {e}"),
        };
        expect.assert_eq(&out);
    }

    // 4:2:0 YCbCr, 35x17.
    const SOF_420: [u8; 19] = [
        0xFF, 0xC0, 0x00, 0x11, 0x08, 0x00, 0x11, 0x00, 0x23, 0x03, // SOF0
        0x01, 0x22, 0x00, // Y
        0x02, 0x11, 0x01, // Cb
        0x03, 0x11, 0x01, // Cr
    ];

    #[test]
    fn padding_to_multiple() {
        assert_eq!(padding(8, 8), 8);
        assert_eq!(padding(8, 5), 8);
        assert_eq!(padding(8, 9), 16);
        assert_eq!(padding(16, 0), 0);
    }

    #[test]
    fn frame_header() {
        check_frame(
            &SOF_420,
            expect_test::expect![[r#"FrameHeader { marker: SOF0, P: 8, Y: 17, X: 35, components: [FrameComponent { Ci: 1, Hi: 2, Vi: 2, Tqi: 0 }, FrameComponent { Ci: 2, Hi: 1, Vi: 1, Tqi: 1 }, FrameComponent { Ci: 3, Hi: 1, Vi: 1, Tqi: 1 }], Hmax: 2, Vmax: 2 }"#]],
        );

        let frame = frame(&SOF_420).unwrap();
        assert_eq!(frame.component_dimensions(&frame.components()[0]), (35, 17));
        assert_eq!(frame.component_dimensions(&frame.components()[1]), (18, 9));
        assert_eq!(frame.mcus_per_line(), 3);
        assert_eq!(frame.mcu_rows(), 2);
    }

    #[test]
    fn invalid_frame_headers() {
        check_frame(
            &[0xFF, 0xC0, 0x00, 0x0B, 0x08, 0x00, 0x08, 0x00, 0x08, 0x02, 0x01, 0x11, 0x00],
            expect_test::expect![[r#"error: malformed SOF0 segment at offset 0: length is 9, but 2 components need 12"#]],
        );
        check_frame(
            &[0xFF, 0xC0, 0x00, 0x0B, 0x08, 0x00, 0x08, 0x00, 0x00, 0x01, 0x01, 0x11, 0x00],
            expect_test::expect![[r#"error: malformed SOF0 segment at offset 0: frame has a width of 0"#]],
        );
        check_frame(
            &[0xFF, 0xC0, 0x00, 0x0B, 0x08, 0x00, 0x08, 0x00, 0x08, 0x01, 0x01, 0x51, 0x00],
            expect_test::expect![[r#"error: malformed SOF0 segment at offset 0: invalid sampling factors for component 1: FrameComponent { Ci: 1, Hi: 5, Vi: 1, Tqi: 0 }"#]],
        );
        check_frame(
            &[
                0xFF, 0xC0, 0x00, 0x0E, 0x08, 0x00, 0x08, 0x00, 0x08, 0x02, // SOF0
                0x01, 0x11, 0x00, //
                0x01, 0x11, 0x00,
            ],
            expect_test::expect![[r#"error: malformed SOF0 segment at offset 0: duplicate component identifier 1"#]],
        );
        check_frame(
            &[0xFF, 0xC4, 0x00, 0x02],
            expect_test::expect![[r#"error: expected a frame header, found DHT"#]],
        );
    }

    #[test]
    fn scan_header() {
        let header = scan(&[
            0xFF, 0xDA, 0x00, 0x0A, 0x02, // SOS
            0x01, 0x00, // Y
            0x02, 0x11, // Cb
            0x00, 0x3F, 0x00,
        ])
        .unwrap();
        expect_test::expect![[r#"
            ScanHeader {
                components: [
                    ScanComponent {
                        Csj: 1,
                        Tdj: 0,
                        Taj: 0,
                    },
                    ScanComponent {
                        Csj: 2,
                        Tdj: 1,
                        Taj: 1,
                    },
                ],
                Ss: 0,
                Se: 63,
                AhAl: 0,
            }
        "#]]
        .assert_debug_eq(&header);
        assert!(header.is_sequential());

        let err = scan(&[0xFF, 0xDA, 0x00, 0x08, 0x00]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedSegment);
    }

    fn tables() -> MiscTables {
        let mut bits = [0; 16];
        bits[0] = 1;
        let mut tables = MiscTables::default();
        for class in [TableClass::Dc, TableClass::Ac] {
            for target in 0..2 {
                tables.set_huffman(HuffmanTable::build(class, target, &bits, &[0]).unwrap());
            }
        }
        tables.set_quant(QuantizationTable::new(8, 0, [1; 64]));
        tables.set_quant(QuantizationTable::new(8, 1, [2; 64]));
        tables
    }

    fn sos(selectors: &[(u8, u8)]) -> ScanHeader {
        ScanHeader {
            components: selectors
                .iter()
                .map(|&(Csj, TdjTaj)| ScanComponent { Csj, TdjTaj })
                .collect(),
            Ss: 0,
            Se: 63,
            AhAl: 0,
        }
    }

    #[test]
    fn bind_interleaved() {
        let frame = frame(&SOF_420).unwrap();
        let plan = bind_components(&frame, &tables(), &sos(&[(1, 0x00), (2, 0x11), (3, 0x11)]))
            .unwrap();
        assert!(plan.is_interleaved());
        assert_eq!(plan.mcu_count, Some(6));
        assert_eq!(plan.mcus_per_line, 3);
        let units: Vec<_> = plan.components.iter().map(|c| c.units_per_mcu).collect();
        assert_eq!(units, [4, 1, 1]);
        assert_eq!(plan.components[1].quant.values()[0], 2);
        assert_eq!(plan.components[2].dc.target(), 1);
    }

    #[test]
    fn bind_interleaved_subset() {
        // Only the chroma components, which have 1x1 sampling. The MCU grid still follows the
        // frame's maximum sampling factors.
        let frame = frame(&SOF_420).unwrap();
        let plan = bind_components(&frame, &tables(), &sos(&[(2, 0x11), (3, 0x11)])).unwrap();
        assert!(plan.is_interleaved());
        assert_eq!(plan.mcus_per_line, frame.mcus_per_line());
        assert_eq!(plan.mcu_count, Some(frame.mcus_per_line() * frame.mcu_rows()));
        assert_eq!(plan.mcu_count, Some(6));
        let units: Vec<_> = plan.components.iter().map(|c| c.units_per_mcu).collect();
        assert_eq!(units, [1, 1]);
    }

    #[test]
    fn bind_non_interleaved() {
        let frame = frame(&SOF_420).unwrap();
        let luma = bind_components(&frame, &tables(), &sos(&[(1, 0x00)])).unwrap();
        assert!(!luma.is_interleaved());
        assert_eq!(luma.components[0].units_per_mcu, 1);
        // 35x17 samples: 5 blocks across, 3 down.
        assert_eq!(luma.mcu_count, Some(15));

        let chroma = bind_components(&frame, &tables(), &sos(&[(3, 0x11)])).unwrap();
        // 18x9 samples.
        assert_eq!(chroma.mcus_per_line, 3);
        assert_eq!(chroma.mcu_count, Some(6));
    }

    #[test]
    fn bind_pending_dnl() {
        let mut frame = frame(&SOF_420).unwrap();
        frame.set_lines(0);
        let plan = bind_components(&frame, &tables(), &sos(&[(1, 0x00), (2, 0x11)])).unwrap();
        assert_eq!(plan.mcu_count, None);
        assert_eq!(plan.mcus_per_line, 3);
    }

    #[test]
    fn bind_errors() {
        let frame = frame(&SOF_420).unwrap();
        let err = bind_components(&frame, &tables(), &sos(&[(9, 0x00)])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidHeader);
        assert_eq!(
            err.to_string(),
            "scan references component 9, which is not part of the frame"
        );

        let err = bind_components(&frame, &tables(), &sos(&[(1, 0x03)])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "component 1 uses AC table 3, which is not defined"
        );

        let err = bind_components(&frame, &MiscTables::default(), &sos(&[(1, 0x00)])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "component 1 uses quantization table 0, which is not defined"
        );
    }
}
