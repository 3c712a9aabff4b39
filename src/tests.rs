use anyhow::{bail, ensure, Context};
use jpeg_encoder::{ColorType, Encoder, SamplingFactor};

use crate::{decode, Decoder, DecoderOptions, ErrorKind, Image, Marker};

const ABS_TOLERANCE: u16 = 3;

fn segment(out: &mut Vec<u8>, marker: Marker, payload: &[u8]) {
    out.extend([0xFF, marker.0]);
    out.extend(u16::try_from(payload.len() + 2).unwrap().to_be_bytes());
    out.extend(payload);
}

/// Tables of a tiny 8-bit grayscale stream: quantization by 1, DC codes `00`, `01` and `10` for
/// categories 0, 6 and 7, AC codes `0` for EOB, `10` for ZRL and `11` for `0xF1`.
fn tables(out: &mut Vec<u8>) {
    let mut dqt = vec![0x00];
    dqt.extend([1; 64]);
    segment(out, Marker::DQT, &dqt);

    let mut dht = vec![0x00, 0, 3];
    dht.extend([0; 14]);
    dht.extend([0, 6, 7]);
    dht.push(0x10);
    dht.extend([1, 2]);
    dht.extend([0; 14]);
    dht.extend([0x00, 0xF0, 0xF1]);
    segment(out, Marker::DHT, &dht);
}

fn frame(out: &mut Vec<u8>, marker: Marker, width: u16, height: u16) {
    let mut sof = vec![8];
    sof.extend(height.to_be_bytes());
    sof.extend(width.to_be_bytes());
    sof.extend([1, 1, 0x11, 0]);
    segment(out, marker, &sof);
}

/// Builds a grayscale JPEG with a single scan containing `data`.
fn gray(width: u16, height: u16, interval: Option<u16>, data: &[u8]) -> Vec<u8> {
    let mut out = vec![0xFF, 0xD8];
    tables(&mut out);
    if let Some(ri) = interval {
        segment(&mut out, Marker::DRI, &ri.to_be_bytes());
    }
    frame(&mut out, Marker::SOF0, width, height);
    segment(&mut out, Marker::SOS, &[1, 1, 0x00, 0, 63, 0]);
    out.extend(data);
    out.extend([0xFF, 0xD9]);
    out
}

/// DC 84, then EOB. Decodes to a flat block of 138.
const MCU_84: [u8; 2] = [0xAA, 0x3F];

fn flat(image: &Image, values: &[u16]) -> anyhow::Result<()> {
    let plane = &image.planes()[0];
    for y in 0..plane.height() {
        for (x, &sample) in plane.row(y).iter().enumerate() {
            let expected = values[x / 8];
            ensure!(
                sample == expected,
                "sample at {x},{y} is {sample}, expected {expected}"
            );
        }
    }
    Ok(())
}

#[test]
fn grayscale_blocks() {
    let image = decode(&gray(16, 8, None, &[0xAA, 0x1A, 0x1F])).unwrap();
    assert_eq!((image.width(), image.height()), (16, 8));
    assert_eq!(image.precision(), 8);
    assert_eq!(image.planes().len(), 1);
    flat(&image, &[138, 143]).unwrap();
}

#[test]
fn cropped_to_frame_size() {
    let image = decode(&gray(5, 3, None, &MCU_84)).unwrap();
    let plane = image.plane(1).unwrap();
    assert_eq!((plane.width(), plane.height()), (5, 3));
    assert_eq!((plane.padded_width(), plane.padded_height()), (8, 8));
    assert_eq!(plane.cropped(), vec![138; 15]);
}

#[test]
fn restart_resets_prediction() {
    let mut data = MCU_84.to_vec();
    data.extend([0xFF, 0xD0]);
    data.extend(MCU_84);
    let image = decode(&gray(16, 8, Some(1), &data)).unwrap();
    flat(&image, &[138, 138]).unwrap();
}

#[test]
fn restart_out_of_sequence() {
    let mut data = MCU_84.to_vec();
    data.extend([0xFF, 0xD1]);
    data.extend(MCU_84);
    let err = decode(&gray(16, 8, Some(1), &data)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RestartSequence);
    assert_eq!(err.marker(), Some(Marker::rst(1)));
}

#[test]
fn truncated_scan_leaves_blocks_empty() {
    let image = decode(&gray(16, 8, None, &MCU_84)).unwrap();
    flat(&image, &[138, 0]).unwrap();
}

#[test]
fn trailing_data() {
    let mut jpeg = gray(8, 8, None, &MCU_84);
    jpeg.extend([0x00, 0x12, 0x34]);
    decode(&jpeg).unwrap();

    let options = DecoderOptions::default().strict_trailing_data(true);
    let err = Decoder::with_options(&jpeg[..], options)
        .decode()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidHeader);
    assert!(err.to_string().starts_with("3 trailing bytes"), "{err}");
}

#[test]
fn missing_soi() {
    let err = decode(&[0xFF, 0xD9]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnexpectedMarker);
    assert_eq!(err.marker(), Some(Marker::EOI));

    let err = decode(&[0x47, 0x49, 0x46]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnexpectedByte);
    assert_eq!(err.offset(), Some(0));

    let err = decode(&[]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StreamExhausted);
}

#[test]
fn truncated_stream() {
    let jpeg = gray(8, 8, None, &MCU_84);
    let err = decode(&jpeg[..jpeg.len() - 4]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StreamExhausted);
}

#[test]
fn unsupported_processes() {
    for (marker, what) in [
        (Marker::SOF2, "progressive DCT"),
        (Marker::SOF3, "lossless"),
        (Marker::SOF5, "hierarchical"),
        (Marker::SOF9, "arithmetic coding"),
    ] {
        let mut jpeg = vec![0xFF, 0xD8];
        tables(&mut jpeg);
        frame(&mut jpeg, marker, 8, 8);
        let err = decode(&jpeg).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFeature, "{marker:?}");
        assert!(err.to_string().contains(what), "{err}");
    }

    let mut jpeg = vec![0xFF, 0xD8];
    segment(&mut jpeg, Marker::DAC, &[0x00, 0x10]);
    let err = decode(&jpeg).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedFeature);
}

#[test]
fn progressive_scan_is_unsupported() {
    let mut jpeg = vec![0xFF, 0xD8];
    tables(&mut jpeg);
    frame(&mut jpeg, Marker::SOF1, 8, 8);
    segment(&mut jpeg, Marker::SOS, &[1, 1, 0x00, 1, 5, 0]);
    let err = decode(&jpeg).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedFeature);
}

#[test]
fn baseline_precision() {
    let mut jpeg = vec![0xFF, 0xD8];
    tables(&mut jpeg);
    segment(&mut jpeg, Marker::SOF0, &[12, 0, 8, 0, 8, 1, 1, 0x11, 0]);
    let err = decode(&jpeg).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedSegment);
    assert_eq!(err.marker(), Some(Marker::SOF0));
}

#[test]
fn frame_without_scans() {
    let mut jpeg = vec![0xFF, 0xD8];
    tables(&mut jpeg);
    frame(&mut jpeg, Marker::SOF0, 8, 8);
    jpeg.extend([0xFF, 0xD9]);
    let err = decode(&jpeg).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidHeader);
}

#[test]
fn second_frame_is_rejected() {
    let mut jpeg = gray(8, 8, None, &MCU_84);
    let eoi = jpeg.len() - 2;
    let mut sof = Vec::new();
    frame(&mut sof, Marker::SOF0, 8, 8);
    jpeg.splice(eoi..eoi, sof);
    let err = decode(&jpeg).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnexpectedMarker);
    assert_eq!(err.marker(), Some(Marker::SOF0));
}

#[test]
fn missing_huffman_table() {
    let mut jpeg = gray(8, 8, None, &MCU_84);
    // Point the scan at AC table 1.
    let sos = jpeg
        .windows(2)
        .position(|w| w == [0xFF, 0xDA])
        .unwrap();
    jpeg[sos + 6] = 0x01;
    let err = decode(&jpeg).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidHeader);
    assert_eq!(
        err.to_string(),
        "component 1 uses AC table 1, which is not defined"
    );
}

#[test]
fn height_from_dnl() {
    let mut data = vec![0xAA, 0x1A, 0x1F];
    data.extend([0xFF, 0xDC, 0x00, 0x04, 0x00, 0x08]);
    let image = decode(&gray(16, 0, None, &data)).unwrap();
    assert_eq!((image.width(), image.height()), (16, 8));
    flat(&image, &[138, 143]).unwrap();
}

#[test]
fn missing_dnl() {
    let err = decode(&gray(16, 0, None, &[0xAA, 0x1A, 0x1F])).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidHeader);
}

#[test]
fn pixel_limit() {
    let jpeg = gray(16, 8, None, &[0xAA, 0x1A, 0x1F]);
    let options = DecoderOptions::default().pixel_limit(Some(128));
    Decoder::with_options(&jpeg[..], options).decode().unwrap();

    let options = DecoderOptions::default().pixel_limit(Some(127));
    let err = Decoder::with_options(&jpeg[..], options)
        .decode()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LimitExceeded);
}

#[test]
fn tables_between_scans() {
    // Two non-interleaved scans of a two-component frame. The second scan's tables come from
    // segments placed between the scans and override the first ones.
    let mut jpeg = vec![0xFF, 0xD8];
    tables(&mut jpeg);
    segment(
        &mut jpeg,
        Marker::SOF0,
        &[8, 0, 8, 0, 8, 2, 1, 0x11, 0, 2, 0x11, 0],
    );
    segment(&mut jpeg, Marker::SOS, &[1, 1, 0x00, 0, 63, 0]);
    jpeg.extend(MCU_84);

    let mut dqt = vec![0x00];
    dqt.extend([2; 64]);
    segment(&mut jpeg, Marker::DQT, &dqt);
    segment(&mut jpeg, Marker::COM, b"second scan");
    segment(&mut jpeg, Marker::SOS, &[1, 2, 0x00, 0, 63, 0]);
    jpeg.extend(MCU_84);
    jpeg.extend([0xFF, 0xD9]);

    let frame = Decoder::new(&jpeg[..]).decode_blocks().unwrap();
    assert_eq!(frame.blocks().len(), 2);
    assert_eq!(frame.tables().quant(0).unwrap().values()[0], 2);
    assert_eq!(
        frame.tables().comments().collect::<Vec<_>>(),
        [&b"second scan"[..]]
    );

    let image = frame.to_image();
    assert_eq!(image.plane(1).unwrap().sample(0, 0), 138);
    // DC 168 / 8 = 21
    assert_eq!(image.plane(2).unwrap().sample(7, 7), 149);
}

#[test]
fn component_coded_twice() {
    let mut jpeg = gray(8, 8, None, &MCU_84);
    let eoi = jpeg.len() - 2;
    let mut scan = Vec::new();
    segment(&mut scan, Marker::SOS, &[1, 1, 0x00, 0, 63, 0]);
    scan.extend(MCU_84);
    jpeg.splice(eoi..eoi, scan);
    let err = decode(&jpeg).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidHeader);
}

/// A smooth test pattern, 3 bytes per pixel.
fn pattern(width: usize, height: usize) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        for x in 0..width {
            rgb.extend([
                (x * 255 / width) as u8,
                (y * 255 / height) as u8,
                ((x + y) * 255 / (width + height)) as u8,
            ]);
        }
    }
    rgb
}

fn encode(
    pixels: &[u8],
    width: u16,
    height: u16,
    color: ColorType,
    sampling: SamplingFactor,
    interval: u16,
) -> anyhow::Result<Vec<u8>> {
    let mut jpeg = Vec::new();
    let mut enc = Encoder::new(&mut jpeg, 100);
    enc.set_sampling_factor(sampling);
    enc.set_restart_interval(interval);
    enc.encode(pixels, width, height, color)?;
    Ok(jpeg)
}

fn compare(expected: &[f64], plane: &[u16], width: usize) -> anyhow::Result<()> {
    ensure!(expected.len() == plane.len());
    for (i, (&e, &actual)) in expected.iter().zip(plane).enumerate() {
        let e = e.round().clamp(0.0, 255.0) as u16;
        if e.abs_diff(actual) > ABS_TOLERANCE {
            bail!(
                "image mismatch at {},{}: expected approx {} got {}",
                i % width,
                i / width,
                e,
                actual,
            );
        }
    }
    Ok(())
}

fn check_impl(
    width: u16,
    height: u16,
    sampling: SamplingFactor,
    interval: u16,
) -> anyhow::Result<()> {
    let (w, h) = (usize::from(width), usize::from(height));
    let rgb = pattern(w, h);
    let jpeg = encode(&rgb, width, height, ColorType::Rgb, sampling, interval)?;
    let image = decode(&jpeg)?;
    ensure!((image.width(), image.height()) == (width, height));
    ensure!(image.planes().len() == 3);

    let luma = &image.planes()[0];
    ensure!(luma.width() == w && luma.height() == h);
    let (hmax, vmax) = luma.sampling_factors();
    let y = rgb
        .chunks_exact(3)
        .map(|p| 0.299 * f64::from(p[0]) + 0.587 * f64::from(p[1]) + 0.114 * f64::from(p[2]))
        .collect::<Vec<_>>();
    compare(&y, &luma.cropped(), w).context("Y")?;

    for chroma in &image.planes()[1..] {
        ensure!(chroma.sampling_factors() == (1, 1));
        let cw = w.div_ceil(usize::from(hmax));
        let ch = h.div_ceil(usize::from(vmax));
        ensure!(
            (chroma.width(), chroma.height()) == (cw, ch),
            "chroma plane is {}x{}, expected {cw}x{ch}",
            chroma.width(),
            chroma.height(),
        );
    }

    if (hmax, vmax) == (1, 1) {
        let (cb, cr): (Vec<_>, Vec<_>) = rgb
            .chunks_exact(3)
            .map(|p| {
                let [r, g, b] = [p[0], p[1], p[2]].map(f64::from);
                (
                    -0.168736 * r - 0.331264 * g + 0.5 * b + 128.0,
                    0.5 * r - 0.418688 * g - 0.081312 * b + 128.0,
                )
            })
            .unzip();
        compare(&cb, &image.planes()[1].cropped(), w).context("Cb")?;
        compare(&cr, &image.planes()[2].cropped(), w).context("Cr")?;
    }
    Ok(())
}

fn check(width: u16, height: u16, sampling: SamplingFactor, interval: u16) {
    check_impl(width, height, sampling, interval)
        .context(format!(
            "{width}x{height} image, restart interval {interval}"
        ))
        .unwrap();
}

#[test]
fn encoded_grayscale() {
    let _ = env_logger::builder().is_test(true).try_init();

    let (width, height) = (45u16, 21u16);
    let luma = pattern(usize::from(width), usize::from(height))
        .chunks_exact(3)
        .map(|p| p[0] / 2 + p[1] / 2)
        .collect::<Vec<_>>();
    for interval in [0, 1, 4] {
        let jpeg = encode(
            &luma,
            width,
            height,
            ColorType::Luma,
            SamplingFactor::R_4_4_4,
            interval,
        )
        .unwrap();
        let frame = Decoder::new(&jpeg[..]).decode_blocks().unwrap();
        let expected_interval = (interval != 0).then_some(interval);
        assert_eq!(
            frame.tables().restart_interval().filter(|&ri| ri != 0),
            expected_interval
        );
        assert!(frame.tables().jfif().unwrap().is_some());

        let image = frame.to_image();
        assert_eq!(image.planes().len(), 1);
        let expected = luma.iter().map(|&l| f64::from(l)).collect::<Vec<_>>();
        compare(&expected, &image.planes()[0].cropped(), usize::from(width))
            .context(format!("restart interval {interval}"))
            .unwrap();
    }
}

#[test]
fn encoded_4_4_4() {
    let _ = env_logger::builder().is_test(true).try_init();
    check(64, 8, SamplingFactor::R_4_4_4, 0);
    check(37, 23, SamplingFactor::R_4_4_4, 0);
    check(37, 23, SamplingFactor::R_4_4_4, 3);
}

#[test]
fn encoded_4_2_2() {
    let _ = env_logger::builder().is_test(true).try_init();
    check(64, 8, SamplingFactor::R_4_2_2, 0);
    check(64, 8, SamplingFactor::R_4_2_2, 1);
    check(37, 23, SamplingFactor::R_4_2_2, 2);
}

#[test]
fn encoded_4_2_0() {
    let _ = env_logger::builder().is_test(true).try_init();
    check(64, 16, SamplingFactor::R_4_2_0, 0);
    check(37, 23, SamplingFactor::R_4_2_0, 0);
    check(37, 23, SamplingFactor::R_4_2_0, 5);
}

#[test]
fn test_compare() {
    compare(&[0.0], &[0], 1).unwrap();
    compare(&[0.0], &[ABS_TOLERANCE], 1).unwrap();
    compare(&[f64::from(ABS_TOLERANCE)], &[0], 1).unwrap();
    compare(&[f64::from(ABS_TOLERANCE + 1)], &[0], 1).unwrap_err();
    compare(&[0.0], &[ABS_TOLERANCE + 1], 1).unwrap_err();
    compare(&[0.0, 0.0], &[0], 1).unwrap_err();
}
