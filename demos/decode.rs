use std::{env, fs::File, io::BufWriter, process};

use jpegdec::Decoder;

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_module(env!("CARGO_PKG_NAME"), log::LevelFilter::Debug)
        .parse_default_env()
        .init();

    let (infile, prefix) = match &*env::args().skip(1).collect::<Vec<_>>() {
        [infile, prefix] => (infile.clone(), prefix.clone()),
        _ => {
            eprintln!("usage: decode <file.jpg> <output-prefix>");
            process::exit(1);
        }
    };

    let jpeg = std::fs::read(&infile)?;
    let image = Decoder::new(&jpeg[..]).decode()?;
    log::info!(
        "{infile}: {}x{}, {} bits, {} components",
        image.width(),
        image.height(),
        image.precision(),
        image.planes().len(),
    );

    for plane in image.planes() {
        let path = format!("{prefix}-{}.png", plane.id());
        let (depth, data) = if image.precision() == 8 {
            let data = plane.cropped().iter().map(|&s| s as u8).collect::<Vec<_>>();
            (png::BitDepth::Eight, data)
        } else {
            // Scale up to the 16-bit range.
            let shift = 16 - u32::from(image.precision());
            let data = plane
                .cropped()
                .iter()
                .flat_map(|&s| (s << shift).to_be_bytes())
                .collect::<Vec<_>>();
            (png::BitDepth::Sixteen, data)
        };

        let mut enc = png::Encoder::new(
            BufWriter::new(File::create(&path)?),
            plane.width().try_into()?,
            plane.height().try_into()?,
        );
        enc.set_color(png::ColorType::Grayscale);
        enc.set_depth(depth);
        enc.write_header()?.write_image_data(&data)?;
        log::info!("wrote {path} ({plane:?})");
    }

    Ok(())
}
