//! Prints the segment structure and decoded headers of a JPEG file.

use std::{env, fs, process};

use jpegdec::{ByteStream, Decoder, ErrorKind, Marker, TableClass};

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_module(env!("CARGO_PKG_NAME"), log::LevelFilter::Warn)
        .parse_default_env()
        .init();

    let jpeg = match &*env::args().skip(1).collect::<Vec<_>>() {
        [path] => fs::read(path)?,
        _ => {
            eprintln!("usage: dump <file.jpg>");
            process::exit(1);
        }
    };

    dump_segments(&jpeg)?;
    println!();

    let frame = Decoder::new(&jpeg[..]).decode_blocks()?;
    println!("{:?}", frame.header());
    println!("{:?}", frame.tables());
    if let Some(jfif) = frame.tables().jfif()? {
        println!("{jfif:?}");
    }
    for class in [TableClass::Dc, TableClass::Ac] {
        for target in 0..4 {
            if let Some(table) = frame.tables().huffman(class, target) {
                println!("{table:?}");
            }
        }
    }
    for target in 0..4 {
        if let Some(table) = frame.tables().quant(target) {
            println!("{table:?}");
        }
    }
    for component in frame.blocks().iter() {
        println!(
            "component {}: {} data units, {:?}",
            component.id(),
            component.blocks().len(),
            component.layout(),
        );
    }

    Ok(())
}

fn dump_segments(jpeg: &[u8]) -> anyhow::Result<()> {
    let mut stream = ByteStream::new(jpeg);
    let mut entropy_bytes = 0;
    loop {
        let offset = stream.position();
        let marker = match stream.read_marker() {
            Ok(marker) => marker,
            Err(e) if e.kind() == ErrorKind::UnexpectedByte => {
                entropy_bytes += 1;
                continue;
            }
            Err(e) if e.kind() == ErrorKind::StreamExhausted => break,
            Err(e) => return Err(e.into()),
        };
        if entropy_bytes != 0 {
            println!("     {entropy_bytes} bytes of entropy-coded data");
            entropy_bytes = 0;
        }

        print!("{offset:04X} [FF {:02X}] {marker:?}", marker.0);
        let standalone = marker == Marker::SOI
            || marker == Marker::EOI
            || marker == Marker::TEM
            || marker.rst_index().is_some();
        if standalone {
            println!();
        } else {
            let len = stream.read_u16()?;
            println!(" ({len} bytes)");
            stream.read_bytes(usize::from(len.saturating_sub(2)))?;
        }
        if marker == Marker::EOI {
            break;
        }
    }
    Ok(())
}
