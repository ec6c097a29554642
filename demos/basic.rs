/// Basic example: assemble a small book and read it back
///
/// Run with: cargo run --example basic
use mobi_forge::{ContainerAssembler, ContainerReader};

fn main() -> anyhow::Result<()> {
    println!("=== mobi-forge Basic Example ===\n");

    println!("1. Assembling book...");
    let bytes = assemble_book()?;
    std::fs::write("example_basic.mobi", &bytes)?;
    println!("   Wrote example_basic.mobi ({} bytes)", bytes.len());

    println!("\n2. Reading it back...");
    read_book("example_basic.mobi")?;

    println!("\n✓ Example complete!");
    Ok(())
}

fn assemble_book() -> anyhow::Result<Vec<u8>> {
    let mut book = ContainerAssembler::new("Field Notes");

    let chapter = "<p>The tide came in slowly over the flats.</p>".repeat(150);
    book.set_text(format!("<html><body>{}</body></html>", chapter));

    book.add_field("author", "Jane Doe")?;
    book.add_fields_from_json(&serde_json::json!({
        "publisher": "Blackfall Labs",
        "language": "en",
    }))?;

    // Stand-in image payloads
    book.add_image(vec![0xFF, 0xD8, 0xFF, 0xE0]);
    book.set_cover_image(vec![0x89, b'P', b'N', b'G']);

    Ok(book.assemble()?)
}

fn read_book(path: &str) -> anyhow::Result<()> {
    let reader = ContainerReader::open(path)?;

    println!("   Title: {}", String::from_utf8_lossy(reader.title()?));
    println!("   Records: {}", reader.record_count());
    println!(
        "   Text: {} bytes in {} records",
        reader.palmdoc_header().text_length,
        reader.palmdoc_header().text_record_count
    );
    for entry in reader.metadata() {
        println!(
            "   EXTH {:>3} {:<16} {} bytes",
            entry.type_code,
            entry.name().unwrap_or("?"),
            entry.length
        );
    }
    println!("   Images: {}", reader.images()?.len());
    if let Some(cover) = reader.cover_index() {
        println!("   Cover: record {}", cover);
    }

    let text = reader.text()?;
    println!("   Decompressed {} bytes", text.len());
    Ok(())
}
