//! Integration tests for mobi-forge: assemble containers and read them back

use chrono::{TimeZone, Utc};
use mobi_forge::container::{EOF_MARKER, PALMDOC_HEADER_SIZE, RECORD_FRAME_SIZE};
use mobi_forge::{
    Compression, ContainerAssembler, ContainerReader, FormatConfig, MobiError,
};
use std::fs::File;
use tempfile::NamedTempFile;

/// Helper: assembler with fixed ids and clock, so output is reproducible
fn fixed_book(title: &str) -> ContainerAssembler {
    let when = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
    ContainerAssembler::new(title)
        .with_timestamp(when)
        .with_unique_id(0x1234_5678)
}

#[test]
fn test_text_split_and_full_name() {
    let mut book = fixed_book("T");
    book.set_text(vec![b'A'; 5000]);
    let bytes = book.assemble().unwrap();

    let reader = ContainerReader::from_bytes(bytes.clone()).unwrap();
    let palmdoc = reader.palmdoc_header();
    assert_eq!(palmdoc.compression, Compression::PalmDoc);
    assert_eq!(palmdoc.text_record_count, 2);
    assert_eq!(palmdoc.text_length, 5000);
    assert_eq!(palmdoc.record_size, 4096);

    let first = mobi_forge::palmdoc::decompress(reader.record(1).unwrap()).unwrap();
    let second = mobi_forge::palmdoc::decompress(reader.record(2).unwrap()).unwrap();
    assert_eq!(first.len(), 4096);
    assert_eq!(second.len(), 904);
    assert_eq!(reader.text().unwrap(), vec![b'A'; 5000]);

    // The header cites the title's absolute position and length
    let mobi = reader.mobi_header();
    let at = mobi.full_name_offset as usize;
    assert_eq!(mobi.full_name_length, 1);
    assert_eq!(&bytes[at..at + 1], b"T");
    assert_eq!(reader.title().unwrap(), b"T");
}

#[test]
fn test_record_layout() {
    let mut book = fixed_book("Layout");
    book.set_text(b"<html><body>short</body></html>".to_vec());
    book.add_image(vec![0x89; 100]);
    let bytes = book.assemble().unwrap();
    let reader = ContainerReader::from_bytes(bytes.clone()).unwrap();

    // header record, one text record, one image, end marker
    assert_eq!(reader.record_count(), 4);
    assert_eq!(u16::from_be_bytes([bytes[76], bytes[77]]), 4);

    let records = reader.records();
    assert_eq!(records[0].offset as usize, 78 + 4 * 8 + 2);
    for (i, window) in records.windows(2).enumerate() {
        assert!(window[0].offset < window[1].offset);
        assert_eq!(window[0].id, i as u32);
    }

    // Every record opens with a zero byte and its own span length
    for (i, record) in records.iter().enumerate() {
        let start = record.offset as usize;
        let end = records
            .get(i + 1)
            .map(|r| r.offset as usize)
            .unwrap_or(bytes.len());
        assert_eq!(bytes[start], 0);
        let span = u32::from_be_bytes(bytes[start + 1..start + 5].try_into().unwrap());
        assert_eq!(span as usize, end - start);
    }

    assert_eq!(reader.mobi_header().first_non_book_index, 2);
    assert_eq!(reader.mobi_header().first_image_index, 2);
    assert_eq!(reader.record(3).unwrap(), &EOF_MARKER);
    assert!(reader.has_eof_marker());
}

#[test]
fn test_pdb_header_fields() {
    let bytes = fixed_book("A Title").assemble().unwrap();
    assert_eq!(&bytes[..7], b"A Title");
    assert!(bytes[7..32].iter().all(|&b| b == 0));
    assert_eq!(&bytes[60..64], b"BOOK");
    assert_eq!(&bytes[64..68], b"MOBI");

    let created = u32::from_be_bytes(bytes[36..40].try_into().unwrap());
    let expected = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap().timestamp();
    assert_eq!(i64::from(created), expected);

    let reader = ContainerReader::from_bytes(bytes).unwrap();
    assert_eq!(reader.name(), b"A Title");
    assert_eq!(reader.mobi_header().unique_id, 0x1234_5678);
}

#[test]
fn test_long_title_truncated_in_database_name_only() {
    let title = "An Exceedingly Long Title That Does Not Fit";
    let bytes = fixed_book(title).assemble().unwrap();
    let reader = ContainerReader::from_bytes(bytes).unwrap();
    assert_eq!(reader.name(), &title.as_bytes()[..31]);
    assert_eq!(reader.title().unwrap(), title.as_bytes());
}

#[test]
fn test_author_field() {
    let mut book = fixed_book("T");
    book.add_field("author", "Jane Doe").unwrap();
    let reader = ContainerReader::from_bytes(book.assemble().unwrap()).unwrap();

    let authors = reader.field("author");
    assert_eq!(authors.len(), 1);
    assert_eq!(authors[0].type_code, 100);
    assert_eq!(authors[0].length, 8);
    assert_eq!(authors[0].value, b"Jane Doe".to_vec());
    assert_eq!(authors[0].name(), Some("author"));

    // Defaults ride along, in ascending type-code order
    let codes: Vec<u32> = reader.metadata().iter().map(|e| e.type_code).collect();
    assert_eq!(codes, vec![100, 106, 501]);
    assert_eq!(reader.field("publishingdate")[0].value, b"2024-03-09".to_vec());
    assert_eq!(reader.field("cdetype")[0].value, b"EBOK".to_vec());
}

#[test]
fn test_exth_block_padding() {
    for author in ["A", "AB", "ABC", "ABCD"] {
        let mut book = fixed_book("T");
        book.add_field("author", author).unwrap();
        let bytes = book.assemble().unwrap();
        let reader = ContainerReader::from_bytes(bytes).unwrap();

        // The title follows the padded EXTH block, 4-aligned within record 0
        let record0 = reader.records()[0].offset as usize + RECORD_FRAME_SIZE;
        let title_at = reader.mobi_header().full_name_offset as usize;
        assert_eq!((title_at - record0 - PALMDOC_HEADER_SIZE) % 4, 0, "author {:?}", author);
        assert_eq!(reader.title().unwrap(), b"T");
    }
}

#[test]
fn test_unknown_field_rejected() {
    let mut book = fixed_book("T");
    book.add_field("author", "Jane Doe").unwrap();
    let err = book.add_field("favourite_colour", "blue").unwrap_err();
    assert!(matches!(err, MobiError::UnknownField(ref name) if name == "favourite_colour"));
    assert_eq!(book.metadata().len(), 1);

    let reader = ContainerReader::from_bytes(book.assemble().unwrap()).unwrap();
    assert_eq!(reader.metadata().len(), 3);
}

#[test]
fn test_fields_from_json() {
    let mut book = fixed_book("T");
    let json: serde_json::Value = serde_json::from_str(
        r#"{ "author": "Jane Doe", "publisher": "Blackfall", "language": "en" }"#,
    )
    .unwrap();
    book.add_fields_from_json(&json).unwrap();

    let reader = ContainerReader::from_bytes(book.assemble().unwrap()).unwrap();
    assert_eq!(reader.field("publisher")[0].value, b"Blackfall".to_vec());
    assert_eq!(reader.field("language")[0].value, b"en".to_vec());
}

#[test]
fn test_oversized_image_rejected() {
    let mut book = fixed_book("T");
    book.add_image(vec![0u8; 1024]);
    book.add_image(vec![0u8; 63 * 1024 + 1]);
    match book.assemble() {
        Err(MobiError::UnsupportedImageSize { index, size, max }) => {
            assert_eq!(index, 1);
            assert_eq!(size, 63 * 1024 + 1);
            assert_eq!(max, 63 * 1024);
        }
        other => panic!("expected UnsupportedImageSize, got {:?}", other.map(|b| b.len())),
    }

    // A larger ceiling from configuration lets it through
    let config = FormatConfig::from_toml_str("max_image_size = 131072").unwrap();
    let book = book.with_config(config);
    assert!(book.assemble().is_ok());
}

#[test]
fn test_images_and_cover_roundtrip() {
    let mut book = fixed_book("Pictures");
    book.set_text(b"<p>see figures</p>".to_vec());
    book.set_images(vec![vec![1u8; 300], vec![2u8; 500]]);
    book.set_cover_image(vec![3u8; 700]);
    let reader = ContainerReader::from_bytes(book.assemble().unwrap()).unwrap();

    let first_image = reader.mobi_header().first_image_index as usize;
    assert_eq!(first_image, 2);
    assert_eq!(reader.field("coveroffset")[0].value, vec![0, 0, 0, 2]);
    assert_eq!(reader.cover_index(), Some(4));
    assert_eq!(reader.cover_image().unwrap(), Some(&[3u8; 700][..]));

    let images = reader.images().unwrap();
    assert_eq!(images.len(), 2);
    assert_eq!(images[0], &[1u8; 300][..]);
    assert_eq!(images[1], &[2u8; 500][..]);
}

#[test]
fn test_no_cover_means_no_coveroffset() {
    let mut book = fixed_book("T");
    book.add_image(vec![9u8; 10]);
    let reader = ContainerReader::from_bytes(book.assemble().unwrap()).unwrap();
    assert!(reader.field("coveroffset").is_empty());
    assert_eq!(reader.cover_index(), None);
    assert_eq!(reader.images().unwrap().len(), 1);
}

#[test]
fn test_reproducible_output() {
    let mut book = fixed_book("Same");
    book.set_text(b"identical input, identical bytes".to_vec());
    assert_eq!(book.assemble().unwrap(), book.assemble().unwrap());
}

#[test]
fn test_write_to_file_and_open() {
    let temp_file = NamedTempFile::new().unwrap();
    let body = "<html><body><p>Hello, reader.</p></body></html>".repeat(200);

    {
        let mut book = fixed_book("On Disk");
        book.set_text(body.as_bytes().to_vec());
        book.add_field("author", "Jane Doe").unwrap();
        let written = book.write_to(File::create(temp_file.path()).unwrap()).unwrap();
        assert_eq!(written as u64, temp_file.path().metadata().unwrap().len());
    }

    let reader = ContainerReader::open(temp_file.path()).unwrap();
    assert_eq!(reader.title().unwrap(), b"On Disk");
    assert_eq!(reader.text().unwrap(), body.as_bytes());
    assert_eq!(reader.field("author")[0].value, b"Jane Doe".to_vec());
}

#[test]
fn test_config_changes_header() {
    let config = FormatConfig::from_toml_str("record_size = 1024\nlocale = 1041\n").unwrap();
    let mut book = fixed_book("T").with_config(config);
    book.set_text(vec![b'x'; 3000]);
    let reader = ContainerReader::from_bytes(book.assemble().unwrap()).unwrap();

    assert_eq!(reader.palmdoc_header().record_size, 1024);
    assert_eq!(reader.palmdoc_header().text_record_count, 3);
    assert_eq!(reader.mobi_header().locale, 1041);
    assert_eq!(reader.text().unwrap(), vec![b'x'; 3000]);
}

#[test]
fn test_invalid_config_rejected_at_assembly() {
    let config = FormatConfig {
        record_size: 0,
        ..FormatConfig::default()
    };
    let book = fixed_book("T").with_config(config);
    assert!(matches!(book.assemble(), Err(MobiError::InvalidConfig(_))));
}

#[test]
fn test_corrupted_container_rejected() {
    let mut book = fixed_book("T");
    book.set_text(b"some text".to_vec());
    let bytes = book.assemble().unwrap();

    let mut truncated = bytes.clone();
    truncated.truncate(bytes.len() - 10);
    let reader = ContainerReader::from_bytes(truncated).unwrap();
    assert!(reader.record(reader.record_count() - 1).is_err());

    let mut bad_magic = bytes.clone();
    let mobi_at = u32::from_be_bytes(bad_magic[78..82].try_into().unwrap()) as usize
        + RECORD_FRAME_SIZE
        + PALMDOC_HEADER_SIZE;
    bad_magic[mobi_at] = b'X';
    assert!(ContainerReader::from_bytes(bad_magic).is_err());
}
