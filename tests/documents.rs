use anyhow::Result;
use ironload::testing::*;
use ironload::*;

fn run(src: &MemorySource, config: &ReaderConfig, paths: &[&str]) -> Result<JobOutput> {
    let registry = CodecRegistry::new();
    let plan = plan(src, &registry, config, paths)?;
    Runner::sequential().run(src, &registry, config, &plan)
}

#[test]
fn zip_skips_directories_and_empty_entries() -> Result<()> {
    let bytes = zip_bytes(&[
        ("folder/", None),
        ("empty.txt", Some(&b""[..])),
        ("folder/real.xml", Some(&b"<doc>hi</doc>"[..])),
    ]);
    let src = MemorySource::new().with("bundle.zip", bytes);
    let config = ReaderConfig {
        compression: CompressionKind::Zip,
        ..ReaderConfig::for_format(InputFormat::Documents)
    };
    let out = run(&src, &config, &["bundle.zip"])?;
    assert_eq!(out.records.len(), 1);
    assert_eq!(out.records[0].id, "folder/real.xml");
    assert_eq!(out.records[0].text(), Some("<doc>hi</doc>"));
    Ok(())
}

#[test]
fn plain_files_are_one_document_each() -> Result<()> {
    let src = MemorySource::new()
        .with("a.json", r#"{"a":1}"#)
        .with("b.bin", vec![0u8, 159, 146, 150])
        .with("empty.txt", "");
    let config = ReaderConfig {
        split_input: true,
        split_size: 2,
        ..ReaderConfig::for_format(InputFormat::Documents)
    };
    let out = run(&src, &config, &["a.json", "b.bin", "empty.txt"])?;
    assert_eq!(out.stats.splits, 2);
    assert_eq!(ids(&out.records), vec!["a.json", "b.bin"]);
    assert_eq!(out.records[0].text(), Some(r#"{"a":1}"#));
    assert!(matches!(out.records[1].content, Content::Binary(_)));
    Ok(())
}

#[test]
fn documents_cannot_be_cut() -> Result<()> {
    let src = MemorySource::new().with("a.txt", "0123456789");
    let config = ReaderConfig::for_format(InputFormat::Documents);
    let split = SplitDescriptor::new("a.txt", 0, 4)?;
    let err = io::open_reader(&src, &CodecRegistry::new(), &config, split).err();
    assert!(matches!(err, Some(LoadError::InvalidSplit { .. })));
    Ok(())
}

const SIDECAR: &str = r#"<?xml version="1.0"?>
<metadata>
  <format>xml</format>
  <collections><collection>news</collection></collections>
  <permissions><permission><role-name>reader</role-name><capability>read</capability></permission></permissions>
  <quality>5</quality>
</metadata>"#;

const NAKED: &str = r#"<metadata><prop:properties xmlns:prop="http://marklogic.com/xdmp/property"><status>draft</status></prop:properties></metadata>"#;

#[test]
fn archive_pairs_sidecars_with_content() -> Result<()> {
    let bytes = zip_bytes(&[
        ("/a.xml.metadata", Some(SIDECAR.as_bytes())),
        ("/a.xml", Some(&b"<a/>"[..])),
        ("/b.xml.naked", Some(NAKED.as_bytes())),
    ]);
    let src = MemorySource::new().with("export.zip", bytes);
    let config = ReaderConfig::for_format(InputFormat::Archive);
    let out = run(&src, &config, &["export.zip"])?;
    assert_eq!(ids(&out.records), vec!["/a.xml", "/b.xml"]);

    let a = out.records[0].metadata.as_ref().expect("metadata");
    assert_eq!(a.collections, vec!["news"]);
    assert_eq!(a.quality, 5);
    assert_eq!(a.permissions.len(), 1);
    assert_eq!(out.records[0].text(), Some("<a/>"));

    let b = out.records[1].metadata.as_ref().expect("metadata");
    assert!(b.naked);
    assert_eq!(out.records[1].text(), b.properties.as_deref());
    assert!(b.properties.as_deref().is_some_and(|p| p.contains("<status>draft</status>")));
    Ok(())
}

#[test]
fn archive_entry_without_sidecar() -> Result<()> {
    let bytes = zip_bytes(&[("/lonely.txt", Some(&b"hello"[..]))]);
    let src = MemorySource::new().with("export.zip", bytes);

    let strict = ReaderConfig::for_format(InputFormat::Archive);
    assert!(run(&src, &strict, &["export.zip"]).is_err());

    let lenient = ReaderConfig {
        archive_metadata_optional: true,
        ..strict
    };
    let out = run(&src, &lenient, &["export.zip"])?;
    assert_eq!(ids(&out.records), vec!["/lonely.txt"]);
    assert!(out.records[0].metadata.is_none());
    Ok(())
}

#[cfg(feature = "compression-gzip")]
mod gzip {
    use super::*;

    #[test]
    fn gzip_document_drops_the_codec_extension() -> Result<()> {
        let src = MemorySource::new().with("notes.txt.gz", gzip_bytes(b"plain words"));
        let config = ReaderConfig {
            compression: CompressionKind::Auto,
            ..ReaderConfig::for_format(InputFormat::Documents)
        };
        let out = run(&src, &config, &["notes.txt.gz"])?;
        assert_eq!(ids(&out.records), vec!["notes.txt"]);
        assert_eq!(out.records[0].text(), Some("plain words"));
        Ok(())
    }

    #[test]
    fn gzip_containers_are_planned_whole() -> Result<()> {
        let data: String = (0..200).map(|i| format!("{{\"n\":{i}}}\n")).collect();
        let src = MemorySource::new().with("d.jsonl.gz", gzip_bytes(data.as_bytes()));
        let config = ReaderConfig {
            compression: CompressionKind::Gzip,
            split_input: true,
            split_size: 16,
            ..ReaderConfig::for_format(InputFormat::DelimitedJson)
        };
        let registry = CodecRegistry::new();
        let plan = plan(&src, &registry, &config, &["d.jsonl.gz"])?;
        assert_eq!(plan.len(), 1);
        assert!(plan.to_string().contains("stream codec"));
        let out = Runner::sequential().run(&src, &registry, &config, &plan)?;
        assert_eq!(out.records.len(), 200);

        // A hand-made partial split of a gzip stream is rejected.
        let split = SplitDescriptor::new("d.jsonl.gz", 0, 10)?;
        let err = io::open_reader(&src, &registry, &config, split).err();
        assert!(matches!(err, Some(LoadError::InvalidSplit { .. })));
        Ok(())
    }

    #[test]
    fn magic_bytes_detect_gzip_without_extension() -> Result<()> {
        let src = MemorySource::new().with("blob", gzip_bytes(b"id,v\n1,x\n"));
        let config = ReaderConfig {
            compression: CompressionKind::Auto,
            id_source: IdSource::Column("id".into()),
            ..ReaderConfig::for_format(InputFormat::DelimitedText)
        };
        let out = run(&src, &config, &["blob"])?;
        assert_eq!(ids(&out.records), vec!["1"]);
        Ok(())
    }
}
