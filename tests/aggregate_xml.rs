use anyhow::Result;
use ironload::io::open_reader;
use ironload::testing::*;
use ironload::*;

fn run(src: &MemorySource, config: &ReaderConfig, path: &str) -> Result<(Plan, JobOutput)> {
    let registry = CodecRegistry::new();
    let plan = plan(src, &registry, config, &[path])?;
    let out = Runner::sequential().run(src, &registry, config, &plan)?;
    Ok((plan, out))
}

fn element_ids(split_size: u64) -> ReaderConfig {
    ReaderConfig {
        id_source: IdSource::Element("id".into()),
        split_input: true,
        split_size,
        ..ReaderConfig::for_format(InputFormat::Aggregates)
    }
}

fn read_split(src: &MemorySource, config: &ReaderConfig, split: SplitDescriptor) -> Result<Vec<DocumentRecord>> {
    let reader = open_reader(src, &CodecRegistry::new(), config, split)?;
    Ok(RecordCursor::new(reader).collect::<LoadResult<Vec<_>>>()?)
}

#[test]
fn planned_splits_produce_the_same_records_as_one_pass() -> Result<()> {
    let src = MemorySource::new().with("cat.xml", aggregate_xml(40));
    let whole = ReaderConfig {
        split_input: false,
        ..element_ids(1)
    };
    let (_, expected) = run(&src, &whole, "cat.xml")?;
    assert_eq!(expected.records.len(), 40);

    for size in [17, 64, 100, 333, 1000, 1 << 20] {
        let (plan, actual) = run(&src, &element_ids(size), "cat.xml")?;
        if size < 1000 {
            assert!(plan.len() > 1, "size {size} planned one split");
        }
        assert_unique_ids(&actual.records);
        assert_same_records(&actual.records, &expected.records);
    }
    Ok(())
}

#[test]
fn records_declare_inherited_namespaces() -> Result<()> {
    let src = MemorySource::new().with("cat.xml", aggregate_xml(30));
    let (_, out) = run(&src, &element_ids(128), "cat.xml")?;
    let last = out
        .records
        .iter()
        .find(|r| r.id == "29")
        .expect("record 29");
    assert_eq!(
        last.text(),
        Some(r#"<item xmlns="urn:catalog" xmlns:x="urn:extra"><id>29</id><x:note>item &amp; 29</x:note></item>"#)
    );
    Ok(())
}

#[test]
fn generated_ids_are_unique_across_splits() -> Result<()> {
    let src = MemorySource::new()
        .with("a.xml", aggregate_xml(25))
        .with("b.xml", aggregate_xml(25));
    let config = ReaderConfig {
        split_input: true,
        split_size: 90,
        ..ReaderConfig::for_format(InputFormat::Aggregates)
    };
    let registry = CodecRegistry::new();
    let plan = plan(&src, &registry, &config, &["a.xml", "b.xml"])?;
    assert!(plan.len() > 4);
    let out = Runner::default().run(&src, &registry, &config, &plan)?;
    assert_eq!(out.records.len(), 50);
    assert_unique_ids(&out.records);
    Ok(())
}

#[test]
fn every_cut_point_partitions_records() -> Result<()> {
    // No hints: readers seek the first record start themselves, which is only
    // exact when no record-named element nests inside a record.
    let xml = r#"<?xml version="1.0"?><r><p id="1">one</p><p id="2"><q>nested</q></p><p id="3"/><pp/><p id="4">four &lt; 5</p></r>"#;
    let src = MemorySource::new().with("r.xml", xml);
    let config = ReaderConfig {
        record_element: Some("p".into()),
        id_source: IdSource::Attribute("id".into()),
        ..ReaderConfig::for_format(InputFormat::Aggregates)
    };
    let total = xml.len() as u64;
    let expected = read_split(&src, &config, SplitDescriptor::whole("r.xml", total)?)?;
    assert_eq!(ids(&expected), vec!["1", "2", "3", "4"]);

    for cut in 1..total {
        let mut got = read_split(&src, &config, SplitDescriptor::new("r.xml", 0, cut)?)?;
        got.extend(read_split(&src, &config, SplitDescriptor::new("r.xml", cut, total - cut)?)?);
        assert_unique_ids(&got);
        assert_same_records(&got, &expected);
    }
    Ok(())
}

#[test]
fn straddling_record_belongs_to_the_split_it_starts_in() -> Result<()> {
    let xml = r#"<r><p id="a">aaaaaaaaaaaaaaaaaaaa</p><p id="b">b</p></r>"#;
    let src = MemorySource::new().with("r.xml", xml);
    let config = ReaderConfig {
        record_element: Some("p".into()),
        id_source: IdSource::Attribute("id".into()),
        ..ReaderConfig::for_format(InputFormat::Aggregates)
    };
    // The cut lies inside record "a".
    let first = read_split(&src, &config, SplitDescriptor::new("r.xml", 0, 12)?)?;
    let second = read_split(&src, &config, SplitDescriptor::new("r.xml", 12, xml.len() as u64 - 12)?)?;
    assert_eq!(ids(&first), vec!["a"]);
    assert_eq!(first[0].text(), Some(r#"<p id="a">aaaaaaaaaaaaaaaaaaaa</p>"#));
    assert_eq!(ids(&second), vec!["b"]);
    Ok(())
}

#[test]
fn escaping_is_a_fixed_point() -> Result<()> {
    let xml = "<r><p>1 &lt; 2 &amp;&amp; 3 &gt; 2 &quot;q&quot;</p></r>";
    let config = ReaderConfig::for_format(InputFormat::Aggregates);
    let src = MemorySource::new().with("e.xml", xml);
    let once = read_split(&src, &config, SplitDescriptor::whole("e.xml", xml.len() as u64)?)?;
    let emitted = once[0].text().expect("text content").to_string();
    assert!(!emitted.contains("&amp;lt;"));

    let wrapped = format!("<r>{emitted}</r>");
    let src = MemorySource::new().with("again.xml", wrapped.as_str());
    let twice = read_split(&src, &config, SplitDescriptor::whole("again.xml", wrapped.len() as u64)?)?;
    assert_eq!(twice[0].text(), Some(emitted.as_str()));
    Ok(())
}

#[test]
fn zip_entries_are_read_as_separate_documents() -> Result<()> {
    let bytes = zip_bytes(&[
        ("one.xml", Some(aggregate_xml(3).as_bytes())),
        ("dir/", None),
        ("two.xml", Some(aggregate_xml(2).as_bytes())),
    ]);
    let src = MemorySource::new().with("batch.zip", bytes);
    let config = ReaderConfig {
        compression: CompressionKind::Auto,
        ..ReaderConfig::for_format(InputFormat::Aggregates)
    };
    let (plan, out) = run(&src, &config, "batch.zip")?;
    assert_eq!(plan.len(), 1);
    assert_eq!(out.records.len(), 5);
    assert_unique_ids(&out.records);
    assert_eq!(out.records[3].location.entry.as_deref(), Some("two.xml"));
    Ok(())
}

#[test]
fn missing_identifier_fails_the_split() -> Result<()> {
    let xml = "<r><p>no id</p></r>";
    let src = MemorySource::new().with("m.xml", xml);
    let config = ReaderConfig {
        id_source: IdSource::Attribute("id".into()),
        ..ReaderConfig::for_format(InputFormat::Aggregates)
    };
    let registry = CodecRegistry::new();
    let plan = plan(&src, &registry, &config, &["m.xml"])?;

    assert!(Runner::sequential().run(&src, &registry, &config, &plan).is_err());

    let tolerant = Runner {
        on_split_error: SplitFailure::DropSplit,
        ..Runner::sequential()
    };
    let out = tolerant.run(&src, &registry, &config, &plan)?;
    assert_eq!(out.stats.failed_splits, 1);
    assert!(out.records.is_empty());
    Ok(())
}

#[test]
fn bindings_end_with_the_ancestor_that_declared_them() -> Result<()> {
    let pad = "x".repeat(40);
    let cases = [
        (
            format!(
                r#"<r><g xmlns="urn:g"><p><id>1</id><v>{pad}</v></p><p><id>2</id><v>{pad}</v></p></g><p><id>3</id></p></r>"#
            ),
            vec!["1", "2"],
        ),
        (
            format!(
                r#"<r xmlns:a="urn:a"><g xmlns:a="urn:b"><a:p><id>1</id><v>{pad}</v></a:p></g><a:p><id>2</id></a:p><s><a:p><id>3</id><v>{pad}</v></a:p></s></r>"#
            ),
            vec!["2", "3"],
        ),
    ];
    for (xml, want) in cases {
        let src = MemorySource::new().with("ns.xml", xml.as_str());
        let namespace = if want[0] == "1" { "urn:g" } else { "urn:a" };
        let whole = ReaderConfig {
            record_element: Some("p".into()),
            record_namespace: Some(namespace.into()),
            ..element_ids(1)
        };
        let (_, expected) = run(
            &src,
            &ReaderConfig {
                split_input: false,
                ..whole.clone()
            },
            "ns.xml",
        )?;
        assert_eq!(ids(&expected.records), want);

        for size in (8..xml.len() as u64).step_by(5) {
            let (_, actual) = run(
                &src,
                &ReaderConfig {
                    split_size: size,
                    ..whole.clone()
                },
                "ns.xml",
            )?;
            assert_unique_ids(&actual.records);
            assert_same_records(&actual.records, &expected.records);
        }
    }
    Ok(())
}
