use anyhow::Result;
use ironload::testing::*;
use ironload::*;

fn column_ids(split_size: u64) -> ReaderConfig {
    ReaderConfig {
        id_source: IdSource::Column("id".into()),
        split_input: true,
        split_size,
        ..ReaderConfig::for_format(InputFormat::DelimitedText)
    }
}

fn run(src: &MemorySource, config: &ReaderConfig, paths: &[&str]) -> Result<JobOutput> {
    let registry = CodecRegistry::new();
    let plan = plan(src, &registry, config, paths)?;
    Runner::default().run(src, &registry, config, &plan)
}

fn table(rows: usize) -> String {
    let mut out = String::from("id,name,note\n");
    for i in 0..rows {
        out.push_str(&format!("{i},name {i},\"quoted, {i}\"\n"));
    }
    out
}

#[test]
fn header_and_one_row_become_one_record() -> Result<()> {
    let src = MemorySource::new().with("p.csv", "id,name\n7,Alice\n");
    let out = run(&src, &column_ids(1 << 20), &["p.csv"])?;
    assert_eq!(out.records.len(), 1);
    assert_eq!(out.records[0].id, "7");
    assert_eq!(
        out.records[0].text(),
        Some("<root><id>7</id><name>Alice</name></root>")
    );
    Ok(())
}

#[test]
fn split_rows_match_one_pass() -> Result<()> {
    let src = MemorySource::new().with("t.csv", table(60));
    let whole = ReaderConfig {
        split_input: false,
        ..column_ids(1)
    };
    let expected = run(&src, &whole, &["t.csv"])?;
    assert_eq!(expected.records.len(), 60);

    for size in [5, 29, 64, 250, 1000] {
        let actual = run(&src, &column_ids(size), &["t.csv"])?;
        assert_unique_ids(&actual.records);
        assert_same_records(&actual.records, &expected.records);
    }
    Ok(())
}

#[test]
fn later_splits_use_the_planned_header() -> Result<()> {
    let src = MemorySource::new().with("t.csv", table(10));
    let registry = CodecRegistry::new();
    let config = column_ids(40);
    let plan = plan(&src, &registry, &config, &["t.csv"])?;
    assert!(plan.len() > 2);
    let header = plan.splits[0].header.clone().expect("planned header");
    assert_eq!(&header[..], ["id", "name", "note"]);

    let last = plan.splits.last().expect("at least one split").clone();
    let reader = io::open_reader(&src, &registry, &config, last)?;
    for record in RecordCursor::new(reader) {
        let record = record?;
        let text = record.text().expect("text");
        assert!(text.starts_with(&format!("<root><id>{}</id>", record.id)));
        assert!(text.contains("<note>quoted, "));
    }
    Ok(())
}

#[test]
fn json_rows_and_tab_delimiter() -> Result<()> {
    let src = MemorySource::new().with("t.tsv", "sku\tqty\nA-1\t3\nB-2\t\n");
    let config = ReaderConfig {
        id_source: IdSource::Column("sku".into()),
        delimiter: '\t',
        delimited_output: DelimitedOutput::Json,
        ..ReaderConfig::for_format(InputFormat::DelimitedText)
    };
    let out = run(&src, &config, &["t.tsv"])?;
    let texts: Vec<_> = out.records.iter().filter_map(|r| r.text()).collect();
    assert_eq!(texts, vec![r#"{"sku":"A-1","qty":"3"}"#, r#"{"sku":"B-2","qty":""}"#]);
    Ok(())
}

#[test]
fn bad_rows_are_skipped_not_fatal() -> Result<()> {
    let src = MemorySource::new().with("t.csv", "id,name\n1,a\n2\n,blank\n3,c\n");
    let out = run(&src, &column_ids(1 << 20), &["t.csv"])?;
    assert_eq!(out.stats.records, 4);
    assert_eq!(out.stats.skipped, 2);
    let kept: Vec<_> = out.records.iter().filter(|r| !r.skip).map(|r| r.id.as_str()).collect();
    assert_eq!(kept, vec!["1", "3"]);
    Ok(())
}

#[test]
fn generated_ids_without_an_id_column() -> Result<()> {
    let src = MemorySource::new().with("g.csv", table(30));
    let config = ReaderConfig {
        id_source: IdSource::Generated,
        ..column_ids(100)
    };
    let out = run(&src, &config, &["g.csv"])?;
    assert_eq!(out.records.len(), 30);
    assert_unique_ids(&out.records);
    Ok(())
}

#[test]
fn delimited_json_lines_split_cleanly() -> Result<()> {
    let data: String = (0..50)
        .map(|i| format!("{{\"uri\":\"/doc/{i}.json\",\"n\":{i}}}\n"))
        .collect();
    let src = MemorySource::new().with("d.jsonl", data.as_str());
    let config = |split_input, split_size| ReaderConfig {
        id_source: IdSource::Property("uri".into()),
        split_input,
        split_size,
        ..ReaderConfig::for_format(InputFormat::DelimitedJson)
    };
    let expected = run(&src, &config(false, 1), &["d.jsonl"])?;
    assert_eq!(expected.records.len(), 50);
    assert_eq!(expected.records[0].id, "/doc/0.json");
    assert_eq!(expected.records[0].text(), Some("{\"uri\":\"/doc/0.json\",\"n\":0}"));

    for size in [1, 13, 31, 200] {
        let actual = run(&src, &config(true, size), &["d.jsonl"])?;
        assert_unique_ids(&actual.records);
        assert_same_records(&actual.records, &expected.records);
    }
    Ok(())
}
