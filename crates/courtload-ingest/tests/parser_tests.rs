//! Scanner and decoder behaviour on whole inputs

use std::io::Cursor;

use courtload_ingest::parser::{decode_fields, RawRecord, RecordScanner, RecordSignature};
use courtload_ingest::pipeline::{IngestPipeline, PipelineOptions};
use courtload_ingest::schema::EntityKind;
use courtload_ingest::TypedRecord;
use proptest::prelude::*;

const DATED: RecordSignature = RecordSignature::KeyThenDate { skip: 0 };

/// Every record of `input`, the flushed tail included
fn scan_all(input: &[u8], chunk_bytes: usize, batch: usize) -> Vec<Vec<u8>> {
    let mut scanner = RecordScanner::new(Cursor::new(input), DATED, chunk_bytes);
    let mut records = Vec::new();
    loop {
        let next = scanner.next_batch(batch).unwrap();
        if next.is_empty() {
            break;
        }
        records.extend(next.iter().map(|r| r.as_bytes().to_vec()));
    }
    records.extend(scanner.finish().map(|r| r.as_bytes().to_vec()));
    records
}

fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "\"\""))
}

// ============================================================================
// END-TO-END SCENARIOS
// ============================================================================

#[test]
fn test_embedded_newline_in_quoted_field() {
    let input = "id,date_created,value\n1,2020-01-01,\"a,b\"\n2,2020-01-02,\"c\nd\"\n";

    let records = scan_all(input.as_bytes(), 4096, 10);
    assert_eq!(records.len(), 2);

    let second = decode_fields(&RawRecord::new(records[1].clone()).text());
    assert_eq!(second, vec!["2", "2020-01-02", "c\nd"]);
    let first = decode_fields(&RawRecord::new(records[0].clone()).text());
    assert_eq!(first, vec!["1", "2020-01-01", "a,b"]);
}

#[test]
fn test_embedded_newline_through_pipeline() {
    let input = "id,date_created,value\n1,2020-01-01,\"a,b\"\n2,2020-01-02,\"c\nd\"";
    let mut pipeline = IngestPipeline::new(
        Cursor::new(input),
        EntityKind::Opinion,
        PipelineOptions::default(),
    )
    .unwrap();

    let report = pipeline.parse_only(100).unwrap();
    assert_eq!(report.raw_records, 2);
    assert_eq!(report.malformed, 0);
    let keys: Vec<i64> = report.records.iter().map(TypedRecord::key).collect();
    assert_eq!(keys, vec![1, 2]);
}

#[test]
fn test_signature_inside_quotes_is_not_a_boundary() {
    let input = "id,date_created,plain_text\n\
                 1,2020-01-01,\"first line\n123,2020-01-01,looks like a record\"\n\
                 2,2020-01-02,done\n";

    for chunk in [1, 7, 4096] {
        let records = scan_all(input.as_bytes(), chunk, 10);
        assert_eq!(records.len(), 2, "chunk size {}", chunk);
        let fields = decode_fields(&RawRecord::new(records[0].clone()).text());
        assert_eq!(fields[2], "first line\n123,2020-01-01,looks like a record");
    }
}

#[test]
fn test_quotes_inside_unquoted_field_keep_records_apart() {
    let input = "id,date_created,plain_text\n\
                 1,2020-01-01,He said \"hi\" loudly\n\
                 2,2020-01-02,second\n\
                 3,2020-01-03,third\n";

    for chunk in [1, 3, 16, 4096] {
        let records = scan_all(input.as_bytes(), chunk, 10);
        assert_eq!(
            records,
            vec![
                b"1,2020-01-01,He said \"hi\" loudly".to_vec(),
                b"2,2020-01-02,second".to_vec(),
                b"3,2020-01-03,third".to_vec(),
            ],
            "chunk size {}",
            chunk
        );
    }
}

#[test]
fn test_quotes_nested_in_quoted_field() {
    let input = "id,date_created,plain_text\n\
                 1,2020-01-01,\"the \"best\" case\"\n\
                 2,2020-01-02,\"the \"best\" case,\nwrapped\"\n\
                 3,2020-01-03,done";

    for chunk in [1, 2, 7, 4096] {
        let records = scan_all(input.as_bytes(), chunk, 2);
        assert_eq!(records.len(), 3, "chunk size {}", chunk);
        assert_eq!(records[2], b"3,2020-01-03,done".to_vec());
    }
}

#[test]
fn test_backslash_escaped_quotes_do_not_toggle() {
    let input = "id,date_created,html\n\
                 1,2020-01-01,\"<a href=\\\"x\\\">\n2,2020-01-02,\"\n\
                 3,2020-01-03,ok\n";
    let records = scan_all(input.as_bytes(), 3, 10);
    assert_eq!(records.len(), 2);
    let fields = decode_fields(&RawRecord::new(records[0].clone()).text());
    assert_eq!(fields[2], "<a href=\"x\">\n2,2020-01-02,");
}

#[test]
fn test_newline_without_signature_stays_in_record() {
    // An unquoted newline that is not followed by `<digits>,<date>`
    let input = "id,date_created,plain_text\n1,2020-01-01,broken\nline\n2,2020-01-02,x";
    let records = scan_all(input.as_bytes(), 5, 10);
    assert_eq!(
        records,
        vec![
            b"1,2020-01-01,broken\nline".to_vec(),
            b"2,2020-01-02,x".to_vec()
        ]
    );
}

#[test]
fn test_cluster_signature_skips_three_fields() {
    let input = "id,date_created,date_modified,judges,date_filed,case_name\n\
                 1,2020-01-01 00:00:00+00,2020-01-01 00:00:00+00,\"Smith,\nJones\",1999-05-01,A v. B\n\
                 2,2020-01-02 00:00:00+00,2020-01-02 00:00:00+00,,1999-05-02,C v. D\n";
    let mut pipeline = IngestPipeline::new(
        Cursor::new(input),
        EntityKind::Cluster,
        PipelineOptions {
            chunk_bytes: 8,
            ..PipelineOptions::default()
        },
    )
    .unwrap();

    let report = pipeline.parse_only(10).unwrap();
    assert_eq!(report.records.len(), 2);
    assert_eq!(report.malformed, 0);
}

// ============================================================================
// PROPERTIES
// ============================================================================

fn field() -> impl Strategy<Value = (bool, String)> {
    prop_oneof![
        "[a-z0-9 .-]{0,12}".prop_map(|s| (false, s)),
        "[a-z0-9 ,.\n-]{0,12}".prop_map(|s| (true, s)),
    ]
}

fn record() -> impl Strategy<Value = (u32, String, String)> {
    (
        0u32..100_000,
        "(19|20)[0-9]{2}-[01][0-9]-[0-3][0-9]",
        "[a-z0-9 ,\n\"-]{0,40}",
    )
}

/// An unquoted field with bare quote pairs in it, e.g. `said "hi" twice`
fn bare_quoted_text() -> impl Strategy<Value = String> {
    prop::collection::vec(("[a-z ]{0,5}", "[a-z ]{0,5}"), 0..4).prop_map(|parts| {
        parts
            .iter()
            .map(|(plain, quoted)| format!("{}\"{}\"", plain, quoted))
            .collect()
    })
}

proptest! {
    #[test]
    fn prop_field_count_is_unquoted_commas_plus_one(fields in prop::collection::vec(field(), 1..8)) {
        let line = fields
            .iter()
            .map(|(quoted, text)| if *quoted { format!("\"{}\"", text) } else { text.clone() })
            .collect::<Vec<_>>()
            .join(",");

        let decoded = decode_fields(&line);
        prop_assert_eq!(decoded.len(), fields.len());
        for (decoded, (_, text)) in decoded.iter().zip(&fields) {
            prop_assert_eq!(decoded, text);
        }
    }

    #[test]
    fn prop_both_escapes_decode_to_one_quote(parts in prop::collection::vec("[a-z ,]{0,6}", 1..5)) {
        let doubled = format!("1,\"{}\",end", parts.join("\"\""));
        let backslashed = format!("1,\"{}\",end", parts.join("\\\""));
        let expected = vec!["1".to_string(), parts.join("\""), "end".to_string()];

        prop_assert_eq!(decode_fields(&doubled), expected.clone());
        prop_assert_eq!(decode_fields(&backslashed), expected);
    }

    #[test]
    fn prop_chunk_size_does_not_change_records(
        records in prop::collection::vec(record(), 1..12),
        trailing_newline in any::<bool>(),
        chunk in 2usize..64,
    ) {
        let mut input = String::from("id,date_created,value\n");
        let body: Vec<String> = records
            .iter()
            .map(|(id, date, value)| format!("{},{},{}", id, date, quote(value)))
            .collect();
        input.push_str(&body.join("\n"));
        if trailing_newline {
            input.push('\n');
        }

        let whole = scan_all(input.as_bytes(), input.len(), 5);
        let bytewise = scan_all(input.as_bytes(), 1, 5);
        let other = scan_all(input.as_bytes(), chunk, 3);

        prop_assert_eq!(&whole, &bytewise);
        prop_assert_eq!(&whole, &other);
        prop_assert_eq!(whole.len(), records.len());
        for (raw, (_, _, value)) in whole.iter().zip(&records) {
            let fields = decode_fields(&RawRecord::new(raw.clone()).text());
            prop_assert_eq!(&fields[2], value);
        }
    }

    #[test]
    fn prop_bare_quotes_do_not_merge_records(
        values in prop::collection::vec(bare_quoted_text(), 1..10),
        chunk in 1usize..32,
    ) {
        let mut input = String::from("id,date_created,value\n");
        for (id, value) in values.iter().enumerate() {
            input.push_str(&format!("{},2020-01-01,{}\n", id, value));
        }

        let whole = scan_all(input.as_bytes(), input.len(), 4);
        let chunked = scan_all(input.as_bytes(), chunk, 3);

        prop_assert_eq!(&whole, &chunked);
        prop_assert_eq!(whole.len(), values.len());
        for (raw, (id, value)) in whole.iter().zip(values.iter().enumerate()) {
            prop_assert_eq!(raw, &format!("{},2020-01-01,{}", id, value).into_bytes());
        }
    }
}
