use std::fmt;

use super::{opt, preview, Entity};
use crate::error::RowError;
use crate::mapper::Row;
use crate::schema::{EntityKind, SqlValue};

/// A row of `search_opinion`
#[derive(Debug, Clone, PartialEq)]
pub struct Opinion {
    pub id: i64,
    pub date_created: String,
    pub date_modified: String,
    pub opinion_type: String,
    pub sha1: String,
    pub download_url: Option<String>,
    pub local_path: String,
    pub plain_text: String,
    pub html: String,
    pub html_lawbox: String,
    pub html_columbia: String,
    pub html_with_citations: String,
    pub extracted_by_ocr: bool,
    pub author_id: Option<i64>,
    pub cluster_id: i64,
    pub per_curiam: bool,
    pub page_count: Option<i64>,
    pub author_str: String,
    pub joined_by_str: String,
    pub xml_harvard: String,
    pub html_anon_2020: String,
    pub ordering_key: Option<i64>,
    pub main_version_id: Option<i64>,
}

impl Entity for Opinion {
    const KIND: EntityKind = EntityKind::Opinion;

    fn from_row(row: &Row<'_>) -> Result<Self, RowError> {
        let date_created = row.required_date("date_created")?;
        // Some exports leave date_modified blank; the column is NOT NULL
        let date_modified = row
            .opt_text("date_modified")
            .unwrap_or_else(|| date_created.clone());

        Ok(Self {
            id: row.required_int("id")?,
            date_created,
            date_modified,
            opinion_type: row.text("type"),
            sha1: row.text("sha1"),
            download_url: row.opt_text("download_url"),
            local_path: row.text("local_path"),
            plain_text: row.text("plain_text"),
            html: row.text("html"),
            html_lawbox: row.text("html_lawbox"),
            html_columbia: row.text("html_columbia"),
            html_with_citations: row.text("html_with_citations"),
            extracted_by_ocr: row.bool_or("extracted_by_ocr", false),
            author_id: row.opt_int("author_id"),
            cluster_id: row.int_or("cluster_id", 0),
            per_curiam: row.bool_or("per_curiam", false),
            page_count: row.opt_int("page_count"),
            author_str: row.text("author_str"),
            joined_by_str: row.text("joined_by_str"),
            xml_harvard: row.text("xml_harvard"),
            html_anon_2020: row.text("html_anon_2020"),
            ordering_key: row.opt_int("ordering_key"),
            main_version_id: row.opt_int("main_version_id"),
        })
    }

    fn key(&self) -> i64 {
        self.id
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Int(Some(self.id)),
            SqlValue::text(&self.date_created),
            SqlValue::text(&self.date_modified),
            SqlValue::text(&self.opinion_type),
            SqlValue::text(&self.sha1),
            SqlValue::Text(self.download_url.clone()),
            SqlValue::text(&self.local_path),
            SqlValue::text(&self.plain_text),
            SqlValue::text(&self.html),
            SqlValue::text(&self.html_lawbox),
            SqlValue::text(&self.html_columbia),
            SqlValue::text(&self.html_with_citations),
            SqlValue::Bool(self.extracted_by_ocr),
            SqlValue::Int(self.author_id),
            SqlValue::Int(Some(self.cluster_id)),
            SqlValue::Bool(self.per_curiam),
            SqlValue::Int(self.page_count),
            SqlValue::text(&self.author_str),
            SqlValue::text(&self.joined_by_str),
            SqlValue::text(&self.xml_harvard),
            SqlValue::text(&self.html_anon_2020),
            SqlValue::Int(self.ordering_key),
            SqlValue::Int(self.main_version_id),
        ]
    }
}

impl fmt::Display for Opinion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Opinion{{id={}, cluster_id={}, type={}, author_id={}, date_created={}, plain_text=\"{}\"}}",
            self.id,
            self.cluster_id,
            self.opinion_type,
            opt(&self.author_id),
            self.date_created,
            preview(&self.plain_text)
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::parser::Header;

    #[test]
    fn test_opinion_from_row() {
        let header = Header::from_columns([
            "id",
            "date_created",
            "date_modified",
            "type",
            "author_id",
            "cluster_id",
            "per_curiam",
            "download_url",
        ]);
        let fields: Vec<String> = ["42", "2020-01-01 00:00:00+00", "", "010", "", "9", "t", " "]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let opinion = Opinion::from_row(&Row::new(&header, &fields)).unwrap();

        assert_eq!(opinion.id, 42);
        assert_eq!(opinion.date_modified, opinion.date_created);
        assert_eq!(opinion.author_id, None);
        assert_eq!(opinion.cluster_id, 9);
        assert!(opinion.per_curiam);
        assert_eq!(opinion.download_url, None);
        assert_eq!(opinion.plain_text, "");
    }

    #[test]
    fn test_display_truncates_text() {
        let header = Header::from_columns(["id", "date_created", "plain_text"]);
        let fields = vec!["1".to_string(), "2020-01-01".to_string(), "z".repeat(200)];
        let opinion = Opinion::from_row(&Row::new(&header, &fields)).unwrap();
        let shown = opinion.to_string();
        assert!(shown.contains(&format!("\"{}...\"", "z".repeat(50))));
        assert!(shown.contains("author_id=null"));
    }
}
