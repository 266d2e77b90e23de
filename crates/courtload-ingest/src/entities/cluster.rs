use std::fmt;

use super::{opt, preview, Entity};
use crate::error::RowError;
use crate::mapper::Row;
use crate::schema::{EntityKind, SqlValue};

/// A row of `search_opinioncluster`
#[derive(Debug, Clone, PartialEq)]
pub struct OpinionCluster {
    pub id: i64,
    pub judges: String,
    pub date_created: String,
    pub date_modified: String,
    pub date_filed: String,
    pub slug: Option<String>,
    pub case_name_short: String,
    pub case_name: String,
    pub case_name_full: String,
    pub scdb_id: String,
    pub source: String,
    pub procedural_history: String,
    pub attorneys: String,
    pub nature_of_suit: String,
    pub posture: String,
    pub syllabus: String,
    pub citation_count: i64,
    pub precedential_status: String,
    pub date_blocked: Option<String>,
    pub blocked: bool,
    pub docket_id: i64,
    pub scdb_decision_direction: Option<i64>,
    pub scdb_votes_majority: Option<i64>,
    pub scdb_votes_minority: Option<i64>,
    pub date_filed_is_approximate: bool,
    pub correction: String,
    pub cross_reference: String,
    pub disposition: String,
    pub filepath_json_harvard: String,
    pub headnotes: String,
    pub history: String,
    pub other_dates: String,
    pub summary: String,
    pub arguments: String,
    pub headmatter: String,
    pub filepath_pdf_harvard: String,
}

impl Entity for OpinionCluster {
    const KIND: EntityKind = EntityKind::Cluster;

    fn from_row(row: &Row<'_>) -> Result<Self, RowError> {
        let date_filed = row.required_date("date_filed")?;
        let date_created = row.opt_text("date_created").unwrap_or_else(|| date_filed.clone());
        let date_modified = row
            .opt_text("date_modified")
            .unwrap_or_else(|| date_created.clone());

        Ok(Self {
            id: row.required_int("id")?,
            judges: row.text("judges"),
            date_created,
            date_modified,
            date_filed,
            slug: row.opt_text("slug"),
            case_name_short: row.text("case_name_short"),
            case_name: row.text("case_name"),
            case_name_full: row.text("case_name_full"),
            scdb_id: row.text("scdb_id"),
            source: row.text("source"),
            procedural_history: row.text("procedural_history"),
            attorneys: row.text("attorneys"),
            nature_of_suit: row.text("nature_of_suit"),
            posture: row.text("posture"),
            syllabus: row.text("syllabus"),
            citation_count: row.int_or("citation_count", 0),
            precedential_status: row.text("precedential_status"),
            date_blocked: row.opt_text("date_blocked"),
            blocked: row.bool_or("blocked", false),
            docket_id: row.int_or("docket_id", 0),
            scdb_decision_direction: row.opt_int("scdb_decision_direction"),
            scdb_votes_majority: row.opt_int("scdb_votes_majority"),
            scdb_votes_minority: row.opt_int("scdb_votes_minority"),
            date_filed_is_approximate: row.bool_or("date_filed_is_approximate", false),
            correction: row.text("correction"),
            cross_reference: row.text("cross_reference"),
            disposition: row.text("disposition"),
            filepath_json_harvard: row.text("filepath_json_harvard"),
            headnotes: row.text("headnotes"),
            history: row.text("history"),
            other_dates: row.text("other_dates"),
            summary: row.text("summary"),
            arguments: row.text("arguments"),
            headmatter: row.text("headmatter"),
            filepath_pdf_harvard: row.text("filepath_pdf_harvard"),
        })
    }

    fn key(&self) -> i64 {
        self.id
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Int(Some(self.id)),
            SqlValue::text(&self.judges),
            SqlValue::text(&self.date_created),
            SqlValue::text(&self.date_modified),
            SqlValue::text(&self.date_filed),
            SqlValue::Text(self.slug.clone()),
            SqlValue::text(&self.case_name_short),
            SqlValue::text(&self.case_name),
            SqlValue::text(&self.case_name_full),
            SqlValue::text(&self.scdb_id),
            SqlValue::text(&self.source),
            SqlValue::text(&self.procedural_history),
            SqlValue::text(&self.attorneys),
            SqlValue::text(&self.nature_of_suit),
            SqlValue::text(&self.posture),
            SqlValue::text(&self.syllabus),
            SqlValue::Int(Some(self.citation_count)),
            SqlValue::text(&self.precedential_status),
            SqlValue::Text(self.date_blocked.clone()),
            SqlValue::Bool(self.blocked),
            SqlValue::Int(Some(self.docket_id)),
            SqlValue::Int(self.scdb_decision_direction),
            SqlValue::Int(self.scdb_votes_majority),
            SqlValue::Int(self.scdb_votes_minority),
            SqlValue::Bool(self.date_filed_is_approximate),
            SqlValue::text(&self.correction),
            SqlValue::text(&self.cross_reference),
            SqlValue::text(&self.disposition),
            SqlValue::text(&self.filepath_json_harvard),
            SqlValue::text(&self.headnotes),
            SqlValue::text(&self.history),
            SqlValue::text(&self.other_dates),
            SqlValue::text(&self.summary),
            SqlValue::text(&self.arguments),
            SqlValue::text(&self.headmatter),
            SqlValue::text(&self.filepath_pdf_harvard),
        ]
    }
}

impl fmt::Display for OpinionCluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OpinionCluster{{id={}, docket_id={}, date_filed={}, slug={}, case_name=\"{}\"}}",
            self.id,
            self.docket_id,
            self.date_filed,
            opt(&self.slug),
            preview(&self.case_name)
        )
    }
}
