//! Structured run report.
//!
//! Stages record cleaning decisions into a [`ReportBuilder`] as they act;
//! `finish` freezes it into a [`RunReport`] which the caller serializes or
//! renders as the human-readable cleaning log.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::history::TIMESTAMP_FORMAT;
use crate::model::EntityKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Dangling foreign key; the row is quarantined and excluded.
    ReferentialViolation,
    /// Field value breaks a business rule; the row is quarantined and corrected.
    DomainViolation,
    /// Structural oddity flagged for review; the row is left untouched.
    CapacityWarning,
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReferentialViolation => write!(f, "referential_violation"),
            Self::DomainViolation => write!(f, "domain_violation"),
            Self::CapacityWarning => write!(f, "capacity_warning"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleaningEntry {
    pub row_id: i64,
    pub entity: EntityKind,
    pub table: String,
    pub kind: ViolationKind,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordCount {
    pub entity: EntityKind,
    pub table: String,
    pub before: usize,
    pub after: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistorySummary {
    pub updated: usize,
    pub deleted: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_at: String,
    pub entries: Vec<CleaningEntry>,
    pub counts: Vec<RecordCount>,
    pub history: HistorySummary,
}

#[derive(Debug)]
pub struct ReportBuilder {
    run_at: NaiveDateTime,
    entries: Vec<CleaningEntry>,
    counts: Vec<RecordCount>,
    history: HistorySummary,
}

impl ReportBuilder {
    pub fn new(run_at: NaiveDateTime) -> Self {
        Self {
            run_at,
            entries: Vec::new(),
            counts: Vec::new(),
            history: HistorySummary::default(),
        }
    }

    pub fn record_violation(
        &mut self,
        entity: EntityKind,
        row_id: i64,
        kind: ViolationKind,
        reason: impl Into<String>,
    ) {
        self.entries.push(CleaningEntry {
            row_id,
            entity,
            table: entity.display_name().to_string(),
            kind,
            reason: reason.into(),
        });
    }

    pub fn record_count(&mut self, entity: EntityKind, before: usize, after: usize) {
        self.counts.push(RecordCount {
            entity,
            table: entity.display_name().to_string(),
            before,
            after,
        });
    }

    pub fn record_history(&mut self, updated: usize, deleted: usize) {
        self.history.updated += updated;
        self.history.deleted += deleted;
    }

    pub fn entries(&self) -> &[CleaningEntry] {
        &self.entries
    }

    pub fn finish(self) -> RunReport {
        RunReport {
            run_at: self.run_at.format(TIMESTAMP_FORMAT).to_string(),
            entries: self.entries,
            counts: self.counts,
            history: self.history,
        }
    }
}

impl RunReport {
    pub fn entries_for(&self, entity: EntityKind) -> impl Iterator<Item = &CleaningEntry> {
        self.entries.iter().filter(move |e| e.entity == entity)
    }

    pub fn violation_count(&self, kind: ViolationKind) -> usize {
        self.entries.iter().filter(|e| e.kind == kind).count()
    }

    pub fn count_for(&self, entity: EntityKind) -> Option<&RecordCount> {
        self.counts.iter().find(|c| c.entity == entity)
    }

    /// The cleaning log: one grid of cleaning decisions, one grid of
    /// before/after record counts.
    pub fn render_text(&self) -> String {
        let cleaning: Vec<Vec<String>> = self
            .entries
            .iter()
            .map(|e| vec![e.row_id.to_string(), e.table.clone(), e.reason.clone()])
            .collect();
        let counts: Vec<Vec<String>> = self
            .counts
            .iter()
            .map(|c| vec![c.table.clone(), c.before.to_string(), c.after.to_string()])
            .collect();

        let mut out = String::new();
        out.push_str("Data Cleaning Log\n");
        out.push_str(&render_grid(&["Table ID", "Table Name", "Cleaning Reason"], &cleaning));
        out.push_str("\nRecord Comparison\n");
        out.push_str(&render_grid(&["Table Name", "Old Count", "New Count"], &counts));
        out
    }
}

/// Boxed grid with a `=` rule under the header row.
fn render_grid(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let mut out = grid_rule(&widths, '-');
    out.push_str(&grid_line(&widths, headers.iter().copied()));
    out.push_str(&grid_rule(&widths, '='));
    for row in rows {
        out.push_str(&grid_line(&widths, row.iter().map(String::as_str)));
        out.push_str(&grid_rule(&widths, '-'));
    }
    out
}

fn grid_rule(widths: &[usize], fill: char) -> String {
    let mut line = String::from("+");
    for w in widths {
        line.extend(std::iter::repeat(fill).take(w + 2));
        line.push('+');
    }
    line.push('\n');
    line
}

fn grid_line<'a>(widths: &[usize], cells: impl Iterator<Item = &'a str>) -> String {
    let mut line = String::from("|");
    for (w, cell) in widths.iter().zip(cells) {
        let pad = w - cell.chars().count();
        line.push(' ');
        line.push_str(cell);
        line.extend(std::iter::repeat(' ').take(pad + 1));
        line.push('|');
    }
    line.push('\n');
    line
}
