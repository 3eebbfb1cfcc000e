//! Rule listing: pagination, filtering, and table rendering.
//!
//! Listing walks every page the scheduler returns, keeps only rules bound to
//! the scheduler function with a payload this tool understands, and joins
//! each surviving row with the instance's current `Name` tag. The shared
//! scheduler namespace makes the target binding, not the rule name, the
//! authority on ownership.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use crate::directory::InstanceDirectory;
use crate::rules::{RuleStatus, RuleStore, RuleSummary, ScheduleAction};

use super::{ReconcileError, RuleReconciler};

const EMPTY_CELL: &str = "-";

const HEADERS: [&str; 6] = [
    "RULE",
    "INSTANCE ID",
    "INSTANCE NAME",
    "ACTION",
    "SCHEDULE",
    "STATE",
];

/// Filters applied to a rule listing.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ListFilter {
    /// Keep only rules targeting this instance id.
    pub instance_id: Option<String>,
    /// Keep only rules performing this action.
    pub action: Option<ScheduleAction>,
}

impl ListFilter {
    /// Derives the action filter from the start/stop listing flags.
    ///
    /// Exactly one raised flag narrows the listing to that action; both or
    /// neither leaves the listing unfiltered by action.
    #[must_use]
    pub const fn action_from_flags(start: bool, stop: bool) -> Option<ScheduleAction> {
        match (start, stop) {
            (true, false) => Some(ScheduleAction::Start),
            (false, true) => Some(ScheduleAction::Stop),
            _ => None,
        }
    }

    fn keeps(&self, instance_id: &str, action: ScheduleAction) -> bool {
        if let Some(wanted) = self.instance_id.as_deref()
            && wanted != instance_id
        {
            return false;
        }
        if let Some(wanted) = self.action
            && wanted != action
        {
            return false;
        }
        true
    }
}

/// One row of the rule listing.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RuleRow {
    /// Rule name.
    pub name: String,
    /// Instance the rule acts on.
    pub instance_id: String,
    /// Instance `Name` tag, when one exists.
    pub instance_name: Option<String>,
    /// Action the rule performs.
    pub action: ScheduleAction,
    /// Schedule expression, when the rule carries one.
    pub schedule: Option<String>,
    /// Rule status, when reported.
    pub status: Option<RuleStatus>,
}

impl<S, D> RuleReconciler<S, D>
where
    S: RuleStore,
    D: InstanceDirectory,
{
    /// Lists rules bound to the scheduler function.
    ///
    /// Pagination continues until the scheduler reports no further token.
    /// Rules without a target, bound to another consumer, or carrying an
    /// unreadable payload are skipped. Instance names are resolved at most
    /// once per instance within the call and never cached beyond it.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Store`] when a scheduler call fails and
    /// [`ReconcileError::Directory`] when a name lookup fails.
    pub async fn list(
        &self,
        filter: &ListFilter,
    ) -> Result<Vec<RuleRow>, ReconcileError<S::Error>> {
        let mut rows = Vec::new();
        let mut names = BTreeMap::new();
        let mut token: Option<String> = None;
        loop {
            let page = self
                .store
                .list_rules(token.as_deref())
                .await
                .map_err(ReconcileError::Store)?;
            for summary in &page.rules {
                if let Some(row) = self.row_for(summary, filter, &mut names).await? {
                    rows.push(row);
                }
            }
            token = page.next_token;
            if token.is_none() {
                break;
            }
        }
        Ok(rows)
    }

    async fn row_for(
        &self,
        summary: &RuleSummary,
        filter: &ListFilter,
        names: &mut BTreeMap<String, Option<String>>,
    ) -> Result<Option<RuleRow>, ReconcileError<S::Error>> {
        let Some(target) = self
            .store
            .rule_target(&summary.name)
            .await
            .map_err(ReconcileError::Store)?
        else {
            return Ok(None);
        };
        if target.arn != self.store.function_arn() {
            return Ok(None);
        }
        let Some(payload) = target.payload else {
            return Ok(None);
        };
        if !filter.keeps(&payload.instance_id, payload.action) {
            return Ok(None);
        }

        let instance_name = match names.get(&payload.instance_id).cloned() {
            Some(cached) => cached,
            None => {
                let resolved = self.directory.name_for_id(&payload.instance_id).await?;
                names.insert(payload.instance_id.clone(), resolved.clone());
                resolved
            }
        };

        Ok(Some(RuleRow {
            name: summary.name.clone(),
            instance_id: payload.instance_id,
            instance_name,
            action: payload.action,
            schedule: summary.schedule.clone(),
            status: summary.status,
        }))
    }
}

/// Fixed-width table rendering of rule rows.
///
/// Rendering always ends with a newline; an empty listing renders a single
/// placeholder line.
#[derive(Clone, Debug)]
pub struct RuleTable<'a> {
    rows: &'a [RuleRow],
}

impl<'a> RuleTable<'a> {
    /// Wraps rows for display.
    #[must_use]
    pub const fn new(rows: &'a [RuleRow]) -> Self {
        Self { rows }
    }

    fn cells(row: &RuleRow) -> [String; 6] {
        [
            row.name.clone(),
            row.instance_id.clone(),
            row.instance_name
                .clone()
                .unwrap_or_else(|| EMPTY_CELL.to_owned()),
            row.action.to_string(),
            row.schedule
                .clone()
                .unwrap_or_else(|| EMPTY_CELL.to_owned()),
            row.status
                .map_or_else(|| EMPTY_CELL.to_owned(), |status| status.to_string()),
        ]
    }
}

impl Display for RuleTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rows.is_empty() {
            return writeln!(f, "(no rules matched)");
        }

        let rendered: Vec<[String; 6]> = self.rows.iter().map(Self::cells).collect();

        // Column widths: at least the header, stretched by the widest cell.
        let mut widths: [usize; 6] = HEADERS.map(str::len);
        for cells in &rendered {
            for (width, cell) in widths.iter_mut().zip(cells) {
                *width = (*width).max(cell.len());
            }
        }

        for (i, (header, width)) in HEADERS.iter().zip(widths).enumerate() {
            if i > 0 {
                write!(f, " | ")?;
            }
            write!(f, "{header:<width$}")?;
        }
        writeln!(f)?;

        for (i, width) in widths.iter().enumerate() {
            if i > 0 {
                write!(f, "-+-")?;
            }
            write!(f, "{}", "-".repeat(*width))?;
        }
        writeln!(f)?;

        for cells in &rendered {
            for (i, (cell, width)) in cells.iter().zip(widths).enumerate() {
                if i > 0 {
                    write!(f, " | ")?;
                }
                write!(f, "{cell:<width$}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
