use clap::{ArgGroup, Parser};

use crate::{
    error::{AppError, AppResult},
    services::Maintenance,
    utils::{parse_date, WindowSelector},
};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "helpdesk-insights",
    version,
    about = "Harvest helpdesk conversations and enrich them with transcripts, location and AI categorization"
)]
#[command(group(ArgGroup::new("window").args(["date", "days", "from"])))]
#[command(group(ArgGroup::new("maintenance").args(["reset_keep_ids", "wipe"])))]
pub struct Cli {
    /// Single UTC day to harvest (YYYY-MM-DD)
    pub date: Option<String>,

    /// Harvest the trailing N days up to now
    #[arg(long)]
    pub days: Option<u32>,

    /// Start of an explicit day range (YYYY-MM-DD), used with --to
    #[arg(long, requires = "to")]
    pub from: Option<String>,

    /// End of an explicit day range (YYYY-MM-DD), inclusive
    #[arg(long, requires = "from")]
    pub to: Option<String>,

    /// Only categorize transcripts already stored; no helpdesk calls
    #[arg(long, conflicts_with = "window")]
    pub analyze_only: bool,

    /// Process at most N records in the enrichment phase
    #[arg(long)]
    pub limit: Option<usize>,

    /// Null every enrichment field but keep the conversation ids
    #[arg(long, conflicts_with_all = ["window", "analyze_only"])]
    pub reset_keep_ids: bool,

    /// Delete every stored conversation
    #[arg(long, conflicts_with_all = ["window", "analyze_only"])]
    pub wipe: bool,

    /// Confirm a destructive maintenance operation
    #[arg(long)]
    pub yes: bool,
}

impl Cli {
    /// Window selection; defaults to the trailing day.
    pub fn window_selector(&self) -> AppResult<WindowSelector> {
        if let Some(date) = &self.date {
            return Ok(WindowSelector::Day(parse_date(date)?));
        }
        if let Some(days) = self.days {
            return Ok(WindowSelector::TrailingDays(days));
        }
        match (&self.from, &self.to) {
            (Some(from), Some(to)) => Ok(WindowSelector::Range {
                from: parse_date(from)?,
                to: parse_date(to)?,
            }),
            (None, None) => Ok(WindowSelector::default()),
            _ => Err(AppError::Validation("--from and --to must be given together".to_string())),
        }
    }

    /// Requested maintenance operation, refusing without `--yes`.
    pub fn maintenance(&self) -> AppResult<Option<Maintenance>> {
        let action = if self.wipe {
            Maintenance::Wipe
        } else if self.reset_keep_ids {
            Maintenance::ResetKeepIds
        } else {
            return Ok(None);
        };

        if !self.yes {
            return Err(AppError::Validation(format!(
                "{action:?} is destructive; re-run with --yes to confirm"
            )));
        }
        Ok(Some(action))
    }

    pub fn limit(&self) -> AppResult<Option<usize>> {
        match self.limit {
            Some(0) => Err(AppError::Validation("--limit must be at least 1".to_string())),
            other => Ok(other),
        }
    }
}
