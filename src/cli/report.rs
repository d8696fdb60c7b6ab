use std::{io::Write, path::Path};

use anyhow::{bail, Result};
use chrono::{Duration, Local, NaiveDate};
use clap::Parser;

use crate::{
    storage::{json_store::JsonFileStore, Categories, StateStore},
    tracker::{
        domain::Domain,
        history::{DailyHistory, DomainTotals},
        settings::Category,
    },
    utils::{
        percentage::{seconds_percentage, Percentage},
        time::{date_to_key, format_duration},
    },
};

#[derive(Debug, Parser)]
pub struct ReportCommand {
    #[arg(
        long,
        short,
        help = "Last day of the report in YYYY-MM-DD format. Defaults to today"
    )]
    date: Option<NaiveDate>,
    #[arg(
        long,
        short = 'n',
        default_value_t = 1,
        help = "Number of days to show, ending with --date"
    )]
    days: u32,
    #[arg(
        short = 'p',
        long = "percentage",
        default_value = "1",
        help = "Hide domains below this share of the day"
    )]
    min_percentage: Percentage,
}

#[derive(Debug, PartialEq)]
pub struct DomainUsage {
    pub domain: Domain,
    pub seconds: u64,
    pub share: Percentage,
    pub category: Category,
}

#[derive(Debug, PartialEq)]
pub struct DaySummary {
    pub date: NaiveDate,
    pub total: u64,
    pub usages: Vec<DomainUsage>,
}

/// Domains of one day, largest first, without the ones under `min_percentage`.
pub fn summarize_day(
    date: NaiveDate,
    totals: Option<&DomainTotals>,
    categories: &Categories,
    min_percentage: Percentage,
) -> DaySummary {
    let total = totals.map(|t| t.values().sum()).unwrap_or(0);
    let mut usages = totals
        .into_iter()
        .flatten()
        .map(|(domain, seconds)| DomainUsage {
            domain: domain.clone(),
            seconds: *seconds,
            share: seconds_percentage(*seconds, total),
            category: categories.get(domain).copied().unwrap_or_default(),
        })
        .filter(|usage| usage.share >= min_percentage)
        .collect::<Vec<_>>();
    usages.sort_by(|a, b| b.seconds.cmp(&a.seconds).then_with(|| a.domain.cmp(&b.domain)));

    DaySummary {
        date,
        total,
        usages,
    }
}

pub fn summarize(
    history: &DailyHistory,
    categories: &Categories,
    end: NaiveDate,
    days: u32,
    min_percentage: Percentage,
) -> Vec<DaySummary> {
    (0..days)
        .rev()
        .filter_map(|offset| end.checked_sub_signed(Duration::days(offset.into())))
        .map(|date| summarize_day(date, history.get(&date), categories, min_percentage))
        .collect()
}

pub fn render(out: &mut impl Write, summaries: &[DaySummary]) -> Result<()> {
    for summary in summaries {
        writeln!(
            out,
            "{}  total {}",
            date_to_key(summary.date),
            format_duration(Duration::seconds(summary.total as i64))
        )?;
        if summary.usages.is_empty() {
            writeln!(out, "  no activity")?;
        }
        for usage in &summary.usages {
            writeln!(
                out,
                "  {:>6.1}%  {:>10}  {:<13}  {}",
                *usage.share,
                format_duration(Duration::seconds(usage.seconds as i64)),
                usage.category.to_string(),
                usage.domain
            )?;
        }
    }
    Ok(())
}

pub async fn process_report_command(dir: &Path, command: ReportCommand) -> Result<()> {
    if command.days == 0 {
        bail!("--days must be at least 1");
    }
    let store = JsonFileStore::new(dir.to_path_buf())?;
    let state = store.load().await?;

    let end = command.date.unwrap_or_else(|| Local::now().date_naive());
    let summaries = summarize(
        &state.history,
        &state.categories,
        end,
        command.days,
        command.min_percentage,
    );
    render(&mut std::io::stdout().lock(), &summaries)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{render, summarize, summarize_day};
    use crate::{
        storage::Categories,
        tracker::{
            history::{DailyHistory, DomainTotals},
            settings::Category,
        },
        utils::percentage::Percentage,
    };

    const DAY: NaiveDate = NaiveDate::from_ymd_opt(2018, 7, 4).unwrap();

    fn totals() -> DomainTotals {
        DomainTotals::from([
            ("a.com".into(), 600),
            ("b.com".into(), 300),
            ("c.com".into(), 5),
        ])
    }

    #[test]
    fn test_summary_sorts_and_filters() {
        let categories = Categories::from([("b.com".into(), Category::Social)]);
        let summary = summarize_day(
            DAY,
            Some(&totals()),
            &categories,
            Percentage::new_opt(1.).unwrap(),
        );

        assert_eq!(summary.total, 905);
        let domains = summary
            .usages
            .iter()
            .map(|u| u.domain.as_ref())
            .collect::<Vec<_>>();
        assert_eq!(domains, vec!["a.com", "b.com"]);
        assert_eq!(summary.usages[1].category, Category::Social);
        assert_eq!(summary.usages[0].category, Category::Other);
    }

    #[test]
    fn test_days_without_history_are_empty() {
        let history = DailyHistory::from([(DAY, totals())]);
        let summaries = summarize(
            &history,
            &Categories::new(),
            NaiveDate::from_ymd_opt(2018, 7, 5).unwrap(),
            2,
            Percentage::new_opt(0.).unwrap(),
        );
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].date, DAY);
        assert_eq!(summaries[0].usages.len(), 3);
        assert_eq!(summaries[1].total, 0);
    }

    #[test]
    fn test_render() {
        let summary = summarize_day(
            DAY,
            Some(&totals()),
            &Categories::new(),
            Percentage::new_opt(50.).unwrap(),
        );
        let empty = summarize_day(
            NaiveDate::from_ymd_opt(2018, 7, 5).unwrap(),
            None,
            &Categories::new(),
            Percentage::new_opt(1.).unwrap(),
        );
        let mut out = Vec::new();
        render(&mut out, &[summary, empty]).unwrap();
        let out = String::from_utf8(out).unwrap();

        let lines = out.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "2018-07-04  total 15m5s");
        assert!(lines[1].ends_with(&format!("{:<13}  a.com", "other")));
        assert!(lines[1].contains("66.3%"));
        assert_eq!(lines[2], "2018-07-05  total 0s");
        assert_eq!(lines[3], "  no activity");
    }
}
