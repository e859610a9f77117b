use chrono::NaiveDate;
use cot_etl_data::CotRecord;
use std::collections::BTreeSet;

/// Keeps records whose date is not in `seen`, preserving input order.
#[must_use]
pub fn filter_unseen(records: Vec<CotRecord>, seen: &BTreeSet<NaiveDate>) -> Vec<CotRecord> {
    records
        .into_iter()
        .filter(|record| !seen.contains(&record.date))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cot_etl_core::ReportType;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(d: NaiveDate) -> CotRecord {
        CotRecord::new(d, "058643", ReportType::DisaggregatedFut)
    }

    #[test]
    fn test_only_new_dates_pass() {
        let fetched = vec![record(date(2024, 1, 2)), record(date(2024, 1, 16))];
        let seen: BTreeSet<_> = [date(2024, 1, 2), date(2024, 1, 9)].into_iter().collect();

        let kept = filter_unseen(fetched, &seen);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].date, date(2024, 1, 16));
    }

    #[test]
    fn test_empty_history_keeps_everything_in_order() {
        let fetched = vec![record(date(2024, 1, 16)), record(date(2024, 1, 2))];
        let kept = filter_unseen(fetched.clone(), &BTreeSet::new());
        assert_eq!(kept, fetched);
    }
}
