use crate::baseline::Baseline;
use crate::record::{Record, RecordType};
use crate::table::{merge_prefer_left, Table};
use chrono::{DateTime, Utc};

/// Numeric `amount` of an allocation; absent or unparsable amounts count as zero
pub fn parse_amount(record: &Record) -> f64 {
    match record.get("amount") {
        None => 0.0,
        Some(text) => text.trim().parse().unwrap_or_else(|_| {
            log::warn!("ignoring unparsable amount {:?} on {}", text, record.id());
            0.0
        }),
    }
}

/// Amounts are written with at most nine decimals and no trailing zeros
pub fn format_amount(amount: f64) -> String {
    let text = format!("{:.9}", amount);
    if !text.contains('.') {
        return text;
    }
    match text.trim_end_matches('0').trim_end_matches('.') {
        "-0" => "0".to_string(),
        trimmed => trimmed.to_string(),
    }
}

/// The share of a budget (`container`) given to one item (`viewOf`)
pub struct BudgetAllocationTable;

impl Table for BudgetAllocationTable {
    fn record_type(&self) -> RecordType {
        RecordType::BudgetAllocation
    }

    fn unique_keys(&self) -> Vec<Vec<&'static str>> {
        vec![vec!["container", "viewOf"]]
    }

    /// Two allocations of one budget to one item add up
    fn merge(
        &self,
        _context: &Baseline,
        timestamp: DateTime<Utc>,
        left: &Record,
        right: &Record,
    ) -> Record {
        let total = parse_amount(left) + parse_amount(right);
        merge_prefer_left(RecordType::BudgetAllocation, timestamp, left, right)
            .as_builder()
            .set("amount", format_amount(total))
            .build(timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pair::BaselinePair;

    fn allocation(budget: &Record, item: &Record, amount: &str) -> Record {
        Record::builder(RecordType::BudgetAllocation)
            .set("amount", amount)
            .container(Some(budget.id()))
            .view_of(Some(item.id()))
            .build(Utc::now())
    }

    #[test]
    fn test_amount_parsing() {
        let budget = Record::create(RecordType::Budget, [("name", "Mass")]);
        let item = Record::create(RecordType::Item, [("name", "Pump")]);
        assert_eq!(parse_amount(&allocation(&budget, &item, " 2.5 ")), 2.5);
        assert_eq!(parse_amount(&allocation(&budget, &item, "heavy")), 0.0);
        assert_eq!(parse_amount(&allocation(&budget, &item, "")), 0.0);
        assert_eq!(format_amount(4.0), "4");
    }

    #[test]
    fn test_format_amount_hides_float_noise() {
        assert_eq!(format_amount(0.1 + 0.2), "0.3");
        assert_eq!(format_amount(120.0), "120");
        assert_eq!(format_amount(-2.25), "-2.25");
        assert_eq!(format_amount(-1e-12), "0");
        assert_eq!(format_amount(f64::INFINITY), "inf");
    }

    #[test]
    fn test_duplicate_allocations_are_summed() {
        let budget = Record::create(RecordType::Budget, [("name", "Mass")]);
        let item = Record::create(RecordType::Item, [("name", "Pump")]);
        let pair = BaselinePair::new(
            Baseline::new(),
            Baseline::from_records([
                budget.clone(),
                item.clone(),
                allocation(&budget, &item, "1.5"),
                allocation(&budget, &item, "2"),
            ]),
        );

        let fixed = BudgetAllocationTable.on_change_autofix(&pair, Utc::now());
        let remaining: Vec<_> = fixed
            .child()
            .find_by_type(RecordType::BudgetAllocation)
            .collect();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].get("amount"), Some("3.5"));
    }
}
