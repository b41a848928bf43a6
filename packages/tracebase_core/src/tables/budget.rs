use super::budget_allocation::{format_amount, parse_amount};
use super::{
    compare_by_name, copy_fields_solution, flow_down_create_solution, flow_up_create_solution,
    has_child_trace, is_traced, remove_solution, trace_solution,
};
use crate::baseline::Baseline;
use crate::pair::{BaselinePair, Side};
use crate::problem::{Problem, Solution};
use crate::record::{Record, RecordId, RecordType, RefField};
use crate::table::{label, Table};
use std::cmp::Ordering;
use uuid::Uuid;

const KEY_FIELDS: &[&str] = &["name", "unit"];

/// Allocation totals closer than this are considered equal
pub const AMOUNT_TOLERANCE: f64 = 1e-9;

fn same_key(a: &Record, b: &Record) -> bool {
    !a.get_or_empty("name").is_empty()
        && KEY_FIELDS.iter().all(|field| a.get(field) == b.get(field))
}

/// Total of the allocations a budget hands out in `baseline`
fn allocated(baseline: &Baseline, budget: RecordId) -> f64 {
    baseline
        .find_reverse_typed(budget, RecordType::BudgetAllocation)
        .filter(|a| a.container() == Some(budget))
        .map(parse_amount)
        .sum()
}

/// The parent allocation of `budget` to the system item
fn system_allocation(baseline: &Baseline, budget: RecordId, system: RecordId) -> Option<&Record> {
    baseline
        .find_reverse_typed(budget, RecordType::BudgetAllocation)
        .find(|a| a.container() == Some(budget) && a.view_of() == Some(system))
}

/// Sum of what every child budget tracing to `parent` allocates
fn child_total(pair: &BaselinePair, parent: RecordId) -> f64 {
    pair.child()
        .find_reverse_by(parent, RefField::Trace)
        .filter(|b| b.record_type() == RecordType::Budget)
        .map(|b| allocated(pair.child(), b.id()))
        .sum()
}

/// Budgets are unique by name and unit. A child budget traces to the
/// parent budget it refines, and its allocations must add up to what the
/// parent gives the system item.
pub struct BudgetTable;

impl Table for BudgetTable {
    fn record_type(&self) -> RecordType {
        RecordType::Budget
    }

    fn trace_type(&self) -> Option<RecordType> {
        Some(RecordType::Budget)
    }

    fn compare(&self, a: &Record, b: &Record) -> Ordering {
        compare_by_name(a, b)
    }

    fn unique_keys(&self) -> Vec<Vec<&'static str>> {
        vec![KEY_FIELDS.to_vec()]
    }

    fn get_untraced_child_problems(
        &self,
        pair: &BaselinePair,
        untraced: &[&Record],
    ) -> Vec<Problem> {
        untraced
            .iter()
            .map(|budget| {
                let matches: Vec<&Record> = pair
                    .parent()
                    .find_by_type(RecordType::Budget)
                    .filter(|p| {
                        same_key(budget, p) && !has_child_trace(pair, p.id(), RecordType::Budget)
                    })
                    .collect();
                let problem = Problem::new(
                    RecordType::Budget,
                    format!("{} is not traced to the parent baseline", label(budget)),
                )
                .for_record(budget.id());

                match matches.as_slice() {
                    [parent] => problem.on_load(trace_solution(
                        format!("trace to parent {}", label(parent)),
                        budget.id(),
                        parent.id(),
                        RecordType::Budget,
                    )),
                    _ => problem
                        .flow_up(flow_up_create_solution(
                            format!("create parent {}", label(budget)),
                            budget.id(),
                            Uuid::new_v4(),
                            RecordType::Budget,
                            KEY_FIELDS,
                            None,
                        ))
                        .flow_down(remove_solution(
                            format!("remove {}", label(budget)),
                            Side::Child,
                            budget.id(),
                        )),
                }
            })
            .collect()
    }

    fn get_untraced_parent_problems(
        &self,
        pair: &BaselinePair,
        untraced: &[&Record],
    ) -> Vec<Problem> {
        untraced
            .iter()
            .filter(|parent| {
                !pair.child().find_by_type(RecordType::Budget).any(|child| {
                    !is_traced(pair, child, RecordType::Budget) && same_key(child, parent)
                })
            })
            .map(|parent| {
                Problem::new(
                    RecordType::Budget,
                    format!("{} has not been flowed down", label(parent)),
                )
                .for_record(parent.id())
                .flow_down(flow_down_create_solution(
                    format!("create child {}", label(parent)),
                    parent.id(),
                    Uuid::new_v4(),
                    RecordType::Budget,
                    KEY_FIELDS,
                ))
                .flow_up(remove_solution(
                    format!("remove parent {}", label(parent)),
                    Side::Parent,
                    parent.id(),
                ))
            })
            .collect()
    }

    fn get_trace_problems(
        &self,
        pair: &BaselinePair,
        parent: &Record,
        children: &[&Record],
    ) -> Vec<Problem> {
        let mut problems: Vec<Problem> = children
            .iter()
            .filter(|child| !same_key(child, parent))
            .map(|child| {
                Problem::new(
                    RecordType::Budget,
                    format!(
                        "{} differs from its parent {} in name or unit",
                        label(child),
                        label(parent)
                    ),
                )
                .for_record(child.id())
                .flow_down(copy_fields_solution(
                    "copy name and unit from parent",
                    Side::Parent,
                    parent.id(),
                    child.id(),
                    KEY_FIELDS,
                ))
                .flow_up(copy_fields_solution(
                    "copy name and unit to parent",
                    Side::Child,
                    child.id(),
                    parent.id(),
                    KEY_FIELDS,
                ))
            })
            .collect();

        if let Some(system) = pair.system_item() {
            let total = child_total(pair, parent.id());
            let given = system_allocation(pair.parent(), parent.id(), system.id())
                .map(parse_amount)
                .unwrap_or(0.0);
            if (total - given).abs() > AMOUNT_TOLERANCE {
                let mut problem = Problem::new(
                    RecordType::Budget,
                    format!(
                        "{}: child allocations total {} but the parent allocates {} to {}",
                        label(parent),
                        format_amount(total),
                        format_amount(given),
                        label(system)
                    ),
                )
                .for_record(parent.id());
                for child in children {
                    problem = problem.for_record(child.id());
                }
                problems.push(problem.flow_up(set_system_allocation(
                    parent.id(),
                    system.id(),
                    Uuid::new_v4(),
                )));
            }
        }
        problems
    }
}

/// Make the parent's allocation to the system item equal the child total
fn set_system_allocation(budget: RecordId, system: RecordId, new_id: RecordId) -> Solution {
    Solution::new("update parent allocation to the child total", move |pair, timestamp| {
        if pair.parent().get_typed(budget, RecordType::Budget).is_none()
            || pair.parent().get_typed(system, RecordType::Item).is_none()
        {
            return pair.clone();
        }
        let amount = format_amount(child_total(pair, budget));
        let allocation = match system_allocation(pair.parent(), budget, system) {
            Some(existing) => existing.as_builder().set("amount", amount),
            None => Record::builder_with_id(new_id, RecordType::BudgetAllocation)
                .set("amount", amount)
                .container(Some(budget))
                .view_of(Some(system)),
        };
        pair.with_parent(pair.parent().add(allocation.build(timestamp)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::Direction;
    use chrono::Utc;

    fn budget(name: &str, unit: &str) -> Record {
        Record::create(RecordType::Budget, [("name", name), ("unit", unit)])
    }

    fn allocation(budget: &Record, item: &Record, amount: &str) -> Record {
        Record::builder(RecordType::BudgetAllocation)
            .set("amount", amount)
            .container(Some(budget.id()))
            .view_of(Some(item.id()))
            .build(Utc::now())
    }

    #[test]
    fn test_matching_budget_traces_on_load() {
        let parent = budget("Mass", "kg");
        let child = budget("Mass", "kg");
        let pair = BaselinePair::new(Baseline::new().add(parent.clone()), Baseline::new().add(child.clone()));

        let problems = BudgetTable.get_problems(&pair);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].is_auto_fixable());

        let fixed = BudgetTable.on_load_autofix(&pair, Utc::now());
        assert_eq!(fixed.child().get(child.id()).unwrap().trace(), Some(parent.id()));
        assert!(BudgetTable.get_problems(&fixed).is_empty());
    }

    #[test]
    fn test_unitless_duplicates_collapse_on_change() {
        let pair = BaselinePair::new(
            Baseline::new(),
            Baseline::from_records([budget("Mass", ""), budget("Mass", ""), budget("Power", "")]),
        );
        let fixed = BudgetTable.on_change_autofix(&pair, Utc::now());
        let names: Vec<&str> = fixed
            .child()
            .find_by_type(RecordType::Budget)
            .filter_map(|b| b.get("name"))
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"Mass") && names.contains(&"Power"));
    }

    #[test]
    fn test_different_unit_does_not_match() {
        let pair = BaselinePair::new(
            Baseline::new().add(budget("Mass", "kg")),
            Baseline::new().add(budget("Mass", "lb")),
        );
        let problems = BudgetTable.get_problems(&pair);
        // The child cannot trace and the parent has no child
        assert_eq!(problems.len(), 2);
        assert!(problems.iter().all(|p| !p.is_auto_fixable()));
    }

    #[test]
    fn test_parent_budget_flows_down() {
        let parent = budget("Power", "W");
        let pair = BaselinePair::new(Baseline::new().add(parent.clone()), Baseline::new());

        let problems = BudgetTable.get_problems(&pair);
        assert_eq!(problems.len(), 1);
        let fixed = problems[0].solution(Direction::FlowDown).unwrap().apply(&pair, Utc::now());
        let child = fixed.child().find_by_type(RecordType::Budget).next().unwrap();
        assert_eq!(child.trace(), Some(parent.id()));
        assert_eq!(child.get("unit"), Some("W"));
        assert!(BudgetTable.get_problems(&fixed).is_empty());
    }

    #[test]
    fn test_allocation_sum_mismatch_flows_up() {
        let system = Record::create(RecordType::Item, [("name", "Engine")]);
        let parent = budget("Mass", "kg");
        let identity = Record::builder(RecordType::Identity)
            .set("name", "Engine")
            .trace(Some(system.id()))
            .build(Utc::now());
        let piston = Record::create(RecordType::Item, [("name", "Piston")]);
        let crank = Record::create(RecordType::Item, [("name", "Crank")]);
        let child = budget("Mass", "kg")
            .as_builder()
            .trace(Some(parent.id()))
            .build(Utc::now());

        let pair = BaselinePair::new(
            Baseline::from_records([
                system.clone(),
                parent.clone(),
                allocation(&parent, &system, "3"),
            ]),
            Baseline::from_records([
                identity,
                piston.clone(),
                crank.clone(),
                child.clone(),
                allocation(&child, &piston, "2"),
                allocation(&child, &crank, "2.5"),
            ]),
        );

        let problems = BudgetTable.get_problems(&pair);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].description.contains("total 4.5"));

        let fixed = problems[0].solution(Direction::FlowUp).unwrap().apply(&pair, Utc::now());
        let updated = system_allocation(fixed.parent(), parent.id(), system.id()).unwrap();
        assert_eq!(updated.get("amount"), Some("4.5"));
        assert!(BudgetTable.get_problems(&fixed).is_empty());
    }

    #[test]
    fn test_missing_parent_allocation_is_created() {
        let system = Record::create(RecordType::Item, [("name", "Engine")]);
        let parent = budget("Mass", "kg");
        let identity = Record::builder(RecordType::Identity)
            .trace(Some(system.id()))
            .build(Utc::now());
        let piston = Record::create(RecordType::Item, [("name", "Piston")]);
        let child = budget("Mass", "kg")
            .as_builder()
            .trace(Some(parent.id()))
            .build(Utc::now());
        let pair = BaselinePair::new(
            Baseline::from_records([system.clone(), parent.clone()]),
            Baseline::from_records([identity, piston.clone(), child.clone(), allocation(&child, &piston, "7")]),
        );

        let problems = BudgetTable.get_problems(&pair);
        assert_eq!(problems.len(), 1);
        let solution = problems[0].solution(Direction::FlowUp).unwrap();
        let fixed = solution.apply(&pair, Utc::now());
        assert_eq!(
            system_allocation(fixed.parent(), parent.id(), system.id()).and_then(|a| a.get("amount")),
            Some("7")
        );
        assert_eq!(solution.apply(&fixed, Utc::now()), fixed);
    }
}
