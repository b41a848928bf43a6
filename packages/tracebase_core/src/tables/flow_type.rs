use super::{
    compare_by_name, copy_fields_solution, flow_up_create_solution, remove_solution,
    trace_solution,
};
use crate::pair::{BaselinePair, Side};
use crate::problem::Problem;
use crate::record::{Record, RecordType};
use crate::table::{label, Table};
use std::cmp::Ordering;
use uuid::Uuid;

/// Kinds of flow exchanged between items, unique by name
pub struct FlowTypeTable;

impl Table for FlowTypeTable {
    fn record_type(&self) -> RecordType {
        RecordType::FlowType
    }

    fn trace_type(&self) -> Option<RecordType> {
        Some(RecordType::FlowType)
    }

    fn compare(&self, a: &Record, b: &Record) -> Ordering {
        compare_by_name(a, b)
    }

    fn unique_keys(&self) -> Vec<Vec<&'static str>> {
        vec![vec!["name"]]
    }

    fn get_untraced_child_problems(
        &self,
        pair: &BaselinePair,
        untraced: &[&Record],
    ) -> Vec<Problem> {
        untraced
            .iter()
            .map(|flow_type| {
                let name = flow_type.get_or_empty("name");
                let matches: Vec<&Record> = pair
                    .parent()
                    .find_by_type(RecordType::FlowType)
                    .filter(|p| !name.is_empty() && p.get_or_empty("name") == name)
                    .collect();
                let problem = Problem::new(
                    RecordType::FlowType,
                    format!("{} is not traced to the parent baseline", label(flow_type)),
                )
                .for_record(flow_type.id());

                match matches.as_slice() {
                    [parent] => problem.on_load(trace_solution(
                        format!("trace to parent {}", label(parent)),
                        flow_type.id(),
                        parent.id(),
                        RecordType::FlowType,
                    )),
                    _ => problem
                        .flow_up(flow_up_create_solution(
                            format!("create parent flow type '{}'", name),
                            flow_type.id(),
                            Uuid::new_v4(),
                            RecordType::FlowType,
                            &["name"],
                            None,
                        ))
                        .flow_down(remove_solution(
                            format!("remove {}", label(flow_type)),
                            Side::Child,
                            flow_type.id(),
                        )),
                }
            })
            .collect()
    }

    fn get_trace_problems(
        &self,
        _pair: &BaselinePair,
        parent: &Record,
        children: &[&Record],
    ) -> Vec<Problem> {
        children
            .iter()
            .filter(|child| child.get("name") != parent.get("name"))
            .map(|child| {
                Problem::new(
                    RecordType::FlowType,
                    format!("{} is named differently from its parent {}", label(child), label(parent)),
                )
                .for_record(child.id())
                .flow_down(copy_fields_solution(
                    "rename after parent flow type",
                    Side::Parent,
                    parent.id(),
                    child.id(),
                    &["name"],
                ))
                .flow_up(copy_fields_solution(
                    "rename parent flow type",
                    Side::Child,
                    child.id(),
                    parent.id(),
                    &["name"],
                ))
            })
            .collect()
    }
}
