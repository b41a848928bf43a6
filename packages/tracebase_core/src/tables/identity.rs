use super::{compare_by_name, copy_fields_solution, flow_up_create_solution, trace_solution};
use crate::pair::{BaselinePair, Side};
use crate::problem::Problem;
use crate::record::{Record, RecordType};
use crate::table::{label, Table};
use std::cmp::Ordering;
use uuid::Uuid;

/// The child baseline's identity traces to the parent item it decomposes
pub struct IdentityTable;

impl Table for IdentityTable {
    fn record_type(&self) -> RecordType {
        RecordType::Identity
    }

    fn trace_type(&self) -> Option<RecordType> {
        Some(RecordType::Item)
    }

    fn compare(&self, a: &Record, b: &Record) -> Ordering {
        compare_by_name(a, b)
    }

    fn get_untraced_child_problems(
        &self,
        pair: &BaselinePair,
        untraced: &[&Record],
    ) -> Vec<Problem> {
        untraced
            .iter()
            .map(|identity| {
                let name = identity.get_or_empty("name");
                let matches: Vec<&Record> = pair
                    .parent()
                    .find_by_type(RecordType::Item)
                    .filter(|item| !name.is_empty() && item.get_or_empty("name") == name)
                    .collect();
                let problem = Problem::new(
                    RecordType::Identity,
                    format!("{} does not trace to a parent item", label(identity)),
                )
                .for_record(identity.id());

                match matches.as_slice() {
                    [item] => problem.on_load(trace_solution(
                        format!("trace identity to {}", label(item)),
                        identity.id(),
                        item.id(),
                        RecordType::Item,
                    )),
                    _ => problem.flow_up(flow_up_create_solution(
                        format!("create parent item '{}'", name),
                        identity.id(),
                        Uuid::new_v4(),
                        RecordType::Item,
                        &["name"],
                        None,
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
            .filter(|identity| identity.get("name") != parent.get("name"))
            .map(|identity| {
                Problem::new(
                    RecordType::Identity,
                    format!(
                        "{} is named differently from its parent {}",
                        label(identity),
                        label(parent)
                    ),
                )
                .for_record(identity.id())
                .flow_down(copy_fields_solution(
                    "rename identity after parent item",
                    Side::Parent,
                    parent.id(),
                    identity.id(),
                    &["name"],
                ))
                .flow_up(copy_fields_solution(
                    "rename parent item after identity",
                    Side::Child,
                    identity.id(),
                    parent.id(),
                    &["name"],
                ))
            })
            .collect()
    }
}
