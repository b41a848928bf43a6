use super::{
    compare_by_name, copy_fields_solution, flow_up_create_solution, has_child_trace,
    remove_solution, trace_solution,
};
use crate::pair::{BaselinePair, Side};
use crate::problem::{Problem, Solution};
use crate::record::{Record, RecordId, RecordType};
use crate::table::{label, Table};
use std::cmp::Ordering;
use uuid::Uuid;

/// Fields an external item shares with its parent counterpart
const SHARED_FIELDS: &[&str] = &["name", "color"];

pub(crate) fn is_external(item: &Record) -> bool {
    item.get("external") == Some("true")
}

/// Items are the components of a baseline. External items in the child
/// trace to sibling components in the parent.
pub struct ItemTable;

impl Table for ItemTable {
    fn record_type(&self) -> RecordType {
        RecordType::Item
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
        let system = pair.system_item().map(Record::id);
        untraced
            .iter()
            .filter(|item| is_external(item))
            .map(|item| {
                let name = item.get_or_empty("name");
                let matches: Vec<&Record> = pair
                    .parent()
                    .find_by_type(RecordType::Item)
                    .filter(|candidate| {
                        !name.is_empty()
                            && candidate.get_or_empty("name") == name
                            && Some(candidate.id()) != system
                            && !has_child_trace(pair, candidate.id(), RecordType::Item)
                    })
                    .collect();
                let problem = Problem::new(
                    RecordType::Item,
                    format!("External {} is not traced to the parent baseline", label(item)),
                )
                .for_record(item.id());

                match matches.as_slice() {
                    [parent] => problem.on_load(trace_solution(
                        format!("trace to parent {}", label(parent)),
                        item.id(),
                        parent.id(),
                        RecordType::Item,
                    )),
                    _ => problem
                        .flow_up(flow_up_create_solution(
                            format!("create parent item '{}'", name),
                            item.id(),
                            Uuid::new_v4(),
                            RecordType::Item,
                            SHARED_FIELDS,
                            None,
                        ))
                        .flow_down(remove_solution(
                            format!("remove {}", label(item)),
                            Side::Child,
                            item.id(),
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
        let mut problems = Vec::new();

        if children.len() > 1 {
            // Children arrive in identifier order; the first one is kept
            let extra: Vec<RecordId> = children[1..].iter().map(|c| c.id()).collect();
            let mut problem = Problem::new(
                RecordType::Item,
                format!("{} child items trace to {}", children.len(), label(parent)),
            );
            for child in children {
                problem = problem.for_record(child.id());
            }
            problems.push(problem.flow_down(remove_extra_traces(extra)));
        }

        for child in children {
            for fields in SHARED_FIELDS.chunks(1) {
                let field = fields[0];
                if child.get(field) == parent.get(field) {
                    continue;
                }
                problems.push(
                    Problem::new(
                        RecordType::Item,
                        format!("{} differs from its parent in {}", label(child), field),
                    )
                    .for_record(child.id())
                    .flow_down(copy_fields_solution(
                        format!("copy {} from parent", field),
                        Side::Parent,
                        parent.id(),
                        child.id(),
                        fields,
                    ))
                    .flow_up(copy_fields_solution(
                        format!("copy {} to parent", field),
                        Side::Child,
                        child.id(),
                        parent.id(),
                        fields,
                    )),
                );
            }
        }
        problems
    }
}

fn remove_extra_traces(extra: Vec<RecordId>) -> Solution {
    Solution::new("remove duplicate child items", move |pair, _| {
        extra.iter().fold(pair.clone(), |next, id| {
            next.update(Side::Child, |child| ItemTable.remove(child, *id))
        })
    })
}
