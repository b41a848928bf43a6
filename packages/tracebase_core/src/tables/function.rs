use super::item::is_external;
use super::{
    compare_by_name, copy_fields_solution, flow_up_create_solution, is_traced, remove_solution,
    trace_solution,
};
use crate::pair::{BaselinePair, Side};
use crate::problem::Problem;
use crate::record::{Record, RecordId, RecordType};
use crate::table::{label, Table};
use std::cmp::Ordering;
use uuid::Uuid;

/// Functions are contained in items. A child function traces to the
/// parent function it helps realize: one of the system item's functions
/// for internal items, or a function of the external item's counterpart.
pub struct FunctionTable;

/// Parent item whose functions a child function may trace to
fn parent_container(pair: &BaselinePair, function: &Record) -> Option<RecordId> {
    let item = pair
        .child()
        .get_typed(function.container()?, RecordType::Item)?;
    if is_external(item) {
        item.trace()
            .filter(|id| pair.parent().get_typed(*id, RecordType::Item).is_some())
    } else {
        pair.system_item().map(Record::id)
    }
}

fn candidates<'a>(pair: &'a BaselinePair, container: RecordId, name: &str) -> Vec<&'a Record> {
    if name.is_empty() {
        return Vec::new();
    }
    pair.parent()
        .find_reverse_typed(container, RecordType::Function)
        .filter(|f| f.container() == Some(container) && f.get_or_empty("name") == name)
        .collect()
}

impl Table for FunctionTable {
    fn record_type(&self) -> RecordType {
        RecordType::Function
    }

    fn trace_type(&self) -> Option<RecordType> {
        Some(RecordType::Function)
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
            .map(|function| {
                let name = function.get_or_empty("name");
                let remove = remove_solution(
                    format!("remove {}", label(function)),
                    Side::Child,
                    function.id(),
                );
                let problem = Problem::new(
                    RecordType::Function,
                    format!("{} is not traced to a parent function", label(function)),
                )
                .for_record(function.id());

                let Some(container) = parent_container(pair, function) else {
                    return problem.flow_down(remove);
                };
                match candidates(pair, container, name).as_slice() {
                    [parent] => problem.on_load(trace_solution(
                        format!("trace to parent {}", label(parent)),
                        function.id(),
                        parent.id(),
                        RecordType::Function,
                    )),
                    [] => problem
                        .flow_up(flow_up_create_solution(
                            format!("create parent function '{}'", name),
                            function.id(),
                            Uuid::new_v4(),
                            RecordType::Function,
                            &["name"],
                            Some(container),
                        ))
                        .flow_down(remove),
                    _ => problem.flow_down(remove),
                }
            })
            .collect()
    }

    fn get_untraced_parent_problems(
        &self,
        pair: &BaselinePair,
        untraced: &[&Record],
    ) -> Vec<Problem> {
        let Some(system) = pair.system_item().map(Record::id) else {
            return Vec::new();
        };
        untraced
            .iter()
            .filter(|parent| parent.container() == Some(system))
            .filter(|parent| {
                // A matching untraced child will be traced by its own fix
                !pair.child().find_by_type(RecordType::Function).any(|child| {
                    !is_traced(pair, child, RecordType::Function)
                        && child.get("name") == parent.get("name")
                        && parent_container(pair, child) == Some(system)
                })
            })
            .map(|parent| {
                Problem::new(
                    RecordType::Function,
                    format!("System {} is not allocated to any child item", label(parent)),
                )
                .for_record(parent.id())
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
        _pair: &BaselinePair,
        parent: &Record,
        children: &[&Record],
    ) -> Vec<Problem> {
        children
            .iter()
            .filter(|child| child.get("name") != parent.get("name"))
            .map(|child| {
                Problem::new(
                    RecordType::Function,
                    format!("{} is named differently from its parent {}", label(child), label(parent)),
                )
                .for_record(child.id())
                .flow_down(copy_fields_solution(
                    "rename after parent function",
                    Side::Parent,
                    parent.id(),
                    child.id(),
                    &["name"],
                ))
                .flow_up(copy_fields_solution(
                    "rename parent function",
                    Side::Child,
                    child.id(),
                    parent.id(),
                    &["name"],
                ))
            })
            .collect()
    }
}
