//! Domain tables
//!
//! One stateless [`Table`] per record type, listed statically. Each table
//! owns its own trace-matching rule; the helpers below build the narrow,
//! idempotent solutions those rules hand out.

mod budget;
mod budget_allocation;
mod flow_type;
mod function;
mod identity;
mod item;
mod item_view;

pub use budget::BudgetTable;
pub use budget_allocation::{format_amount, parse_amount, BudgetAllocationTable};
pub use flow_type::FlowTypeTable;
pub use function::FunctionTable;
pub use identity::IdentityTable;
pub use item::ItemTable;
pub use item_view::ItemViewTable;

use crate::pair::{BaselinePair, Side};
use crate::problem::Solution;
use crate::record::{Record, RecordId, RecordType, RefField};
use crate::table::Table;
use std::cmp::Ordering;

static IDENTITY: IdentityTable = IdentityTable;
static ITEM: ItemTable = ItemTable;
static ITEM_VIEW: ItemViewTable = ItemViewTable;
static FUNCTION: FunctionTable = FunctionTable;
static FLOW_TYPE: FlowTypeTable = FlowTypeTable;
static BUDGET: BudgetTable = BudgetTable;
static BUDGET_ALLOCATION: BudgetAllocationTable = BudgetAllocationTable;

impl RecordType {
    /// The table singleton for this type
    pub fn table(self) -> &'static dyn Table {
        match self {
            RecordType::Identity => &IDENTITY,
            RecordType::Item => &ITEM,
            RecordType::ItemView => &ITEM_VIEW,
            RecordType::Function => &FUNCTION,
            RecordType::FlowType => &FLOW_TYPE,
            RecordType::Budget => &BUDGET,
            RecordType::BudgetAllocation => &BUDGET_ALLOCATION,
        }
    }
}

/// Every table, in the order repairs run
pub fn all() -> Vec<&'static dyn Table> {
    RecordType::ALL.iter().map(|t| t.table()).collect()
}

pub(crate) fn compare_by_name(a: &Record, b: &Record) -> Ordering {
    a.get_or_empty("name")
        .cmp(b.get_or_empty("name"))
        .then_with(|| a.id().cmp(&b.id()))
}

/// Whether `record`'s trace resolves to a parent record of `trace_type`
pub(crate) fn is_traced(pair: &BaselinePair, record: &Record, trace_type: RecordType) -> bool {
    record
        .trace()
        .is_some_and(|id| pair.parent().get_typed(id, trace_type).is_some())
}

/// Whether any child record of `record_type` traces to `parent_id`
pub(crate) fn has_child_trace(
    pair: &BaselinePair,
    parent_id: RecordId,
    record_type: RecordType,
) -> bool {
    pair.child()
        .find_reverse_by(parent_id, RefField::Trace)
        .any(|child| child.record_type() == record_type)
}

/// Set a child's trace, unless it already resolves or either record is gone
pub(crate) fn trace_solution(
    description: impl Into<String>,
    child_id: RecordId,
    parent_id: RecordId,
    trace_type: RecordType,
) -> Solution {
    Solution::new(description, move |pair, timestamp| {
        let Some(child) = pair.child().get(child_id) else {
            return pair.clone();
        };
        if is_traced(pair, child, trace_type)
            || pair.parent().get_typed(parent_id, trace_type).is_none()
        {
            return pair.clone();
        }
        let updated = child.as_builder().trace(Some(parent_id)).build(timestamp);
        pair.with_child(pair.child().add(updated))
    })
}

/// Copy plain fields from a record on one side to its counterpart on the other
pub(crate) fn copy_fields_solution(
    description: impl Into<String>,
    from: Side,
    from_id: RecordId,
    to_id: RecordId,
    fields: &'static [&'static str],
) -> Solution {
    Solution::new(description, move |pair, timestamp| {
        let to = from.other();
        let (Some(source), Some(target)) = (pair.get(from).get(from_id), pair.get(to).get(to_id))
        else {
            return pair.clone();
        };
        let updated = fields
            .iter()
            .fold(target.as_builder(), |builder, field| {
                builder.set(*field, source.get_or_empty(field))
            })
            .build(timestamp);
        pair.with(to, pair.get(to).add(updated))
    })
}

/// Remove a record through its table's cascading mutator
pub(crate) fn remove_solution(description: impl Into<String>, side: Side, id: RecordId) -> Solution {
    Solution::new(description, move |pair, _| match pair.get(side).get(id) {
        Some(record) => {
            let table = record.record_type().table();
            pair.with(side, table.remove(pair.get(side), id))
        }
        None => pair.clone(),
    })
}

/// Create a parent counterpart for an untraced child and trace the child to it
///
/// `parent_id` is chosen when the problem is found so repeated application
/// converges on one record.
pub(crate) fn flow_up_create_solution(
    description: impl Into<String>,
    child_id: RecordId,
    parent_id: RecordId,
    parent_type: RecordType,
    fields: &'static [&'static str],
    container: Option<RecordId>,
) -> Solution {
    Solution::new(description, move |pair, timestamp| {
        let Some(child) = pair.child().get(child_id) else {
            return pair.clone();
        };
        if is_traced(pair, child, parent_type)
            || container.is_some_and(|c| !pair.parent().contains(c))
        {
            return pair.clone();
        }
        let parent = fields
            .iter()
            .fold(
                Record::builder_with_id(parent_id, parent_type),
                |builder, field| builder.set(*field, child.get_or_empty(field)),
            )
            .container(container)
            .build(timestamp);
        let child = child.as_builder().trace(Some(parent_id)).build(timestamp);
        BaselinePair::new(pair.parent().add(parent), pair.child().add(child))
    })
}

/// Create a child counterpart traced to a parent record nothing traces to yet
pub(crate) fn flow_down_create_solution(
    description: impl Into<String>,
    parent_id: RecordId,
    child_id: RecordId,
    child_type: RecordType,
    fields: &'static [&'static str],
) -> Solution {
    Solution::new(description, move |pair, timestamp| {
        let Some(parent) = pair.parent().get(parent_id) else {
            return pair.clone();
        };
        if has_child_trace(pair, parent_id, child_type) {
            return pair.clone();
        }
        let child = fields
            .iter()
            .fold(
                Record::builder_with_id(child_id, child_type),
                |builder, field| builder.set(*field, parent.get_or_empty(field)),
            )
            .trace(Some(parent_id))
            .build(timestamp);
        pair.with_child(pair.child().add(child))
    })
}
