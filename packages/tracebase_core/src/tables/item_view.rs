use crate::pair::{BaselinePair, Side};
use crate::problem::{Problem, Solution};
use crate::record::{Record, RecordId, RecordType, RefField};
use crate::table::{dangling_reference_problems, label, Table};
use uuid::Uuid;

/// Drawing position of one item; every item has exactly one view
pub struct ItemViewTable;

impl Table for ItemViewTable {
    fn record_type(&self) -> RecordType {
        RecordType::ItemView
    }

    fn unique_keys(&self) -> Vec<Vec<&'static str>> {
        vec![vec!["viewOf"]]
    }

    fn get_integrity_problems(&self, pair: &BaselinePair) -> Vec<Problem> {
        let mut problems = dangling_reference_problems(pair, RecordType::ItemView);
        for side in [Side::Parent, Side::Child] {
            let baseline = pair.get(side);
            for item in baseline.find_by_type(RecordType::Item) {
                let has_view = baseline
                    .find_reverse_by(item.id(), RefField::ViewOf)
                    .any(|r| r.record_type() == RecordType::ItemView);
                if has_view {
                    continue;
                }
                problems.push(
                    Problem::new(
                        RecordType::ItemView,
                        format!("{} in {:?} baseline has no view", label(item), side),
                    )
                    .for_record(item.id())
                    .on_load(create_view(side, item.id(), Uuid::new_v4())),
                );
            }
        }
        problems
    }
}

fn create_view(side: Side, item_id: RecordId, view_id: RecordId) -> Solution {
    Solution::new("place item at the drawing origin", move |pair, timestamp| {
        let baseline = pair.get(side);
        let viewed = baseline
            .find_reverse_by(item_id, RefField::ViewOf)
            .any(|r| r.record_type() == RecordType::ItemView);
        if viewed || baseline.get_typed(item_id, RecordType::Item).is_none() {
            return pair.clone();
        }
        let view = Record::builder_with_id(view_id, RecordType::ItemView)
            .set("x", "0")
            .set("y", "0")
            .view_of(Some(item_id))
            .build(timestamp);
        pair.with(side, baseline.add(view))
    })
}
