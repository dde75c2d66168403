//! Stateful property testing for the record store.
//!
//! Uses proptest-state-machine to exercise interleavings of adds, patches,
//! removals, and clears against a reference model. The model tracks:
//!
//! - Item placement and insertion order
//! - Temp record counts
//! - Idempotent-delete semantics
//! - Full-clear behavior

use proptest::prelude::*;
use proptest_state_machine::{ReferenceStateMachine, StateMachineTest, prop_state_machine};
use serde_json::json;

use rockpool_store::{Params, RecordId, RecordKey, Store, StoreOptions};

/// Operations that can be performed on the store.
#[derive(Debug, Clone)]
pub enum StoreOperation {
    /// Add (or re-add) a confirmed record.
    Add { id: i64, name: u8 },
    /// Add a record with no identity.
    AddTemp { name: u8 },
    /// Patch a confirmed record's name.
    Patch { id: i64, name: u8 },
    /// Remove a confirmed record.
    Remove { id: i64 },
    /// Clear everything.
    Clear,
}

/// Reference model: insertion-ordered items plus a temp count.
#[derive(Clone, Debug, Default)]
pub struct StoreModel {
    /// (id, name) pairs in insertion order.
    pub items: Vec<(i64, u8)>,
    /// Number of temp records.
    pub temps: usize,
}

impl StoreModel {
    fn position(&self, id: i64) -> Option<usize> {
        self.items.iter().position(|(item_id, _)| *item_id == id)
    }
}

impl ReferenceStateMachine for StoreModel {
    type State = Self;
    type Transition = StoreOperation;

    fn init_state() -> BoxedStrategy<Self::State> {
        Just(Self::default()).boxed()
    }

    fn transitions(_state: &Self::State) -> BoxedStrategy<Self::Transition> {
        // A small id space provokes merges, repeat removals, and patches
        // of absent records.
        prop_oneof![
            4 => (0i64..8, any::<u8>()).prop_map(|(id, name)| StoreOperation::Add { id, name }),
            1 => any::<u8>().prop_map(|name| StoreOperation::AddTemp { name }),
            2 => (0i64..8, any::<u8>()).prop_map(|(id, name)| StoreOperation::Patch { id, name }),
            2 => (0i64..8).prop_map(|id| StoreOperation::Remove { id }),
            1 => Just(StoreOperation::Clear),
        ]
        .boxed()
    }

    fn apply(mut state: Self::State, transition: &Self::Transition) -> Self::State {
        match transition {
            StoreOperation::Add { id, name } => match state.position(*id) {
                // merge updates in place, keeping insertion order
                Some(pos) => state.items[pos].1 = *name,
                None => state.items.push((*id, *name)),
            },
            StoreOperation::AddTemp { .. } => state.temps += 1,
            StoreOperation::Patch { id, name } => {
                if let Some(pos) = state.position(*id) {
                    state.items[pos].1 = *name;
                }
            }
            StoreOperation::Remove { id } => {
                state.items.retain(|(item_id, _)| item_id != id);
            }
            StoreOperation::Clear => {
                state.items.clear();
                state.temps = 0;
            }
        }
        state
    }
}

pub struct StoreTest;

impl StateMachineTest for StoreTest {
    type SystemUnderTest = Store;
    type Reference = StoreModel;

    fn init_test(
        _ref_state: &<Self::Reference as ReferenceStateMachine>::State,
    ) -> Self::SystemUnderTest {
        Store::new(StoreOptions::default())
    }

    fn apply(
        store: Self::SystemUnderTest,
        _ref_state: &<Self::Reference as ReferenceStateMachine>::State,
        transition: StoreOperation,
    ) -> Self::SystemUnderTest {
        match transition {
            StoreOperation::Add { id, name } => {
                store
                    .add_to_store(json!({"id": id, "name": name}))
                    .expect("add must succeed");
            }
            StoreOperation::AddTemp { name } => {
                let added = store
                    .add_to_store(json!({"name": name}))
                    .expect("temp add must succeed")
                    .remove(0);
                assert!(added.temp_id().is_some(), "temp records get a temp id");
            }
            StoreOperation::Patch { id, name } => {
                let key = RecordKey::Id(RecordId::Int(id));
                // patching an absent record is a typed not-found error
                let _ = store.patch_in_store(&key, {
                    let mut data = rockpool_store::Fields::new();
                    data.insert("name".to_string(), json!(name));
                    data
                });
            }
            StoreOperation::Remove { id } => {
                // idempotent whether or not the record exists
                store.remove_from_store(&RecordKey::Id(RecordId::Int(id)));
            }
            StoreOperation::Clear => store.clear_all(),
        }
        store
    }

    fn check_invariants(
        store: &Self::SystemUnderTest,
        ref_state: &<Self::Reference as ReferenceStateMachine>::State,
    ) {
        assert_eq!(store.item_count(), ref_state.items.len());
        assert_eq!(store.temp_count(), ref_state.temps);

        // items come back in insertion order with the latest field values
        let found = store
            .find_in_store(&Params::with_query(rockpool_store::Query::new()))
            .expect("find must succeed");
        assert_eq!(found.total, ref_state.items.len());

        let actual: Vec<(i64, u8)> = found
            .data
            .iter()
            .map(|r| {
                (
                    r.get("id").unwrap().as_i64().unwrap(),
                    r.get("name").unwrap().as_u64().unwrap() as u8,
                )
            })
            .collect();
        assert_eq!(actual, ref_state.items);

        // point lookups agree with the model
        for (id, name) in &ref_state.items {
            let record = store.get_by_id(*id).expect("model item must be stored");
            assert_eq!(record.get("name"), Some(&json!(name)));
        }
    }
}

prop_state_machine! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        ..ProptestConfig::default()
    })]

    #[test]
    fn store_matches_reference_model(sequential 1..40 => StoreTest);
}
