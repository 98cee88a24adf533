//! State machine test for the sync engine.
//!
//! The reference is a pair of plain maps (local cache and remote) keyed by
//! asset id. The system under test is a `SyncEngine` over `MemoryStore` and
//! `FakeRemote`. After every step both must agree, which covers: pending
//! records survive any pull, a failed push changes nothing, and a lost ack
//! leads to a harmless resend.

use proptest::prelude::*;
use proptest_state_machine::{ReferenceStateMachine, StateMachineTest};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::engine::SyncEngine;
use crate::storage::{LocalStore, MemoryStore};
use crate::testing::{sample_pole, FakeRemote};

#[derive(Debug, Clone, PartialEq)]
struct LocalRecord {
    name: String,
    pending: bool,
}

#[derive(Debug, Clone, Default)]
struct ReferenceState {
    local: BTreeMap<i64, LocalRecord>,
    remote: BTreeMap<i64, String>,
}

#[derive(Debug, Clone)]
enum SyncTransition {
    /// Field edit, written locally as pending
    Capture { id: i64, name: String },
    PushAcknowledged,
    PushRejected,
    /// The remote applied the batch but the ack never arrived
    PushAckLost,
    /// Another client changed the remote
    RemoteUpsert { id: i64, name: String },
    RemoteDelete { id: i64 },
    Pull,
}

fn asset_ids() -> impl Strategy<Value = i64> {
    1i64..8
}

fn names() -> impl Strategy<Value = String> {
    "[a-z]{1,6}"
}

impl ReferenceState {
    fn flush_pending_to_remote(&mut self) {
        for (id, record) in &self.local {
            if record.pending {
                self.remote.insert(*id, record.name.clone());
            }
        }
    }
}

impl ReferenceStateMachine for ReferenceState {
    type State = Self;
    type Transition = SyncTransition;

    fn init_state() -> BoxedStrategy<Self::State> {
        Just(ReferenceState::default()).boxed()
    }

    fn transitions(_state: &Self::State) -> BoxedStrategy<Self::Transition> {
        prop_oneof![
            3 => (asset_ids(), names()).prop_map(|(id, name)| SyncTransition::Capture { id, name }),
            2 => Just(SyncTransition::PushAcknowledged),
            1 => Just(SyncTransition::PushRejected),
            1 => Just(SyncTransition::PushAckLost),
            2 => (asset_ids(), names())
                .prop_map(|(id, name)| SyncTransition::RemoteUpsert { id, name }),
            1 => asset_ids().prop_map(|id| SyncTransition::RemoteDelete { id }),
            2 => Just(SyncTransition::Pull),
        ]
        .boxed()
    }

    fn apply(mut state: Self::State, transition: &Self::Transition) -> Self::State {
        match transition {
            SyncTransition::Capture { id, name } => {
                state.local.insert(
                    *id,
                    LocalRecord {
                        name: name.clone(),
                        pending: true,
                    },
                );
            }
            SyncTransition::PushAcknowledged => {
                state.flush_pending_to_remote();
                for record in state.local.values_mut() {
                    record.pending = false;
                }
            }
            SyncTransition::PushRejected => {}
            SyncTransition::PushAckLost => state.flush_pending_to_remote(),
            SyncTransition::RemoteUpsert { id, name } => {
                state.remote.insert(*id, name.clone());
            }
            SyncTransition::RemoteDelete { id } => {
                state.remote.remove(id);
            }
            SyncTransition::Pull => {
                state.local.retain(|_, record| record.pending);
                for (id, name) in &state.remote {
                    state.local.entry(*id).or_insert_with(|| LocalRecord {
                        name: name.clone(),
                        pending: false,
                    });
                }
            }
        }
        state
    }
}

struct SyncEngineTest {
    runtime: tokio::runtime::Runtime,
    store: Arc<MemoryStore>,
    remote: Arc<FakeRemote>,
    engine: SyncEngine,
}

impl SyncEngineTest {
    fn local_snapshot(&self) -> BTreeMap<i64, LocalRecord> {
        let assets = self.runtime.block_on(self.store.get_all()).unwrap();
        assets
            .into_iter()
            .map(|asset| {
                let id = asset.id.key().parse().unwrap();
                let record = LocalRecord {
                    name: asset.name().unwrap_or_default().to_string(),
                    pending: asset.pending_sync,
                };
                (id, record)
            })
            .collect()
    }

    fn remote_snapshot(&self) -> BTreeMap<i64, String> {
        self.remote
            .remote_assets()
            .into_iter()
            .map(|asset| {
                let id = asset.id.key().parse().unwrap();
                (id, asset.name().unwrap_or_default().to_string())
            })
            .collect()
    }
}

impl StateMachineTest for SyncEngineTest {
    type SystemUnderTest = Self;
    type Reference = ReferenceState;

    fn init_test(
        _ref_state: &<Self::Reference as ReferenceStateMachine>::State,
    ) -> Self::SystemUnderTest {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let store = Arc::new(MemoryStore::new());
        let remote = Arc::new(FakeRemote::new());
        let engine = SyncEngine::new(store.clone(), remote.clone());

        SyncEngineTest {
            runtime,
            store,
            remote,
            engine,
        }
    }

    fn apply(
        state: Self::SystemUnderTest,
        _ref_state: &<Self::Reference as ReferenceStateMachine>::State,
        transition: <Self::Reference as ReferenceStateMachine>::Transition,
    ) -> Self::SystemUnderTest {
        let runtime = &state.runtime;
        match transition {
            SyncTransition::Capture { id, name } => {
                runtime
                    .block_on(state.store.put(sample_pole(id, &name, true)))
                    .unwrap();
            }
            SyncTransition::PushAcknowledged => {
                runtime.block_on(state.engine.push()).unwrap();
            }
            SyncTransition::PushRejected => {
                state.remote.set_fail_push(true);
                runtime.block_on(state.engine.push()).unwrap();
                state.remote.set_fail_push(false);
            }
            SyncTransition::PushAckLost => {
                state.remote.set_drop_ack(true);
                runtime.block_on(state.engine.push()).unwrap();
                state.remote.set_drop_ack(false);
            }
            SyncTransition::RemoteUpsert { id, name } => {
                state.remote.insert(sample_pole(id, &name, false));
            }
            SyncTransition::RemoteDelete { id } => {
                state.remote.remove(&fieldsync_api::AssetId::Int(id));
            }
            SyncTransition::Pull => {
                runtime.block_on(state.engine.pull()).unwrap();
            }
        }
        state
    }

    fn check_invariants(
        state: &Self::SystemUnderTest,
        ref_state: &<Self::Reference as ReferenceStateMachine>::State,
    ) {
        assert_eq!(
            state.local_snapshot(),
            ref_state.local,
            "local cache diverged from the model"
        );
        assert_eq!(
            state.remote_snapshot(),
            ref_state.remote,
            "remote diverged from the model"
        );
        assert!(!state.engine.is_pushing(), "push flag left set");
    }
}

proptest_state_machine::prop_state_machine! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        failure_persistence: None,
        .. ProptestConfig::default()
    })]

    #[test]
    fn test_sync_engine_state_machine(sequential 1..30 => SyncEngineTest);
}
