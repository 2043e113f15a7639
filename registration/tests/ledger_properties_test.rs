//! Property tests for the inventory ledger.
//!
//! Random sequences of holds, commits and releases are replayed against the
//! ledger and a plain model side by side. After every step the counters must
//! match the model and never exceed stock.

#![allow(clippy::unwrap_used)]

use proptest::prelude::*;
use racepay_core::store::RegistrationStore;
use racepay_core::types::{Gender, HoldLine, HoldToken, InventoryKey, Size, merge_lines};
use racepay_registration::{Ledger, LedgerError};
use racepay_testing::InMemoryRegistrationStore;
use racepay_testing::mocks::epoch;
use racepay_testing::strategies::hold_request;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_test::block_on;

#[derive(Debug, Clone)]
enum Op {
    Hold(Vec<HoldLine>),
    Commit(usize),
    Release(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => hold_request().prop_map(Op::Hold),
        2 => any::<usize>().prop_map(Op::Commit),
        2 => any::<usize>().prop_map(Op::Release),
    ]
}

fn all_keys() -> Vec<InventoryKey> {
    Size::ALL
        .into_iter()
        .flat_map(|size| Gender::ALL.into_iter().map(move |gender| InventoryKey::new(size, gender)))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModelHold {
    Held,
    Committed,
    Released,
}

#[derive(Debug, Default)]
struct Model {
    stock: BTreeMap<InventoryKey, u32>,
    reserved: BTreeMap<InventoryKey, u32>,
    assigned: BTreeMap<InventoryKey, u32>,
    holds: Vec<(HoldToken, Vec<HoldLine>, ModelHold)>,
}

impl Model {
    fn available(&self, key: InventoryKey) -> u32 {
        self.stock[&key] - self.reserved[&key] - self.assigned[&key]
    }

    fn fits(&self, lines: &[HoldLine]) -> bool {
        lines.iter().all(|line| line.count <= self.available(line.key))
    }

    fn apply(&mut self, index: usize, to: ModelHold) {
        let (_, lines, state) = &mut self.holds[index];
        if *state != ModelHold::Held {
            return;
        }
        *state = to;
        for line in lines.iter() {
            *self.reserved.get_mut(&line.key).unwrap() -= line.count;
            if to == ModelHold::Committed {
                *self.assigned.get_mut(&line.key).unwrap() += line.count;
            }
        }
    }
}

async fn replay(stock: Vec<u32>, ops: Vec<Op>) -> Result<(), TestCaseError> {
    let store = InMemoryRegistrationStore::new();
    let ledger = Ledger::new(Arc::new(store.clone()));
    let mut model = Model::default();

    for (key, units) in all_keys().into_iter().zip(stock) {
        store.configure_stock(key, units).await.unwrap();
        model.stock.insert(key, units);
        model.reserved.insert(key, 0);
        model.assigned.insert(key, 0);
    }

    for op in ops {
        match op {
            Op::Hold(lines) => {
                let merged = merge_lines(lines.clone());
                let expected = model.fits(&merged);
                match ledger.hold(lines, epoch()).await {
                    Ok(hold) => {
                        prop_assert!(expected, "hold granted beyond availability");
                        prop_assert_eq!(&hold.lines, &merged);
                        for line in &merged {
                            *model.reserved.get_mut(&line.key).unwrap() += line.count;
                        }
                        model.holds.push((hold.token, merged, ModelHold::Held));
                    },
                    Err(LedgerError::InsufficientStock { .. }) => {
                        prop_assert!(!expected, "hold refused although stock sufficed");
                    },
                    Err(other) => prop_assert!(false, "unexpected error {other}"),
                }
            },
            Op::Commit(pick) if !model.holds.is_empty() => {
                let index = pick % model.holds.len();
                let (token, _, state) = model.holds[index].clone();
                let result = ledger.commit(token).await;
                if state == ModelHold::Released {
                    prop_assert_eq!(result, Err(LedgerError::AlreadyReleased(token)));
                } else {
                    prop_assert!(result.is_ok());
                }
                model.apply(index, ModelHold::Committed);
            },
            Op::Release(pick) if !model.holds.is_empty() => {
                let index = pick % model.holds.len();
                let token = model.holds[index].0;
                prop_assert!(ledger.release(token).await.is_ok());
                model.apply(index, ModelHold::Released);
            },
            Op::Commit(_) | Op::Release(_) => {},
        }

        for item in ledger.items().await.unwrap() {
            prop_assert!(item.reserved + item.assigned <= item.stock, "oversold {}", item.key);
            prop_assert_eq!(item.reserved, model.reserved[&item.key]);
            prop_assert_eq!(item.assigned, model.assigned[&item.key]);
        }
    }

    let open = model.holds.iter().filter(|(_, _, state)| *state == ModelHold::Held).count();
    prop_assert_eq!(store.open_hold_count(), open);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// INVARIANT: reserved + assigned never exceeds stock, and both counters
    /// always equal the sum of the holds in the matching state.
    #[test]
    fn counters_follow_hold_states(
        stock in prop::collection::vec(0u32..=5, 12),
        ops in prop::collection::vec(op(), 1..40),
    ) {
        block_on(replay(stock, ops))?;
    }
}

/// Releasing everything returns every row to its configured stock.
#[test]
fn releasing_every_hold_restores_availability() {
    block_on(async {
        let store = InMemoryRegistrationStore::new();
        let ledger = Ledger::new(Arc::new(store.clone()));
        for key in all_keys() {
            store.configure_stock(key, 3).await.unwrap();
        }

        let mut tokens = Vec::new();
        for key in all_keys() {
            let hold = ledger.hold(vec![HoldLine::new(key, 2)], epoch()).await.unwrap();
            tokens.push(hold.token);
        }
        for token in tokens {
            ledger.release(token).await.unwrap();
        }

        for item in ledger.items().await.unwrap() {
            assert_eq!((item.reserved, item.assigned, item.available()), (0, 0, 3));
        }
    });
}
