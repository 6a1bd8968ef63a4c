//! Tree properties checked over random intent sequences.
//!
//! Every generated sequence is replayed through a controller. After each
//! accepted intent the snapshot must be internally consistent; after each
//! rejected one it must be exactly the snapshot from before.

use std::collections::BTreeMap;
use std::sync::Arc;

use devis_core::calculation::leaf_totals;
use devis_core::controller::{Intent, MutationController, QuoteState};
use devis_core::discount::DiscountRequest;
use devis_core::types::{ItemId, ItemPatch, ItemType, NewItem, QuoteMetadata, VatRate};
use devis_core::{EngineConfig, Money, PERMITTED_VAT_RATES_BPS};
use proptest::prelude::*;
use rust_decimal::Decimal;

// =============================================================================
// Generated Operations
// =============================================================================

/// An intent with its targets given as indexes into the live ids, resolved
/// against whatever the tree holds when the operation runs.
#[derive(Debug, Clone)]
enum Op {
    AddChapter,
    AddSection {
        parent: usize,
    },
    AddLeaf {
        parent: Option<usize>,
        quantity: u32,
        price_cents: i64,
        vat: usize,
        line_discount: u32,
    },
    Update {
        target: usize,
        quantity: u32,
    },
    Remove {
        target: usize,
    },
    Move {
        target: usize,
        position: u32,
    },
    Discount {
        percent: u32,
    },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        2 => Just(Op::AddChapter),
        2 => any::<usize>().prop_map(|parent| Op::AddSection { parent }),
        5 => (
            proptest::option::of(any::<usize>()),
            1u32..50,
            0i64..100_000,
            0..PERMITTED_VAT_RATES_BPS.len(),
            0u32..=100,
        )
            .prop_map(|(parent, quantity, price_cents, vat, line_discount)| Op::AddLeaf {
                parent,
                quantity,
                price_cents,
                vat,
                line_discount,
            }),
        1 => (any::<usize>(), 1u32..20).prop_map(|(target, quantity)| Op::Update { target, quantity }),
        1 => any::<usize>().prop_map(|target| Op::Remove { target }),
        2 => (any::<usize>(), 1u32..6).prop_map(|(target, position)| Op::Move { target, position }),
        1 => (1u32..=30).prop_map(|percent| Op::Discount { percent }),
    ]
}

struct Session {
    ctl: MutationController,
    next_id: usize,
}

impl Session {
    fn new() -> Self {
        Session {
            ctl: MutationController::new(
                QuoteMetadata::new(VatRate::from_percent(20)),
                EngineConfig::default(),
            ),
            next_id: 0,
        }
    }

    fn fresh_id(&mut self) -> String {
        self.next_id += 1;
        format!("i{}", self.next_id)
    }

    fn pick(&self, index: usize) -> Option<ItemId> {
        let state = self.ctl.state();
        let ids: Vec<&ItemId> = state.items().ids().collect();
        if ids.is_empty() {
            return None;
        }
        let picked = ids[index % ids.len()].clone();
        Some(picked)
    }

    fn intent(&mut self, op: &Op) -> Option<Intent> {
        let intent = match op {
            Op::AddChapter => Intent::AddItem {
                item: NewItem::chapter("Chapter").with_id(self.fresh_id()),
            },
            Op::AddSection { parent } => {
                let parent = self.pick(*parent)?;
                Intent::AddItem {
                    item: NewItem::section("Section")
                        .with_id(self.fresh_id())
                        .under(parent),
                }
            }
            Op::AddLeaf {
                parent,
                quantity,
                price_cents,
                vat,
                line_discount,
            } => {
                let mut item = NewItem::priced(
                    ItemType::Work,
                    "Line",
                    Decimal::from(*quantity),
                    Decimal::new(*price_cents, 2),
                )
                .with_id(self.fresh_id())
                .with_vat_rate(VatRate::from_bps(PERMITTED_VAT_RATES_BPS[*vat]))
                .with_discount_percentage(Decimal::from(*line_discount));
                if let Some(parent) = parent {
                    item = item.under(self.pick(*parent)?);
                }
                Intent::AddItem { item }
            }
            Op::Update { target, quantity } => Intent::UpdateItem {
                id: self.pick(*target)?,
                patch: ItemPatch {
                    quantity: Some(Decimal::from(*quantity)),
                    ..ItemPatch::default()
                },
            },
            Op::Remove { target } => Intent::RemoveItem {
                id: self.pick(*target)?,
            },
            Op::Move { target, position } => Intent::MoveItem {
                id: self.pick(*target)?,
                new_position: *position,
                target_parent_id: None,
            },
            Op::Discount { percent } => Intent::ApplyDiscount {
                request: DiscountRequest::percentage(Decimal::from(*percent)),
            },
        };
        Some(intent)
    }

    /// Replays `ops`, checking the snapshot after every step.
    fn run(&mut self, ops: &[Op]) -> Result<(), TestCaseError> {
        for op in ops {
            let Some(intent) = self.intent(op) else {
                continue;
            };
            let before = self.ctl.state();
            match self.ctl.dispatch(intent) {
                Ok(state) => check_snapshot(&state)?,
                Err(_) => prop_assert!(Arc::ptr_eq(&before, &self.ctl.state())),
            }
        }
        Ok(())
    }
}

// =============================================================================
// Snapshot Checks
// =============================================================================

fn positions_by_scope(state: &QuoteState) -> BTreeMap<Option<ItemId>, Vec<u32>> {
    let mut scopes: BTreeMap<Option<ItemId>, Vec<u32>> = BTreeMap::new();
    for item in state.items().iter() {
        scopes
            .entry(item.parent_id.clone())
            .or_default()
            .push(item.position);
    }
    for positions in scopes.values_mut() {
        positions.sort_unstable();
    }
    scopes
}

fn check_snapshot(state: &QuoteState) -> Result<(), TestCaseError> {
    let calc = state.calculations();

    // Positions are 1..N in every scope.
    for (scope, positions) in positions_by_scope(state) {
        let expected: Vec<u32> = (1..=positions.len() as u32).collect();
        prop_assert_eq!(positions, expected, "scope {:?}", scope);
    }

    // Document HT is the sum over every leaf, whatever the nesting.
    let mut leaves = Decimal::ZERO;
    for item in state.items().iter().filter(|i| i.is_priced() || i.is_discount()) {
        leaves += leaf_totals(item).unwrap().total_ht;
    }
    prop_assert_eq!(calc.document.total_ht, Money::from_decimal(leaves));

    // Structural totals are the sum of their direct children.
    for item in state.items().iter().filter(|i| i.is_structural()) {
        let children: Decimal = state
            .index()
            .children(item.id.as_str())
            .iter()
            .filter_map(|child| calc.totals(child.as_str()))
            .map(|totals| totals.total_ht)
            .sum();
        prop_assert_eq!(calc.totals(item.id.as_str()).unwrap().total_ht, children);
    }

    // The roots account for the whole document.
    let roots: Decimal = state
        .index()
        .roots()
        .iter()
        .filter_map(|id| calc.totals(id.as_str()))
        .map(|totals| totals.total_ht)
        .sum();
    prop_assert_eq!(Money::from_decimal(roots), calc.document.total_ht);

    Ok(())
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_every_snapshot_is_consistent(ops in prop::collection::vec(op(), 1..40)) {
        let mut session = Session::new();
        session.run(&ops)?;
    }

    #[test]
    fn prop_add_then_remove_restores_calculations(
        ops in prop::collection::vec(op(), 1..30),
        scope in proptest::option::of(any::<usize>()),
        quantity in 1u32..20,
        price_cents in 0i64..50_000,
    ) {
        let mut session = Session::new();
        session.run(&ops)?;
        let before = session.ctl.state();

        let mut item = NewItem::priced(
            ItemType::Service,
            "Extra",
            Decimal::from(quantity),
            Decimal::new(price_cents, 2),
        )
        .with_id("extra")
        .at(1);
        if let Some(parent) = scope.and_then(|index| session.pick(index)) {
            item = item.under(parent);
        }

        if session.ctl.dispatch(Intent::AddItem { item }).is_ok() {
            let after = session
                .ctl
                .dispatch(Intent::RemoveItem { id: ItemId::new("extra") })
                .unwrap();
            prop_assert_eq!(after.calculations(), before.calculations());
            prop_assert_eq!(positions_by_scope(&after), positions_by_scope(&before));
        }
    }

    #[test]
    fn prop_reordering_keeps_totals(
        ops in prop::collection::vec(op(), 1..30),
        target in any::<usize>(),
        position in 1u32..6,
    ) {
        let mut session = Session::new();
        session.run(&ops)?;
        let before = session.ctl.state();

        if let Some(id) = session.pick(target) {
            let moved = session.ctl.dispatch(Intent::MoveItem {
                id,
                new_position: position,
                target_parent_id: None,
            });
            if let Ok(after) = moved {
                prop_assert_eq!(after.calculations(), before.calculations());
                prop_assert_eq!(after.items().len(), before.items().len());
                check_snapshot(&after)?;
            }
        }
    }
}
