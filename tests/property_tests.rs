//! Property-based tests for tree reconstruction and rollup invariants.
//!
//! Random trees are generated as row lists, fed to the builder in arbitrary
//! permutations, and checked against sums computed independently from the
//! generated rows.

mod common;

use std::collections::BTreeMap;

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use inventory_audit::inventory::builder::build_tree;
use inventory_audit::inventory::digest::forest_digest;
use inventory_audit::inventory::rollup::reconcile;
use inventory_audit::inventory::tree::Forest;
use inventory_audit::inventory::units::{SizeUnit, parse_size, to_bytes};
use inventory_audit::logger::diagnostics::DiagnosticKind;

const HEADER: [&str; 3] = ["Full Path", "Type", "Size"];
const ROOT: &str = r"C:\Root\";

// ──────────────────── fixtures ────────────────────

/// One generated entry: full path, directory flag, file size.
#[derive(Debug, Clone)]
struct Entry {
    path: String,
    directory: bool,
    size: u64,
}

/// Grow a tree under `ROOT` from `(parent selector, is_dir, size)` triples.
fn grow(shape: &[(usize, bool, u64)]) -> Vec<Entry> {
    let mut directories = vec![ROOT.to_string()];
    let mut entries = vec![Entry {
        path: ROOT.to_string(),
        directory: true,
        size: 0,
    }];
    for (i, &(selector, directory, size)) in shape.iter().enumerate() {
        let parent = directories[selector % directories.len()].clone();
        let path = if directory {
            format!("{parent}d{i}\\")
        } else {
            format!("{parent}f{i}.bin")
        };
        if directory {
            directories.push(path.clone());
        }
        entries.push(Entry {
            path,
            directory,
            size,
        });
    }
    entries
}

fn to_rows(entries: &[Entry]) -> Vec<Vec<String>> {
    entries
        .iter()
        .map(|e| {
            if e.directory {
                vec![e.path.clone(), "Folder".to_string(), String::new()]
            } else {
                vec![e.path.clone(), "bin".to_string(), format!("{} Bytes", e.size)]
            }
        })
        .collect()
}

fn build(rows: &[Vec<String>]) -> Forest {
    let borrowed: Vec<Vec<&str>> = rows
        .iter()
        .map(|r| r.iter().map(String::as_str).collect())
        .collect();
    build_tree(&common::rows(&HEADER, &borrowed), &common::default_config()).forest
}

/// Expected rollup per directory: every file whose path lies beneath it.
fn expected_sums(entries: &[Entry]) -> BTreeMap<String, u64> {
    entries
        .iter()
        .filter(|e| e.directory)
        .map(|dir| {
            let sum = entries
                .iter()
                .filter(|e| !e.directory && e.path.starts_with(&dir.path))
                .map(|e| e.size)
                .sum();
            (dir.path.clone(), sum)
        })
        .collect()
}

fn arb_shape() -> impl Strategy<Value = Vec<(usize, bool, u64)>> {
    prop::collection::vec((0usize..64, any::<bool>(), 0u64..1_000_000), 0..40)
}

fn arb_unit() -> impl Strategy<Value = SizeUnit> {
    prop::sample::select(SizeUnit::ALL.to_vec())
}

// ──────────────────── properties ────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn unit_conversion_round_trips(n in 0u64..16_000, unit in arb_unit()) {
        let bytes = to_bytes(n as f64, unit).expect("in range");
        let back = bytes as f64 / unit.multiplier() as f64;
        prop_assert!((back - n as f64).abs() < 1e-6, "{n} {unit} -> {bytes} -> {back}");

        let parsed = parse_size(&format!("{n} {unit}")).expect("parses");
        prop_assert_eq!(parsed, bytes);
    }

    #[test]
    fn any_row_order_builds_the_same_tree(
        (rows, shuffled) in arb_shape()
            .prop_map(|shape| to_rows(&grow(&shape)))
            .prop_flat_map(|rows| (Just(rows.clone()), Just(rows).prop_shuffle()))
    ) {
        let ordered = build(&rows);
        let permuted = build(&shuffled);
        prop_assert_eq!(forest_digest(&ordered), forest_digest(&permuted));
        prop_assert_eq!(ordered.len(), permuted.len());
        prop_assert_eq!(ordered.root_count(), permuted.root_count());
        for node in ordered.nodes() {
            let other = permuted.find(&node.full_path).expect("same path present");
            let parent_path = |forest: &Forest, id| {
                forest.node(id).parent.map(|p| forest.node(p).full_path.clone())
            };
            prop_assert_eq!(parent_path(&ordered, node.id), parent_path(&permuted, other));
        }
    }

    #[test]
    fn rolled_up_size_equals_descendant_file_sum(
        shape in arb_shape(),
        seed in any::<u64>(),
    ) {
        let entries = grow(&shape);
        let mut rows = to_rows(&entries);
        rows.shuffle(&mut StdRng::seed_from_u64(seed));
        let mut forest = build(&rows);
        reconcile(&mut forest, &common::default_config());

        for (path, expected) in expected_sums(&entries) {
            let id = forest.directory(&path).expect("directory registered");
            let dir = forest.node(id).directory().expect("is directory");
            prop_assert_eq!(dir.rolled_up_size, Some(expected), "{}", path);
        }
    }

    #[test]
    fn reconcile_is_idempotent(shape in arb_shape()) {
        let mut forest = build(&to_rows(&grow(&shape)));
        let config = common::default_config();
        let first = reconcile(&mut forest, &config);
        let rolled: Vec<_> = forest.nodes().map(|n| n.directory().cloned()).collect();
        let second = reconcile(&mut forest, &config);
        let again: Vec<_> = forest.nodes().map(|n| n.directory().cloned()).collect();
        prop_assert_eq!(rolled, again);
        prop_assert_eq!(first.total_size_bytes, second.total_size_bytes);
        prop_assert_eq!(first.deviations, second.deviations);
    }
}

// ──────────────────── seeded stress ────────────────────

#[test]
fn large_shuffled_export_reconciles_exactly() {
    let mut rng = StdRng::seed_from_u64(0x1a5_eed);
    let shape: Vec<(usize, bool, u64)> = (0..20_000)
        .map(|_| {
            (
                rng.random_range(0..usize::MAX),
                rng.random_bool(0.15),
                rng.random_range(0..50_000_000),
            )
        })
        .collect();
    let entries = grow(&shape);
    let expected = expected_sums(&entries);
    let total: u64 = entries.iter().filter(|e| !e.directory).map(|e| e.size).sum();

    let mut rows = to_rows(&entries);
    // Give every directory its exact reported size so nothing should deviate.
    for (row, entry) in rows.iter_mut().zip(&entries) {
        if entry.directory {
            row[2] = format!("{} Bytes", expected[&entry.path]);
        }
    }
    rows.shuffle(&mut rng);

    let borrowed: Vec<Vec<&str>> = rows
        .iter()
        .map(|r| r.iter().map(String::as_str).collect())
        .collect();
    let config = common::default_config();
    let mut outcome = build_tree(&common::rows(&HEADER, &borrowed), &config);
    let report = reconcile(&mut outcome.forest, &config);

    assert_eq!(outcome.forest.len(), entries.len());
    assert_eq!(outcome.forest.root_count(), 1);
    assert_eq!(report.total_size_bytes, total);
    assert!(report.deviations.is_empty(), "{:?}", &report.deviations[..1]);
    assert!(outcome
        .diagnostics
        .of_kind(DiagnosticKind::DuplicateDirectory)
        .is_empty());
    let root = outcome.forest.directory(ROOT).expect("root");
    assert_eq!(
        outcome.forest.node(root).directory().and_then(|d| d.rolled_up_size),
        Some(total)
    );
}
