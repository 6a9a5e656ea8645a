//! Integration tests for replica partitioning and writer selection.
//!
//! Each test simulates every rank of a group calling in independently and
//! checks that the answers they compute locally agree.

use rankpart_core::testing::group;
use rankpart_core::{
    partition, select_save_rank, LoadRole, Purpose, RankGroup, ReplicaPartition, SelectionResult,
};

const PURPOSES: [Purpose; 3] = [Purpose::SaveOptim, Purpose::SaveModel, Purpose::LoadBroadcast];

/// Every rank's selection for one group.
fn select_all(g: &RankGroup, replica_count: usize, purpose: Purpose) -> Vec<SelectionResult> {
    g.ranks()
        .iter()
        .map(|&rank| partition(rank, g, replica_count, purpose).unwrap())
        .collect()
}

// ─── Completeness ────────────────────────────────────────────────────────────

#[test]
fn slices_cover_group_exactly_once() {
    for n in 1..=24usize {
        let g = group((0..n).map(|i| i * 3 + 1));
        for replica_count in 1..=n {
            let p = ReplicaPartition::new(g.clone(), replica_count);
            assert_eq!(p.replica_count(), replica_count, "n={n} r={replica_count}");

            let concatenated: Vec<usize> = p.replicas().flatten().copied().collect();
            assert_eq!(concatenated, g.ranks(), "n={n} r={replica_count}");

            for (i, a) in p.bounds().iter().enumerate() {
                assert!(!a.is_empty(), "n={n} r={replica_count} slice {i} empty");
                for b in &p.bounds()[i + 1..] {
                    assert!(a.end <= b.start, "n={n} r={replica_count} overlap");
                }
            }
        }
    }
}

#[test]
fn caller_is_member_of_its_own_slice() {
    for n in 1..=16usize {
        let g = group(0..n);
        for replica_count in 1..=n {
            for sel in select_all(&g, replica_count, Purpose::SaveModel) {
                assert_eq!(sel.all_group_ranks, g);
            }
            for &rank in g.ranks() {
                let sel = partition(rank, &g, replica_count, Purpose::SaveModel).unwrap();
                assert!(sel.process_group_ranks.contains(rank));
            }
        }
    }
}

// ─── Boundary rule ───────────────────────────────────────────────────────────

#[test]
fn ten_ranks_three_replicas() {
    let p = ReplicaPartition::new(group(0..10), 3);
    assert_eq!(p.bounds(), &[0..3, 3..6, 6..10]);
    let sizes: Vec<usize> = p.replicas().map(<[usize]>::len).collect();
    assert_eq!(sizes, vec![3, 3, 4]);
}

#[test]
fn only_last_slice_is_uneven() {
    for n in 2..=30usize {
        for replica_count in 2..=n {
            let p = ReplicaPartition::new(group(0..n), replica_count);
            let base = n / replica_count;
            let sizes: Vec<usize> = p.replicas().map(<[usize]>::len).collect();
            let (last, rest) = sizes.split_last().unwrap();
            assert!(rest.iter().all(|&s| s == base), "n={n} r={replica_count}");
            assert_eq!(*last, n - base * (replica_count - 1));
        }
    }
}

// ─── Degenerate replica counts ───────────────────────────────────────────────

#[test]
fn one_replica_is_whole_group() {
    let g = group([4, 9, 12, 30, 31]);
    for purpose in PURPOSES {
        for sel in select_all(&g, 1, purpose) {
            assert_eq!(sel.process_group_ranks, g);
            assert_eq!(sel.selected_model_rank, 4);
            assert_eq!(sel.selected_optim_rank, 4);
            assert_eq!(sel.replica_count, 1);
        }
    }
}

#[test]
fn too_many_replicas_degrade_to_one() {
    let g = group(0..4);
    for sel in select_all(&g, 5, Purpose::SaveOptim) {
        assert_eq!(sel.replica_count, 1);
        assert_eq!(sel.process_group_ranks, g);
        assert!(sel.degradation.is_some());
    }
}

#[test]
fn singleton_slices_write_both() {
    let g = group(0..6);
    for sel in select_all(&g, 6, Purpose::SaveModel) {
        assert_eq!(sel.process_group_ranks.len(), 1);
        assert_eq!(sel.selected_model_rank, sel.selected_optim_rank);
        assert_eq!(sel.selected_model_rank, sel.process_group_ranks.first());
    }
}

// ─── Determinism ─────────────────────────────────────────────────────────────

#[test]
fn all_members_of_a_slice_agree() {
    let g = group((0..32).map(|i| i * 2));
    for replica_count in [2, 3, 4, 5, 8] {
        let sels = select_all(&g, replica_count, Purpose::SaveOptim);
        for a in &sels {
            for b in sels.iter().filter(|b| b.replica_index == a.replica_index) {
                assert_eq!(a, b);
            }
        }
        let again = select_all(&g, replica_count, Purpose::SaveOptim);
        assert_eq!(sels, again);
    }
}

#[test]
fn one_model_and_one_optim_writer_per_slice() {
    for n in 2..=20usize {
        let g = group(0..n);
        for replica_count in 2..=n {
            let p = ReplicaPartition::new(g.clone(), replica_count);
            for i in 0..p.replica_count() {
                let slice = p.replica(i);
                let sels: Vec<SelectionResult> = slice
                    .iter()
                    .map(|&r| partition(r, &g, replica_count, Purpose::SaveModel).unwrap())
                    .collect();
                let model_writers = slice
                    .iter()
                    .zip(&sels)
                    .filter(|(&r, s)| s.is_model_writer(r))
                    .count();
                let optim_writers = slice
                    .iter()
                    .zip(&sels)
                    .filter(|(&r, s)| s.is_optim_writer(r))
                    .count();
                assert_eq!(model_writers, 1, "n={n} r={replica_count} slice {i}");
                assert_eq!(optim_writers, 1, "n={n} r={replica_count} slice {i}");
            }
        }
    }
}

// ─── End-to-end ──────────────────────────────────────────────────────────────

#[test]
fn eight_ranks_four_replicas() {
    let g = group(0..8);
    let p = ReplicaPartition::new(g.clone(), 4);
    let slices: Vec<Vec<usize>> = p.replicas().map(<[usize]>::to_vec).collect();
    assert_eq!(slices, vec![vec![0, 1], vec![2, 3], vec![4, 5], vec![6, 7]]);

    for rank in [4, 5] {
        let sel = partition(rank, &g, 4, Purpose::SaveOptim).unwrap();
        assert_eq!(sel.selected_optim_rank, 4);
        assert_eq!(sel.selected_model_rank, 5);
    }
}

#[test]
fn broadcast_load_has_one_source_per_slice() {
    let g = group(0..12);
    for replica_count in [1, 2, 3, 4, 6] {
        let sels = select_all(&g, replica_count, Purpose::LoadBroadcast);
        let sources = g
            .ranks()
            .iter()
            .zip(&sels)
            .filter(|(&r, s)| s.load_role(r) == LoadRole::Source)
            .count();
        assert_eq!(sources, sels[0].replica_count);
    }
}

#[test]
fn missing_rank_reports_group_size() {
    let err = partition(37, &group(0..32), 2, Purpose::SaveModel).unwrap_err();
    assert_eq!(
        err.to_string(),
        "rank 37 not found in supplied rank group of size 32"
    );
}

// ─── select_save_rank ────────────────────────────────────────────────────────

#[test]
fn save_rank_binary_split() {
    let ranks: Vec<usize> = (0..8).collect();
    let writers: Vec<usize> = (0..8)
        .map(|i| select_save_rank(&ranks, 2, i).unwrap())
        .collect();
    assert_eq!(writers, vec![0, 0, 0, 0, 4, 4, 4, 4]);
}

#[test]
fn save_rank_diverges_from_partition_above_two_replicas() {
    // Documented divergence: the flat path never splits more than twice.
    let ranks: Vec<usize> = (0..8).collect();
    let g = group(0..8);
    assert_eq!(select_save_rank(&ranks, 4, 2).unwrap(), 0);
    let sel = partition(2, &g, 4, Purpose::SaveOptim).unwrap();
    assert_eq!(sel.selected_optim_rank, 2);
}
