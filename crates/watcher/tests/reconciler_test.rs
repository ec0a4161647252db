mod mock_chain;

use betcache_storage::{keys, CacheStore, InMemoryStorage, MembershipSides, Storage};
use betcache_types::{Address, ContractKind};
use betcache_watcher::{MembershipReconciler, VerifyOutcome};
use mock_chain::*;
use std::collections::BTreeSet;
use std::sync::Arc;

fn set(addrs: &[Address]) -> BTreeSet<Address> {
    addrs.iter().copied().collect()
}

fn seed(cache: &CacheStore, group: &Address, users: &[Address]) {
    for user in users {
        cache.add_membership(user, group).unwrap();
    }
}

/// Forward and reverse indexes agree for every user in `users`.
fn assert_symmetric(cache: &CacheStore, group: &Address, users: &[Address]) {
    let reverse = cache.users_for_group(group).unwrap();
    for user in users {
        let forward = cache.group_addresses_for_user(user).unwrap();
        assert_eq!(
            forward.contains(group),
            reverse.contains(user),
            "asymmetric membership for {}",
            user
        );
    }
}

fn setup_with_storage() -> (
    Arc<MockChain>,
    Arc<InMemoryStorage>,
    CacheStore,
    MembershipReconciler,
) {
    let chain = Arc::new(MockChain::new());
    let storage = Arc::new(InMemoryStorage::new());
    let indexer = indexer_with(chain.clone(), storage.clone(), 0);
    let cache = indexer.cache().clone();
    let reconciler = MembershipReconciler::new(chain.clone(), cache.clone());
    (chain, storage, cache, reconciler)
}

fn setup() -> (Arc<MockChain>, CacheStore, MembershipReconciler) {
    let (chain, _storage, cache, reconciler) = setup_with_storage();
    (chain, cache, reconciler)
}

const BOTH: MembershipSides = MembershipSides {
    forward: true,
    reverse: true,
};
const NEITHER: MembershipSides = MembershipSides {
    forward: false,
    reverse: false,
};

#[tokio::test]
async fn test_reconcile_replaces_stale_members() {
    let (chain, cache, reconciler) = setup();
    let group = addr(0x0b);
    let (u1, u2, u3) = (addr(1), addr(2), addr(3));
    chain.set_participants(group, &[(u1, true), (u2, true)]);
    seed(&cache, &group, &[u1, u3]);

    let report = reconciler.reconcile_group(&group).await.unwrap();

    assert_eq!(report.added, vec![u2]);
    assert_eq!(report.removed, vec![u3]);
    assert_eq!(report.cached_before, 2);
    assert_eq!(report.cached_after, 2);
    assert_eq!(cache.users_for_group(&group).unwrap(), set(&[u1, u2]));
    assert!(cache.group_addresses_for_user(&u3).unwrap().is_empty());
    assert_symmetric(&cache, &group, &[u1, u2, u3]);
}

#[tokio::test]
async fn test_reconcile_converges_from_any_start() {
    let group = addr(0x0b);
    let users: Vec<Address> = (1..=6).map(addr).collect();
    let truth = [users[0], users[1], users[2]];
    let starts: [&[Address]; 4] = [
        &users[..],                        // superset
        &users[..1],                       // subset
        &users[3..],                       // disjoint
        &[],                               // empty
    ];

    for start in starts {
        let (chain, cache, reconciler) = setup();
        chain.set_participants(group, &truth.map(|u| (u, true)));
        seed(&cache, &group, start);

        reconciler.reconcile_group(&group).await.unwrap();
        assert_eq!(cache.users_for_group(&group).unwrap(), set(&truth));
        assert_symmetric(&cache, &group, &users);

        let second = reconciler.reconcile_group(&group).await.unwrap();
        assert!(second.is_noop());
    }
}

#[tokio::test]
async fn test_unregistered_participants_are_not_members() {
    let (chain, cache, reconciler) = setup();
    let group = addr(0x0b);
    chain.set_participants(group, &[(addr(1), true), (addr(2), false)]);
    seed(&cache, &group, &[addr(2)]);

    let report = reconciler.reconcile_group(&group).await.unwrap();

    assert_eq!(report.ground_truth, 1);
    assert_eq!(cache.users_for_group(&group).unwrap(), set(&[addr(1)]));
}

#[tokio::test]
async fn test_failed_index_is_skipped() {
    let (chain, cache, reconciler) = setup();
    let group = addr(0x0b);
    chain.set_participants(group, &[(addr(1), true), (addr(2), true), (addr(3), true)]);
    chain.fail_participant_index(group, 1);

    let report = reconciler.reconcile_group(&group).await.unwrap();

    assert_eq!(report.skipped_indices, vec![1]);
    assert_eq!(cache.users_for_group(&group).unwrap(), set(&[addr(1), addr(3)]));
}

#[tokio::test]
async fn test_sweep_continues_past_failing_group() {
    let (chain, cache, reconciler) = setup();
    let (good, bad) = (addr(0x0b), addr(0x0c));
    cache.registry().register(ContractKind::BettingGroup, &good).unwrap();
    cache.registry().register(ContractKind::BettingGroup, &bad).unwrap();
    cache.registry().register(ContractKind::Tournament, &addr(0x0a)).unwrap();
    chain.set_participants(good, &[(addr(1), true)]);
    chain.fail_participant_count(bad);

    let sweep = reconciler.reconcile_all().await.unwrap();

    assert_eq!(sweep.total, 2);
    assert_eq!(sweep.succeeded, 1);
    assert_eq!(sweep.failed, vec![bad]);
    assert_eq!(sweep.added, 1);
    assert!(cache.is_member(&addr(1), &good).unwrap());
}

#[tokio::test]
async fn test_verify_membership_outcomes() {
    let (chain, cache, reconciler) = setup();
    let group = addr(0x0b);
    let (member, stale) = (addr(1), addr(2));
    chain.set_participants(group, &[(member, true), (stale, false)]);
    seed(&cache, &group, &[stale]);

    let fixed = reconciler.verify_membership(&member, &group).await.unwrap();
    assert_eq!(
        fixed,
        VerifyOutcome::MismatchCorrected {
            registered_on_chain: true,
            cached_before: NEITHER,
            cached_after: BOTH,
        }
    );

    let removed = reconciler.verify_membership(&stale, &group).await.unwrap();
    assert_eq!(
        removed,
        VerifyOutcome::MismatchCorrected {
            registered_on_chain: false,
            cached_before: BOTH,
            cached_after: NEITHER,
        }
    );

    let again = reconciler.verify_membership(&member, &group).await.unwrap();
    assert_eq!(again, VerifyOutcome::Matches { registered: true });
    assert_symmetric(&cache, &group, &[member, stale]);
}

#[tokio::test]
async fn test_verify_membership_propagates_chain_errors() {
    let (chain, _cache, reconciler) = setup();
    chain.fail_is_registered(true);

    assert!(reconciler
        .verify_membership(&addr(1), &addr(0x0b))
        .await
        .is_err());
}

#[tokio::test]
async fn test_half_written_membership_is_repaired() {
    let (chain, storage, cache, reconciler) = setup_with_storage();
    let group = addr(0x0b);
    let (registered, gone, dangling) = (addr(1), addr(2), addr(3));
    chain.set_participants(group, &[(registered, true), (gone, false), (dangling, false)]);

    // One side each, as left behind by an interrupted write.
    storage
        .set_add(&keys::group_users(&group), &registered.to_string())
        .unwrap();
    storage
        .set_add(&keys::group_users(&group), &gone.to_string())
        .unwrap();
    storage
        .set_add(&keys::user_groups(&dangling), &group.to_string())
        .unwrap();

    let report = reconciler.reconcile_group(&group).await.unwrap();
    assert_eq!(report.removed, vec![gone]);
    assert_eq!(cache.membership_sides(&registered, &group).unwrap(), BOTH);
    assert_eq!(cache.membership_sides(&gone, &group).unwrap(), NEITHER);

    // A forward-only entry is invisible to the group's reverse index.
    let outcome = reconciler.verify_membership(&dangling, &group).await.unwrap();
    assert_eq!(
        outcome,
        VerifyOutcome::MismatchCorrected {
            registered_on_chain: false,
            cached_before: MembershipSides {
                forward: true,
                reverse: false,
            },
            cached_after: NEITHER,
        }
    );
    assert!(cache.group_addresses_for_user(&dangling).unwrap().is_empty());
    assert_symmetric(&cache, &group, &[registered, gone, dangling]);

    let again = reconciler.verify_membership(&dangling, &group).await.unwrap();
    assert_eq!(again, VerifyOutcome::Matches { registered: false });
}

#[tokio::test]
async fn test_verify_completes_reverse_only_member() {
    let (chain, storage, cache, reconciler) = setup_with_storage();
    let group = addr(0x0b);
    let user = addr(1);
    chain.set_participants(group, &[(user, true)]);
    storage
        .set_add(&keys::group_users(&group), &user.to_string())
        .unwrap();

    let outcome = reconciler.verify_membership(&user, &group).await.unwrap();

    assert!(matches!(outcome, VerifyOutcome::MismatchCorrected { cached_after: BOTH, .. }));
    assert_eq!(cache.group_addresses_for_user(&user).unwrap(), set(&[group]));
}
