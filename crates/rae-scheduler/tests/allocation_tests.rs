//! Resource allocation tests

use proptest::prelude::*;
use rae_core::{OsFamily, PlatformInfo};
use rae_scheduler::{ResourceAllocation, ResourceAllocator};
use rae_test_utils::{platform, FixedProbe};
use std::sync::Arc;

#[test]
fn eight_core_sixteen_gig_host() {
    let a = ResourceAllocation::for_platform(&platform(8, 16.0, 12.0));

    assert_eq!(a.max_parallel_developers, 4);
    assert_eq!(a.max_parallel_tests, 8);
    assert_eq!(a.max_parallel_stages, 2);
    assert_eq!(a.batch_size, 100);
    assert_eq!(a.thread_pool_size, 16);
    // (12 - 2) / 12 is below the floor
    assert_eq!(a.memory_per_agent_gb, 1.0);
    assert!(a.async_io);
    assert!(a.caching);
}

#[test]
fn batch_size_steps() {
    assert_eq!(ResourceAllocation::for_platform(&platform(4, 15.9, 8.0)).batch_size, 50);
    assert_eq!(ResourceAllocation::for_platform(&platform(4, 8.0, 8.0)).batch_size, 50);
    assert_eq!(ResourceAllocation::for_platform(&platform(4, 7.9, 4.0)).batch_size, 25);
}

#[test]
fn zero_cores_treated_as_one() {
    let a = ResourceAllocation::for_platform(&platform(0, 4.0, 3.0));
    assert_eq!(a.max_parallel_developers, 1);
    assert_eq!(a.max_parallel_tests, 1);
    assert_eq!(a.thread_pool_size, 2);
}

#[test]
fn windows_has_no_async_io() {
    let a = ResourceAllocation::for_platform(&PlatformInfo::new(8, 16.0, 12.0, OsFamily::Windows));
    assert!(!a.async_io);
}

#[test]
fn allocator_uses_probe() {
    let allocator = ResourceAllocator::new(Arc::new(FixedProbe(platform(2, 4.0, 3.0))));
    let a = allocator.allocation();
    assert_eq!(a.max_parallel_developers, 1);
    assert_eq!(a.max_parallel_tests, 2);
    assert!(!a.caching);
}

proptest! {
    #[test]
    fn allocation_bounds(
        cores in 0usize..256,
        total in 0.5f64..512.0,
        available_share in 0.0f64..=1.0,
    ) {
        let available = total * available_share;
        let a = ResourceAllocation::for_platform(&platform(cores, total, available));

        prop_assert!((1..=4).contains(&a.max_parallel_developers));
        prop_assert!((1..=8).contains(&a.max_parallel_tests));
        prop_assert!(a.max_parallel_tests <= cores.max(1));
        prop_assert_eq!(a.max_parallel_stages, 2);
        prop_assert!((2..=16).contains(&a.thread_pool_size));
        prop_assert!(a.memory_per_agent_gb >= 1.0);
        prop_assert!([25, 50, 100].contains(&a.batch_size));
        prop_assert_eq!(a.caching, available >= 4.0);
    }

    #[test]
    fn allocation_is_deterministic(cores in 1usize..64, total in 1.0f64..128.0) {
        let p = platform(cores, total, total / 2.0);
        prop_assert_eq!(ResourceAllocation::for_platform(&p), ResourceAllocation::for_platform(&p));
    }
}
