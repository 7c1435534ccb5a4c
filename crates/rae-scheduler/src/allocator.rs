//! Platform-derived resource limits
//!
//! Rules:
//! - developers: `clamp(logical / 2, 1, 4)`
//! - tests: `min(logical, 8)`
//! - stages: fixed at 2
//! - memory per agent: `max(1.0, (available - 2.0) / (developers + tests))`
//! - batch size: 100 at >= 16 GB total, 50 at >= 8 GB, else 25
//! - thread pool: `min(logical * 2, 16)`

use parking_lot::RwLock;
use rae_core::{PlatformInfo, PlatformProbe};
use serde::Serialize;
use std::sync::Arc;

/// Stages that may run side by side
pub const MAX_PARALLEL_STAGES: usize = 2;

/// Memory held back for the host
const RESERVED_MEMORY_GB: f64 = 2.0;

/// Concurrency and memory limits for this host
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResourceAllocation {
    pub max_parallel_developers: usize,
    pub max_parallel_stages: usize,
    pub max_parallel_tests: usize,
    pub memory_per_agent_gb: f64,
    pub batch_size: usize,
    pub thread_pool_size: usize,
    pub async_io: bool,
    pub caching: bool,
}

impl ResourceAllocation {
    /// Deterministic allocation for `platform`
    #[must_use]
    pub fn for_platform(platform: &PlatformInfo) -> Self {
        let cores = platform.logical_cores.max(1);

        let max_parallel_developers = (cores / 2).clamp(1, 4);
        let max_parallel_tests = cores.min(8);

        #[allow(clippy::cast_precision_loss)]
        let agents = (max_parallel_developers + max_parallel_tests) as f64;
        let spare = (platform.available_memory_gb - RESERVED_MEMORY_GB) / agents;
        let memory_per_agent_gb = if spare.is_nan() { 1.0 } else { spare.max(1.0) };

        let batch_size = if platform.total_memory_gb >= 16.0 {
            100
        } else if platform.total_memory_gb >= 8.0 {
            50
        } else {
            25
        };

        Self {
            max_parallel_developers,
            max_parallel_stages: MAX_PARALLEL_STAGES,
            max_parallel_tests,
            memory_per_agent_gb,
            batch_size,
            thread_pool_size: (cores * 2).min(16),
            async_io: platform.os_family.is_posix(),
            caching: platform.available_memory_gb >= 4.0,
        }
    }
}

/// Computes and caches the allocation for the probed platform
pub struct ResourceAllocator {
    probe: Arc<dyn PlatformProbe>,
    cached: RwLock<Option<(PlatformInfo, ResourceAllocation)>>,
}

impl ResourceAllocator {
    #[must_use]
    pub fn new(probe: Arc<dyn PlatformProbe>) -> Self {
        Self {
            probe,
            cached: RwLock::new(None),
        }
    }

    /// Cached allocation, computed on first use
    #[must_use]
    pub fn allocation(&self) -> ResourceAllocation {
        if let Some((_, allocation)) = *self.cached.read() {
            return allocation;
        }
        self.refresh()
    }

    /// Platform the cached allocation was computed for
    #[must_use]
    pub fn platform(&self) -> PlatformInfo {
        if let Some((platform, _)) = *self.cached.read() {
            return platform;
        }
        self.refresh();
        self.cached.read().map_or_else(|| self.probe.detect(), |(p, _)| p)
    }

    /// Probe again and recompute
    pub fn refresh(&self) -> ResourceAllocation {
        let platform = self.probe.detect();
        let allocation = ResourceAllocation::for_platform(&platform);
        tracing::info!(
            developers = allocation.max_parallel_developers,
            tests = allocation.max_parallel_tests,
            stages = allocation.max_parallel_stages,
            memory_per_agent_gb = allocation.memory_per_agent_gb,
            batch_size = allocation.batch_size,
            "resource allocation computed"
        );
        *self.cached.write() = Some((platform, allocation));
        allocation
    }
}

impl std::fmt::Debug for ResourceAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceAllocator")
            .field("cached", &*self.cached.read())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rae_core::OsFamily;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProbe(AtomicUsize);

    impl PlatformProbe for CountingProbe {
        fn detect(&self) -> PlatformInfo {
            self.0.fetch_add(1, Ordering::SeqCst);
            PlatformInfo::new(4, 8.0, 6.0, OsFamily::Windows)
        }
    }

    #[test]
    fn small_host() {
        let a = ResourceAllocation::for_platform(&PlatformInfo::new(1, 4.0, 1.0, OsFamily::Linux));
        assert_eq!(a.max_parallel_developers, 1);
        assert_eq!(a.max_parallel_tests, 1);
        assert_eq!(a.memory_per_agent_gb, 1.0);
        assert_eq!(a.batch_size, 25);
        assert_eq!(a.thread_pool_size, 2);
        assert!(a.async_io);
        assert!(!a.caching);
    }

    #[test]
    fn large_host_is_capped() {
        let a = ResourceAllocation::for_platform(&PlatformInfo::new(64, 256.0, 200.0, OsFamily::MacOs));
        assert_eq!(a.max_parallel_developers, 4);
        assert_eq!(a.max_parallel_tests, 8);
        assert_eq!(a.thread_pool_size, 16);
        assert!((a.memory_per_agent_gb - 198.0 / 12.0).abs() < 1e-9);
    }

    #[test]
    fn allocation_is_cached_until_refresh() {
        let probe = Arc::new(CountingProbe(AtomicUsize::new(0)));
        let allocator = ResourceAllocator::new(probe.clone());

        let a = allocator.allocation();
        let b = allocator.allocation();
        assert_eq!(a, b);
        assert!(!a.async_io);
        assert_eq!(allocator.platform().logical_cores, 4);
        assert_eq!(probe.0.load(Ordering::SeqCst), 1);

        allocator.refresh();
        assert_eq!(probe.0.load(Ordering::SeqCst), 2);
    }
}
