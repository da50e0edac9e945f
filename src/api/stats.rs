//! Pool and hive statistics.

use crate::util::size::format_bytes;

/// Point-in-time statistics of one pool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Bytes currently in use (stack/chain: headers and padding included).
    pub allocated_bytes: usize,

    /// Peak bytes in use (high water mark).
    pub peak_bytes: usize,

    /// Live allocations.
    pub allocation_count: usize,

    /// Successful allocations over the pool's lifetime.
    pub total_allocations: u64,

    /// Failed allocations over the pool's lifetime.
    pub failed_allocations: u64,

    /// Bytes reserved from the backing allocator (0 for heap pools).
    pub capacity: usize,
}

impl PoolStats {
    /// Fraction of the reserved capacity in use.
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.allocated_bytes as f64 / self.capacity as f64
    }
}

impl std::fmt::Display for PoolStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Pool Statistics:")?;
        writeln!(f, "  In use:       {}", format_bytes(self.allocated_bytes))?;
        writeln!(f, "  Peak:         {}", format_bytes(self.peak_bytes))?;
        writeln!(f, "  Capacity:     {}", format_bytes(self.capacity))?;
        writeln!(f, "  Live:         {}", self.allocation_count)?;
        writeln!(f, "  Allocations:  {}", self.total_allocations)?;
        writeln!(f, "  Failures:     {}", self.failed_allocations)?;
        Ok(())
    }
}

/// Point-in-time statistics of a hive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HiveStats {
    /// Worker threads.
    pub thread_count: usize,

    /// Tasks submitted and not yet completed.
    pub pending: usize,

    /// Tasks submitted over the hive's lifetime.
    pub submitted: u64,

    /// Tasks completed over the hive's lifetime.
    pub completed: u64,

    /// Scheduling epochs closed by `wait_all`.
    pub epochs: u64,
}

impl std::fmt::Display for HiveStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Hive Statistics:")?;
        writeln!(f, "  Workers:      {}", self.thread_count)?;
        writeln!(f, "  Pending:      {}", self.pending)?;
        writeln!(f, "  Submitted:    {}", self.submitted)?;
        writeln!(f, "  Completed:    {}", self.completed)?;
        writeln!(f, "  Epochs:       {}", self.epochs)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utilization() {
        let stats = PoolStats {
            allocated_bytes: 256,
            capacity: 1024,
            ..PoolStats::default()
        };
        assert!((stats.utilization() - 0.25).abs() < f64::EPSILON);
        assert_eq!(PoolStats::default().utilization(), 0.0);
    }

    #[test]
    fn test_display() {
        let stats = PoolStats {
            allocated_bytes: 2048,
            ..PoolStats::default()
        };
        assert!(stats.to_string().contains("In use:       2.00 KB"));
    }
}
