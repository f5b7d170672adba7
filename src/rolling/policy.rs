//! Rotation policy evaluation logic.

use std::time::Duration;

/// Decides whether the active file should be rotated.
pub trait RotationPolicy: Send + Sync {
    /// # Arguments
    ///
    /// * `size` - Current file size in bytes, including buffered bytes
    /// * `age` - Time since the file was opened (or last modified, if resumed)
    /// * `max_bytes` - Configured size ceiling
    /// * `max_age` - Configured age ceiling
    fn should_rotate(&self, size: u64, age: Duration, max_bytes: u64, max_age: Duration) -> bool;
}

/// Rotates when either the size or the age ceiling is reached.
#[derive(Debug, Clone, Copy, Default)]
pub struct HybridRotationPolicy;

impl RotationPolicy for HybridRotationPolicy {
    fn should_rotate(&self, size: u64, age: Duration, max_bytes: u64, max_age: Duration) -> bool {
        size >= max_bytes || age >= max_age
    }
}

/// Ignores age; rotates only on size.
#[derive(Debug, Clone, Copy, Default)]
pub struct SizeOnlyRotationPolicy;

impl RotationPolicy for SizeOnlyRotationPolicy {
    fn should_rotate(&self, size: u64, _age: Duration, max_bytes: u64, _max_age: Duration) -> bool {
        size >= max_bytes
    }
}
