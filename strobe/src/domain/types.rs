//! Domain types providing compile-time safety and self-documentation

use std::fmt;

/// Process ID
///
/// Represents a process id (TGID) in the system. Pid 0 is reserved for
/// kernel-space frames during symbolization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pid(pub u32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID:{}", self.0)
    }
}

impl From<i32> for Pid {
    #[allow(clippy::cast_sign_loss)]
    fn from(pid: i32) -> Self {
        Pid(pid as u32)
    }
}

/// CPU ID
///
/// Represents a CPU core id (0, 1, 2, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CpuId(pub u32);

impl fmt::Display for CpuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CPU:{}", self.0)
    }
}

/// Stack id recorded by the sampling object
///
/// Indexes the kernel-side map of raw captured address arrays.
/// Negative values mean no stack was captured for this sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackId(pub i64);

impl StackId {
    /// Returns true if this stack id references a captured stack
    #[must_use]
    pub fn is_valid(self) -> bool {
        self.0 >= 0
    }

    /// The id as a map key, or `None` for the "absent" sentinel
    #[must_use]
    pub fn as_map_key(self) -> Option<u32> {
        u32::try_from(self.0).ok()
    }
}

impl fmt::Display for StackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StackId:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_id_validity() {
        assert!(StackId(0).is_valid());
        assert!(StackId(42).is_valid());
        assert!(!StackId(-1).is_valid());
        assert!(!StackId(i64::MIN).is_valid());
    }

    #[test]
    fn test_stack_id_as_map_key() {
        assert_eq!(StackId(7).as_map_key(), Some(7));
        assert_eq!(StackId(-1).as_map_key(), None);
    }

    #[test]
    fn test_pid_display() {
        assert_eq!(Pid(1234).to_string(), "PID:1234");
    }
}
