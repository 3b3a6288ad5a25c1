//! Kernel backend selection.
//!
//! The benchmark distinguishes a *reference* implementation of every primitive
//! from an *optimized* one. Each compute call reports which path it took so the
//! final report can state whether the optimized kernels were actually used.

/// Environment variable that forces a backend (`reference` or `parallel`).
pub const BACKEND_ENV_VAR: &str = "HPGMP_KERNELS";

/// Vectors shorter than this are processed sequentially even on the parallel
/// backend; the rayon split costs more than it saves below this size.
pub const PARALLEL_THRESHOLD: usize = 4096;

/// Chunk length used by parallel reductions. Fixed so that a given backend
/// always sums in the same order.
pub const REDUCTION_CHUNK: usize = 2048;

/// Which implementation of the dense kernels to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KernelBackend {
    /// Straight sequential loops.
    Reference,
    /// rayon data-parallel loops.
    #[default]
    Parallel,
}

impl KernelBackend {
    /// Pick a backend: honour [`BACKEND_ENV_VAR`] when set, otherwise use the
    /// parallel kernels if they were compiled in.
    pub fn detect() -> Self {
        if let Ok(name) = std::env::var(BACKEND_ENV_VAR) {
            if let Some(backend) = Self::from_name(&name) {
                return backend;
            }
        }
        if cfg!(feature = "parallel") {
            KernelBackend::Parallel
        } else {
            KernelBackend::Reference
        }
    }

    /// Parse from a string.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "reference" | "ref" | "serial" => Some(Self::Reference),
            "parallel" | "rayon" | "optimized" | "opt" => Some(Self::Parallel),
            _ => None,
        }
    }

    /// Display name.
    pub fn name(&self) -> &'static str {
        match self {
            KernelBackend::Reference => "reference",
            KernelBackend::Parallel => "parallel",
        }
    }

    /// Whether calls on this backend count as running the optimized path.
    #[inline]
    pub fn is_optimized(&self) -> bool {
        matches!(self, KernelBackend::Parallel) && cfg!(feature = "parallel")
    }

    /// Whether a loop of `len` elements should be split across threads.
    #[inline]
    pub(crate) fn parallel_for(&self, len: usize) -> bool {
        self.is_optimized() && len >= PARALLEL_THRESHOLD
    }
}

impl std::fmt::Display for KernelBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_from_name() {
        assert_eq!(KernelBackend::from_name("ref"), Some(KernelBackend::Reference));
        assert_eq!(
            KernelBackend::from_name(" Parallel "),
            Some(KernelBackend::Parallel)
        );
        assert_eq!(KernelBackend::from_name("cuda"), None);
    }

    #[test]
    fn reference_is_never_optimized() {
        assert!(!KernelBackend::Reference.is_optimized());
        assert!(!KernelBackend::Reference.parallel_for(1 << 20));
    }

    #[test]
    fn small_loops_stay_sequential() {
        assert!(!KernelBackend::Parallel.parallel_for(PARALLEL_THRESHOLD - 1));
    }
}
