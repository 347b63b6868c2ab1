//! The compiled-function cache.
//!
//! Solvers never call a user operator directly. They first ask a [`KernelCache`] for the
//! compiled form of the operator (keyed by its [`OperatorId`]) and for the compiled
//! iteration routine of the algorithm (keyed by [`Algorithm`]). Both lookups go through
//! [`CompileCache::get_or_compile`], which runs its factory at most once per key.
//!
//! Entries are never evicted. An operator id that is reused with a different closure
//! behind it keeps serving the first compiled kernel; keeping ids stable and meaningful
//! is the caller's job (see [`crate::operator::LinearOperator`]).
//!
//! The cache is plain owned state with no internal locking. Solvers borrow it mutably,
//! so a single thread is the only writer at any time. Callers that share one cache
//! between threads wrap it in their own lock.

use crate::{
    algorithms::{
        arnoldi::{ArnoldiRoutine, implicitly_restarted_arnoldi},
        gmres::{GmresRoutine, restarted_gmres},
        lanczos::{LanczosRoutine, lanczos_eigenpairs},
    },
    operator::{MatVecFn, OperatorId},
    scalar::{DType, Scalar, c64},
    tensor::Tensor,
};
use rand::rngs::StdRng;
use std::{any::Any, collections::HashMap, fmt, hash::Hash, sync::Arc};

/// The iteration routines that are compiled once and shared by every operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Algorithm {
    ImplicitlyRestartedArnoldi,
    Lanczos,
    Gmres,
}

impl Algorithm {
    pub fn name(self) -> &'static str {
        match self {
            Algorithm::ImplicitlyRestartedArnoldi => "imp_arnoldi",
            Algorithm::Lanczos => "eigsh_lanczos",
            Algorithm::Gmres => "gmres",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single cache namespace: `key -> artifact`, filled lazily.
#[derive(Debug)]
pub struct CompileCache<K, V> {
    entries: HashMap<K, V>,
    compilations: usize,
    hits: usize,
}

impl<K: Eq + Hash, V: Clone> CompileCache<K, V> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            compilations: 0,
            hits: 0,
        }
    }

    /// Returns the artifact stored under `key`, building it with `factory` on a miss.
    pub fn get_or_compile(&mut self, key: K, factory: impl FnOnce() -> V) -> V {
        if let Some(artifact) = self.entries.get(&key) {
            self.hits += 1;
            return artifact.clone();
        }
        let artifact = factory();
        self.compilations += 1;
        self.entries.insert(key, artifact.clone());
        artifact
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of factory invocations so far.
    pub fn compilations(&self) -> usize {
        self.compilations
    }

    pub fn hits(&self) -> usize {
        self.hits
    }
}

impl<K: Eq + Hash, V: Clone> Default for CompileCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// The sealed, shareable form of a user operator.
pub struct CompiledOperator<T> {
    id: OperatorId,
    kernel: Arc<MatVecFn<T>>,
}

impl<T: Scalar> CompiledOperator<T> {
    pub fn id(&self) -> OperatorId {
        self.id
    }

    pub fn dtype(&self) -> DType {
        T::DTYPE
    }

    /// Evaluates `A(v, args)`.
    #[inline]
    pub fn call(&self, v: &Tensor<T>, args: &[Tensor<T>]) -> Tensor<T> {
        (self.kernel)(v, args)
    }
}

impl<T> fmt::Debug for CompiledOperator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledOperator")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// The iteration entry points of one [`Algorithm`], instantiated for `f64` and [`c64`].
///
/// Entry points are plain function pointers stored type-erased; [`CompiledRoutine::entry`]
/// recovers the one whose signature is requested.
pub struct CompiledRoutine {
    algorithm: Algorithm,
    real: Arc<dyn Any + Send + Sync>,
    complex: Arc<dyn Any + Send + Sync>,
}

impl CompiledRoutine {
    fn compile(algorithm: Algorithm) -> Self {
        fn erase<F: Any + Send + Sync>(entry: F) -> Arc<dyn Any + Send + Sync> {
            Arc::new(entry)
        }
        let (real, complex) = match algorithm {
            Algorithm::ImplicitlyRestartedArnoldi => (
                erase(implicitly_restarted_arnoldi::<f64, StdRng> as ArnoldiRoutine<f64>),
                erase(implicitly_restarted_arnoldi::<c64, StdRng> as ArnoldiRoutine<c64>),
            ),
            Algorithm::Lanczos => (
                erase(lanczos_eigenpairs::<f64, StdRng> as LanczosRoutine<f64>),
                erase(lanczos_eigenpairs::<c64, StdRng> as LanczosRoutine<c64>),
            ),
            Algorithm::Gmres => (
                erase(restarted_gmres::<f64> as GmresRoutine<f64>),
                erase(restarted_gmres::<c64> as GmresRoutine<c64>),
            ),
        };
        Self {
            algorithm,
            real,
            complex,
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Returns the entry point with signature `F`, if this routine has one.
    pub fn entry<F: Copy + 'static>(&self) -> Option<F> {
        self.real
            .downcast_ref::<F>()
            .or_else(|| self.complex.downcast_ref::<F>())
            .copied()
    }
}

impl fmt::Debug for CompiledRoutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledRoutine")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Snapshot of the cache counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub operator_compilations: usize,
    pub operator_hits: usize,
    pub routine_compilations: usize,
    pub routine_hits: usize,
}

/// A compiled operator with its scalar type erased, tagged with that type.
#[derive(Clone)]
struct ErasedOperator {
    dtype: DType,
    kernel: Arc<dyn Any + Send + Sync>,
}

/// The two compile caches used by the solvers.
#[derive(Default)]
pub struct KernelCache {
    operators: CompileCache<OperatorId, ErasedOperator>,
    routines: CompileCache<Algorithm, Arc<CompiledRoutine>>,
}

impl KernelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the compiled kernel for `id`, sealing `kernel` on the first request.
    ///
    /// Fails with the cached dtype if `id` was previously compiled for a different scalar
    /// type, which cannot happen for ids handed out by [`crate::operator::LinearOperator`].
    pub(crate) fn compiled_operator<T: Scalar>(
        &mut self,
        id: OperatorId,
        kernel: &Arc<MatVecFn<T>>,
    ) -> Result<Arc<CompiledOperator<T>>, DType> {
        let erased = self.operators.get_or_compile(id, || {
            log::debug!("Compiling operator {id} ({})", T::DTYPE);
            ErasedOperator {
                dtype: T::DTYPE,
                kernel: Arc::new(CompiledOperator {
                    id,
                    kernel: Arc::clone(kernel),
                }),
            }
        });
        let dtype = erased.dtype;
        erased
            .kernel
            .downcast::<CompiledOperator<T>>()
            .map_err(|_| dtype)
    }

    /// Returns the compiled iteration routine for `algorithm`.
    pub fn routine(&mut self, algorithm: Algorithm) -> Arc<CompiledRoutine> {
        self.routines.get_or_compile(algorithm, || {
            log::debug!("Compiling {algorithm} routine");
            Arc::new(CompiledRoutine::compile(algorithm))
        })
    }

    pub fn contains_operator(&self, id: OperatorId) -> bool {
        self.operators.contains(&id)
    }

    pub fn contains_routine(&self, algorithm: Algorithm) -> bool {
        self.routines.contains(&algorithm)
    }

    pub fn operator_count(&self) -> usize {
        self.operators.len()
    }

    pub fn routine_count(&self) -> usize {
        self.routines.len()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            operator_compilations: self.operators.compilations(),
            operator_hits: self.operators.hits(),
            routine_compilations: self.routines.compilations(),
            routine_hits: self.routines.hits(),
        }
    }
}

impl fmt::Debug for KernelCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelCache")
            .field("operators", &self.operators.len())
            .field("routines", &self.routines.len())
            .field("stats", &self.stats())
            .finish()
    }
}
