//! Compiled-function cache.
//!
//! A concurrent map keyed by canonical-shape hash. Each bucket holds
//! (shape, function) pairs; a hash collision falls back to full
//! structural equivalence before anything is shared. Compilation runs
//! outside the lock and publishes once: whoever loses the race adopts
//! the already-published function, so readers never observe a
//! partially built entry.
//!
//! An active recording session bypasses the cache entirely and
//! compiles a private copy, never mutating shared state.

use std::collections::HashMap;
use std::sync::Mutex;

use graft_core::{canonicalize, equivalent, shape_hash, shape_hash_hex, CanonicalForm, Expr};

use crate::backend::{Backend, CompiledFn};
use crate::error::EvalError;
use crate::record;

#[derive(Default)]
pub struct CompiledCache {
    buckets: Mutex<HashMap<[u8; 32], Vec<(Expr, CompiledFn)>>>,
}

impl CompiledCache {
    pub fn new() -> CompiledCache {
        CompiledCache::default()
    }

    /// Canonicalizes `expr` and returns its compiled function, sharing
    /// one artifact across structurally identical shapes.
    pub fn get_or_compile(
        &self,
        backend: &dyn Backend,
        expr: &Expr,
    ) -> Result<(CanonicalForm, CompiledFn), EvalError> {
        let form = canonicalize(expr);

        if record::Recording::is_active() {
            record::note_compiled(&shape_hash_hex(&form));
            let compiled = backend.compile(&form)?;
            return Ok((form, compiled));
        }

        let hash = shape_hash(&form);
        {
            let buckets = self.buckets.lock().unwrap();
            if let Some(bucket) = buckets.get(&hash) {
                if let Some((_, f)) = bucket
                    .iter()
                    .find(|(shape, _)| equivalent(shape, &form.shape, false, true))
                {
                    return Ok((form, f.clone()));
                }
            }
        }

        let compiled = backend.compile(&form)?;
        let mut buckets = self.buckets.lock().unwrap();
        let bucket = buckets.entry(hash).or_default();
        if let Some((_, published)) = bucket
            .iter()
            .find(|(shape, _)| equivalent(shape, &form.shape, false, true))
        {
            // Lost the race: adopt the published function.
            return Ok((form, published.clone()));
        }
        bucket.push((form.shape.clone(), compiled.clone()));
        Ok((form, compiled))
    }

    /// Number of cached compiled functions, over all buckets.
    pub fn len(&self) -> usize {
        self.buckets.lock().unwrap().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InterpBackend;
    use graft_core::Param;

    fn rule(field: &str, threshold: i64) -> Expr {
        Expr::lambda(
            vec![Param::new(0, "d")],
            Expr::param(0, "d").field(field).gt(Expr::int(threshold)),
        )
    }

    #[test]
    fn identical_shapes_share_one_entry() {
        let cache = CompiledCache::new();
        let backend = InterpBackend::new();
        cache.get_or_compile(&backend, &rule("X", 5)).unwrap();
        cache.get_or_compile(&backend, &rule("X", 99)).unwrap();
        assert_eq!(cache.len(), 1);

        cache.get_or_compile(&backend, &rule("Y", 5)).unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn recording_bypasses_the_cache() {
        let cache = CompiledCache::new();
        let backend = InterpBackend::new();
        {
            let session = crate::record::Recording::start();
            cache.get_or_compile(&backend, &rule("X", 5)).unwrap();
            assert!(cache.is_empty());
            assert_eq!(session.compiled().len(), 1);
        }
        cache.get_or_compile(&backend, &rule("X", 5)).unwrap();
        assert_eq!(cache.len(), 1);
    }
}
