//! Batch evaluation over independent design-parameter sets.
//!
//! Batch evaluation is embarrassingly parallel: every layer reads the shared
//! read-only configuration and writes its own output slot, so no locking is
//! ever needed. The harness offers three modes:
//!
//! - [`run_batch`]: serial, fail-fast, with a checkpoint callback at a fixed
//!   cadence so a long batch can persist partial results and a restart does
//!   not repeat completed layers;
//! - [`run_batch_captured`]: serial, collecting one `Result` per layer; a
//!   failing design cannot corrupt or abort its neighbors;
//! - [`run_batch_parallel`] (feature `parallel`): rayon fan-out, fail-fast.
//!
//! Layer ordering is the input ordering in every mode.

use crate::cost::CostError;
use log::debug;

/// Batch execution options.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Invoke the checkpoint callback after this many completed layers
    /// (0 disables checkpointing)
    pub checkpoint_every: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        BatchOptions { checkpoint_every: 100 }
    }
}

/// A batch failure: which layer failed and why.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("evaluation of batch layer {layer} failed: {source}")]
pub struct BatchError {
    pub layer: usize,
    #[source]
    pub source: CostError,
}

/// Runs the batch serially, aborting on the first failing layer.
///
/// See [`run_batch_with_checkpoints`] for the checkpointing variant; this
/// entry point discards checkpoint notifications.
pub fn run_batch<I, T, F>(inputs: &[I], eval: F, options: &BatchOptions) -> Result<Vec<T>, BatchError>
where
    F: Fn(&I) -> Result<T, CostError>,
{
    run_batch_with_checkpoints(inputs, eval, options, |_, _: &[T]| {})
}

/// Runs the batch serially with a checkpoint callback.
///
/// `on_checkpoint(completed, layers)` fires after every
/// `options.checkpoint_every` completed layers (and once more at the end if
/// the final stretch was partial), receiving the number of completed layers
/// and the results so far. Persisting them lets a restarted batch skip
/// completed work.
pub fn run_batch_with_checkpoints<I, T, F, C>(
    inputs: &[I],
    eval: F,
    options: &BatchOptions,
    mut on_checkpoint: C,
) -> Result<Vec<T>, BatchError>
where
    F: Fn(&I) -> Result<T, CostError>,
    C: FnMut(usize, &[T]),
{
    let mut layers = Vec::with_capacity(inputs.len());
    for (layer, input) in inputs.iter().enumerate() {
        let result = eval(input).map_err(|source| BatchError { layer, source })?;
        layers.push(result);

        let completed = layer + 1;
        if options.checkpoint_every > 0 && completed % options.checkpoint_every == 0 {
            debug!("batch checkpoint at {}/{} layers", completed, inputs.len());
            on_checkpoint(completed, &layers);
        }
    }
    if options.checkpoint_every > 0 && layers.len() % options.checkpoint_every != 0 {
        on_checkpoint(layers.len(), &layers);
    }
    Ok(layers)
}

/// Runs the batch serially, capturing each layer's outcome instead of
/// aborting. Failed layers surface as `Err` slots in input order.
pub fn run_batch_captured<I, T, F>(inputs: &[I], eval: F) -> Vec<Result<T, CostError>>
where
    F: Fn(&I) -> Result<T, CostError>,
{
    inputs.iter().map(eval).collect()
}

/// Runs the batch across rayon worker threads, aborting on the first
/// failing layer.
///
/// The evaluation closure only reads shared state; each layer's result is
/// written to its own slot, so the fan-out needs no synchronization. The
/// parallel path does not checkpoint: partial-result persistence across
/// workers would need exactly the shared mutable state this mode avoids.
#[cfg(feature = "parallel")]
pub fn run_batch_parallel<I, T, F>(inputs: &[I], eval: F) -> Result<Vec<T>, BatchError>
where
    I: Sync,
    T: Send,
    F: Fn(&I) -> Result<T, CostError> + Sync,
{
    use rayon::prelude::*;

    inputs
        .par_iter()
        .enumerate()
        .map(|(layer, input)| eval(input).map_err(|source| BatchError { layer, source }))
        .collect()
}
