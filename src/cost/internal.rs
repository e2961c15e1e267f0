//! Internal-price resolution for materials produced inside the system
//! boundary.
//!
//! Materials with no external market price (electrode pastes, coated foils,
//! finished cells, ...) are priced from their own production process: the
//! unit price is the absolute summed cost of the process's input materials
//! divided by the absolute summed physical quantity of those inputs. When an
//! input is itself internal, its price must be resolved first. The
//! dependency chain is walked depth-first with an explicit worklist rather
//! than language-level recursion, so pathological configurations cannot
//! overflow the stack, and a true cyclic dependency is detected and rejected
//! instead of looping.
//!
//! Each resolved price is memoized for the duration of one resolution pass
//! and the priced row is written back into the monetary matrix
//! (`C[m, :] = price * A[m, :]`). The resolver is created per evaluation and
//! dropped afterwards; no state survives between independent evaluations.
//!
//! # Example
//!
//! ```
//! use battecon::cost::internal::InternalPriceResolver;
//! use battecon::matrix::LabeledMatrix;
//!
//! // "paste" is produced by mixing from 2 kg of binder costing 10 total,
//! // then consumed by coating.
//! let technology = LabeledMatrix::from_rows(
//!     vec!["binder".into(), "paste".into()],
//!     vec!["mixing".into(), "coating".into()],
//!     &[-2.0, 0.0, 1.0, -1.0],
//! )
//! .unwrap();
//! let mut monetary = LabeledMatrix::from_rows(
//!     vec!["binder".into(), "paste".into()],
//!     vec!["mixing".into(), "coating".into()],
//!     &[-10.0, 0.0, 0.0, 0.0],
//! )
//! .unwrap();
//!
//! let mut resolver = InternalPriceResolver::new(&technology, &["paste".into()]);
//! resolver.resolve_all(&mut monetary).unwrap();
//! assert_eq!(resolver.price("paste"), Some(5.0));
//! assert_eq!(monetary.get("paste", "coating").unwrap(), -5.0);
//! ```

use super::{CostError, CostResult};
use crate::matrix::LabeledMatrix;
use log::debug;
use std::collections::HashMap;

/// Resolves unit prices of internally produced materials against a
/// technology matrix, writing priced rows into the monetary matrix.
pub struct InternalPriceResolver<'a> {
    technology: &'a LabeledMatrix,
    internal: Vec<String>,
    memo: HashMap<String, f64>,
    resolutions: usize,
}

impl<'a> InternalPriceResolver<'a> {
    /// Creates a resolver for one evaluation.
    ///
    /// `internal_materials` are the rows priced recursively; every other
    /// material is assumed to carry its external cost in the monetary matrix
    /// already.
    pub fn new(technology: &'a LabeledMatrix, internal_materials: &[String]) -> Self {
        InternalPriceResolver {
            technology,
            internal: internal_materials.to_vec(),
            memo: HashMap::new(),
            resolutions: 0,
        }
    }

    /// Resolves every internal material, in configuration order.
    pub fn resolve_all(&mut self, monetary: &mut LabeledMatrix) -> CostResult<()> {
        for material in self.internal.clone() {
            self.resolve(&material, monetary)?;
        }
        Ok(())
    }

    /// Resolves one material's unit price, resolving its internal inputs
    /// first. Prices already memoized are returned without recomputation.
    ///
    /// # Errors
    ///
    /// - [`CostError::NoProducingProcess`] if no column outputs the material
    /// - [`CostError::CyclicInternalPrice`] if the material transitively
    ///   depends on its own unresolved price; the error carries the cycle
    pub fn resolve(&mut self, material: &str, monetary: &mut LabeledMatrix) -> CostResult<f64> {
        if let Some(price) = self.memo.get(material) {
            return Ok(*price);
        }

        // Depth-first walk with an explicit stack; the stack doubles as the
        // in-progress set for cycle detection.
        let mut stack: Vec<String> = vec![material.to_string()];
        while let Some(current) = stack.last().cloned() {
            if self.memo.contains_key(&current) {
                stack.pop();
                continue;
            }

            let producer = self
                .technology
                .producer_of(&current)?
                .ok_or_else(|| CostError::NoProducingProcess(current.clone()))?;
            let inputs = self.technology.inputs_of(&producer)?;

            let unresolved = inputs
                .iter()
                .find(|input| self.internal.contains(*input) && !self.memo.contains_key(*input))
                .cloned();

            match unresolved {
                Some(dependency) => {
                    if let Some(pos) = stack.iter().position(|m| *m == dependency) {
                        let mut cycle: Vec<String> = stack[pos..].to_vec();
                        cycle.push(dependency);
                        return Err(CostError::CyclicInternalPrice { cycle });
                    }
                    stack.push(dependency);
                }
                None => {
                    let price = self.price_from_inputs(&current, &producer, &inputs, monetary)?;
                    self.memo.insert(current.clone(), price);
                    self.resolutions += 1;
                    debug!("internal price of '{}': {:.6} via '{}'", current, price, producer);
                    stack.pop();
                }
            }
        }

        Ok(self.memo[material])
    }

    /// `abs(sum of input costs) / abs(sum of input quantities)` at the
    /// producing process, then `C[m, :] = price * A[m, :]`.
    fn price_from_inputs(
        &self,
        material: &str,
        producer: &str,
        inputs: &[String],
        monetary: &mut LabeledMatrix,
    ) -> CostResult<f64> {
        let input_refs: Vec<&str> = inputs.iter().map(String::as_str).collect();
        let cost_sum = monetary.column_sum_over_rows(&input_refs, producer)?;
        let quantity_sum = self.technology.column_sum_over_rows(&input_refs, producer)?;

        let price = if quantity_sum.abs() < f64::EPSILON {
            // A producing process with no material inputs prices at zero
            // (its cost lives in the factor matrix, not here)
            0.0
        } else {
            (cost_sum / quantity_sum).abs()
        };

        let priced_row: Vec<f64> =
            self.technology.row(material)?.iter().map(|q| q * price).collect();
        monetary.set_row(material, &priced_row)?;
        Ok(price)
    }

    /// The memoized price of a material, if resolved.
    pub fn price(&self, material: &str) -> Option<f64> {
        self.memo.get(material).copied()
    }

    /// All prices resolved so far.
    pub fn prices(&self) -> &HashMap<String, f64> {
        &self.memo
    }

    /// Number of price computations performed (memo hits excluded).
    pub fn resolutions(&self) -> usize {
        self.resolutions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// binder -> paste (mixing), paste -> coated foil (coating),
    /// coated foil -> cell (assembly)
    fn chain() -> (LabeledMatrix, LabeledMatrix) {
        let rows: Vec<String> =
            vec!["binder".into(), "paste".into(), "coated foil".into(), "cell".into()];
        let cols: Vec<String> =
            vec!["mixing".into(), "coating".into(), "assembly".into()];
        let technology = LabeledMatrix::from_rows(
            rows.clone(),
            cols.clone(),
            &[
                -2.0, 0.0, 0.0, //
                1.0, -4.0, 0.0, //
                0.0, 1.0, -0.5, //
                0.0, 0.0, 1.0,
            ],
        )
        .unwrap();
        let monetary = LabeledMatrix::from_rows(
            rows,
            cols,
            &[
                -10.0, 0.0, 0.0, //
                0.0, 0.0, 0.0, //
                0.0, 0.0, 0.0, //
                0.0, 0.0, 0.0,
            ],
        )
        .unwrap();
        (technology, monetary)
    }

    #[test]
    fn test_direct_resolution() {
        let (technology, mut monetary) = chain();
        let internal = vec!["paste".to_string()];
        let mut resolver = InternalPriceResolver::new(&technology, &internal);
        let price = resolver.resolve("paste", &mut monetary).unwrap();
        // |-10| / |-2| = 5 per kg of paste
        assert!((price - 5.0).abs() < 1e-12);
        assert!((monetary.get("paste", "coating").unwrap() - -20.0).abs() < 1e-12);
        assert!((monetary.get("paste", "mixing").unwrap() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_transitive_resolution_depth_first() {
        let (technology, mut monetary) = chain();
        let internal = vec!["coated foil".to_string(), "paste".to_string()];
        let mut resolver = InternalPriceResolver::new(&technology, &internal);
        // Resolving the foil forces the paste first
        let price = resolver.resolve("coated foil", &mut monetary).unwrap();
        // paste: 10/2 = 5; foil consumes 4 kg paste costing 20, so 20/4 = 5
        assert!((price - 5.0).abs() < 1e-12);
        assert_eq!(resolver.price("paste"), Some(5.0));
        assert_eq!(resolver.resolutions(), 2);
        // The cell's input row was repriced
        assert!((monetary.get("coated foil", "assembly").unwrap() - -2.5).abs() < 1e-12);
    }

    #[test]
    fn test_memo_is_idempotent() {
        let (technology, mut monetary) = chain();
        let internal = vec!["coated foil".to_string(), "paste".to_string()];
        let mut resolver = InternalPriceResolver::new(&technology, &internal);

        let first = resolver.resolve("coated foil", &mut monetary).unwrap();
        let walks = resolver.resolutions();
        // Second resolution returns the memoized value without walking again
        let second = resolver.resolve("coated foil", &mut monetary).unwrap();
        assert_eq!(first, second);
        assert_eq!(resolver.resolutions(), walks);

        resolver.resolve_all(&mut monetary).unwrap();
        assert_eq!(resolver.resolutions(), walks);
    }

    #[test]
    fn test_cycle_is_rejected_with_cycle_reported() {
        // a is made from b, b is made from a
        let rows: Vec<String> = vec!["a".into(), "b".into()];
        let cols: Vec<String> = vec!["make a".into(), "make b".into()];
        let technology = LabeledMatrix::from_rows(
            rows.clone(),
            cols.clone(),
            &[
                1.0, -1.0, //
                -1.0, 1.0,
            ],
        )
        .unwrap();
        let mut monetary = LabeledMatrix::zeros(rows.clone(), cols);

        let internal = vec!["a".to_string(), "b".to_string()];
        let mut resolver = InternalPriceResolver::new(&technology, &internal);
        let err = resolver.resolve("a", &mut monetary).unwrap_err();
        match err {
            CostError::CyclicInternalPrice { cycle } => {
                assert!(cycle.first() == cycle.last());
                assert!(cycle.contains(&"a".to_string()) || cycle.contains(&"b".to_string()));
            }
            other => panic!("expected cycle error, got {:?}", other),
        }
    }

    #[test]
    fn test_material_without_producer_is_error() {
        let (technology, mut monetary) = chain();
        let internal = vec!["binder".to_string()];
        let mut resolver = InternalPriceResolver::new(&technology, &internal);
        let err = resolver.resolve("binder", &mut monetary).unwrap_err();
        assert!(matches!(err, CostError::NoProducingProcess(m) if m == "binder"));
    }
}
