//! Volume-ratio scaling of costs and factor requirements.
//!
//! Every production process carries a baseline throughput; a concrete design
//! runs the same process at a modelled throughput derived from the design
//! parameters. The ratio of the two drives power-law scale economics:
//!
//! - **Factor entries** scale with `ratio ^ p`: a bigger plant needs more
//!   labour, capital and land, but less than proportionally (`p < 1`).
//! - **Cost entries** scale with `(1 / ratio) ^ (1 - p)`: the per-unit
//!   material cost falls as throughput rises past the baseline.
//!
//! At `ratio = 1` (modelled equals baseline) both laws are the identity for
//! any exponent.
//!
//! Modelled throughputs come from the ordered formula list of the reference
//! tables: each formula is evaluated against the design parameters, the
//! baseline rates and every previously computed variable, so later formulas
//! can build on earlier ones (`total_cell` on `required_cell`, and so on).

use super::{CostError, CostResult};
use crate::config::{BaselineReferenceTables, ParameterRange};
use crate::matrix::LabeledMatrix;
use crate::DesignParameterSet;
use log::debug;
use std::collections::HashMap;

/// Checks every bounded design parameter against its validated operating
/// envelope. An empty bounds list disables the check.
///
/// # Errors
///
/// [`CostError::CapacityOutOfRange`] reporting the parameter, the offending
/// value and both bounds, for the first violated envelope.
pub fn validate_bounds(bounds: &[ParameterRange], params: &DesignParameterSet) -> CostResult<()> {
    for range in bounds {
        let value = params.numeric(&range.parameter)?;
        if value < range.min || value > range.max {
            return Err(CostError::CapacityOutOfRange {
                parameter: range.parameter.clone(),
                value,
                min: range.min,
                max: range.max,
            });
        }
    }
    Ok(())
}

/// Evaluates the ordered throughput formulas of the reference tables.
///
/// Returns the full variable namespace: numeric design parameters, baseline
/// rates and every computed throughput variable. The namespace feeds the
/// per-process ratio formulas and the exception rules.
pub fn modelled_throughputs(
    tables: &BaselineReferenceTables,
    params: &DesignParameterSet,
) -> CostResult<HashMap<String, f64>> {
    let mut vars = params.numeric_values();
    for (name, value) in &tables.baseline_rates {
        vars.insert(name.clone(), *value);
    }
    for (name, formula) in &tables.throughput_formulas {
        let value = formula.eval(&vars)?;
        vars.insert(name.clone(), value);
    }
    Ok(vars)
}

/// Per-process volume ratios (modelled / baseline) from the ratio formulas.
pub fn volume_ratios(
    tables: &BaselineReferenceTables,
    vars: &HashMap<String, f64>,
) -> CostResult<HashMap<String, f64>> {
    let mut ratios = HashMap::with_capacity(tables.ratio_formulas.len());
    for (process, formula) in &tables.ratio_formulas {
        ratios.insert(process.clone(), formula.eval(vars)?);
    }
    Ok(ratios)
}

/// Looks up a throughput variable, naming it in the error.
pub fn variable(vars: &HashMap<String, f64>, name: &str) -> CostResult<f64> {
    vars.get(name).copied().ok_or_else(|| CostError::MissingBaseline(name.to_string()))
}

/// The factor-side power law: `value * ratio ^ exponent`.
pub fn factor_scale(value: f64, ratio: f64, exponent: f64) -> f64 {
    value * ratio.powf(exponent)
}

/// The cost-side multiplier for a material p-value: `(1/ratio) ^ (1 - p)`.
///
/// Written as baseline-over-modelled so that throughput above the baseline
/// shrinks the per-unit cost.
pub fn cost_scale_multiplier(ratio: f64, p: f64) -> f64 {
    (1.0 / ratio).powf(1.0 - p)
}

/// Applies the cost-side material scaling rules to a monetary matrix.
///
/// Each rule scales its material rows by
/// `(vars[baseline] / vars[modelled]) ^ (1 - exponent)` across all columns.
/// Rule materials absent from the matrix are skipped: a reference table
/// typically lists every selectable chemistry while one design uses one.
pub fn apply_material_scaling(
    monetary: &mut LabeledMatrix,
    tables: &BaselineReferenceTables,
    vars: &HashMap<String, f64>,
) -> CostResult<()> {
    for rule in &tables.material_scaling {
        let modelled = variable(vars, &rule.modelled)?;
        let baseline = variable(vars, &rule.baseline)?;
        let multiplier = cost_scale_multiplier(modelled / baseline, rule.exponent);
        for material in &rule.materials {
            if !monetary.has_row(material) {
                debug!("material scaling: '{}' not in matrix, skipped", material);
                continue;
            }
            monetary.scale_rows(&[material.as_str()], multiplier)?;
        }
    }
    Ok(())
}
