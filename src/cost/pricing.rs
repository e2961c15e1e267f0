//! Mass- and unit-basis material costs.
//!
//! Externally procured materials are priced two ways:
//!
//! - **Mass cost**: every technology-matrix quantity is multiplied by the
//!   material's price per kilogram. Materials missing from the mass price
//!   table price at zero; partially specified tables are tolerated, not an
//!   error.
//! - **Unit cost**: hardware items (cell containers, terminals, module
//!   electronics, ...) are priced per unit through a driving design
//!   parameter, divided by the material's weight so the result lands on the
//!   same per-kilogram basis as the technology matrix. Several entries may
//!   contribute to the same material; an optional final multiplier (a
//!   subcomponent count or a process-yield correction) is applied once,
//!   after all contributions are summed.
//!
//! A unit cost is attributed to the single process that consumes the
//! material (its negative flow). Materials no process consumes are skipped.

use super::CostResult;
use crate::config::{FinalMultiplier, UnitCostEntry};
use crate::matrix::LabeledMatrix;
use crate::{normalize_key, DesignParameterSet};
use std::collections::HashMap;

/// Builds the mass-basis monetary matrix: each cell of `technology` times
/// the mass price of its material row.
///
/// Materials absent from `mass_prices` contribute zero cost.
pub fn mass_cost_matrix(
    technology: &LabeledMatrix,
    mass_prices: &HashMap<String, f64>,
) -> LabeledMatrix {
    let mut monetary = technology.clone();
    for material in technology.rows().to_vec() {
        let price = mass_prices.get(&material).copied().unwrap_or(0.0);
        // Row labels come from the matrix itself, scaling cannot fail
        let _ = monetary.scale_rows(&[material.as_str()], price);
    }
    monetary
}

/// Accumulates per-material unit costs from the unit price table.
///
/// For each entry the contribution is
/// `params[entry.parameter] * entry.price / params[normalize_key(material)]`;
/// entries sharing a material add up. Final multipliers are applied exactly
/// once per material after accumulation.
///
/// # Errors
///
/// [`super::CostError::Parameter`] when the material weight, a driving
/// parameter or a final-multiplier parameter is missing. A material
/// whose weight is zero (component not present in this design) is skipped.
pub fn unit_costs(
    entries: &[UnitCostEntry],
    final_multipliers: &HashMap<String, FinalMultiplier>,
    params: &DesignParameterSet,
) -> CostResult<HashMap<String, f64>> {
    let mut costs: HashMap<String, f64> = HashMap::new();

    for entry in entries {
        let weight = params.numeric(&normalize_key(&entry.material))?;
        if weight <= 0.0 {
            // Component not present in this design
            continue;
        }
        let driver = params.numeric(&entry.parameter)?;
        *costs.entry(entry.material.clone()).or_insert(0.0) += driver * entry.price / weight;
    }

    for (material, cost) in costs.iter_mut() {
        if let Some(multiplier) = final_multipliers.get(material) {
            *cost *= match multiplier {
                FinalMultiplier::Constant(c) => *c,
                FinalMultiplier::ParameterPower { parameter, exponent } => {
                    params.numeric(parameter)?.powf(*exponent)
                }
            };
        }
    }

    Ok(costs)
}

/// Maps each material to the process that consumes it (first column with a
/// negative flow in that material's row). Materials no process consumes are
/// omitted.
pub fn consuming_processes(
    materials: impl IntoIterator<Item = String>,
    technology: &LabeledMatrix,
) -> CostResult<HashMap<String, String>> {
    let mut mapping = HashMap::new();
    for material in materials {
        if !technology.has_row(&material) {
            continue;
        }
        if let Some(process) = technology.consumer_of(&material)? {
            mapping.insert(material, process);
        }
    }
    Ok(mapping)
}

/// Adds the unit cost of each mapped material to its consuming process,
/// weighted by the absolute technology-matrix quantity.
pub fn attribute_unit_costs(
    monetary: &mut LabeledMatrix,
    technology: &LabeledMatrix,
    unit_costs: &HashMap<String, f64>,
    mapping: &HashMap<String, String>,
) -> CostResult<()> {
    for (material, process) in mapping {
        let Some(cost) = unit_costs.get(material) else { continue };
        let quantity = technology.get(material, process)?.abs();
        let current = monetary.get(material, process)?;
        monetary.set(material, process, current + cost * quantity)?;
    }
    Ok(())
}
