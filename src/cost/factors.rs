//! Production factor requirements: labour, capital and land per process.
//!
//! The factor matrix starts from the baseline rates of the reference tables
//! (what each process needs at the reference plant capacity) and is adjusted
//! for the modelled design: every column scales with its volume ratio raised
//! to the process's per-factor exponent, then the configured exception rules
//! override the general law for specific cells.
//!
//! Exceptions run strictly after the general pass, in configuration order.
//! Multiplicative rules compose with the general-rule result; the dry-room
//! recompute overwrites its cells from the baseline so it can never compound
//! with a previously applied general-rule factor.
//!
//! The result is a 3-row matrix (labour in hours/year, capital in
//! currency/year, land in m2/year) over the fine-grained process columns,
//! optionally folded to reporting level through the aggregation mapping.

use super::{scaling, CostError, CostResult};
use crate::config::{BaselineReferenceTables, ExceptionRule, FACTOR_ROWS};
use crate::matrix::LabeledMatrix;
use crate::DesignParameterSet;
use log::debug;
use std::collections::HashMap;

/// Computes the factor-requirement matrix for one design.
///
/// # Arguments
///
/// * `tables` - baseline reference tables (read-only, shared)
/// * `params` - design parameter snapshot
/// * `aggregated` - fold fine-grained processes to reporting level
///
/// # Errors
///
/// Capacity-range violations, missing parameters and missing throughput
/// variables are fatal and name the offending key.
pub fn factor_requirements(
    tables: &BaselineReferenceTables,
    params: &DesignParameterSet,
    aggregated: bool,
) -> CostResult<LabeledMatrix> {
    scaling::validate_bounds(&tables.parameter_bounds, params)?;

    let vars = scaling::modelled_throughputs(tables, params)?;
    let ratios = scaling::volume_ratios(tables, &vars)?;

    let baseline = tables.baseline_factor_matrix();
    let mut factors = baseline.clone();

    // General power law: every cell scales with its process ratio raised to
    // the per-factor exponent.
    for process in &tables.processes {
        let ratio = ratios
            .get(process)
            .copied()
            .ok_or_else(|| CostError::MissingBaseline(format!("volume ratio for '{}'", process)))?;
        let exponents = tables
            .process_exponents
            .get(process)
            .ok_or_else(|| CostError::MissingBaseline(format!("exponents for '{}'", process)))?;
        for factor in FACTOR_ROWS {
            let p = exponents.for_factor(factor).unwrap_or(1.0);
            let value = factors.get(factor, process)?;
            factors.set(factor, process, scaling::factor_scale(value, ratio, p))?;
        }
    }

    apply_exceptions(&mut factors, &baseline, tables, params, &vars)?;

    if aggregated {
        Ok(aggregate_columns(&factors, &tables.process_aggregation))
    } else {
        Ok(factors)
    }
}

/// Applies the configured exception rules on top of the general pass.
fn apply_exceptions(
    factors: &mut LabeledMatrix,
    baseline: &LabeledMatrix,
    tables: &BaselineReferenceTables,
    params: &DesignParameterSet,
    vars: &HashMap<String, f64>,
) -> CostResult<()> {
    for exception in &tables.exceptions {
        let rows: Vec<&str> = if exception.factors.is_empty() {
            FACTOR_ROWS.to_vec()
        } else {
            exception.factors.iter().map(String::as_str).collect()
        };
        let cols: Vec<&str> = exception.processes.iter().map(String::as_str).collect();

        match &exception.rule {
            ExceptionRule::RatioPower { modelled, baseline: base_var, exponent } => {
                let ratio = scaling::variable(vars, modelled)? / scaling::variable(vars, base_var)?;
                factors.scale_rows_in_cols(&rows, &cols, ratio.powf(*exponent))?;
            }
            ExceptionRule::ParameterPower { parameter, reference, exponent } => {
                let value = params.numeric(parameter)?;
                factors.scale_rows_in_cols(&rows, &cols, (value / reference).powf(*exponent))?;
            }
            ExceptionRule::ThresholdMultiplier { parameter, threshold, multiplier } => {
                if params.numeric(parameter)? > *threshold {
                    debug!(
                        "'{}' exceeds {}: applying x{} to {:?}",
                        parameter, threshold, multiplier, exception.processes
                    );
                    factors.scale_rows_in_cols(&rows, &cols, *multiplier)?;
                }
            }
            ExceptionRule::LandAreaRecompute { land_processes, extra, baseline: base_var } => {
                // Derived throughput: summed scaled land requirement of the
                // dry-room processes, plus the configured share of one more.
                let land_rows: Vec<&str> = land_processes.iter().map(String::as_str).collect();
                let mut area = 0.0;
                for process in &land_rows {
                    area += factors.get("land", process)?;
                }
                if let Some(share) = extra {
                    area += factors.get("land", &share.process)? * share.share;
                }
                let ratio = area / scaling::variable(vars, base_var)?;

                // Overwrite from the baseline so the general-rule result for
                // these cells cannot compound into the recompute.
                for process in &cols {
                    let exponents = tables.process_exponents.get(*process).ok_or_else(|| {
                        CostError::MissingBaseline(format!("exponents for '{}'", process))
                    })?;
                    for factor in &rows {
                        let p = exponents.for_factor(factor).unwrap_or(1.0);
                        let base_value = baseline.get(factor, process)?;
                        factors.set(factor, process, scaling::factor_scale(base_value, ratio, p))?;
                    }
                }
            }
        }
    }
    Ok(())
}

/// Folds process columns to reporting level: columns mapping to the same
/// reporting process are summed. Unmapped columns keep their own name.
/// Reporting columns appear in first-occurrence order.
pub fn aggregate_columns(
    matrix: &LabeledMatrix,
    mapping: &HashMap<String, String>,
) -> LabeledMatrix {
    let mut groups: Vec<String> = Vec::new();
    for col in matrix.columns() {
        let group = mapping.get(col).cloned().unwrap_or_else(|| col.clone());
        if !groups.contains(&group) {
            groups.push(group);
        }
    }

    let mut aggregated =
        LabeledMatrix::zeros(matrix.rows().iter().cloned(), groups.iter().cloned());
    for col in matrix.columns().to_vec() {
        let group = mapping.get(&col).cloned().unwrap_or_else(|| col.clone());
        for row in matrix.rows().to_vec() {
            // Labels constructed above, lookups cannot fail
            let value = matrix.get(&row, &col).unwrap_or(0.0);
            let current = aggregated.get(&row, &group).unwrap_or(0.0);
            let _ = aggregated.set(&row, &group, current + value);
        }
    }
    aggregated
}

/// Scales each factor row by its overhead multiplier, converting physical
/// factor requirements into overhead-inclusive cost terms.
pub fn apply_factor_overheads(
    factors: &mut LabeledMatrix,
    tables: &BaselineReferenceTables,
) -> CostResult<()> {
    let multipliers = tables.overhead.multipliers();
    factors.scale_rows(&["labour"], multipliers.labour)?;
    factors.scale_rows(&["capital"], multipliers.capital)?;
    factors.scale_rows(&["land"], multipliers.land)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baseline_params() -> DesignParameterSet {
        // Runs the plant at exactly the reference rates so every general-rule
        // ratio is 1 and deviations isolate the exception under test.
        DesignParameterSet::new()
            .with_numeric("battery_manufacturing_capacity", 100_000.0)
            .with_numeric("total_packs_vehicle", 1.0)
            .with_numeric("cells_per_pack", 320.0)
            .with_numeric("py_cell_aging", 0.95)
            .with_numeric("pack_energy_kwh", 65.0)
            .with_numeric("cell_area", 1_000.0)
            .with_numeric("positive_am_per_cell", 562.5)
            .with_numeric("negative_am_per_cell", 343.75)
            .with_numeric("py_am_mixing_total", 1.0)
            .with_numeric("binder_solvent_ratio", 1.0)
            .with_numeric("cathode_binder_pvdf", 15.0)
            .with_numeric("anode_binder_additive_sbr", 6.0)
            .with_numeric("anode_binder_cmc", 5.25)
            .with_numeric("modules_per_pack", 20.0)
            .with_numeric("cell_capacity_ah", 60.0)
    }

    #[test]
    fn test_capacity_below_minimum_fails_fast() {
        let tables = BaselineReferenceTables::default_ev();
        let params = baseline_params().with_numeric("battery_manufacturing_capacity", 10_000.0);
        let err = factor_requirements(&tables, &params, false).unwrap_err();
        assert!(matches!(err, CostError::CapacityOutOfRange { .. }));
    }

    #[test]
    fn test_unbounded_tables_accept_any_capacity() {
        let mut tables = BaselineReferenceTables::default_ev();
        tables.parameter_bounds.clear();
        let params = baseline_params().with_numeric("battery_manufacturing_capacity", 10_000.0);
        assert!(factor_requirements(&tables, &params, false).is_ok());
    }

    #[test]
    fn test_threshold_multiplier_only_above_threshold() {
        let tables = BaselineReferenceTables::default_ev();

        let below = factor_requirements(&tables, &baseline_params(), false).unwrap();
        let above = factor_requirements(
            &tables,
            &baseline_params().with_numeric("cell_capacity_ah", 90.0),
            false,
        )
        .unwrap();

        let f_below = below.get("capital", "formation cycling").unwrap();
        let f_above = above.get("capital", "formation cycling").unwrap();
        assert!((f_above / f_below - 1.1).abs() < 1e-9);

        // Labour rows are not touched by the capital-only rule
        let l_below = below.get("labour", "formation cycling").unwrap();
        let l_above = above.get("labour", "formation cycling").unwrap();
        assert!((l_above - l_below).abs() < 1e-9);
    }

    #[test]
    fn test_pack_assembly_modules_exception() {
        let tables = BaselineReferenceTables::default_ev();
        let reference = factor_requirements(&tables, &baseline_params(), false).unwrap();
        let doubled = factor_requirements(
            &tables,
            &baseline_params().with_numeric("modules_per_pack", 40.0),
            false,
        )
        .unwrap();
        let ratio = doubled.get("capital", "pack assembly").unwrap()
            / reference.get("capital", "pack assembly").unwrap();
        assert!((ratio - 2.0_f64.powf(0.3)).abs() < 1e-9);
    }

    #[test]
    fn test_dry_room_overwrites_not_compounds() {
        let tables = BaselineReferenceTables::default_ev();
        let params = baseline_params();
        let factors = factor_requirements(&tables, &params, false).unwrap();

        // Recompute the expectation by hand from the baseline table
        let baseline = tables.baseline_factor_matrix();
        let area = factors.get("land", "electrolyte filling and sealing").unwrap()
            + factors.get("land", "cell stacking").unwrap()
            + factors.get("land", "terminal welding").unwrap()
            + factors.get("land", "material handling").unwrap() / 3.0;
        let ratio = area / tables.baseline_rates["baseline_dry_room_area"];
        let p = tables.process_exponents["dry room management"].capital;
        let expected = baseline.get("capital", "dry room management").unwrap() * ratio.powf(p);

        let actual = factors.get("capital", "dry room management").unwrap();
        assert!((actual - expected).abs() < 1e-6, "got {}, expected {}", actual, expected);
    }

    #[test]
    fn test_aggregation_sums_grouped_columns() {
        let tables = BaselineReferenceTables::default_ev();
        let params = baseline_params();
        let fine = factor_requirements(&tables, &params, false).unwrap();
        let coarse = factor_requirements(&tables, &params, true).unwrap();

        let expected = fine.get("labour", "cathode coating and drying").unwrap()
            + fine.get("labour", "anode coating and drying").unwrap()
            + fine.get("labour", "positive electrode paste mixing").unwrap()
            + fine.get("labour", "negative electrode paste mixing").unwrap()
            + fine.get("labour", "binder solvent recovery").unwrap()
            + fine.get("labour", "calendering and slitting").unwrap();
        let actual = coarse.get("labour", "electrode production").unwrap();
        assert!((actual - expected).abs() < 1e-6);

        // Totals are preserved by aggregation
        assert!((fine.total() - coarse.total()).abs() < 1e-6);
    }

    #[test]
    fn test_factor_overheads_scale_rows() {
        let tables = BaselineReferenceTables::default_ev();
        let mut factors = factor_requirements(&tables, &baseline_params(), false).unwrap();
        let before = factors.get("labour", "pack assembly").unwrap();
        apply_factor_overheads(&mut factors, &tables).unwrap();
        let after = factors.get("labour", "pack assembly").unwrap();
        assert!((after / before - tables.overhead.labour).abs() < 1e-9);
    }
}
