//! Baseline reference tables and price tables.
//!
//! Everything the engine needs beyond the per-design parameters lives here:
//! the five related reference tables (scaling exponents, baseline factor
//! rates, baseline throughputs, throughput-ratio formulas, process
//! aggregation), the exception rules that override the general power law,
//! price tables, overhead rates and the capacity validation bounds.
//!
//! Tables are plain data with serde derives, so a host application can load
//! them from whatever structured source it keeps its configuration workbook
//! in; the crate itself never touches the filesystem. A table set is
//! constructed once at process start and passed by reference to every
//! evaluation; there is no module-level cache, so independent evaluations
//! cannot leak state into each other.
//!
//! Formula strings are parsed into [`Expr`](crate::formula::Expr) trees at
//! deserialization time ([`Formula`]), never re-parsed and never evaluated
//! against anything but the supplied variable map.

use crate::formula::{Expr, FormulaError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Row labels of the factor-requirement matrix, in storage order.
///
/// Labour is in hours/year, capital in currency/year, land in m2/year.
pub const FACTOR_ROWS: [&str; 3] = ["labour", "capital", "land"];

/// A ratio formula: the source string plus its parsed expression tree.
///
/// Parsing happens exactly once, when the formula is constructed or
/// deserialized; evaluation binds only the caller-supplied variable map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Formula {
    source: String,
    expr: Expr,
}

impl Formula {
    /// Parses a formula string.
    pub fn parse(source: &str) -> Result<Self, FormulaError> {
        Ok(Formula { source: source.to_string(), expr: Expr::parse(source)? })
    }

    /// The original formula text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates against the variable map.
    pub fn eval(&self, vars: &HashMap<String, f64>) -> Result<f64, FormulaError> {
        self.expr.eval(vars)
    }
}

impl TryFrom<String> for Formula {
    type Error = FormulaError;

    fn try_from(source: String) -> Result<Self, Self::Error> {
        Formula::parse(&source)
    }
}

impl From<Formula> for String {
    fn from(f: Formula) -> String {
        f.source
    }
}

/// Power-law exponents of one process, per factor row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorExponents {
    pub labour: f64,
    pub capital: f64,
    pub land: f64,
}

impl FactorExponents {
    /// Uniform exponent across all three factors.
    pub fn uniform(p: f64) -> Self {
        FactorExponents { labour: p, capital: p, land: p }
    }

    /// Exponent for a factor row by name; `None` for an unknown row.
    pub fn for_factor(&self, factor: &str) -> Option<f64> {
        match factor {
            "labour" => Some(self.labour),
            "capital" => Some(self.capital),
            "land" => Some(self.land),
            _ => None,
        }
    }
}

/// Cost-side scaling rule: the named material rows scale with
/// `(baseline / modelled) ^ (1 - exponent)`.
///
/// `modelled` and `baseline` name throughput variables; `exponent` is the
/// material's p-value (steepness of the scale economy).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialScalingRule {
    pub materials: Vec<String>,
    pub modelled: String,
    pub baseline: String,
    pub exponent: f64,
}

/// Fixed share of an extra process's land requirement counted toward a
/// derived area (see [`ExceptionRule::LandAreaRecompute`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandShare {
    pub process: String,
    pub share: f64,
}

/// Named override of the general power-law rule for specific cells.
///
/// Applied strictly after the general pass; the rules either multiply the
/// general-rule result or overwrite it from the baseline, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExceptionRule {
    /// Multiply the scaled cell by `(vars[modelled] / vars[baseline]) ^ exponent`.
    RatioPower { modelled: String, baseline: String, exponent: f64 },
    /// Multiply the scaled cell by `(params[parameter] / reference) ^ exponent`.
    ParameterPower { parameter: String, reference: f64, exponent: f64 },
    /// Multiply the scaled cell by `multiplier` when `params[parameter]`
    /// exceeds `threshold`.
    ThresholdMultiplier { parameter: String, threshold: f64, multiplier: f64 },
    /// Overwrite the affected cells from the baseline table: the ratio is
    /// the summed scaled land requirement of `land_processes` (plus an
    /// optional share of one more process) over `vars[baseline]`, raised to
    /// the process's own exponent.
    LandAreaRecompute { land_processes: Vec<String>, extra: Option<LandShare>, baseline: String },
}

/// One exception entry: which factor rows and process columns it touches,
/// and the rule to apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingException {
    /// Affected factor rows; empty means every factor row
    pub factors: Vec<String>,
    /// Affected process columns
    pub processes: Vec<String>,
    pub rule: ExceptionRule,
}

/// Validated operating envelope for one design parameter.
///
/// Bounds are configuration, not code: an empty `parameter_bounds` list
/// disables range checking entirely (the relaxed later-revision behavior).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRange {
    pub parameter: String,
    pub min: f64,
    pub max: f64,
}

/// Factor-cost overhead rates relative to a baseline production capacity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverheadRates {
    pub land: f64,
    pub labour: f64,
    pub capital: f64,
    pub baseline_capacity: f64,
}

/// Factor overhead multipliers in evaluation units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FactorOverheadMultipliers {
    pub land: f64,
    pub labour: f64,
    pub capital: f64,
}

impl OverheadRates {
    /// Converts the configured rates to multipliers.
    ///
    /// Capital is configured in millions and converted back; land carries
    /// the baseline capacity in the same way.
    pub fn multipliers(&self) -> FactorOverheadMultipliers {
        FactorOverheadMultipliers {
            land: self.land * self.baseline_capacity / 1_000_000.0,
            labour: self.labour,
            capital: self.capital * self.baseline_capacity,
        }
    }
}

/// (material, driving-parameter, unit-price) entry of the unit-cost table.
///
/// Several entries may share a material; their contributions add.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitCostEntry {
    pub material: String,
    pub parameter: String,
    pub price: f64,
}

/// Final multiplicative correction for a material's accumulated unit cost,
/// applied exactly once after all entries have been summed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FinalMultiplier {
    /// Fixed factor (e.g. a count of subcomponents)
    Constant(f64),
    /// `params[parameter] ^ exponent` (e.g. a process-yield correction)
    ParameterPower { parameter: String, exponent: f64 },
}

/// Price tables for externally procured materials.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceTables {
    /// Price per kilogram by material row; materials missing here price at
    /// zero (documented tolerance for partially specified tables)
    pub mass: HashMap<String, f64>,
    /// Per-unit cost entries driven by design parameters
    pub unit: Vec<UnitCostEntry>,
    /// One-shot final corrections per material
    pub final_multipliers: HashMap<String, FinalMultiplier>,
}

/// The baseline reference tables, loaded once per configuration.
///
/// Read-only for the lifetime of a process; evaluations never mutate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineReferenceTables {
    /// Fine-grained process columns in evaluation order
    pub processes: Vec<String>,
    /// Ordered throughput-variable formulas over the design parameters and
    /// baseline rates; later formulas may reference earlier results
    pub throughput_formulas: Vec<(String, Formula)>,
    /// Per-process volume-ratio formulas over the throughput variables
    pub ratio_formulas: HashMap<String, Formula>,
    /// Per-process power-law exponents, per factor row
    pub process_exponents: HashMap<String, FactorExponents>,
    /// Cost-side material scaling rules
    pub material_scaling: Vec<MaterialScalingRule>,
    /// Baseline reference throughputs (`baseline_*` variables)
    pub baseline_rates: HashMap<String, f64>,
    /// Baseline factor requirements: factor row -> process -> value
    pub baseline_factors: HashMap<String, HashMap<String, f64>>,
    /// Fine-grained process -> reporting-level process
    pub process_aggregation: HashMap<String, String>,
    /// Named overrides of the general power law
    pub exceptions: Vec<ScalingException>,
    /// Per-parameter operating envelopes; empty disables range checking
    pub parameter_bounds: Vec<ParameterRange>,
    /// Factor-cost overhead rates
    pub overhead: OverheadRates,
    /// Uniform overhead multiplier on the monetary matrix; `None` disables
    pub material_overhead_multiplier: Option<f64>,
    /// Energy-carrier rows excluded from the material overhead multiplier
    pub energy_rows: Vec<String>,
    /// Process columns internal to the foreground system (their purchased-
    /// material cells are zeroed in the monetary matrix)
    pub internal_processes: Vec<String>,
    /// Materials produced inside the system boundary (priced recursively)
    pub internal_materials: Vec<String>,
}

impl BaselineReferenceTables {
    /// Builds the baseline factor matrix (factor rows x process columns)
    /// from the configured rates. Processes missing from a factor map get a
    /// zero baseline.
    pub fn baseline_factor_matrix(&self) -> crate::matrix::LabeledMatrix {
        let mut m = crate::matrix::LabeledMatrix::zeros(
            FACTOR_ROWS.iter().map(|s| s.to_string()),
            self.processes.iter().cloned(),
        );
        for factor in FACTOR_ROWS {
            if let Some(by_process) = self.baseline_factors.get(factor) {
                for process in &self.processes {
                    if let Some(v) = by_process.get(process) {
                        // Labels come from self, lookups cannot fail
                        let _ = m.set(factor, process, *v);
                    }
                }
            }
        }
        m
    }

    /// Default tables of the EV revision.
    ///
    /// Throughput formulas, ratio mappings and the exception table follow
    /// the EV reference configuration; every fixed exponent and multiplier
    /// is data here, nothing is hard-wired in the engine.
    pub fn default_ev() -> Self {
        let processes: Vec<String> = [
            "positive electrode paste mixing",
            "negative electrode paste mixing",
            "cathode coating and drying",
            "anode coating and drying",
            "binder solvent recovery",
            "calendering and slitting",
            "cell stacking",
            "terminal welding",
            "electrolyte filling and sealing",
            "formation cycling",
            "rack loading",
            "material handling",
            "dry room management",
            "module assembly",
            "pack assembly",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let throughput_formulas = [
            ("pack_per_year", "battery_manufacturing_capacity * total_packs_vehicle"),
            ("required_cell", "pack_per_year * cells_per_pack"),
            ("total_cell", "required_cell / py_cell_aging"),
            ("pack_energy", "pack_per_year * pack_energy_kwh"),
            ("electrode_area", "total_cell * cell_area / 10000"),
            (
                "positive_active_material",
                "positive_am_per_cell / 1000 * required_cell / py_am_mixing_total",
            ),
            (
                "negative_active_material",
                "negative_am_per_cell / 1000 * required_cell / py_am_mixing_total",
            ),
            (
                "binder_solvent_recovery",
                "pack_per_year * binder_solvent_ratio * cathode_binder_pvdf / py_am_mixing_total",
            ),
            (
                "cathode_solvent_evaporated_m2",
                "pack_per_year * binder_solvent_ratio * (cathode_binder_pvdf / py_am_mixing_total) / electrode_area",
            ),
            (
                "anode_solvent_evaporated_m2",
                "pack_per_year * binder_solvent_ratio * ((anode_binder_additive_sbr + anode_binder_cmc) / py_am_mixing_total) / electrode_area",
            ),
            (
                "baseline_cathode_solvent_evaporated",
                "baseline_positive_binder_evaporate_kg / baseline_electrode_area",
            ),
            (
                "baseline_anode_solvent_evaporated",
                "baseline_negative_binder_evaporate_kg / baseline_electrode_area",
            ),
        ]
        .iter()
        .map(|(name, src)| (name.to_string(), Formula::parse(src).expect("default formula parses")))
        .collect();

        let ratio_formulas: HashMap<String, Formula> = [
            ("positive electrode paste mixing", "positive_active_material / baseline_positive_active_material"),
            ("negative electrode paste mixing", "negative_active_material / baseline_negative_active_material"),
            ("cathode coating and drying", "electrode_area / baseline_electrode_area"),
            ("anode coating and drying", "electrode_area / baseline_electrode_area"),
            ("binder solvent recovery", "binder_solvent_recovery / baseline_binder_solvent_recovery"),
            ("calendering and slitting", "electrode_area / baseline_electrode_area"),
            ("cell stacking", "total_cell / baseline_total_cell"),
            ("terminal welding", "total_cell / baseline_total_cell"),
            ("electrolyte filling and sealing", "total_cell / baseline_total_cell"),
            ("formation cycling", "total_cell / baseline_total_cell"),
            ("rack loading", "total_cell / baseline_total_cell"),
            ("material handling", "required_cell / baseline_required_cell"),
            // Recomputed by the dry-room exception below
            ("dry room management", "1"),
            ("module assembly", "pack_per_year / baseline_packs"),
            ("pack assembly", "pack_per_year / baseline_packs"),
        ]
        .iter()
        .map(|(name, src)| (name.to_string(), Formula::parse(src).expect("default formula parses")))
        .collect();

        let mut process_exponents = HashMap::new();
        for process in &processes {
            let exps = match process.as_str() {
                "formation cycling" => {
                    FactorExponents { labour: 0.5, capital: 0.8, land: 0.8 }
                }
                "dry room management" => FactorExponents::uniform(0.6),
                "material handling" => FactorExponents { labour: 0.4, capital: 0.6, land: 0.7 },
                "pack assembly" | "module assembly" => {
                    FactorExponents { labour: 0.5, capital: 0.7, land: 0.8 }
                }
                _ => FactorExponents { labour: 0.5, capital: 0.6, land: 0.8 },
            };
            process_exponents.insert(process.clone(), exps);
        }

        let material_scaling = vec![
            MaterialScalingRule {
                materials: vec!["cell terminal anode".into()],
                modelled: "total_cell".into(),
                baseline: "baseline_total_cell".into(),
                exponent: 0.85,
            },
            MaterialScalingRule {
                materials: vec!["cell terminal cathode".into()],
                modelled: "total_cell".into(),
                baseline: "baseline_total_cell".into(),
                exponent: 0.85,
            },
            MaterialScalingRule {
                materials: vec!["cell container".into()],
                modelled: "total_cell".into(),
                baseline: "baseline_total_cell".into(),
                exponent: 0.85,
            },
            MaterialScalingRule {
                materials: vec!["positive active material".into()],
                modelled: "positive_active_material".into(),
                baseline: "baseline_positive_active_material".into(),
                exponent: 0.75,
            },
            MaterialScalingRule {
                materials: vec!["negative active material".into()],
                modelled: "negative_active_material".into(),
                baseline: "baseline_negative_active_material".into(),
                exponent: 0.75,
            },
            MaterialScalingRule {
                materials: vec!["module thermal conductor".into()],
                modelled: "required_cell".into(),
                baseline: "baseline_required_cell".into(),
                exponent: 0.9,
            },
        ];

        let baseline_rates: HashMap<String, f64> = [
            ("baseline_packs", 100_000.0),
            ("baseline_energy", 6_500_000.0),
            ("baseline_required_cell", 32_000_000.0),
            ("baseline_total_cell", 33_684_210.0),
            ("baseline_electrode_area", 3_400_000.0),
            ("baseline_positive_active_material", 18_000_000.0),
            ("baseline_negative_active_material", 11_000_000.0),
            ("baseline_binder_solvent_recovery", 1_500_000.0),
            ("baseline_positive_binder_evaporate_kg", 1_200_000.0),
            ("baseline_negative_binder_evaporate_kg", 900_000.0),
            ("baseline_dry_room_area", 7_000.0),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), *v))
        .collect();

        // Baseline factor requirements per process at the reference capacity.
        // Labour hr/yr, capital currency/yr (annualized), land m2/yr.
        let mut labour = HashMap::new();
        let mut capital = HashMap::new();
        let mut land = HashMap::new();
        let base_rows: [(&str, f64, f64, f64); 15] = [
            ("positive electrode paste mixing", 33_600.0, 2_710_000.0, 600.0),
            ("negative electrode paste mixing", 30_000.0, 2_320_000.0, 600.0),
            ("cathode coating and drying", 67_200.0, 8_120_000.0, 750.0),
            ("anode coating and drying", 60_000.0, 7_160_000.0, 750.0),
            ("binder solvent recovery", 15_000.0, 1_350_000.0, 225.0),
            ("calendering and slitting", 52_800.0, 3_870_000.0, 750.0),
            ("cell stacking", 105_600.0, 7_740_000.0, 905.0),
            ("terminal welding", 67_200.0, 3_870_000.0, 750.0),
            ("electrolyte filling and sealing", 57_600.0, 4_840_000.0, 905.0),
            ("formation cycling", 96_000.0, 11_610_000.0, 2_230.0),
            ("rack loading", 28_800.0, 1_930_000.0, 300.0),
            ("material handling", 62_400.0, 2_900_000.0, 900.0),
            ("dry room management", 19_200.0, 4_350_000.0, 100.0),
            ("module assembly", 86_400.0, 5_810_000.0, 900.0),
            ("pack assembly", 76_800.0, 5_320_000.0, 900.0),
        ];
        for (process, l, c, a) in base_rows {
            labour.insert(process.to_string(), l);
            capital.insert(process.to_string(), c);
            land.insert(process.to_string(), a);
        }
        let baseline_factors: HashMap<String, HashMap<String, f64>> = [
            ("labour".to_string(), labour),
            ("capital".to_string(), capital),
            ("land".to_string(), land),
        ]
        .into_iter()
        .collect();

        let process_aggregation: HashMap<String, String> = [
            ("positive electrode paste mixing", "electrode production"),
            ("negative electrode paste mixing", "electrode production"),
            ("cathode coating and drying", "electrode production"),
            ("anode coating and drying", "electrode production"),
            ("binder solvent recovery", "electrode production"),
            ("calendering and slitting", "electrode production"),
            ("cell stacking", "cell production"),
            ("terminal welding", "cell production"),
            ("electrolyte filling and sealing", "cell production"),
            ("formation cycling", "cell production"),
            ("rack loading", "cell production"),
            ("material handling", "auxiliary operations"),
            ("dry room management", "auxiliary operations"),
            ("module assembly", "module and pack assembly"),
            ("pack assembly", "module and pack assembly"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let exceptions = vec![
            ScalingException {
                factors: vec!["capital".into()],
                processes: vec!["cathode coating and drying".into()],
                rule: ExceptionRule::RatioPower {
                    modelled: "cathode_solvent_evaporated_m2".into(),
                    baseline: "baseline_cathode_solvent_evaporated".into(),
                    exponent: 0.2,
                },
            },
            ScalingException {
                factors: vec!["capital".into()],
                processes: vec!["anode coating and drying".into()],
                rule: ExceptionRule::RatioPower {
                    modelled: "anode_solvent_evaporated_m2".into(),
                    baseline: "baseline_anode_solvent_evaporated".into(),
                    exponent: 0.2,
                },
            },
            ScalingException {
                factors: vec![],
                processes: vec!["dry room management".into()],
                rule: ExceptionRule::LandAreaRecompute {
                    land_processes: vec![
                        "electrolyte filling and sealing".into(),
                        "cell stacking".into(),
                        "terminal welding".into(),
                    ],
                    extra: Some(LandShare { process: "material handling".into(), share: 1.0 / 3.0 }),
                    baseline: "baseline_dry_room_area".into(),
                },
            },
            ScalingException {
                factors: vec!["capital".into()],
                processes: vec!["pack assembly".into()],
                rule: ExceptionRule::ParameterPower {
                    parameter: "modules_per_pack".into(),
                    reference: 20.0,
                    exponent: 0.3,
                },
            },
            ScalingException {
                factors: vec!["capital".into()],
                processes: vec!["cell stacking".into()],
                rule: ExceptionRule::ParameterPower {
                    parameter: "cell_capacity_ah".into(),
                    reference: 60.0,
                    exponent: 0.95,
                },
            },
            ScalingException {
                factors: vec!["capital".into()],
                processes: vec![
                    "cell stacking".into(),
                    "formation cycling".into(),
                    "rack loading".into(),
                ],
                rule: ExceptionRule::ThresholdMultiplier {
                    parameter: "cell_capacity_ah".into(),
                    threshold: 80.0,
                    multiplier: 1.1,
                },
            },
        ];

        BaselineReferenceTables {
            processes,
            throughput_formulas,
            ratio_formulas,
            process_exponents,
            material_scaling,
            baseline_rates,
            baseline_factors,
            process_aggregation,
            exceptions,
            parameter_bounds: vec![ParameterRange {
                parameter: "battery_manufacturing_capacity".into(),
                min: 20_000.0,
                max: 500_000.0,
            }],
            overhead: OverheadRates {
                land: 1.5325,
                labour: 1.8665,
                capital: 3.8764,
                baseline_capacity: 100_000.0,
            },
            material_overhead_multiplier: Some(1.0516),
            energy_rows: vec![
                "heat, district or industrial, natural gas for battery production".into(),
                "electricity for battery production, medium voltage".into(),
            ],
            internal_processes: vec![],
            internal_materials: vec![],
        }
    }
}

impl PriceTables {
    /// Representative EV-revision price tables.
    pub fn default_ev() -> Self {
        let mass: HashMap<String, f64> = [
            ("positive active material", 22.0),
            ("negative active material", 12.0),
            ("cathode binder", 10.5),
            ("anode binder additive sbr", 2.9),
            ("anode binder cmc", 4.2),
            ("electrolyte", 14.0),
            ("separator", 9.0),
            ("cathode current collector al", 5.8),
            ("anode current collector cu", 9.4),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), *v))
        .collect();

        let unit = vec![
            UnitCostEntry { material: "cell container".into(), parameter: "cells_per_pack".into(), price: 0.35 },
            UnitCostEntry { material: "cell terminal anode".into(), parameter: "cells_per_pack".into(), price: 0.11 },
            UnitCostEntry { material: "cell terminal cathode".into(), parameter: "cells_per_pack".into(), price: 0.11 },
            UnitCostEntry { material: "module electronics".into(), parameter: "modules_per_pack".into(), price: 1.45 },
            UnitCostEntry { material: "module electronics".into(), parameter: "pack_energy_kwh".into(), price: 0.20 },
            UnitCostEntry { material: "pack terminals".into(), parameter: "total_packs_vehicle".into(), price: 12.0 },
        ];

        // Cell hardware is corrected for process yield after cell aging
        let final_multipliers: HashMap<String, FinalMultiplier> = [
            "cell container",
            "cell terminal anode",
            "cell terminal cathode",
        ]
        .iter()
        .map(|m| {
            (
                m.to_string(),
                FinalMultiplier::ParameterPower { parameter: "py_cell_aging".into(), exponent: -2.0 },
            )
        })
        .collect();

        PriceTables { mass, unit, final_multipliers }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formula_parses_on_construction() {
        let f = Formula::parse("total_cell / baseline_total_cell").unwrap();
        assert_eq!(f.source(), "total_cell / baseline_total_cell");
        assert!(Formula::parse("total_cell /").is_err());
    }

    #[test]
    fn test_default_ev_tables_are_consistent() {
        let tables = BaselineReferenceTables::default_ev();
        // Every process has a ratio formula and exponents
        for process in &tables.processes {
            assert!(tables.ratio_formulas.contains_key(process), "no ratio for {}", process);
            assert!(tables.process_exponents.contains_key(process), "no p for {}", process);
            assert!(tables.process_aggregation.contains_key(process), "no group for {}", process);
        }
        // Every exception touches known processes
        for exc in &tables.exceptions {
            for p in &exc.processes {
                assert!(tables.processes.contains(p), "unknown process {}", p);
            }
        }
    }

    #[test]
    fn test_baseline_factor_matrix_shape() {
        let tables = BaselineReferenceTables::default_ev();
        let m = tables.baseline_factor_matrix();
        assert_eq!(m.nrows(), 3);
        assert_eq!(m.ncols(), tables.processes.len());
        assert!(m.get("capital", "formation cycling").unwrap() > 0.0);
    }

    #[test]
    fn test_overhead_multiplier_conversion() {
        let rates =
            OverheadRates { land: 1.5325, labour: 1.8665, capital: 3.8764, baseline_capacity: 100_000.0 };
        let m = rates.multipliers();
        assert!((m.land - 0.15325).abs() < 1e-9);
        assert!((m.labour - 1.8665).abs() < 1e-9);
        assert!((m.capital - 387_640.0).abs() < 1e-6);
    }

    #[test]
    fn test_factor_exponents_lookup() {
        let e = FactorExponents { labour: 0.4, capital: 0.6, land: 0.8 };
        assert_eq!(e.for_factor("capital"), Some(0.6));
        assert_eq!(e.for_factor("energy"), None);
    }
}
