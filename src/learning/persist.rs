//! Symbolic persistence of learned operators.
//!
//! Classifiers, policies, and samplers are closures and cannot be written
//! to disk. What round-trips is the symbolic content: operator schemas and
//! their option bindings, serialized as JSON records and re-bound against
//! registries of known predicates, types, options, and samplers at load
//! time.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::model::{
    BoxSpace, LiftedAtom, Nsrt, ParameterizedOption, Predicate, Sampler, StripsOperator, Type,
    Variable,
};
use crate::{Error, Result};

/// A lifted atom as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtomRecord {
    /// Predicate name.
    pub predicate: String,
    /// Argument variable names.
    pub args: Vec<String>,
}

/// One learned operator as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorRecord {
    /// Operator name.
    pub name: String,
    /// (variable name, type name) pairs.
    pub parameters: Vec<(String, String)>,
    /// Precondition atoms.
    pub preconditions: Vec<AtomRecord>,
    /// Add-effect atoms.
    pub add_effects: Vec<AtomRecord>,
    /// Delete-effect atoms.
    pub delete_effects: Vec<AtomRecord>,
    /// Side predicate names.
    pub side_predicates: Vec<String>,
    /// Bound option name.
    pub option: String,
    /// Option argument variable names.
    pub option_vars: Vec<String>,
}

fn atom_to_record(atom: &LiftedAtom) -> AtomRecord {
    AtomRecord {
        predicate: atom.predicate.name().to_string(),
        args: atom.variables.iter().map(|v| v.name.clone()).collect(),
    }
}

/// The symbolic content of one NSRT.
pub fn nsrt_to_record(nsrt: &Nsrt) -> OperatorRecord {
    OperatorRecord {
        name: nsrt.op.name.clone(),
        parameters: nsrt
            .op
            .parameters
            .iter()
            .map(|v| (v.name.clone(), v.ty.name().to_string()))
            .collect(),
        preconditions: nsrt.op.preconditions.iter().map(atom_to_record).collect(),
        add_effects: nsrt.op.add_effects.iter().map(atom_to_record).collect(),
        delete_effects: nsrt.op.delete_effects.iter().map(atom_to_record).collect(),
        side_predicates: nsrt
            .op
            .side_predicates
            .iter()
            .map(|p| p.name().to_string())
            .collect(),
        option: nsrt.option.name().to_string(),
        option_vars: nsrt.option_vars.iter().map(|v| v.name.clone()).collect(),
    }
}

/// Write an operator set to a JSON file.
pub fn save_nsrts(path: &Path, nsrts: &[Nsrt]) -> Result<()> {
    let records: Vec<OperatorRecord> = nsrts.iter().map(nsrt_to_record).collect();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(&records)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Registries for re-binding persisted records to live closures.
pub struct Registries<'a> {
    /// Known predicates by name.
    pub predicates: &'a BTreeMap<String, Predicate>,
    /// Known types by name.
    pub types: &'a BTreeMap<String, Type>,
    /// Known options by name.
    pub options: &'a BTreeMap<String, ParameterizedOption>,
    /// Known samplers by option name. Operators whose option has no
    /// registered sampler fall back to uniform sampling with a warning.
    pub samplers: &'a BTreeMap<String, Sampler>,
}

/// Read an operator set back from a JSON file, re-binding names against
/// the given registries.
pub fn load_nsrts(path: &Path, registries: &Registries<'_>) -> Result<Vec<Nsrt>> {
    let json = std::fs::read_to_string(path)?;
    let records: Vec<OperatorRecord> = serde_json::from_str(&json)?;
    records
        .into_iter()
        .map(|record| record_to_nsrt(record, registries))
        .collect()
}

fn record_to_nsrt(record: OperatorRecord, registries: &Registries<'_>) -> Result<Nsrt> {
    let mut vars_by_name: BTreeMap<String, Variable> = BTreeMap::new();
    let mut parameters = Vec::with_capacity(record.parameters.len());
    for (var_name, type_name) in &record.parameters {
        let ty = registries.types.get(type_name).ok_or_else(|| {
            Error::Learning(format!("persisted operator references unknown type {type_name}"))
        })?;
        let var = Variable::new(var_name, ty.clone());
        vars_by_name.insert(var_name.clone(), var.clone());
        parameters.push(var);
    }
    let resolve_atoms = |atoms: &[AtomRecord]| -> Result<BTreeSet<LiftedAtom>> {
        atoms
            .iter()
            .map(|rec| {
                let predicate = registries.predicates.get(&rec.predicate).ok_or_else(|| {
                    Error::Learning(format!(
                        "persisted operator references unknown predicate {}",
                        rec.predicate
                    ))
                })?;
                let variables = rec
                    .args
                    .iter()
                    .map(|name| {
                        vars_by_name.get(name).cloned().ok_or_else(|| {
                            Error::Learning(format!(
                                "persisted atom references undeclared variable {name}"
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(LiftedAtom::new(predicate.clone(), variables))
            })
            .collect()
    };
    let preconditions = resolve_atoms(&record.preconditions)?;
    let add_effects = resolve_atoms(&record.add_effects)?;
    let delete_effects = resolve_atoms(&record.delete_effects)?;
    let side_predicates = record
        .side_predicates
        .iter()
        .map(|name| {
            registries.predicates.get(name).cloned().ok_or_else(|| {
                Error::Learning(format!(
                    "persisted operator references unknown side predicate {name}"
                ))
            })
        })
        .collect::<Result<BTreeSet<_>>>()?;
    let option = registries.options.get(&record.option).cloned().ok_or_else(|| {
        Error::Learning(format!(
            "persisted operator references unknown option {}",
            record.option
        ))
    })?;
    let option_vars = record
        .option_vars
        .iter()
        .map(|name| {
            vars_by_name.get(name).cloned().ok_or_else(|| {
                Error::Learning(format!(
                    "persisted option binding references undeclared variable {name}"
                ))
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let sampler = match registries.samplers.get(&record.option) {
        Some(sampler) => sampler.clone(),
        None => {
            warn!(
                option = %record.option,
                "no sampler registered; using uniform sampling"
            );
            let space: BoxSpace = option.params_space().clone();
            Sampler::new(move |_, _, rng| space.sample(rng))
        }
    };
    let op = StripsOperator::new(
        &record.name,
        parameters,
        preconditions,
        add_effects,
        delete_effects,
        side_predicates,
    );
    Ok(Nsrt::new(op, option, option_vars, sampler))
}
