//! The module registry.
//!
//! Built once before any person is simulated, then shared read-only by every
//! worker as an `Arc<ModuleRegistry>`. There is no global lookup: callers
//! pass the registry explicitly.

use crate::error::GraphValidationError;
use crate::module::{Module, StateKind};
use crate::source;

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Immutable set of named modules.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<String, Arc<Module>>,
}

impl ModuleRegistry {
    /// Assembles a registry.
    ///
    /// Rejects duplicate names, calls to unknown or top-level modules, and
    /// submodule calls that loop back on themselves.
    pub fn from_modules(modules: Vec<Module>) -> Result<Self, GraphValidationError> {
        let mut map = BTreeMap::new();
        for module in modules {
            let name = module.name().to_string();
            if map.contains_key(&name) {
                return Err(GraphValidationError::DuplicateModule(name));
            }
            map.insert(name, Arc::new(module));
        }

        for module in map.values() {
            for state in module.states() {
                if let StateKind::CallSubmodule { submodule } = &state.kind {
                    let site = || (module.name().to_string(), state.name.clone(), submodule.clone());
                    match map.get(submodule) {
                        None => {
                            let (module, state, submodule) = site();
                            return Err(GraphValidationError::UnknownSubmodule {
                                module,
                                state,
                                submodule,
                            });
                        }
                        Some(target) if !target.is_submodule() => {
                            let (module, state, submodule) = site();
                            return Err(GraphValidationError::NotASubmodule {
                                module,
                                state,
                                submodule,
                            });
                        }
                        Some(_) => {}
                    }
                }
            }
        }

        if let Some(cycle) = find_call_cycle(&map) {
            return Err(GraphValidationError::SubmoduleCycle(cycle));
        }

        Ok(Self { modules: map })
    }

    /// Parses and validates every source, then assembles the registry.
    pub fn from_json_strs<S: AsRef<str>>(sources: &[S]) -> Result<Self, GraphValidationError> {
        let modules = sources
            .iter()
            .map(|text| source::load(text.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_modules(modules)
    }

    /// Loads every `*.json` file in `dir`, in file-name order.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, GraphValidationError> {
        let dir = dir.as_ref();
        let io_error = |path: &Path, e: std::io::Error| GraphValidationError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        };

        let mut paths = Vec::new();
        for entry in fs::read_dir(dir).map_err(|e| io_error(dir, e))? {
            let path = entry.map_err(|e| io_error(dir, e))?.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut modules = Vec::with_capacity(paths.len());
        for path in &paths {
            let text = fs::read_to_string(path).map_err(|e| io_error(path, e))?;
            let module = source::load(&text).map_err(|e| match e {
                GraphValidationError::Parse(message) => {
                    GraphValidationError::Parse(format!("{}: {}", path.display(), message))
                }
                other => other,
            })?;
            debug!("Loaded module '{}' ({} states) from {}", module.name(), module.state_count(), path.display());
            modules.push(module);
        }

        let registry = Self::from_modules(modules)?;
        info!("Loaded {} modules from {}", registry.len(), dir.display());
        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Module>> {
        self.modules.get(name)
    }

    /// All modules, ordered by name.
    pub fn modules(&self) -> impl Iterator<Item = &Arc<Module>> {
        self.modules.values()
    }

    /// Modules the scheduler starts for every person (everything but submodules).
    pub fn top_level(&self) -> impl Iterator<Item = &Arc<Module>> {
        self.modules.values().filter(|m| !m.is_submodule())
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// Returns the first submodule call path that revisits a module, if any.
///
/// Histories and call frames are keyed by module name, so a module may
/// appear at most once on any call stack.
fn find_call_cycle(modules: &BTreeMap<String, Arc<Module>>) -> Option<Vec<String>> {
    let calls: BTreeMap<&str, Vec<&str>> = modules
        .iter()
        .map(|(name, module)| {
            let targets = module
                .states()
                .filter_map(|state| match &state.kind {
                    StateKind::CallSubmodule { submodule } => Some(submodule.as_str()),
                    _ => None,
                })
                .collect();
            (name.as_str(), targets)
        })
        .collect();

    let mut finished = HashSet::new();
    for start in calls.keys() {
        let mut path = Vec::new();
        if let Some(cycle) = visit(*start, &calls, &mut path, &mut finished) {
            return Some(cycle);
        }
    }
    None
}

fn visit<'m>(
    module: &'m str,
    calls: &BTreeMap<&'m str, Vec<&'m str>>,
    path: &mut Vec<&'m str>,
    finished: &mut HashSet<&'m str>,
) -> Option<Vec<String>> {
    if let Some(pos) = path.iter().position(|m| *m == module) {
        let mut cycle: Vec<String> = path[pos..].iter().map(|m| m.to_string()).collect();
        cycle.push(module.to_string());
        return Some(cycle);
    }
    if finished.contains(module) {
        return None;
    }

    path.push(module);
    for target in calls.get(module).into_iter().flatten() {
        if let Some(cycle) = visit(*target, calls, path, finished) {
            return Some(cycle);
        }
    }
    path.pop();
    finished.insert(module);
    None
}
