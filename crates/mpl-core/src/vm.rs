//! The MPL virtual machine.

use crate::sim::{next_unit_f64, reseed, to_coord, ActiveRule, RuleOrigin, Simulation};
use crate::trace::{RuleTrace, TraceCollector, VoxelPos};
use indexmap::IndexMap;
use log::debug;
use mpl_eval::{
    Environment, Evaluator, FnTable, FunctionValue, GridHost, Limits, NeighborStats,
    RuntimeError, RuntimeResult, Value,
};
use mpl_grid::pattern::{self, ApplyOptions, Pattern, PatternError, PatternMeta};
use mpl_grid::{Changeset, GridSize, GridSnapshot, Layer, LayerSnapshot};
use mpl_rules::{CompileResult, CompiledUnit, ReloadEvent, RuleRegistry};
use mpl_types::{MplError, SourceFile};
use rand_chacha::ChaCha8Rng;
use rand::SeedableRng;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// One layer to create at VM construction.
#[derive(Debug, Clone)]
pub struct LayerSpec {
    pub id: String,
    pub name: String,
}

/// VM construction options.
#[derive(Debug, Clone)]
pub struct VmConfig {
    /// Grid dimensions, fixed for the VM's lifetime (2D programs use z = 1).
    pub size: GridSize,
    /// Layers to create; the first is the initial active layer.
    pub layers: Vec<LayerSpec>,
    /// Seed for the `random()` stream.
    pub seed: u64,
    /// Evaluation safety limits.
    pub limits: Limits,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            size: GridSize::new(32, 32, 1),
            layers: vec![LayerSpec {
                id: "base".to_string(),
                name: "Base".to_string(),
            }],
            seed: 0,
            limits: Limits::default(),
        }
    }
}

/// Outcome of one `execute()` call.
#[derive(Debug)]
pub struct ExecReport {
    /// Lexer + parser errors. Non-empty means nothing ran.
    pub errors: Vec<MplError>,
    /// Runtime error caught at the top-level boundary, if any.
    /// Mutations committed before the failure are kept.
    pub runtime_error: Option<RuntimeError>,
}

impl ExecReport {
    /// `true` when the program compiled and ran to completion.
    pub fn ok(&self) -> bool {
        self.errors.is_empty() && self.runtime_error.is_none()
    }
}

/// The MPL virtual machine: one instance owns the whole engine state.
pub struct Vm {
    env: Environment,
    functions: FnTable,
    rules: FnTable,
    sim: Simulation,
    registry: RuleRegistry,
    rng: ChaCha8Rng,
    seed: u64,
    limits: Limits,
    log_buffer: Vec<String>,
    tracer: TraceCollector,
    cancel: Arc<AtomicBool>,
}

impl Vm {
    /// Single-layer VM with default limits and seed 0.
    pub fn new(size: GridSize) -> Self {
        Self::with_config(VmConfig {
            size,
            ..VmConfig::default()
        })
    }

    pub fn with_config(config: VmConfig) -> Self {
        let layers: Vec<Layer> = config
            .layers
            .iter()
            .map(|spec| Layer::new(spec.id.clone(), spec.name.clone(), config.size))
            .collect();
        Self {
            env: Environment::new(),
            functions: IndexMap::new(),
            rules: IndexMap::new(),
            sim: Simulation::with_layers(layers),
            registry: RuleRegistry::new(),
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            seed: config.seed,
            limits: config.limits,
            log_buffer: Vec::new(),
            tracer: TraceCollector::new(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    // ── Program execution ─────────────────────────────────────────────────

    /// Compile and run MPL source against this VM.
    ///
    /// Compilation failures return the structured error list without
    /// running anything; a runtime error is caught at the top-level
    /// boundary and reported without corrupting engine state.
    pub fn execute(&mut self, source: &str) -> ExecReport {
        let source_file = SourceFile::new("input.mpl", source);
        let (program, errors) = mpl_parser::parse_source(&source_file);
        if errors.has_errors() || program.is_none() {
            return ExecReport {
                errors: errors.errors,
                runtime_error: None,
            };
        }
        let program = program.expect("checked above");

        let cancel = Arc::clone(&self.cancel);
        let cancel_flag: &AtomicBool = &cancel;
        let mut host = EngineHost {
            sim: &mut self.sim,
            registry: &self.registry,
            rng: &mut self.rng,
            log: &mut self.log_buffer,
            tracer: &mut self.tracer,
            limits: self.limits,
            cancel: cancel_flag,
        };
        let mut evaluator = Evaluator::new(
            &mut self.env,
            &mut self.functions,
            &mut self.rules,
            &mut host,
        )
        .with_limits(self.limits)
        .with_cancel_flag(cancel_flag);

        let runtime_error = evaluator.run(&program).err();
        if let Some(err) = &runtime_error {
            debug!("program stopped: {err}");
        }
        ExecReport {
            errors: Vec::new(),
            runtime_error,
        }
    }

    /// Run one tick without executing source (host-driven stepping).
    pub fn step(&mut self) -> RuntimeResult<Changeset> {
        self.sim.run_tick(
            &mut self.rng,
            &mut self.tracer,
            &mut self.log_buffer,
            self.limits,
            Some(&*self.cancel),
        )
    }

    /// Reset grid, language state, RNG, and log to a fresh VM with the
    /// same configuration. The active rule set in the registry survives.
    pub fn reset(&mut self) {
        self.env = Environment::new();
        self.functions.clear();
        self.rules.clear();
        self.sim.reset();
        self.rng = ChaCha8Rng::seed_from_u64(self.seed);
        self.log_buffer.clear();
        self.tracer = TraceCollector::new();
        self.cancel.store(false, Ordering::Relaxed);
    }

    // ── Introspection ─────────────────────────────────────────────────────

    pub fn size(&self) -> GridSize {
        self.sim.size()
    }

    pub fn step_count(&self) -> u64 {
        self.sim.step_count()
    }

    pub fn version(&self) -> u64 {
        self.sim.version()
    }

    pub fn last_changeset(&self) -> &Changeset {
        self.sim.last_changeset()
    }

    /// Read a global variable (after `execute()` only globals remain).
    pub fn get_global(&self, name: &str) -> Option<Value> {
        self.env.get(name).cloned()
    }

    pub fn function_names(&self) -> Vec<String> {
        self.functions.keys().cloned().collect()
    }

    pub fn rule_names(&self) -> Vec<String> {
        self.rules.keys().cloned().collect()
    }

    pub fn active_rule_names(&self) -> Vec<String> {
        self.sim.active_rule_names()
    }

    /// `print()` output accumulated so far.
    pub fn log_buffer(&self) -> &[String] {
        &self.log_buffer
    }

    pub fn take_log(&mut self) -> Vec<String> {
        std::mem::take(&mut self.log_buffer)
    }

    /// Cooperative cancellation handle; set it from another thread to
    /// stop a running program or tick at the next check point.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    // ── Snapshots ─────────────────────────────────────────────────────────

    /// Versioned snapshot of the active layer. Poll the `version`
    /// field; an unchanged version means no new data.
    pub fn snapshot(&mut self) -> GridSnapshot {
        self.sim.snapshot(now_ms())
    }

    /// Versioned snapshot of every layer.
    pub fn layer_snapshots(&mut self) -> (u64, Vec<LayerSnapshot>) {
        self.sim.layer_snapshots()
    }

    // ── Pattern I/O ───────────────────────────────────────────────────────

    /// Export the active layer as a single-layer pattern.
    pub fn export_pattern(&self, meta: PatternMeta) -> Pattern {
        pattern::export_single(
            &self.sim.layers()[self.sim.active_layer()].buffer,
            meta,
        )
    }

    /// Export every layer as a multi-layer pattern.
    pub fn export_layers_pattern(&self, meta: PatternMeta) -> Pattern {
        pattern::export_layers(self.sim.layers(), meta)
    }

    /// Apply a pattern document. Returns the number of cells written.
    pub fn apply_pattern(
        &mut self,
        doc: &Pattern,
        options: &ApplyOptions,
    ) -> Result<usize, PatternError> {
        let default_layer = self.sim.active_layer();
        pattern::apply_pattern(self.sim.layers_mut(), default_layer, doc, options)
    }

    // ── Rule hot reload ───────────────────────────────────────────────────

    /// Validate rule source without staging (live-preview linting).
    pub fn validate_source(&self, source: &str) -> CompileResult {
        RuleRegistry::validate_source(source)
    }

    /// Compile rule source into the staged slot.
    pub fn stage_rules(&mut self, source: &str) -> CompileResult {
        self.registry.stage(source, now_ms())
    }

    /// Atomically publish the staged rule set. Active simulation rules
    /// that came from the registry are re-bound to the new unit (or
    /// deactivated when their names are gone).
    pub fn apply_staged(&mut self) -> bool {
        if !self.registry.apply_staged(now_ms()) {
            return false;
        }
        if let Some(unit) = self.registry.active() {
            self.sim
                .rebind_registry_rules(|name| resolve_in_unit(unit, name));
        }
        true
    }

    /// Discard the staged rule set.
    pub fn rollback_staged(&mut self) {
        self.registry.rollback_staged();
    }

    pub fn has_staged_rules(&self) -> bool {
        self.registry.has_staged()
    }

    /// Drain pending reload events for the UI/event bus.
    pub fn take_reload_events(&mut self) -> Vec<ReloadEvent> {
        self.registry.take_events()
    }

    // ── Debug tracing ─────────────────────────────────────────────────────

    /// Target a cell for rule-debug tracing (`None` disables).
    pub fn set_trace_target(&mut self, target: Option<VoxelPos>) {
        self.tracer.set_target(target);
    }

    /// Drain completed traces.
    pub fn take_traces(&mut self) -> Vec<RuleTrace> {
        self.tracer.take_traces()
    }
}

/// Wall-clock ms since the epoch (display metadata only).
fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Resolve a rule in a compiled unit, building the merged helper table
/// (functions first, rules overriding on name clash, mirroring call
/// dispatch order).
fn resolve_in_unit(unit: &CompiledUnit, name: &str) -> Option<(Rc<FunctionValue>, FnTable)> {
    let func = unit.rules.get(name)?;
    let mut helpers = unit.helpers.clone();
    for (rule_name, rule) in &unit.rules {
        helpers.insert(rule_name.clone(), Rc::clone(rule));
    }
    Some((Rc::clone(func), helpers))
}

// ─────────────────────────────────────────────────────────────────────
// Top-level host
// ─────────────────────────────────────────────────────────────────────

/// Host for top-level program execution: grid calls hit the live
/// buffers, `step()` runs the tick scheduler, and neighbor builtins
/// are unavailable (no cell context).
struct EngineHost<'a> {
    sim: &'a mut Simulation,
    registry: &'a RuleRegistry,
    rng: &'a mut ChaCha8Rng,
    log: &'a mut Vec<String>,
    tracer: &'a mut TraceCollector,
    limits: Limits,
    cancel: &'a AtomicBool,
}

impl GridHost for EngineHost<'_> {
    fn set_cell(&mut self, x: f64, y: f64, z: f64) -> RuntimeResult<()> {
        self.sim.set_cell(x, y, z);
        Ok(())
    }

    fn clear(&mut self) -> RuntimeResult<()> {
        self.sim.clear_active_layer();
        Ok(())
    }

    fn step(&mut self) -> RuntimeResult<()> {
        self.sim
            .run_tick(self.rng, self.tracer, self.log, self.limits, Some(self.cancel))
            .map(|_| ())
    }

    fn select_layer(&mut self, index: f64) -> RuntimeResult<()> {
        let valid = to_coord(index)
            .filter(|&i| i >= 0)
            .map(|i| self.sim.select_layer(i as usize))
            .unwrap_or(false);
        if valid {
            Ok(())
        } else {
            Err(RuntimeError::InvalidArgument(format!(
                "layer({index}) is out of range"
            )))
        }
    }

    fn cell_at(&self, x: f64, y: f64, z: f64) -> f64 {
        self.sim.cell_value(x, y, z)
    }

    fn random(&mut self) -> f64 {
        next_unit_f64(self.rng)
    }

    fn reseed(&mut self, seed: u64) {
        reseed(self.rng, seed);
    }

    fn print(&mut self, text: &str) {
        debug!("mpl: {text}");
        self.log.push(text.to_string());
    }

    fn activate_rule(
        &mut self,
        name: &str,
        resolved: Option<(Rc<FunctionValue>, FnTable)>,
        args: Vec<Value>,
    ) -> RuntimeResult<()> {
        let (func, helpers, origin) = match resolved {
            Some((func, helpers)) => (func, helpers, RuleOrigin::Program),
            None => {
                let unit = self
                    .registry
                    .active()
                    .ok_or_else(|| RuntimeError::UndefinedCallable(name.to_string()))?;
                let (func, helpers) = resolve_in_unit(unit, name)
                    .ok_or_else(|| RuntimeError::UndefinedCallable(name.to_string()))?;
                (func, helpers, RuleOrigin::Registry)
            }
        };
        self.sim.activate(ActiveRule {
            name: name.to_string(),
            args,
            func,
            helpers,
            origin,
        });
        Ok(())
    }

    fn deactivate_rule(&mut self, name: &str) -> RuntimeResult<()> {
        self.sim.deactivate(name);
        Ok(())
    }

    fn neighbor_stats(&self) -> Option<NeighborStats> {
        None
    }
}
