//! The simulation engine: layers, active rules, and the tick scheduler.
//!
//! A tick runs to completion on the calling thread: every active rule
//! is evaluated against every cell in layer-major z, y, x ascending
//! order, reading the published (pre-tick) buffers and writing to
//! staging buffers that swap in atomically at the end. Rules apply in
//! registration order, so the last matching rule's write wins. A rule
//! body that fails aborts the whole tick — staging is dropped, the
//! published state and step counter stay untouched.

use crate::trace::{RuleTracer, VoxelPos};
use indexmap::IndexMap;
use log::debug;
use mpl_eval::{
    Environment, Evaluator, FnTable, FunctionValue, GridHost, Limits, NeighborStats,
    RuntimeError, RuntimeResult, Value,
};
use mpl_grid::{
    neighbor_summary, Changeset, GridSize, GridSnapshot, Layer, LayerSnapshot, StagingBuffer,
    VoxelBuffer,
};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Where an active rule came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOrigin {
    /// Declared in program source and activated there.
    Program,
    /// Resolved from the hot-reload registry's active unit.
    Registry,
}

/// A rule registered for the tick loop.
///
/// Activation captures the rule body plus a snapshot of the helper
/// tables it may call, closure-style; re-activating under the same
/// name updates the entry in place (registration order is load-bearing
/// — it is the tie-break order).
#[derive(Debug, Clone)]
pub struct ActiveRule {
    pub name: String,
    /// Arguments bound to the rule's parameters each tick.
    pub args: Vec<Value>,
    pub func: Rc<FunctionValue>,
    /// Helper functions/rules callable from the body during ticks.
    pub helpers: FnTable,
    pub origin: RuleOrigin,
}

/// The grid/simulation engine owned by one `Vm`.
#[derive(Debug)]
pub struct Simulation {
    layers: Vec<Layer>,
    active_layer: usize,
    step: u64,
    version: u64,
    /// Set by out-of-tick mutations; folded into `version` on the next
    /// snapshot so polling consumers notice the change.
    dirty: bool,
    active_rules: Vec<ActiveRule>,
    last_changeset: Changeset,
}

impl Simulation {
    /// Single-layer engine.
    pub fn new(size: GridSize) -> Self {
        Self::with_layers(vec![Layer::new("base", "Base", size)])
    }

    /// Multi-layer engine. All layers must share one size — a mismatch
    /// here is a host integration bug.
    pub fn with_layers(layers: Vec<Layer>) -> Self {
        assert!(!layers.is_empty(), "at least one layer is required");
        let size = layers[0].buffer.size();
        assert!(
            layers.iter().all(|l| l.buffer.size() == size),
            "all layers must share one size"
        );
        Self {
            layers,
            active_layer: 0,
            step: 0,
            version: 0,
            dirty: false,
            active_rules: Vec::new(),
            last_changeset: Changeset::empty(0),
        }
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    pub fn size(&self) -> GridSize {
        self.layers[0].buffer.size()
    }

    pub fn step_count(&self) -> u64 {
        self.step
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut [Layer] {
        self.dirty = true;
        &mut self.layers
    }

    pub fn active_layer(&self) -> usize {
        self.active_layer
    }

    pub fn last_changeset(&self) -> &Changeset {
        &self.last_changeset
    }

    pub fn active_rule_names(&self) -> Vec<String> {
        self.active_rules.iter().map(|r| r.name.clone()).collect()
    }

    // ── Mutation (outside ticks) ──────────────────────────────────────────

    /// Select the active layer. Returns `false` if out of range.
    pub fn select_layer(&mut self, index: usize) -> bool {
        if index < self.layers.len() {
            self.active_layer = index;
            true
        } else {
            false
        }
    }

    /// `set(x, y, z)` — full-intensity write into the active layer.
    /// Out-of-range (or non-finite) coordinates are a silent no-op.
    pub fn set_cell(&mut self, x: f64, y: f64, z: f64) {
        let (Some(x), Some(y), Some(z)) = (to_coord(x), to_coord(y), to_coord(z)) else {
            return;
        };
        if self.layers[self.active_layer].buffer.set(x, y, z, 255) {
            self.dirty = true;
        }
    }

    /// `clear()` — zero the active layer.
    pub fn clear_active_layer(&mut self) {
        self.layers[self.active_layer].buffer.clear();
        self.dirty = true;
    }

    /// Read a cell from the active layer (0 out of range).
    pub fn cell_value(&self, x: f64, y: f64, z: f64) -> f64 {
        let (Some(x), Some(y), Some(z)) = (to_coord(x), to_coord(y), to_coord(z)) else {
            return 0.0;
        };
        self.layers[self.active_layer].buffer.get(x, y, z) as f64
    }

    /// Register (or update) an active simulation rule.
    pub fn activate(&mut self, rule: ActiveRule) {
        if let Some(existing) = self.active_rules.iter_mut().find(|r| r.name == rule.name) {
            // Keep the original registration slot: order is the
            // tie-break order and must not move on re-activation.
            *existing = rule;
        } else {
            self.active_rules.push(rule);
        }
    }

    /// Remove an active rule. Unknown names are a no-op.
    pub fn deactivate(&mut self, name: &str) {
        self.active_rules.retain(|r| r.name != name);
    }

    /// Re-resolve registry-originated active rules after a hot reload.
    /// Rules whose names vanished from the new unit are deactivated.
    pub fn rebind_registry_rules(
        &mut self,
        lookup: impl Fn(&str) -> Option<(Rc<FunctionValue>, FnTable)>,
    ) {
        self.active_rules.retain_mut(|rule| {
            if rule.origin != RuleOrigin::Registry {
                return true;
            }
            match lookup(&rule.name) {
                Some((func, helpers)) => {
                    rule.func = func;
                    rule.helpers = helpers;
                    true
                }
                None => {
                    debug!("active rule '{}' dropped by hot reload", rule.name);
                    false
                }
            }
        });
    }

    /// Zero every layer and forget all simulation state. Bumps the
    /// snapshot version so consumers refresh.
    pub fn reset(&mut self) {
        for layer in &mut self.layers {
            layer.buffer.clear();
        }
        self.active_layer = 0;
        self.step = 0;
        self.active_rules.clear();
        self.last_changeset = Changeset::empty(0);
        self.version += 1;
        self.dirty = false;
    }

    // ── Snapshots ─────────────────────────────────────────────────────────

    fn bump_if_dirty(&mut self) {
        if self.dirty {
            self.version += 1;
            self.dirty = false;
        }
    }

    /// Snapshot of the active layer.
    pub fn snapshot(&mut self, timestamp_ms: u64) -> GridSnapshot {
        self.bump_if_dirty();
        GridSnapshot::capture(
            &self.layers[self.active_layer].buffer,
            self.version,
            self.step,
            timestamp_ms,
        )
    }

    /// Versioned snapshot of every layer.
    pub fn layer_snapshots(&mut self) -> (u64, Vec<LayerSnapshot>) {
        self.bump_if_dirty();
        (
            self.version,
            self.layers.iter().map(LayerSnapshot::capture).collect(),
        )
    }

    // ── The tick ──────────────────────────────────────────────────────────

    /// Run one tick to completion.
    ///
    /// Advances the step counter; with no active rules that is all a
    /// tick does. Otherwise every active rule body runs once per cell
    /// with implicit `cell`/`x`/`y`/`z` bindings against the pre-tick
    /// state; writes land in staging buffers swapped in atomically at
    /// the end, and the diff becomes the tick's changeset.
    pub fn run_tick(
        &mut self,
        rng: &mut ChaCha8Rng,
        tracer: &mut dyn RuleTracer,
        log: &mut Vec<String>,
        limits: Limits,
        cancel: Option<&AtomicBool>,
    ) -> RuntimeResult<Changeset> {
        let next_step = self.step + 1;

        if self.active_rules.is_empty() {
            self.step = next_step;
            self.version += 1;
            self.dirty = false;
            self.last_changeset = Changeset::empty(next_step);
            return Ok(self.last_changeset.clone());
        }

        // Per-rule evaluation state, reused across every cell this tick.
        // Globals hold only the implicit bindings (redefined per cell);
        // body-local declarations live in the call frame and vanish
        // with it.
        struct RuleSlot {
            env: Environment,
            helpers: FnTable,
            rules: FnTable,
        }
        let mut slots: Vec<RuleSlot> = self
            .active_rules
            .iter()
            .map(|rule| RuleSlot {
                env: Environment::new(),
                helpers: rule.helpers.clone(),
                rules: IndexMap::new(),
            })
            .collect();

        let target = tracer.target();
        let mut stagings: Vec<StagingBuffer> = self
            .layers
            .iter()
            .map(|layer| layer.buffer.begin_staging())
            .collect();

        for layer_idx in 0..self.layers.len() {
            let published = &self.layers[layer_idx].buffer;
            let staging = &mut stagings[layer_idx];
            let size = published.size();

            for z in 0..size.z {
                for y in 0..size.y {
                    if let Some(flag) = cancel {
                        if flag.load(Ordering::Relaxed) {
                            return Err(RuntimeError::Cancelled);
                        }
                    }
                    for x in 0..size.x {
                        let idx = size.index(x, y, z);
                        let pre = published.as_slice()[idx];
                        let summary = neighbor_summary(published, x, y, z);
                        let stats = NeighborStats {
                            alive: summary.alive,
                            sum: summary.sum as f64,
                            count: summary.count,
                            max: summary.max,
                        };
                        let pos = VoxelPos { x, y, z };
                        let traced = target == Some(pos);
                        if traced {
                            tracer.begin(next_step, pos);
                        }

                        for (rule, slot) in self.active_rules.iter().zip(slots.iter_mut()) {
                            if traced {
                                tracer.start(&rule.name);
                            }

                            slot.env.define("cell", Value::Number(pre as f64));
                            slot.env.define("x", Value::Number(x as f64));
                            slot.env.define("y", Value::Number(y as f64));
                            slot.env.define("z", Value::Number(z as f64));

                            let mut host = TickHost {
                                staging: &mut *staging,
                                published,
                                rng: &mut *rng,
                                log: &mut *log,
                                stats,
                                writes: 0,
                            };
                            let mut evaluator = Evaluator::new(
                                &mut slot.env,
                                &mut slot.helpers,
                                &mut slot.rules,
                                &mut host,
                            )
                            .with_limits(limits);
                            if let Some(flag) = cancel {
                                evaluator = evaluator.with_cancel_flag(flag);
                            }

                            // A failing rule body aborts the whole tick:
                            // staging is dropped, published state and the
                            // step counter stay pre-tick.
                            evaluator.call_function(&rule.func, rule.args.clone())?;
                            let set_writes = host.writes;

                            let post = match slot.env.get("cell") {
                                Some(Value::Number(n)) => *n,
                                _ => f64::NAN,
                            };
                            let mut cell_changed = false;
                            if !post.is_nan() {
                                let new_value = post.round().clamp(0.0, 255.0) as u8;
                                if new_value != pre {
                                    staging.set_index(idx, new_value);
                                    cell_changed = true;
                                    if traced {
                                        tracer.action(
                                            &rule.name,
                                            &format!("cell := {new_value}"),
                                        );
                                    }
                                }
                            }
                            if traced {
                                if set_writes > 0 {
                                    tracer.action(
                                        &rule.name,
                                        &format!("{set_writes} set() write(s)"),
                                    );
                                }
                                tracer.predicate(
                                    &rule.name,
                                    "matched",
                                    cell_changed || set_writes > 0,
                                );
                                tracer.end_rule(&rule.name);
                            }
                        }

                        if traced {
                            tracer.finish();
                        }
                    }
                }
            }
        }

        // Publish: swap every staging buffer in and record the diff.
        let mut changeset = Changeset::empty(next_step);
        for (layer_idx, staging) in stagings.into_iter().enumerate() {
            let changed = self.layers[layer_idx].buffer.publish(staging);
            changeset.extend_layer(layer_idx, changed);
        }

        self.step = next_step;
        self.version += 1;
        self.dirty = false;
        debug!(
            "tick {next_step}: {} rule(s), {} cell(s) changed",
            self.active_rules.len(),
            changeset.count()
        );
        self.last_changeset = changeset.clone();
        Ok(changeset)
    }
}

/// Convert an MPL numeric coordinate to a grid coordinate.
/// Non-finite values address nothing (the caller no-ops).
pub(crate) fn to_coord(v: f64) -> Option<i64> {
    v.is_finite().then(|| v.floor() as i64)
}

/// Draw a uniform f64 in `[0, 1)` from the seeded stream.
pub(crate) fn next_unit_f64(rng: &mut ChaCha8Rng) -> f64 {
    (rng.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
}

/// Re-seed helper shared by the hosts.
pub(crate) fn reseed(rng: &mut ChaCha8Rng, seed: u64) {
    *rng = ChaCha8Rng::seed_from_u64(seed);
}

// ─────────────────────────────────────────────────────────────────────
// Per-cell host
// ─────────────────────────────────────────────────────────────────────

/// Host for rule-body evaluation during a tick: reads come from the
/// published (pre-tick) buffer, writes land in staging, and anything
/// that would mutate the tick structure itself is rejected.
struct TickHost<'a> {
    staging: &'a mut StagingBuffer,
    published: &'a VoxelBuffer,
    rng: &'a mut ChaCha8Rng,
    log: &'a mut Vec<String>,
    stats: NeighborStats,
    writes: usize,
}

impl GridHost for TickHost<'_> {
    fn set_cell(&mut self, x: f64, y: f64, z: f64) -> RuntimeResult<()> {
        let (Some(x), Some(y), Some(z)) = (to_coord(x), to_coord(y), to_coord(z)) else {
            return Ok(());
        };
        if self.staging.set(x, y, z, 255) {
            self.writes += 1;
        }
        Ok(())
    }

    fn clear(&mut self) -> RuntimeResult<()> {
        Err(RuntimeError::NestedTick(
            "clear() is not allowed during a tick".to_string(),
        ))
    }

    fn step(&mut self) -> RuntimeResult<()> {
        Err(RuntimeError::NestedTick(
            "step() cannot be called from a rule body".to_string(),
        ))
    }

    fn select_layer(&mut self, _index: f64) -> RuntimeResult<()> {
        Err(RuntimeError::NestedTick(
            "layer() is not allowed during a tick".to_string(),
        ))
    }

    fn cell_at(&self, x: f64, y: f64, z: f64) -> f64 {
        let (Some(x), Some(y), Some(z)) = (to_coord(x), to_coord(y), to_coord(z)) else {
            return 0.0;
        };
        self.published.get(x, y, z) as f64
    }

    fn random(&mut self) -> f64 {
        next_unit_f64(self.rng)
    }

    fn reseed(&mut self, seed: u64) {
        reseed(self.rng, seed);
    }

    fn print(&mut self, text: &str) {
        self.log.push(text.to_string());
    }

    fn activate_rule(
        &mut self,
        _name: &str,
        _resolved: Option<(Rc<FunctionValue>, FnTable)>,
        _args: Vec<Value>,
    ) -> RuntimeResult<()> {
        Err(RuntimeError::NestedTick(
            "activate() is not allowed during a tick".to_string(),
        ))
    }

    fn deactivate_rule(&mut self, _name: &str) -> RuntimeResult<()> {
        Err(RuntimeError::NestedTick(
            "deactivate() is not allowed during a tick".to_string(),
        ))
    }

    fn neighbor_stats(&self) -> Option<NeighborStats> {
        Some(self.stats)
    }
}
