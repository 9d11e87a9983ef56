//! Rule-debug tracing port.
//!
//! The tick scheduler calls the [`RuleTracer`] hooks unconditionally;
//! the default [`NullTracer`] makes every hook a no-op so untraced
//! ticks pay nothing. [`TraceCollector`] records an ordered entry
//! stream for one target cell and summarizes which rules matched.

/// A cell coordinate in trace output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoxelPos {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

/// One entry in a rule-evaluation trace, in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEntry {
    /// Rule evaluation began.
    Start { rule_id: String },
    /// The rule's match outcome for this cell.
    Predicate {
        rule_id: String,
        label: String,
        ok: bool,
    },
    /// A committed write.
    Action { rule_id: String, desc: String },
    /// Rule evaluation ended.
    End { rule_id: String },
}

/// Which rules matched, summarized after the cell's evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceSummary {
    pub matched_rules: Vec<String>,
}

/// The ordered trace of one cell over one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTrace {
    pub step: u64,
    pub pos: VoxelPos,
    pub entries: Vec<TraceEntry>,
    pub summary: TraceSummary,
}

/// Injectable tracing port called by the tick scheduler.
pub trait RuleTracer {
    /// The cell the tracer wants, if any. The scheduler only emits
    /// entries for this position.
    fn target(&self) -> Option<VoxelPos> {
        None
    }
    /// A traced cell's evaluation begins.
    fn begin(&mut self, _step: u64, _pos: VoxelPos) {}
    /// A rule's evaluation of the traced cell begins.
    fn start(&mut self, _rule_id: &str) {}
    /// The rule's predicate outcome.
    fn predicate(&mut self, _rule_id: &str, _label: &str, _ok: bool) {}
    /// A write the rule committed.
    fn action(&mut self, _rule_id: &str, _desc: &str) {}
    /// The rule's evaluation ends.
    fn end_rule(&mut self, _rule_id: &str) {}
    /// The traced cell's evaluation ends.
    fn finish(&mut self) {}
}

/// The no-op tracer.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTracer;

impl RuleTracer for NullTracer {}

/// Collects traces for one target cell.
#[derive(Debug, Default)]
pub struct TraceCollector {
    target: Option<VoxelPos>,
    current: Option<RuleTrace>,
    traces: Vec<RuleTrace>,
}

impl TraceCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or clear) the traced cell. Clearing also drops any
    /// partially collected trace.
    pub fn set_target(&mut self, target: Option<VoxelPos>) {
        self.target = target;
        self.current = None;
    }

    /// Drain the completed traces.
    pub fn take_traces(&mut self) -> Vec<RuleTrace> {
        std::mem::take(&mut self.traces)
    }
}

impl RuleTracer for TraceCollector {
    fn target(&self) -> Option<VoxelPos> {
        self.target
    }

    fn begin(&mut self, step: u64, pos: VoxelPos) {
        self.current = Some(RuleTrace {
            step,
            pos,
            entries: Vec::new(),
            summary: TraceSummary::default(),
        });
    }

    fn start(&mut self, rule_id: &str) {
        if let Some(trace) = &mut self.current {
            trace.entries.push(TraceEntry::Start {
                rule_id: rule_id.to_string(),
            });
        }
    }

    fn predicate(&mut self, rule_id: &str, label: &str, ok: bool) {
        if let Some(trace) = &mut self.current {
            trace.entries.push(TraceEntry::Predicate {
                rule_id: rule_id.to_string(),
                label: label.to_string(),
                ok,
            });
        }
    }

    fn action(&mut self, rule_id: &str, desc: &str) {
        if let Some(trace) = &mut self.current {
            trace.entries.push(TraceEntry::Action {
                rule_id: rule_id.to_string(),
                desc: desc.to_string(),
            });
        }
    }

    fn end_rule(&mut self, rule_id: &str) {
        if let Some(trace) = &mut self.current {
            trace.entries.push(TraceEntry::End {
                rule_id: rule_id.to_string(),
            });
        }
    }

    fn finish(&mut self) {
        let Some(mut trace) = self.current.take() else {
            return;
        };
        // A rule counts as matched when its predicate held and it
        // committed at least one action.
        let mut matched = Vec::new();
        for entry in &trace.entries {
            if let TraceEntry::Predicate { rule_id, ok: true, .. } = entry {
                let acted = trace.entries.iter().any(|e| {
                    matches!(e, TraceEntry::Action { rule_id: r, .. } if r == rule_id)
                });
                if acted && !matched.contains(rule_id) {
                    matched.push(rule_id.clone());
                }
            }
        }
        trace.summary = TraceSummary {
            matched_rules: matched,
        };
        self.traces.push(trace);
    }
}
