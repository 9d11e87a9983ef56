//! Stage/apply/rollback lifecycle for hot-reloaded rule sets.

use indexmap::IndexMap;
use log::{debug, warn};
use mpl_eval::{FnTable, FunctionValue};
use mpl_lexer::Lexer;
use mpl_parser::Parser;
use mpl_types::ast::Stmt;
use mpl_types::{ErrorCode, MplError, SourceFile, Span};
use std::rc::Rc;

/// FNV-1a (32-bit) content hash, hex-formatted.
///
/// Fast and non-cryptographic — used only for display and diffing.
pub fn fnv1a_hash(text: &str) -> String {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in text.bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(16_777_619);
    }
    format!("{hash:08x}")
}

/// Summary of one compiled rule, for UI listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleInfo {
    pub id: String,
    pub params: Vec<String>,
}

/// Result of a stage/validate call.
#[derive(Debug, Clone)]
pub struct CompileResult {
    pub ok: bool,
    /// Compiled rule summaries (empty on failure).
    pub rules: Vec<RuleInfo>,
    /// Structured errors (empty on success).
    pub errors: Vec<MplError>,
}

impl CompileResult {
    fn failure(errors: Vec<MplError>) -> Self {
        Self {
            ok: false,
            rules: Vec::new(),
            errors,
        }
    }
}

/// A fully validated, immutable rule set.
#[derive(Debug, Clone)]
pub struct CompiledUnit {
    /// FNV-1a hash of `source_text`.
    pub source_hash: String,
    pub source_text: String,
    /// `rule` declarations, in source order.
    pub rules: FnTable,
    /// `function` declarations staged alongside the rules; callable
    /// from rule bodies during ticks.
    pub helpers: FnTable,
    /// Wall-clock ms when this unit was compiled.
    pub compiled_at: u64,
}

/// Reload lifecycle events, drained by the host for the UI/event bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadEvent {
    RulesReloaded {
        at: u64,
        source_hash: String,
        byte_size: usize,
    },
    RulesReloadError {
        at: u64,
        errors: Vec<String>,
    },
}

/// The rule registry.
///
/// Holds at most one `staged` unit beside the `active` one; `active`
/// only ever changes through the atomic swap in [`RuleRegistry::apply_staged`].
#[derive(Debug, Default)]
pub struct RuleRegistry {
    active: Option<CompiledUnit>,
    staged: Option<CompiledUnit>,
    events: Vec<ReloadEvent>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile and validate rule source without touching any registry
    /// state (live-preview linting).
    pub fn validate_source(source: &str) -> CompileResult {
        compile(source, 0).map_or_else(CompileResult::failure, |unit| CompileResult {
            ok: true,
            rules: rule_infos(&unit),
            errors: Vec::new(),
        })
    }

    /// Compile rule source and hold it as the staged unit.
    /// Does not mutate the active set. Replaces any previous staged unit.
    pub fn stage(&mut self, source: &str, now_ms: u64) -> CompileResult {
        match compile(source, now_ms) {
            Ok(unit) => {
                let result = CompileResult {
                    ok: true,
                    rules: rule_infos(&unit),
                    errors: Vec::new(),
                };
                debug!(
                    "staged rule set {} ({} rules, {} bytes)",
                    unit.source_hash,
                    unit.rules.len(),
                    unit.source_text.len()
                );
                self.staged = Some(unit);
                result
            }
            Err(errors) => {
                let at = now_ms;
                self.events.push(ReloadEvent::RulesReloadError {
                    at,
                    errors: errors.iter().map(|e| e.to_string()).collect(),
                });
                warn!("rule staging failed with {} error(s)", errors.len());
                CompileResult::failure(errors)
            }
        }
    }

    /// Atomically publish the staged unit as active.
    ///
    /// Returns `false` (leaving everything unchanged) when nothing is
    /// staged. On success the staged slot is cleared and a
    /// [`ReloadEvent::RulesReloaded`] is emitted.
    pub fn apply_staged(&mut self, now_ms: u64) -> bool {
        let Some(unit) = self.staged.take() else {
            return false;
        };
        self.events.push(ReloadEvent::RulesReloaded {
            at: now_ms,
            source_hash: unit.source_hash.clone(),
            byte_size: unit.source_text.len(),
        });
        debug!("applied rule set {}", unit.source_hash);
        self.active = Some(unit);
        true
    }

    /// Discard the staged unit without touching active.
    pub fn rollback_staged(&mut self) {
        self.staged = None;
    }

    /// The currently active unit, if any.
    pub fn active(&self) -> Option<&CompiledUnit> {
        self.active.as_ref()
    }

    /// Whether a staged unit is waiting to be applied.
    pub fn has_staged(&self) -> bool {
        self.staged.is_some()
    }

    /// Hash of the staged unit, if any.
    pub fn staged_hash(&self) -> Option<&str> {
        self.staged.as_ref().map(|u| u.source_hash.as_str())
    }

    /// Look up a rule in the active unit.
    pub fn active_rule(&self, name: &str) -> Option<&Rc<FunctionValue>> {
        self.active.as_ref().and_then(|u| u.rules.get(name))
    }

    /// Drain the pending reload events.
    pub fn take_events(&mut self) -> Vec<ReloadEvent> {
        std::mem::take(&mut self.events)
    }
}

fn rule_infos(unit: &CompiledUnit) -> Vec<RuleInfo> {
    unit.rules
        .values()
        .map(|rule| RuleInfo {
            id: rule.name.clone(),
            params: rule.params.clone(),
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────
// Compilation & validation
// ─────────────────────────────────────────────────────────────────────

/// Lex + parse + rule-specific validation:
/// - only `rule` and `function` declarations at the top level
/// - parameter lists free of duplicates
/// - no rule name collides with a builtin
/// - no duplicate rule names
fn compile(source: &str, now_ms: u64) -> Result<CompiledUnit, Vec<MplError>> {
    let source_file = SourceFile::new("rules.mpl", source);
    let lexed = Lexer::new(&source_file).lex();
    let mut errors = lexed.errors;
    let parsed = Parser::new(lexed.tokens, &source_file).parse();
    errors.extend(parsed.errors);
    if errors.has_errors() {
        return Err(errors.errors);
    }
    let Some(program) = parsed.program else {
        return Err(errors.errors);
    };

    let mut rules: FnTable = IndexMap::new();
    let mut helpers: FnTable = IndexMap::new();
    let mut validation: Vec<MplError> = Vec::new();
    let mut push = |code: ErrorCode, message: String, span: Span| {
        let line = source_file.line(span.start_line).unwrap_or("").to_string();
        validation.push(MplError::new("rules.mpl", code, message, span, line));
    };

    for stmt in &program.stmts {
        match stmt {
            Stmt::Rule(decl) => {
                if mpl_eval::is_builtin(&decl.name.name) {
                    push(
                        ErrorCode::RULE_RESERVED_NAME,
                        format!("rule name '{}' collides with a builtin", decl.name.name),
                        decl.name.span,
                    );
                    continue;
                }
                if rules.contains_key(&decl.name.name) {
                    push(
                        ErrorCode::RULE_DUPLICATE_NAME,
                        format!("duplicate rule '{}'", decl.name.name),
                        decl.name.span,
                    );
                    continue;
                }
                if let Some(dup) = first_duplicate(&decl.params) {
                    push(
                        ErrorCode::RULE_DUPLICATE_PARAM,
                        format!("duplicate parameter '{dup}' in rule '{}'", decl.name.name),
                        decl.name.span,
                    );
                    continue;
                }
                rules.insert(
                    decl.name.name.clone(),
                    Rc::new(FunctionValue {
                        name: decl.name.name.clone(),
                        params: decl.params.iter().map(|p| p.name.clone()).collect(),
                        body: decl.body.clone(),
                        is_rule: true,
                    }),
                );
            }
            Stmt::Function(decl) => {
                if let Some(dup) = first_duplicate(&decl.params) {
                    push(
                        ErrorCode::RULE_DUPLICATE_PARAM,
                        format!(
                            "duplicate parameter '{dup}' in function '{}'",
                            decl.name.name
                        ),
                        decl.name.span,
                    );
                    continue;
                }
                helpers.insert(
                    decl.name.name.clone(),
                    Rc::new(FunctionValue {
                        name: decl.name.name.clone(),
                        params: decl.params.iter().map(|p| p.name.clone()).collect(),
                        body: decl.body.clone(),
                        is_rule: false,
                    }),
                );
            }
            other => {
                push(
                    ErrorCode::RULE_SOURCE_NOT_A_RULE,
                    "rule source may only contain rule and function declarations".to_string(),
                    other.span(),
                );
            }
        }
    }

    if !validation.is_empty() {
        return Err(validation);
    }

    Ok(CompiledUnit {
        source_hash: fnv1a_hash(source),
        source_text: source.to_string(),
        rules,
        helpers,
        compiled_at: now_ms,
    })
}

fn first_duplicate(params: &[mpl_types::ast::Ident]) -> Option<&str> {
    for (i, param) in params.iter().enumerate() {
        if params[..i].iter().any(|p| p.name == param.name) {
            return Some(&param.name);
        }
    }
    None
}
