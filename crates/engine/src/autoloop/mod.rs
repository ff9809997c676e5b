// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The auto-loop controller.
//!
//! A cooperatively-scheduled state machine that keeps the research loop
//! running without human re-prompting. It is the single consumer of a
//! channel of typed [`LoopEvent`]s and the single owner of all per-report
//! runtime state; nothing mutable leaks to callers. Shutdown paths are
//! exactly: an explicit terminal tag, budget exhaustion, session end, and
//! host cleanup.

mod injection;

pub use injection::build_continuation;

use crate::decide::{next_decision, DecisionInputs};
use crate::error::EngineError;
use crate::transport::Transport;
use crate::trust::TrustAggregate;
use gyoshu_core::{
    promise, AutoLoopState, BudgetExceeded, Clock, GoalGateStatus, LoopDecision, LoopEvent,
    ReportTitle, SessionId, TerminalTag,
};
use gyoshu_storage::error::logged_and_ignored;
use gyoshu_storage::{BridgeRegistry, LoopStore, StorageError};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Controller tunables, each overridable via `GYOSHU_*_MS` env vars.
#[derive(Debug, Clone)]
pub struct AutoLoopConfig {
    /// Minimum gap between two continuation injections per report.
    pub injection_cooldown: Duration,
    /// Debounce window coalescing tool-call counter persistence.
    pub save_debounce: Duration,
    /// Cadence of the idle-bridge sweep.
    pub reap_interval: Duration,
    /// Bridge inactivity threshold before the sweep terminates it.
    pub idle_threshold: Duration,
}

impl Default for AutoLoopConfig {
    fn default() -> Self {
        Self {
            injection_cooldown: Duration::from_millis(2_000),
            save_debounce: Duration::from_millis(1_000),
            reap_interval: Duration::from_secs(300),
            idle_threshold: Duration::from_secs(1_800),
        }
    }
}

impl AutoLoopConfig {
    /// Read overrides from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            injection_cooldown: env_ms("GYOSHU_INJECTION_COOLDOWN_MS")
                .unwrap_or(defaults.injection_cooldown),
            save_debounce: env_ms("GYOSHU_SAVE_DEBOUNCE_MS").unwrap_or(defaults.save_debounce),
            reap_interval: env_ms("GYOSHU_REAP_INTERVAL_MS").unwrap_or(defaults.reap_interval),
            idle_threshold: env_ms("GYOSHU_IDLE_THRESHOLD_MS").unwrap_or(defaults.idle_threshold),
        }
    }
}

fn env_ms(name: &str) -> Option<Duration> {
    std::env::var(name).ok().and_then(|s| s.parse::<u64>().ok()).map(Duration::from_millis)
}

/// Per-report runtime the controller owns: the persisted state plus the
/// injection and persistence bookkeeping that used to be scattered maps.
struct LoopRuntime {
    state: AutoLoopState,
    last_injection: Option<Instant>,
    /// Hash of the most recently observed output.
    pending_output_hash: Option<[u8; 32]>,
    /// Hash consumed by the last injection.
    last_processed_hash: Option<[u8; 32]>,
    last_output_empty: bool,
    injection_in_flight: bool,
    /// Set when in-memory counters diverge from disk; cleared on flush.
    dirty_since: Option<Instant>,
}

impl LoopRuntime {
    fn new(state: AutoLoopState) -> Self {
        Self {
            state,
            last_injection: None,
            pending_output_hash: None,
            last_processed_hash: None,
            last_output_empty: true,
            injection_in_flight: false,
            dirty_since: None,
        }
    }
}

/// The auto-loop controller. Generic over the continuation transport and
/// the clock so tests drive time explicitly.
pub struct AutoLoopController<T: Transport, C: Clock> {
    store: LoopStore,
    bridges: BridgeRegistry,
    transport: T,
    clock: C,
    config: AutoLoopConfig,
    loops: HashMap<ReportTitle, LoopRuntime>,
}

impl<T: Transport, C: Clock> AutoLoopController<T, C> {
    pub fn new(
        store: LoopStore,
        bridges: BridgeRegistry,
        transport: T,
        clock: C,
        config: AutoLoopConfig,
    ) -> Self {
        Self { store, bridges, transport, clock, config, loops: HashMap::new() }
    }

    /// Start tracking a brand-new loop. Persists via the create-new path,
    /// which is the only way to replace a terminal document.
    pub fn start_loop(&mut self, state: AutoLoopState) -> Result<(), EngineError> {
        self.store.create_new(&state)?;
        let title = state.report_title.clone();
        self.loops.insert(title.clone(), LoopRuntime::new(state));
        tracing::info!(report = %title, "auto-loop started");
        Ok(())
    }

    /// Adopt a loop already on disk (e.g. after a controller restart).
    /// Terminal documents are not adopted.
    pub fn adopt_loop(&mut self, title: &ReportTitle) -> Result<bool, EngineError> {
        match self.store.load(title)? {
            Some(state) if state.active => {
                self.loops.insert(title.clone(), LoopRuntime::new(state));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Current in-memory state for a tracked loop.
    pub fn loop_state(&self, title: &ReportTitle) -> Option<&AutoLoopState> {
        self.loops.get(title).map(|rt| &rt.state)
    }

    pub fn has_active_loops(&self) -> bool {
        self.loops.values().any(|rt| rt.state.active)
    }

    /// Feed one runtime event through the controller.
    pub async fn handle_event(&mut self, event: LoopEvent) -> Result<(), EngineError> {
        match event {
            LoopEvent::ToolAfter { report_title, tool_result } => {
                self.on_tool_after(&report_title, &tool_result).await
            }
            LoopEvent::AgentAfter { output } => self.on_agent_after(&output).await,
            LoopEvent::IdleOrCompleted => self.on_idle().await,
            LoopEvent::SessionEnd { session_id } => self.on_session_end(&session_id),
            LoopEvent::Cleanup => {
                self.flush_all();
                self.loops.clear();
                Ok(())
            }
        }
    }

    /// Evaluate the gates for a finished cycle and apply the resulting
    /// decision in one step.
    ///
    /// Everything the decision table needs from durable state (remaining
    /// attempts, budgets, accumulated rework rounds) is read from the
    /// loop itself, so the REWORK bound holds across controller restarts
    /// rather than living in caller-supplied arguments.
    pub fn decide_cycle(
        &mut self,
        title: &ReportTitle,
        trust: Option<&TrustAggregate>,
        goal: GoalGateStatus,
        next_objective: &str,
    ) -> Result<LoopDecision, EngineError> {
        let (attempts_left, budget_ok, rework_rounds) = {
            let runtime = self
                .loops
                .get(title)
                .ok_or_else(|| EngineError::UnknownLoop(title.to_string()))?;
            (
                runtime.state.attempts_left(),
                runtime.state.exceeded_budget(self.clock.epoch_ms()).is_none(),
                runtime.state.rework_rounds,
            )
        };

        let decision = next_decision(DecisionInputs {
            trust_passed: trust.is_some_and(|t| t.passed),
            goal,
            attempts_left,
            budget_ok,
            rework_rounds,
        });
        self.record_decision(title, decision, trust.map(|t| t.score), Some(goal), next_objective)?;
        Ok(decision)
    }

    /// Apply a decision computed by the decision engine.
    ///
    /// Terminal decisions deactivate and drop the loop; the rest advance
    /// the iteration. Either way the state is persisted synchronously:
    /// decisions are the loop's durable milestones.
    pub fn record_decision(
        &mut self,
        title: &ReportTitle,
        decision: LoopDecision,
        trust_score: Option<u32>,
        goal_status: Option<GoalGateStatus>,
        next_objective: &str,
    ) -> Result<(), EngineError> {
        let runtime = self
            .loops
            .get_mut(title)
            .ok_or_else(|| EngineError::UnknownLoop(title.to_string()))?;

        runtime.state.trust_score = trust_score;
        runtime.state.goal_gate_status = goal_status;
        if decision.is_terminal() {
            runtime.state.finish(decision);
            self.store.save(&runtime.state)?;
            self.loops.remove(title);
            tracing::info!(report = %title, %decision, "auto-loop finished");
        } else {
            runtime.state.advance(decision, next_objective);
            runtime.dirty_since = None;
            self.store.save(&runtime.state)?;
        }
        Ok(())
    }

    async fn on_tool_after(&mut self, report: &str, tool_result: &str) -> Result<(), EngineError> {
        let Some(title) = self.tracked_title(report) else {
            return Ok(());
        };

        {
            let Some(runtime) = self.loops.get_mut(&title) else {
                return Ok(());
            };
            if !runtime.state.active {
                return Ok(());
            }
            let budgets = &mut runtime.state.budgets;
            if budgets.total_tool_calls < budgets.max_tool_calls {
                budgets.total_tool_calls += 1;
            }
            // Coalesce: the debounce window runs from the first unpersisted
            // increment, not the latest.
            if runtime.dirty_since.is_none() {
                runtime.dirty_since = Some(self.clock.now());
            }
        }

        let tags = promise::scan(tool_result);
        if !tags.is_empty() && promise::mentions_report(tool_result, title.as_str()) {
            self.finish_from_tags(&title, &tags)?;
            return Ok(());
        }

        if let Some(hit) = self.budget_hit(&title) {
            self.exhaust_loop(&title, hit).await?;
        }
        Ok(())
    }

    async fn on_agent_after(&mut self, output: &str) -> Result<(), EngineError> {
        let tags = promise::scan(output);
        let titles: Vec<ReportTitle> = self.loops.keys().cloned().collect();

        // Terminal tags first: a finished loop must not receive one more
        // continuation.
        if !tags.is_empty() {
            for title in &titles {
                if promise::mentions_report(output, title.as_str()) {
                    self.finish_from_tags(title, &tags)?;
                }
            }
        }

        let hash = output_hash(output);
        let survivors: Vec<ReportTitle> = self.loops.keys().cloned().collect();
        for title in survivors {
            let targeted = promise::mentions_report(output, title.as_str())
                || self.loops.len() == 1;
            if let Some(runtime) = self.loops.get_mut(&title) {
                runtime.pending_output_hash = Some(hash);
                runtime.last_output_empty = output.trim().is_empty();
            }
            if targeted {
                self.try_inject(&title).await?;
            }
        }
        Ok(())
    }

    async fn on_idle(&mut self) -> Result<(), EngineError> {
        let titles: Vec<ReportTitle> = self.loops.keys().cloned().collect();
        for title in titles {
            self.try_inject(&title).await?;
        }
        Ok(())
    }

    /// Session end is a terminal condition for every loop bound to it.
    fn on_session_end(&mut self, session: &SessionId) -> Result<(), EngineError> {
        let affected: Vec<ReportTitle> = self
            .loops
            .iter()
            .filter(|(_, rt)| rt.state.research_session_id == *session)
            .map(|(title, _)| title.clone())
            .collect();

        for title in affected {
            if let Some(mut runtime) = self.loops.remove(&title) {
                runtime.state.finish(LoopDecision::Blocked);
                self.store.save(&runtime.state)?;
                tracing::info!(report = %title, session = session.as_str(), "loop ended with its session");
            }
        }
        Ok(())
    }

    /// Deactivate a loop in response to terminal tags in observed output.
    /// No continuation is sent; in-memory indices for the report clear.
    fn finish_from_tags(
        &mut self,
        title: &ReportTitle,
        tags: &std::collections::BTreeSet<TerminalTag>,
    ) -> Result<(), EngineError> {
        let Some(mut runtime) = self.loops.remove(title) else {
            return Ok(());
        };
        let decision = if tags.contains(&TerminalTag::Complete) {
            LoopDecision::Complete
        } else if tags.contains(&TerminalTag::Blocked) {
            LoopDecision::Blocked
        } else {
            LoopDecision::BudgetExhausted
        };
        runtime.state.finish(decision);
        self.store.save(&runtime.state)?;
        tracing::info!(report = %title, %decision, "terminal tag observed; loop deactivated");
        Ok(())
    }

    fn budget_hit(&self, title: &ReportTitle) -> Option<BudgetExceeded> {
        let runtime = self.loops.get(title)?;
        if !runtime.state.active {
            return None;
        }
        runtime.state.exceeded_budget(self.clock.epoch_ms())
    }

    /// First budget trip: deactivate, persist, and emit a terminal-tagged
    /// message so the hosting loop stops too.
    async fn exhaust_loop(
        &mut self,
        title: &ReportTitle,
        hit: BudgetExceeded,
    ) -> Result<(), EngineError> {
        let Some(mut runtime) = self.loops.remove(title) else {
            return Ok(());
        };
        runtime.state.exhaust();
        self.store.save(&runtime.state)?;
        tracing::info!(report = %title, budget = %hit, "budget exhausted; loop deactivated");

        let message = format!(
            "Research loop for '{}' stopped: {}. {}",
            title,
            hit,
            TerminalTag::BudgetExhausted.wrapped(),
        );
        if let Err(e) = self.transport.send_continuation(title.as_str(), &message).await {
            tracing::warn!(report = %title, error = %e, "terminal message delivery failed");
        }
        Ok(())
    }

    /// Attempt one continuation injection, applying every admission filter.
    async fn try_inject(&mut self, title: &ReportTitle) -> Result<(), EngineError> {
        if let Some(hit) = self.budget_hit(title) {
            return self.exhaust_loop(title, hit).await;
        }

        let now = self.clock.now();
        let now_ms = self.clock.epoch_ms();
        let message = {
            let Some(runtime) = self.loops.get_mut(title) else {
                return Ok(());
            };
            if !runtime.state.active || runtime.injection_in_flight {
                return Ok(());
            }
            if let Some(last) = runtime.last_injection {
                if now.duration_since(last) < self.config.injection_cooldown {
                    tracing::debug!(report = %title, "injection skipped: cooldown");
                    return Ok(());
                }
            }
            if !runtime.last_output_empty
                && runtime.pending_output_hash == runtime.last_processed_hash
            {
                tracing::debug!(report = %title, "injection skipped: no new output");
                return Ok(());
            }
            runtime.injection_in_flight = true;
            build_continuation(&runtime.state, now_ms)
        };

        let result = self.transport.send_continuation(title.as_str(), &message).await;
        if let Some(runtime) = self.loops.get_mut(title) {
            runtime.injection_in_flight = false;
            match result {
                Ok(()) => {
                    runtime.last_injection = Some(now);
                    runtime.last_processed_hash = runtime.pending_output_hash;
                    tracing::debug!(report = %title, "continuation injected");
                }
                Err(e) => {
                    // Send failures never tear the loop down.
                    tracing::warn!(report = %title, error = %e, "continuation send failed; will retry");
                }
            }
        }
        Ok(())
    }

    /// Persist every loop whose debounce window has elapsed.
    pub fn flush_due(&mut self) {
        let now = self.clock.now();
        let due: Vec<ReportTitle> = self
            .loops
            .iter()
            .filter(|(_, rt)| {
                rt.dirty_since
                    .is_some_and(|since| now.duration_since(since) >= self.config.save_debounce)
            })
            .map(|(title, _)| title.clone())
            .collect();
        for title in due {
            self.flush_one(&title);
        }
    }

    /// Persist all dirty loops immediately (deactivation, shutdown).
    pub fn flush_all(&mut self) {
        let dirty: Vec<ReportTitle> = self
            .loops
            .iter()
            .filter(|(_, rt)| rt.dirty_since.is_some())
            .map(|(title, _)| title.clone())
            .collect();
        for title in dirty {
            self.flush_one(&title);
        }
    }

    fn flush_one(&mut self, title: &ReportTitle) {
        let Some(runtime) = self.loops.get_mut(title) else {
            return;
        };
        match self.store.save(&runtime.state) {
            Ok(()) => runtime.dirty_since = None,
            Err(e) => {
                tracing::warn!(report = %title, error = %e, "debounced persist failed; retrying next flush");
            }
        }
    }

    pub fn has_dirty(&self) -> bool {
        self.loops.values().any(|rt| rt.dirty_since.is_some())
    }

    /// Sweep idle bridges. Suspended entirely while any loop is active so
    /// the sweep can never kill the process a live loop is talking to.
    pub fn reap_idle_bridges(&mut self) {
        if self.has_active_loops() {
            tracing::debug!("idle-bridge reap suspended: loops active");
            return;
        }
        for session in self.bridges.sessions() {
            let idle = self
                .bridges
                .last_activity(&session)
                .and_then(|t| t.elapsed().ok())
                .is_some_and(|elapsed| elapsed > self.config.idle_threshold);
            if !idle {
                continue;
            }
            if let Err(e) = self.bridges.terminate(&session) {
                match e {
                    StorageError::IdentityMismatch { .. } | StorageError::PoisonedMeta(_) => {
                        logged_and_ignored(&e, "idle bridge already gone")
                    }
                    other => logged_and_ignored(&other, "idle bridge termination"),
                }
            } else {
                tracing::info!(session = session.as_str(), "idle bridge terminated");
            }
        }
    }

    /// Resolve an incoming report-title string to a tracked loop key.
    fn tracked_title(&self, report: &str) -> Option<ReportTitle> {
        self.loops.keys().find(|t| t.as_str() == report).cloned()
    }

    /// Drive the controller from a channel until cancellation or channel
    /// close. Debounced persists and the idle sweep run off timers; every
    /// exit path flushes.
    pub async fn run(
        mut self,
        mut events: tokio::sync::mpsc::Receiver<LoopEvent>,
        cancel: CancellationToken,
    ) {
        let mut reap = tokio::time::interval(self.config.reap_interval);
        reap.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick fires immediately; consume it so the sweep waits a
        // full interval.
        reap.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.flush_all();
                    break;
                }
                maybe = events.recv() => match maybe {
                    Some(event) => {
                        if let Err(e) = self.handle_event(event).await {
                            tracing::warn!(error = %e, "loop event failed; controller continues");
                        }
                    }
                    None => {
                        self.flush_all();
                        break;
                    }
                },
                _ = reap.tick() => self.reap_idle_bridges(),
                _ = tokio::time::sleep(self.config.save_debounce), if self.has_dirty() => {
                    self.flush_due();
                }
            }
        }
    }
}

/// SHA-256 of normalized output, the change signal for injection gating.
fn output_hash(output: &str) -> [u8; 32] {
    Sha256::digest(output.trim().as_bytes()).into()
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
