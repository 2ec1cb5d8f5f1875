//! The search engine: presolve, the propagation fixpoint loop, iterative depth-first search with
//! NoGood learning and restarts, and branch-and-bound optimisation.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use log::debug;
use log::info;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::basic_types::HashMap;
use crate::basic_types::KeyedVec;
use crate::basic_types::Solution;
use crate::basic_types::StorageKey;
use crate::engine::assignments::UpdateKind;
use crate::engine::domains::DomainEvent;
use crate::engine::nogoods::Literal;
use crate::engine::nogoods::NoGoodStore;
use crate::engine::variables::DecisionLevel;
use crate::engine::variables::VariableId;
use crate::kabocha_assert_moderate;
use crate::model::Model;
use crate::statistics::SolverStats;

/// The seed used by [`SearchEngine::default`]; fixed so repeated runs are reproducible.
pub(crate) const DEFAULT_SEED: u64 = 12_345_678;

const INITIAL_CONFLICT_LIMIT: f64 = 5.0;
const INITIAL_OUTER_LIMIT: f64 = 10.0;
const CONFLICT_LIMIT_MULTIPLIER: f64 = 1.1;
const ACTIVITY_DECAY: f64 = 0.99;

/// Outcome of one bounded search attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SearchResult {
    Sat,
    Unsat,
    /// The conflict budget ran out or the search was cancelled.
    Unknown,
}

/// One level of the explicit depth-first search stack.
#[derive(Debug)]
struct Frame {
    var: VariableId,
    values: Vec<i64>,
    value_index: usize,
    save_point: DecisionLevel,
    prev_min: i64,
    prev_max: i64,
    /// NoGood pool size when this frame was opened; deeper NoGoods are dropped on exhaustion.
    nogoods_before: usize,
    /// Conflicts this subtree may still spend before reporting [`SearchResult::Unknown`].
    remaining_budget: i64,
}

/// Search state that lives across attempts: activities, NoGoods, restart bookkeeping, the best
/// partial assignment, statistics, and the cancellation flag.
#[derive(Debug)]
pub(crate) struct SearchEngine {
    pub(crate) nogood_learning: bool,
    pub(crate) restart_enabled: bool,
    pub(crate) activity_selection: bool,
    pub(crate) activity_first: bool,
    pub(crate) verbose: bool,
    /// Reserved for a bisection branching strategy; stored but never acted upon.
    pub(crate) bisection_threshold: usize,
    seed: u64,
    rng: SmallRng,

    activity: KeyedVec<VariableId, f64>,
    /// Activities supplied through the warm-start API, applied at the next solve.
    pub(crate) preset_activity: HashMap<VariableId, f64>,
    /// Scan order for variable selection, reshuffled at every restart. The first
    /// `decision_var_end` entries are the search variables, the rest the defined ones.
    var_order: Vec<VariableId>,
    decision_var_end: usize,
    decision_trail: Vec<Literal>,
    pub(crate) nogoods: NoGoodStore,

    best_num_instantiated: usize,
    best_assignment: HashMap<VariableId, i64>,
    current_best_assignment: HashMap<VariableId, i64>,
    /// Value-ordering hints supplied through the warm-start API, applied at the next solve.
    pub(crate) hint: HashMap<VariableId, i64>,

    current_decision: DecisionLevel,
    stopped: Arc<AtomicBool>,
    pub(crate) stats: SolverStats,
}

impl Default for SearchEngine {
    fn default() -> Self {
        SearchEngine::with_seed(DEFAULT_SEED)
    }
}

impl SearchEngine {
    pub(crate) fn with_seed(seed: u64) -> Self {
        SearchEngine {
            nogood_learning: true,
            restart_enabled: true,
            activity_selection: true,
            activity_first: false,
            verbose: false,
            bisection_threshold: 0,
            seed,
            rng: SmallRng::seed_from_u64(seed),
            activity: KeyedVec::default(),
            preset_activity: HashMap::default(),
            var_order: Vec::new(),
            decision_var_end: 0,
            decision_trail: Vec::new(),
            nogoods: NoGoodStore::default(),
            best_num_instantiated: 0,
            best_assignment: HashMap::default(),
            current_best_assignment: HashMap::default(),
            hint: HashMap::default(),
            current_decision: 0,
            stopped: Arc::new(AtomicBool::new(false)),
            stats: SolverStats::default(),
        }
    }

    // ===== Cancellation =====

    pub(crate) fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
    }

    pub(crate) fn reset_stop(&self) {
        self.stopped.store(false, Ordering::Relaxed);
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }

    /// The shared flag behind [`SearchEngine::stop`], for external timeout plumbing.
    pub(crate) fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stopped)
    }

    /// Overrides the current decision level; only used by the test harness to mimic branching.
    #[cfg(test)]
    pub(crate) fn set_decision_level(&mut self, level: DecisionLevel) {
        self.current_decision = level;
    }

    pub(crate) fn activity_of(&self, var: VariableId) -> f64 {
        if var.index() < self.activity.len() {
            self.activity[var]
        } else {
            0.0
        }
    }

    // ===== Entry points =====

    /// Searches for the first solution; `None` means unsatisfiable, or unknown if
    /// [`SearchEngine::is_stopped`] is set.
    pub(crate) fn solve(&mut self, model: &mut Model) -> Option<Solution> {
        model.build_constraint_watch_list();
        self.init_search(model);
        debug!(
            "presolve: {} constraints over {} variables",
            model.num_constraints(),
            model.num_variables()
        );
        if !self.presolve(model) {
            debug!("presolve proved infeasibility");
            return None;
        }

        if self.restart_enabled {
            self.search_with_restart(model, None, false)
        } else {
            let mut first = None;
            let _ = self.run_search(model, i64::MAX, &mut |solution| {
                first = Some(solution);
                false
            });
            self.finish();
            first
        }
    }

    /// Enumerates solutions until the callback asks to stop; returns the number reported.
    pub(crate) fn solve_all(
        &mut self,
        model: &mut Model,
        callback: &mut dyn FnMut(&Solution) -> bool,
    ) -> usize {
        model.build_constraint_watch_list();
        self.init_search(model);
        if !self.presolve(model) {
            return 0;
        }

        let mut count = 0;
        if self.restart_enabled {
            let mut counting = |solution: &Solution| {
                count += 1;
                callback(solution)
            };
            let _ = self.search_with_restart(model, Some(&mut counting), true);
        } else {
            let _ = self.run_search_all(model, &mut |solution| {
                count += 1;
                callback(&solution)
            });
            self.finish();
        }
        count
    }

    /// Branch-and-bound optimisation of `objective`. Returns the best solution found: the
    /// optimum when the search completed, the incumbent when cancelled, `None` when no solution
    /// exists.
    pub(crate) fn solve_optimize(
        &mut self,
        model: &mut Model,
        objective: VariableId,
        minimize: bool,
        on_improve: &mut dyn FnMut(&Solution) -> bool,
    ) -> Option<Solution> {
        model.build_constraint_watch_list();
        self.init_search(model);
        if !self.presolve(model) {
            return None;
        }

        let mut inner_limit = INITIAL_CONFLICT_LIMIT;
        let mut outer_limit = INITIAL_OUTER_LIMIT;
        let root_point = self.current_decision;
        let mut best_solution: Option<Solution> = None;
        let mut best_objective: Option<i64> = None;

        while !self.is_stopped() {
            let mut outer = 0;
            while outer < outer_limit as i64 && !self.is_stopped() {
                outer += 1;
                let conflict_limit = inner_limit as i64;
                let nogoods_before = self.nogoods.len();

                let mut found = None;
                let result = self.run_search(model, conflict_limit, &mut |solution| {
                    found = Some(solution);
                    false
                });

                match result {
                    SearchResult::Sat => {
                        let objective_value = model.assignments.value(objective);
                        let improved = best_objective.map_or(true, |incumbent| {
                            if minimize {
                                objective_value < incumbent
                            } else {
                                objective_value > incumbent
                            }
                        });
                        if improved {
                            best_objective = Some(objective_value);
                            best_solution = found;
                            if self.verbose {
                                info!("new incumbent objective {objective_value}");
                            }
                            self.remember_full_assignment(model);
                            let solution = best_solution
                                .as_ref()
                                .expect("the callback stored the solution");
                            if !on_improve(solution) {
                                self.stop();
                            }
                        }

                        model.assignments.clear_pending();
                        model.backtrack(root_point);
                        self.current_decision = root_point;

                        // Permanently tighten the objective at the root.
                        if minimize {
                            model
                                .assignments
                                .enqueue_set_max(objective, objective_value - 1);
                        } else {
                            model
                                .assignments
                                .enqueue_set_min(objective, objective_value + 1);
                        }
                        if !self.process_queue(model) {
                            model.assignments.clear_pending();
                            if self.verbose {
                                info!("optimal: propagation proved no improvement possible");
                            }
                            self.finish();
                            return best_solution;
                        }

                        // A tightened root is a fresh problem; restart the schedule.
                        inner_limit = INITIAL_CONFLICT_LIMIT;
                        outer_limit = INITIAL_OUTER_LIMIT;
                        break;
                    }
                    SearchResult::Unsat => {
                        if self.verbose {
                            info!("optimal: search space exhausted");
                        }
                        self.finish();
                        return best_solution;
                    }
                    SearchResult::Unknown => {
                        self.restart(
                            model,
                            root_point,
                            nogoods_before,
                            &mut inner_limit,
                            &mut outer_limit,
                        );
                    }
                }
            }
        }

        self.finish();
        best_solution
    }

    // ===== Initialisation and presolve =====

    fn init_search(&mut self, model: &Model) {
        let num_variables = model.assignments.num_variables();
        self.rng = SmallRng::seed_from_u64(self.seed);

        self.activity = KeyedVec::default();
        self.activity.resize(num_variables, 0.0);
        for (&var, &score) in &self.preset_activity {
            if var.index() < num_variables {
                self.activity[var] = score;
            }
        }

        // Defined variables go to the back so branching prefers the search variables.
        self.var_order.clear();
        let mut defined = Vec::new();
        for index in 0..num_variables {
            let var = VariableId::create_from_index(index);
            if model.assignments.is_defined(var) {
                defined.push(var);
            } else {
                self.var_order.push(var);
            }
        }
        self.decision_var_end = self.var_order.len();
        self.var_order.extend(defined);
        self.reshuffle_var_order();

        self.decision_trail.clear();
        self.best_num_instantiated = 0;
        self.best_assignment.clear();
        self.current_best_assignment = self.hint.clone();
        self.current_decision = 0;
        self.stats = SolverStats::default();
    }

    /// Runs the two presolve phases: per-constraint root pruning until the aggregate
    /// size-plus-range measure stops shrinking, then a one-time preparation of every propagator's
    /// internal state, followed by a root propagation fixpoint for anything enqueued on the way.
    pub(crate) fn presolve(&mut self, model: &mut Model) -> bool {
        loop {
            let before = presolve_measure(model);
            for index in 0..model.constraints.len() {
                if !model.with_constraint(index, |constraint, ctx| constraint.presolve(ctx)) {
                    return false;
                }
            }
            let after = presolve_measure(model);
            kabocha_assert_moderate!(after <= before, "presolve must never widen a domain");
            if after == before {
                break;
            }
        }

        model.assignments.sync_from_domains();
        for index in 0..model.constraints.len() {
            if !model.with_constraint(index, |constraint, ctx| constraint.prepare_propagation(ctx))
            {
                return false;
            }
        }

        if !self.process_queue(model) {
            model.assignments.clear_pending();
            return false;
        }
        true
    }

    // ===== Propagation =====

    /// Applies pending updates to a fixpoint, fanning each one out to the watching constraints.
    /// Returns `false` on inconsistency, leaving the rest of the queue for the caller to clear.
    pub(crate) fn process_queue(&mut self, model: &mut Model) -> bool {
        while let Some(update) = model.assignments.pop_pending() {
            if self.is_stopped() {
                return false;
            }
            let var = update.var;
            let prev_min = model.assignments.lower_bound(var);
            let prev_max = model.assignments.upper_bound(var);
            let was_instantiated = model.assignments.is_instantiated(var);

            match update.kind {
                UpdateKind::Instantiate => {
                    if was_instantiated {
                        // Equal requests coalesce; conflicting ones are inconsistent.
                        if model.assignments.value(var) != update.value {
                            return false;
                        }
                        continue;
                    }
                    if !model
                        .assignments
                        .instantiate(self.current_decision, var, update.value)
                    {
                        return false;
                    }
                    if !self.propagate_instantiate(model, var, prev_min, prev_max) {
                        return false;
                    }
                }
                UpdateKind::SetMin => {
                    if update.value <= prev_min {
                        continue;
                    }
                    if !model
                        .assignments
                        .set_min(self.current_decision, var, update.value)
                    {
                        return false;
                    }
                    if model.assignments.is_instantiated(var) {
                        if !self.propagate_instantiate(model, var, prev_min, prev_max) {
                            return false;
                        }
                    } else {
                        let actual_min = model.assignments.lower_bound(var);
                        if !dispatch_set_min(model, self.current_decision, var, actual_min, prev_min)
                        {
                            return false;
                        }
                    }
                }
                UpdateKind::SetMax => {
                    if update.value >= prev_max {
                        continue;
                    }
                    if !model
                        .assignments
                        .set_max(self.current_decision, var, update.value)
                    {
                        return false;
                    }
                    if model.assignments.is_instantiated(var) {
                        if !self.propagate_instantiate(model, var, prev_min, prev_max) {
                            return false;
                        }
                    } else {
                        let actual_max = model.assignments.upper_bound(var);
                        if !dispatch_set_max(model, self.current_decision, var, actual_max, prev_max)
                        {
                            return false;
                        }
                    }
                }
                UpdateKind::RemoveValue => {
                    if !model.assignments.contains(var, update.value) {
                        continue;
                    }
                    if !model
                        .assignments
                        .remove_value(self.current_decision, var, update.value)
                    {
                        return false;
                    }
                    if model.assignments.is_instantiated(var) {
                        if !self.propagate_instantiate(model, var, prev_min, prev_max) {
                            return false;
                        }
                    } else {
                        // Boundary removals surface as bound events so downstream propagators
                        // observe consistent bounds; a strictly interior removal stays a removal.
                        let new_min = model.assignments.lower_bound(var);
                        let new_max = model.assignments.upper_bound(var);
                        if new_min > prev_min
                            && !dispatch_set_min(model, self.current_decision, var, new_min, prev_min)
                        {
                            return false;
                        }
                        if new_max < prev_max
                            && !dispatch_set_max(model, self.current_decision, var, new_max, prev_max)
                        {
                            return false;
                        }
                        if update.value > new_min
                            && update.value < new_max
                            && !dispatch_remove_value(
                                model,
                                self.current_decision,
                                var,
                                update.value,
                            )
                        {
                            return false;
                        }
                    }
                }
            }
        }
        true
    }

    /// Fans out an instantiation to the watching constraints, then runs NoGood unit propagation
    /// for the watches registered on `(var, value)`.
    pub(crate) fn propagate_instantiate(
        &mut self,
        model: &mut Model,
        var: VariableId,
        prev_min: i64,
        prev_max: i64,
    ) -> bool {
        let value = model.assignments.value(var);
        let count = model.watch_list.num_watchers(DomainEvent::Instantiate, var);
        for index in 0..count {
            let watcher = model.watch_list.watcher(DomainEvent::Instantiate, var, index);
            let level = self.current_decision;
            let ok = model.with_constraint(watcher.constraint.index(), |constraint, ctx| {
                constraint.on_instantiate(ctx, level, var, watcher.slot, value, prev_min, prev_max)
            });
            if !ok {
                return false;
            }
        }

        if !self.nogoods.is_empty() {
            let triggered = Literal { var, value };
            for index in self.nogoods.watching(var, value) {
                self.stats.nogood_check_count += 1;
                if !self
                    .nogoods
                    .propagate(&mut model.assignments, index, triggered, &mut self.stats)
                {
                    self.nogoods.note_conflict(index);
                    self.stats.nogood_prune_count += 1;
                    return false;
                }
            }
        }
        true
    }

    // ===== Depth-first search =====

    /// One bounded depth-first search attempt from the current root. The callback receives each
    /// verified solution; returning `false` ends the attempt with [`SearchResult::Sat`].
    fn run_search(
        &mut self,
        model: &mut Model,
        conflict_limit: i64,
        on_solution: &mut dyn FnMut(Solution) -> bool,
    ) -> SearchResult {
        self.run_search_inner(model, conflict_limit, on_solution, false)
    }

    /// Like [`SearchEngine::run_search`] but exhausts the search space, treating every reported
    /// solution as a dead end so enumeration continues.
    fn run_search_all(
        &mut self,
        model: &mut Model,
        on_solution: &mut dyn FnMut(Solution) -> bool,
    ) -> SearchResult {
        self.run_search_inner(model, i64::MAX, on_solution, true)
    }

    fn run_search_inner(
        &mut self,
        model: &mut Model,
        conflict_limit: i64,
        on_solution: &mut dyn FnMut(Solution) -> bool,
        find_all: bool,
    ) -> SearchResult {
        let mut stack: Vec<Frame> = Vec::new();
        let mut result = SearchResult::Unsat;
        let mut ascending = false;

        loop {
            if !ascending {
                // Descend into a new frame.
                if self.is_stopped() {
                    result = SearchResult::Unknown;
                    ascending = true;
                    continue;
                }

                let depth = stack.len() as u64;
                self.stats.depth_sum += depth;
                self.stats.depth_count += 1;
                if depth > self.stats.max_depth {
                    self.stats.max_depth = depth;
                }

                let Some(var) = self.select_variable(model) else {
                    // Every variable is instantiated: a candidate solution.
                    result = if model.verify_assignment() {
                        let solution = model.extract_solution();
                        if !on_solution(solution) {
                            SearchResult::Sat
                        } else if find_all {
                            SearchResult::Unsat
                        } else {
                            SearchResult::Sat
                        }
                    } else {
                        SearchResult::Unsat
                    };
                    ascending = true;
                    continue;
                };

                let mut values = model.assignments.values_of(var);
                if let Some(&preferred) = self.current_best_assignment.get(&var) {
                    if let Some(position) = values.iter().position(|&value| value == preferred) {
                        values.swap(0, position);
                    }
                }

                let remaining_budget = stack
                    .last()
                    .map_or(conflict_limit, |frame| frame.remaining_budget);
                stack.push(Frame {
                    var,
                    values,
                    value_index: 0,
                    save_point: self.current_decision,
                    prev_min: model.assignments.lower_bound(var),
                    prev_max: model.assignments.upper_bound(var),
                    nogoods_before: self.nogoods.len(),
                    remaining_budget,
                });
                // Fall through to value selection.
            } else {
                // Ascend: fold the child's result into the frame below it.
                if stack.is_empty() {
                    return result;
                }
                let _ = self.decision_trail.pop();

                if result == SearchResult::Sat {
                    let _ = stack.pop();
                    continue;
                }

                let budget_exhausted = {
                    let frame = stack.last().expect("checked non-empty");
                    result == SearchResult::Unknown || frame.remaining_budget <= 1
                };
                if budget_exhausted {
                    let save_point = stack.last().expect("checked non-empty").save_point;
                    self.current_decision -= 1;
                    model.backtrack(save_point);
                    let _ = stack.pop();
                    result = SearchResult::Unknown;
                    continue;
                }

                // The child subtree is exhausted; charge the conflict and try the next value.
                let save_point = {
                    let frame = stack.last_mut().expect("checked non-empty");
                    frame.remaining_budget -= 1;
                    frame.value_index += 1;
                    frame.save_point
                };
                self.current_decision -= 1;
                model.backtrack(save_point);
                // Fall through to value selection.
            }

            // Try the frame's remaining values until one survives propagation.
            let mut found_value = false;
            loop {
                let (var, value, save_point, prev_min, prev_max) = {
                    let frame = stack.last().expect("a frame was just pushed or re-entered");
                    if frame.value_index >= frame.values.len() || self.is_stopped() {
                        break;
                    }
                    (
                        frame.var,
                        frame.values[frame.value_index],
                        frame.save_point,
                        frame.prev_min,
                        frame.prev_max,
                    )
                };

                self.current_decision += 1;
                if !model
                    .assignments
                    .instantiate(self.current_decision, var, value)
                {
                    self.current_decision -= 1;
                    stack.last_mut().expect("checked non-empty").value_index += 1;
                    continue;
                }

                let ok = self.propagate_instantiate(model, var, prev_min, prev_max)
                    && self.process_queue(model);
                if ok {
                    self.decision_trail.push(Literal { var, value });
                    ascending = false;
                    found_value = true;
                    break;
                }

                model.assignments.clear_pending();
                self.current_decision -= 1;
                model.backtrack(save_point);
                stack.last_mut().expect("checked non-empty").value_index += 1;
            }

            if !found_value {
                if self.is_stopped() {
                    // Cancelled mid-frame: no conclusion about this subtree may be recorded.
                    let _ = stack.pop();
                    result = SearchResult::Unknown;
                    ascending = true;
                    continue;
                }

                // Every value failed: record the conflict and learn from the decisions.
                let (var, nogoods_before) = {
                    let frame = stack.last().expect("checked non-empty");
                    (frame.var, frame.nogoods_before)
                };
                self.activity[var] += 1.0;
                self.stats.fail_count += 1;
                self.save_partial_assignment(model);

                // NoGoods learned beneath this frame are subsumed by its own.
                self.nogoods.truncate(nogoods_before);
                if self.nogood_learning && self.decision_trail.len() >= 2 {
                    self.nogoods.add(self.decision_trail.clone());
                    self.stats.nogood_count += 1;
                    let bump = 1.0 / self.decision_trail.len() as f64;
                    for literal in &self.decision_trail {
                        self.activity[literal.var] += bump;
                    }
                }

                let _ = stack.pop();
                result = SearchResult::Unsat;
                ascending = true;
            }
        }
    }

    /// The restart loop: bounded attempts with a Luby-like growth of the conflict budget.
    fn search_with_restart(
        &mut self,
        model: &mut Model,
        mut callback: Option<&mut dyn FnMut(&Solution) -> bool>,
        find_all: bool,
    ) -> Option<Solution> {
        let mut inner_limit = INITIAL_CONFLICT_LIMIT;
        let mut outer_limit = INITIAL_OUTER_LIMIT;
        let root_point = self.current_decision;

        while !self.is_stopped() {
            let mut outer = 0;
            while outer < outer_limit as i64 && !self.is_stopped() {
                outer += 1;
                let conflict_limit = inner_limit as i64;
                let nogoods_before = self.nogoods.len();

                let mut found = None;
                let result = self.run_search(model, conflict_limit, &mut |solution| {
                    found = Some(solution);
                    false
                });

                match result {
                    SearchResult::Sat => {
                        let solution = found.expect("the callback stored the solution");
                        if !find_all {
                            self.finish();
                            return Some(solution);
                        }
                        let keep_going = callback
                            .as_mut()
                            .map_or(false, |callback| callback(&solution));
                        if !keep_going {
                            self.finish();
                            return None;
                        }
                        // Block this exact assignment and keep enumerating from the root.
                        model.assignments.clear_pending();
                        let literals = self.solution_literals(model);
                        model.backtrack(root_point);
                        self.current_decision = root_point;
                        if !self.add_solution_nogood(model, literals) {
                            // Every assignment was forced at the root, so the solution is unique.
                            self.finish();
                            return None;
                        }
                    }
                    SearchResult::Unsat => {
                        self.finish();
                        return None;
                    }
                    SearchResult::Unknown => {
                        self.restart(
                            model,
                            root_point,
                            nogoods_before,
                            &mut inner_limit,
                            &mut outer_limit,
                        );
                    }
                }
            }
        }

        debug!("search cancelled");
        self.finish();
        None
    }

    /// Shared restart bookkeeping after an [`SearchResult::Unknown`] attempt.
    fn restart(
        &mut self,
        model: &mut Model,
        root_point: DecisionLevel,
        nogoods_before: usize,
        inner_limit: &mut f64,
        outer_limit: &mut f64,
    ) {
        model.assignments.clear_pending();
        model.backtrack(root_point);
        self.current_decision = root_point;
        self.stats.restart_count += 1;
        self.current_best_assignment = self.best_assignment.clone();

        self.nogoods.sort_and_evict();

        // A stalled attempt (no new NoGoods) widens both limits additively instead.
        let mut limit_changed = false;
        if self.nogoods.len() <= nogoods_before {
            *inner_limit += 1.0;
            *outer_limit += 1.0;
            limit_changed = true;
        }

        self.decay_activities();
        self.reshuffle_var_order();
        self.activity_first = !self.activity_first;

        if !limit_changed {
            *inner_limit *= CONFLICT_LIMIT_MULTIPLIER;
            if *inner_limit > *outer_limit {
                *outer_limit *= CONFLICT_LIMIT_MULTIPLIER;
                *inner_limit = INITIAL_CONFLICT_LIMIT;
            }
        }

        if self.verbose {
            info!(
                "restart #{}: fails={} max_depth={} nogoods={}",
                self.stats.restart_count,
                self.stats.fail_count,
                self.stats.max_depth,
                self.nogoods.len()
            );
        } else {
            debug!("restart #{}", self.stats.restart_count);
        }
    }

    // ===== Heuristics =====

    /// Picks the next branching variable, or `None` when everything is instantiated. Search
    /// variables are preferred; defined variables only serve as a fallback.
    fn select_variable(&self, model: &Model) -> Option<VariableId> {
        self.scan_candidates(model, &self.var_order[..self.decision_var_end])
            .or_else(|| self.scan_candidates(model, &self.var_order[self.decision_var_end..]))
    }

    fn scan_candidates(&self, model: &Model, candidates: &[VariableId]) -> Option<VariableId> {
        let mut best: Option<VariableId> = None;
        let mut best_size = usize::MAX;
        let mut best_activity = -1.0;

        for &var in candidates {
            if model.assignments.is_instantiated(var) {
                continue;
            }
            let size = model.assignments.size(var);
            let activity = if self.activity_selection {
                self.activity[var]
            } else {
                0.0
            };
            let better = if self.activity_first {
                activity > best_activity || (activity == best_activity && size < best_size)
            } else {
                size < best_size || (size == best_size && activity > best_activity)
            };
            if better {
                best = Some(var);
                best_size = size;
                best_activity = activity;
            }
        }
        best
    }

    fn decay_activities(&mut self) {
        for score in self.activity.iter_mut() {
            *score *= ACTIVITY_DECAY;
        }
    }

    fn reshuffle_var_order(&mut self) {
        let (search_vars, defined_vars) = self.var_order.split_at_mut(self.decision_var_end);
        search_vars.shuffle(&mut self.rng);
        defined_vars.shuffle(&mut self.rng);
    }

    // ===== Partial assignments and solution NoGoods =====

    /// After a conflict, keeps the deepest partial assignment seen so far for value-ordering
    /// reuse across restarts.
    fn save_partial_assignment(&mut self, model: &Model) {
        let num_instantiated = model.assignments.num_instantiated();
        if num_instantiated <= self.best_num_instantiated {
            return;
        }
        self.best_num_instantiated = num_instantiated;
        for index in 0..model.assignments.num_variables() {
            let var = VariableId::create_from_index(index);
            if model.assignments.is_instantiated(var) {
                let _ = self.best_assignment.insert(var, model.assignments.value(var));
            }
        }
    }

    /// Seeds the value-ordering hints with the complete current assignment (used on incumbents).
    fn remember_full_assignment(&mut self, model: &Model) {
        self.current_best_assignment.clear();
        for index in 0..model.assignments.num_variables() {
            let var = VariableId::create_from_index(index);
            if model.assignments.is_instantiated(var) {
                let _ = self
                    .current_best_assignment
                    .insert(var, model.assignments.value(var));
            }
        }
    }

    /// The literals of the current full assignment, skipping variables that were constants to
    /// begin with (they carry no information and would wedge the watches).
    fn solution_literals(&self, model: &Model) -> Vec<Literal> {
        let mut literals = Vec::new();
        for index in 0..model.assignments.num_variables() {
            let var = VariableId::create_from_index(index);
            if model.assignments.is_instantiated(var) && model.assignments.initial_range(var) > 1 {
                literals.push(Literal {
                    var,
                    value: model.assignments.value(var),
                });
            }
        }
        literals
    }

    /// Blocks a reported solution with a permanent NoGood, called after the search has unwound
    /// to the root. Literals whose variable is still instantiated at the root are dropped: they
    /// hold in every remaining branch but can never trigger a watch again. `false` means nothing
    /// was blocked because the whole assignment is forced at the root.
    fn add_solution_nogood(&mut self, model: &Model, literals: Vec<Literal>) -> bool {
        let literals: Vec<Literal> = literals
            .into_iter()
            .filter(|literal| !model.assignments.is_instantiated(literal.var))
            .collect();
        if literals.is_empty() {
            return false;
        }
        self.nogoods.add(literals);
        self.stats.nogood_count += 1;
        self.nogoods.make_last_permanent();
        true
    }

    fn finish(&mut self) {
        self.stats.nogoods_size = self.nogoods.len() as u64;
    }
}

/// The strictly decreasing quantity presolve iterates on.
fn presolve_measure(model: &Model) -> u128 {
    let mut measure: u128 = 0;
    for index in 0..model.assignments.num_variables() {
        let var = VariableId::create_from_index(index);
        measure += model.assignments.size(var) as u128;
        measure +=
            (model.assignments.upper_bound(var) - model.assignments.lower_bound(var)) as u128;
    }
    measure
}

fn dispatch_set_min(
    model: &mut Model,
    level: DecisionLevel,
    var: VariableId,
    new_min: i64,
    prev_min: i64,
) -> bool {
    let count = model.watch_list.num_watchers(DomainEvent::LowerBound, var);
    for index in 0..count {
        let watcher = model.watch_list.watcher(DomainEvent::LowerBound, var, index);
        let ok = model.with_constraint(watcher.constraint.index(), |constraint, ctx| {
            constraint.on_set_min(ctx, level, var, watcher.slot, new_min, prev_min)
        });
        if !ok {
            return false;
        }
    }
    true
}

fn dispatch_set_max(
    model: &mut Model,
    level: DecisionLevel,
    var: VariableId,
    new_max: i64,
    prev_max: i64,
) -> bool {
    let count = model.watch_list.num_watchers(DomainEvent::UpperBound, var);
    for index in 0..count {
        let watcher = model.watch_list.watcher(DomainEvent::UpperBound, var, index);
        let ok = model.with_constraint(watcher.constraint.index(), |constraint, ctx| {
            constraint.on_set_max(ctx, level, var, watcher.slot, new_max, prev_max)
        });
        if !ok {
            return false;
        }
    }
    true
}

fn dispatch_remove_value(
    model: &mut Model,
    level: DecisionLevel,
    var: VariableId,
    value: i64,
) -> bool {
    let count = model.watch_list.num_watchers(DomainEvent::Removal, var);
    for index in 0..count {
        let watcher = model.watch_list.watcher(DomainEvent::Removal, var, index);
        let ok = model.with_constraint(watcher.constraint.index(), |constraint, ctx| {
            constraint.on_remove_value(ctx, level, var, watcher.slot, value)
        });
        if !ok {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use crate::constraints::all_different;
    use crate::constraints::int_lin_eq;
    use crate::constraints::int_lt;
    use crate::engine::test_helper::TestHarness;

    fn snapshot(harness: &TestHarness) -> Vec<(i64, i64, usize)> {
        let assignments = harness.model.assignments();
        (0..assignments.num_variables())
            .map(|index| {
                let var = crate::VariableId(index as u32);
                (
                    assignments.lower_bound(var),
                    assignments.upper_bound(var),
                    assignments.size(var),
                )
            })
            .collect()
    }

    #[test]
    fn presolve_is_a_fixpoint() {
        let mut harness = TestHarness::new();
        let x = harness.new_variable(0, 9);
        let y = harness.new_variable(0, 9);
        let z = harness.new_variable(0, 9);
        harness.post(int_lin_eq(vec![1, 1, 1], vec![x, y, z], 5));
        harness.post(int_lt(x, y));
        harness.post(all_different(vec![x, y, z]));

        assert!(harness.prepare());
        let after_first = snapshot(&harness);

        // Re-running the whole presolve pipeline changes no domain.
        assert!(harness.engine.presolve(&mut harness.model));
        assert_eq!(snapshot(&harness), after_first);
    }

    #[test]
    fn the_pending_queue_is_fifo() {
        let mut harness = TestHarness::new();
        let x = harness.new_variable(0, 9);
        assert!(harness.prepare());

        harness.model.assignments.enqueue_set_min(x, 2);
        harness.model.assignments.enqueue_set_max(x, 7);
        harness.model.assignments.enqueue_remove_value(x, 5);
        assert!(harness.propagate());

        harness.assert_bounds(x, 2, 7);
        assert!(!harness.contains(x, 5));
        assert_eq!(harness.model.assignments().size(x), 5);
    }
}
