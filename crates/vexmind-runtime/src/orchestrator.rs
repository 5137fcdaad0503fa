//! [`Orchestrator`] – the background run-loop that turns goals into motion.
//!
//! Each iteration:
//!
//! 1. **Pick** – pop the next goal from the [`GoalQueue`].  Goals already
//!    reviewed as `denied` are consumed and skipped.  With no goal queued,
//!    the configured default objective (`"explore"`) stands in.
//! 2. **Observe** – for a goal, capture a frame from the [`SceneSource`] and
//!    ask the [`Oracle`] for objectives.  Either failing consumes the goal
//!    without retry.
//! 3. **Think** – for each objective, ask the oracle for a thought.  No
//!    thought means `vex motor all stop`.
//! 4. **Generate** – the [`CommandGenerator`] maps the thought to a
//!    validated, clamped [`Command`]; a failure skips the objective.
//! 5. **Act** – the command is handed to the [`CommandSink`] and recorded in
//!    the executed-commands history.
//!
//! Then the active goal is cleared and the loop sleeps for the throttle
//! period, waking early on stop.
//!
//! # Failure semantics
//!
//! An `Err` or a panic escaping an iteration is caught once, at the task
//! boundary, logged as a service fault, and ends the run: the state drops
//! to stopped.  A failing [`CommandSink`] is such a fault.
//!
//! # Example
//!
//! ```rust,no_run
//! use vexmind_runtime::orchestrator::Orchestrator;
//!
//! # async fn demo(orchestrator: Orchestrator) {
//! assert!(orchestrator.start().await);
//! assert!(!orchestrator.start().await); // already running
//! assert!(orchestrator.stop().await);
//! # }
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use vexmind_hal::CommandSink;
use vexmind_types::{Command, GoalRecord, GoalStatus, ServiceState, VexError};

use crate::command_generator::CommandGenerator;
use crate::goal_queue::GoalQueue;
use crate::oracle::{COMMAND_MODEL, ChatMessage, Oracle, ThinkRequest};
use crate::scene::SceneSource;

const THOUGHT_PROMPT: &str = "\
You are an AI robot that must think about its objective. Respond concisely. \
You will be given a description of your environment or a task, and you must \
reason about which single physical action to take next.";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Pause between iterations.
    pub throttle: Duration,
    /// How long [`Orchestrator::stop`] waits for the task before forcing the
    /// state to stopped.
    pub stop_grace: Duration,
    /// Objective used when no goal is queued.
    pub default_objective: String,
    /// Model the [`CommandGenerator`] asks for commands.
    pub command_model: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            throttle: Duration::from_secs(1),
            stop_grace: Duration::from_secs(5),
            default_objective: "explore".to_string(),
            command_model: COMMAND_MODEL.to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared loop state
// ─────────────────────────────────────────────────────────────────────────────

struct Inner {
    config: OrchestratorConfig,
    goals: Arc<GoalQueue>,
    generator: CommandGenerator,
    oracle: Arc<dyn Oracle>,
    scene: Arc<dyn SceneSource>,
    sink: Arc<dyn CommandSink>,
    state: Mutex<ServiceState>,
    executed: Mutex<Vec<String>>,
    stop: AtomicBool,
    wake: Notify,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

// ─────────────────────────────────────────────────────────────────────────────
// Orchestrator
// ─────────────────────────────────────────────────────────────────────────────

pub struct Orchestrator {
    inner: Arc<Inner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        goals: Arc<GoalQueue>,
        oracle: Arc<dyn Oracle>,
        scene: Arc<dyn SceneSource>,
        sink: Arc<dyn CommandSink>,
    ) -> Self {
        let generator =
            CommandGenerator::new(Arc::clone(&oracle)).with_model(config.command_model.clone());
        Self::with_generator(config, goals, generator, oracle, scene, sink)
    }

    pub fn with_generator(
        config: OrchestratorConfig,
        goals: Arc<GoalQueue>,
        generator: CommandGenerator,
        oracle: Arc<dyn Oracle>,
        scene: Arc<dyn SceneSource>,
        sink: Arc<dyn CommandSink>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                goals,
                generator,
                oracle,
                scene,
                sink,
                state: Mutex::new(ServiceState::default()),
                executed: Mutex::new(Vec::new()),
                stop: AtomicBool::new(false),
                wake: Notify::new(),
            }),
            task: Mutex::new(None),
        }
    }

    /// Spawn the run-loop.  Returns `false`, changing nothing, if it is
    /// already running.
    pub async fn start(&self) -> bool {
        {
            let mut state = lock(&self.inner.state);
            if state.running {
                warn!("service is already running");
                return false;
            }
            state.running = true;
        }
        self.inner.stop.store(false, Ordering::SeqCst);

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move { inner.run().await });
        if let Some(stale) = lock(&self.task).replace(handle) {
            stale.abort();
        }
        info!("service started");
        true
    }

    /// Signal the run-loop to stop and wait up to the grace period for it.
    ///
    /// Returns `false`, changing nothing, if it is not running.  Otherwise
    /// the state is forced to stopped with no active goal, whether or not
    /// the task exited in time; a task that overran the grace period is
    /// aborted.
    pub async fn stop(&self) -> bool {
        if !lock(&self.inner.state).running {
            warn!("service is not running");
            return false;
        }
        self.inner.stop.store(true, Ordering::SeqCst);
        self.inner.wake.notify_waiters();

        let handle = lock(&self.task).take();
        if let Some(mut handle) = handle {
            if tokio::time::timeout(self.inner.config.stop_grace, &mut handle)
                .await
                .is_err()
            {
                warn!(
                    grace_ms = self.inner.config.stop_grace.as_millis() as u64,
                    "service task did not stop within grace period; aborting"
                );
                handle.abort();
            }
        }

        self.inner.mark_stopped();
        info!("service stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        lock(&self.inner.state).running
    }

    pub fn state(&self) -> ServiceState {
        lock(&self.inner.state).clone()
    }

    /// Wire text of every dispatched command, oldest first.
    pub fn executed_commands(&self) -> Vec<String> {
        lock(&self.inner.executed).clone()
    }

    pub fn goals(&self) -> &Arc<GoalQueue> {
        &self.inner.goals
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.inner.stop.store(true, Ordering::SeqCst);
        self.inner.wake.notify_waiters();
        if let Some(handle) = lock(&self.task).take() {
            handle.abort();
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Run-loop
// ─────────────────────────────────────────────────────────────────────────────

impl Inner {
    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn mark_stopped(&self) {
        let mut state = lock(&self.state);
        state.running = false;
        state.active_goal = None;
    }

    fn set_active_goal(&self, goal: Option<String>) {
        lock(&self.state).active_goal = goal;
    }

    async fn run(self: Arc<Self>) {
        info!("orchestration loop started");
        match AssertUnwindSafe(self.run_loop()).catch_unwind().await {
            Ok(Ok(())) => info!("orchestration loop stopped"),
            Ok(Err(e)) => error!(error = %e, "there was an error in the service"),
            Err(_) => error!(error = "panic", "there was an error in the service"),
        }
        self.mark_stopped();
    }

    async fn run_loop(&self) -> Result<(), VexError> {
        while !self.stopped() {
            self.iterate().await?;
            self.set_active_goal(None);
            self.throttle().await;
        }
        Ok(())
    }

    /// Sleep for the throttle period or until stop is signalled.
    ///
    /// The waiter is registered before the stop flag is read, so a
    /// `notify_waiters` racing the check is not lost.
    async fn throttle(&self) {
        let woken = self.wake.notified();
        tokio::pin!(woken);
        woken.as_mut().enable();
        if self.stopped() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(self.config.throttle) => {}
            _ = woken => {}
        }
    }

    async fn iterate(&self) -> Result<(), VexError> {
        let (objectives, goal) = match self.goals.get_next_goal() {
            Some(goal) if goal.status == GoalStatus::Denied => {
                info!(goal_id = %goal.id, reason = %goal.reason, "skipping denied goal");
                return Ok(());
            }
            Some(goal) => {
                self.set_active_goal(Some(goal.request.clone()));
                info!(goal_id = %goal.id, request = %goal.request, "processing goal");
                match self.observe(&goal).await {
                    Some(objectives) => (objectives, Some(goal)),
                    None => return Ok(()),
                }
            }
            None => {
                debug!("no goals found, exploring by default");
                (vec![self.config.default_objective.clone()], None)
            }
        };

        for objective in &objectives {
            if self.stopped() {
                info!("stop requested during goal execution");
                break;
            }
            let command = match self.think(objective, goal.as_ref()).await {
                None => Command::StopAll,
                Some(thought) => match self.generator.generate_command(&thought).await {
                    Ok(command) => command,
                    Err(e) => {
                        error!(objective = %objective, error = %e, "failed to generate command for objective");
                        continue;
                    }
                },
            };
            self.dispatch(&command)?;
        }
        Ok(())
    }

    async fn observe(&self, goal: &GoalRecord) -> Option<Vec<String>> {
        let scene = match self.scene.snap_photo(true).await {
            Ok(scene) => scene,
            Err(e) => {
                warn!(goal_id = %goal.id, error = %e, "could not capture scene for goal");
                return None;
            }
        };
        match self.oracle.process_environment(&scene).await {
            Ok(analysis) if analysis.objectives.is_empty() => {
                warn!(goal_id = %goal.id, "no objectives found for goal");
                None
            }
            Ok(analysis) => {
                debug!(description = %analysis.description, objectives = analysis.objectives.len(), "scene analysed");
                Some(analysis.objectives)
            }
            Err(e) => {
                warn!(goal_id = %goal.id, error = %e, "could not process environment for goal");
                None
            }
        }
    }

    async fn think(&self, objective: &str, goal: Option<&GoalRecord>) -> Option<String> {
        let mut prompt = String::new();
        if let Some(goal) = goal {
            prompt.push_str(&format!("Goal: {}\n", goal.request));
        }
        prompt.push_str(&format!("Environment: {objective}"));

        let request = ThinkRequest::new(
            "internal-thoughts",
            vec![ChatMessage::system(THOUGHT_PROMPT), ChatMessage::user(prompt)],
        );
        match self.oracle.think(request).await {
            Ok(thought) => Some(thought),
            Err(e) => {
                warn!(objective, error = %e, "no thought returned; defaulting to stop");
                None
            }
        }
    }

    fn dispatch(&self, command: &Command) -> Result<(), VexError> {
        let wire = command.to_string();
        self.sink.add_command(&wire, false)?;
        lock(&self.executed).push(wire.clone());
        lock(&self.state).commands_executed += 1;
        info!(command = %wire, "command dispatched");
        Ok(())
    }
}
