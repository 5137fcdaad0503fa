//! [`AppContext`] – the one object built at startup that owns every
//! long-lived service and exposes the operator-facing operations.
//!
//! Front ends (the REPL, a future HTTP layer) receive a reference to the
//! context instead of reaching for process-wide singletons.

use std::sync::Arc;

use tracing::{info, warn};
use vexmind_hal::{CommandSink, DeviceManager, QueueStatus};
use vexmind_kernel::CommandGate;
use vexmind_types::{Command, GoalRecord, LogEntry, ServiceState, VexError};

use crate::goal_queue::{GoalError, GoalQueue};
use crate::log_sink::LogSink;
use crate::oracle::Oracle;
use crate::orchestrator::{Orchestrator, OrchestratorConfig};
use crate::scene::SceneSource;

pub struct AppContext {
    device: Arc<DeviceManager>,
    goals: Arc<GoalQueue>,
    orchestrator: Orchestrator,
    logs: Arc<LogSink>,
    gate: CommandGate,
}

impl AppContext {
    pub fn new(
        device: Arc<DeviceManager>,
        oracle: Arc<dyn Oracle>,
        scene: Arc<dyn SceneSource>,
        logs: Arc<LogSink>,
        config: OrchestratorConfig,
    ) -> Self {
        let goals = Arc::new(GoalQueue::new(Arc::clone(&oracle)));
        let orchestrator = Orchestrator::new(
            config,
            Arc::clone(&goals),
            oracle,
            scene,
            Arc::clone(&device) as Arc<dyn CommandSink>,
        );
        Self {
            device,
            goals,
            orchestrator,
            logs,
            gate: CommandGate::default(),
        }
    }

    pub async fn start(&self) -> bool {
        self.orchestrator.start().await
    }

    pub async fn stop(&self) -> bool {
        self.orchestrator.stop().await
    }

    /// Queue an operator command on the device.
    ///
    /// Operator input goes through the same grammar and clamp as generated
    /// commands; the adjusted command is what gets queued.
    ///
    /// # Errors
    ///
    /// [`VexError::Validation`] for text outside the grammar, and
    /// [`VexError::DeviceStopped`] once the device has been shut down.
    pub fn add_command(&self, text: &str, priority: bool) -> Result<Command, VexError> {
        let command = self
            .gate
            .validate_and_adjust(text)
            .map_err(|e| VexError::Validation(e.to_string()))?;
        self.device.add_command(&command.to_string(), priority)?;
        Ok(command)
    }

    /// Create a `pending` goal and enqueue it.
    ///
    /// # Errors
    ///
    /// [`GoalError::Invalid`] when `id` or `text` is blank.
    pub fn submit_goal(&self, id: &str, text: &str) -> Result<String, GoalError> {
        self.goals.submit_goal(GoalQueue::create_goal(id, text))
    }

    pub fn list_goals(&self) -> Vec<GoalRecord> {
        self.goals.list_goals()
    }

    pub fn read_state(&self) -> ServiceState {
        ServiceState {
            log_size: self.logs.len(),
            ..self.orchestrator.state()
        }
    }

    pub fn logs(&self, level: Option<&str>) -> Vec<LogEntry> {
        self.logs.get_logs(level)
    }

    pub fn executed_commands(&self) -> Vec<String> {
        self.orchestrator.executed_commands()
    }

    pub fn clear_goals(&self) -> usize {
        self.goals.clear_goals()
    }

    pub async fn review_goals(&self) -> Vec<GoalRecord> {
        self.goals.review_pending().await
    }

    pub fn queue_status(&self) -> QueueStatus {
        self.device.queue_status()
    }

    /// Write `vex motor all stop` straight to the link, ahead of the queue.
    pub fn emergency_stop(&self) {
        warn!("emergency stop requested");
        self.device.send_command(&Command::StopAll.to_string());
    }

    /// Stop the orchestrator, then the device threads.
    pub async fn shutdown(&self) {
        if self.orchestrator.is_running() {
            self.orchestrator.stop().await;
        }
        let device = Arc::clone(&self.device);
        if let Err(e) = tokio::task::spawn_blocking(move || device.stop()).await {
            warn!(error = %e, "device shutdown task failed");
        }
        info!("application context shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::OracleError;
    use crate::testing::{MockOracle, StaticScene, eventually};
    use std::time::Duration;
    use vexmind_hal::{DeviceConfig, SimController, SimHandle};
    use vexmind_types::GoalStatus;

    fn context(oracle: MockOracle) -> (AppContext, SimHandle, Arc<LogSink>) {
        let (transport, handle) = SimController::new().build();
        let device = DeviceManager::new(
            transport,
            DeviceConfig {
                command_poll_interval: Duration::from_millis(20),
                response_poll_interval: Duration::from_millis(20),
                response_poll_attempts: 3,
                error_backoff: Duration::from_millis(10),
            },
        )
        .unwrap();
        let logs = Arc::new(LogSink::default());
        let ctx = AppContext::new(
            Arc::new(device),
            Arc::new(oracle),
            Arc::new(StaticScene::ok()),
            Arc::clone(&logs),
            OrchestratorConfig {
                throttle: Duration::from_millis(20),
                stop_grace: Duration::from_secs(2),
                ..OrchestratorConfig::default()
            },
        );
        (ctx, handle, logs)
    }

    #[tokio::test]
    async fn operator_command_is_clamped_and_sent() {
        let (ctx, handle, _) = context(MockOracle::scripted(vec![]));
        let cmd = ctx.add_command("vex robot move right 500 0.1", true).unwrap();
        assert_eq!(cmd.to_string(), "vex robot move right 188 0.5");
        assert!(eventually(2000, || handle.sent_lines().len() == 1).await);
        assert_eq!(handle.sent_lines()[0], "vex robot move right 188 0.5");
        ctx.shutdown().await;
    }

    #[tokio::test]
    async fn operator_garbage_is_rejected() {
        let (ctx, handle, _) = context(MockOracle::scripted(vec![]));
        assert!(matches!(
            ctx.add_command("rm -rf /", false),
            Err(VexError::Validation(_))
        ));
        assert!(handle.sent_lines().is_empty());
        ctx.shutdown().await;
    }

    #[tokio::test]
    async fn goals_flow_through_context() {
        let (ctx, _, _) = context(MockOracle::new(|_| Ok("accepted, easy".to_string())));
        assert_eq!(
            ctx.submit_goal("g1", "go to the kitchen").unwrap(),
            "Goal with ID 'g1' successfully submitted."
        );
        assert!(ctx.submit_goal("g2", "  ").is_err());
        assert_eq!(ctx.list_goals().len(), 1);

        let decided = ctx.review_goals().await;
        assert_eq!(decided[0].status, GoalStatus::Accepted);
        assert_eq!(ctx.clear_goals(), 1);
        ctx.shutdown().await;
    }

    #[tokio::test]
    async fn running_service_drives_device() {
        let oracle = MockOracle::new(|req| match req.intent.as_str() {
            "internal-thoughts" => Ok("look around".to_string()),
            "command-generation" => Ok("vex robot move left 40 0.5".to_string()),
            _ => Err(OracleError::Empty),
        });
        let (ctx, handle, _) = context(oracle);
        assert!(ctx.start().await);
        assert!(eventually(3000, || !handle.sent_lines().is_empty()).await);
        assert!(ctx.stop().await);

        assert_eq!(handle.sent_lines()[0], "vex robot move left 40 0.5");
        let state = ctx.read_state();
        assert!(!state.running);
        assert!(state.commands_executed >= 1);
        assert_eq!(ctx.executed_commands()[0], "vex robot move left 40 0.5");
        ctx.shutdown().await;
        assert!(!ctx.queue_status().is_running);
    }

    #[tokio::test]
    async fn shutdown_closes_device_queue() {
        let (ctx, _, _) = context(MockOracle::scripted(vec![]));
        ctx.shutdown().await;
        assert!(matches!(
            ctx.add_command("vex ping", false),
            Err(VexError::DeviceStopped)
        ));
    }
}
