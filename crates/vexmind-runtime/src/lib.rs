//! `vexmind-runtime` – goal handling, command generation and the
//! orchestration loop.
//!
//! # Modules
//!
//! - [`oracle`] – [`Oracle`][oracle::Oracle]: the language-model seam, with
//!   [`OpenAiOracle`][oracle::OpenAiOracle] speaking the OpenAI-compatible
//!   `/v1/chat/completions` API.  Scene analysis is requested with a JSON
//!   Schema `response_format` so replies come back as
//!   [`SceneAnalysis`][oracle::SceneAnalysis].
//! - [`scene`] – [`SceneSource`][scene::SceneSource]: camera frames as
//!   JPEG data URIs, fetched over HTTP by
//!   [`HttpSnapshotCamera`][scene::HttpSnapshotCamera].
//! - [`command_generator`] – [`CommandGenerator`][command_generator::CommandGenerator]:
//!   turns a free-text thought into a grammar-valid, clamped
//!   [`Command`][vexmind_types::Command], with one revision round trip.
//! - [`goal_queue`] – [`GoalQueue`][goal_queue::GoalQueue]: FIFO of operator
//!   goals plus the oracle-backed accept / deny review.
//! - [`orchestrator`] – [`Orchestrator`][orchestrator::Orchestrator]: the
//!   background Observe → Think → Generate → Act loop.
//! - [`context`] – [`AppContext`][context::AppContext]: owns the device,
//!   goal queue, orchestrator and log sink for the lifetime of the process.
//! - [`log_sink`] – [`LogSink`][log_sink::LogSink]: bounded in-memory log
//!   buffer fed by a `tracing` layer.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: global
//!   subscriber with optional OTLP export.

pub mod command_generator;
pub mod context;
pub mod goal_queue;
pub mod log_sink;
pub mod oracle;
pub mod orchestrator;
pub mod scene;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use command_generator::{CommandGenerator, GenerateError};
pub use context::AppContext;
pub use goal_queue::{GoalError, GoalQueue};
pub use log_sink::{DEFAULT_LOG_CAPACITY, LogSink};
pub use oracle::{OpenAiOracle, Oracle, OracleError, SceneAnalysis, ThinkRequest};
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use scene::{HttpSnapshotCamera, SceneRef, SceneSource};
pub use telemetry::{TracerProviderGuard, init_tracing};
