//! In-process doubles shared by the runtime's unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use vexmind_hal::CommandSink;
use vexmind_types::VexError;

use crate::oracle::{Oracle, OracleError, SceneAnalysis, ThinkRequest};
use crate::scene::{SceneRef, SceneSource};

type ThinkFn = dyn Fn(&ThinkRequest) -> Result<String, OracleError> + Send + Sync;
type SceneFn = dyn Fn() -> Result<SceneAnalysis, OracleError> + Send + Sync;

/// Oracle whose answers are computed by closures; every request is recorded.
pub struct MockOracle {
    think: Box<ThinkFn>,
    scene: Box<SceneFn>,
    pub requests: Mutex<Vec<ThinkRequest>>,
    pub scene_calls: AtomicUsize,
}

impl MockOracle {
    pub fn new(
        think: impl Fn(&ThinkRequest) -> Result<String, OracleError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            think: Box::new(think),
            scene: Box::new(|| Err(OracleError::Empty)),
            requests: Mutex::new(Vec::new()),
            scene_calls: AtomicUsize::new(0),
        }
    }

    /// Answers every `think` call from `replies` in order, then `Empty`.
    pub fn scripted(replies: Vec<&'static str>) -> Self {
        let replies = Mutex::new(replies.into_iter().collect::<std::collections::VecDeque<_>>());
        Self::new(move |_| {
            replies
                .lock()
                .unwrap()
                .pop_front()
                .map(str::to_string)
                .ok_or(OracleError::Empty)
        })
    }

    pub fn with_scene(
        mut self,
        scene: impl Fn() -> Result<SceneAnalysis, OracleError> + Send + Sync + 'static,
    ) -> Self {
        self.scene = Box::new(scene);
        self
    }

    pub fn requests(&self) -> Vec<ThinkRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn intents(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.intent).collect()
    }
}

#[async_trait]
impl Oracle for MockOracle {
    async fn think(&self, request: ThinkRequest) -> Result<String, OracleError> {
        let reply = (self.think)(&request);
        self.requests.lock().unwrap().push(request);
        reply
    }

    async fn process_environment(&self, _scene: &SceneRef) -> Result<SceneAnalysis, OracleError> {
        self.scene_calls.fetch_add(1, Ordering::SeqCst);
        (self.scene)()
    }
}

/// Scene source that always returns the same frame, or always fails.
pub struct StaticScene {
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl StaticScene {
    pub fn ok() -> Self {
        Self {
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SceneSource for StaticScene {
    async fn snap_photo(&self, encode: bool) -> Result<SceneRef, VexError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(VexError::SceneUnavailable("no frame".into()));
        }
        Ok(if encode {
            SceneRef::DataUri("data:image/jpeg;base64,/9j/".into())
        } else {
            SceneRef::Raw(vec![0xff, 0xd8, 0xff])
        })
    }
}

/// Command sink that records what it is given.
#[derive(Default)]
pub struct RecordingSink {
    pub commands: Mutex<Vec<String>>,
    pub fail: bool,
}

impl RecordingSink {
    pub fn failing() -> Self {
        Self {
            commands: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

impl CommandSink for RecordingSink {
    fn add_command(&self, command: &str, _priority: bool) -> Result<(), VexError> {
        if self.fail {
            return Err(VexError::DeviceStopped);
        }
        self.commands.lock().unwrap().push(command.to_string());
        Ok(())
    }
}

/// Poll `cond` every few milliseconds until it holds or `ms` elapse.
pub async fn eventually(ms: u64, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_millis(ms);
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    cond()
}
