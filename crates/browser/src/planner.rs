//! Planner-executor mode: a computer-use model proposes one low-level UI
//! action per turn, the local browser executes it and replies with a fresh
//! screenshot, chained on the provider's previous-turn id.  Termination is
//! guaranteed by a hard turn cap.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::json;

use outreach_llm::{CircuitBreaker, ComputerAction, LlmClient, LlmError, ResponseRequest};

use crate::BrowserError;

/// Viewport advertised to the computer-use tool.
pub const DISPLAY_WIDTH: u32 = 1280;
pub const DISPLAY_HEIGHT: u32 = 800;

/// One request to the planner: either the opening instruction or the
/// screenshot result of the previously executed action.
#[derive(Debug, Clone)]
pub struct PlannerRequest {
    pub instruction: Option<String>,
    pub previous_response_id: Option<String>,
    /// `(call_id, png screenshot)` of the action just executed.
    pub action_output: Option<(String, String)>,
}

/// One planner reply: the turn id to chain on, plus the next action if the
/// planner wants one.
#[derive(Debug, Clone)]
pub struct PlannerTurn {
    pub response_id: String,
    pub action: Option<(String, ComputerAction)>,
}

/// Seam over the provider's computer-use capability so the loop is testable
/// without a provider.
#[async_trait]
pub trait ComputerUsePlanner: Send + Sync {
    async fn plan(&self, request: PlannerRequest) -> Result<PlannerTurn, BrowserError>;
}

/// Seam over the live page: capture screenshots and execute planned actions.
#[async_trait]
pub trait ActionSurface: Send + Sync {
    async fn screenshot_png(&self) -> Result<Vec<u8>, BrowserError>;
    async fn execute_action(&self, action: &ComputerAction) -> Result<(), BrowserError>;
}

/// How a planner run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannerOutcome {
    pub turns_used: u32,
    /// `true` when the planner finished on its own; `false` when the turn
    /// cap cut it off.
    pub completed: bool,
    /// `true` when the stop signal ended the run.
    pub stopped: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Ask the planner for the next action.
    Plan,
    /// Execute the pending action on the live page.
    Execute,
    /// Capture the post-action screenshot to send back.
    Wait,
    Done,
    Error,
}

/// The bounded plan→execute loop.
pub struct PlannerLoop {
    max_turns: u32,
    turn_timeout: Duration,
}

impl PlannerLoop {
    pub fn new(max_turns: u32, turn_timeout: Duration) -> Self {
        Self {
            max_turns: max_turns.max(1),
            turn_timeout,
        }
    }

    /// Drive `instruction` to completion.  The stop check is polled at every
    /// iteration; a set signal ends the run cleanly without executing the
    /// pending action.
    pub async fn run(
        &self,
        planner: &dyn ComputerUsePlanner,
        surface: &dyn ActionSurface,
        instruction: &str,
        stop: &(dyn Fn() -> bool + Send + Sync),
    ) -> Result<PlannerOutcome, BrowserError> {
        let mut state = State::Plan;
        let mut turns_used = 0u32;
        let mut previous_response_id: Option<String> = None;
        let mut action_output: Option<(String, String)> = None;
        let mut pending: Option<(String, ComputerAction)> = None;
        let mut pending_reply: Option<String> = None;
        let mut failure: Option<BrowserError> = None;

        loop {
            if stop() {
                tracing::debug!(turns_used, "planner stopped by signal");
                return Ok(PlannerOutcome {
                    turns_used,
                    completed: false,
                    stopped: true,
                });
            }

            match state {
                State::Plan => {
                    if turns_used >= self.max_turns {
                        tracing::warn!(cap = self.max_turns, "planner turn cap reached");
                        return Ok(PlannerOutcome {
                            turns_used,
                            completed: false,
                            stopped: false,
                        });
                    }

                    let request = PlannerRequest {
                        instruction: (turns_used == 0).then(|| instruction.to_string()),
                        previous_response_id: previous_response_id.clone(),
                        action_output: action_output.take(),
                    };

                    let turn =
                        match tokio::time::timeout(self.turn_timeout, planner.plan(request)).await {
                            Ok(Ok(turn)) => turn,
                            Ok(Err(err)) => {
                                failure = Some(err);
                                state = State::Error;
                                continue;
                            }
                            Err(_) => {
                                failure = Some(BrowserError::Timeout { op: "planner_turn" });
                                state = State::Error;
                                continue;
                            }
                        };

                    turns_used += 1;
                    previous_response_id = Some(turn.response_id);
                    match turn.action {
                        Some(action) => {
                            pending = Some(action);
                            state = State::Execute;
                        }
                        None => state = State::Done,
                    }
                }
                State::Execute => {
                    let Some((call_id, action)) = pending.take() else {
                        failure = Some(BrowserError::Planner(
                            "execute state without a pending action".to_string(),
                        ));
                        state = State::Error;
                        continue;
                    };
                    tracing::debug!(turn = turns_used, action = ?action, "executing planned action");
                    match surface.execute_action(&action).await {
                        Ok(()) => {
                            pending_reply = Some(call_id);
                            state = State::Wait;
                        }
                        Err(err) => {
                            failure = Some(err);
                            state = State::Error;
                        }
                    }
                }
                State::Wait => {
                    let Some(call_id) = pending_reply.take() else {
                        failure = Some(BrowserError::Planner(
                            "wait state without an executed action".to_string(),
                        ));
                        state = State::Error;
                        continue;
                    };
                    match surface.screenshot_png().await {
                        Ok(screenshot) => {
                            action_output = Some((call_id, BASE64.encode(screenshot)));
                            state = State::Plan;
                        }
                        Err(err) => {
                            failure = Some(err);
                            state = State::Error;
                        }
                    }
                }
                State::Done => {
                    return Ok(PlannerOutcome {
                        turns_used,
                        completed: true,
                        stopped: false,
                    });
                }
                State::Error => {
                    let err = failure.take().unwrap_or_else(|| {
                        BrowserError::Planner("planner loop failed".to_string())
                    });
                    tracing::warn!(turns_used, error = %err, "planner run failed");
                    return Err(err);
                }
            }
        }
    }
}

/// Consecutive provider failures before planner turns are refused for a
/// cooldown.
const BREAKER_THRESHOLD: u32 = 5;
const BREAKER_COOLDOWN: Duration = Duration::from_secs(120);

/// Provider-backed [`ComputerUsePlanner`].
pub struct LlmPlanner {
    client: LlmClient,
    model: String,
    breaker: std::sync::Mutex<CircuitBreaker>,
}

impl LlmPlanner {
    pub fn new(client: LlmClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            breaker: std::sync::Mutex::new(CircuitBreaker::new(
                BREAKER_THRESHOLD,
                BREAKER_COOLDOWN,
            )),
        }
    }

    fn build_request(&self, request: &PlannerRequest) -> ResponseRequest {
        let input = match (&request.instruction, &request.action_output) {
            (Some(instruction), _) => json!(instruction),
            (None, Some((call_id, image_b64))) => json!([{
                "type": "computer_call_output",
                "call_id": call_id,
                "output": {
                    "type": "input_image",
                    "image_url": format!("data:image/png;base64,{image_b64}"),
                },
            }]),
            (None, None) => json!("Continue."),
        };

        let mut wire = ResponseRequest::new(&self.model, input, 1_024);
        wire.previous_response_id = request.previous_response_id.clone();
        wire.truncation = Some("auto".to_string());
        wire.tools = vec![json!({
            "type": "computer_use_preview",
            "display_width": DISPLAY_WIDTH,
            "display_height": DISPLAY_HEIGHT,
            "environment": "browser",
        })];
        wire
    }
}

#[async_trait]
impl ComputerUsePlanner for LlmPlanner {
    async fn plan(&self, request: PlannerRequest) -> Result<PlannerTurn, BrowserError> {
        if !self.breaker.lock().expect("breaker lock").allow() {
            return Err(BrowserError::Planner(LlmError::CircuitOpen.to_string()));
        }

        let wire = self.build_request(&request);
        let response = match self.client.respond(&wire).await {
            Ok(response) => {
                self.breaker.lock().expect("breaker lock").record_success();
                response
            }
            Err(err) => {
                self.breaker.lock().expect("breaker lock").record_failure();
                return Err(BrowserError::Planner(err.to_string()));
            }
        };

        let action = response
            .computer_call()
            .map(|(call_id, action)| (call_id.to_string(), action.clone()));

        Ok(PlannerTurn {
            response_id: response.id,
            action,
        })
    }
}
