//! The bounded sub-agent execution loop.
//!
//! A [`SubAgentScope`] is a nested agent instance delegated one narrow task:
//! its own policy engine (allow exactly the registered tools, ask for
//! anything else), its own message bus, a fixed model, and hard turn and
//! wall-clock budgets. The loop runs one model call per turn, settles at
//! most one batch of tool calls through bus confirmation and the host's
//! [`ToolExecutor`], and terminates with a [`TerminateMode`] that says why.
//!
//! ```text
//!   create ──> render prompt ──> loop:  deadline / budget / cancel checks
//!                                        model call (retry_with_backoff)
//!                                        emit_value?  record output
//!                                        other tool?  confirm ──> execute
//!                                        no calls?    goal or nudge
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use governance::{
    retry_with_backoff, ApiError, BusMessage, ConfirmationOutcome, MessageBus, ModelRequest,
    ModelResponse, NoopTelemetry, Part, PolicyEngine, PolicyProvider, PolicyRule, RetryOptions,
    RetryTuning, RuleMatcher, SharedMessageBus, SharedModelClient, SharedTelemetry,
    TelemetryEvent, ToolCall, Turn,
};

use crate::errors::SubAgentError;
use crate::prompt::{build_system_prompt, render_template};
use crate::tools::{emit_value_declaration, ToolExecutor, ToolRegistry, EMIT_VALUE_TOOL};
use crate::types::{
    ContextState, ModelConfig, OutputConfig, PromptConfig, RunConfig, SubAgentOutput,
    TerminateMode,
};

const LOG_TARGET: &str = "subagent.scope";

/// How long a scope waits for confirmation of one tool call before treating
/// it as denied.
const CONFIRM_TIMEOUT: Duration = Duration::from_secs(60);

/// Collaborators a scope borrows from its host.
#[derive(Clone)]
pub struct SubAgentRuntime {
    client: SharedModelClient,
    executor: Arc<dyn ToolExecutor>,
    telemetry: SharedTelemetry,
    retry: RetryTuning,
}

impl SubAgentRuntime {
    pub fn new(client: SharedModelClient, executor: Arc<dyn ToolExecutor>) -> Self {
        Self {
            client,
            executor,
            telemetry: Arc::new(NoopTelemetry),
            retry: RetryTuning::default(),
        }
    }

    pub fn with_telemetry(mut self, telemetry: SharedTelemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_retry(mut self, retry: RetryTuning) -> Self {
        self.retry = retry;
        self
    }
}

/// One delegated task: fixed model, narrowed tools, bounded budgets.
pub struct SubAgentScope {
    name: String,
    runtime: SubAgentRuntime,
    model: ModelConfig,
    run_config: RunConfig,
    prompt: PromptConfig,
    outputs: OutputConfig,
    tools: ToolRegistry,
    bus: SharedMessageBus,
}

// Manual impl: the runtime and bus hold trait objects without `Debug`.
impl fmt::Debug for SubAgentScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubAgentScope")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("run_config", &self.run_config)
            .field("prompt", &self.prompt)
            .field("outputs", &self.outputs)
            .field("tools", &self.tools)
            .finish_non_exhaustive()
    }
}

impl SubAgentScope {
    /// Validate the configuration and build the scope's own policy engine
    /// and bus. The policy allows exactly the registered tools; anything
    /// else falls through to ask-user, which inside an unattended scope
    /// means a confirmation timeout and a denial.
    pub fn create(
        name: impl Into<String>,
        runtime: SubAgentRuntime,
        model: ModelConfig,
        run_config: RunConfig,
        prompt: PromptConfig,
        outputs: OutputConfig,
        tools: ToolRegistry,
    ) -> Result<Self, SubAgentError> {
        let name = name.into();
        if run_config.max_turns == 0 {
            return Err(SubAgentError::InvalidConfig(
                "max_turns must be at least 1".into(),
            ));
        }
        if model.model.is_empty() {
            return Err(SubAgentError::InvalidConfig("model must be set".into()));
        }
        if tools.contains(EMIT_VALUE_TOOL) {
            return Err(SubAgentError::InvalidConfig(format!(
                "`{EMIT_VALUE_TOOL}` is reserved for output collection"
            )));
        }

        let rules: Vec<PolicyRule> = tools
            .names()
            .into_iter()
            .map(|tool| PolicyRule::allow(RuleMatcher::ToolName(tool.to_string())))
            .collect();
        let policy: Arc<dyn PolicyProvider> = Arc::new(PolicyEngine::new(rules));
        let bus = MessageBus::new(policy).shared();

        Ok(Self {
            name,
            runtime,
            model,
            run_config,
            prompt,
            outputs,
            tools,
            bus,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The scope's private bus. Subscribe here to observe activity events
    /// and confirmation traffic for this task only.
    pub fn bus(&self) -> SharedMessageBus {
        Arc::clone(&self.bus)
    }

    /// Drive the task to termination.
    ///
    /// Returns the emitted outputs with the mode that ended the run, or an
    /// error for cancellation and unrecoverable model failures. Tool-level
    /// failures are not errors here: they go back to the model as function
    /// responses and consume budget.
    pub async fn run(
        &self,
        state: &ContextState,
        cancel: CancellationToken,
    ) -> Result<SubAgentOutput, SubAgentError> {
        let started = Instant::now();
        let deadline = self.run_config.max_time();
        let system_prompt = build_system_prompt(
            &render_template(&self.prompt.system_prompt, state)?,
            &self.outputs,
        );

        let mut history = vec![Turn::user(vec![Part::text(
            "Begin working on the task now.",
        )])];
        let mut emitted: BTreeMap<String, Value> = BTreeMap::new();
        let mut turns_used: u32 = 0;

        info!(
            target: LOG_TARGET,
            scope = %self.name,
            model = %self.model.model,
            max_turns = self.run_config.max_turns,
            "scope started"
        );
        self.publish_activity(
            "started",
            json!({ "model": self.model.model, "max_turns": self.run_config.max_turns }),
        );

        let mode = loop {
            if started.elapsed() >= deadline {
                warn!(target: LOG_TARGET, scope = %self.name, "wall clock expired");
                break TerminateMode::Timeout;
            }
            if turns_used >= self.run_config.max_turns {
                warn!(target: LOG_TARGET, scope = %self.name, "turn budget exhausted");
                break TerminateMode::MaxTurns;
            }
            if cancel.is_cancelled() {
                self.finish(TerminateMode::Error, turns_used, started.elapsed());
                return Err(SubAgentError::Cancelled);
            }

            turns_used += 1;
            self.publish_activity("turn_started", json!({ "turn": turns_used }));

            let request = self.build_request(&system_prompt, &history);
            let response = match self.call_model(request, &cancel).await {
                Ok(response) => response,
                Err(ApiError::Cancelled) => {
                    self.finish(TerminateMode::Error, turns_used, started.elapsed());
                    return Err(SubAgentError::Cancelled);
                }
                Err(error) => {
                    self.finish(TerminateMode::Error, turns_used, started.elapsed());
                    return Err(SubAgentError::Model(error));
                }
            };
            history.push(Turn::model(response.parts.clone()));

            let calls = response.function_calls();
            if calls.is_empty() {
                let missing = self.missing_outputs(&emitted);
                if missing.is_empty() {
                    break TerminateMode::Goal;
                }
                debug!(
                    target: LOG_TARGET,
                    scope = %self.name,
                    missing = missing.join(", "),
                    "model stopped with outputs missing, nudging"
                );
                history.push(Turn::user(vec![Part::text(nudge_message(&missing))]));
                continue;
            }

            let mut results = Vec::with_capacity(calls.len());
            for (tool, args) in calls {
                results.push(self.dispatch_call(tool, args, &mut emitted).await);
            }
            history.push(Turn::user(results));

            if !self.outputs.is_empty() && self.missing_outputs(&emitted).is_empty() {
                break TerminateMode::Goal;
            }
        };

        let elapsed = started.elapsed();
        self.finish(mode, turns_used, elapsed);
        Ok(SubAgentOutput {
            terminate_mode: mode,
            emitted_outputs: emitted,
            turns_used,
            elapsed,
        })
    }

    fn build_request(&self, system_prompt: &str, history: &[Turn]) -> ModelRequest {
        let mut declarations = self.tools.declarations().to_vec();
        if !self.outputs.is_empty() {
            declarations.push(emit_value_declaration(&self.outputs));
        }
        ModelRequest::new(self.model.model.as_str())
            .with_system_prompt(system_prompt)
            .with_history(history.to_vec())
            .with_tools(declarations)
            .with_temperature(self.model.temperature)
            .with_top_p(self.model.top_p)
    }

    async fn call_model(
        &self,
        request: ModelRequest,
        cancel: &CancellationToken,
    ) -> Result<ModelResponse, ApiError> {
        let client = Arc::clone(&self.runtime.client);
        let options = RetryOptions::from_tuning(&self.runtime.retry)
            .with_cancellation(cancel.clone())
            .with_content_check(ModelResponse::is_empty)
            .with_telemetry(Arc::clone(&self.runtime.telemetry));
        retry_with_backoff(
            || {
                let client = Arc::clone(&client);
                let request = request.clone();
                async move { client.generate(request).await }
            },
            options,
        )
        .await
    }

    /// Settle one tool call into the function response the model will see.
    async fn dispatch_call(
        &self,
        tool: &str,
        args: &Value,
        emitted: &mut BTreeMap<String, Value>,
    ) -> Part {
        let call = ToolCall::new(tool, args.clone());

        if tool == EMIT_VALUE_TOOL {
            return self.record_emission(&call, emitted);
        }
        if !self.tools.contains(tool) {
            warn!(target: LOG_TARGET, scope = %self.name, tool, "tool not in this scope");
            return error_response(tool, format!("tool `{tool}` is not available in this scope"));
        }

        match self.bus.confirm(call.clone(), CONFIRM_TIMEOUT).await {
            ConfirmationOutcome::Rejected { reason } => {
                let reason = reason.unwrap_or_else(|| "confirmation denied".into());
                warn!(
                    target: LOG_TARGET,
                    scope = %self.name,
                    tool,
                    reason = %reason,
                    "tool call rejected"
                );
                error_response(tool, format!("call rejected: {reason}"))
            }
            ConfirmationOutcome::Approved => match self.runtime.executor.execute(&call).await {
                Ok(output) => Part::function_response(tool, json!({ "output": output })),
                Err(error) => {
                    warn!(target: LOG_TARGET, scope = %self.name, tool, %error, "tool failed");
                    error_response(tool, format!("execution failed: {error}"))
                }
            },
        }
    }

    /// Intercepted `emit_value` handling. Never reaches the bus or the
    /// executor; unknown names are answered with an error and not recorded.
    fn record_emission(&self, call: &ToolCall, emitted: &mut BTreeMap<String, Value>) -> Part {
        let Some(output) = call.args.get("name").and_then(Value::as_str) else {
            return error_response(EMIT_VALUE_TOOL, "missing `name` argument".to_string());
        };
        if !self.outputs.expected.contains_key(output) {
            warn!(target: LOG_TARGET, scope = %self.name, output, "emit for undeclared output");
            return error_response(
                EMIT_VALUE_TOOL,
                format!("`{output}` is not a declared output of this task"),
            );
        }
        let Some(value) = call.args.get("value") else {
            return error_response(EMIT_VALUE_TOOL, "missing `value` argument".to_string());
        };

        emitted.insert(output.to_string(), value.clone());
        info!(target: LOG_TARGET, scope = %self.name, output, "output emitted");
        self.publish_activity("output_emitted", json!({ "name": output }));
        Part::function_response(
            EMIT_VALUE_TOOL,
            json!({ "status": "recorded", "name": output }),
        )
    }

    fn missing_outputs(&self, emitted: &BTreeMap<String, Value>) -> Vec<String> {
        self.outputs
            .expected
            .keys()
            .filter(|name| !emitted.contains_key(*name))
            .cloned()
            .collect()
    }

    fn publish_activity(&self, activity: &str, detail: Value) {
        self.bus
            .publish(BusMessage::subagent_activity(&self.name, activity, detail));
    }

    fn finish(&self, mode: TerminateMode, turns: u32, elapsed: Duration) {
        let elapsed_ms = elapsed.as_millis() as u64;
        info!(
            target: LOG_TARGET,
            scope = %self.name,
            mode = %mode,
            turns,
            elapsed_ms,
            "scope finished"
        );
        self.publish_activity("finished", json!({ "mode": mode.as_str(), "turns": turns }));
        self.runtime.telemetry.record(TelemetryEvent::subagent_finished(
            &self.name,
            mode.as_str(),
            turns,
            elapsed_ms,
        ));
    }
}

fn error_response(tool: &str, message: String) -> Part {
    Part::function_response(tool, json!({ "error": message }))
}

fn nudge_message(missing: &[String]) -> String {
    format!(
        "You have not emitted every required output yet. Still missing: {}. \
         Record each one with the `{EMIT_VALUE_TOOL}` tool, then finish with \
         a plain-text reply.",
        missing.join(", ")
    )
}
