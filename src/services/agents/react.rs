// ReAct Loop Engine
// Purpose: bounded tool-augmented reasoning loop over a Reasoner.
//
// The protocol is plain text: the model alternates Thought / Action /
// Action Input blocks, the engine executes the named tool and feeds the
// result back as an Observation, until the model emits Final Answer or
// the iteration bound is hit. Tool closures are the only mechanism by
// which agent actions mutate state.

use crate::services::llm::{ChatMessage, Reasoner};
use crate::utils::error::{DossierError, DossierResult};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub type ToolFn =
    Arc<dyn Fn(String) -> Pin<Box<dyn Future<Output = String> + Send>> + Send + Sync>;

/// One callable tool: name, help text shown to the model, async closure
pub struct Tool {
    pub name: String,
    pub description: String,
    pub run: ToolFn,
}

impl Tool {
    pub fn new<F, Fut>(name: impl Into<String>, description: impl Into<String>, f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = String> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            run: Arc::new(move |input| Box::pin(f(input))),
        }
    }
}

/// Result of a finished loop
#[derive(Debug)]
pub struct ReactOutcome {
    pub final_answer: String,
    pub steps: usize,
}

pub struct ReactLoop {
    agent_name: String,
    reasoner: Arc<dyn Reasoner>,
    tools: Vec<Tool>,
    max_steps: usize,
    shutdown: Arc<AtomicBool>,
}

impl ReactLoop {
    pub fn new(
        agent_name: impl Into<String>,
        reasoner: Arc<dyn Reasoner>,
        tools: Vec<Tool>,
        max_steps: usize,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self { agent_name: agent_name.into(), reasoner, tools, max_steps, shutdown }
    }

    /// Drive the loop to a final answer.
    ///
    /// Exceeding the iteration bound or a failing reasoner call is an
    /// `Agent` error; callers decide whether that fails their phase.
    pub async fn run(&self, system_prompt: &str, task: &str) -> DossierResult<ReactOutcome> {
        let mut messages = vec![
            ChatMessage::system(format!("{}\n\n{}", system_prompt, self.format_protocol())),
            ChatMessage::user(task.to_string()),
        ];

        for step in 1..=self.max_steps {
            if self.shutdown.load(Ordering::Relaxed) {
                return Err(DossierError::agent(format!("{}: cancelled", self.agent_name)));
            }

            let text = self
                .reasoner
                .chat(&messages)
                .await
                .map_err(|e| DossierError::agent(format!("{}: {}", self.agent_name, e)))?;

            if let Some(answer) = parse_final_answer(&text) {
                tracing::debug!("{}: final answer after {} steps", self.agent_name, step);
                return Ok(ReactOutcome { final_answer: answer, steps: step });
            }

            let Some((tool_name, input)) = parse_action(&text) else {
                // no action and no final-answer marker: treat the whole
                // response as the answer rather than looping on prose
                tracing::debug!("{}: unstructured answer after {} steps", self.agent_name, step);
                return Ok(ReactOutcome { final_answer: text.trim().to_string(), steps: step });
            };

            let observation = match self.tools.iter().find(|t| t.name == tool_name) {
                Some(tool) => (tool.run)(input).await,
                None => format!(
                    "Unknown tool '{}'. Available tools: {}",
                    tool_name,
                    self.tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>().join(", ")
                ),
            };

            messages.push(ChatMessage::assistant(text));
            messages.push(ChatMessage::user(format!("Observation: {}", observation)));
        }

        Err(DossierError::agent(format!(
            "{}: reasoning loop exceeded {} steps",
            self.agent_name, self.max_steps
        )))
    }

    fn format_protocol(&self) -> String {
        let mut out = String::from("You have access to the following tools:\n");
        for tool in &self.tools {
            out.push_str(&format!("- {}: {}\n", tool.name, tool.description));
        }
        out.push_str(
            "\nUse this exact format:\n\
             Thought: what you are doing and why\n\
             Action: the tool name, exactly as listed\n\
             Action Input: the input for the tool\n\
             \n\
             The system will reply with an Observation. Repeat as needed.\n\
             When you are done, reply with:\n\
             Final Answer: a short summary of what you found\n",
        );
        out
    }
}

/// Extract the Final Answer if the response ends the loop.
///
/// An answer only counts when no Action precedes it; models sometimes
/// plan an action and speculate about the answer in the same breath.
fn parse_final_answer(text: &str) -> Option<String> {
    let final_pos = text.find("Final Answer:")?;
    if let Some(action_pos) = text.find("Action:") {
        if action_pos < final_pos {
            return None;
        }
    }
    Some(text[final_pos + "Final Answer:".len()..].trim().to_string())
}

/// Extract (tool name, input) from an Action block
fn parse_action(text: &str) -> Option<(String, String)> {
    let action_pos = text.find("Action:")?;
    let after_action = &text[action_pos + "Action:".len()..];
    let tool_name = after_action.lines().next()?.trim().to_string();
    if tool_name.is_empty() {
        return None;
    }

    let input = match after_action.find("Action Input:") {
        Some(pos) => {
            let raw = &after_action[pos + "Action Input:".len()..];
            // guard against the model hallucinating its own Observation
            let raw = raw.split("\nObservation:").next().unwrap_or(raw);
            strip_code_fence(raw.trim()).to_string()
        }
        None => String::new(),
    };

    Some((tool_name, input))
}

/// Remove a surrounding markdown code fence without touching inline
/// backticks (MySQL identifier quoting uses them)
fn strip_code_fence(raw: &str) -> &str {
    let Some(rest) = raw.strip_prefix("```") else {
        return raw;
    };
    let rest = rest.strip_prefix("sql").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::llm::LlmError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct CannedReasoner {
        responses: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Reasoner for CannedReasoner {
        async fn chat(&self, _messages: &[ChatMessage]) -> Result<String, LlmError> {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(LlmError::Api("script exhausted".into()));
            }
            Ok(responses.remove(0))
        }
    }

    fn echo_tool() -> Tool {
        Tool::new("echo", "echo the input back", |input: String| async move {
            format!("echoed {}", input)
        })
    }

    fn react(responses: Vec<&str>, max_steps: usize) -> ReactLoop {
        ReactLoop::new(
            "test-agent",
            Arc::new(CannedReasoner {
                responses: Mutex::new(responses.into_iter().map(String::from).collect()),
            }),
            vec![echo_tool()],
            max_steps,
            Arc::new(AtomicBool::new(false)),
        )
    }

    #[tokio::test]
    async fn runs_tool_then_finishes() {
        let agent = react(
            vec![
                "Thought: try the tool\nAction: echo\nAction Input: hello",
                "Final Answer: tool said hello",
            ],
            5,
        );
        let outcome = agent.run("You are a test agent.", "do the thing").await.unwrap();
        assert_eq!(outcome.final_answer, "tool said hello");
        assert_eq!(outcome.steps, 2);
    }

    #[tokio::test]
    async fn exceeding_bound_is_an_agent_error() {
        let looped = "Thought: again\nAction: echo\nAction Input: x";
        let agent = react(vec![looped, looped, looped], 3);
        let err = agent.run("sys", "task").await.unwrap_err();
        assert!(matches!(err, DossierError::Agent(_)));
        assert!(err.to_string().contains("exceeded 3 steps"));
    }

    #[tokio::test]
    async fn unknown_tool_becomes_observation() {
        let agent = react(
            vec!["Action: not_a_tool\nAction Input: x", "Final Answer: ok"],
            5,
        );
        let outcome = agent.run("sys", "task").await.unwrap();
        assert_eq!(outcome.final_answer, "ok");
    }

    #[tokio::test]
    async fn answer_after_action_does_not_end_loop() {
        assert!(parse_final_answer("Action: echo\nAction Input: x\nFinal Answer: guess").is_none());
        assert_eq!(parse_final_answer("Final Answer: done").as_deref(), Some("done"));
    }

    #[test]
    fn action_input_stops_at_hallucinated_observation() {
        let (name, input) =
            parse_action("Action: echo\nAction Input: SELECT 1\nObservation: fake").unwrap();
        assert_eq!(name, "echo");
        assert_eq!(input, "SELECT 1");
    }

    #[test]
    fn code_fences_stripped_but_identifier_backticks_kept() {
        let (_, fenced) =
            parse_action("Action: echo\nAction Input: ```sql\nSELECT 1\n```").unwrap();
        assert_eq!(fenced, "SELECT 1");

        let (_, quoted) = parse_action("Action: echo\nAction Input: DESCRIBE `singer`").unwrap();
        assert_eq!(quoted, "DESCRIBE `singer`");
    }

    #[tokio::test]
    async fn cancellation_aborts_the_loop() {
        let shutdown = Arc::new(AtomicBool::new(true));
        let agent = ReactLoop::new(
            "test-agent",
            Arc::new(CannedReasoner { responses: Mutex::new(vec!["Final Answer: x".into()]) }),
            vec![],
            5,
            shutdown,
        );
        let err = agent.run("sys", "task").await.unwrap_err();
        assert!(err.to_string().contains("cancelled"));
    }
}
