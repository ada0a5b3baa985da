use crate::error::{Result, SimError};
use crate::world::Driver;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// A handoff point where the override channel is consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    /// Every tick while switching is allowed: should the controller's move carry
    /// a propose-switch request?
    Offer { driver: Driver },
    /// After arbitration: should control change hands?
    Resolve { driver: Driver },
}

impl Prompt {
    pub fn accepts(&self, token: &str) -> bool {
        match self {
            Prompt::Offer { .. } => matches!(token, "y" | "n"),
            Prompt::Resolve { .. } => matches!(token, "y" | "n" | "ycf" | "ncf"),
        }
    }
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let question = match self {
            Prompt::Offer { driver: Driver::Ai } => "Should the AI offer control to the human? (y/n)",
            Prompt::Offer { driver: Driver::Human } => "Should the AI ask to take control? (y/n)",
            Prompt::Resolve { driver: Driver::Ai } => "Should the human take over? (y/n/ycf/ncf)",
            Prompt::Resolve { driver: Driver::Human } => "Should the AI take over? (y/n/ycf/ncf)",
        };
        f.write_str(question)
    }
}

/// Answers override prompts. Implementations may read a script, a terminal or
/// anything else that produces tokens.
pub trait DecisionSource: Send + fmt::Debug {
    fn decide(&mut self, prompt: &Prompt) -> Result<String>;
    fn name(&self) -> &str;
}

/// Replays a fixed token sequence.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDecisions {
    tokens: VecDeque<String>,
}

impl ScriptedDecisions {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }
}

impl DecisionSource for ScriptedDecisions {
    fn decide(&mut self, prompt: &Prompt) -> Result<String> {
        self.tokens.pop_front().ok_or_else(|| SimError::ScriptExhausted {
            prompt: prompt.to_string(),
        })
    }

    fn name(&self) -> &str {
        "script"
    }
}

/// Forwards to another source and keeps a copy of every token it hands out.
#[derive(Debug)]
pub struct RecordingDecisions {
    inner: Box<dyn DecisionSource>,
    tape: Arc<Mutex<Vec<String>>>,
}

impl RecordingDecisions {
    pub fn new(inner: Box<dyn DecisionSource>) -> Self {
        Self {
            inner,
            tape: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Handle to the recorded tokens, readable after the episode consumed the source.
    pub fn tape(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.tape)
    }
}

impl DecisionSource for RecordingDecisions {
    fn decide(&mut self, prompt: &Prompt) -> Result<String> {
        let token = self.inner.decide(prompt)?;
        self.tape.lock().push(token.clone());
        Ok(token)
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Stored override responses of one episode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseScript {
    pub initial_driver: Option<Driver>,
    pub tokens: Vec<String>,
    pub label: Option<String>,
}

impl ResponseScript {
    /// Branch of a factual script: everything up to the first accepted offer, then a
    /// counterfactual resolution (`ycf` when `take_over`, `ncf` otherwise).
    /// `None` if control was never offered.
    pub fn counterfactual(&self, take_over: bool) -> Option<ResponseScript> {
        let offer = self.tokens.iter().position(|token| token == "y")?;
        let mut tokens = self.tokens[..=offer].to_vec();
        tokens.push(if take_over { "ycf" } else { "ncf" }.to_string());
        Some(ResponseScript {
            initial_driver: self.initial_driver,
            tokens,
            label: self.label.clone(),
        })
    }

    pub fn decisions(&self) -> ScriptedDecisions {
        ScriptedDecisions::new(self.tokens.iter().cloned())
    }
}
