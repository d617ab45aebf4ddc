//! Human-readable progress notifications for a generation invocation.
//!
//! Purely advisory: nothing here feeds back into control flow.

use serde::Serialize;

/// Label prefixed to every polling message.
pub const POLLING_LABEL: &str = "Polling for results...";

pub const SUBMITTING_MESSAGE: &str = "Sending request to the AI model...";
pub const FETCHING_MESSAGE: &str = "Fetching generated video...";
pub const COMPLETE_MESSAGE: &str = "Video downloaded successfully.";

/// Filler phrases cycled through while the job is running.
pub const LOADING_MESSAGES: &[&str] = &[
    "Warming up the AI artists...",
    "Composing the visual symphony...",
    "Rendering the first frames...",
    "Assembling pixel by pixel...",
    "Choreographing the digital dance...",
    "This is taking a moment, but great art needs patience...",
    "The AI is deep in thought, crafting your masterpiece...",
    "Finalizing the color palette...",
    "Adding the finishing touches...",
];

/// Filler phrase for a zero-based poll attempt.
pub fn loading_message(attempt: u32) -> &'static str {
    LOADING_MESSAGES[attempt as usize % LOADING_MESSAGES.len()]
}

/// Full text shown during a poll attempt.
pub fn polling_message(attempt: u32) -> String {
    format!("{POLLING_LABEL} ({})", loading_message(attempt))
}

/// Lifecycle point a progress event was emitted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum ProgressStage {
    Submitting,
    Polling { attempt: u32 },
    Fetching,
    Complete,
}

impl ProgressStage {
    pub fn message(&self) -> String {
        match self {
            Self::Submitting => SUBMITTING_MESSAGE.to_string(),
            Self::Polling { attempt } => polling_message(*attempt),
            Self::Fetching => FETCHING_MESSAGE.to_string(),
            Self::Complete => COMPLETE_MESSAGE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    #[serde(flatten)]
    pub stage: ProgressStage,
    pub message: String,
}

impl From<ProgressStage> for ProgressEvent {
    fn from(stage: ProgressStage) -> Self {
        Self {
            message: stage.message(),
            stage,
        }
    }
}

/// Receiver of progress events.
///
/// Implemented for any `Fn(ProgressEvent)` closure, so callers can pass
/// `&|event| println!("{}", event.message)`.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn emit(&self, event: ProgressEvent) {
        self(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[test]
    fn at_least_eight_distinct_phrases() {
        let unique: HashSet<_> = LOADING_MESSAGES.iter().collect();
        assert!(LOADING_MESSAGES.len() >= 8);
        assert_eq!(unique.len(), LOADING_MESSAGES.len());
    }

    #[test]
    fn message_cycles_modulo_list_length() {
        let len = LOADING_MESSAGES.len() as u32;
        for k in 0..=50u32 {
            assert_eq!(loading_message(k), LOADING_MESSAGES[(k % len) as usize]);
            assert_eq!(
                polling_message(k),
                format!("Polling for results... ({})", LOADING_MESSAGES[(k % len) as usize])
            );
        }
    }

    #[test]
    fn event_from_stage_uses_stage_text() {
        let event = ProgressEvent::from(ProgressStage::Polling { attempt: 1 });
        assert_eq!(event.message, polling_message(1));
        assert_eq!(ProgressEvent::from(ProgressStage::Submitting).message, SUBMITTING_MESSAGE);
    }

    #[test]
    fn closure_is_a_sink() {
        let seen = Mutex::new(Vec::new());
        let sink = |event: ProgressEvent| seen.lock().unwrap().push(event.stage);
        sink.emit(ProgressStage::Fetching.into());
        sink.emit(ProgressStage::Complete.into());
        assert_eq!(
            *seen.lock().unwrap(),
            vec![ProgressStage::Fetching, ProgressStage::Complete]
        );
    }
}
