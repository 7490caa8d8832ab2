//! Speech capture and synthesis capabilities
//!
//! Both are external: the assistant only depends on these traits. The
//! in-process implementations here serve the HTTP surface (the browser does
//! the actual recognition and playback) and tests.

use crate::error::AssistantError;
use crate::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// One-shot utterance capture: one final transcript or an error, no retry.
#[async_trait]
pub trait SpeechCapture: Send + Sync {
    async fn capture(&self) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    pub name: String,
}

impl Voice {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    fn voices(&self) -> Vec<Voice>;

    /// Stop whatever is currently being spoken
    fn cancel(&self);

    /// Speak to completion. `None` means the platform default voice.
    async fn speak(&self, text: &str, voice: Option<&Voice>) -> Result<()>;
}

/// First voice whose name contains any preferred fragment, in voice order.
pub fn select_voice<'a>(voices: &'a [Voice], preferred: &[String]) -> Option<&'a Voice> {
    voices.iter().find(|voice| {
        preferred
            .iter()
            .any(|fragment| !fragment.is_empty() && voice.name.contains(fragment.as_str()))
    })
}

/// Speaks one utterance at a time with a best-effort voice preference
pub struct Speaker {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    preferred_voices: Vec<String>,
}

impl Speaker {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, preferred_voices: Vec<String>) -> Self {
        Self {
            synthesizer,
            preferred_voices,
        }
    }

    /// Cancel any in-flight utterance, then speak `text`. Returns whether speech completed;
    /// synthesis failure is logged and never fails the caller.
    pub async fn say(&self, text: &str) -> bool {
        self.synthesizer.cancel();

        let voices = self.synthesizer.voices();
        let voice = select_voice(&voices, &self.preferred_voices);
        debug!(voice = ?voice.map(|v| v.name.as_str()), "Speaking response");

        match self.synthesizer.speak(text, voice).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Speech synthesis failed");
                false
            }
        }
    }
}

/// Capture that yields a transcript recognised elsewhere (e.g. in the browser)
pub struct TranscriptCapture {
    transcript: Mutex<Option<String>>,
}

impl TranscriptCapture {
    pub fn new(transcript: impl Into<String>) -> Self {
        Self {
            transcript: Mutex::new(Some(transcript.into())),
        }
    }
}

#[async_trait]
impl SpeechCapture for TranscriptCapture {
    async fn capture(&self) -> Result<String> {
        let transcript = self
            .transcript
            .lock()
            .map_err(|_| AssistantError::CaptureError("capture lock poisoned".to_string()))?
            .take();

        match transcript {
            Some(text) if !text.trim().is_empty() => Ok(text.trim().to_string()),
            Some(_) => Err(AssistantError::CaptureError("no speech detected".to_string())),
            None => Err(AssistantError::CaptureError("transcript already consumed".to_string())),
        }
    }
}

/// Capture that always fails, e.g. when no microphone is available
pub struct UnavailableCapture;

#[async_trait]
impl SpeechCapture for UnavailableCapture {
    async fn capture(&self) -> Result<String> {
        Err(AssistantError::CaptureError(
            "speech recognition not supported".to_string(),
        ))
    }
}

#[derive(Debug, Default)]
struct Recording {
    spoken: Vec<(String, Option<String>)>,
    cancels: usize,
    speaking: bool,
}

/// Synthesizer that records utterances instead of playing them.
///
/// A recorded utterance stays audible until [`SpeechSynthesizer::cancel`]
/// is called, so speaking twice without cancelling in between fails.
#[derive(Default)]
pub struct RecordingSynthesizer {
    voices: Vec<Voice>,
    state: Mutex<Recording>,
}

impl RecordingSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_voices(voices: Vec<Voice>) -> Self {
        Self {
            voices,
            state: Mutex::default(),
        }
    }

    /// Texts spoken so far, in order
    pub fn spoken(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.spoken.iter().map(|(text, _)| text.clone()).collect())
            .unwrap_or_default()
    }

    /// Voice names used for each utterance (`None` = default voice)
    pub fn voices_used(&self) -> Vec<Option<String>> {
        self.state
            .lock()
            .map(|s| s.spoken.iter().map(|(_, voice)| voice.clone()).collect())
            .unwrap_or_default()
    }

    /// Whether an utterance is still audible
    pub fn is_speaking(&self) -> bool {
        self.state.lock().map(|s| s.speaking).unwrap_or_default()
    }

    pub fn cancel_count(&self) -> usize {
        self.state.lock().map(|s| s.cancels).unwrap_or_default()
    }
}

#[async_trait]
impl SpeechSynthesizer for RecordingSynthesizer {
    fn voices(&self) -> Vec<Voice> {
        self.voices.clone()
    }

    fn cancel(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.cancels += 1;
            state.speaking = false;
        }
    }

    async fn speak(&self, text: &str, voice: Option<&Voice>) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| AssistantError::SynthesisError("synthesizer lock poisoned".to_string()))?;

        if state.speaking {
            return Err(AssistantError::SynthesisError(
                "utterance started while another is audible".to_string(),
            ));
        }

        state.speaking = true;
        state
            .spoken
            .push((text.to_string(), voice.map(|v| v.name.clone())));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preferred() -> Vec<String> {
        vec!["Google".to_string(), "Female".to_string()]
    }

    #[test]
    fn test_select_voice_first_match_in_voice_order() {
        let voices = vec![
            Voice::new("Alex"),
            Voice::new("Samantha Female"),
            Voice::new("Google UK English"),
        ];
        assert_eq!(
            select_voice(&voices, &preferred()).unwrap().name,
            "Samantha Female"
        );
    }

    #[test]
    fn test_select_voice_no_match() {
        let voices = vec![Voice::new("Alex"), Voice::new("Daniel")];
        assert!(select_voice(&voices, &preferred()).is_none());
        assert!(select_voice(&[], &preferred()).is_none());
        assert!(select_voice(&voices, &[String::new()]).is_none());
    }

    #[tokio::test]
    async fn test_speaker_cancels_before_speaking() {
        let synth = Arc::new(RecordingSynthesizer::with_voices(vec![
            Voice::new("Alex"),
            Voice::new("Google US English"),
        ]));
        let speaker = Speaker::new(synth.clone(), preferred());

        assert!(speaker.say("first").await);
        assert!(speaker.say("second").await);

        assert_eq!(synth.spoken(), vec!["first", "second"]);
        assert_eq!(synth.cancel_count(), 2);
        assert_eq!(
            synth.voices_used(),
            vec![
                Some("Google US English".to_string()),
                Some("Google US English".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_overlapping_utterances_are_rejected() {
        let synth = RecordingSynthesizer::new();

        synth.speak("first", None).await.unwrap();
        assert!(synth.is_speaking());
        assert!(matches!(
            synth.speak("second", None).await,
            Err(AssistantError::SynthesisError(_))
        ));

        synth.cancel();
        assert!(!synth.is_speaking());
        synth.speak("third", None).await.unwrap();
        assert_eq!(synth.spoken(), vec!["first", "third"]);
    }

    #[tokio::test]
    async fn test_speaker_never_overlaps_utterances() {
        let synth = Arc::new(RecordingSynthesizer::new());
        let speaker = Speaker::new(synth.clone(), preferred());

        for text in ["one", "two", "three"] {
            assert!(speaker.say(text).await);
        }

        assert_eq!(synth.spoken(), vec!["one", "two", "three"]);
        assert!(synth.is_speaking());
    }

    #[tokio::test]
    async fn test_speaker_without_matching_voice_uses_default() {
        let synth = Arc::new(RecordingSynthesizer::with_voices(vec![Voice::new("Alex")]));
        let speaker = Speaker::new(synth.clone(), preferred());

        assert!(speaker.say("hello").await);
        assert_eq!(synth.voices_used(), vec![None]);
    }

    #[tokio::test]
    async fn test_transcript_capture_is_single_shot() {
        let capture = TranscriptCapture::new("  I spent 45 on lunch ");
        assert_eq!(capture.capture().await.unwrap(), "I spent 45 on lunch");
        assert!(matches!(
            capture.capture().await,
            Err(AssistantError::CaptureError(_))
        ));

        let silent = TranscriptCapture::new("   ");
        assert!(silent.capture().await.is_err());
        assert!(UnavailableCapture.capture().await.is_err());
    }
}
