use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Text-to-speech output
///
/// `speak` is fire-and-forget. Callers check `is_speaking` first and never
/// start a second utterance over a running one.
pub trait VoiceOutput: Send {
    fn speak(&mut self, text: &str);

    fn is_speaking(&self) -> bool;
}

/// Prints utterances and stays busy for a duration estimated from their
/// word count
pub struct ConsoleVoice {
    words_per_second: f64,
    busy_until: Option<Instant>,
}

impl ConsoleVoice {
    pub fn new() -> Self {
        Self {
            words_per_second: 2.5,
            busy_until: None,
        }
    }

    fn estimate(&self, text: &str) -> Duration {
        let words = text.split_whitespace().count().max(1) as f64;
        Duration::from_secs_f64(words / self.words_per_second)
    }
}

impl Default for ConsoleVoice {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceOutput for ConsoleVoice {
    fn speak(&mut self, text: &str) {
        if self.is_speaking() {
            log::warn!("Speech already in progress, dropping: {}", text);
            return;
        }
        println!("[voice] {}", text);
        self.busy_until = Some(Instant::now() + self.estimate(text));
    }

    fn is_speaking(&self) -> bool {
        self.busy_until.map_or(false, |until| Instant::now() < until)
    }
}

/// Voice whose speaking flag is driven by the caller; records every
/// utterance
#[derive(Clone, Default)]
pub struct ScriptedVoice {
    inner: Arc<Mutex<ScriptedInner>>,
}

#[derive(Default)]
struct ScriptedInner {
    spoken: Vec<String>,
    speaking: bool,
}

impl ScriptedVoice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_speaking(&self, speaking: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.speaking = speaking;
        }
    }

    pub fn finish(&self) {
        self.set_speaking(false);
    }

    pub fn spoken(&self) -> Vec<String> {
        self.inner
            .lock()
            .map(|inner| inner.spoken.clone())
            .unwrap_or_default()
    }
}

impl VoiceOutput for ScriptedVoice {
    fn speak(&mut self, text: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.spoken.push(text.to_string());
        }
    }

    fn is_speaking(&self) -> bool {
        self.inner.lock().map(|inner| inner.speaking).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_scales_with_words() {
        let voice = ConsoleVoice::new();
        assert_eq!(voice.estimate("one two three four five"), Duration::from_secs(2));
        assert!(voice.estimate("") > Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_console_voice_busy_then_idle() {
        let mut voice = ConsoleVoice::new();
        assert!(!voice.is_speaking());
        voice.speak("You have covered ten kilometers.");
        assert!(voice.is_speaking());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!voice.is_speaking());
    }

    #[test]
    fn test_scripted_voice_speaking_flag() {
        let mut voice = ScriptedVoice::new();
        let observer = voice.clone();
        voice.speak("hello");
        assert!(!voice.is_speaking());

        observer.set_speaking(true);
        assert!(voice.is_speaking());
        voice.finish();
        assert!(!voice.is_speaking());
        assert_eq!(voice.spoken(), vec!["hello".to_string()]);
    }
}
