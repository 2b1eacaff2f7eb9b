//! Transition table for the interaction state machine
//!
//! Pure function from (state, input) to the next state plus the side effects
//! the executor must perform. Inputs that do not apply to the current state
//! yield `None` and are ignored.

use crate::gesture::Gesture;
use crate::speech::{Language, Utterance};

use super::machine::State;

/// Inputs the table reacts to
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// Bootstrap command from the user or the system
    Start,
    /// Recognizer heard something; `wake` tells whether it had the wake word
    Heard { transcript: String, wake: bool },
    /// Idle timer elapsed without a wake word
    IdleElapsed,
    /// Backend answered
    Replied(Utterance),
    /// Backend call failed
    BackendFailed,
    /// Current utterance finished (or was given up on)
    SpeechEnded,
    /// Post-speech pause is over
    Resume,
    /// Recognizer stopped on its own
    RecognitionLost,
    /// Recognizer restart backoff is over
    RestartDue,
}

/// Side effects requested by a transition, performed in order
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Remove the start overlay from the avatar
    HideOverlay,
    /// Re-resolve the preferred voice
    RefreshVoices,
    StartRecognition,
    StopRecognition,
    /// (Re)start the idle countdown
    ArmIdleTimer,
    DisarmIdleTimer,
    /// Switch the avatar video
    ShowGesture(Gesture),
    /// Send the transcript to the backend
    Dispatch(String),
    /// Remember the conversation language
    AdoptLanguage(Language),
    /// Say the utterance
    Speak(Utterance),
    /// Pick an idle filler in the current language and speak it
    SpeakFiller,
    /// Resume listening after the post-speech pause
    ScheduleResume,
    /// Restart recognition after the backoff
    ScheduleRestart,
}

/// Outcome of one table lookup
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// State to enter (may equal the current one)
    pub next: State,
    /// Effects in execution order
    pub effects: Vec<Effect>,
}

/// Compute the transition for `input` in `state`.
///
/// Entering any state other than Listening always disarms the idle timer.
pub fn transition(state: State, input: &Input) -> Option<Transition> {
    let (next, mut effects) = match (state, input) {
        (State::Idle, Input::Start) => (
            State::Listening,
            vec![
                Effect::HideOverlay,
                Effect::RefreshVoices,
                Effect::StartRecognition,
                Effect::ArmIdleTimer,
            ],
        ),

        (State::Listening, Input::Heard { wake: false, .. }) => {
            (State::Listening, vec![Effect::ArmIdleTimer])
        }

        (State::Listening, Input::Heard { transcript, wake: true }) => (
            State::Thinking,
            vec![
                Effect::StopRecognition,
                Effect::ShowGesture(Gesture::processing()),
                Effect::Dispatch(transcript.clone()),
            ],
        ),

        (State::Listening, Input::IdleElapsed) => {
            (State::Speaking, vec![Effect::StopRecognition, Effect::SpeakFiller])
        }

        (State::Listening, Input::RecognitionLost) => {
            (State::Listening, vec![Effect::ScheduleRestart])
        }

        (State::Listening, Input::RestartDue) => (State::Listening, vec![Effect::StartRecognition]),

        (State::Listening, Input::Resume) => (
            State::Listening,
            vec![Effect::StartRecognition, Effect::ArmIdleTimer],
        ),

        (State::Thinking, Input::Replied(utterance)) => (
            State::Speaking,
            vec![
                Effect::AdoptLanguage(utterance.language),
                Effect::ShowGesture(utterance.gesture.clone()),
                Effect::Speak(utterance.clone()),
            ],
        ),

        (State::Thinking, Input::BackendFailed) => (
            State::Listening,
            vec![Effect::StartRecognition, Effect::ArmIdleTimer],
        ),

        (State::Speaking, Input::SpeechEnded) => (State::Listening, vec![Effect::ScheduleResume]),

        _ => return None,
    };

    if next != State::Listening {
        effects.insert(0, Effect::DisarmIdleTimer);
    }

    Some(Transition { next, effects })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heard(text: &str, wake: bool) -> Input {
        Input::Heard {
            transcript: text.to_string(),
            wake,
        }
    }

    #[test]
    fn test_start_from_idle() {
        let t = transition(State::Idle, &Input::Start).unwrap();
        assert_eq!(t.next, State::Listening);
        assert!(t.effects.contains(&Effect::StartRecognition));
        assert!(t.effects.contains(&Effect::ArmIdleTimer));
    }

    #[test]
    fn test_start_ignored_when_running() {
        assert!(transition(State::Listening, &Input::Start).is_none());
        assert!(transition(State::Speaking, &Input::Start).is_none());
    }

    #[test]
    fn test_non_wake_speech_rearms_idle() {
        let t = transition(State::Listening, &heard("hola", false)).unwrap();
        assert_eq!(t.next, State::Listening);
        assert_eq!(t.effects, vec![Effect::ArmIdleTimer]);
    }

    #[test]
    fn test_wake_word_goes_to_thinking() {
        let t = transition(State::Listening, &heard("hola dinner", true)).unwrap();
        assert_eq!(t.next, State::Thinking);
        assert_eq!(
            t.effects,
            vec![
                Effect::DisarmIdleTimer,
                Effect::StopRecognition,
                Effect::ShowGesture(Gesture::processing()),
                Effect::Dispatch("hola dinner".to_string()),
            ]
        );
    }

    #[test]
    fn test_speech_ignored_outside_listening() {
        for state in [State::Idle, State::Thinking, State::Speaking] {
            assert!(transition(state, &heard("dinner", true)).is_none());
            assert!(transition(state, &heard("hola", false)).is_none());
        }
    }

    #[test]
    fn test_idle_only_fires_from_listening() {
        let t = transition(State::Listening, &Input::IdleElapsed).unwrap();
        assert_eq!(t.next, State::Speaking);
        assert!(t.effects.contains(&Effect::SpeakFiller));

        for state in [State::Idle, State::Thinking, State::Speaking] {
            assert!(transition(state, &Input::IdleElapsed).is_none());
        }
    }

    #[test]
    fn test_backend_outcomes() {
        let utterance = Utterance::new("¡Pizza en camino!", Language::Es, Gesture::new("feliz"));
        let t = transition(State::Thinking, &Input::Replied(utterance.clone())).unwrap();
        assert_eq!(t.next, State::Speaking);
        assert_eq!(t.effects.last(), Some(&Effect::Speak(utterance)));

        let t = transition(State::Thinking, &Input::BackendFailed).unwrap();
        assert_eq!(t.next, State::Listening);
        assert!(!t.effects.contains(&Effect::DisarmIdleTimer));
    }

    #[test]
    fn test_speaking_ends_only_via_completion() {
        let t = transition(State::Speaking, &Input::SpeechEnded).unwrap();
        assert_eq!(t.next, State::Listening);
        assert_eq!(t.effects, vec![Effect::ScheduleResume]);

        assert!(transition(State::Listening, &Input::SpeechEnded).is_none());
        assert!(transition(State::Speaking, &Input::Resume).is_none());
    }

    #[test]
    fn test_every_exit_from_listening_disarms_idle() {
        let inputs = [
            Input::Start,
            heard("hola", false),
            heard("dinner", true),
            Input::IdleElapsed,
            Input::Replied(Utterance::new("hola", Language::Es, Gesture::neutral())),
            Input::BackendFailed,
            Input::SpeechEnded,
            Input::Resume,
            Input::RecognitionLost,
            Input::RestartDue,
        ];

        for state in [State::Idle, State::Listening, State::Thinking, State::Speaking] {
            for input in &inputs {
                if let Some(t) = transition(state, input) {
                    if t.next != State::Listening {
                        assert_eq!(t.effects.first(), Some(&Effect::DisarmIdleTimer));
                    }
                }
            }
        }
    }
}
