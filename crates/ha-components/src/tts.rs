//! Text-to-speech platform

use std::collections::HashMap;

use async_trait::async_trait;
use ha_core::HomeAssistantError;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::entity::Entity;

/// A voice a TTS entity can speak with
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Voice {
    pub voice_id: String,
    pub name: String,
}

impl Voice {
    pub fn new(voice_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            voice_id: voice_id.into(),
            name: name.into(),
        }
    }
}

/// Synthesized audio: a format tag such as `wav` and the raw bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtsAudio {
    pub format: String,
    pub data: Vec<u8>,
}

/// Options passed through to a speech engine
pub type TtsOptions = HashMap<String, Value>;

#[async_trait]
pub trait TextToSpeechEntity: Entity {
    fn supported_languages(&self) -> Vec<String>;

    fn default_language(&self) -> String;

    fn supported_options(&self) -> Vec<String> {
        Vec::new()
    }

    /// Voices available for a language, `None` if the engine has no voice list
    fn supported_voices(&self, _language: &str) -> Option<Vec<Voice>> {
        None
    }

    async fn get_tts_audio(
        &self,
        message: &str,
        language: &str,
        options: &TtsOptions,
    ) -> Result<TtsAudio, HomeAssistantError>;
}

/// Synthesize `message`, resolving the language against what the entity
/// supports. `None` selects the entity's default language.
pub async fn get_tts_audio(
    entity: &dyn TextToSpeechEntity,
    message: &str,
    language: Option<&str>,
    options: &TtsOptions,
) -> Result<TtsAudio, HomeAssistantError> {
    let language = match language {
        Some(language) => language.to_string(),
        None => entity.default_language(),
    };
    if !entity.supported_languages().iter().any(|l| *l == language) {
        return Err(HomeAssistantError::new(format!(
            "Language '{}' not supported",
            language
        )));
    }

    let supported = entity.supported_options();
    if let Some(key) = options.keys().find(|k| !supported.contains(k)) {
        return Err(HomeAssistantError::new(format!(
            "Option '{}' not supported",
            key
        )));
    }

    debug!("Synthesizing {} chars in {}", message.len(), language);
    entity.get_tts_audio(message, &language, options).await
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl Entity for Echo {
        fn name(&self) -> Option<String> {
            Some("echo".to_string())
        }
    }

    #[async_trait]
    impl TextToSpeechEntity for Echo {
        fn supported_languages(&self) -> Vec<String> {
            vec!["en".to_string(), "de".to_string()]
        }

        fn default_language(&self) -> String {
            "en".to_string()
        }

        async fn get_tts_audio(
            &self,
            message: &str,
            language: &str,
            _options: &TtsOptions,
        ) -> Result<TtsAudio, HomeAssistantError> {
            Ok(TtsAudio {
                format: language.to_string(),
                data: message.as_bytes().to_vec(),
            })
        }
    }

    #[tokio::test]
    async fn test_default_language() {
        let audio = get_tts_audio(&Echo, "hi", None, &TtsOptions::new())
            .await
            .unwrap();
        assert_eq!(audio.format, "en");
        assert_eq!(audio.data, b"hi");
    }

    #[tokio::test]
    async fn test_explicit_language() {
        let audio = get_tts_audio(&Echo, "hallo", Some("de"), &TtsOptions::new())
            .await
            .unwrap();
        assert_eq!(audio.format, "de");
    }

    #[tokio::test]
    async fn test_unsupported_language() {
        let err = get_tts_audio(&Echo, "salut", Some("fr"), &TtsOptions::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("fr"));
    }

    #[tokio::test]
    async fn test_unsupported_option() {
        let options = TtsOptions::from([("speed".to_string(), Value::from(2))]);
        let err = get_tts_audio(&Echo, "hi", None, &options).await.unwrap_err();
        assert!(err.to_string().contains("speed"));
    }
}
