//! RemoteTTS text-to-speech entity

use std::sync::Arc;

use async_trait::async_trait;
use ha_config_entries::ConfigEntry;
use ha_core::HomeAssistantError;
use tracing::{debug, warn};

use super::api::RemoteTtsApi;
use super::consts::{DOMAIN, MANUFACTURER};
use super::RemoteTtsData;
use crate::entity::{DeviceEntryType, DeviceInfo, Entity};
use crate::tts::{TextToSpeechEntity, TtsAudio, TtsOptions, Voice};

pub const ATTR_VOICE: &str = "voice";

pub struct RemoteTtsEntity {
    entry_id: String,
    client: Option<Arc<dyn RemoteTtsApi>>,
    name: String,
    language: String,
    voices: Vec<Voice>,
}

impl RemoteTtsEntity {
    pub fn new(entry: &ConfigEntry, data: &RemoteTtsData) -> Self {
        Self {
            entry_id: entry.entry_id.clone(),
            client: data.client.clone(),
            name: data.name.clone(),
            language: data.language.clone(),
            voices: vec![Voice::new(data.name.clone(), data.name.clone())],
        }
    }
}

impl Entity for RemoteTtsEntity {
    fn name(&self) -> Option<String> {
        Some(self.name.clone())
    }

    fn unique_id(&self) -> Option<String> {
        Some(self.entry_id.clone())
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        Some(DeviceInfo {
            identifiers: vec![(DOMAIN.to_string(), self.entry_id.clone())],
            name: None,
            manufacturer: Some(MANUFACTURER.to_string()),
            model: Some(self.name.clone()),
            entry_type: Some(DeviceEntryType::Service),
        })
    }

    fn as_tts(&self) -> Option<&dyn TextToSpeechEntity> {
        Some(self)
    }
}

#[async_trait]
impl TextToSpeechEntity for RemoteTtsEntity {
    fn supported_languages(&self) -> Vec<String> {
        vec![self.language.clone()]
    }

    fn default_language(&self) -> String {
        self.language.clone()
    }

    fn supported_options(&self) -> Vec<String> {
        vec![ATTR_VOICE.to_string()]
    }

    /// The single configured voice, whatever the language
    fn supported_voices(&self, _language: &str) -> Option<Vec<Voice>> {
        Some(self.voices.clone())
    }

    async fn get_tts_audio(
        &self,
        message: &str,
        _language: &str,
        options: &TtsOptions,
    ) -> Result<TtsAudio, HomeAssistantError> {
        let Some(client) = &self.client else {
            warn!("The remote-tts client is not running");
            return Err(HomeAssistantError::new("The remote-tts client is not running"));
        };
        debug!("Getting TTS audio for {}", message);
        debug!("Options: {:?}", options);

        match client.synthesize(message).await {
            Ok((format, data)) => Ok(TtsAudio { format, data }),
            Err(err) => {
                warn!("Error during processing of TTS request {}", err);
                Err(HomeAssistantError::new(err.to_string()))
            }
        }
    }
}
