//! Speech-to-text endpoint

use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::{
    client::{ApiClient, decode},
    error::{Error, Result},
    types::Envelope,
};

#[derive(Debug, Deserialize)]
struct Transcript {
    text: String,
}

/// Guess a MIME type from the file extension; the backend accepts webm by default.
pub fn audio_mime_type(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "wav" => "audio/wav",
        "mp3" => "audio/mpeg",
        "ogg" | "oga" => "audio/ogg",
        "m4a" | "mp4" => "audio/mp4",
        "flac" => "audio/flac",
        _ => "audio/webm",
    }
}

impl ApiClient {
    /// Upload recorded audio and return the transcribed text.
    pub async fn transcribe(
        &self,
        audio: Vec<u8>,
        file_name: &str,
        language: Option<&str>,
    ) -> Result<String> {
        if audio.is_empty() {
            return Err(Error::InvalidConfig("audio payload is empty".to_string()));
        }

        let part = Part::bytes(audio)
            .file_name(file_name.to_string())
            .mime_str(audio_mime_type(file_name))?;
        let mut form = Form::new().part("audioFile", part);
        if let Some(language) = language {
            form = form.text("language", language.to_string());
        }

        let request = self.authorized_post("/ai/speech-to-text").await?.multipart(form);
        tracing::debug!("POST /ai/speech-to-text ({})", file_name);
        let response = request.send().await?;
        let envelope: Envelope<Transcript> = decode("/ai/speech-to-text", response).await?;
        Ok(envelope.into_result("transcribe audio")?.text)
    }
}
