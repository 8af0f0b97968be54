use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{AudioResponseFormat, CreateTranscriptionRequestArgs};
use async_openai::Client;

use crate::error::TranscriptionError;
use crate::transcribe::{SpeechToText, TranscriptionRequest};

/// OpenAI audio transcription; the API key comes from `OPENAI_API_KEY`.
pub(crate) struct OpenAiWhisper {
    client: Client<OpenAIConfig>,
}

impl OpenAiWhisper {
    pub(crate) fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl SpeechToText for OpenAiWhisper {
    async fn transcribe(
        &self,
        request: &TranscriptionRequest<'_>,
    ) -> Result<String, TranscriptionError> {
        let request = CreateTranscriptionRequestArgs::default()
            .file(request.audio_path)
            .model(request.model)
            .prompt(request.prompt)
            .language(request.language)
            .response_format(AudioResponseFormat::Srt)
            .build()
            .map_err(service_error)?;

        let subtitles = self
            .client
            .audio()
            .transcribe_raw(request)
            .await
            .map_err(service_error)?;
        Ok(String::from_utf8_lossy(&subtitles).into_owned())
    }
}

fn service_error(error: OpenAIError) -> TranscriptionError {
    match error {
        OpenAIError::Reqwest(e) => TranscriptionError::ServiceUnavailable(e.to_string()),
        OpenAIError::ApiError(e) => TranscriptionError::ServiceError(e.message),
        e => TranscriptionError::ServiceError(e.to_string()),
    }
}
