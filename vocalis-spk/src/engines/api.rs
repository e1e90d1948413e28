//! HTTP API TTS engines
//! Supports OpenAI, Google Cloud, ElevenLabs, Naver Clova and generic HTTP endpoints

use crate::catalog::ProviderKind;
use crate::config::RetryConfig;
use crate::credentials::Credential;
use crate::engines::{sanitize_text, truncate_body, EngineOutput, EngineRequest, TtsEngine};
use crate::error::SpeechError;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};
use vocalis_core::AudioFormat;

const MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024;

/// Remote TTS engine speaking one vendor's HTTP protocol
pub struct ApiTtsEngine {
    kind: ProviderKind,
    name: String,
    client: Client,
    endpoint: String,
    credential: Option<Credential>,
    model: Option<String>,
    retry_config: RetryConfig,
}

impl ApiTtsEngine {
    /// Create an engine for an HTTP provider kind.
    /// `endpoint` overrides the vendor default; it is required for `CustomHttp`.
    pub fn new(
        kind: ProviderKind,
        name: impl Into<String>,
        endpoint: Option<String>,
        credential: Option<Credential>,
        model: Option<String>,
        timeout: Duration,
        retry_config: RetryConfig,
    ) -> Result<Self, SpeechError> {
        let endpoint = match (endpoint, default_endpoint(kind)) {
            (Some(url), _) => url,
            (None, Some(default)) => default.to_string(),
            (None, None) => {
                return Err(SpeechError::Config(format!(
                    "Provider kind {:?} requires an explicit endpoint",
                    kind
                )))
            }
        };

        let parsed = url::Url::parse(&endpoint)
            .map_err(|e| SpeechError::Config(format!("Invalid endpoint URL: {}", e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SpeechError::Config(format!(
                "Unsupported URL scheme: {}. Only http:// and https:// are allowed.",
                parsed.scheme()
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SpeechError::Engine(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            kind,
            name: name.into(),
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            credential,
            model,
            retry_config,
        })
    }

    fn api_key(&self) -> Result<&str, SpeechError> {
        self.credential
            .as_ref()
            .map(|c| c.api_key.as_str())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| SpeechError::Unavailable(format!("{} credentials not provided", self.name)))
    }

    /// Synthesize using the OpenAI speech API
    async fn synthesize_openai(&self, request: &EngineRequest) -> Result<EngineOutput, SpeechError> {
        let api_key = self.api_key()?;
        let model = self.model.as_deref().unwrap_or("tts-1");

        let body = json!({
            "model": model,
            "input": request.text,
            "voice": request.voice,
            "response_format": "mp3",
            "speed": request.prosody.speed.clamp(0.25, 4.0),
        });

        let url = format!("{}/v1/audio/speech", self.endpoint);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| SpeechError::Engine(format!("OpenAI request failed: {}", e)))?;

        let audio = read_audio_body(response).await?;
        Ok(EngineOutput::new(audio, AudioFormat::Mp3))
    }

    /// Synthesize using Google Cloud Text-to-Speech (LINEAR16, returned as WAV)
    async fn synthesize_google_cloud(&self, request: &EngineRequest) -> Result<EngineOutput, SpeechError> {
        let api_key = self.api_key()?;

        let body = json!({
            "input": { "text": request.text },
            "voice": {
                "languageCode": request.language,
                "name": request.voice,
            },
            "audioConfig": {
                "audioEncoding": "LINEAR16",
                "speakingRate": request.prosody.speed.clamp(0.25, 4.0),
                "pitch": (request.prosody.pitch * 20.0).clamp(-20.0, 20.0),
                "volumeGainDb": volume_gain_db(request.prosody.volume),
            }
        });

        let url = format!("{}/v1/text:synthesize", self.endpoint);
        let response = self
            .client
            .post(&url)
            .query(&[("key", api_key)])
            .json(&body)
            .send()
            .await
            .map_err(|e| SpeechError::Engine(format!("Google Cloud request failed: {}", e)))?;

        let raw = read_audio_body(response).await?;
        let json: serde_json::Value = serde_json::from_slice(&raw)
            .map_err(|e| SpeechError::Malformed(format!("Google Cloud response is not JSON: {}", e)))?;
        let content = json
            .get("audioContent")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SpeechError::Malformed("Missing audioContent in Google Cloud response".to_string()))?;

        let audio = decode_base64_audio(content)?;
        Ok(EngineOutput::new(audio, AudioFormat::Wav))
    }

    /// Synthesize using ElevenLabs
    async fn synthesize_elevenlabs(&self, request: &EngineRequest) -> Result<EngineOutput, SpeechError> {
        let api_key = self.api_key()?;
        let model = self.model.as_deref().unwrap_or("eleven_multilingual_v2");

        let body = json!({
            "text": request.text,
            "model_id": model,
            "voice_settings": {
                "stability": 0.5,
                "similarity_boost": 0.75,
            }
        });

        let url = format!("{}/v1/text-to-speech/{}", self.endpoint, request.voice);
        let response = self
            .client
            .post(&url)
            .header("xi-api-key", api_key)
            .header("Accept", "audio/mpeg")
            .json(&body)
            .send()
            .await
            .map_err(|e| SpeechError::Engine(format!("ElevenLabs request failed: {}", e)))?;

        let audio = read_audio_body(response).await?;
        Ok(EngineOutput::new(audio, AudioFormat::Mp3))
    }

    /// Synthesize using Naver Clova Voice (form-encoded)
    async fn synthesize_naver_clova(&self, request: &EngineRequest) -> Result<EngineOutput, SpeechError> {
        let client_id = self.api_key()?;
        let client_secret = self
            .credential
            .as_ref()
            .and_then(|c| c.secret.as_deref())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SpeechError::Unavailable("Naver Clova client secret not provided".to_string()))?;

        let (speed, pitch, volume) = clova_prosody(&request.prosody);
        let form = [
            ("speaker", request.voice.clone()),
            ("text", request.text.clone()),
            ("speed", speed.to_string()),
            ("pitch", pitch.to_string()),
            ("volume", volume.to_string()),
            ("format", "mp3".to_string()),
        ];

        let url = format!("{}/tts-premium/v1/tts", self.endpoint);
        let response = self
            .client
            .post(&url)
            .header("X-NCP-APIGW-API-KEY-ID", client_id)
            .header("X-NCP-APIGW-API-KEY", client_secret)
            .form(&form)
            .send()
            .await
            .map_err(|e| SpeechError::Engine(format!("Naver Clova request failed: {}", e)))?;

        let audio = read_audio_body(response).await?;
        Ok(EngineOutput::new(audio, AudioFormat::Mp3))
    }

    /// Synthesize using a generic JSON endpoint.
    /// Accepts raw audio or a JSON body carrying base64 audio.
    async fn synthesize_custom(&self, request: &EngineRequest) -> Result<EngineOutput, SpeechError> {
        let mut body = json!({
            "text": request.text,
            "language": request.language,
            "voice": request.voice,
            "speed": request.prosody.speed,
            "pitch": request.prosody.pitch,
            "volume": request.prosody.volume,
        });
        if let Some(ref model) = self.model {
            body["model"] = json!(model);
        }

        let mut builder = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = self.credential.as_ref().map(|c| c.api_key.as_str()).filter(|k| !k.is_empty()) {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| SpeechError::Engine(format!("Custom TTS request failed: {}", e)))?;

        let raw = read_audio_body(response).await?;

        if raw.len() > 2 && raw[0] == b'{' {
            let json: serde_json::Value = serde_json::from_slice(&raw)
                .map_err(|e| SpeechError::Malformed(format!("Invalid JSON response: {}", e)))?;
            let content = json
                .get("audio")
                .or_else(|| json.get("data"))
                .or_else(|| json.get("audioContent"))
                .and_then(|v| v.as_str())
                .ok_or_else(|| SpeechError::Malformed("JSON response carries no audio field".to_string()))?;
            let audio = decode_base64_audio(content)?;
            let format = json
                .get("format")
                .and_then(|v| v.as_str())
                .and_then(AudioFormat::from_extension)
                .or_else(|| AudioFormat::sniff(&audio));
            let duration = json.get("duration").and_then(|v| v.as_f64()).filter(|d| *d > 0.0);
            return Ok(EngineOutput { audio, format, duration });
        }

        let format = AudioFormat::sniff(&raw);
        Ok(EngineOutput {
            audio: raw,
            format,
            duration: None,
        })
    }

    /// Retry wrapper for API calls
    async fn retry_request<F, Fut>(&self, f: F) -> Result<EngineOutput, SpeechError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<EngineOutput, SpeechError>>,
    {
        let mut delay = self.retry_config.initial_delay_ms;
        let mut attempt = 0;

        loop {
            match f().await {
                Ok(result) => return Ok(result),
                Err(e) if attempt < self.retry_config.max_retries && is_retryable(&e) => {
                    attempt += 1;
                    debug!(
                        "{} request failed ({}), retrying in {}ms (attempt {}/{})",
                        self.name, e, delay, attempt, self.retry_config.max_retries
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    delay = delay
                        .checked_mul(2)
                        .map(|d| d.min(self.retry_config.max_delay_ms))
                        .unwrap_or(self.retry_config.max_delay_ms);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn list_voices_remote(&self, url: String, header: (&str, String), field: &str, key: &str) -> Vec<String> {
        let response = match self.client.get(&url).header(header.0, header.1).send().await {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                warn!("{} voice listing returned {}", self.name, resp.status());
                return Vec::new();
            }
            Err(e) => {
                warn!("{} voice listing failed: {}", self.name, e);
                return Vec::new();
            }
        };

        match response.json::<serde_json::Value>().await {
            Ok(json) => json
                .get(field)
                .and_then(|v| v.as_array())
                .map(|voices| {
                    voices
                        .iter()
                        .filter_map(|v| v.get(key).and_then(|n| n.as_str()))
                        .map(|n| n.rsplit('/').next().unwrap_or(n).to_string())
                        .filter(|n| n.len() <= 256)
                        .take(1000)
                        .collect()
                })
                .unwrap_or_default(),
            Err(e) => {
                warn!("{} voice listing is not valid JSON: {}", self.name, e);
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl TtsEngine for ApiTtsEngine {
    async fn synthesize(&self, request: &EngineRequest) -> Result<EngineOutput, SpeechError> {
        let text = sanitize_text(&request.text, 100_000);
        if text.trim().is_empty() {
            return Err(SpeechError::Engine("Text cannot be empty".to_string()));
        }
        let sanitized = EngineRequest {
            text,
            ..request.clone()
        };
        let request = &sanitized;

        self.retry_request(|| async move {
            match self.kind {
                ProviderKind::OpenAi => self.synthesize_openai(request).await,
                ProviderKind::GoogleCloud => self.synthesize_google_cloud(request).await,
                ProviderKind::ElevenLabs => self.synthesize_elevenlabs(request).await,
                ProviderKind::NaverClova => self.synthesize_naver_clova(request).await,
                ProviderKind::CustomHttp => self.synthesize_custom(request).await,
                ProviderKind::Espeak => Err(SpeechError::Config(
                    "espeak is a local engine, not an API engine".to_string(),
                )),
            }
        })
        .await
    }

    async fn list_voices(&self, language: &str) -> Result<Vec<String>, SpeechError> {
        match self.kind {
            ProviderKind::OpenAi => Ok(["alloy", "echo", "fable", "onyx", "nova", "shimmer"]
                .iter()
                .map(|v| v.to_string())
                .collect()),
            ProviderKind::GoogleCloud => {
                let api_key = self.api_key()?.to_string();
                let url = format!("{}/v1/voices?languageCode={}", self.endpoint, language);
                Ok(self
                    .list_voices_remote(url, ("X-Goog-Api-Key", api_key), "voices", "name")
                    .await)
            }
            ProviderKind::ElevenLabs => {
                let api_key = self.api_key()?.to_string();
                let url = format!("{}/v1/voices", self.endpoint);
                Ok(self
                    .list_voices_remote(url, ("xi-api-key", api_key), "voices", "voice_id")
                    .await)
            }
            // Clova and generic endpoints have no listing API; voices come from the catalog
            _ => Ok(Vec::new()),
        }
    }

    fn is_available(&self) -> bool {
        let has_key = self
            .credential
            .as_ref()
            .map(|c| !c.api_key.is_empty())
            .unwrap_or(false);
        match self.kind {
            ProviderKind::NaverClova => {
                has_key
                    && self
                        .credential
                        .as_ref()
                        .and_then(|c| c.secret.as_ref())
                        .map(|s| !s.is_empty())
                        .unwrap_or(false)
            }
            ProviderKind::CustomHttp => !self.endpoint.is_empty(),
            ProviderKind::Espeak => false,
            _ => has_key,
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn default_endpoint(kind: ProviderKind) -> Option<&'static str> {
    match kind {
        ProviderKind::OpenAi => Some("https://api.openai.com"),
        ProviderKind::GoogleCloud => Some("https://texttospeech.googleapis.com"),
        ProviderKind::ElevenLabs => Some("https://api.elevenlabs.io"),
        ProviderKind::NaverClova => Some("https://naveropenapi.apigw.ntruss.com"),
        ProviderKind::CustomHttp | ProviderKind::Espeak => None,
    }
}

/// Check status, enforce the size cap and read the body
async fn read_audio_body(response: reqwest::Response) -> Result<Bytes, SpeechError> {
    let status = response.status();
    if !status.is_success() {
        let message = response
            .text()
            .await
            .map(truncate_body)
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(SpeechError::Api {
            status: status.as_u16(),
            message,
        });
    }

    if let Some(length) = response.content_length() {
        if length > MAX_RESPONSE_SIZE as u64 {
            return Err(SpeechError::Malformed(format!(
                "Response too large ({} bytes, max {} bytes)",
                length, MAX_RESPONSE_SIZE
            )));
        }
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| SpeechError::Engine(format!("Failed to read audio response: {}", e)))?;

    if bytes.len() > MAX_RESPONSE_SIZE {
        return Err(SpeechError::Malformed(format!(
            "Response too large ({} bytes, max {} bytes)",
            bytes.len(),
            MAX_RESPONSE_SIZE
        )));
    }
    if bytes.is_empty() {
        return Err(SpeechError::Malformed("Empty audio response".to_string()));
    }
    Ok(bytes)
}

fn decode_base64_audio(content: &str) -> Result<Bytes, SpeechError> {
    if content.len() > MAX_RESPONSE_SIZE * 4 / 3 + 4 {
        return Err(SpeechError::Malformed("Base64 audio string too long".to_string()));
    }
    let decoded = general_purpose::STANDARD
        .decode(content)
        .map_err(|e| SpeechError::Malformed(format!("Failed to decode base64 audio: {}", e)))?;
    if decoded.is_empty() {
        return Err(SpeechError::Malformed("Decoded audio is empty".to_string()));
    }
    Ok(Bytes::from(decoded))
}

/// Transport failures and throttling/server errors are worth retrying; auth and
/// malformed payloads are not.
fn is_retryable(err: &SpeechError) -> bool {
    match err {
        SpeechError::Api { status, .. } => *status == 429 || *status >= 500,
        SpeechError::Engine(_) => true,
        _ => false,
    }
}

/// Map linear volume (0.0-1.0) to Google's volumeGainDb range (-96..16)
fn volume_gain_db(volume: f32) -> f32 {
    if volume <= 0.0 {
        -96.0
    } else {
        (20.0 * volume.log10()).clamp(-96.0, 16.0)
    }
}

/// Map prosody to Clova's -5..5 integer scales (negative speed is faster,
/// negative pitch is higher)
fn clova_prosody(prosody: &vocalis_core::Prosody) -> (i32, i32, i32) {
    let speed = ((1.0 - prosody.speed) * 5.0).round().clamp(-5.0, 5.0) as i32;
    let pitch = (-prosody.pitch * 5.0).round().clamp(-5.0, 5.0) as i32;
    let volume = ((prosody.volume - 1.0) * 5.0).round().clamp(-5.0, 5.0) as i32;
    (speed, pitch, volume)
}
