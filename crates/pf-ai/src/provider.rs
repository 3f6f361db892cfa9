use async_trait::async_trait;
use pf_core::AiProvider;
use pf_core::GameError;
use pf_core::GameResult;
use pf_core::Settings;
use std::time::Duration;

/// An LLM backend. The coordinator only ever sends a prompt and reads back
/// text; HTTP clients for the concrete providers live outside this crate
/// and are injected at composition time.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate_response(
        &self,
        prompt: &str,
        model: &str,
        timeout: Duration,
    ) -> GameResult<String>;
    fn name(&self) -> &str;
}

/// Which provider and model the configuration resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderChoice {
    pub provider: AiProvider,
    pub model: String,
}

/// Resolve the configured provider, falling back to whichever has an API
/// key when the configured one does not.
pub fn choose_provider(settings: &Settings) -> GameResult<ProviderChoice> {
    let openai_ready = !settings.openai_api_key.is_empty();
    let gemini_ready = !settings.gemini_api_key.is_empty();
    match settings.ai_provider {
        AiProvider::OpenAi if openai_ready => Ok(ProviderChoice {
            provider: AiProvider::OpenAi,
            model: settings.ai_openai_model.clone(),
        }),
        AiProvider::Gemini if gemini_ready => Ok(ProviderChoice {
            provider: AiProvider::Gemini,
            model: settings.ai_gemini_model.clone(),
        }),
        AiProvider::None => Err(GameError::ProviderUnavailable(
            "ai_provider set to none".to_string(),
        )),
        configured => {
            if openai_ready {
                log::warn!(
                    "configured provider {:?} unavailable, falling back to openai",
                    configured
                );
                Ok(ProviderChoice {
                    provider: AiProvider::OpenAi,
                    model: settings.ai_openai_model.clone(),
                })
            } else if gemini_ready {
                log::warn!(
                    "configured provider {:?} unavailable, falling back to gemini",
                    configured
                );
                Ok(ProviderChoice {
                    provider: AiProvider::Gemini,
                    model: settings.ai_gemini_model.clone(),
                })
            } else {
                Err(GameError::ProviderUnavailable(
                    "no provider API keys configured".to_string(),
                ))
            }
        }
    }
}

/// Placeholder for deployments without a provider client wired in. Every
/// call fails as `ProviderUnavailable`, which the orchestrators log and
/// leave for the next sweep; cached and corpus content still flows.
pub struct UnconfiguredProvider;

#[async_trait]
impl LlmProvider for UnconfiguredProvider {
    async fn generate_response(
        &self,
        _prompt: &str,
        _model: &str,
        _timeout: Duration,
    ) -> GameResult<String> {
        Err(GameError::ProviderUnavailable(
            "no LLM client configured".to_string(),
        ))
    }
    fn name(&self) -> &str {
        "unconfigured"
    }
}

/// Scripted provider for tests: pops canned responses in order.
pub struct ScriptedProvider {
    responses: tokio::sync::Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: tokio::sync::Mutex::new(responses),
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn generate_response(
        &self,
        _prompt: &str,
        _model: &str,
        _timeout: Duration,
    ) -> GameResult<String> {
        let mut responses = self.responses.lock().await;
        if responses.is_empty() {
            return Err(GameError::ProviderUnavailable("script exhausted".into()));
        }
        Ok(responses.remove(0))
    }
    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_provider_wins_when_keyed() {
        let mut settings = Settings::default();
        settings.ai_provider = AiProvider::Gemini;
        settings.gemini_api_key = "key".into();
        let choice = choose_provider(&settings).unwrap();
        assert_eq!(choice.provider, AiProvider::Gemini);
        assert_eq!(choice.model, settings.ai_gemini_model);
    }

    #[test]
    fn falls_back_to_available_key() {
        let mut settings = Settings::default();
        settings.ai_provider = AiProvider::Gemini;
        settings.openai_api_key = "key".into();
        let choice = choose_provider(&settings).unwrap();
        assert_eq!(choice.provider, AiProvider::OpenAi);
    }

    #[test]
    fn none_and_keyless_configs_fail() {
        let mut settings = Settings::default();
        settings.ai_provider = AiProvider::None;
        assert!(choose_provider(&settings).is_err());
        settings.ai_provider = AiProvider::OpenAi;
        assert!(choose_provider(&settings).is_err());
    }
}
