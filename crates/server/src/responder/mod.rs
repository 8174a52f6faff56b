//! Responder for the AI contact
//!
//! Picks a skill for each incoming message:
//! - weather questions go to the weather skill (geocoding + forecast API)
//! - everything else goes to the generative-AI skill
//!
//! Nothing in here returns an error. Every upstream failure becomes a
//! short apology so the bot always says something.

pub mod ai;
pub mod gemini;
pub mod openweather;
pub mod weather;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::json;
use tracing::info;

pub use ai::{AiCallError, AiSkill, ContentPart, GenerativeAi, ImageFetcher};
pub use gemini::{GeminiClient, HttpImageFetcher};
pub use openweather::OpenWeatherClient;
pub use weather::{WeatherApi, WeatherError, WeatherSkill};

static WEATHER_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:weathers?|temperatures?|forecast(?:s|ed|ing)?|rain(?:s|y|ed|ing|fall)?|humid(?:ity)?|wind(?:s|y|ier)?|sunrise|sunset|hot(?:ter|test)?|cold(?:er|est)?|degrees?)\b|\bfeels\s+like\b|°\s*[cf]",
    )
    .expect("weather keyword regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillKind {
    Weather,
    Ai,
}

/// Route on the message text alone
pub fn classify(text: &str) -> SkillKind {
    if WEATHER_KEYWORDS.is_match(text) {
        SkillKind::Weather
    } else {
        SkillKind::Ai
    }
}

/// What the user sent, with media already hosted
#[derive(Debug, Clone, Default)]
pub struct Prompt {
    pub text: Option<String>,
    pub image_url: Option<String>,
    pub audio_url: Option<String>,
}

impl Prompt {
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    pub skill: SkillKind,
    /// True when `text` is an apology or help text rather than an answer
    pub degraded: bool,
}

impl Reply {
    pub fn answer(text: impl Into<String>, skill: SkillKind) -> Self {
        Self {
            text: text.into(),
            skill,
            degraded: false,
        }
    }

    pub fn fallback(text: impl Into<String>, skill: SkillKind) -> Self {
        Self {
            text: text.into(),
            skill,
            degraded: true,
        }
    }

    /// Annotations stored on the AI's message
    pub fn metadata(&self) -> serde_json::Value {
        json!({ "skill": self.skill, "degraded": self.degraded })
    }
}

pub struct Responder {
    weather: WeatherSkill,
    ai: AiSkill,
}

impl Responder {
    pub fn new(weather: WeatherSkill, ai: AiSkill) -> Self {
        Self { weather, ai }
    }

    pub async fn respond(&self, prompt: &Prompt) -> Reply {
        let skill = classify(prompt.text());
        info!("[Chatty AI] Routing to {:?} skill", skill);
        match skill {
            SkillKind::Weather => self.weather.answer(prompt.text()).await,
            SkillKind::Ai => self.ai.answer(prompt).await,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::responder::ai::tests::{NoImages, ScriptedAi};
    use crate::responder::weather::tests::FakeWeather;
    use std::sync::Arc;
    use std::time::Duration;

    pub(crate) fn responder(weather: Arc<FakeWeather>, ai: Arc<ScriptedAi>) -> Responder {
        Responder::new(
            WeatherSkill::new(weather),
            AiSkill::new(
                Some(ai as Arc<dyn GenerativeAi>),
                Arc::new(NoImages),
                Duration::from_millis(1),
            ),
        )
    }

    #[test]
    fn weather_keywords_route_to_weather() {
        for text in [
            "weather in kolkata",
            "Is it HOT in Delhi?",
            "will it rain tomorrow",
            "what's the temperature",
            "it feels like 30 degrees",
            "sunset time in Oslo",
            "25°C outside",
            "how windy... wind speed at the coast",
            "Is it raining in London?",
            "will it be windy in Oslo",
            "rainy day in Paris?",
            "temperatures in Delhi",
            "any forecasts for Rome",
            "colder than yesterday?",
        ] {
            assert_eq!(classify(text), SkillKind::Weather, "{text}");
        }
    }

    #[test]
    fn other_text_routes_to_ai() {
        for text in [
            "hello there",
            "send me a photo",
            "brainstorm names",
            "",
            "shot of espresso",
            "book a hotel",
            "open the window",
            "a rainbow emoji",
        ] {
            assert_eq!(classify(text), SkillKind::Ai, "{text}");
        }
    }

    #[tokio::test]
    async fn weather_text_never_reaches_ai() {
        let weather = Arc::new(FakeWeather::with_city("Kolkata", "IN"));
        let ai = Arc::new(ScriptedAi::always_ok("should not be used"));
        let responder = responder(weather.clone(), ai.clone());

        let reply = responder
            .respond(&Prompt {
                text: Some("weather in kolkata".into()),
                ..Default::default()
            })
            .await;

        assert_eq!(reply.skill, SkillKind::Weather);
        assert!(reply.text.contains("Kolkata"));
        assert_eq!(ai.calls(), 0);
        assert_eq!(weather.calls(), 2);
    }

    #[tokio::test]
    async fn plain_text_goes_to_ai() {
        let weather = Arc::new(FakeWeather::with_city("Kolkata", "IN"));
        let ai = Arc::new(ScriptedAi::always_ok("  Hi! How can I help?  "));
        let responder = responder(weather.clone(), ai.clone());

        let reply = responder
            .respond(&Prompt {
                text: Some("hello".into()),
                ..Default::default()
            })
            .await;

        assert_eq!(reply, Reply::answer("Hi! How can I help?", SkillKind::Ai));
        assert_eq!(weather.calls(), 0);
        assert_eq!(ai.calls(), 1);
    }

    #[test]
    fn metadata_names_the_skill() {
        let reply = Reply::fallback("sorry", SkillKind::Weather);
        assert_eq!(
            reply.metadata(),
            serde_json::json!({"skill": "weather", "degraded": true})
        );
    }
}
