//! Language model access and prompt construction.
//!
//! The transport is an OpenAI-compatible chat completions endpoint (Groq in
//! production) behind the [`ChatModel`] trait so tests can script replies.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::config::AiConfig;
use crate::helpers::smart_truncate;
use crate::lang::Lang;
use crate::services::search::SearchResult;

/// A model that turns a system + user prompt into one reply.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> anyhow::Result<String>;
}

pub struct GroqModel {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl GroqModel {
    pub fn new(config: &AiConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("reqwest client");
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

#[async_trait]
impl ChatModel for GroqModel {
    async fn complete(&self, system: &str, user: &str) -> anyhow::Result<String> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });

        let url = format!("{}/chat/completions", self.base_url);
        info!(model = %self.model, "Calling LLM API");

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            error!(status = %status, "LLM API error: {}", text);
            anyhow::bail!("LLM API returned {}", status);
        }

        let data: Value = serde_json::from_str(&text)?;
        let content = data["choices"]
            .get(0)
            .and_then(|c| c["message"]["content"].as_str())
            .ok_or_else(|| anyhow::anyhow!("no content in LLM response"))?;
        debug!(chars = content.len(), "LLM reply received");
        Ok(content.trim().to_string())
    }
}

/// Prompt building plus length discipline on top of a [`ChatModel`].
#[derive(Clone)]
pub struct AiService {
    model: Arc<dyn ChatModel>,
    persona: String,
    response_chars: usize,
}

impl AiService {
    pub fn new(model: Arc<dyn ChatModel>, persona: String, response_chars: usize) -> Self {
        Self {
            model,
            persona,
            response_chars,
        }
    }

    fn base_system(&self, lang: Lang) -> String {
        format!(
            "{}\nResponde en un solo párrafo corto, sin saltos de línea, apto para el chat de Twitch.\n{}",
            self.persona,
            lang.reply_instruction()
        )
    }

    /// Plain conversational reply, optionally flavored with what we know
    /// about the speaker.
    pub async fn answer(
        &self,
        question: &str,
        speaker: &str,
        role_note: Option<&str>,
        recent_topics: Option<&str>,
        lang: Lang,
    ) -> anyhow::Result<String> {
        let mut system = self.base_system(lang);
        if let Some(note) = role_note {
            system.push_str(&format!("\nSobre quien pregunta: {}", note));
        }
        if let Some(topics) = recent_topics {
            system.push_str(&format!("\nTemas recientes de este usuario: {}", topics));
        }

        let user = format!("{} pregunta: {}", speaker, question);
        let reply = self.model.complete(&system, &user).await?;
        Ok(smart_truncate(&reply, self.response_chars))
    }

    /// Reply grounded in web results. The model is told to stick to them and
    /// to cite the source domain.
    pub async fn answer_with_search(
        &self,
        question: &str,
        results: &[SearchResult],
        lang: Lang,
    ) -> anyhow::Result<String> {
        let mut system = self.base_system(lang);
        system.push_str(
            "\nResponde usando SOLO los resultados de búsqueda siguientes y menciona la fuente (dominio) de donde sale el dato.",
        );

        let mut user = format!("Pregunta: {}\n\nResultados:\n", question);
        for (i, r) in results.iter().enumerate() {
            user.push_str(&format!(
                "{}. {} ({})\n   {}\n",
                i + 1,
                r.title,
                r.domain().unwrap_or_else(|| "fuente".to_string()),
                r.description
            ));
        }

        let reply = self.model.complete(&system, &user).await?;
        Ok(smart_truncate(&reply, self.response_chars))
    }

    /// One short stream summary from the session digest.
    pub async fn summarize(&self, digest: &str) -> anyhow::Result<String> {
        let system = format!(
            "{}\nEres el cronista del directo. Resume lo ocurrido en 2 o 3 frases con gracia, en español.",
            self.persona
        );
        let reply = self.model.complete(&system, digest).await?;
        Ok(smart_truncate(&reply, self.response_chars))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Scripted model: records prompts, plays back canned replies.
    pub struct MockModel {
        pub replies: Mutex<Vec<String>>,
        pub prompts: Mutex<Vec<(String, String)>>,
    }

    impl MockModel {
        pub fn replying(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().rev().map(|s| s.to_string()).collect()),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatModel for MockModel {
        async fn complete(&self, system: &str, user: &str) -> anyhow::Result<String> {
            self.prompts
                .lock()
                .unwrap()
                .push((system.to_string(), user.to_string()));
            self.replies
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| anyhow::anyhow!("no scripted reply left"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::MockModel;
    use super::*;

    fn service(model: Arc<MockModel>) -> AiService {
        AiService::new(model, "Eres Manolito, el bot del canal.".to_string(), 400)
    }

    #[tokio::test]
    async fn answer_carries_persona_and_speaker_context() {
        let model = MockModel::replying(&["pues la vida son dos días"]);
        let svc = service(Arc::clone(&model));

        let reply = svc
            .answer(
                "qué es la vida",
                "ana",
                Some("ana es VIP del canal"),
                Some("el clima; los gatos"),
                Lang::Es,
            )
            .await
            .unwrap();

        assert_eq!(reply, "pues la vida son dos días");
        let prompts = model.prompts.lock().unwrap();
        let (system, user) = &prompts[0];
        assert!(system.contains("Manolito"));
        assert!(system.contains("VIP del canal"));
        assert!(system.contains("los gatos"));
        assert!(user.contains("ana pregunta: qué es la vida"));
    }

    #[tokio::test]
    async fn search_answer_numbers_results_with_domains() {
        let model = MockModel::replying(&["según example.com, mañana llueve"]);
        let svc = service(Arc::clone(&model));
        let results = vec![SearchResult {
            title: "El tiempo".to_string(),
            url: "https://www.example.com/tiempo".to_string(),
            description: "Predicción para mañana".to_string(),
        }];

        svc.answer_with_search("va a llover?", &results, Lang::Es)
            .await
            .unwrap();

        let prompts = model.prompts.lock().unwrap();
        let (system, user) = &prompts[0];
        assert!(system.contains("SOLO los resultados"));
        assert!(user.contains("1. El tiempo (example.com)"));
    }

    #[tokio::test]
    async fn long_replies_are_truncated_for_chat() {
        let long = "palabra ".repeat(200);
        let model = MockModel::replying(&[long.as_str()]);
        let svc = service(model);

        let reply = svc.answer("hola", "ana", None, None, Lang::Es).await.unwrap();
        assert!(reply.chars().count() <= 400);
    }

    #[tokio::test]
    async fn model_errors_propagate() {
        let model = MockModel::replying(&[]);
        let svc = service(model);
        assert!(svc.answer("hola", "ana", None, None, Lang::Es).await.is_err());
    }
}
