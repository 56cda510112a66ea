use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::auction::AuctionHouse;
use crate::llm_client::{ChatCompletion, Message};
use crate::memory::AnswerStore;

pub const SYSTEM_PROMPT: &str = "Ты — полезный ассистент. Ты отвечаешь только на русском языке.
Твои ответы должны быть короткими, точными и фактическими.
Запрещено использовать английские слова.";

pub const FALLBACK_ANSWER: &str = "🤡 Мой мозг перегрелся! Спроси по-другому!";

pub const LORD_APPEALS: [&str; 8] = [
    "Мой повелитель",
    "Ваше величество",
    "Мой господин",
    "Ваше сиятельство",
    "О великий",
    "Мой властелин",
    "Ваша светлость",
    "О мудрый правитель",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerSource {
    Memory,
    Llm,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub answer: String,
    pub lord_appeal: Option<&'static str>,
    pub source: AnswerSource,
}

/// Runs one chat turn: memory first, then the LLM, then the lord greeting.
pub struct Responder {
    answers: AnswerStore,
    auction: AuctionHouse,
    llm: Arc<dyn ChatCompletion>,
    rng: Mutex<StdRng>,
}

impl Responder {
    pub fn new(answers: AnswerStore, auction: AuctionHouse, llm: Arc<dyn ChatCompletion>) -> Self {
        Self::with_rng(answers, auction, llm, StdRng::from_entropy())
    }

    pub fn with_rng(
        answers: AnswerStore,
        auction: AuctionHouse,
        llm: Arc<dyn ChatCompletion>,
        rng: StdRng,
    ) -> Self {
        Self {
            answers,
            auction,
            llm,
            rng: Mutex::new(rng),
        }
    }

    /// Answer `message` for `user_id`. LLM failures degrade to
    /// [`FALLBACK_ANSWER`]; only storage failures are returned as errors.
    /// A completion that is empty after trimming counts as a failure: the
    /// fallback is returned and nothing is remembered.
    pub async fn respond(&self, user_id: i64, message: &str, now: DateTime<Utc>) -> Result<ChatReply> {
        let (answer, source) = match self.answers.lookup(user_id, message)? {
            Some(entry) => {
                tracing::debug!("Memory hit for user {} (entry {})", user_id, entry.id);
                (entry.answer, AnswerSource::Memory)
            }
            None => {
                tracing::debug!("Memory miss for user {}, asking LLM", user_id);
                self.ask_llm(user_id, message, now).await?
            }
        };

        let record = self.auction.read()?;
        if record.active_lord(now) == Some(user_id) {
            let appeal = self.pick_appeal();
            return Ok(ChatReply {
                answer: format!("{}! {}", appeal, answer),
                lord_appeal: Some(appeal),
                source,
            });
        }

        Ok(ChatReply {
            answer,
            lord_appeal: None,
            source,
        })
    }

    async fn ask_llm(
        &self,
        user_id: i64,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<(String, AnswerSource)> {
        let messages = vec![Message::system(SYSTEM_PROMPT), Message::user(message)];
        match self.llm.complete(messages).await {
            Ok(text) => {
                let answer = text.trim().to_string();
                if answer.is_empty() {
                    tracing::warn!("LLM returned an empty answer for user {}", user_id);
                    return Ok((FALLBACK_ANSWER.to_string(), AnswerSource::Fallback));
                }
                self.answers.record(user_id, message, &answer, now)?;
                Ok((answer, AnswerSource::Llm))
            }
            Err(error) => {
                tracing::warn!("LLM request failed for user {}: {:#}", user_id, error);
                Ok((FALLBACK_ANSWER.to_string(), AnswerSource::Fallback))
            }
        }
    }

    fn pick_appeal(&self) -> &'static str {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        LORD_APPEALS
            .choose(&mut *rng)
            .copied()
            .unwrap_or(LORD_APPEALS[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auction::AuctionRules;
    use crate::database::ShapiroDatabase;
    use crate::memory::DEFAULT_KEY_CHARS;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedLlm {
        reply: Option<String>,
        calls: AtomicUsize,
        last_messages: Mutex<Vec<Message>>,
    }

    impl ScriptedLlm {
        fn answering(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Some(text.to_string()),
                calls: AtomicUsize::new(0),
                last_messages: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: None,
                calls: AtomicUsize::new(0),
                last_messages: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChatCompletion for ScriptedLlm {
        async fn complete(&self, messages: Vec<Message>) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_messages.lock().unwrap() = messages;
            match &self.reply {
                Some(text) => Ok(text.clone()),
                None => anyhow::bail!("LLM API returned error 500 Internal Server Error: boom"),
            }
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        answers: AnswerStore,
        auction: AuctionHouse,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(ShapiroDatabase::new(dir.path().join("responder.db")).unwrap());
        Fixture {
            answers: AnswerStore::new(db.clone(), DEFAULT_KEY_CHARS),
            auction: AuctionHouse::new(db, AuctionRules::default()).unwrap(),
            _dir: dir,
        }
    }

    fn responder(fx: &Fixture, llm: Arc<ScriptedLlm>) -> Responder {
        Responder::with_rng(
            fx.answers.clone(),
            fx.auction.clone(),
            llm,
            StdRng::seed_from_u64(7),
        )
    }

    #[tokio::test]
    async fn miss_calls_llm_once_and_records_trimmed_answer() {
        let fx = fixture();
        let llm = ScriptedLlm::answering("  Париж.\n");
        let responder = responder(&fx, llm.clone());

        let reply = responder
            .respond(1, "Какая столица Франции?", Utc::now())
            .await
            .unwrap();
        assert_eq!(reply.answer, "Париж.");
        assert_eq!(reply.lord_appeal, None);
        assert_eq!(reply.source, AnswerSource::Llm);
        assert_eq!(llm.calls(), 1);
        assert_eq!(fx.answers.count_for_user(1).unwrap(), 1);

        let sent = llm.last_messages.lock().unwrap().clone();
        assert_eq!(sent[0], Message::system(SYSTEM_PROMPT));
        assert_eq!(sent[1], Message::user("Какая столица Франции?"));
    }

    #[tokio::test]
    async fn hit_skips_llm_and_recording() {
        let fx = fixture();
        fx.answers
            .record(1, "Какая столица Франции?", "Париж.", Utc::now())
            .unwrap();
        let llm = ScriptedLlm::answering("unused");
        let responder = responder(&fx, llm.clone());

        let reply = responder
            .respond(1, "Какая столица Франции? Ответь быстро", Utc::now())
            .await
            .unwrap();
        assert_eq!(reply.answer, "Париж.");
        assert_eq!(reply.source, AnswerSource::Memory);
        assert_eq!(llm.calls(), 0);
        assert_eq!(fx.answers.count_for_user(1).unwrap(), 1);
    }

    #[tokio::test]
    async fn memories_are_per_user() {
        let fx = fixture();
        fx.answers
            .record(1, "Какая столица Франции?", "Париж.", Utc::now())
            .unwrap();
        let llm = ScriptedLlm::answering("Париж!");
        let responder = responder(&fx, llm.clone());

        let reply = responder
            .respond(2, "Какая столица Франции?", Utc::now())
            .await
            .unwrap();
        assert_eq!(reply.answer, "Париж!");
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn llm_failure_returns_fallback_without_recording() {
        let fx = fixture();
        let llm = ScriptedLlm::failing();
        let responder = responder(&fx, llm.clone());

        let reply = responder.respond(3, "Что такое Rust?", Utc::now()).await.unwrap();
        assert_eq!(reply.answer, FALLBACK_ANSWER);
        assert_eq!(reply.source, AnswerSource::Fallback);
        assert_eq!(fx.answers.count_for_user(3).unwrap(), 0);

        // Nothing was remembered, so the next turn asks again.
        responder.respond(3, "Что такое Rust?", Utc::now()).await.unwrap();
        assert_eq!(llm.calls(), 2);
    }

    #[tokio::test]
    async fn blank_llm_answer_is_treated_as_failure() {
        let fx = fixture();
        let responder = responder(&fx, ScriptedLlm::answering("   "));

        let reply = responder.respond(3, "Тишина?", Utc::now()).await.unwrap();
        assert_eq!(reply.answer, FALLBACK_ANSWER);
        assert_eq!(fx.answers.count_for_user(3).unwrap(), 0);
    }

    #[tokio::test]
    async fn active_lord_gets_an_appeal_prefix() {
        let fx = fixture();
        let now = Utc::now();
        fx.auction.bid(7, "bob", now).unwrap();
        let responder = responder(&fx, ScriptedLlm::answering("Четыре."));

        let reply = responder.respond(7, "Два плюс два?", now).await.unwrap();
        let appeal = reply.lord_appeal.expect("lord is greeted");
        assert!(LORD_APPEALS.contains(&appeal));
        assert_eq!(reply.answer, format!("{}! Четыре.", appeal));
    }

    #[tokio::test]
    async fn other_users_and_expired_lords_get_no_appeal() {
        let fx = fixture();
        let now = Utc::now();
        fx.auction.bid(7, "bob", now).unwrap();
        let responder = responder(&fx, ScriptedLlm::answering("Четыре."));

        let reply = responder.respond(8, "Два плюс два?", now).await.unwrap();
        assert_eq!(reply.lord_appeal, None);
        assert_eq!(reply.answer, "Четыре.");

        let after_term = now + Duration::hours(24);
        let reply = responder.respond(7, "Два плюс два?", after_term).await.unwrap();
        assert_eq!(reply.lord_appeal, None);
        assert_eq!(reply.answer, "Четыре.");
    }

    #[tokio::test]
    async fn seeded_rng_makes_appeals_reproducible() {
        let fx = fixture();
        let now = Utc::now();
        fx.auction.bid(7, "bob", now).unwrap();

        let first = responder(&fx, ScriptedLlm::answering("Да."));
        let second = responder(&fx, ScriptedLlm::answering("Да."));
        for _ in 0..5 {
            let a = first.respond(7, "Ну что?", now).await.unwrap();
            let b = second.respond(7, "Ну что?", now).await.unwrap();
            assert_eq!(a.lord_appeal, b.lord_appeal);
        }
    }
}
