use std::sync::Arc;
use tracing::{debug, info};

use crate::course::Difficulty;
use crate::error::PipelineError;
use crate::llm::{CredentialRotator, GenerativeModel};

/// Asks the generative model for an ordered topic list
pub struct TopicGenerator {
    model: Arc<dyn GenerativeModel>,
    rotator: CredentialRotator,
}

impl TopicGenerator {
    pub fn new(model: Arc<dyn GenerativeModel>, rotator: CredentialRotator) -> Self {
        Self { model, rotator }
    }

    /// Validate the raw difficulty string, then generate.
    ///
    /// An unrecognized level fails before any model call.
    pub async fn generate(&self, subject: &str, difficulty: &str) -> Result<Vec<String>, PipelineError> {
        let difficulty: Difficulty = difficulty.parse()?;
        self.generate_for(subject, difficulty).await
    }

    /// Generate topics, ordered foundational to advanced.
    ///
    /// Exhausted rotation surfaces as a stage error.
    pub async fn generate_for(&self, subject: &str, difficulty: Difficulty) -> Result<Vec<String>, PipelineError> {
        let prompt = build_topic_prompt(subject, difficulty);
        let model = &self.model;
        let prompt = prompt.as_str();

        info!("📚 Generating up to {} {} topics for '{}'", difficulty.max_topics(), difficulty, subject);

        let rotated = self
            .rotator
            .attempt("topic generation", move |credential| async move {
                model.generate(prompt, &credential).await
            })
            .await
            .map_err(|source| PipelineError::Stage {
                stage: "topic generation",
                source,
            })?;

        let topics = parse_topic_lines(&rotated.value.content);
        debug!("Parsed {} topic lines after {} attempt(s)", topics.len(), rotated.attempts);

        Ok(topics)
    }
}

/// Prompt asking for a bare numbered list
pub fn build_topic_prompt(subject: &str, difficulty: Difficulty) -> String {
    let level = difficulty.as_str();
    format!(
        "You are an expert curriculum designer. Generate a comprehensive list of topics for learning {subject} at the {level} level.\n\
         \n\
         Instructions:\n\
         - Provide ONLY a numbered list of topics\n\
         - Each topic should be specific and actionable\n\
         - Topics should be ordered from foundational to more complex within the {level} level\n\
         - For {level} level, ensure topics are appropriate for someone at this skill level\n\
         - Do not include any explanations, introductions, or additional text\n\
         - Each line should contain only: \"1. Topic Name\" format\n\
         - Keep number of topics under {max}\n\
         \n\
         Subject: {subject}\n\
         Difficulty Level: {level}\n\
         \n\
         Topics:",
        subject = subject,
        level = level,
        max = difficulty.max_topics(),
    )
}

/// Keep lines starting with a digit and take the text after the first '.'
pub fn parse_topic_lines(response: &str) -> Vec<String> {
    response
        .lines()
        .map(str::trim)
        .filter(|line| line.chars().next().is_some_and(|c| c.is_ascii_digit()))
        .map(|line| match line.split_once('.') {
            Some((_, rest)) => rest.trim(),
            None => line,
        })
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}
