use log::info;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Prompt template '{template}' is missing placeholder '{placeholder}'")]
    MissingPlaceholder {
        template: &'static str,
        placeholder: &'static str,
    },
    #[error("Prompt file IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Prompt JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
}

const DEFAULT_IDENTITY: &str = "IMPORTANT IDENTITY:
- You are \"{business_name}'s {assistant_name}\"
- Never mention the company that built the underlying model, or any AI provider
- Present yourself as {business_name}'s proprietary technology
- If asked about your model, say \"I'm {business_name}'s {assistant_name}\"";

const DEFAULT_DOCUMENT_INSTRUCTION: &str = "You are {business_name}'s {assistant_name} and you answer questions based on a reference document.

{identity}

DOCUMENT CONTEXT:
Title: {title}
Pages: {pages}
Word Count: {words}

FULL DOCUMENT CONTENT:
{document}

INSTRUCTIONS:
1. Answer questions based ONLY on the information provided in the document above
2. If the document doesn't contain information to answer a question, clearly state that
3. Provide specific references to relevant sections when possible
4. Be conversational and helpful while staying accurate to the document content

COMMUNICATION STYLE:
- Professional but approachable
- Always cite page numbers when referencing the document
- Acknowledge limitations honestly";

const DEFAULT_BUSINESS_INSTRUCTION: &str = "You are {business_name}'s {assistant_name}, a business intelligence assistant for an event bidding platform that matches corporate events with hotel bids.

{identity}

BUSINESS OVERVIEW:
{overview}

RELEVANT DATA:
{excerpt}

INSTRUCTIONS:
1. Answer using ONLY the business data above
2. Quote concrete figures (costs, dates, counts) when they are available
3. If the data doesn't cover a question, say so and suggest what to ask instead
4. Keep answers concise and decision-oriented";

const DEFAULT_BID_ANALYSIS: &str = "Analyze this hotel bid data and provide competitive insights:

Hotel: {hotel_name}
Total Cost: ${total_cost}
Room Rate: ${room_rate}/night
Meeting Space: ${meeting_space_cost}
Hotel Rating: {hotel_rating}/5
Success Rate: {success_rate}%

Provide:
1. Competitive positioning
2. Value assessment
3. Key strengths/weaknesses
4. Recommendation (Accept/Negotiate/Reject)";

fn default_identity() -> String {
    DEFAULT_IDENTITY.to_string()
}

fn default_document_instruction() -> String {
    DEFAULT_DOCUMENT_INSTRUCTION.to_string()
}

fn default_business_instruction() -> String {
    DEFAULT_BUSINESS_INSTRUCTION.to_string()
}

fn default_bid_analysis() -> String {
    DEFAULT_BID_ANALYSIS.to_string()
}

/// Instruction templates. Any key left out of a JSON override keeps its built-in text.
#[derive(Deserialize, Debug, Clone)]
pub struct PromptConfig {
    #[serde(default = "default_identity")]
    pub identity: String,
    #[serde(default = "default_document_instruction")]
    pub document_instruction: String,
    #[serde(default = "default_business_instruction")]
    pub business_instruction: String,
    #[serde(default = "default_bid_analysis")]
    pub bid_analysis: String,
    #[serde(skip)]
    pub assistant_name: String,
    #[serde(skip)]
    pub business_name: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            identity: default_identity(),
            document_instruction: default_document_instruction(),
            business_instruction: default_business_instruction(),
            bid_analysis: default_bid_analysis(),
            assistant_name: "AI Assistant".to_string(),
            business_name: "Our company".to_string(),
        }
    }
}

impl PromptConfig {
    pub fn with_names(mut self, assistant_name: &str, business_name: &str) -> Self {
        self.assistant_name = assistant_name.to_string();
        self.business_name = business_name.to_string();
        self
    }

    fn validate(&self) -> Result<(), PromptError> {
        let required: [(&'static str, &str, &'static str); 3] = [
            ("document_instruction", &self.document_instruction, "{document}"),
            ("business_instruction", &self.business_instruction, "{overview}"),
            ("business_instruction", &self.business_instruction, "{excerpt}"),
        ];
        for (template, text, placeholder) in required {
            if !text.contains(placeholder) {
                return Err(PromptError::MissingPlaceholder { template, placeholder });
            }
        }
        Ok(())
    }

    pub fn identity_directive(&self) -> String {
        render(&self.identity, &[
            ("assistant_name", self.assistant_name.as_str()),
            ("business_name", self.business_name.as_str()),
        ])
    }

    pub fn document_prompt(&self, title: &str, pages: usize, words: usize, document: &str) -> String {
        let identity = self.identity_directive();
        render(&self.document_instruction, &[
            ("assistant_name", self.assistant_name.as_str()),
            ("business_name", self.business_name.as_str()),
            ("identity", identity.as_str()),
            ("title", title),
            ("pages", pages.to_string().as_str()),
            ("words", words.to_string().as_str()),
            ("document", document),
        ])
    }

    pub fn business_prompt(&self, overview: &str, excerpt: &str) -> String {
        let identity = self.identity_directive();
        render(&self.business_instruction, &[
            ("assistant_name", self.assistant_name.as_str()),
            ("business_name", self.business_name.as_str()),
            ("identity", identity.as_str()),
            ("overview", overview),
            ("excerpt", excerpt),
        ])
    }

    pub fn bid_analysis_prompt(&self, values: &[(&str, &str)]) -> String {
        render(&self.bid_analysis, values)
    }
}

/// Replaces each `{key}` with its value, in order. Later keys are also
/// replaced inside earlier values, so untrusted text goes last.
pub fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in values {
        out = out.replace(&format!("{{{}}}", key), value);
    }
    out
}

pub fn load_prompts(path: Option<&str>) -> Result<PromptConfig, PromptError> {
    let config = match path.filter(|p| !p.trim().is_empty()) {
        Some(path) if Path::new(path).exists() => {
            let file_content = fs::read_to_string(path)?;
            let config: PromptConfig = serde_json::from_str(&file_content)?;
            info!("Loaded prompt templates from {}", path);
            config
        }
        Some(path) => {
            info!("Prompts file {} not found, using built-in templates", path);
            PromptConfig::default()
        }
        None => PromptConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn identity_names_the_business_not_the_provider() {
        let config = PromptConfig::default().with_names("AI Assistant", "MCW Digital");
        let identity = config.identity_directive();
        assert!(identity.contains("MCW Digital's AI Assistant"));
        assert!(!identity.contains("{business_name}"));
    }

    #[test]
    fn document_prompt_embeds_stats_and_text() {
        let config = PromptConfig::default();
        let prompt = config.document_prompt("Guide", 12, 3400, "--- Page 1 ---\nhello");
        assert!(prompt.contains("Title: Guide"));
        assert!(prompt.contains("Pages: 12"));
        assert!(prompt.contains("--- Page 1 ---\nhello"));
        assert!(prompt.contains("IMPORTANT IDENTITY"));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = load_prompts(Some("/definitely/not/here.json")).unwrap();
        assert_eq!(config.bid_analysis, DEFAULT_BID_ANALYSIS);
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"bid_analysis": "Rate {{hotel_name}} please"}}"#).unwrap();
        let config = load_prompts(file.path().to_str()).unwrap();
        assert_eq!(config.bid_analysis, "Rate {hotel_name} please");
        assert_eq!(config.document_instruction, DEFAULT_DOCUMENT_INSTRUCTION);
        assert_eq!(
            config.bid_analysis_prompt(&[("hotel_name", "Hilton Austin")]),
            "Rate Hilton Austin please"
        );
    }

    #[test]
    fn override_without_grounding_placeholder_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"document_instruction": "no grounding here"}}"#).unwrap();
        let err = load_prompts(file.path().to_str()).unwrap_err();
        assert!(matches!(err, PromptError::MissingPlaceholder { placeholder: "{document}", .. }));
    }
}
