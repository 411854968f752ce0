use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub max_tokens: u64,
    #[serde(default)]
    pub speed: String,
    #[serde(default)]
    pub input_rate: String,
    #[serde(default)]
    pub output_rate: String,
    #[serde(default)]
    pub category: String,
}

impl ModelConfig {
    /// Audio models only transcribe; they cannot answer a chat turn.
    pub fn is_audio(&self) -> bool {
        self.category.eq_ignore_ascii_case("audio")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelsResponse {
    pub models: Vec<ModelConfig>,
}

pub fn sort_models(models: &mut [ModelConfig]) {
    // Group by category, then by id for a stable listing
    models.sort_by(|a, b| {
        a.category
            .to_lowercase()
            .cmp(&b.category.to_lowercase())
            .then_with(|| a.id.cmp(&b.id))
    });
}

pub fn filter_by_category<'a>(
    models: &'a [ModelConfig],
    category: Option<&str>,
) -> Vec<&'a ModelConfig> {
    models
        .iter()
        .filter(|model| match category {
            Some(category) => model.category.eq_ignore_ascii_case(category),
            None => true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(id: &str, category: &str) -> ModelConfig {
        ModelConfig {
            id: id.to_string(),
            name: id.to_uppercase(),
            max_tokens: 0,
            speed: "30".to_string(),
            input_rate: "1K".to_string(),
            output_rate: "6K".to_string(),
            category: category.to_string(),
        }
    }

    #[test]
    fn sort_groups_by_category_then_id() {
        let mut models = vec![
            model("qwen", "large"),
            model("whisper", "audio"),
            model("gemma", "fast"),
            model("deepseek", "large"),
        ];
        sort_models(&mut models);
        let ids: Vec<_> = models.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["whisper", "gemma", "deepseek", "qwen"]);
    }

    #[test]
    fn filter_is_case_insensitive() {
        let models = vec![model("a", "Audio"), model("b", "general")];
        let audio = filter_by_category(&models, Some("audio"));
        assert_eq!(audio.len(), 1);
        assert!(audio[0].is_audio());
        assert_eq!(filter_by_category(&models, None).len(), 2);
    }

    #[test]
    fn missing_optional_fields_default() {
        let parsed: ModelsResponse =
            serde_json::from_str(r#"{"models":[{"id":"x","name":"X"}]}"#).expect("parse");
        assert_eq!(parsed.models[0].max_tokens, 0);
        assert_eq!(parsed.models[0].category, "");
    }
}
