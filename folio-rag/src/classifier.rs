//! Keyword classification of generated answers.
//!
//! Rules are tried in table order and the first match wins, so overlapping
//! keywords (`azure` appears in two rules) resolve to the earlier category.

use std::fmt;

use regex::{RegexSet, RegexSetBuilder};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::{RagError, Result};

/// Topic of an answer, used to pick its display marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    DotNet,
    WebApi,
    Azure,
    ArtificialIntelligence,
    Achievement,
    Education,
    Experience,
    Skills,
    Cloud,
    /// The model said the portfolio does not cover the question.
    Fallback,
    /// No rule matched.
    General,
}

impl Category {
    /// Emoji marker printed in front of the answer.
    pub fn marker(&self) -> &'static str {
        match self {
            Category::DotNet => "🚀💪",
            Category::WebApi => "🛠️📦",
            Category::Azure => "🐍💻",
            Category::ArtificialIntelligence => "🤖🧠",
            Category::Achievement => "🏆🔥",
            Category::Education => "🎓📚",
            Category::Experience => "💼🛠️",
            Category::Skills => "🧰⚙️",
            Category::Cloud => "☁️🖥️",
            Category::Fallback => "😅🤷‍♂️",
            Category::General => "💬",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::DotNet => ".NET",
            Category::WebApi => "Web API",
            Category::Azure => "Azure",
            Category::ArtificialIntelligence => "AI",
            Category::Achievement => "achievement",
            Category::Education => "education",
            Category::Experience => "experience",
            Category::Skills => "skills",
            Category::Cloud => "cloud",
            Category::Fallback => "fallback",
            Category::General => "general",
        };
        f.write_str(name)
    }
}

/// A keyword pattern and the category it selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// Case-insensitive regular expression.
    pub pattern: String,
    /// Category assigned on match.
    pub category: Category,
}

impl Rule {
    /// Create a rule.
    pub fn new(pattern: impl Into<String>, category: Category) -> Self {
        Self { pattern: pattern.into(), category }
    }
}

/// The built-in rule table, highest priority first.
pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule::new(r"\.net\b", Category::DotNet),
        Rule::new(r"\basp\.net web api\b", Category::WebApi),
        Rule::new(r"\bazure", Category::Azure),
        // Short tokens stay whole-word so "detail" and "email" do not match.
        Rule::new(r"\b(ai|cnn|machine learning|ml)\b", Category::ArtificialIntelligence),
        Rule::new(r"\b(achievement|project)\w*", Category::Achievement),
        Rule::new(r"\b(educat|bachelor|school|college|institut)\w*", Category::Education),
        Rule::new(r"\b(experience\w*|worked at|compan(y|ies)|jobs?\b)", Category::Experience),
        Rule::new(r"\b(skill|technolog)\w*|\btools?\b", Category::Skills),
        Rule::new(r"\b(cloud\w*|azure|servers?\b)", Category::Cloud),
        Rule::new(
            r"not in the context|isn't in the portfolio|not in the portfolio",
            Category::Fallback,
        ),
    ]
}

/// Maps answer text to a [`Category`] using an ordered rule table.
#[derive(Debug, Clone)]
pub struct ResponseClassifier {
    set: RegexSet,
    categories: Vec<Category>,
}

impl Default for ResponseClassifier {
    fn default() -> Self {
        Self::with_default_rules()
    }
}

impl ResponseClassifier {
    /// Compile a classifier from `rules`, highest priority first.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a pattern is not a valid regex.
    pub fn new(rules: Vec<Rule>) -> Result<Self> {
        let set = RegexSetBuilder::new(rules.iter().map(|r| r.pattern.as_str()))
            .case_insensitive(true)
            .build()
            .map_err(|e| RagError::ConfigError(format!("invalid classifier rule: {e}")))?;
        Ok(Self { set, categories: rules.into_iter().map(|r| r.category).collect() })
    }

    /// The classifier with [`default_rules`].
    pub fn with_default_rules() -> Self {
        Self::new(default_rules()).unwrap_or_else(|e| {
            error!(error = %e, "built-in classifier rules failed to compile, every answer is general");
            Self { set: RegexSet::empty(), categories: Vec::new() }
        })
    }

    /// Classify `text`. Returns [`Category::General`] when no rule matches.
    pub fn classify(&self, text: &str) -> Category {
        self.set
            .matches(text)
            .iter()
            .next()
            .map_or(Category::General, |index| self.categories[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rules_compile() {
        assert!(ResponseClassifier::new(default_rules()).is_ok());
    }

    #[test]
    fn earlier_rule_wins_on_overlap() {
        let classifier = ResponseClassifier::default();
        assert_eq!(classifier.classify("She deployed it to an Azure server."), Category::Azure);
        assert_eq!(
            classifier.classify("Built an ASP.NET Web API for payments."),
            Category::DotNet
        );
    }

    #[test]
    fn matching_ignores_case() {
        let classifier = ResponseClassifier::default();
        assert_eq!(classifier.classify("MACHINE LEARNING pipelines"), Category::ArtificialIntelligence);
        assert_eq!(classifier.classify("Three years of EXPERIENCE"), Category::Experience);
    }

    #[test]
    fn short_tokens_match_whole_words_only() {
        let classifier = ResponseClassifier::default();
        assert_eq!(classifier.classify("She maintained the email pipeline."), Category::General);
        assert_eq!(classifier.classify("Every detail was reviewed."), Category::General);
    }

    #[test]
    fn keywords_match_inflected_forms() {
        let classifier = ResponseClassifier::default();
        assert_eq!(classifier.classify("He is an experienced backend developer."), Category::Experience);
        assert_eq!(classifier.classify("She held two jobs in fintech."), Category::Experience);
        assert_eq!(classifier.classify("Worked with three companies."), Category::Experience);
        assert_eq!(classifier.classify("A strong skill set in Rust."), Category::Skills);
        assert_eq!(classifier.classify("Educated at State College."), Category::Education);
    }

    #[test]
    fn fallback_phrase_is_recognised() {
        let classifier = ResponseClassifier::default();
        let text = "😅 I'd love to brag more, but this detail isn't in the portfolio!";
        assert_eq!(classifier.classify(text), Category::Fallback);
        assert_eq!(Category::Fallback.marker(), "😅🤷‍♂️");
    }

    #[test]
    fn custom_rules_replace_the_table() {
        let classifier = ResponseClassifier::new(vec![Rule::new(r"\brust\b", Category::Skills)]).unwrap();
        assert_eq!(classifier.classify("Rust and Go"), Category::Skills);
        assert_eq!(classifier.classify("Azure"), Category::General);
    }

    #[test]
    fn invalid_pattern_is_a_config_error() {
        let err = ResponseClassifier::new(vec![Rule::new("(unclosed", Category::General)]).unwrap_err();
        assert!(matches!(err, RagError::ConfigError(_)));
    }
}
