//! Spoken-sentence grammar for liveness challenges.
//!
//! Fill-in-the-blank templates at three complexity tiers, rendered from
//! fixed word banks. Batch generation never repeats a rendered sentence
//! within the batch.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Prompt complexity tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    #[default]
    Medium,
    Complex,
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple => write!(f, "simple"),
            Self::Medium => write!(f, "medium"),
            Self::Complex => write!(f, "complex"),
        }
    }
}

impl FromStr for Complexity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "simple" => Ok(Self::Simple),
            "medium" => Ok(Self::Medium),
            "complex" => Ok(Self::Complex),
            other => Err(format!("unknown complexity: {other}")),
        }
    }
}

const SIMPLE_TEMPLATES: &[&str] = &[
    "The {color} {object} is {location}",
    "My favorite {category} is {item}",
    "Today is a {adjective} {time_period}",
    "I like to {activity} on {day}",
    "The number {number} is {adjective}",
    "My {object} is {color}",
    "I can see a {color} {object}",
    "The weather is {adjective} today",
    "I enjoy {activity} very much",
    "This is my {adjective} {object}",
];

const MEDIUM_TEMPLATES: &[&str] = &[
    "I would like to {activity} at the {location} tomorrow",
    "The {adjective} {object} belongs to my {relation}",
    "Every {day} I {activity} with my {relation}",
    "My {relation} has a {color} {object}",
    "The {number} {color} {object}s are in the {location}",
    "I prefer {activity} over {activity} on weekends",
];

const COMPLEX_TEMPLATES: &[&str] = &[
    "On {day} I went to the {location} and saw a {color} {object}",
    "My {relation} told me that {activity} is better than {activity}",
    "I believe the {adjective} {object} should be placed in the {location}",
    "The {number} {color} {object}s that I saw were absolutely {adjective}",
];

const WORD_BANKS: &[(&str, &[&str])] = &[
    (
        "color",
        &["red", "blue", "green", "yellow", "black", "white", "purple", "orange", "pink", "brown"],
    ),
    (
        "object",
        &["car", "book", "phone", "table", "chair", "lamp", "computer", "bag", "pen", "cup"],
    ),
    (
        "location",
        &[
            "outside", "inside", "upstairs", "downstairs", "nearby", "here", "there", "home",
            "office", "garden",
        ],
    ),
    (
        "category",
        &["color", "number", "food", "animal", "season", "day", "month"],
    ),
    (
        "item",
        &["seven", "blue", "pizza", "cat", "summer", "Friday", "January"],
    ),
    (
        "adjective",
        &[
            "beautiful", "wonderful", "amazing", "terrible", "great", "small", "large", "bright",
            "dark", "quiet",
        ],
    ),
    (
        "time_period",
        &["day", "morning", "evening", "afternoon", "night", "week", "month", "year"],
    ),
    (
        "activity",
        &["read", "write", "walk", "run", "swim", "cook", "sleep", "work", "play", "study"],
    ),
    (
        "day",
        &["Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday"],
    ),
    (
        "number",
        &["one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten"],
    ),
    (
        "relation",
        &["friend", "family", "colleague", "neighbor", "brother", "sister", "parent"],
    ),
];

/// Renders random prompts for one complexity tier.
#[derive(Debug, Clone, Copy)]
pub struct PromptGenerator {
    complexity: Complexity,
}

impl PromptGenerator {
    pub fn new(complexity: Complexity) -> Self {
        Self { complexity }
    }

    pub fn complexity(&self) -> Complexity {
        self.complexity
    }

    fn templates(&self) -> &'static [&'static str] {
        match self.complexity {
            Complexity::Simple => SIMPLE_TEMPLATES,
            Complexity::Medium => MEDIUM_TEMPLATES,
            Complexity::Complex => COMPLEX_TEMPLATES,
        }
    }

    /// Render one prompt: pick a template, fill every placeholder occurrence
    /// with an independently drawn word from its bank.
    pub fn render<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        let templates = self.templates();
        let template = templates[rng.gen_range(0..templates.len())];
        let mut sentence = template.to_string();
        for (placeholder, words) in WORD_BANKS {
            let pat = format!("{{{placeholder}}}");
            while let Some(pos) = sentence.find(&pat) {
                let word = words
                    .choose(rng)
                    .copied()
                    .unwrap_or_default();
                sentence.replace_range(pos..pos + pat.len(), word);
            }
        }
        sentence
    }

    /// Render `count` prompts with no repeated sentence within the batch.
    /// The grammar space is large; rendering is capped at a generous attempt
    /// budget so a small tier can never spin forever.
    pub fn render_batch<R: Rng + ?Sized>(&self, count: usize, rng: &mut R) -> Vec<String> {
        let mut seen: HashSet<String> = HashSet::with_capacity(count);
        let mut out = Vec::with_capacity(count);
        let mut attempts = 0usize;
        let budget = count.saturating_mul(200).max(200);
        while out.len() < count && attempts < budget {
            attempts += 1;
            let sentence = self.render(rng);
            if seen.insert(sentence.clone()) {
                out.push(sentence);
            }
        }
        out
    }
}
