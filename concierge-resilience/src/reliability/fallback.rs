//! Canned replies for when the AI dependency is unavailable.
//!
//! Intent detection is a plain keyword match over the lower-cased message.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Greeting,
    Booking,
    Spa,
    Dining,
    Activities,
    Default,
}

impl Intent {
    /// Checked in order; the first intent with a matching keyword wins.
    const KEYWORDS: [(Intent, &'static [&'static str]); 5] = [
        (Intent::Greeting, &["hello", "hi", "hey", "good"]),
        (Intent::Booking, &["book", "reservation", "reserve"]),
        (Intent::Spa, &["spa", "massage", "treatment"]),
        (
            Intent::Dining,
            &["food", "restaurant", "dinner", "lunch", "breakfast"],
        ),
        (
            Intent::Activities,
            &["activity", "activities", "excursion", "tour"],
        ),
    ];

    pub fn detect(message: &str) -> Intent {
        let message = message.to_lowercase();
        Self::KEYWORDS
            .iter()
            .find(|(_, words)| words.iter().any(|w| message.contains(w)))
            .map(|(intent, _)| *intent)
            .unwrap_or(Intent::Default)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Greeting => "greeting",
            Intent::Booking => "booking",
            Intent::Spa => "spa",
            Intent::Dining => "dining",
            Intent::Activities => "activities",
            Intent::Default => "default",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fallback templates keyed by intent.
#[derive(Debug, Clone)]
pub struct FallbackCatalog {
    templates: HashMap<Intent, String>,
}

impl Default for FallbackCatalog {
    fn default() -> Self {
        let templates = [
            (
                Intent::Greeting,
                "Thank you for contacting us! A team member will respond shortly.",
            ),
            (
                Intent::Booking,
                "For booking inquiries, please contact our reservations team.",
            ),
            (
                Intent::Spa,
                "Our spa is open from 9 AM to 8 PM. Please visit the front desk for appointments.",
            ),
            (
                Intent::Dining,
                "Our restaurants serve breakfast (7-10 AM), lunch (12-2 PM), and dinner (7-10 PM).",
            ),
            (
                Intent::Activities,
                "Please check the daily activity board in the main lobby for today's schedule.",
            ),
            (
                Intent::Default,
                "Thank you for your message. Our team will respond as soon as possible.",
            ),
        ]
        .into_iter()
        .map(|(intent, text)| (intent, text.to_string()))
        .collect();

        Self { templates }
    }
}

impl FallbackCatalog {
    pub fn with_template(mut self, intent: Intent, text: impl Into<String>) -> Self {
        self.templates.insert(intent, text.into());
        self
    }

    pub fn response(&self, intent: Intent) -> &str {
        self.templates
            .get(&intent)
            .or_else(|| self.templates.get(&Intent::Default))
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Detects the intent of `message` and returns the matching template.
    pub fn respond_to(&self, message: &str) -> (Intent, &str) {
        let intent = Intent::detect(message);
        (intent, self.response(intent))
    }
}
