//! # Sierra Chat Response Rules
//!
//! File: cli/src/common/chat/rules.rs
//! Author: Christi Mahu
//!
//! ## Overview
//!
//! The chat assistant has no intelligence: every reply comes from an ordered
//! table of keyword rules. A rule matches when the lower-cased input contains
//! any of its keywords as a substring, and the first matching rule in table
//! order wins. Nothing after it is evaluated, so the order of the table is the
//! tie-break ("book a room" is a booking question, not a rooms question).
//!
//! The built-in table covers the hotel's eight categories. A replacement
//! table can be loaded from TOML:
//!
//! ```toml
//! fallback = "Sorry, I can only answer questions about the hotel."
//!
//! [[rules]]
//! category = "greeting"
//! keywords = ["hello", "hi"]
//! response = "Hello there!"
//! ```
//!
use crate::core::error::{Result, SierraError};
use anyhow::Context;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

/// A keyword set mapped to one canned response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rule {
    /// Short name of the category (e.g. `"rooms"`).
    pub category: String,
    /// Lower-case keywords; any one of them appearing in the input is a match.
    pub keywords: Vec<String>,
    /// The reply returned when this rule wins.
    pub response: String,
}

impl Rule {
    fn new(category: &str, keywords: &[&str], response: &str) -> Self {
        Self {
            category: category.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            response: response.to_string(),
        }
    }

    /// Returns true if `lowered` contains any of this rule's keywords.
    /// `lowered` must already be lower-cased.
    fn matches(&self, lowered: &str) -> bool {
        self.keywords.iter().any(|k| lowered.contains(k.as_str()))
    }
}

/// Raw shape of a rules file before validation.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleFile {
    fallback: String,
    #[serde(default)]
    rules: Vec<Rule>,
}

/// # Response Matcher (`ResponseMatcher`)
///
/// Immutable, ordered rule table plus the fallback reply. Built once at
/// startup and shared (it is `Send + Sync` and cheap to wrap in an `Arc`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMatcher {
    rules: Vec<Rule>,
    fallback: String,
}

impl Default for ResponseMatcher {
    fn default() -> Self {
        Self::hotel()
    }
}

impl ResponseMatcher {
    /// # Built-in Hotel Table (`hotel`)
    ///
    /// The Sierra Springs rule table in priority order: greeting, booking,
    /// rooms, amenities, location, prices, checkin, contact.
    pub fn hotel() -> Self {
        let rules = vec![
            Rule::new(
                "greeting",
                &["hello", "hi"],
                "Hello! Welcome to Sierra Springs Hotels. How can I help you today?",
            ),
            Rule::new(
                "booking",
                &["book", "reservation"],
                "You can book rooms by calling +1-555-0123 or visiting our front desk. What dates are you looking for?",
            ),
            Rule::new(
                "rooms",
                &["room", "suite"],
                "We offer Standard, Deluxe, and Suite rooms. All include free WiFi, breakfast, and mountain views.",
            ),
            Rule::new(
                "amenities",
                &["amenities", "facilities"],
                "Our amenities include: Pool, Spa, Restaurant, Gym, Free WiFi, Parking, and 24/7 Room Service.",
            ),
            Rule::new(
                "location",
                &["location", "address"],
                "We're located in the beautiful Sierra Mountains with easy highway access and stunning nature views.",
            ),
            Rule::new(
                "prices",
                &["price", "cost", "rate"],
                "Room rates start at $120/night for Standard rooms. Contact us for current availability and pricing.",
            ),
            Rule::new(
                "checkin",
                &["check", "time"],
                "Check-in: 3:00 PM, Check-out: 11:00 AM. Early check-in available upon request.",
            ),
            Rule::new(
                "contact",
                &["contact", "phone"],
                "Phone: +1-555-0123 | Email: info@sierrasprings.com | Address: 123 Mountain View Dr",
            ),
        ];

        Self {
            rules,
            fallback: "I can help with bookings, room info, amenities, location, and contact details. What would you like to know?"
                .to_string(),
        }
    }

    /// # Build From Rules (`from_rules`)
    ///
    /// Validates and normalizes a rule table. Keywords are lower-cased so that
    /// matching stays case-insensitive regardless of how the table was written.
    ///
    /// ## Errors
    ///
    /// Returns `SierraError::Rules` if the table is empty, a rule has no
    /// keywords, or a keyword is blank. A blank keyword would match every input.
    pub fn from_rules(rules: Vec<Rule>, fallback: String) -> Result<Self> {
        if rules.is_empty() {
            return Err(SierraError::Rules("rule table is empty".into()).into());
        }

        let mut normalized = Vec::with_capacity(rules.len());
        for mut rule in rules {
            if rule.keywords.is_empty() {
                return Err(SierraError::Rules(format!(
                    "rule '{}' has no keywords",
                    rule.category
                ))
                .into());
            }
            if rule.keywords.iter().any(|k| k.trim().is_empty()) {
                return Err(SierraError::Rules(format!(
                    "rule '{}' has a blank keyword",
                    rule.category
                ))
                .into());
            }
            rule.keywords = rule.keywords.iter().map(|k| k.to_lowercase()).collect();
            normalized.push(rule);
        }

        Ok(Self {
            rules: normalized,
            fallback,
        })
    }

    /// Parses a TOML rule table (see the module docs for the format).
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: RuleFile = toml::from_str(content).context("Failed to parse chat rules")?;
        Self::from_rules(file.rules, file.fallback)
    }

    /// Reads and parses a TOML rule table from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading chat rules from {}", path.display());
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read rules file: {}", path.display()))?;
        let matcher = Self::from_toml_str(&content)
            .with_context(|| format!("Invalid rules file: {}", path.display()))?;
        debug!("Loaded {} chat rules", matcher.rules().len());
        Ok(matcher)
    }

    /// # Match Input (`respond`)
    ///
    /// Maps free text to exactly one reply. The input is lower-cased, rules are
    /// tried in table order, and the first one with a keyword contained in the
    /// input wins. Falls back to the default reply when nothing matches.
    pub fn respond(&self, input: &str) -> &str {
        let lowered = input.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&lowered))
            .map(|rule| rule.response.as_str())
            .unwrap_or(&self.fallback)
    }

    /// The message shown when the chat opens: the `greeting` rule's reply,
    /// or the first rule's reply if the table has no greeting category.
    pub fn greeting(&self) -> &str {
        self.rules
            .iter()
            .find(|rule| rule.category == "greeting")
            .or_else(|| self.rules.first())
            .map(|rule| rule.response.as_str())
            .unwrap_or(&self.fallback)
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }
}
