//! # Template router.
//!
//! A small [`PatternRouter`] over whitespace-separated templates:
//!
//! ```text
//! "page_to :page"       matches "page_to 2"             → { page: "2" }
//! "flights :from :to"   matches "flights tokyo nyc"     → { from: "tokyo", to: "nyc" }
//! "say *text"           matches "say hello there"       → { text: "hello there" }
//! ```
//!
//! ## Rules
//! - literal tokens match exactly (case-sensitive)
//! - `:name` captures exactly one token
//! - a trailing `*name` captures the rest of the text (at least one token)
//! - rules are tried in registration order; first match wins
//! - re-registering a pattern replaces its rule in place

use std::sync::Arc;

use parking_lot::RwLock;

use crate::handlers::HandlerRef;
use crate::message::Params;
use crate::routing::router::{PatternRouter, RouteMatch, RouteOptions, RouteTarget};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Param(String),
    Rest(String),
}

#[derive(Debug, Clone)]
struct Rule {
    pattern: Arc<str>,
    tokens: Vec<Token>,
    target: RouteTarget,
    options: RouteOptions,
}

impl Rule {
    fn new(pattern: &str, target: RouteTarget, options: RouteOptions) -> Self {
        Self {
            pattern: Arc::from(pattern),
            tokens: parse(pattern),
            target,
            options,
        }
    }

    fn matches(&self, text: &str) -> Option<Params> {
        let words: Vec<&str> = text.split_whitespace().collect();
        let mut params = Params::new();

        for (i, token) in self.tokens.iter().enumerate() {
            match token {
                Token::Literal(lit) => {
                    if words.get(i) != Some(&lit.as_str()) {
                        return None;
                    }
                }
                Token::Param(name) => {
                    let word = words.get(i)?;
                    params.insert(name.clone(), (*word).to_string());
                }
                Token::Rest(name) => {
                    let rest = words.get(i..).filter(|r| !r.is_empty())?;
                    params.insert(name.clone(), rest.join(" "));
                    return Some(params);
                }
            }
        }

        (words.len() == self.tokens.len()).then_some(params)
    }
}

fn parse(pattern: &str) -> Vec<Token> {
    let words: Vec<&str> = pattern.split_whitespace().collect();
    let last = words.len().saturating_sub(1);

    words
        .iter()
        .enumerate()
        .map(|(i, w)| match (w.strip_prefix(':'), w.strip_prefix('*')) {
            (Some(name), _) if !name.is_empty() => Token::Param(name.to_string()),
            (_, Some(name)) if !name.is_empty() && i == last => Token::Rest(name.to_string()),
            _ => Token::Literal((*w).to_string()),
        })
        .collect()
}

/// In-memory template router.
#[derive(Default)]
pub struct TemplateRouter {
    rules: RwLock<Vec<Rule>>,
}

impl TemplateRouter {
    /// Creates an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `pattern` to a handler.
    pub fn map(&self, pattern: &str, handler: HandlerRef, options: RouteOptions) {
        self.register_pattern(pattern, RouteTarget::Handler(handler), options);
    }

    /// Returns registered patterns in routing order.
    pub fn patterns(&self) -> Vec<Arc<str>> {
        self.rules.read().iter().map(|r| Arc::clone(&r.pattern)).collect()
    }
}

impl PatternRouter for TemplateRouter {
    fn register_pattern(&self, pattern: &str, target: RouteTarget, options: RouteOptions) {
        let rule = Rule::new(pattern, target, options);
        let mut rules = self.rules.write();
        match rules.iter_mut().find(|r| &*r.pattern == pattern) {
            Some(existing) => *existing = rule,
            None => rules.push(rule),
        }
    }

    fn unregister_pattern(&self, pattern: &str) -> bool {
        let mut rules = self.rules.write();
        let before = rules.len();
        rules.retain(|r| &*r.pattern != pattern);
        rules.len() != before
    }

    fn has_pattern(&self, pattern: &str) -> bool {
        self.rules.read().iter().any(|r| &*r.pattern == pattern)
    }

    fn route(&self, text: &str) -> Option<RouteMatch> {
        let rules = self.rules.read();
        rules.iter().find_map(|rule| {
            rule.matches(text).map(|params| RouteMatch {
                pattern: Arc::clone(&rule.pattern),
                target: rule.target.clone(),
                options: rule.options,
                params,
            })
        })
    }
}
