//! Declarative extraction rules.
//!
//! A rule pairs a [`Locator`] with the [`Field`] it fills. Locators are
//! compiled when the rule is built, so a bad selector or pattern fails at
//! construction and never during extraction.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Title,
    MainContent,
    Sources,
    Related,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Field::Title => "title",
            Field::MainContent => "main_content",
            Field::Sources => "sources",
            Field::Related => "related",
        })
    }
}

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("invalid selector `{selector}`: {message}")]
    InvalidSelector { selector: String, message: String },
    #[error("invalid class pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// How a rule finds elements in a document.
#[derive(Debug, Clone)]
pub enum Locator {
    /// A CSS selector; a comma-separated list matches any alternative.
    Css { raw: String, selector: Selector },
    /// Elements (optionally of one tag) whose `class` attribute matches.
    ClassPattern {
        tag: Option<String>,
        scope: Selector,
        pattern: Regex,
    },
}

impl Locator {
    pub fn css(raw: &str) -> Result<Self, RuleError> {
        let selector = parse_selector(raw)?;
        Ok(Locator::Css {
            raw: raw.to_string(),
            selector,
        })
    }

    pub fn class_pattern(pattern: &str, tag: Option<&str>) -> Result<Self, RuleError> {
        let regex = Regex::new(pattern).map_err(|source| RuleError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        let tag = tag.map(str::trim).filter(|t| !t.is_empty());
        let scope = parse_selector(tag.unwrap_or("*"))?;
        Ok(Locator::ClassPattern {
            tag: tag.map(str::to_string),
            scope,
            pattern: regex,
        })
    }

    /// Matching elements in document order.
    pub fn select<'a>(&self, doc: &'a Html) -> Vec<ElementRef<'a>> {
        match self {
            Locator::Css { selector, .. } => doc.select(selector).collect(),
            Locator::ClassPattern { scope, pattern, .. } => doc
                .select(scope)
                .filter(|el| {
                    el.value()
                        .attr("class")
                        .is_some_and(|class| pattern.is_match(class))
                })
                .collect(),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css { raw, .. } => write!(f, "css({raw})"),
            Locator::ClassPattern { tag, pattern, .. } => {
                write!(f, "class({}~/{}/)", tag.as_deref().unwrap_or("*"), pattern.as_str())
            }
        }
    }
}

fn parse_selector(raw: &str) -> Result<Selector, RuleError> {
    Selector::parse(raw).map_err(|e| RuleError::InvalidSelector {
        selector: raw.to_string(),
        message: e.to_string(),
    })
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub field: Field,
    pub locator: Locator,
}

impl Rule {
    pub fn new(field: Field, locator: Locator) -> Self {
        Self { field, locator }
    }

    pub fn css(field: Field, selector: &str) -> Result<Self, RuleError> {
        Ok(Self::new(field, Locator::css(selector)?))
    }

    pub fn class_pattern(field: Field, pattern: &str, tag: Option<&str>) -> Result<Self, RuleError> {
        Ok(Self::new(field, Locator::class_pattern(pattern, tag)?))
    }
}

/// Built-in rule set, highest priority first.
pub fn default_rules() -> Result<Vec<Rule>, RuleError> {
    Ok(vec![
        Rule::class_pattern(Field::MainContent, r"prose|shared-content|answer-container", Some("div"))?,
        Rule::css(Field::MainContent, ".answer-content")?,
        Rule::css(Field::MainContent, "[role='article']")?,
        Rule::css(Field::MainContent, "article.content")?,
        Rule::css(Field::Sources, "footer a[href^='http']")?,
        Rule::css(Field::Sources, ".sources a[href]")?,
        Rule::css(Field::Related, ".related-questions li")?,
        Rule::css(Field::Related, ".related-content li, .suggested-questions li")?,
        Rule::css(Field::Related, ".related-question")?,
        Rule::css(Field::Related, ".suggested-questions a")?,
        Rule::css(Field::Title, "title")?,
        Rule::css(Field::Title, "h1")?,
    ])
}
