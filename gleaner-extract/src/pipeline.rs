use crate::normalize::normalize;
use crate::rules::{default_rules, Field, Rule, RuleError};
use gleaner_common::{
    ContentBody, ExtractedRecord, ExtractionError, RawContent, SourceLink, StructuredAnswer,
};
use scraper::{ElementRef, Html};
use url::Url;

/// Applies an ordered rule list to raw content.
///
/// For each field the first rule that yields a non-empty value wins and no
/// later rule for that field is consulted. List fields are never merged
/// across rules.
#[derive(Debug, Clone)]
pub struct ExtractionPipeline {
    rules: Vec<Rule>,
    min_content_chars: usize,
}

#[derive(Default)]
struct Fields {
    title: Option<String>,
    main_content: Option<String>,
    sources: Option<Vec<SourceLink>>,
    related: Option<Vec<String>>,
}

impl Fields {
    fn is_set(&self, field: Field) -> bool {
        match field {
            Field::Title => self.title.is_some(),
            Field::MainContent => self.main_content.is_some(),
            Field::Sources => self.sources.is_some(),
            Field::Related => self.related.is_some(),
        }
    }
}

impl ExtractionPipeline {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            rules,
            min_content_chars: 1,
        }
    }

    /// Pipeline over the built-in rule set.
    pub fn with_default_rules() -> Result<Self, RuleError> {
        Ok(Self::new(default_rules()?))
    }

    /// Minimum character count for `main_content` to count as present.
    pub fn with_min_content_chars(mut self, n: usize) -> Self {
        self.min_content_chars = n.max(1);
        self
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Build a record from `raw`.
    ///
    /// Deterministic: the same input always yields the same record, including
    /// `captured_at`, which is the fetch timestamp.
    pub fn extract(&self, raw: &RawContent) -> Result<ExtractedRecord, ExtractionError> {
        let fields = match &raw.body {
            ContentBody::Markup(html) => self.apply_rules(html, base_url(raw).as_ref()),
            ContentBody::Answer(answer) => self.project_answer(answer),
        };

        let Some(main_content) = fields.main_content else {
            tracing::debug!(
                target_id = %raw.target,
                backend = %raw.backend,
                body_len = raw.len(),
                "extract.no_rule_matched"
            );
            return Err(ExtractionError::NoRuleMatched);
        };

        Ok(ExtractedRecord {
            title: fields
                .title
                .unwrap_or_else(|| raw.target.as_str().to_string()),
            main_content: Some(main_content),
            sources: fields.sources.unwrap_or_default(),
            related: fields.related.unwrap_or_default(),
            captured_at: raw.fetched_at,
            origin_target: raw.target.clone(),
        })
    }

    fn apply_rules(&self, html: &str, base: Option<&Url>) -> Fields {
        let doc = Html::parse_document(html);
        let mut fields = Fields::default();

        for rule in &self.rules {
            if fields.is_set(rule.field) {
                continue;
            }
            let hits = rule.locator.select(&doc);
            if hits.is_empty() {
                continue;
            }
            let filled = match rule.field {
                Field::Title => {
                    fields.title = hits.iter().map(|el| text_of(el)).find(|t| !t.is_empty());
                    fields.title.is_some()
                }
                Field::MainContent => {
                    fields.main_content = Some(normalize(&hits[0].inner_html()))
                        .filter(|c| self.long_enough(c));
                    fields.main_content.is_some()
                }
                Field::Sources => {
                    let links: Vec<SourceLink> =
                        hits.iter().filter_map(|el| source_link(el, base)).collect();
                    fields.sources = Some(links).filter(|l| !l.is_empty());
                    fields.sources.is_some()
                }
                Field::Related => {
                    let items: Vec<String> = hits
                        .iter()
                        .map(|el| text_of(el))
                        .filter(|t| !t.is_empty())
                        .collect();
                    fields.related = Some(items).filter(|i| !i.is_empty());
                    fields.related.is_some()
                }
            };
            if filled {
                tracing::trace!(field = %rule.field, locator = %rule.locator, "extract.rule.matched");
            }
        }
        fields
    }

    fn project_answer(&self, answer: &StructuredAnswer) -> Fields {
        let sources: Vec<SourceLink> = answer
            .sources
            .iter()
            .filter(|s| !s.url.trim().is_empty())
            .map(|s| {
                let url = s.url.trim().to_string();
                let text = normalize(&s.text);
                let text = if text.is_empty() { url.clone() } else { text };
                SourceLink { text, url }
            })
            .collect();
        let related: Vec<String> = answer
            .related
            .iter()
            .map(|r| normalize(r))
            .filter(|r| !r.is_empty())
            .collect();

        Fields {
            title: answer
                .title
                .as_deref()
                .map(normalize)
                .filter(|t| !t.is_empty()),
            main_content: Some(normalize(&answer.answer)).filter(|c| self.long_enough(c)),
            sources: Some(sources),
            related: Some(related),
        }
    }

    fn long_enough(&self, content: &str) -> bool {
        content.chars().count() >= self.min_content_chars
    }
}

fn text_of(el: &ElementRef<'_>) -> String {
    normalize(&el.inner_html())
}

fn source_link(el: &ElementRef<'_>, base: Option<&Url>) -> Option<SourceLink> {
    let href = el.value().attr("href")?.trim();
    if href.is_empty() {
        return None;
    }
    let url = match base.and_then(|b| b.join(href).ok()) {
        Some(resolved) => resolved.to_string(),
        None => href.to_string(),
    };
    let text = text_of(el);
    let text = if text.is_empty() { url.clone() } else { text };
    Some(SourceLink { text, url })
}

fn base_url(raw: &RawContent) -> Option<Url> {
    raw.final_url
        .as_deref()
        .and_then(|u| Url::parse(u).ok())
        .or_else(|| raw.target.as_url())
}
