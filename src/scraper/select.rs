// select.rs
use crate::errors::CrawlError;
use crate::scraper::layouts::FieldSelector;
use scraper::{ElementRef, Selector};

pub fn compile(css: &str) -> Result<Selector, CrawlError> {
    Selector::parse(css)
        .map_err(|e| CrawlError::Config(format!("invalid selector `{css}`: {e}")))
}

/// Text content with runs of whitespace collapsed to single spaces.
pub fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// A compiled [`FieldSelector`].
pub struct CompiledField {
    selector: Selector,
    attr: Option<String>,
}

impl CompiledField {
    pub fn new(field: &FieldSelector) -> Result<Self, CrawlError> {
        Ok(Self {
            selector: compile(&field.css)?,
            attr: field.attr.clone(),
        })
    }

    pub fn optional(field: Option<&FieldSelector>) -> Result<Option<Self>, CrawlError> {
        field.map(Self::new).transpose()
    }

    /// First non-empty value of the field under `scope`.
    pub fn extract(&self, scope: ElementRef<'_>) -> Option<String> {
        let element = scope.select(&self.selector).next()?;
        let value = match &self.attr {
            Some(attr) => element.value().attr(attr)?.trim().to_string(),
            None => element_text(element),
        };
        (!value.is_empty()).then_some(value)
    }
}
