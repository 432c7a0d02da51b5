//! Ordered query titles for a place, most likely to succeed first.
//!
//! Bare country and city articles are disproportionately illustrated with
//! flags, coats of arms or locator maps, so the default country templates try
//! topical articles before the bare name.

use std::collections::HashSet;

use crate::config::VariantsConfig;
use crate::protocol::{Place, PlaceKind};

const NAME_PLACEHOLDER: &str = "{name}";
const COUNTRY_PLACEHOLDER: &str = "{country}";

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn render_template(template: &str, name: &str, country: Option<&str>) -> Option<String> {
    let mut rendered = template.replace(NAME_PLACEHOLDER, name);
    if rendered.contains(COUNTRY_PLACEHOLDER) {
        let country = country.filter(|value| !value.is_empty())?;
        rendered = rendered.replace(COUNTRY_PLACEHOLDER, country);
    }
    Some(collapse_whitespace(&rendered))
}

fn push_unique_title(titles: &mut Vec<String>, seen_titles: &mut HashSet<String>, title: String) {
    let trimmed = title.trim().trim_matches(',').trim();
    if trimmed.is_empty() {
        return;
    }
    let key = trimmed.to_lowercase();
    if seen_titles.insert(key) {
        titles.push(trimmed.to_string());
    }
}

/// Renders `templates` for one name. Templates needing a missing country are skipped.
pub fn title_variants(templates: &[String], name: &str, country: Option<&str>) -> Vec<String> {
    let name = collapse_whitespace(name);
    if name.is_empty() {
        return Vec::new();
    }
    let country = country.map(collapse_whitespace);
    let mut titles = Vec::with_capacity(templates.len());
    let mut seen = HashSet::new();
    for template in templates {
        if let Some(title) = render_template(template, &name, country.as_deref()) {
            push_unique_title(&mut titles, &mut seen, title);
        }
    }
    titles
}

/// Variants for a stored place using the templates of its kind.
pub fn variants_for_place(place: &Place, config: &VariantsConfig) -> Vec<String> {
    match place.kind() {
        PlaceKind::Country => title_variants(&config.country_templates, &place.name, None),
        PlaceKind::City => title_variants(
            &config.city_templates,
            &place.name,
            place.country_context.as_deref(),
        ),
    }
}
