//! HTML extraction rules for the course site.
//!
//! Every function here is a pure function of its HTML input. Missing or
//! malformed structure degrades to partial or empty results.
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use treehouse_core::{StageListing, StageSteps};

/// Stage container on the stage-listing page.
const STAGE_SELECTOR: &str = ".featurette";
/// Stage heading inside a container.
const STAGE_TITLE_SELECTOR: &str = "h2";
/// One step of a stage.
const STEP_ITEM_SELECTOR: &str = "li";
/// Text label of a step: a duration for videos, something else otherwise.
const STEP_LABEL_SELECTOR: &str = "p";
const STEP_LINK_SELECTOR: &str = "a[href]";
/// Query flag marking the HD variant link on a step page.
const HD_FLAG: &str = "?hd=yes";

/// `M:SS`-style label, one or two digits on each side of the colon.
static DURATION_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,2}:\d{1,2}$").expect("duration pattern is valid"));

/// Whether a step label marks a step that has a video.
///
/// This is a markup heuristic: video steps show their running time, quizzes
/// and objectives show something else. Swap this predicate if the site's
/// listing markup changes.
pub fn is_duration_label(label: &str) -> bool {
    DURATION_LABEL.is_match(label.trim())
}

/// Group video step URLs by stage, in page order.
///
/// List items missing a label or a link are dropped without affecting their
/// siblings. Stages without any video step are kept so stage positions match
/// the page.
pub fn parse_stage_listing(html: &str) -> StageListing {
    let doc = Html::parse_document(html);
    let (Some(stage_sel), Some(title_sel), Some(item_sel), Some(label_sel), Some(link_sel)) = (
        Selector::parse(STAGE_SELECTOR).ok(),
        Selector::parse(STAGE_TITLE_SELECTOR).ok(),
        Selector::parse(STEP_ITEM_SELECTOR).ok(),
        Selector::parse(STEP_LABEL_SELECTOR).ok(),
        Selector::parse(STEP_LINK_SELECTOR).ok(),
    ) else {
        return Vec::new();
    };

    doc.select(&stage_sel)
        .map(|stage| {
            let title = stage
                .select(&title_sel)
                .next()
                .map(element_text)
                .unwrap_or_default();
            let step_urls = stage
                .select(&item_sel)
                .filter_map(|item| {
                    let label = own_element(item, &label_sel)?;
                    let link = own_element(item, &link_sel)?;
                    let href = link.value().attr("href")?.trim();
                    if href.is_empty() || !is_duration_label(&element_text(label)) {
                        return None;
                    }
                    Some(href.to_string())
                })
                .collect();
            StageSteps { title, step_urls }
        })
        .collect()
}

/// First match of `selector` inside `item` that is not part of a nested
/// list item.
fn own_element<'a>(item: ElementRef<'a>, selector: &Selector) -> Option<ElementRef<'a>> {
    item.select(selector).find(|element| {
        element
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|ancestor| ancestor.value().name() == STEP_ITEM_SELECTOR)
            .is_some_and(|owner| owner.id() == item.id())
    })
}

/// First link on a step page that points at the HD video variant.
pub fn parse_step_video_link(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let link_sel = Selector::parse("a[href]").ok()?;
    doc.select(&link_sel)
        .filter_map(|link| link.value().attr("href"))
        .map(str::trim)
        .find(|href| href.contains(HD_FLAG))
        .map(ToOwned::to_owned)
}

/// Hidden inputs of the sign-in form (CSRF token and friends) as
/// `(name, value)` pairs, in document order.
///
/// The sign-in form is the first form holding a password field, or the
/// first form on the page if none does.
pub fn parse_login_form(html: &str) -> Vec<(String, String)> {
    let doc = Html::parse_document(html);
    let (Some(form_sel), Some(password_sel), Some(hidden_sel)) = (
        Selector::parse("form").ok(),
        Selector::parse(r#"input[type="password"]"#).ok(),
        Selector::parse(r#"input[type="hidden"][name]"#).ok(),
    ) else {
        return Vec::new();
    };

    let form = doc
        .select(&form_sel)
        .find(|form| form.select(&password_sel).next().is_some())
        .or_else(|| doc.select(&form_sel).next());

    let Some(form) = form else {
        return Vec::new();
    };

    form.select(&hidden_sel)
        .filter_map(|input| {
            let name = input.value().attr("name")?.trim();
            if name.is_empty() {
                return None;
            }
            let value = input.value().attr("value").unwrap_or_default();
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

/// Whether a page body shows the authenticated-only marker (case-insensitive).
pub fn has_authenticated_marker(html: &str, marker: &str) -> bool {
    let marker = marker.trim();
    !marker.is_empty() && html.to_lowercase().contains(&marker.to_lowercase())
}

fn element_text(element: ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}
