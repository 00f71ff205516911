//! Markup for the catalog page. Every function here is a pure function of the
//! catalog snapshot and the view state handed in.

use once_cell::sync::Lazy;
use pulldown_cmark::{html, CowStr, Event, Parser, Tag};
use regex::Regex;

use crate::catalog::{CatalogStore, Product, ProductId};
use crate::chat::{Entry, Role};
use crate::selection::{ExpandState, SelectionSet};

pub const ALL_CATEGORIES: &str = "all";

const EMPTY_CATALOG: &str = "No products available.";
const EMPTY_FILTER: &str = "No products found for this category.";
const LOADING_CATALOG: &str = "Loading products…";

/// Link and image schemes never emitted into the transcript.
const BLOCKED_PROTOCOLS: &[&str] = &["javascript:", "vbscript:", "data:", "file:", "blob:"];

static WORD_START: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w").unwrap());

/// Selection and expand state a render pass reads.
#[derive(Debug, Clone, Copy)]
pub struct ViewState<'a> {
    pub selection: &'a SelectionSet,
    pub expanded: &'a ExpandState,
    pub category: &'a str,
    pub in_flight: bool,
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Upper-case the first character of every word: "hair care" -> "Hair Care".
pub fn title_case(text: &str) -> String {
    WORD_START
        .replace_all(text, |caps: &regex::Captures| caps[0].to_uppercase())
        .into_owned()
}

/// Ids of the rendered cards that carry the selected indicator.
pub fn grid_selection(products: &[Product], selection: &SelectionSet) -> Vec<ProductId> {
    products
        .iter()
        .filter(|p| selection.contains(p.id))
        .map(|p| p.id)
        .collect()
}

fn placeholder(text: &str) -> String {
    format!("<div class=\"placeholder-message\">{}</div>", escape(text))
}

fn hidden(name: &str, value: &str) -> String {
    format!(
        "<input type=\"hidden\" name=\"{}\" value=\"{}\">",
        name,
        escape(value)
    )
}

pub fn card(product: &Product, view: &ViewState) -> String {
    let selected = view.selection.contains(product.id);
    let expanded = view.expanded.is_expanded(product.id);
    let alt = if product.name.is_empty() {
        &product.brand
    } else {
        &product.name
    };

    let mut classes = String::from("product-card");
    if selected {
        classes.push_str(" is-selected");
    }
    if expanded {
        classes.push_str(" is-expanded");
    }

    let id = product.id.to_string();
    format!(
        r#"<article class="{classes}" data-category="{category}" data-id="{id}">
  <form method="post" action="/events" class="card-select">
    {kind}{id_field}{cat_field}
    <button type="submit" class="card-body" aria-pressed="{selected}">
      <span class="select-badge" aria-hidden="true">&#10003;</span>
      <img src="{image}" alt="{alt}">
      <h3>{name}</h3>
      <p class="brand">{brand}</p>
    </button>
  </form>
  <form method="post" action="/events" class="card-expand">
    {expand_kind}{id_field}{cat_field}
    <button type="submit" class="expand-btn" aria-expanded="{expanded}" aria-controls="desc-{id}" title="Show details">&#9662;</button>
  </form>
  <div id="desc-{id}" class="product-desc">{description}</div>
</article>"#,
        classes = classes,
        category = escape(&product.category),
        id = id,
        kind = hidden("kind", "click"),
        expand_kind = hidden("kind", "expand"),
        id_field = hidden("id", &id),
        cat_field = hidden("category", view.category),
        selected = selected,
        expanded = expanded,
        image = escape(&product.image),
        alt = escape(alt),
        name = escape(&product.name),
        brand = escape(&product.brand),
        description = escape(product.description.as_deref().unwrap_or("")),
    )
}

/// One section per category, in the order categories first appear.
pub fn grouped(products: &[Product], view: &ViewState) -> String {
    if products.is_empty() {
        return placeholder(EMPTY_CATALOG);
    }

    let mut groups: Vec<(&str, Vec<&Product>)> = Vec::new();
    for product in products {
        match groups.iter_mut().find(|(c, _)| *c == product.category) {
            Some((_, items)) => items.push(product),
            None => groups.push((product.category.as_str(), vec![product])),
        }
    }

    groups
        .iter()
        .map(|(category, items)| {
            let cards: String = items.iter().map(|p| card(p, view)).collect();
            format!(
                "<section class=\"category-section\">\n<h3 class=\"category-header\">{}</h3>\n<div class=\"products-grid\">\n{}\n</div>\n</section>",
                escape(&title_case(category)),
                cards
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Products matching `view.category` in catalog order. "all" or an empty
/// filter falls back to the grouped view.
pub fn filtered(products: &[Product], view: &ViewState) -> String {
    if view.category.is_empty() || view.category == ALL_CATEGORIES {
        let view = ViewState {
            category: ALL_CATEGORIES,
            ..*view
        };
        return grouped(products, &view);
    }

    let matching: Vec<&Product> = products
        .iter()
        .filter(|p| p.category == view.category)
        .collect();
    if matching.is_empty() {
        return placeholder(EMPTY_FILTER);
    }

    format!(
        "<div class=\"products-grid\">\n{}\n</div>",
        matching.iter().map(|p| card(p, view)).collect::<String>()
    )
}

pub fn selected_list(catalog: &CatalogStore, view: &ViewState) -> String {
    view.selection
        .resolve(catalog)
        .iter()
        .map(|p| {
            let id = p.id.to_string();
            format!(
                r#"<div class="selected-item" data-id="{id}">
  <img src="{image}" alt="{name}">
  <span>{name}</span>
  <form method="post" action="/events">{kind}{id_field}{cat_field}<button type="submit" aria-label="Remove {name}" title="Remove">&times;</button></form>
</div>"#,
                id = id,
                image = escape(&p.image),
                name = escape(&p.name),
                kind = hidden("kind", "remove"),
                id_field = hidden("id", &id),
                cat_field = hidden("category", view.category),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_blocked_url(url: &str) -> bool {
    // Browsers ignore tabs, newlines and leading controls inside a scheme.
    let lower: String = url
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();
    BLOCKED_PROTOCOLS.iter().any(|proto| lower.starts_with(proto))
}

fn safe_dest(dest: CowStr<'_>) -> CowStr<'_> {
    if is_blocked_url(&dest) {
        CowStr::Borrowed("")
    } else {
        dest
    }
}

fn sanitize_tag(tag: Tag<'_>) -> Tag<'_> {
    match tag {
        Tag::Link(kind, dest, title) => Tag::Link(kind, safe_dest(dest), title),
        Tag::Image(kind, dest, title) => Tag::Image(kind, safe_dest(dest), title),
        other => other,
    }
}

/// Markdown to HTML with raw HTML in the source shown as text and
/// script-capable link targets emptied.
pub fn markdown(text: &str) -> String {
    let parser = Parser::new(text).map(|event| match event {
        Event::Html(raw) => Event::Text(raw),
        Event::Start(tag) => Event::Start(sanitize_tag(tag)),
        Event::End(tag) => Event::End(sanitize_tag(tag)),
        other => other,
    });
    let mut out = String::new();
    html::push_html(&mut out, parser);
    out
}

pub fn transcript(entries: &[Entry]) -> String {
    entries
        .iter()
        .map(|entry| match entry {
            Entry::Message(msg) => {
                let body = match msg.role {
                    Role::Assistant => markdown(&msg.content),
                    _ => escape(&msg.content),
                };
                format!(
                    "<div class=\"chat-msg chat-{}\">{}</div>",
                    msg.role.as_str(),
                    body
                )
            }
            Entry::Loading { text, .. } => format!(
                "<div class=\"chat-msg chat-assistant loading\">{}</div>",
                escape(text)
            ),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn category_options(categories: &[&str], current: &str) -> String {
    let current = if current.is_empty() { ALL_CATEGORIES } else { current };
    std::iter::once((ALL_CATEGORIES, "All Categories".to_string()))
        .chain(categories.iter().map(|c| (*c, title_case(c))))
        .map(|(value, label)| {
            format!(
                "<option value=\"{}\"{}>{}</option>",
                escape(value),
                if value == current { " selected" } else { "" },
                escape(&label)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Product area: load error, loading, or the grid for the current filter.
pub fn products_area(
    catalog: &CatalogStore,
    load_error: Option<&str>,
    view: &ViewState,
) -> String {
    match load_error {
        Some(err) => placeholder(err),
        None if !catalog.is_loaded() => placeholder(LOADING_CATALOG),
        None => filtered(catalog.all(), view),
    }
}

pub fn page(
    catalog: &CatalogStore,
    load_error: Option<&str>,
    entries: &[Entry],
    view: &ViewState,
) -> String {
    let disabled = if view.in_flight { " disabled" } else { "" };
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Product Routine Builder</title>
<link rel="stylesheet" href="style.css">
</head>
<body>
<div class="page-wrapper">
<header class="site-header"><h1 class="site-title">Smart Routine &amp; Product Advisor</h1></header>
<form class="search-section" method="get" action="/">
  <select id="categoryFilter" name="category" onchange="this.form.submit()">
{options}
  </select>
  <noscript><button type="submit">Filter</button></noscript>
</form>
<div id="productsContainer" class="products-container">
{products}
</div>
<div class="selected-products">
  <h2>Selected Products</h2>
  <div id="selectedProductsList">
{selected}
  </div>
  <form method="post" action="/generate">{cat_field}<button id="generateRoutine" class="generate-btn" type="submit"{disabled}>Generate Routine</button></form>
</div>
<section class="chat-section">
  <h2>Let's Build Your Routine</h2>
  <div id="chatWindow" class="chat-window">
{transcript}
  </div>
  <form id="chatForm" class="chat-form" method="post" action="/chat">
    {cat_field}
    <input type="text" id="userInput" name="message" placeholder="Ask me about products or routines…" required>
    <button type="submit" id="sendBtn"{disabled}>Send</button>
  </form>
</section>
</div>
</body>
</html>
"#,
        options = category_options(&catalog.categories(), view.category),
        products = products_area(catalog, load_error, view),
        selected = selected_list(catalog, view),
        cat_field = hidden("category", view.category),
        disabled = disabled,
        transcript = transcript(entries),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::sample_product;
    use crate::chat::ChatMessage;

    fn view<'a>(
        selection: &'a SelectionSet,
        expanded: &'a ExpandState,
        category: &'a str,
    ) -> ViewState<'a> {
        ViewState {
            selection,
            expanded,
            category,
            in_flight: false,
        }
    }

    fn products() -> Vec<Product> {
        vec![
            sample_product(1, "Shampoo", "hair care"),
            sample_product(2, "Cleanser", "cleanser"),
            sample_product(3, "Conditioner", "hair care"),
        ]
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("hair care"), "Hair Care");
        assert_eq!(title_case("suncare"), "Suncare");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn test_grouped_keeps_first_seen_order() {
        let sel = SelectionSet::default();
        let exp = ExpandState::default();
        let out = grouped(&products(), &view(&sel, &exp, "all"));

        let hair = out.find("Hair Care").unwrap();
        let cleanser = out.find("<h3 class=\"category-header\">Cleanser").unwrap();
        assert!(hair < cleanser);
        assert_eq!(out.matches("category-section").count(), 2);
    }

    #[test]
    fn test_filtered_falls_back_to_grouped() {
        let sel = SelectionSet::default();
        let exp = ExpandState::default();
        let all = filtered(&products(), &view(&sel, &exp, "all"));
        let empty = filtered(&products(), &view(&sel, &exp, ""));
        assert!(all.contains("category-section"));
        assert_eq!(all, empty);
    }

    #[test]
    fn test_filtered_matches_in_order() {
        let sel = SelectionSet::default();
        let exp = ExpandState::default();
        let out = filtered(&products(), &view(&sel, &exp, "hair care"));
        assert!(!out.contains("category-section"));
        assert!(!out.contains("Cleanser"));
        assert!(out.find("Shampoo").unwrap() < out.find("Conditioner").unwrap());
    }

    #[test]
    fn test_empty_filter_distinct_from_empty_catalog() {
        let sel = SelectionSet::default();
        let exp = ExpandState::default();
        let no_match = filtered(&products(), &view(&sel, &exp, "fragrance"));
        let no_products = filtered(&[], &view(&sel, &exp, "all"));
        assert!(no_match.contains(EMPTY_FILTER));
        assert!(no_products.contains(EMPTY_CATALOG));
        assert_ne!(no_match, no_products);
    }

    #[test]
    fn test_card_reflects_selection_and_expand() {
        let store = CatalogStore::from_products(products());
        let mut ctl = crate::selection::SelectionController::new();
        ctl.toggle(2);
        ctl.handle(crate::selection::Input::ExpandClick { id: 1 });

        let v = view(ctl.selection(), ctl.expanded(), "all");
        let out = grouped(store.all(), &v);
        assert_eq!(out.matches("is-selected").count(), 1);
        assert!(out.contains(r#"<article class="product-card is-selected" data-category="cleanser" data-id="2">"#));
        assert!(out.contains(r#"<article class="product-card is-expanded" data-category="hair care" data-id="1">"#));
        assert_eq!(grid_selection(store.all(), ctl.selection()), vec![2]);
    }

    #[test]
    fn test_card_escapes_and_falls_back_on_alt() {
        let mut p = sample_product(7, "", "cleanser");
        p.brand = "Tom & Co <b>".into();
        p.description = None;
        let sel = SelectionSet::default();
        let exp = ExpandState::default();
        let out = card(&p, &view(&sel, &exp, "all"));
        assert!(out.contains(r#"alt="Tom &amp; Co &lt;b&gt;""#));
        assert!(out.contains(r#"<div id="desc-7" class="product-desc"></div>"#));
    }

    #[test]
    fn test_selected_list_skips_stale_ids() {
        let store = CatalogStore::from_products(products());
        let mut ctl = crate::selection::SelectionController::new();
        ctl.toggle(3);
        ctl.toggle(404);
        let out = selected_list(&store, &view(ctl.selection(), ctl.expanded(), "all"));
        assert_eq!(out.matches("selected-item").count(), 1);
        assert!(out.contains("Remove Conditioner"));
        assert!(out.contains(r#"name="kind" value="remove""#));
    }

    #[test]
    fn test_transcript_renders_markdown_for_assistant_only() {
        let entries = vec![
            Entry::Message(ChatMessage::user("**raw** <i>")),
            Entry::Message(ChatMessage::assistant("**AM**: use X <script>")),
            Entry::Loading { token: 1, text: "Generating routine…".into() },
        ];
        let out = transcript(&entries);
        assert!(out.contains("**raw** &lt;i&gt;"));
        assert!(out.contains("<strong>AM</strong>"));
        assert!(!out.contains("<script>"));
        assert!(out.contains("chat-assistant loading"));
    }

    #[test]
    fn test_markdown_drops_script_links() {
        let out = markdown("[click](javascript:alert(document.cookie)) and ![x](JavaScript:alert(1))");
        assert!(!out.to_ascii_lowercase().contains("javascript:"));
        assert!(out.contains(r#"<a href="">click</a>"#));

        let out = markdown("[a](data:text/html,boom) [b]( vbscript:msgbox )");
        assert!(!out.contains("data:text"));
        assert!(!out.contains("vbscript"));

        let out = markdown("[docs](https://example.com/routine)");
        assert!(out.contains(r#"<a href="https://example.com/routine">docs</a>"#));
    }

    #[test]
    fn test_empty_filter_renders_as_all() {
        let sel = SelectionSet::default();
        let exp = ExpandState::default();
        let out = filtered(&products(), &view(&sel, &exp, ""));
        assert!(out.contains(r#"name="category" value="all""#));
        assert!(!out.contains(r#"name="category" value="""#));
    }

    #[test]
    fn test_category_options() {
        let out = category_options(&["hair care", "cleanser"], "cleanser");
        assert!(out.contains(r#"<option value="all">All Categories</option>"#));
        assert!(out.contains(r#"<option value="cleanser" selected>Cleanser</option>"#));
        assert!(out.find("Hair Care").unwrap() < out.find(">Cleanser").unwrap());
    }

    #[test]
    fn test_page_disables_controls_in_flight() {
        let store = CatalogStore::from_products(products());
        let sel = SelectionSet::default();
        let exp = ExpandState::default();
        let mut v = view(&sel, &exp, "all");
        v.in_flight = true;
        let out = page(&store, None, &[], &v);
        assert!(out.contains(r#"type="submit" disabled>Generate Routine"#));

        let err = page(&store, Some("Unable to load products: boom"), &[], &view(&sel, &exp, "all"));
        assert!(err.contains("Unable to load products: boom"));
        assert!(!err.contains("product-card"));
    }
}
