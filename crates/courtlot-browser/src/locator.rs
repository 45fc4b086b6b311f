//! Element locators and their XPath translation.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Button,
    Link,
    Textbox,
}

/// How to find an element on a page.
///
/// Role and label names match as substrings of the whitespace-normalised
/// accessible text unless `exact` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Role {
        role: Role,
        name: String,
        exact: bool,
    },
    Label(String),
    Text(String),
    Css(String),
}

impl Locator {
    pub fn button(name: impl Into<String>) -> Self {
        Self::Role {
            role: Role::Button,
            name: name.into(),
            exact: false,
        }
    }

    pub fn link(name: impl Into<String>) -> Self {
        Self::Role {
            role: Role::Link,
            name: name.into(),
            exact: false,
        }
    }

    pub fn link_exact(name: impl Into<String>) -> Self {
        Self::Role {
            role: Role::Link,
            name: name.into(),
            exact: true,
        }
    }

    pub fn textbox(name: impl Into<String>) -> Self {
        Self::Role {
            role: Role::Textbox,
            name: name.into(),
            exact: false,
        }
    }

    pub fn label(name: impl Into<String>) -> Self {
        Self::Label(name.into())
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    /// XPath equivalent, or `None` for CSS locators.
    pub fn to_xpath(&self) -> Option<String> {
        match self {
            Self::Role { role, name, exact } => {
                let text = matcher("normalize-space(.)", name, *exact);
                let xpath = match role {
                    Role::Button => format!(
                        "//button[{text}] | //input[(@type='button' or @type='submit') and {value}] | //*[@role='button' and {text}]",
                        value = matcher("@value", name, *exact),
                    ),
                    Role::Link => format!("//a[{text}] | //*[@role='link' and {text}]"),
                    Role::Textbox => format!(
                        "//input[(not(@type) or @type='text' or @type='password' or @type='number' or @type='tel' or @type='email') and ({labelled})] | //textarea[{labelled}]",
                        labelled = labelled_by(name, *exact),
                    ),
                };
                Some(xpath)
            }
            Self::Label(name) => Some(format!("//*[{}]", labelled_by(name, false))),
            Self::Text(text) => Some(format!(
                "//*[{}]",
                matcher("normalize-space(text())", text, false)
            )),
            Self::Css(_) => None,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Role { role, name, .. } => write!(f, "{role:?} {name:?}"),
            Self::Label(name) => write!(f, "label {name:?}"),
            Self::Text(text) => write!(f, "text {text:?}"),
            Self::Css(selector) => write!(f, "css {selector}"),
        }
    }
}

fn matcher(subject: &str, name: &str, exact: bool) -> String {
    let literal = xpath_literal(name.trim());
    if exact {
        format!("{subject}={literal}")
    } else {
        format!("contains({subject}, {literal})")
    }
}

/// Elements named by `aria-label` or by a `<label for=...>` pointing at them.
fn labelled_by(name: &str, exact: bool) -> String {
    format!(
        "{} or @id=//label[{}]/@for",
        matcher("@aria-label", name, exact),
        matcher("normalize-space(.)", name, exact)
    )
}

/// Quote `s` as an XPath 1.0 string literal. XPath has no escapes, so a value
/// holding both quote kinds is assembled with `concat()`.
pub(crate) fn xpath_literal(s: &str) -> String {
    if !s.contains('\'') {
        return format!("'{s}'");
    }
    if !s.contains('"') {
        return format!("\"{s}\"");
    }
    let parts: Vec<String> = s
        .split('\'')
        .map(|part| format!("'{part}'"))
        .collect();
    format!("concat({})", parts.join(", \"'\", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_plain() {
        assert_eq!(xpath_literal("翌週"), "'翌週'");
    }

    #[test]
    fn literal_with_single_quote() {
        assert_eq!(xpath_literal("it's"), "\"it's\"");
    }

    #[test]
    fn literal_with_both_quotes() {
        assert_eq!(xpath_literal(r#"a'b"c"#), r#"concat('a', "'", 'b"c')"#);
    }

    #[test]
    fn button_matches_text_and_input_value() {
        let xpath = Locator::button("ログイン").to_xpath().unwrap();
        assert!(xpath.starts_with("//button[contains(normalize-space(.), 'ログイン')]"));
        assert!(xpath.contains("contains(@value, 'ログイン')"));
    }

    #[test]
    fn exact_link_uses_equality() {
        let xpath = Locator::link_exact("抽選申込み").to_xpath().unwrap();
        assert!(xpath.contains("normalize-space(.)='抽選申込み'"));
        assert!(!xpath.contains("contains("));
    }

    #[test]
    fn label_follows_label_for() {
        let xpath = Locator::label("施設必須").to_xpath().unwrap();
        assert!(xpath.contains("@id=//label[contains(normalize-space(.), '施設必須')]/@for"));
    }

    #[test]
    fn css_has_no_xpath() {
        assert!(Locator::css("#usedate-table").to_xpath().is_none());
    }

    #[test]
    fn names_are_trimmed() {
        let xpath = Locator::button(" 申込み").to_xpath().unwrap();
        assert!(xpath.contains("'申込み'"));
    }
}
