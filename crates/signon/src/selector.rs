/// Represents ways to locate an element on the page
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    /// Plain CSS selector, e.g. `#login_field`
    Css(String),
    /// Element (optionally restricted to a tag) whose visible text contains `text`
    Text { tag: Option<String>, text: String },
    /// Logical OR: the first alternative that matches wins
    Or(Vec<Selector>),
    /// Represents an invalid selector string, with a reason.
    Invalid(String),
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Selector::Css(css) => write!(f, "{css}"),
            Selector::Text { tag: Some(tag), text } => write!(f, "{tag}|{text}"),
            Selector::Text { tag: None, text } => write!(f, "text:{text}"),
            Selector::Or(parts) => {
                let parts: Vec<String> = parts.iter().map(|p| p.to_string()).collect();
                write!(f, "{}", parts.join(" || "))
            }
            Selector::Invalid(reason) => write!(f, "<invalid: {reason}>"),
        }
    }
}

// Controls that count as clickable when a text selector carries no tag.
const CLICKABLE: &str = "button, a, input[type=submit], input[type=button], [role=button]";

impl Selector {
    /// JavaScript expression that evaluates to the matched element or `null`.
    pub fn to_js(&self) -> String {
        match self {
            Selector::Css(css) => format!("document.querySelector({})", js_string(css)),
            Selector::Text { tag, text } => {
                let scope = tag.as_deref().unwrap_or(CLICKABLE);
                format!(
                    "(Array.from(document.querySelectorAll({})).find(el => \
                     String(el.innerText || el.value || el.textContent || '').includes({})) || null)",
                    js_string(scope),
                    js_string(text)
                )
            }
            Selector::Or(parts) => {
                let parts: Vec<String> = parts.iter().map(|p| format!("({})", p.to_js())).collect();
                format!("({} || null)", parts.join(" || "))
            }
            Selector::Invalid(_) => "null".to_string(),
        }
    }
}

fn js_string(s: &str) -> String {
    // serde_json string literals are valid JavaScript string literals
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

fn parse_atomic_selector(s: &str) -> Selector {
    let s = s.trim();

    if s.is_empty() {
        return Selector::Invalid("empty selector".to_string());
    }

    // tag|text, e.g. `button|GitHub`
    if s.contains('|') && !s.contains("||") && s.matches('|').count() == 1 {
        let (tag, text) = s.split_once('|').unwrap_or((s, ""));
        let tag = tag.trim();
        let text = text.trim();
        if text.is_empty() {
            return Selector::Invalid(format!("missing text in '{s}'"));
        }
        return Selector::Text {
            tag: (!tag.is_empty()).then(|| tag.to_string()),
            text: text.to_string(),
        };
    }

    match s {
        _ if s.to_lowercase().starts_with("text:") => {
            let text = s["text:".len()..].trim();
            if text.is_empty() {
                Selector::Invalid("missing text after 'text:'".to_string())
            } else {
                Selector::Text {
                    tag: None,
                    text: text.to_string(),
                }
            }
        }
        _ if s.to_lowercase().starts_with("css:") => Selector::Css(s[4..].trim().to_string()),
        _ => Selector::Css(s.to_string()),
    }
}

impl From<&str> for Selector {
    fn from(s: &str) -> Self {
        let s = s.trim();

        if s.contains("||") {
            let parts: Vec<Selector> = s
                .split("||")
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(parse_atomic_selector)
                .collect();
            if let Some(Selector::Invalid(reason)) =
                parts.iter().find(|p| matches!(p, Selector::Invalid(_)))
            {
                return Selector::Invalid(reason.clone());
            }
            return match parts.len() {
                0 => Selector::Invalid("empty selector".to_string()),
                1 => parts.into_iter().next().unwrap_or(Selector::Invalid(String::new())),
                _ => Selector::Or(parts),
            };
        }

        parse_atomic_selector(s)
    }
}

impl From<String> for Selector {
    fn from(s: String) -> Self {
        Selector::from(s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_css_selector() {
        assert_eq!(
            Selector::from("#login_field"),
            Selector::Css("#login_field".to_string())
        );
        assert_eq!(
            Selector::from("css: input[name='commit']"),
            Selector::Css("input[name='commit']".to_string())
        );
    }

    #[test]
    fn test_tag_with_text() {
        let selector = Selector::from("button|GitHub");
        match selector {
            Selector::Text { tag, text } => {
                assert_eq!(tag.as_deref(), Some("button"));
                assert_eq!(text, "GitHub");
            }
            _ => panic!("Expected Text selector, got: {selector:?}"),
        }
    }

    #[test]
    fn test_text_selector_without_tag() {
        assert_eq!(
            Selector::from("text:Authorize"),
            Selector::Text {
                tag: None,
                text: "Authorize".to_string()
            }
        );
    }

    #[test]
    fn test_or_selector() {
        let selector = Selector::from("#app_totp || input[name='otp']");
        match selector {
            Selector::Or(parts) => {
                assert_eq!(parts.len(), 2);
                assert_eq!(parts[0], Selector::Css("#app_totp".to_string()));
            }
            _ => panic!("Expected Or selector"),
        }
    }

    #[test]
    fn test_invalid_selectors() {
        assert!(matches!(Selector::from(""), Selector::Invalid(_)));
        assert!(matches!(Selector::from("button|"), Selector::Invalid(_)));
        assert!(matches!(Selector::from("text:"), Selector::Invalid(_)));
        assert!(matches!(Selector::from("#a || text:"), Selector::Invalid(_)));
    }

    #[test]
    fn test_display_round_trips_through_parser() {
        for raw in ["#login_field", "button|GitHub", "text:Authorize", "#a || b|c"] {
            let selector = Selector::from(raw);
            assert_eq!(Selector::from(selector.to_string().as_str()), selector);
        }
    }

    #[test]
    fn test_js_escapes_quotes() {
        let js = Selector::from("input[name='commit']").to_js();
        assert_eq!(js, "document.querySelector(\"input[name='commit']\")");

        let js = Selector::from("button|Say \"hi\"").to_js();
        assert!(js.contains(r#""Say \"hi\"""#), "{js}");
        assert!(js.contains(r#"querySelectorAll("button")"#), "{js}");
    }

    #[test]
    fn test_text_without_tag_scopes_to_clickables() {
        let js = Selector::from("text:Authorize").to_js();
        assert!(js.contains("[role=button]"));
    }
}
