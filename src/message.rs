use serde_sarif::sarif::{Message as SarifMessage, ReportingDescriptor};

use crate::model::Message;

/// Render a SARIF message into plain-text and HTML variants.
///
/// Message templates (`message.id`) are looked up in the rule's
/// `messageStrings`, `{N}` placeholders take `arguments[N]`, and embedded
/// links `[label](target)` become the bare label in text and an anchor in HTML.
pub(crate) fn render_message(message: &SarifMessage, rule: Option<&ReportingDescriptor>) -> Message {
    let template = message
        .text
        .clone()
        .or_else(|| template_from_rule(message.id.as_deref()?, rule?))
        .unwrap_or_default();
    let arguments = message.arguments.as_deref().unwrap_or(&[]);
    render_links(&substitute_arguments(&template, arguments))
}

fn template_from_rule(id: &str, rule: &ReportingDescriptor) -> Option<String> {
    let strings = rule.message_strings.as_ref()?;
    strings.get(id).map(|entry| entry.text.clone())
}

/// Replace `{N}` placeholders; `{{` and `}}` are literal braces.
pub(crate) fn substitute_arguments(template: &str, arguments: &[String]) -> String {
    let chars: Vec<char> = template.chars().collect();
    let mut out = String::with_capacity(template.len());
    let mut index = 0;
    while index < chars.len() {
        let current = chars[index];
        let next = chars.get(index + 1).copied();
        match (current, next) {
            ('{', Some('{')) | ('}', Some('}')) => {
                out.push(current);
                index += 2;
            }
            ('{', _) => {
                let digits: String = chars[index + 1..]
                    .iter()
                    .take_while(|c| c.is_ascii_digit())
                    .collect();
                let close = index + 1 + digits.len();
                let argument = digits
                    .parse::<usize>()
                    .ok()
                    .filter(|_| chars.get(close) == Some(&'}'))
                    .and_then(|position| arguments.get(position));
                match argument {
                    Some(argument) => {
                        out.push_str(argument);
                        index = close + 1;
                    }
                    None => {
                        out.push(current);
                        index += 1;
                    }
                }
            }
            _ => {
                out.push(current);
                index += 1;
            }
        }
    }
    out
}

fn render_links(source: &str) -> Message {
    let chars: Vec<char> = source.chars().collect();
    let mut text = String::with_capacity(source.len());
    let mut html = String::with_capacity(source.len());
    let mut index = 0;
    while index < chars.len() {
        let current = chars[index];
        if current == '\\' && matches!(chars.get(index + 1), Some('[' | ']')) {
            let literal = chars[index + 1];
            text.push(literal);
            push_escaped(&mut html, literal);
            index += 2;
            continue;
        }
        if current == '[' {
            if let Some(link) = parse_link(&chars, index) {
                text.push_str(&link.label);
                html.push_str(&link.anchor());
                index = link.next;
                continue;
            }
        }
        text.push(current);
        push_escaped(&mut html, current);
        index += 1;
    }
    Message { text, html }
}

struct Link {
    label: String,
    target: String,
    next: usize,
}

impl Link {
    fn anchor(&self) -> String {
        let mut label = String::new();
        for c in self.label.chars() {
            push_escaped(&mut label, c);
        }
        if let Ok(location_id) = self.target.trim().parse::<i64>() {
            return format!("<a href=\"#\" data-location-id=\"{location_id}\">{label}</a>");
        }
        let mut target = String::new();
        for c in self.target.chars() {
            push_escaped(&mut target, c);
        }
        format!("<a href=\"{target}\">{label}</a>")
    }
}

fn parse_link(chars: &[char], start: usize) -> Option<Link> {
    let mut index = start + 1;
    let mut label = String::new();
    loop {
        match *chars.get(index)? {
            '\\' if matches!(chars.get(index + 1), Some('[' | ']')) => {
                label.push(chars[index + 1]);
                index += 2;
            }
            '[' => return None,
            ']' => break,
            c => {
                label.push(c);
                index += 1;
            }
        }
    }
    if chars.get(index + 1) != Some(&'(') {
        return None;
    }
    let close = (index + 2..chars.len()).find(|&position| chars[position] == ')')?;
    Some(Link {
        label,
        target: chars[index + 2..close].iter().collect(),
        next: close + 1,
    })
}

fn push_escaped(out: &mut String, c: char) {
    match c {
        '&' => out.push_str("&amp;"),
        '<' => out.push_str("&lt;"),
        '>' => out.push_str("&gt;"),
        '"' => out.push_str("&quot;"),
        '\'' => out.push_str("&#39;"),
        c => out.push(c),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sarif_message(value: serde_json::Value) -> SarifMessage {
        serde_json::from_value(value).expect("message")
    }

    #[test]
    fn plain_text_is_escaped_for_html() {
        let rendered = render_message(&sarif_message(json!({"text": "a < b && c"})), None);

        assert_eq!(rendered.text, "a < b && c");
        assert_eq!(rendered.html, "a &lt; b &amp;&amp; c");
    }

    #[test]
    fn embedded_links_render_as_label_and_anchor() {
        let rendered = render_message(
            &sarif_message(json!({"text": "Tainted [input](1) reaches [sink](https://x.test/a)."})),
            None,
        );

        assert_eq!(rendered.text, "Tainted input reaches sink.");
        assert_eq!(
            rendered.html,
            "Tainted <a href=\"#\" data-location-id=\"1\">input</a> reaches <a href=\"https://x.test/a\">sink</a>."
        );
    }

    #[test]
    fn escaped_brackets_are_literal() {
        let rendered = render_message(&sarif_message(json!({"text": "array\\[0\\](x)"})), None);

        assert_eq!(rendered.text, "array[0](x)");
    }

    #[test]
    fn unterminated_link_is_left_alone() {
        let rendered = render_message(&sarif_message(json!({"text": "see [here"})), None);

        assert_eq!(rendered.text, "see [here");
    }

    #[test]
    fn template_comes_from_rule_message_strings() {
        let rule: ReportingDescriptor = serde_json::from_value(json!({
            "id": "R1",
            "messageStrings": {"default": {"text": "Variable {0} is unused in {1}."}}
        }))
        .expect("rule");
        let message = sarif_message(json!({"id": "default", "arguments": ["x", "main"]}));

        let rendered = render_message(&message, Some(&rule));

        assert_eq!(rendered.text, "Variable x is unused in main.");
    }

    #[test]
    fn placeholders_without_arguments_are_kept() {
        assert_eq!(
            substitute_arguments("{0} and {3} and {{literal}}", &["a".to_string()]),
            "a and {3} and {literal}"
        );
    }
}
