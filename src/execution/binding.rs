//! `{{ expression }}` templates embedded in string props.

use std::collections::BTreeSet;

use serde_json::Value;

use super::expr::{self, ExpressionEvaluator, KEYWORDS, Scope, Token, TokenKind};
use crate::error::EvalError;

/// Identifier that resolves to the root node's global data map.
pub const GLOBAL_DATA: &str = "globalData";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSegment {
    Literal(String),
    Binding(String),
}

/// True when `raw` contains at least one complete `{{ }}` pair.
pub fn is_dynamic(raw: &str) -> bool {
    parse_template(raw)
        .iter()
        .any(|segment| matches!(segment, TemplateSegment::Binding(_)))
}

/// Split a template into literal text and binding bodies. An unclosed `{{`
/// stays literal.
pub fn parse_template(raw: &str) -> Vec<TemplateSegment> {
    let mut segments = Vec::new();
    let mut rest = raw;
    while let Some(open) = rest.find("{{") {
        let Some(close) = rest[open + 2..].find("}}") else {
            break;
        };
        if open > 0 {
            segments.push(TemplateSegment::Literal(rest[..open].to_string()));
        }
        let body = &rest[open + 2..open + 2 + close];
        segments.push(TemplateSegment::Binding(body.trim().to_string()));
        rest = &rest[open + 2 + close + 2..];
    }
    if !rest.is_empty() {
        segments.push(TemplateSegment::Literal(rest.to_string()));
    }
    segments
}

/// Evaluate a template. A template that is exactly one binding yields the raw
/// value; anything else interpolates to a string.
pub fn evaluate_template(
    raw: &str,
    evaluator: &dyn ExpressionEvaluator,
    scope: &dyn Scope,
) -> Result<Value, EvalError> {
    let segments = parse_template(raw);
    if let [TemplateSegment::Binding(body)] = segments.as_slice() {
        return evaluator.evaluate(body, scope);
    }
    let mut out = String::new();
    for segment in &segments {
        match segment {
            TemplateSegment::Literal(text) => out.push_str(text),
            TemplateSegment::Binding(body) => {
                out.push_str(&expr::display(&evaluator.evaluate(body, scope)?))
            }
        }
    }
    Ok(Value::String(out))
}

/// Indexes of identifier tokens that start a reference chain (not a member
/// name after `.`, not a keyword).
fn head_identifiers(tokens: &[Token]) -> Vec<usize> {
    tokens
        .iter()
        .enumerate()
        .filter(|(index, token)| match &token.kind {
            TokenKind::Ident(name) => {
                !KEYWORDS.contains(&name.as_str())
                    && !(*index > 0 && tokens[index - 1].kind == TokenKind::Punct("."))
            }
            _ => false,
        })
        .map(|(index, _)| index)
        .collect()
}

/// Head identifiers referenced by the bindings of `raw`. Unparsable bodies
/// contribute nothing; their errors surface at evaluation.
pub fn extract_references(raw: &str) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for segment in parse_template(raw) {
        let TemplateSegment::Binding(body) = segment else {
            continue;
        };
        let Ok(tokens) = expr::tokenize(&body) else {
            continue;
        };
        for index in head_identifiers(&tokens) {
            if let TokenKind::Ident(name) = &tokens[index].kind {
                names.insert(name.clone());
            }
        }
    }
    names
}

/// What a rename rewrites inside binding bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameKind {
    /// Head identifiers naming a component or action.
    DisplayName,
    /// Member names directly after `globalData.`.
    GlobalDataKey,
}

/// Rewrite references to `old` as `new` inside every binding of `raw`.
/// Literal text and string literals inside bindings are never touched.
pub fn rename_references(raw: &str, old: &str, new: &str, kind: RenameKind) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(open) = rest.find("{{") {
        let Some(close) = rest[open + 2..].find("}}") else {
            break;
        };
        let body_start = open + 2;
        let body = &rest[body_start..body_start + close];
        out.push_str(&rest[..body_start]);
        out.push_str(&rename_in_body(body, old, new, kind));
        out.push_str("}}");
        rest = &rest[body_start + close + 2..];
    }
    out.push_str(rest);
    out
}

fn rename_in_body(body: &str, old: &str, new: &str, kind: RenameKind) -> String {
    let Ok(tokens) = expr::tokenize(body) else {
        return body.to_string();
    };
    let targets: Vec<&Token> = match kind {
        RenameKind::DisplayName => head_identifiers(&tokens)
            .into_iter()
            .map(|index| &tokens[index])
            .filter(|token| token.kind == TokenKind::Ident(old.to_string()))
            .collect(),
        RenameKind::GlobalDataKey => tokens
            .windows(3)
            .filter(|w| {
                w[0].kind == TokenKind::Ident(GLOBAL_DATA.to_string())
                    && w[1].kind == TokenKind::Punct(".")
                    && w[2].kind == TokenKind::Ident(old.to_string())
            })
            .map(|w| &w[2])
            .collect(),
    };
    let mut out = String::with_capacity(body.len());
    let mut cursor = 0;
    for token in targets {
        out.push_str(&body[cursor..token.start]);
        out.push_str(new);
        cursor = token.end;
    }
    out.push_str(&body[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::expr::DefaultEvaluator;
    use serde_json::{Map, json};

    #[test]
    fn splits_literals_and_bindings() {
        assert_eq!(
            parse_template("Hi {{ user.name }}!"),
            vec![
                TemplateSegment::Literal("Hi ".into()),
                TemplateSegment::Binding("user.name".into()),
                TemplateSegment::Literal("!".into()),
            ]
        );
        assert!(!is_dynamic("plain {{ open"));
        assert!(is_dynamic("{{a}}"));
    }

    #[test]
    fn single_binding_keeps_the_value_type() {
        let mut scope = Map::new();
        scope.insert("input1".into(), json!({"value": 4}));
        let value = evaluate_template("{{ input1.value }}", &DefaultEvaluator, &scope).unwrap();
        assert_eq!(value, json!(4));
        let text = evaluate_template("n={{ input1.value }}", &DefaultEvaluator, &scope).unwrap();
        assert_eq!(text, json!("n=4"));
    }

    #[test]
    fn references_skip_members_keywords_and_strings() {
        let refs = extract_references("{{ input1.value + list1.data[input2.index] }} {{ 'input9' || true }}");
        let refs: Vec<&str> = refs.iter().map(String::as_str).collect();
        assert_eq!(refs, vec!["input1", "input2", "list1"]);
    }

    #[test]
    fn rename_only_touches_bindings() {
        let raw = "input1 says {{ input1.value + input10.value + 'input1' + a.input1 }}";
        let renamed = rename_references(raw, "input1", "input2", RenameKind::DisplayName);
        assert_eq!(
            renamed,
            "input1 says {{ input2.value + input10.value + 'input1' + a.input1 }}"
        );
        assert_eq!(
            rename_references(&renamed, "input2", "input1", RenameKind::DisplayName),
            raw
        );
    }

    #[test]
    fn global_key_rename_is_scoped() {
        let raw = "{{ globalData.count + count.value }}";
        assert_eq!(
            rename_references(raw, "count", "total", RenameKind::GlobalDataKey),
            "{{ globalData.total + count.value }}"
        );
    }
}
