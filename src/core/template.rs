// src/core/template.rs
// `$name` / `${name}` references inside filter values.

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Literal(String),
    Reference(String),
}

pub fn tokenize(template: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = template.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '$' => {
                match chars.peek() {
                    Some(&'{') => {
                        chars.next(); // Consume '{'
                        let mut name = String::new();
                        let mut closed = false;

                        while let Some(next) = chars.next() {
                            if next == '}' {
                                closed = true;
                                break;
                            }
                            name.push(next);
                        }

                        let trimmed = name.trim();
                        if closed && !trimmed.is_empty() {
                            flush(&mut literal, &mut segments);
                            segments.push(Segment::Reference(trimmed.to_string()));
                        } else {
                            // Unclosed or empty braces stay literal
                            literal.push_str("${");
                            literal.push_str(&name);
                            if closed {
                                literal.push('}');
                            }
                        }
                    }
                    Some(&next) if next.is_alphabetic() || next == '_' => {
                        let mut name = String::new();
                        while let Some(&next) = chars.peek() {
                            if next.is_alphanumeric() || next == '_' {
                                name.push(next);
                                chars.next();
                            } else {
                                break;
                            }
                        }
                        flush(&mut literal, &mut segments);
                        segments.push(Segment::Reference(name));
                    }
                    _ => literal.push('$'),
                }
            }
            '\\' => {
                match chars.peek() {
                    Some(&next) if next == '$' || next == '\\' => {
                        literal.push(next);
                        chars.next();
                    }
                    _ => literal.push('\\'),
                }
            }
            _ => literal.push(ch),
        }
    }

    flush(&mut literal, &mut segments);
    segments
}

fn flush(literal: &mut String, segments: &mut Vec<Segment>) {
    if !literal.is_empty() {
        segments.push(Segment::Literal(std::mem::take(literal)));
    }
}

/// Referenced names in order of first appearance, without duplicates.
pub fn extract_references(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for segment in tokenize(template) {
        if let Segment::Reference(name) = segment {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

/// The single name when the whole template is one reference (`"$host"`).
pub fn sole_reference(template: &str) -> Option<String> {
    match tokenize(template.trim()).as_slice() {
        [Segment::Reference(name)] => Some(name.clone()),
        _ => None,
    }
}

/// Replace references with `lookup`'s answer; unknown references are left as written.
pub fn substitute<F>(template: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = String::new();
    for segment in tokenize(template) {
        match segment {
            Segment::Literal(text) => result.push_str(&text),
            Segment::Reference(name) => match lookup(&name) {
                Some(value) => result.push_str(&value),
                None => {
                    result.push('$');
                    result.push_str(&name);
                }
            },
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_references() {
        let result = extract_references("$region-${ zone }-$region");
        assert_eq!(result, vec!["region".to_string(), "zone".to_string()]);
    }

    #[test]
    fn test_literal_dollars() {
        assert!(extract_references("costs $5 or \\$region").is_empty());
        assert!(extract_references("${unclosed").is_empty());
    }

    #[test]
    fn test_substitute() {
        let rendered = substitute("prefix-$region/${host}/$missing", |name| match name {
            "region" => Some("eu".to_string()),
            "host" => Some("web-1".to_string()),
            _ => None,
        });
        assert_eq!(rendered, "prefix-eu/web-1/$missing");
    }

    #[test]
    fn test_sole_reference() {
        assert_eq!(sole_reference(" $region "), Some("region".to_string()));
        assert_eq!(sole_reference("${region}"), Some("region".to_string()));
        assert_eq!(sole_reference("x-$region"), None);
    }
}
