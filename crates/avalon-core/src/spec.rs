//! Producer-spec grammar: `[count]title[weight][{uri[,uri]*}]`.
//!
//! `10snort1000` selects ten parallel snort instances sharing weight 1000;
//! `asa{file://tag.map}` attaches an inline mapping to that producer only.
//! Leading digits are the instance count, trailing digits the weight; both
//! default to 1.

use crate::error::AvalonError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerSpec {
    /// Parallel instances of this model, each with its own state.
    pub count: u32,
    /// Model title looked up in the registry.
    pub title: String,
    /// Relative emission share of this producer group.
    pub weight: u32,
    /// Mapping URIs applied to this producer only, in declared order.
    pub inline_mappings: Vec<String>,
}

/// Parse a list of CLI tokens into producer specs.
///
/// Each token is whitespace-split first, so a single quoted argument such as
/// `"snort3 asa1"` carries several specs.
pub fn parse_producer_specs(tokens: &[String]) -> Result<Vec<ProducerSpec>, AvalonError> {
    let mut specs = Vec::new();
    for token in tokens {
        for word in token.split_whitespace() {
            specs.push(parse_one(word)?);
        }
    }
    if specs.is_empty() {
        return Err(AvalonError::config("no models specified"));
    }
    Ok(specs)
}

fn bad(word: &str, why: &str) -> AvalonError {
    AvalonError::config(format!("malformed model spec `{word}`: {why}"))
}

fn parse_one(word: &str) -> Result<ProducerSpec, AvalonError> {
    // Split off the optional `{uri,uri}` suffix first.
    let (body, inline_mappings) = match word.find('{') {
        Some(pos) => {
            let inner = word[pos..]
                .strip_prefix('{')
                .and_then(|rest| rest.strip_suffix('}'))
                .ok_or_else(|| bad(word, "unbalanced `{`"))?;
            let uris: Vec<String> = inner
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            if uris.is_empty() {
                return Err(bad(word, "empty mapping list"));
            }
            (&word[..pos], uris)
        }
        None => (word, Vec::new()),
    };

    let head = body.len() - body.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    let tail = body.len() - body.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if head == body.len() {
        return Err(bad(word, "missing model title"));
    }

    let count: u32 = if head == 0 {
        1
    } else {
        body[..head].parse().map_err(|_| bad(word, "instance count out of range"))?
    };
    let weight: u32 = if tail == 0 {
        1
    } else {
        body[body.len() - tail..].parse().map_err(|_| bad(word, "weight out of range"))?
    };
    if count == 0 {
        return Err(bad(word, "instance count must be at least 1"));
    }
    if weight == 0 {
        return Err(bad(word, "weight must be at least 1"));
    }

    let title = &body[head..body.len() - tail];
    let mut chars = title.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return Err(bad(word, "title must start with a letter")),
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(bad(word, "title may contain letters, digits, `_`, and `-`"));
    }

    Ok(ProducerSpec { count, title: title.to_string(), weight, inline_mappings })
}
