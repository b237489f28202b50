//! `Link` header parsing (RFC 8288 subset)

use reqwest::header::{HeaderMap, LINK};

/// One `<target>; rel="..."` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkValue {
    pub target: String,
    pub rels: Vec<String>,
}

impl LinkValue {
    #[must_use]
    pub fn has_rel(&self, rel: &str) -> bool {
        self.rels.iter().any(|r| r.eq_ignore_ascii_case(rel))
    }
}

/// Parse every entry in a `Link` header value
///
/// Entries without a `<...>` target are skipped. Commas inside the target
/// do not split entries.
#[must_use]
pub fn parse_link_header(value: &str) -> Vec<LinkValue> {
    let mut links = Vec::new();
    let mut rest = value;

    while let Some(open) = rest.find('<') {
        let after_open = &rest[open + 1..];
        let Some(close) = after_open.find('>') else { break };
        let target = after_open[..close].trim().to_string();
        let params_and_more = &after_open[close + 1..];

        // Params run until the next entry's '<' (or the end)
        let params_end = params_and_more.find('<').unwrap_or(params_and_more.len());
        let params = &params_and_more[..params_end];

        let rels = params
            .split(';')
            .filter_map(|param| {
                let (name, value) = param.split_once('=')?;
                name.trim().eq_ignore_ascii_case("rel").then(|| value.trim().trim_end_matches(',').trim())
            })
            .flat_map(|value| value.trim_matches('"').split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .collect();

        links.push(LinkValue { target, rels });
        rest = &params_and_more[params_end..];
    }

    links
}

/// Target of the `rel="next"` link across all `Link` headers, if any
#[must_use]
pub fn next_link(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(parse_link_header)
        .find(|link| link.has_rel("next"))
        .map(|link| link.target)
}
