//! Locate and strip the protocol parameters the provider appends to the
//! redirect URI.
//!
//! Providers put them in the query (`response_mode=query`) or the fragment
//! (`response_mode=fragment`). Everything that is not one of the reserved
//! parameters is left byte-for-byte as it was.

use std::collections::HashMap;

/// Parameters owned by the authorization response.
pub const RESERVED_PARAMS: &[&str] = &["code", "state", "error", "session_state"];

/// Which part of the address carried the parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamLocation {
    Query,
    Fragment,
}

/// The authorization response found in an address.
#[derive(Debug, Clone)]
pub struct CallbackParams {
    href: String,
    location: Option<ParamLocation>,
    params: HashMap<String, String>,
}

impl CallbackParams {
    pub fn parse(href: &str) -> Self {
        let parts = AddressParts::split(href);

        let (location, params) = if has_reserved(parts.query) {
            (Some(ParamLocation::Query), decode(parts.query))
        } else if has_reserved(parts.fragment) {
            (Some(ParamLocation::Fragment), decode(parts.fragment))
        } else {
            (None, HashMap::new())
        };

        Self {
            href: href.to_string(),
            location,
            params,
        }
    }

    pub fn location(&self) -> Option<ParamLocation> {
        self.location
    }

    /// All parameters of the location that held the response. Empty when the
    /// address carried no response.
    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn code(&self) -> Option<&str> {
        self.get("code")
    }

    pub fn state(&self) -> Option<&str> {
        self.get("state")
    }

    pub fn error(&self) -> Option<&str> {
        self.get("error")
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// The address with the reserved parameters removed from whichever part
    /// carried them.
    pub fn scrub(&self) -> String {
        let parts = AddressParts::split(&self.href);
        match self.location {
            None => self.href.clone(),
            Some(ParamLocation::Query) => {
                let mut out = parts.base.to_string();
                push_section(&mut out, '?', &strip_reserved(parts.query.unwrap_or_default()));
                if let Some(fragment) = parts.fragment {
                    out.push('#');
                    out.push_str(fragment);
                }
                out
            },
            Some(ParamLocation::Fragment) => {
                let mut out = parts.base.to_string();
                if let Some(query) = parts.query {
                    out.push('?');
                    out.push_str(query);
                }
                push_section(
                    &mut out,
                    '#',
                    &strip_reserved(parts.fragment.unwrap_or_default()),
                );
                out
            },
        }
    }
}

/// Address with the protocol parameters removed. No-op when there are none.
pub fn scrub(href: &str) -> String {
    CallbackParams::parse(href).scrub()
}

/// Raw slices of an address. `query` and `fragment` exclude their separator.
struct AddressParts<'a> {
    base: &'a str,
    query: Option<&'a str>,
    fragment: Option<&'a str>,
}

impl<'a> AddressParts<'a> {
    fn split(href: &'a str) -> Self {
        let (before_fragment, fragment) = match href.split_once('#') {
            Some((before, fragment)) => (before, Some(fragment)),
            None => (href, None),
        };
        let (base, query) = match before_fragment.split_once('?') {
            Some((base, query)) => (base, Some(query)),
            None => (before_fragment, None),
        };
        Self {
            base,
            query,
            fragment,
        }
    }
}

fn param_name(pair: &str) -> &str {
    pair.split_once('=').map_or(pair, |(name, _)| name)
}

fn is_reserved(pair: &str) -> bool {
    RESERVED_PARAMS.contains(&param_name(pair))
}

fn has_reserved(section: Option<&str>) -> bool {
    section.is_some_and(|s| s.split('&').any(is_reserved))
}

fn decode(section: Option<&str>) -> HashMap<String, String> {
    section
        .map(|s| {
            url::form_urlencoded::parse(s.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default()
}

/// Each removed pair takes one `&` with it. Empty pairs are kept.
fn strip_reserved(section: &str) -> String {
    section
        .split('&')
        .filter(|pair| !is_reserved(pair))
        .collect::<Vec<_>>()
        .join("&")
}

fn push_section(out: &mut String, separator: char, section: &str) {
    if !section.is_empty() {
        out.push(separator);
        out.push_str(section);
    }
}
