//! Minimal SOAP 1.1 codec for the `vboxwebsrv` API.
//!
//! Requests are flat: a method element with one child per argument.
//! Responses are read by element name only, which is all the VirtualBox
//! webservice needs (`returnval` values or a `Fault`).

use vboxvol_shared::errors::{VolumeError, VolumeResult};

const SOAP_ENV_NAMESPACE: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const VBOX_NAMESPACE: &str = "http://www.virtualbox.org/";

/// One webservice call, e.g. `IMachine_getChipsetType(_this)`.
#[derive(Debug, Clone)]
pub(crate) struct SoapCall {
    method: &'static str,
    args: Vec<(&'static str, String)>,
}

impl SoapCall {
    pub(crate) fn new(method: &'static str) -> Self {
        Self {
            method,
            args: Vec::new(),
        }
    }

    /// Append an argument. Order matters to the webservice.
    pub(crate) fn arg(mut self, name: &'static str, value: impl ToString) -> Self {
        self.args.push((name, value.to_string()));
        self
    }

    pub(crate) fn method(&self) -> &'static str {
        self.method
    }

    /// Render the full request envelope.
    pub(crate) fn envelope(&self) -> String {
        let mut body = String::new();
        for (name, value) in &self.args {
            body.push_str(&format!("<{name}>{}</{name}>", escape(value)));
        }

        format!(
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8"?>"#,
                r#"<SOAP-ENV:Envelope xmlns:SOAP-ENV="{env}" xmlns:vbox="{vbox}">"#,
                "<SOAP-ENV:Body><vbox:{method}>{body}</vbox:{method}></SOAP-ENV:Body>",
                "</SOAP-ENV:Envelope>"
            ),
            env = SOAP_ENV_NAMESPACE,
            vbox = VBOX_NAMESPACE,
            method = self.method,
            body = body,
        )
    }
}

/// Extract the `returnval` elements of a response, or the fault it carries.
pub(crate) fn parse_response(body: &str) -> VolumeResult<Vec<String>> {
    if !elements(body, "Fault").is_empty() {
        let fault = elements(body, "faultstring")
            .into_iter()
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "unknown SOAP fault".to_string());
        return Err(VolumeError::Hypervisor(fault));
    }

    if elements(body, "Body").is_empty() {
        return Err(VolumeError::Transport(format!(
            "response is not a SOAP envelope: {}",
            truncate(body, 200)
        )));
    }

    Ok(elements(body, "returnval"))
}

/// Text content of every element whose local name is `local`.
///
/// Self-closing elements yield an empty string. Nested elements of the same
/// name are not supported (the webservice never produces them).
fn elements(xml: &str, local: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut rest = xml;

    while let Some(start) = rest.find('<') {
        rest = &rest[start + 1..];
        let Some(end) = rest.find('>') else { break };
        let tag = &rest[..end];
        rest = &rest[end + 1..];

        if tag.starts_with('/') || tag.starts_with('?') || tag.starts_with('!') {
            continue;
        }

        let self_closing = tag.ends_with('/');
        let qualified = tag
            .trim_end_matches('/')
            .split(|c: char| c.is_whitespace())
            .next()
            .unwrap_or_default();
        let name = qualified.rsplit(':').next().unwrap_or(qualified);
        if name != local {
            continue;
        }

        if self_closing {
            found.push(String::new());
            continue;
        }

        let closing = format!("</{}>", qualified);
        match rest.find(&closing) {
            Some(close) => {
                found.push(unescape(&rest[..close]));
                rest = &rest[close + closing.len()..];
            }
            None => break,
        }
    }

    found
}

pub(crate) fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

pub(crate) fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let Some(semi) = rest.find(';') else { break };
        let entity = &rest[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };

        match decoded {
            Some(c) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            // Not an entity we know; keep the ampersand literally.
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
