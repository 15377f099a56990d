pub mod signature;
pub mod throttle;

use std::{collections::HashSet, sync::LazyLock};

use regex::Regex;

pub use signature::{CipherOp, SignatureTransform};
pub use throttle::ThrottleTransform;

use super::{
  clients::common::decode_signature_cipher,
  extractor::cut_after_js,
  format::StreamDescriptor,
  utils::{query_param, set_query_param},
};
use crate::common::{
  errors::{ResolveError, Result},
  types::PlayerScriptRef,
};

static IDENT: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9$_]+$").expect("static identifier pattern"));

/// A function definition lifted out of the player script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsFunction {
  pub param: String,
  /// Body including the surrounding braces.
  pub body: String,
}

/// Finds `name = function(p) {...}` or `function name(p) {...}`.
pub fn find_function(source: &str, name: &str) -> Option<JsFunction> {
  if !IDENT.is_match(name) {
    return None;
  }
  let escaped = regex::escape(name);
  let patterns = [
    format!(r"(?:^|[^a-zA-Z0-9$.]){}\s*=\s*function\s*\(\s*([a-zA-Z0-9$]+)\s*\)\s*\{{", escaped),
    format!(r"function\s+{}\s*\(\s*([a-zA-Z0-9$]+)\s*\)\s*\{{", escaped),
  ];

  for pattern in &patterns {
    let re = Regex::new(pattern).ok()?;
    if let Some(caps) = re.captures(source) {
      let open = caps.get(0)?.end() - 1;
      let body = cut_after_js(&source[open..]).ok()?;
      return Some(JsFunction {
        param: caps[1].to_string(),
        body: body.to_string(),
      });
    }
  }

  None
}

/// Finds the object literal assigned to `name`.
pub fn find_object<'a>(source: &'a str, name: &str) -> Option<&'a str> {
  if !IDENT.is_match(name) {
    return None;
  }
  let re = Regex::new(&format!(
    r"(?:^|[^a-zA-Z0-9$.]){}\s*=\s*\{{",
    regex::escape(name)
  ))
  .ok()?;
  let open = re.find(source)?.end() - 1;
  cut_after_js(&source[open..]).ok()
}

static ARRAY_INDEX: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"([a-zA-Z0-9$_]+)\[(\d+)\]").expect("static array index pattern"));

const JS_STRING: &str = r#""(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*'"#;

/// Top-level lookup table of the form `XX = "a;b;c".split(";")`.
///
/// Newer players route method names and sentinel values through one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalArray {
  pub name: String,
  /// Standalone declaration that can be evaluated ahead of lifted code.
  pub declaration: String,
  pub values: Vec<String>,
  quote: char,
}

impl GlobalArray {
  /// The first table `code` indexes as `XX[n]` that `source` declares.
  /// Single letter names are minified locals and never tables.
  pub fn referenced_by(source: &str, code: &str) -> Option<Self> {
    let mut seen = HashSet::new();
    ARRAY_INDEX
      .captures_iter(code)
      .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
      .filter(|name| name.len() > 1 && seen.insert(*name))
      .find_map(|name| Self::declared(source, name))
  }

  fn declared(source: &str, name: &str) -> Option<Self> {
    let re = Regex::new(&format!(
      r"(?:^|[^a-zA-Z0-9$_.]){}\s*=\s*({})\s*\.\s*split\(\s*({})\s*\)",
      regex::escape(name),
      JS_STRING,
      JS_STRING
    ))
    .ok()?;
    let caps = re.captures(source)?;
    let (list, separator) = (caps.get(1)?.as_str(), caps.get(2)?.as_str());
    let quote = list.chars().next()?;

    let values = unquote(list)
      .split(unquote(separator))
      .map(str::to_string)
      .collect();

    Some(Self {
      name: name.to_string(),
      declaration: format!("var {}={}.split({});", name, list, separator),
      values,
      quote,
    })
  }

  /// Replaces every in-range `XX[n]` with the string literal it holds.
  pub fn inline(&self, code: &str) -> String {
    ARRAY_INDEX
      .replace_all(code, |caps: &regex::Captures| {
        let value = (caps[1] == self.name)
          .then(|| caps[2].parse::<usize>().ok())
          .flatten()
          .and_then(|index| self.values.get(index));
        match value {
          Some(value) => format!("{q}{}{q}", value, q = self.quote),
          None => caps[0].to_string(),
        }
      })
      .into_owned()
  }
}

fn unquote(literal: &str) -> &str {
  literal.get(1..literal.len().saturating_sub(1)).unwrap_or("")
}

/// Transforms derived from one player script.
///
/// Either transform may be missing when the script no longer matches the
/// known shapes; descriptors needing a missing transform are dropped.
#[derive(Debug, Clone)]
pub struct CipherSet {
  script: PlayerScriptRef,
  signature: Option<SignatureTransform>,
  throttle: Option<ThrottleTransform>,
}

impl CipherSet {
  pub fn new(
    script: PlayerScriptRef,
    signature: Option<SignatureTransform>,
    throttle: Option<ThrottleTransform>,
  ) -> Self {
    Self {
      script,
      signature,
      throttle,
    }
  }

  pub fn derive(script: &PlayerScriptRef, body: &str) -> Self {
    let signature = SignatureTransform::derive(script, body)
      .inspect_err(|e| tracing::warn!(script = %script, "{}", e))
      .ok();
    let throttle = ThrottleTransform::derive(script, body)
      .inspect_err(|e| tracing::warn!(script = %script, "{}", e))
      .ok();

    Self::new(script.clone(), signature, throttle)
  }

  pub fn script(&self) -> &PlayerScriptRef {
    &self.script
  }

  pub fn signature(&self) -> Option<&SignatureTransform> {
    self.signature.as_ref()
  }

  pub fn throttle(&self) -> Option<&ThrottleTransform> {
    self.throttle.as_ref()
  }

  /// Signed URL of one descriptor, `n` parameter still untouched.
  pub fn signed_url(&self, descriptor: &StreamDescriptor) -> Result<Option<String>> {
    let Some(raw) = descriptor
      .signature_cipher
      .as_deref()
      .or(descriptor.cipher.as_deref())
    else {
      return Ok(descriptor.url.clone());
    };

    let cipher = decode_signature_cipher(raw)
      .ok_or_else(|| ResolveError::parse("player_response", "signatureCipher", raw))?;
    let signature = self
      .signature
      .as_ref()
      .ok_or_else(|| ResolveError::obfuscation(self.script.0.as_str(), "signature transform"))?;

    Ok(Some(set_query_param(
      &cipher.url,
      &cipher.sp,
      &signature.sign(&cipher.s),
    )))
  }

  /// Resolves every descriptor to a playable URL.
  ///
  /// Descriptors whose URL cannot be produced are dropped and logged; the
  /// rest of the batch is unaffected.
  pub fn decipher_formats(
    &self,
    descriptors: Vec<StreamDescriptor>,
  ) -> Vec<(StreamDescriptor, String)> {
    let mut signed = Vec::with_capacity(descriptors.len());
    for descriptor in descriptors {
      match self.signed_url(&descriptor) {
        Ok(Some(url)) => signed.push((descriptor, url)),
        Ok(None) => tracing::debug!(itag = descriptor.itag, "descriptor has no url"),
        Err(e) => tracing::warn!(itag = descriptor.itag, "dropping format: {}", e),
      }
    }

    let throttled: HashSet<String> = signed
      .iter()
      .filter_map(|(_, url)| query_param(url, "n"))
      .collect();
    if throttled.is_empty() {
      return signed;
    }

    let rewritten = match &self.throttle {
      Some(throttle) => throttle
        .detoxify_batch(throttled.iter().map(String::as_str))
        .inspect_err(|e| tracing::warn!(script = %self.script, "{}", e))
        .unwrap_or_default(),
      None => Default::default(),
    };

    signed
      .into_iter()
      .filter_map(|(descriptor, url)| {
        let Some(n) = query_param(&url, "n") else {
          return Some((descriptor, url));
        };
        match rewritten.get(&n) {
          Some(value) => {
            let url = set_query_param(&url, "n", value);
            Some((descriptor, url))
          }
          None => {
            tracing::warn!(
              itag = descriptor.itag,
              "dropping format: {}",
              ResolveError::obfuscation(self.script.0.as_str(), "throttle parameter")
            );
            None
          }
        }
      })
      .collect()
  }
}
