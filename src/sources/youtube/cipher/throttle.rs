use std::{collections::HashMap, sync::LazyLock};

use regex::Regex;
use rquickjs::{Context, Function, Runtime};

use super::{GlobalArray, find_function};
use crate::common::errors::{ResolveError, Result};

const MEMORY_LIMIT: usize = 32 * 1024 * 1024;
const STACK_SIZE: usize = 1024 * 1024;

static FUNCTION_NAME_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
  [
    r#"(?:\.get\("n"\)\)&&\(b=|b=String\.fromCharCode\(110\),c=a\.get\(b\)\)&&\(c=)([a-zA-Z0-9$]+)(?:\[(\d+)\])?\([a-zA-Z0-9]\)"#,
    r#"(?:^|[^a-zA-Z0-9$])([a-zA-Z0-9$]{2,})\s*=\s*function\(\s*a\s*\)\s*\{\s*var\s+b\s*=\s*a\.split\(\s*""\s*\)"#,
  ]
  .iter()
  .map(|p| Regex::new(p).expect("static throttle pattern"))
  .collect()
});

// Short-circuit on a global the extracted function cannot see once lifted out of the script.
static UNDEFINED_GUARD: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(
    r#";\s*if\s*\(\s*typeof\s+[a-zA-Z0-9_$]+\s*===?\s*(?:"undefined"|'undefined'|[a-zA-Z0-9_$]+\[\d+\])\s*\)\s*return\s+[a-zA-Z0-9_$]+;"#,
  )
  .expect("static guard pattern")
});

/// Rewrites the anti-throttling `n` query parameter.
///
/// The function is lifted out of the player script and evaluated in an
/// embedded QuickJS engine.
#[derive(Debug, Clone)]
pub struct ThrottleTransform {
  script: String,
  source: String,
}

impl ThrottleTransform {
  pub fn derive(script: &str, body: &str) -> Result<Self> {
    let (name, index) = FUNCTION_NAME_PATTERNS
      .iter()
      .find_map(|re| {
        re.captures(body).map(|caps| {
          let index = caps.get(2).and_then(|m| m.as_str().parse::<usize>().ok());
          (caps[1].to_string(), index)
        })
      })
      .ok_or_else(|| ResolveError::obfuscation(script, "throttle function name"))?;

    let name = match index {
      Some(index) => resolve_array_entry(body, &name, index)
        .ok_or_else(|| ResolveError::obfuscation(script, format!("throttle function array {}", name)))?,
      None => name,
    };

    let function = find_function(body, &name)
      .ok_or_else(|| ResolveError::obfuscation(script, format!("throttle function {}", name)))?;
    let fixed = UNDEFINED_GUARD.replace_all(&function.body, ";");
    let prelude = GlobalArray::referenced_by(body, &fixed)
      .map(|array| array.declaration)
      .unwrap_or_default();

    let transform = Self {
      script: script.to_string(),
      source: format!("{}(function({}){})", prelude, function.param, fixed),
    };

    // Compile once so a broken extraction surfaces at derivation time.
    transform.detoxify_batch(std::iter::empty())?;
    tracing::debug!(script, function = %name, "derived throttle transform");

    Ok(transform)
  }

  pub fn source(&self) -> &str {
    &self.source
  }

  pub fn detoxify(&self, n: &str) -> Result<String> {
    self
      .detoxify_batch([n])?
      .remove(n)
      .ok_or_else(|| ResolveError::obfuscation(&self.script, "throttle parameter"))
  }

  /// Rewrites every distinct value with one engine instance.
  ///
  /// Values the function fails on are absent from the returned map.
  pub fn detoxify_batch<'a, I>(&self, values: I) -> Result<HashMap<String, String>>
  where
    I: IntoIterator<Item = &'a str>,
  {
    let engine_err = |e: rquickjs::Error| ResolveError::obfuscation(&self.script, format!("throttle engine: {}", e));

    let rt = Runtime::new().map_err(engine_err)?;
    rt.set_memory_limit(MEMORY_LIMIT);
    rt.set_max_stack_size(STACK_SIZE);
    let ctx = Context::full(&rt).map_err(engine_err)?;

    ctx.with(|ctx| {
      let func: Function = ctx
        .eval(self.source.as_bytes().to_vec())
        .map_err(engine_err)?;

      let mut out = HashMap::new();
      for n in values {
        if out.contains_key(n) {
          continue;
        }
        match func.call::<_, String>((n,)) {
          Ok(rewritten) if is_rewritten(n, &rewritten) => {
            out.insert(n.to_string(), rewritten);
          }
          Ok(rewritten) => {
            tracing::debug!(n, rewritten = %rewritten, "throttle function returned an unusable value");
          }
          Err(e) => {
            tracing::debug!(n, "throttle function failed: {}", e);
          }
        }
      }

      Ok(out)
    })
  }
}

fn is_rewritten(input: &str, output: &str) -> bool {
  !output.is_empty() && output != input && !output.starts_with("enhanced_except_")
}

fn resolve_array_entry(body: &str, array: &str, index: usize) -> Option<String> {
  let re = Regex::new(&format!(
    r"(?:^|[^a-zA-Z0-9$.])var\s+{}\s*=\s*\[([^\]]+)\]\s*[;,]",
    regex::escape(array)
  ))
  .ok()?;
  let caps = re.captures(body)?;
  caps[1].split(',').nth(index).map(|s| s.trim().to_string())
}
