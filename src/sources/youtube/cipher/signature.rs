use std::{collections::HashMap, sync::LazyLock};

use regex::Regex;

use super::{GlobalArray, find_function, find_object};
use crate::common::errors::{ResolveError, Result};

static FUNCTION_NAME_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
  [
    r"\b[cs]\s*&&\s*[adf]\.set\([^,]+\s*,\s*encodeURIComponent\s*\(\s*([a-zA-Z0-9$]+)\(",
    r"\b[a-zA-Z0-9]+\s*&&\s*[a-zA-Z0-9]+\.set\([^,]+\s*,\s*encodeURIComponent\s*\(\s*([a-zA-Z0-9$]+)\(",
    r"\bm=([a-zA-Z0-9$]{2,})\(decodeURIComponent\(h\.s\)\)",
    r"\bc&&\(c=([a-zA-Z0-9$]{2,})\(decodeURIComponent\(c\)\)",
    r#"(?:\b|[^a-zA-Z0-9$])([a-zA-Z0-9$]{2,})\s*=\s*function\(\s*a\s*\)\s*\{\s*a\s*=\s*a\.split\(\s*""\s*\)"#,
  ]
  .iter()
  .map(|p| Regex::new(p).expect("static signature pattern"))
  .collect()
});

static HELPER_METHOD: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r#"([a-zA-Z0-9$]+|"[^"]+")\s*:\s*function\s*\(([^)]*)\)\s*\{([^}]*)\}"#)
    .expect("static helper pattern")
});

/// One primitive step of the signature descrambler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherOp {
  Reverse,
  /// Drops the first `n` characters.
  Splice(usize),
  /// Swaps the first character with the one at `n % len`.
  Swap(usize),
}

impl CipherOp {
  fn apply(self, chars: &mut Vec<char>) {
    match self {
      Self::Reverse => chars.reverse(),
      Self::Splice(n) => {
        let n = n.min(chars.len());
        chars.drain(..n);
      }
      Self::Swap(n) => {
        if !chars.is_empty() {
          let idx = n % chars.len();
          chars.swap(0, idx);
        }
      }
    }
  }
}

/// Ordered primitive operations reconstructed from the player script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureTransform {
  ops: Vec<CipherOp>,
}

impl SignatureTransform {
  pub fn new(ops: Vec<CipherOp>) -> Self {
    Self { ops }
  }

  pub fn ops(&self) -> &[CipherOp] {
    &self.ops
  }

  pub fn derive(script: &str, body: &str) -> Result<Self> {
    let name = FUNCTION_NAME_PATTERNS
      .iter()
      .find_map(|re| re.captures(body).map(|caps| caps[1].to_string()))
      .ok_or_else(|| ResolveError::obfuscation(script, "signature function name"))?;

    let function = find_function(body, &name)
      .ok_or_else(|| ResolveError::obfuscation(script, format!("signature function {}", name)))?;
    let mut table = GlobalArray::referenced_by(body, &function.body);
    let function_body = match &table {
      Some(table) => table.inline(&function.body),
      None => function.body.clone(),
    };

    let call = Regex::new(&format!(
      r#"([a-zA-Z0-9$]+)(?:\.([a-zA-Z0-9$]+)|\[["']([a-zA-Z0-9$]+)["']\])\(\s*{}\s*,\s*(\d+)\s*\)"#,
      regex::escape(&function.param)
    ))
    .map_err(|e| ResolveError::obfuscation(script, format!("signature call pattern: {}", e)))?;

    let calls: Vec<(&str, &str, usize)> = call
      .captures_iter(&function_body)
      .filter_map(|caps| {
        let object = caps.get(1)?.as_str();
        let method = caps.get(2).or_else(|| caps.get(3))?.as_str();
        let arg = caps.get(4)?.as_str().parse().ok()?;
        Some((object, method, arg))
      })
      .collect();

    let helper_name = calls
      .first()
      .map(|(object, _, _)| *object)
      .ok_or_else(|| ResolveError::obfuscation(script, "signature helper calls"))?;

    let helper = find_object(body, helper_name)
      .ok_or_else(|| ResolveError::obfuscation(script, format!("signature helper {}", helper_name)))?;
    if table.is_none() {
      table = GlobalArray::referenced_by(body, helper);
    }
    let methods = match &table {
      Some(table) => classify_methods(&table.inline(helper)),
      None => classify_methods(helper),
    };

    let mut ops = Vec::with_capacity(calls.len());
    for (object, method, arg) in calls {
      if object != helper_name {
        continue;
      }
      let op = methods
        .get(method)
        .ok_or_else(|| ResolveError::obfuscation(script, format!("signature helper method {}", method)))?;
      ops.push(op(arg));
    }

    tracing::debug!(script, ops = ops.len(), "derived signature transform");
    Ok(Self { ops })
  }

  pub fn sign(&self, signature: &str) -> String {
    let mut chars: Vec<char> = signature.chars().collect();
    for op in &self.ops {
      op.apply(&mut chars);
    }
    chars.into_iter().collect()
  }
}

type OpBuilder = fn(usize) -> CipherOp;

fn classify_methods(helper: &str) -> HashMap<String, OpBuilder> {
  let mut methods: HashMap<String, OpBuilder> = HashMap::new();

  for caps in HELPER_METHOD.captures_iter(helper) {
    let name = caps[1].trim_matches('"').to_string();
    let body = &caps[3];

    let op: OpBuilder = if body.contains("reverse") {
      |_| CipherOp::Reverse
    } else if body.contains("splice") || body.contains("slice") {
      CipherOp::Splice
    } else if body.contains('%') || body.contains("[0]") {
      CipherOp::Swap
    } else {
      continue;
    };
    methods.insert(name, op);
  }

  methods
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_ops_follow_js_semantics() {
    let transform = SignatureTransform::new(vec![
      CipherOp::Swap(7),
      CipherOp::Splice(1),
      CipherOp::Reverse,
    ]);
    // swap a<->d (7 % 4 = 3): dbca, splice: bca, reverse: acb
    assert_eq!(transform.sign("abcd"), "acb");

    let overlong = SignatureTransform::new(vec![CipherOp::Splice(10)]);
    assert_eq!(overlong.sign("abc"), "");
  }

  #[test]
  fn test_classify_helper_methods() {
    let helper = r#"{Ab:function(a,b){var c=a[0];a[0]=a[b%a.length];a[b%a.length]=c},
cD:function(a){a.reverse()},"$e":function(a,b){a.splice(0,b)}}"#;
    let methods = classify_methods(helper);
    assert_eq!(methods.len(), 3);
    assert_eq!(methods["Ab"](4), CipherOp::Swap(4));
    assert_eq!(methods["cD"](13), CipherOp::Reverse);
    assert_eq!(methods["$e"](2), CipherOp::Splice(2));
  }

  #[test]
  fn test_lookup_table_names_are_resolved() {
    let helper = r#"var XX="split;join;reverse;splice;length;Ab".split(";");
var Xy={Ab:function(a,b){var c=a[0];a[0]=a[b%a[XX[4]]];a[b%a[XX[4]]]=c},
cD:function(a){a[XX[2]]()},
$e:function(a,b){a[XX[3]](0,b)}};
g.Ug=function(a,b,c,d){c&&d.set(b,encodeURIComponent(Qz(decodeURIComponent(c))))};"#;
    let through_table = r#"
Qz=function(a){a=a[XX[0]]("");Xy.$e(a,2);Xy.Ab(a,39);Xy.cD(a,13);Xy[XX[5]](a,5);Xy.$e(a,1);return a[XX[1]]("")};"#;
    let plain = r#"
Qz=function(a){a=a.split("");Xy.$e(a,2);Xy.Ab(a,39);Xy.cD(a,13);Xy.Ab(a,5);Xy.$e(a,1);return a.join("")};"#;

    for function in [through_table, plain] {
      let body = format!("{}{}", helper, function);
      let transform = SignatureTransform::derive("base.js", &body).unwrap();
      assert_eq!(
        transform.ops(),
        &[
          CipherOp::Splice(2),
          CipherOp::Swap(39),
          CipherOp::Reverse,
          CipherOp::Swap(5),
          CipherOp::Splice(1),
        ]
      );
    }
  }

  #[test]
  fn test_missing_function_is_obfuscation_changed() {
    let err = SignatureTransform::derive("base.js", "var a = 1;").unwrap_err();
    assert!(matches!(err, ResolveError::ObfuscationChanged { ref what, .. } if what == "signature function name"));
  }
}
