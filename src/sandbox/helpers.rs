//! Value coercion helpers injected into generated programs.
//!
//! Tool responses vary wildly in shape, and model-written code is bad at
//! defending against that. This library is inserted verbatim at the top of
//! every generated program so the code can use `toArray`, `safeGet`,
//! `extractText` and friends instead of hand-rolled property chains.

/// JavaScript source of the helper library.
pub const HELPER_LIBRARY: &str = r#"// --- value coercion helpers ---
function toArray(v) {
  if (v === null || v === undefined) return [];
  if (Array.isArray(v)) return v;
  if (typeof v === 'object') {
    for (const key of ['items', 'data', 'results', 'content']) {
      if (Array.isArray(v[key])) return v[key];
    }
  }
  return [v];
}

function safeGet(obj, path, fallback) {
  if (obj === null || obj === undefined) return fallback;
  let current = obj;
  for (const part of String(path).split('.')) {
    if (current === null || current === undefined) return fallback;
    current = current[part];
  }
  return current === null || current === undefined ? fallback : current;
}

function safeMap(v, fn) {
  return toArray(v).map(fn);
}

function safeFilter(v, fn) {
  return toArray(v).filter(fn);
}

function first(v, fallback) {
  const a = toArray(v);
  return a.length > 0 ? a[0] : fallback;
}

function len(v) {
  return toArray(v).length;
}

function isSuccess(r) {
  if (!r) return false;
  if (typeof r === 'object') {
    if (r.success === false) return false;
    if (r.error) return false;
    if (r.isError) return false;
  }
  return true;
}

function extractData(r) {
  if (r === null || r === undefined) return r;
  if (typeof r !== 'object' || Array.isArray(r)) return r;
  if (r.data !== undefined) return r.data;
  if (r.result !== undefined) return r.result;
  if (r.results !== undefined) return r.results;
  if (r.items !== undefined) return r.items;
  if (r.content !== undefined && r.markdown === undefined) return r.content;
  return r;
}

function extractText(r, fallback) {
  if (fallback === undefined) fallback = '';
  try {
    if (r === null || r === undefined) return fallback;
    if (typeof r === 'string') return r;
    if (typeof r !== 'object') return String(r);
    for (const key of ['text', 'output', 'stdout', 'content', 'markdown', 'result', 'data', 'value']) {
      const v = r[key];
      if (typeof v === 'string' && v.length > 0) return v;
    }
    if (Array.isArray(r.items) && r.items.length > 0) {
      return extractText(r.items[0], fallback);
    }
    const s = JSON.stringify(r);
    return s === undefined ? fallback : s;
  } catch (e) {
    return fallback;
  }
}

function getCommandOutput(r) {
  return {
    success: isSuccess(r),
    output: extractText(r),
    error: (r && (r.error || r.stderr)) || '',
  };
}
// --- end helpers ---
"#;

/// Names the library defines, used when documenting the `code_execution`
/// tool for the model.
pub const HELPER_NAMES: [&str; 10] = [
    "toArray",
    "safeGet",
    "safeMap",
    "safeFilter",
    "first",
    "len",
    "isSuccess",
    "extractData",
    "extractText",
    "getCommandOutput",
];
