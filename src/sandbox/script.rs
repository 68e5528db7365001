//! Execution script generation and surface-level syntax validation.
//!
//! The generator emits a self-contained Node.js program: the coercion
//! helpers, two file-RPC stubs, one callable per tool, and an async wrapper
//! around the model-supplied body. The wrapper means top-level `await` in
//! the body is always legal, so the validator never flags it.

use std::fmt::Write as _;
use std::time::Duration;

use crate::sandbox::error::{Result, SandboxError};
use crate::sandbox::helpers::HELPER_LIBRARY;
use crate::sandbox::protocol::OUTPUT_FILE;

/// Knobs the generated program needs from the host configuration.
#[derive(Debug, Clone)]
pub struct ScriptOptions {
    /// Scratch directory shared with the host.
    pub scratch_dir: String,
    /// Stub poll interval for response files.
    pub stub_poll: Duration,
    /// Per-call deadline, equal to the bridge timeout.
    pub call_timeout: Duration,
}

/// Generate the program that binds each tool name to an RPC stub and runs
/// the supplied body.
pub fn generate_execution_script(
    body: &str,
    local_tools: &[String],
    mcp_tools: &[String],
    options: &ScriptOptions,
) -> Result<String> {
    validate_syntax(body)?;
    for name in local_tools.iter().chain(mcp_tools) {
        if !is_valid_identifier(name) {
            return Err(SandboxError::InvalidToolName { name: name.clone() });
        }
    }

    let scratch = serde_json::to_string(&options.scratch_dir)
        .map_err(|e| SandboxError::Worker {
            reason: format!("scratch dir not encodable: {e}"),
        })?;

    let mut script = String::with_capacity(HELPER_LIBRARY.len() + body.len() + 4096);
    script.push_str("'use strict';\n");
    script.push_str("const fs = require('fs');\n");
    script.push_str("const path = require('path');\n\n");
    script.push_str(HELPER_LIBRARY);
    let _ = write!(
        script,
        r#"
const SCRATCH_DIR = {scratch};
const OUTPUT_PATH = path.join(SCRATCH_DIR, '{OUTPUT_FILE}');
const POLL_INTERVAL_MS = {poll};
const CALL_TIMEOUT_MS = {timeout};

const allResults = [];
let callCounter = 0;

function nextCallId() {{
  callCounter += 1;
  return Date.now().toString(36) + '_' + callCounter + '_' + Math.random().toString(36).slice(2, 8);
}}

function sleep(ms) {{
  return new Promise(function (resolve) {{ setTimeout(resolve, ms); }});
}}

async function awaitToolResponse(toolName, requestPath, responsePath) {{
  const deadline = Date.now() + CALL_TIMEOUT_MS;
  while (Date.now() < deadline) {{
    if (fs.existsSync(responsePath)) {{
      const text = fs.readFileSync(responsePath, 'utf8');
      let parsed;
      try {{
        parsed = JSON.parse(text);
      }} catch (e) {{
        parsed = undefined;  // partial write, keep polling
      }}
      if (parsed !== undefined) {{
        fs.unlinkSync(responsePath);
        try {{ fs.unlinkSync(requestPath); }} catch (e) {{}}
        if (parsed.error !== undefined && parsed.error !== null) {{
          throw new Error(toolName + ': ' + parsed.error);
        }}
        return parsed.data;
      }}
    }}
    await sleep(POLL_INTERVAL_MS);
  }}
  throw new Error(toolName + ': timed out after ' + CALL_TIMEOUT_MS + 'ms waiting for a response');
}}

async function callLocalTool(toolName, args) {{
  const id = nextCallId();
  const requestPath = path.join(SCRATCH_DIR, 'tool_call_' + id + '.json');
  const responsePath = path.join(SCRATCH_DIR, 'tool_result_' + id + '.json');
  fs.writeFileSync(requestPath, JSON.stringify({{ toolName: toolName, args: args, type: 'local' }}));
  return awaitToolResponse(toolName, requestPath, responsePath);
}}

async function callMcpTool(toolName, params) {{
  const id = nextCallId();
  const requestPath = path.join(SCRATCH_DIR, 'mcp_call_' + id + '.json');
  const responsePath = path.join(SCRATCH_DIR, 'mcp_result_' + id + '.json');
  fs.writeFileSync(requestPath, JSON.stringify({{
    toolName: toolName,
    args: params === undefined ? {{}} : params,
    callId: id,
    type: 'mcp',
  }}));
  return awaitToolResponse(toolName, requestPath, responsePath);
}}

function unserializableStub(v) {{
  return {{
    __unserializable: true,
    type: typeof v,
    keys: v !== null && typeof v === 'object' ? Object.keys(v) : [],
  }};
}}

function serializableCopy(v) {{
  try {{
    JSON.stringify(v);
    return v;
  }} catch (e) {{}}
  if (Array.isArray(v)) {{
    const copy = v.map(function (item) {{
      try {{
        JSON.stringify(item);
        return item;
      }} catch (e) {{
        return unserializableStub(item);
      }}
    }});
    try {{
      JSON.stringify(copy);
      return copy;
    }} catch (e) {{}}
  }} else if (v !== null && typeof v === 'object') {{
    const copy = {{}};
    for (const key of Object.keys(v)) {{
      try {{
        JSON.stringify(v[key]);
        copy[key] = v[key];
      }} catch (e) {{
        copy[key] = unserializableStub(v[key]);
      }}
    }}
    try {{
      JSON.stringify(copy);
      return copy;
    }} catch (e) {{}}
  }}
  try {{
    return String(v);
  }} catch (e) {{}}
  return unserializableStub(v);
}}
"#,
        poll = options.stub_poll.as_millis(),
        timeout = options.call_timeout.as_millis(),
    );

    for name in local_tools {
        let _ = write!(
            script,
            r#"
async function {name}(...args) {{
  const result = await callLocalTool("{name}", args);
  allResults.push({{ tool: "{name}", result: result }});
  return result;
}}
"#,
        );
    }
    // MCP convention: a single parameters record, not variadic arguments.
    for name in mcp_tools {
        let _ = write!(
            script,
            r#"
async function {name}(params) {{
  const result = await callMcpTool("{name}", params);
  allResults.push({{ tool: "{name}", result: result }});
  return result;
}}
"#,
        );
    }

    let _ = write!(
        script,
        r#"
async function __userProgram() {{
{body}
}}

(async function () {{
  let output;
  try {{
    let result = await __userProgram();
    if (result === undefined && allResults.length > 0) {{
      if (allResults.length === 1) {{
        result = allResults[0].result;
      }} else {{
        result = {{
          autoGenerated: true,
          count: allResults.length,
          results: allResults,
          lastResult: allResults[allResults.length - 1].result,
        }};
      }}
    }}
    output = {{ success: true, result: result === undefined ? null : result }};
  }} catch (err) {{
    const message = err && err.message ? err.message : String(err);
    output = {{ success: false, error: message }};
    if (err && err.stack) output.stack = String(err.stack);
    if (allResults.length > 0) {{
      output.partialResult = {{ error: message, completedResults: allResults }};
    }}
  }}
  let text;
  try {{
    text = JSON.stringify(output);
  }} catch (e) {{
    // A circular or BigInt-bearing return value must degrade, not abort:
    // the host treats a missing output document as a failed call.
    output.result = serializableCopy(output.result);
    if (output.partialResult !== undefined) {{
      output.partialResult.completedResults =
        serializableCopy(output.partialResult.completedResults);
    }}
    text = JSON.stringify(output);
  }}
  fs.writeFileSync(OUTPUT_PATH, text);
}})();
"#,
    );

    Ok(script)
}

/// Whether a tool name can be bound as a JavaScript function name.
fn is_valid_identifier(name: &str) -> bool {
    const RESERVED: [&str; 28] = [
        "await", "async", "break", "case", "catch", "class", "const", "continue", "default",
        "delete", "do", "else", "export", "extends", "false", "for", "function", "if", "import",
        "in", "let", "new", "null", "return", "this", "throw", "true", "while",
    ];
    let mut chars = name.chars();
    let Some(head) = chars.next() else {
        return false;
    };
    if !(head.is_ascii_alphabetic() || head == '_' || head == '$') {
        return false;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$') {
        return false;
    }
    !RESERVED.contains(&name)
}

/// Bracket-stack marker for a `${` opened inside a template literal.
const TEMPLATE_EXPR: char = 'T';

/// Surface-level syntax validation of a program body.
///
/// Checks bracket balance and string/comment termination so obviously
/// broken programs fail before a worker is provisioned, with hints the
/// model can act on. Top-level `await` is fine: the generator wraps the
/// body in an async function. Not a full parser; in particular a
/// regular-expression literal containing an unmatched bracket is misread.
/// TODO: treat regex literals as atomic tokens so `/\(/` does not trip the
/// bracket scanner.
pub fn validate_syntax(code: &str) -> Result<()> {
    enum Ctx {
        Code,
        Template,
    }

    let mut ctx = vec![Ctx::Code];
    let mut brackets: Vec<(char, usize)> = Vec::new();
    let mut line = 1usize;
    let mut chars = code.chars().peekable();

    let syntax = |message: String| SandboxError::SyntaxInvalid { message };

    while let Some(c) = chars.next() {
        if c == '\n' {
            line += 1;
            continue;
        }
        match ctx.last() {
            Some(Ctx::Template) => match c {
                '\\' => {
                    chars.next();
                }
                '`' => {
                    ctx.pop();
                }
                '$' if chars.peek() == Some(&'{') => {
                    chars.next();
                    brackets.push((TEMPLATE_EXPR, line));
                    ctx.push(Ctx::Code);
                }
                _ => {}
            },
            _ => match c {
                '/' if chars.peek() == Some(&'/') => {
                    for next in chars.by_ref() {
                        if next == '\n' {
                            line += 1;
                            break;
                        }
                    }
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    let mut closed = false;
                    let mut prev = ' ';
                    for next in chars.by_ref() {
                        if next == '\n' {
                            line += 1;
                        }
                        if prev == '*' && next == '/' {
                            closed = true;
                            break;
                        }
                        prev = next;
                    }
                    if !closed {
                        return Err(syntax(
                            "unterminated block comment (add the closing */)".to_string(),
                        ));
                    }
                }
                '\'' | '"' => {
                    let opened_on = line;
                    let mut closed = false;
                    while let Some(next) = chars.next() {
                        match next {
                            '\\' => {
                                chars.next();
                            }
                            '\n' => break,
                            q if q == c => {
                                closed = true;
                                break;
                            }
                            _ => {}
                        }
                    }
                    if !closed {
                        return Err(syntax(format!(
                            "unterminated string literal starting on line {opened_on} \
                             (close the {c} quote before the end of the line)"
                        )));
                    }
                }
                '`' => ctx.push(Ctx::Template),
                '(' | '[' | '{' => brackets.push((c, line)),
                ')' | ']' | '}' => match brackets.pop() {
                    Some((open, opened_on)) => {
                        let display = opener_display(open);
                        let expected = closer_for(open);
                        if c != expected {
                            return Err(syntax(format!(
                                "expected '{expected}' to close '{display}' opened on line \
                                 {opened_on}, found '{c}' on line {line}"
                            )));
                        }
                        if open == TEMPLATE_EXPR {
                            ctx.pop();
                        }
                    }
                    None => {
                        return Err(syntax(format!(
                            "unexpected '{c}' on line {line} with no matching opening bracket \
                             (remove it or add the opener)"
                        )));
                    }
                },
                _ => {}
            },
        }
    }

    if ctx.len() > 1 {
        return Err(syntax(
            "unterminated template literal (add the closing backtick)".to_string(),
        ));
    }
    if let Some((open, opened_on)) = brackets.last() {
        let display = opener_display(*open);
        return Err(syntax(format!(
            "unclosed '{display}' opened on line {opened_on} (add the matching '{}')",
            closer_for(*open)
        )));
    }
    Ok(())
}

fn closer_for(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

fn opener_display(open: char) -> String {
    if open == TEMPLATE_EXPR {
        "${".to_string()
    } else {
        open.to_string()
    }
}
