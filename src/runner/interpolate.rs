//! Placeholder expansion
//!
//! Strings may contain `${namespace.path}` placeholders. Two namespaces are
//! built in:
//!
//! - `vars`: looked up in the `vars` of the current task, then of each
//!   enclosing task, then in the top-level `vars` of the configuration
//! - `args`: looked up in the current scope's resolved arguments
//!
//! Any other namespace is handed to [`Scope::expand_custom`].
//!
//! A string that is exactly one placeholder expands to the referenced value
//! whatever its type; placeholders embedded in a longer string are replaced
//! by the value's text. A run of `$` signs escapes: `$${x}` yields the
//! literal `${x}`, `$$${x}` yields `$` followed by the value of `x`.

use crate::config::types::{keys, Mapping, Value};
use crate::error::{ExpansionError, ExpansionResult};
use regex::Regex;
use std::mem;
use std::sync::OnceLock;

/// Resolves placeholders in namespaces other than `vars` and `args`
pub type ExpansionHook = dyn Fn(&str, &str) -> ExpansionResult<Value>;

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$+\{.*?\}").expect("placeholder pattern is valid"))
}

fn body_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)^(\w+)(?:\W(.*))?$").expect("body pattern is valid"))
}

/// What placeholder lookups can see
pub trait Scope {
    /// The whole configuration tree
    fn config(&self) -> &Mapping;

    /// The task this scope runs, if any
    fn task(&self) -> Option<&Mapping>;

    /// Resolved arguments of this scope
    fn args(&self) -> &Mapping;

    /// The enclosing scope
    fn parent(&self) -> Option<&dyn Scope>;

    /// Resolve a placeholder in an unknown namespace
    fn expand_custom(&self, namespace: &str, _rest: &str) -> ExpansionResult<Value> {
        Err(ExpansionError::UnknownNamespace(namespace.to_string()))
    }
}

/// Expand placeholders in `value` as seen from `scope`
pub fn expand(scope: &dyn Scope, value: &Value, recursive: bool) -> ExpansionResult<Value> {
    Expression::new(scope).expand(value, recursive)
}

/// One expansion run
///
/// Keeps the placeholders currently being resolved so a placeholder that
/// ends up referring to itself fails instead of looping.
pub struct Expression<'s> {
    scope: &'s dyn Scope,
    stack: Vec<String>,
}

impl<'s> Expression<'s> {
    pub fn new(scope: &'s dyn Scope) -> Self {
        Expression {
            scope,
            stack: Vec::new(),
        }
    }

    /// Expand a value
    ///
    /// Only strings are expanded. With `recursive`, a mapping or sequence
    /// produced by a whole-string placeholder has its elements expanded too.
    pub fn expand(&mut self, value: &Value, recursive: bool) -> ExpansionResult<Value> {
        let text = match value {
            Value::String(text) => text,
            other => return Ok(other.clone()),
        };

        let re = placeholder_regex();
        let whole = re
            .find(text)
            .map_or(false, |m| m.start() == 0 && m.end() == text.len());

        if whole {
            let result = self.expand_placeholder(text)?;
            return if recursive {
                self.expand_nested(result)
            } else {
                Ok(result)
            };
        }

        let mut output = String::with_capacity(text.len());
        let mut errors = Vec::new();
        let mut last = 0;

        for m in re.find_iter(text) {
            output.push_str(&text[last..m.start()]);
            match self.expand_placeholder(m.as_str()) {
                Ok(value) => output.push_str(&display_value(&value)),
                Err(e) => errors.push(e),
            }
            last = m.end();
        }
        output.push_str(&text[last..]);

        match errors.len() {
            0 => Ok(Value::String(output)),
            1 => Err(errors.remove(0)),
            _ => Err(ExpansionError::Multiple(errors)),
        }
    }

    fn expand_nested(&mut self, value: Value) -> ExpansionResult<Value> {
        match value {
            Value::Mapping(mapping) => {
                let mut result = Mapping::with_capacity(mapping.len());
                for (key, value) in mapping {
                    let expanded = self.expand(&value, true)?;
                    result.insert(key, expanded);
                }
                Ok(Value::Mapping(result))
            }
            Value::Sequence(sequence) => sequence
                .iter()
                .map(|value| self.expand(value, true))
                .collect::<ExpansionResult<Vec<_>>>()
                .map(Value::Sequence),
            other => Ok(other),
        }
    }

    fn expand_placeholder(&mut self, token: &str) -> ExpansionResult<Value> {
        let dollars = token.bytes().take_while(|b| *b == b'$').count();
        let escaped = "$".repeat(dollars / 2);

        if dollars % 2 == 0 {
            return Ok(Value::String(format!("{}{}", escaped, &token[dollars..])));
        }

        if self.stack.iter().any(|t| t == token) {
            let mut chain = self.stack.clone();
            chain.push(token.to_string());
            return Err(ExpansionError::Recursive(chain.join(" -> ")));
        }

        self.stack.push(token.to_string());
        // strip the `$` run, the opening brace and the closing brace
        let result = self.resolve(&token[dollars + 1..token.len() - 1]);
        self.stack.pop();

        let value = result?;
        if escaped.is_empty() {
            Ok(value)
        } else {
            Ok(Value::String(format!("{}{}", escaped, display_value(&value))))
        }
    }

    fn resolve(&mut self, body: &str) -> ExpansionResult<Value> {
        let caps = body_regex()
            .captures(body)
            .ok_or_else(|| ExpansionError::Malformed(body.to_string()))?;

        let namespace = caps.get(1).map_or("", |m| m.as_str());
        let rest = caps.get(2).map_or("", |m| m.as_str());

        match namespace {
            "vars" => self.lookup_vars(rest),
            "args" => self.lookup_args(rest),
            _ => self.scope.expand_custom(namespace, rest),
        }
    }

    fn lookup_vars(&mut self, path: &str) -> ExpansionResult<Value> {
        let segments: Vec<&str> = path.split('.').collect();
        let full_name = format!("vars.{}", path);
        let origin = self.scope;

        let mut current = Some(origin);
        while let Some(scope) = current {
            if let Some(vars) = scope.task().and_then(|task| task.get(keys::VARS)) {
                let found =
                    self.in_scope(scope, |e| e.lookup_in_section(vars, &segments, &full_name))?;
                if let Some(value) = found {
                    return Ok(value);
                }
            }

            current = scope.parent();
        }

        if let Some(vars) = origin.config().get(keys::VARS) {
            if let Some(value) = self.lookup_in_section(vars, &segments, &full_name)? {
                return Ok(value);
            }
        }

        Err(ExpansionError::UndefinedVariable(full_name))
    }

    fn lookup_args(&mut self, path: &str) -> ExpansionResult<Value> {
        let segments: Vec<&str> = path.split('.').collect();
        let full_name = format!("args.{}", path);
        let args = self.scope.args();

        self.lookup_in_mapping(args, &segments, &full_name)?
            .ok_or(ExpansionError::UndefinedVariable(full_name))
    }

    fn lookup_in_section(
        &mut self,
        section: &Value,
        segments: &[&str],
        full_name: &str,
    ) -> ExpansionResult<Option<Value>> {
        match self.expand(section, false)? {
            Value::Mapping(mapping) => self.lookup_in_mapping(&mapping, segments, full_name),
            _ => Err(ExpansionError::NotMapping(keys::VARS.to_string())),
        }
    }

    /// Walk `segments` from `mapping`, expanding every value on the way.
    /// `None` means the first segment is not defined here.
    fn lookup_in_mapping(
        &mut self,
        mapping: &Mapping,
        segments: &[&str],
        full_name: &str,
    ) -> ExpansionResult<Option<Value>> {
        let Some((first, rest)) = segments.split_first() else {
            return Ok(None);
        };

        let Some(raw) = mapping.get(*first) else {
            return Ok(None);
        };

        let mut current = self.expand(raw, false)?;
        for segment in rest {
            let next = match &current {
                Value::Mapping(inner) => match inner.get(*segment) {
                    Some(raw) => self.expand(raw, false)?,
                    None => return Err(ExpansionError::UndefinedVariable(full_name.to_string())),
                },
                _ => return Err(ExpansionError::UndefinedVariable(full_name.to_string())),
            };
            current = next;
        }

        Ok(Some(current))
    }

    fn in_scope<T>(&mut self, scope: &'s dyn Scope, f: impl FnOnce(&mut Self) -> T) -> T {
        let saved = mem::replace(&mut self.scope, scope);
        let result = f(self);
        self.scope = saved;
        result
    }
}

/// Text substituted for a value inside a longer string
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Sequence(sequence) => format!(
            "[{}]",
            sequence.iter().map(display_value).collect::<Vec<_>>().join(", ")
        ),
        Value::Mapping(mapping) => format!(
            "{{{}}}",
            mapping
                .iter()
                .map(|(k, v)| format!("{}: {}", display_value(k), display_value(v)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        Value::Tagged(tagged) => display_value(&tagged.value),
    }
}
