//! Expression and template evaluation.
//!
//! Flows reference live state two ways: templates splice values into text
//! (`Hi @contact.name`, `@(contact.fields.age >= 18)`) and router cases
//! evaluate boolean expressions (`child.status == "completed"`). The
//! grammar is intentionally small — dotted-path lookups against the run
//! context, the six comparison operators, `&&`/`||`/`!`, and
//! string/number/bool/null literals. Numbers compare as f64, and strings
//! that parse as numbers coerce so `input.text > 10` behaves the way flow
//! authors expect. There are no function calls, indexing, or arithmetic.
//!
//! Lookup is strict: a missing key, or a property read on a null value, is
//! a [`ExpressionError::Resolve`] error. Templates evaluate best-effort —
//! each failed splice renders as the empty string and its error is
//! collected on the result, so callers can log error events without
//! halting the flow.

use std::cmp::Ordering;

use serde_json::Value;
use thiserror::Error;

/// Context roots that `@` may refer to in a template. Anything else after
/// an `@` is left as literal text (`foo@bar.com` is not a template).
const CONTEXT_ROOTS: &[&str] = &[
    "contact", "run", "parent", "child", "results", "input", "trigger", "webhook",
];

/// Errors from expression evaluation.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum ExpressionError {
    #[error("parse error: {message}")]
    Parse { message: String },
    #[error("unable to resolve '{path}'")]
    Resolve { path: String },
}

fn parse_error(message: impl Into<String>) -> ExpressionError {
    ExpressionError::Parse {
        message: message.into(),
    }
}

/// Evaluate an expression against the run context, returning its value.
pub fn evaluate_expression(expression: &str, context: &Value) -> Result<Value, ExpressionError> {
    let mut lexer = Lexer::new(expression);
    let value = eval_expr(&mut lexer, context, 0)?;
    match lexer.next()? {
        None => Ok(value),
        Some(tok) => Err(parse_error(format!("unexpected token: {tok:?}"))),
    }
}

/// Evaluate an expression and coerce the result to a boolean. Used by
/// router cases.
pub fn evaluate_bool(expression: &str, context: &Value) -> Result<bool, ExpressionError> {
    evaluate_expression(expression, context).map(|v| truthy(&v))
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

/// Result of evaluating a template: the substituted text plus any
/// resolution or parse errors encountered along the way.
#[derive(Debug, Clone, Default)]
pub struct Evaluated {
    pub text: String,
    pub errors: Vec<ExpressionError>,
}

impl Evaluated {
    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Evaluate a template string, splicing `@path` and `@(expr)` against the
/// context. Failed splices render as the empty string and their errors are
/// collected on the result. `@@` escapes a literal `@`.
pub fn evaluate_template(template: &str, context: &Value) -> Evaluated {
    let mut out = Evaluated::default();
    let mut rest = template;

    while let Some(at) = rest.find('@') {
        out.text.push_str(&rest[..at]);
        let after = &rest[at + 1..];

        // @@ is a literal @
        if let Some(tail) = after.strip_prefix('@') {
            out.text.push('@');
            rest = tail;
            continue;
        }

        // @( balanced-parenthesis expression
        if after.starts_with('(') {
            match matching_paren(after) {
                Some(close) => {
                    match evaluate_expression(&after[1..close], context) {
                        Ok(value) => out.text.push_str(&stringify(&value)),
                        Err(e) => out.errors.push(e),
                    }
                    rest = &after[close + 1..];
                }
                None => {
                    out.errors.push(parse_error("unterminated expression"));
                    rest = "";
                }
            }
            continue;
        }

        // @path.to.value — only for known context roots
        let len = after
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '.'))
            .unwrap_or(after.len());
        let path = after[..len].trim_end_matches('.');
        let root = path.split('.').next().unwrap_or_default();
        if path.is_empty() || !CONTEXT_ROOTS.contains(&root) {
            out.text.push('@');
            rest = after;
            continue;
        }
        match lookup(context, path) {
            Ok(value) => out.text.push_str(&stringify(value)),
            Err(e) => out.errors.push(e),
        }
        rest = &after[path.len()..];
    }
    out.text.push_str(rest);
    out
}

/// Byte index of the `)` matching the `(` at the start of `s`, honoring
/// quoted strings inside the expression.
fn matching_paren(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (idx, c) in s.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' => quote = Some(c),
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(idx);
                    }
                }
                _ => {}
            },
        }
    }
    None
}

/// Render a JSON value the way templates splice it: null is empty, strings
/// are unquoted, composites render as compact JSON.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Or,
    And,
    Not,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Two-character operators must come before their one-character prefixes.
const OPERATORS: &[(&str, Op)] = &[
    ("==", Op::Eq),
    ("!=", Op::Ne),
    (">=", Op::Ge),
    ("<=", Op::Le),
    ("&&", Op::And),
    ("||", Op::Or),
    (">", Op::Gt),
    ("<", Op::Lt),
    ("!", Op::Not),
];

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    /// A literal: string, number, bool or null.
    Lit(Value),
    /// A dotted path resolved against the context.
    Path(String),
    Op(Op),
}

/// Produces tokens on demand from a source slice, with one token of
/// lookahead. No intermediate token list is built.
struct Lexer<'a> {
    rest: &'a str,
    pending: Option<Tok>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            rest: src,
            pending: None,
        }
    }

    fn peek(&mut self) -> Result<Option<&Tok>, ExpressionError> {
        if self.pending.is_none() {
            self.pending = self.scan()?;
        }
        Ok(self.pending.as_ref())
    }

    fn next(&mut self) -> Result<Option<Tok>, ExpressionError> {
        match self.pending.take() {
            Some(tok) => Ok(Some(tok)),
            None => self.scan(),
        }
    }

    fn scan(&mut self) -> Result<Option<Tok>, ExpressionError> {
        self.rest = self.rest.trim_start();
        let Some(first) = self.rest.chars().next() else {
            return Ok(None);
        };

        for (symbol, op) in OPERATORS {
            if let Some(tail) = self.rest.strip_prefix(symbol) {
                self.rest = tail;
                return Ok(Some(Tok::Op(*op)));
            }
        }

        match first {
            '\'' | '"' => {
                let body = &self.rest[1..];
                let Some(close) = body.find(first) else {
                    return Err(parse_error("unterminated string literal"));
                };
                let tok = Tok::Lit(Value::String(body[..close].to_string()));
                self.rest = &body[close + 1..];
                Ok(Some(tok))
            }
            c if c.is_ascii_digit() || c == '-' => {
                // the sign is consumed here; there is no subtraction
                let digits = self.rest[1..]
                    .find(|c: char| !c.is_ascii_digit() && c != '.')
                    .map_or(self.rest.len(), |i| i + 1);
                let raw = &self.rest[..digits];
                let num: f64 = raw
                    .parse()
                    .map_err(|_| parse_error(format!("invalid number: {raw}")))?;
                self.rest = &self.rest[digits..];
                Ok(Some(Tok::Lit(
                    serde_json::Number::from_f64(num)
                        .map(Value::Number)
                        .unwrap_or(Value::Null),
                )))
            }
            c if c == '_' || c.is_ascii_alphabetic() => {
                let end = self
                    .rest
                    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '.'))
                    .unwrap_or(self.rest.len());
                let word = &self.rest[..end];
                self.rest = &self.rest[end..];
                Ok(Some(match word {
                    "true" => Tok::Lit(Value::Bool(true)),
                    "false" => Tok::Lit(Value::Bool(false)),
                    "null" => Tok::Lit(Value::Null),
                    _ => Tok::Path(word.to_string()),
                }))
            }
            other => Err(parse_error(format!("unexpected character: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation — precedence climbing over the token stream
// ---------------------------------------------------------------------------

/// Binding power of an infix operator; `!` is prefix-only.
fn binding_power(op: Op) -> Option<u8> {
    match op {
        Op::Or => Some(1),
        Op::And => Some(2),
        Op::Eq | Op::Ne | Op::Lt | Op::Le | Op::Gt | Op::Ge => Some(3),
        Op::Not => None,
    }
}

fn eval_expr(
    lexer: &mut Lexer<'_>,
    context: &Value,
    min_power: u8,
) -> Result<Value, ExpressionError> {
    let mut left = eval_operand(lexer, context)?;

    loop {
        let Some(Tok::Op(op)) = lexer.peek()? else {
            break;
        };
        let op = *op;
        let Some(power) = binding_power(op) else {
            return Err(parse_error("'!' is not an infix operator"));
        };
        if power < min_power {
            break;
        }
        lexer.next()?;
        let right = eval_expr(lexer, context, power + 1)?;
        left = Value::Bool(match op {
            Op::Or => truthy(&left) || truthy(&right),
            Op::And => truthy(&left) && truthy(&right),
            op => compare(op, &left, &right),
        });
    }
    Ok(left)
}

fn eval_operand(lexer: &mut Lexer<'_>, context: &Value) -> Result<Value, ExpressionError> {
    match lexer.next()? {
        Some(Tok::Op(Op::Not)) => {
            let value = eval_operand(lexer, context)?;
            Ok(Value::Bool(!truthy(&value)))
        }
        Some(Tok::Lit(value)) => Ok(value),
        Some(Tok::Path(path)) => lookup(context, &path).cloned(),
        Some(Tok::Op(op)) => Err(parse_error(format!("expected a value, found {op:?}"))),
        None => Err(parse_error("unexpected end of expression")),
    }
}

/// Comparison semantics: null only ever equals null, numbers (and numeric
/// strings) compare as f64, strings compare lexicographically, bools
/// support equality only, and mismatched types compare false.
fn compare(op: Op, left: &Value, right: &Value) -> bool {
    match (left.is_null(), right.is_null()) {
        (false, false) => {}
        (l, r) => {
            return match op {
                Op::Eq => l && r,
                Op::Ne => !(l && r),
                _ => false,
            }
        }
    }
    if let (Some(l), Some(r)) = (numeric(left), numeric(right)) {
        return l.partial_cmp(&r).is_some_and(|ord| ord_matches(op, ord));
    }
    if let (Value::String(l), Value::String(r)) = (left, right) {
        return ord_matches(op, l.cmp(r));
    }
    if let (Value::Bool(l), Value::Bool(r)) = (left, right) {
        return match op {
            Op::Eq => l == r,
            Op::Ne => l != r,
            _ => false,
        };
    }
    false
}

fn ord_matches(op: Op, ord: Ordering) -> bool {
    match op {
        Op::Eq => ord == Ordering::Equal,
        Op::Ne => ord != Ordering::Equal,
        Op::Lt => ord == Ordering::Less,
        Op::Le => ord != Ordering::Greater,
        Op::Gt => ord == Ordering::Greater,
        Op::Ge => ord != Ordering::Less,
        Op::And | Op::Or | Op::Not => false,
    }
}

/// Numeric view of a value, coercing numeric strings.
fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Boolean view of a value: null and empty strings are false, zero is
/// false, composites are true.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Walk a dotted path through the context. Missing keys and property reads
/// on null values are resolution errors.
fn lookup<'v>(context: &'v Value, path: &str) -> Result<&'v Value, ExpressionError> {
    path.split('.').try_fold(context, |parent, key| {
        parent.get(key).ok_or_else(|| ExpressionError::Resolve {
            path: path.to_string(),
        })
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> Value {
        json!({
            "contact": {"name": "Ryan Lewis", "fields": {"age": 27}},
            "run": {"status": "active"},
            "parent": null,
            "child": {"status": "completed"},
            "results": {"name": "Bob"},
            "input": {"text": "blue"},
            "trigger": {"type": "manual"},
            "webhook": null,
        })
    }

    #[test]
    fn test_equality() {
        assert!(evaluate_bool(r#"child.status == "completed""#, &ctx()).unwrap());
        assert!(!evaluate_bool(r#"child.status == "failed""#, &ctx()).unwrap());
    }

    #[test]
    fn test_inequality() {
        assert!(evaluate_bool(r#"input.text != """#, &ctx()).unwrap());
    }

    #[test]
    fn test_numeric_comparison() {
        assert!(evaluate_bool("contact.fields.age > 18", &ctx()).unwrap());
        assert!(!evaluate_bool("contact.fields.age < 18", &ctx()).unwrap());
        assert!(evaluate_bool("contact.fields.age >= 27", &ctx()).unwrap());
        assert!(evaluate_bool("contact.fields.age <= 27", &ctx()).unwrap());
    }

    #[test]
    fn test_numeric_string_coercion() {
        let c = json!({"input": {"text": "27"}});
        assert!(evaluate_bool("input.text > 18", &c).unwrap());
        assert!(evaluate_bool("input.text == 27", &c).unwrap());
        assert!(evaluate_bool("input.text == 27.0", &c).unwrap());
    }

    #[test]
    fn test_logical_ops() {
        assert!(evaluate_bool(r#"input.text == "blue" && contact.fields.age > 18"#, &ctx()).unwrap());
        assert!(evaluate_bool(r#"input.text == "red" || contact.fields.age > 18"#, &ctx()).unwrap());
        assert!(!evaluate_bool("!contact.name", &ctx()).unwrap());
    }

    #[test]
    fn test_precedence_and_binds_tighter_than_or() {
        // parsed as a || (b && c): true || (false && false)
        let c = json!({"input": {"text": "blue"}});
        assert!(evaluate_bool(
            r#"input.text == "blue" || input.text == "red" && input.text == "green""#,
            &c
        )
        .unwrap());
    }

    #[test]
    fn test_null_comparison() {
        assert!(evaluate_bool("webhook == null", &ctx()).unwrap());
        assert!(evaluate_bool("parent == null", &ctx()).unwrap());
        assert!(!evaluate_bool("child == null", &ctx()).unwrap());
        assert!(evaluate_bool("webhook != child", &ctx()).unwrap());
    }

    #[test]
    fn test_missing_key_is_resolve_error() {
        let err = evaluate_bool("results.missing == 1", &ctx()).unwrap_err();
        assert!(matches!(err, ExpressionError::Resolve { .. }));
    }

    #[test]
    fn test_property_of_null_is_resolve_error() {
        let err = evaluate_bool(r#"parent.status == "active""#, &ctx()).unwrap_err();
        assert!(matches!(err, ExpressionError::Resolve { .. }));
    }

    #[test]
    fn test_expression_value() {
        assert_eq!(
            evaluate_expression("results.name", &ctx()).unwrap(),
            json!("Bob")
        );
        assert_eq!(
            evaluate_expression("contact.fields.age", &ctx()).unwrap(),
            json!(27)
        );
    }

    #[test]
    fn test_invalid_expression() {
        assert!(evaluate_bool("==", &json!({})).is_err());
        assert!(evaluate_bool("", &json!({})).is_err());
        assert!(evaluate_bool("input.text ==", &ctx()).is_err());
        assert!(evaluate_bool("'open", &json!({})).is_err());
    }

    #[test]
    fn template_path_splice() {
        let out = evaluate_template("Hi @contact.name, you said @input.text", &ctx());
        assert!(out.ok());
        assert_eq!(out.text, "Hi Ryan Lewis, you said blue");
    }

    #[test]
    fn template_expression_splice() {
        let out = evaluate_template("adult: @(contact.fields.age >= 18)", &ctx());
        assert!(out.ok());
        assert_eq!(out.text, "adult: true");
    }

    #[test]
    fn template_escape_and_literals() {
        let out = evaluate_template("email me@@example.com or foo@bar.com", &ctx());
        assert!(out.ok());
        assert_eq!(out.text, "email me@example.com or foo@bar.com");
    }

    #[test]
    fn template_missing_renders_empty_and_errors() {
        let out = evaluate_template("name is @contact.missing!", &ctx());
        assert_eq!(out.text, "name is !");
        assert_eq!(out.errors.len(), 1);
    }

    #[test]
    fn template_null_root_property_errors() {
        let c = json!({"contact": null, "input": {"text": "hi"}});
        let out = evaluate_template("Hi @contact.name", &c);
        assert_eq!(out.text, "Hi ");
        assert!(matches!(out.errors[0], ExpressionError::Resolve { .. }));
    }

    #[test]
    fn template_trailing_dot_not_consumed() {
        let out = evaluate_template("you said @input.text.", &ctx());
        assert!(out.ok());
        assert_eq!(out.text, "you said blue.");
    }

    #[test]
    fn template_number_splice_is_unquoted() {
        let out = evaluate_template("age @contact.fields.age", &ctx());
        assert_eq!(out.text, "age 27");
    }

    #[test]
    fn template_composite_splices_as_json() {
        let out = evaluate_template("@trigger", &ctx());
        assert_eq!(out.text, r#"{"type":"manual"}"#);
    }

    #[test]
    fn template_unterminated_expression() {
        let out = evaluate_template("@(input.text == 'x'", &ctx());
        assert_eq!(out.errors.len(), 1);
    }

    #[test]
    fn template_quoted_paren_inside_expression() {
        let c = json!({"input": {"text": ":)"}});
        let out = evaluate_template("@(input.text == ':)')", &c);
        assert!(out.ok());
        assert_eq!(out.text, "true");
    }
}
