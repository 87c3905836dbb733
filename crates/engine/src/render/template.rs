//! Built-in template language.
//!
//! | Tag | Meaning |
//! |---|---|
//! | `{{ data.price }}` | lookup, HTML-escaped |
//! | `{{{ components.badge }}}` | lookup, inserted raw |
//! | `{{ currency data.price "USD" }}` | helper call with path or literal arguments |
//!
//! Lookups start at one of the scope roots: `data`, `params`, `title`,
//! `device`, `level`, `component`, `view`, `components`. Missing values
//! render as the empty string.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::context::{ComponentContext, Helper};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
	#[error("unterminated tag at byte {0}")]
	Unterminated(usize),

	#[error("empty tag at byte {0}")]
	EmptyTag(usize),

	#[error("unterminated string literal in tag at byte {0}")]
	UnterminatedString(usize),
}

/// Parsed template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
	nodes: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
	Text(String),
	Expr { expr: Expr, escape: bool },
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
	/// A bare word: a zero-argument helper if one is registered, else a path.
	Word(String),
	Call { helper: String, args: Vec<Arg> },
}

#[derive(Debug, Clone, PartialEq)]
enum Arg {
	Path(String),
	Literal(Value),
}

impl Template {
	pub fn parse(source: &str) -> Result<Self, TemplateError> {
		let mut nodes = Vec::new();
		let mut rest = source;
		let mut offset = 0;

		while let Some(start) = rest.find("{{") {
			if start > 0 {
				nodes.push(Node::Text(rest[..start].to_string()));
			}
			let raw = rest[start..].starts_with("{{{");
			let (open, close) = if raw { ("{{{", "}}}") } else { ("{{", "}}") };
			let body_start = start + open.len();
			let end = rest[body_start..]
				.find(close)
				.ok_or(TemplateError::Unterminated(offset + start))?;
			let body = &rest[body_start..body_start + end];
			nodes.push(Node::Expr {
				expr: parse_expr(body, offset + start)?,
				escape: !raw,
			});

			let consumed = body_start + end + close.len();
			offset += consumed;
			rest = &rest[consumed..];
		}
		if !rest.is_empty() {
			nodes.push(Node::Text(rest.to_string()));
		}
		Ok(Self { nodes })
	}

	/// Renders against `scope`, resolving helper names through `helper`.
	pub fn render<'h>(&self, scope: &Value, helper: impl Fn(&str) -> Option<&'h Helper>) -> String {
		let mut out = String::new();
		for node in &self.nodes {
			match node {
				Node::Text(text) => out.push_str(text),
				Node::Expr { expr, escape } => {
					let value = match expr {
						Expr::Word(word) => match helper(word) {
							Some(h) => h.call(&[]),
							None => lookup(scope, word).cloned().unwrap_or(Value::Null),
						},
						Expr::Call { helper: name, args } => {
							let args: Vec<Value> = args
								.iter()
								.map(|arg| match arg {
									Arg::Path(path) => lookup(scope, path).cloned().unwrap_or(Value::Null),
									Arg::Literal(value) => value.clone(),
								})
								.collect();
							match helper(name) {
								Some(h) => h.call(&args),
								None => {
									tracing::debug!(helper = %name, "template.unknown_helper");
									Value::Null
								}
							}
						}
					};
					let text = stringify(&value);
					if *escape {
						escape_html_into(&text, &mut out);
					} else {
						out.push_str(&text);
					}
				}
			}
		}
		out
	}
}

fn parse_expr(body: &str, at: usize) -> Result<Expr, TemplateError> {
	let mut tokens = tokenize(body, at)?.into_iter();
	let Some(Token::Word(first)) = tokens.next() else {
		return Err(TemplateError::EmptyTag(at));
	};
	let args: Vec<Arg> = tokens
		.map(|token| match token {
			Token::Word(word) => literal(&word).map(Arg::Literal).unwrap_or(Arg::Path(word)),
			Token::Quoted(text) => Arg::Literal(Value::String(text)),
		})
		.collect();
	Ok(if args.is_empty() { Expr::Word(first) } else { Expr::Call { helper: first, args } })
}

enum Token {
	Word(String),
	Quoted(String),
}

fn tokenize(body: &str, at: usize) -> Result<Vec<Token>, TemplateError> {
	let mut tokens = Vec::new();
	let mut chars = body.trim().chars().peekable();
	while let Some(&c) = chars.peek() {
		if c.is_whitespace() {
			chars.next();
		} else if c == '"' || c == '\'' {
			chars.next();
			let mut text = String::new();
			loop {
				match chars.next() {
					Some(ch) if ch == c => break,
					Some('\\') => text.extend(chars.next()),
					Some(ch) => text.push(ch),
					None => return Err(TemplateError::UnterminatedString(at)),
				}
			}
			tokens.push(Token::Quoted(text));
		} else {
			let mut word = String::new();
			while let Some(&ch) = chars.peek() {
				if ch.is_whitespace() {
					break;
				}
				word.push(ch);
				chars.next();
			}
			tokens.push(Token::Word(word));
		}
	}
	Ok(tokens)
}

fn literal(word: &str) -> Option<Value> {
	match word {
		"true" => Some(Value::Bool(true)),
		"false" => Some(Value::Bool(false)),
		"null" => Some(Value::Null),
		_ if word.starts_with(|c: char| c.is_ascii_digit() || c == '-') => serde_json::from_str::<serde_json::Number>(word).ok().map(Value::Number),
		_ => None,
	}
}

fn lookup<'v>(scope: &'v Value, path: &str) -> Option<&'v Value> {
	path.split('.').try_fold(scope, |value, segment| match value {
		Value::Object(map) => map.get(segment),
		Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
		_ => None,
	})
}

fn stringify(value: &Value) -> String {
	match value {
		Value::Null => String::new(),
		Value::String(s) => s.clone(),
		other => other.to_string(),
	}
}

pub(crate) fn escape_html_into(text: &str, out: &mut String) {
	for c in text.chars() {
		match c {
			'&' => out.push_str("&amp;"),
			'<' => out.push_str("&lt;"),
			'>' => out.push_str("&gt;"),
			'"' => out.push_str("&quot;"),
			'\'' => out.push_str("&#39;"),
			c => out.push(c),
		}
	}
}

pub(crate) fn escape_html(text: &str) -> String {
	let mut out = String::with_capacity(text.len());
	escape_html_into(text, &mut out);
	out
}

/// Scope object templates are evaluated against.
pub fn scope(ctx: &ComponentContext) -> Value {
	let components: Map<String, Value> = ctx
		.components()
		.iter()
		.map(|(name, markup)| (name.clone(), Value::String(String::from_utf8_lossy(markup).into_owned())))
		.collect();
	let view = ctx.view();

	let mut root = Map::new();
	root.insert("data".into(), Value::Object(ctx.public_data().clone()));
	root.insert("params".into(), ctx.params().to_value());
	root.insert("title".into(), ctx.title().map(Value::from).unwrap_or(Value::Null));
	root.insert("device".into(), Value::from(ctx.device().as_str()));
	root.insert("level".into(), Value::from(ctx.level()));
	root.insert("component".into(), Value::from(&*view.component));
	root.insert("view".into(), Value::from(&*view.name));
	root.insert("components".into(), Value::Object(components));
	Value::Object(root)
}
