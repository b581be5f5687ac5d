//! Field-name case normalization for backend payloads.
//!
//! The adapter builds every payload with camelCase keys. Backends disagree on
//! casing (the reference backend capitalizes every field), so outgoing
//! payloads are rewritten with [`normalize`] and incoming payloads are folded
//! back to camelCase before decoding. Both directions are pure and only touch
//! object keys; string values are never rewritten.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key casing convention expected by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyCase {
	/// `StopOnEntry`
	#[default]
	Pascal,
	/// `stopOnEntry`
	Camel,
	/// `stop_on_entry`
	Snake,
	/// Keys are sent exactly as built.
	Preserve,
}

impl KeyCase {
	/// Converts a single camelCase key to this convention.
	pub fn apply(self, key: &str) -> String {
		match self {
			KeyCase::Pascal => upper_first(key),
			KeyCase::Camel => camel(key),
			KeyCase::Snake => snake(key),
			KeyCase::Preserve => key.to_string(),
		}
	}
}

/// Rewrites every object key in `value` (recursively) to `case`.
pub fn normalize(value: Value, case: KeyCase) -> Value {
	if case == KeyCase::Preserve {
		return value;
	}
	rewrite(value, &|key| case.apply(key))
}

/// Folds every object key in `value` back to camelCase, whatever the source convention.
pub fn to_camel(value: Value) -> Value {
	rewrite(value, &camel)
}

fn rewrite(value: Value, f: &dyn Fn(&str) -> String) -> Value {
	match value {
		Value::Object(map) => {
			let mut out = Map::with_capacity(map.len());
			for (key, inner) in map {
				out.insert(f(&key), rewrite(inner, f));
			}
			Value::Object(out)
		}
		Value::Array(items) => Value::Array(items.into_iter().map(|v| rewrite(v, f)).collect()),
		other => other,
	}
}

fn upper_first(key: &str) -> String {
	let mut chars = key.chars();
	match chars.next() {
		Some(first) => first.to_uppercase().chain(chars).collect(),
		None => String::new(),
	}
}

fn camel(key: &str) -> String {
	let mut out = String::with_capacity(key.len());
	let mut upper_next = false;
	for (i, ch) in key.chars().enumerate() {
		if ch == '_' {
			upper_next = !out.is_empty();
			continue;
		}
		if i == 0 {
			out.extend(ch.to_lowercase());
		} else if upper_next {
			out.extend(ch.to_uppercase());
		} else {
			out.push(ch);
		}
		upper_next = false;
	}
	out
}

fn snake(key: &str) -> String {
	let mut out = String::with_capacity(key.len() + 4);
	for (i, ch) in key.chars().enumerate() {
		if ch.is_uppercase() {
			if i > 0 {
				out.push('_');
			}
			out.extend(ch.to_lowercase());
		} else {
			out.push(ch);
		}
	}
	out
}
