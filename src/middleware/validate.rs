//! JSON body validation.
//!
//! A [`Schema`] is an ordered list of fields, each with a [`Rule`]. Checking a
//! body walks the fields in order and collects every violation, so a client
//! sees all of its mistakes in one response:
//!
//! ```rust
//! use fcodex::middleware::validate::{Rule, Schema};
//! use serde_json::json;
//!
//! let schema = Schema::new()
//!     .field("name", Rule::string().required().min_length(3))
//!     .field("age", Rule::number().min(18.0));
//!
//! let errors = schema.check(&json!({ "name": "Al", "age": 12 }));
//! assert_eq!(errors.len(), 2);
//! assert_eq!(errors[0].message, "Must be at least 3 characters long.");
//! ```

use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::handler::{Middleware, Next};
use crate::request::{BodyError, Request};
use crate::response::Response;
use crate::status::Status;

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"));

static DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("date pattern compiles"));

static URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:https?://)?[\w.\-]+(?:\.[\w.\-]+)+[\w\-._~:/?#\[\]@!$&'()*+,;=]+$")
        .expect("url pattern compiles")
});

/// The shape a field's value must have.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Kind {
    String,
    Number,
    Boolean,
    Array,
    Object,
    /// A string shaped like `local@domain.tld`.
    Email,
    /// A string shaped like `YYYY-MM-DD`.
    Date,
    /// A string shaped like a web address, with or without scheme.
    Url,
}

type CustomCheck = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// Constraints for one field.
#[derive(Clone)]
pub struct Rule {
    kind: Kind,
    required: bool,
    min_length: Option<usize>,
    max_length: Option<usize>,
    min: Option<f64>,
    max: Option<f64>,
    pattern: Option<Regex>,
    custom: Option<CustomCheck>,
}

impl Rule {
    pub fn new(kind: Kind) -> Self {
        Self {
            kind,
            required: false,
            min_length: None,
            max_length: None,
            min: None,
            max: None,
            pattern: None,
            custom: None,
        }
    }

    pub fn string() -> Self { Self::new(Kind::String) }
    pub fn number() -> Self { Self::new(Kind::Number) }
    pub fn boolean() -> Self { Self::new(Kind::Boolean) }
    pub fn array() -> Self { Self::new(Kind::Array) }
    pub fn object() -> Self { Self::new(Kind::Object) }
    pub fn email() -> Self { Self::new(Kind::Email) }
    pub fn date() -> Self { Self::new(Kind::Date) }
    pub fn url() -> Self { Self::new(Kind::Url) }

    /// The field must be present and not `null`.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Minimum length in characters, for strings.
    pub fn min_length(mut self, n: usize) -> Self {
        self.min_length = Some(n);
        self
    }

    /// Maximum length in characters, for strings.
    pub fn max_length(mut self, n: usize) -> Self {
        self.max_length = Some(n);
        self
    }

    /// Inclusive lower bound, for numbers.
    pub fn min(mut self, n: f64) -> Self {
        self.min = Some(n);
        self
    }

    /// Inclusive upper bound, for numbers.
    pub fn max(mut self, n: f64) -> Self {
        self.max = Some(n);
        self
    }

    /// A regex the whole string must match. Anchor it yourself.
    pub fn pattern(mut self, re: Regex) -> Self {
        self.pattern = Some(re);
        self
    }

    /// An extra check run on any present value. `Err` carries the message.
    pub fn custom<F>(mut self, check: F) -> Self
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.custom = Some(Arc::new(check));
        self
    }

    fn check(&self, field: &str, value: &Value, errors: &mut Vec<FieldError>) {
        let mut fail = |message: String| errors.push(FieldError { field: field.to_owned(), message });

        match self.kind {
            Kind::String => match value.as_str() {
                None => fail(format!("Expected a string but got {}.", type_name(value))),
                Some(s) => {
                    let len = s.chars().count();
                    if let Some(min) = self.min_length.filter(|&min| len < min) {
                        fail(format!("Must be at least {min} characters long."));
                    }
                    if let Some(max) = self.max_length.filter(|&max| len > max) {
                        fail(format!("Must be at most {max} characters long."));
                    }
                    if self.pattern.as_ref().is_some_and(|re| !re.is_match(s)) {
                        fail("Does not match the required pattern.".to_owned());
                    }
                }
            },
            Kind::Number => match value.as_f64() {
                None => fail(format!("Expected a number but got {}.", type_name(value))),
                Some(n) => {
                    if let Some(min) = self.min.filter(|&min| n < min) {
                        fail(format!("Must be at least {min}."));
                    }
                    if let Some(max) = self.max.filter(|&max| n > max) {
                        fail(format!("Must be at most {max}."));
                    }
                }
            },
            Kind::Boolean if !value.is_boolean() => {
                fail(format!("Expected a boolean but got {}.", type_name(value)));
            }
            Kind::Array if !value.is_array() => {
                fail(format!("Expected an array but got {}.", type_name(value)));
            }
            Kind::Object if !value.is_object() => {
                fail(format!("Expected an object but got {}.", type_name(value)));
            }
            Kind::Email if !value.as_str().is_some_and(|s| EMAIL.is_match(s)) => {
                fail("Invalid email address.".to_owned());
            }
            Kind::Date if !value.as_str().is_some_and(|s| DATE.is_match(s)) => {
                fail("Invalid date format. Must be YYYY-MM-DD.".to_owned());
            }
            Kind::Url if !value.as_str().is_some_and(|s| URL.is_match(s)) => {
                fail("Invalid URL.".to_owned());
            }
            _ => {}
        }

        if let Some(Err(message)) = self.custom.as_ref().map(|check| check(value)) {
            fail(message);
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("kind", &self.kind)
            .field("required", &self.required)
            .field("min_length", &self.min_length)
            .field("max_length", &self.max_length)
            .field("min", &self.min)
            .field("max", &self.max)
            .field("pattern", &self.pattern.as_ref().map(Regex::as_str))
            .field("custom", &self.custom.is_some())
            .finish()
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One violation, as reported to the client.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// An ordered set of field rules.
#[derive(Clone, Debug, Default)]
pub struct Schema {
    fields: Vec<(String, Rule)>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, rule: Rule) -> Self {
        self.fields.push((name.into(), rule));
        self
    }

    /// Every violation in `body`, in field order. Empty means valid.
    ///
    /// A missing or `null` field fails only if it is required; other rules
    /// apply to present values. A body that is not an object has no fields.
    pub fn check(&self, body: &Value) -> Vec<FieldError> {
        let mut errors = Vec::new();
        for (field, rule) in &self.fields {
            match body.get(field).filter(|v| !v.is_null()) {
                Some(value) => rule.check(field, value, &mut errors),
                None if rule.required => errors.push(FieldError {
                    field: field.clone(),
                    message: "This field is required.".to_owned(),
                }),
                None => {}
            }
        }
        errors
    }
}

/// Checks the JSON body against `schema` before the pipeline continues.
///
/// Violations answer `400 {"errors": [{"field", "message"}, ...]}`. A body
/// that is not valid JSON answers `400` with a single `body` error. A
/// missing body is checked as an empty object. Transport failures are
/// escalated, which the dispatcher turns into a 500.
pub fn validate(schema: Schema) -> impl Middleware {
    let schema = Arc::new(schema);
    move |req: Request, res: Response, next: Next| {
        let schema = Arc::clone(&schema);
        async move {
            let errors = match req.json().await {
                Ok(body) => schema.check(body.unwrap_or(&json!({}))),
                Err(e @ BodyError::Parse(_)) => {
                    vec![FieldError { field: "body".to_owned(), message: e.to_string() }]
                }
                Err(e) => return Err(e),
            };

            if errors.is_empty() {
                next.proceed();
            } else {
                debug!(url = req.url(), violations = errors.len(), "request body rejected");
                res.status(Status::BadRequest).json(&json!({ "errors": errors }));
            }
            Ok(())
        }
    }
}
