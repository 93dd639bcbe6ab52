use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::controller::{FormController, FormError, FormResult, read_lock, write_lock};
use super::schema::{Check, FieldKey, FieldSpec, ValueKind};

pub type FormValues = BTreeMap<FieldKey, Value>;

/// Rejection reason of a single field.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ValidationError {
    message: Cow<'static, str>,
}

impl ValidationError {
    pub fn new(message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ValidationError {}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum FieldStatus {
    #[default]
    Unvalidated,
    Valid,
    Invalid(ValidationError),
}

impl FieldStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, FieldStatus::Valid)
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, FieldStatus::Invalid(_))
    }

    pub fn error(&self) -> Option<&ValidationError> {
        match self {
            FieldStatus::Invalid(error) => Some(error),
            _ => None,
        }
    }
}

pub trait FieldValidator: Send + Sync {
    fn validate(&self, values: &FormValues, value: &Value) -> Result<(), ValidationError>;
}

impl<F> FieldValidator for F
where
    F: Fn(&FormValues, &Value) -> Result<(), ValidationError> + Send + Sync,
{
    fn validate(&self, values: &FormValues, value: &Value) -> Result<(), ValidationError> {
        (self)(values, value)
    }
}

pub type BoxedValidationFuture<'a> = BoxFuture<'a, Result<(), ValidationError>>;

pub trait AsyncFieldValidator: Send + Sync {
    type Fut<'a>: Future<Output = Result<(), ValidationError>> + Send + 'a
    where
        Self: 'a;

    fn validate<'a>(&'a self, values: &'a FormValues, value: &'a Value) -> Self::Fut<'a>;
}

impl<F> AsyncFieldValidator for F
where
    F: for<'a> Fn(&'a FormValues, &'a Value) -> BoxedValidationFuture<'a> + Send + Sync,
{
    type Fut<'a>
        = BoxedValidationFuture<'a>
    where
        Self: 'a;

    fn validate<'a>(&'a self, values: &'a FormValues, value: &'a Value) -> Self::Fut<'a> {
        (self)(values, value)
    }
}

pub(super) type SyncFieldValidatorFn =
    Arc<dyn Fn(&FormValues, &Value) -> Result<(), ValidationError> + Send + Sync>;
pub(super) type AsyncFieldValidatorFn =
    Arc<dyn Fn(Arc<FormValues>, Value) -> BoxedValidationFuture<'static> + Send + Sync>;

#[derive(Clone)]
pub(super) enum ValidatorEntry {
    Sync(SyncFieldValidatorFn),
    Async(AsyncFieldValidatorFn),
}

impl<T> FormController<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    /// Runs every field's validator chain and records one status per field.
    ///
    /// Fields are validated concurrently and the statuses are written in a
    /// single step once all of them settled. When the values changed or a
    /// newer validation started in the meantime, nothing is written and the
    /// call resolves `false`.
    pub async fn valid(&self) -> FormResult<bool> {
        let (ticket, values) = {
            let mut state = write_lock(&self.state, "starting form validation")?;
            let ticket = state.advance();
            state.pending = Some(ticket);
            (ticket, Arc::new(state.values.clone()))
        };

        let outcomes = join_all(self.model.fields().iter().map(|spec| {
            let values = values.clone();
            async move { (spec.key(), run_chain(spec, values).await) }
        }))
        .await;
        let is_valid = outcomes.iter().all(|(_, status)| status.is_valid());

        let mut state = write_lock(&self.state, "applying form validation result")?;
        if state.sequence != ticket {
            tracing::debug!(
                form_id = %self.form_id,
                ticket = ticket.0,
                current = state.sequence.0,
                "discarding stale form validation"
            );
            return Ok(false);
        }
        for (key, status) in outcomes {
            state.ensure_meta(key).status = status;
        }
        state.pending = None;
        state.validated = is_valid.then_some(ticket);
        tracing::debug!(form_id = %self.form_id, is_valid, "form validation settled");
        Ok(is_valid)
    }

    /// Validates a single field and records its status unless the values
    /// changed while the chain was running.
    pub async fn validate_field(&self, field: impl Into<FieldKey>) -> FormResult<FieldStatus> {
        let key = self.known_key(field.into())?;
        let spec = self
            .model
            .field(key)
            .ok_or_else(|| FormError::UnknownField(key.to_string()))?;
        let (sequence, values) = {
            let state = read_lock(&self.state, "reading values for field validation")?;
            (state.sequence, Arc::new(state.values.clone()))
        };

        let status = run_chain(spec, values).await;

        let mut state = write_lock(&self.state, "writing field validation result")?;
        if state.sequence != sequence {
            tracing::debug!(form_id = %self.form_id, field = %key, "discarding stale field validation");
            return Ok(status);
        }
        if !status.is_valid() {
            state.validated = None;
        }
        state.ensure_meta(key).status = status.clone();
        Ok(status)
    }
}

async fn run_chain(spec: &FieldSpec, values: Arc<FormValues>) -> FieldStatus {
    let value = values.get(&spec.key()).cloned().unwrap_or(Value::Null);
    if let Err(error) = structural_checks(spec, &value) {
        return FieldStatus::Invalid(error);
    }

    for entry in spec.validators() {
        let result = match entry {
            ValidatorEntry::Sync(validator) => {
                panic::catch_unwind(AssertUnwindSafe(|| validator(&values, &value)))
                    .unwrap_or_else(|_| Err(validator_failed(spec.key())))
            }
            ValidatorEntry::Async(validator) => {
                let pending = async { validator(values.clone(), value.clone()).await };
                AssertUnwindSafe(pending)
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| Err(validator_failed(spec.key())))
            }
        };
        if let Err(error) = result {
            return FieldStatus::Invalid(error);
        }
    }
    FieldStatus::Valid
}

fn validator_failed(key: FieldKey) -> ValidationError {
    tracing::warn!(field = %key, "validator panicked, rejecting field");
    ValidationError::new("validator failed unexpectedly")
}

fn structural_checks(spec: &FieldSpec, value: &Value) -> Result<(), ValidationError> {
    check_item(spec.kind(), spec.is_optional(), spec.checks(), value)?;
    match spec.decode() {
        Some(decode) if !value.is_null() => decode(value),
        _ => Ok(()),
    }
}

impl Check {
    pub fn apply(&self, value: &Value) -> Result<(), ValidationError> {
        match self {
            Check::MinLength(min) => match length_of(value) {
                Some(length) if length < *min => Err(ValidationError::new(format!(
                    "must be at least {min} {}",
                    length_unit(value)
                ))),
                _ => Ok(()),
            },
            Check::MaxLength(max) => match length_of(value) {
                Some(length) if length > *max => Err(ValidationError::new(format!(
                    "must be at most {max} {}",
                    length_unit(value)
                ))),
                _ => Ok(()),
            },
            Check::Min(min) => match value.as_f64() {
                Some(number) if number < *min => {
                    Err(ValidationError::new(format!("must be at least {min}")))
                }
                _ => Ok(()),
            },
            Check::Max(max) => match value.as_f64() {
                Some(number) if number > *max => {
                    Err(ValidationError::new(format!("must be at most {max}")))
                }
                _ => Ok(()),
            },
            Check::Integer => match value.as_f64() {
                Some(number) if number.fract() != 0.0 => {
                    Err(ValidationError::new("must be an integer"))
                }
                _ => Ok(()),
            },
            Check::OneOf(options) => {
                if options.iter().any(|option| same_value(option, value)) {
                    Ok(())
                } else {
                    let listed = options
                        .iter()
                        .map(|option| match option {
                            Value::String(text) => text.clone(),
                            other => other.to_string(),
                        })
                        .collect::<Vec<_>>()
                        .join(", ");
                    Err(ValidationError::new(format!("must be one of {listed}")))
                }
            }
            Check::MustBeTrue => match value {
                Value::Bool(true) => Ok(()),
                _ => Err(ValidationError::new("must be checked")),
            },
            Check::Email => match value.as_str() {
                Some(text) if is_email(text) => Ok(()),
                _ => Err(ValidationError::new("must be a valid email address")),
            },
            Check::Items {
                kind,
                nullable,
                checks,
            } => {
                let Some(items) = value.as_array() else {
                    return Ok(());
                };
                items.iter().enumerate().try_for_each(|(index, item)| {
                    check_item(*kind, *nullable, checks, item).map_err(|error| {
                        ValidationError::new(format!("item {} {}", index + 1, error.message()))
                    })
                })
            }
            Check::Refinement { check, .. } => check(value),
        }
    }
}

fn check_item(
    kind: ValueKind,
    nullable: bool,
    checks: &[Check],
    item: &Value,
) -> Result<(), ValidationError> {
    if item.is_null() {
        return if nullable {
            Ok(())
        } else {
            Err(ValidationError::new("is required"))
        };
    }
    if !kind.accepts(item) {
        return Err(ValidationError::new(format!("must be {}", kind.describe())));
    }
    checks.iter().try_for_each(|check| check.apply(item))
}

fn length_of(value: &Value) -> Option<usize> {
    match value {
        Value::String(text) => Some(text.chars().count()),
        Value::Array(items) => Some(items.len()),
        _ => None,
    }
}

fn length_unit(value: &Value) -> &'static str {
    if value.is_array() { "items" } else { "characters" }
}

// `2` and `2.0` are the same option.
fn same_value(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(left), Value::Number(right)) => left.as_f64() == right.as_f64(),
        _ => left == right,
    }
}

pub(crate) fn is_email(text: &str) -> bool {
    if text.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = text.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}
