use std::collections::BTreeSet;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::controller::{FormError, FormResult};
use super::validation::{
    AsyncFieldValidator, AsyncFieldValidatorFn, BoxedValidationFuture, FieldValidator, FormValues,
    SyncFieldValidatorFn, ValidationError, ValidatorEntry,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FieldKey(&'static str);

impl FieldKey {
    pub const fn new(value: &'static str) -> Self {
        Self(value)
    }

    pub const fn as_str(self) -> &'static str {
        self.0
    }
}

impl Display for FieldKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

impl From<&'static str> for FieldKey {
    fn from(value: &'static str) -> Self {
        Self(value)
    }
}

/// Strict value kind of a field. Base values are always plain JSON.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValueKind {
    String,
    Number,
    Boolean,
    Array,
    Any,
}

impl ValueKind {
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            ValueKind::String => value.is_string(),
            ValueKind::Number => value.is_number(),
            ValueKind::Boolean => value.is_boolean(),
            ValueKind::Array => value.is_array(),
            ValueKind::Any => true,
        }
    }

    pub(super) fn describe(self) -> &'static str {
        match self {
            ValueKind::String => "a string",
            ValueKind::Number => "a number",
            ValueKind::Boolean => "a boolean",
            ValueKind::Array => "a list",
            ValueKind::Any => "a value",
        }
    }
}

/// Built-in structural check. Checks run in declaration order, before any
/// custom validator of the field.
#[derive(Clone, Debug)]
pub enum Check {
    MinLength(usize),
    MaxLength(usize),
    Min(f64),
    Max(f64),
    Integer,
    OneOf(Vec<Value>),
    MustBeTrue,
    Email,
    /// Runs an element kind and its checks on every item of a list.
    Items {
        kind: ValueKind,
        nullable: bool,
        checks: Vec<Check>,
    },
    Refinement {
        name: &'static str,
        check: fn(&Value) -> Result<(), ValidationError>,
    },
}

#[derive(Clone)]
pub struct FieldSpec {
    key: FieldKey,
    kind: ValueKind,
    optional: bool,
    checks: Vec<Check>,
    decode: Option<DecodeCheck>,
    validators: Vec<ValidatorEntry>,
}

pub(super) type DecodeCheck = fn(&Value) -> Result<(), ValidationError>;

impl FieldSpec {
    pub fn new(key: impl Into<FieldKey>, kind: ValueKind) -> Self {
        Self {
            key: key.into(),
            kind,
            optional: false,
            checks: Vec::new(),
            decode: None,
            validators: Vec::new(),
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    pub fn min_length(self, min: usize) -> Self {
        self.check(Check::MinLength(min))
    }

    pub fn max_length(self, max: usize) -> Self {
        self.check(Check::MaxLength(max))
    }

    pub fn min(self, min: f64) -> Self {
        self.check(Check::Min(min))
    }

    pub fn max(self, max: f64) -> Self {
        self.check(Check::Max(max))
    }

    pub fn integer(self) -> Self {
        self.check(Check::Integer)
    }

    pub fn one_of<I, V>(self, options: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.check(Check::OneOf(options.into_iter().map(Into::into).collect()))
    }

    pub fn must_be_true(self) -> Self {
        self.check(Check::MustBeTrue)
    }

    pub fn email(self) -> Self {
        self.check(Check::Email)
    }

    /// Rejects values that pass every check but still do not deserialize
    /// into `V`. Runs after the checks, before custom validators.
    pub fn decodes_as<V: DeserializeOwned>(mut self) -> Self {
        self.decode = Some(decode_as::<V>);
        self
    }

    pub fn validator<V>(mut self, validator: V) -> Self
    where
        V: FieldValidator + 'static,
    {
        self.validators.push(ValidatorEntry::Sync(wrap_sync(validator)));
        self
    }

    pub fn async_validator<V>(mut self, validator: V) -> Self
    where
        V: AsyncFieldValidator + 'static,
    {
        self.validators
            .push(ValidatorEntry::Async(wrap_async(validator)));
        self
    }

    pub fn key(&self) -> FieldKey {
        self.key
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    pub fn validator_count(&self) -> usize {
        self.validators.len()
    }

    pub(super) fn decode(&self) -> Option<DecodeCheck> {
        self.decode
    }

    pub(super) fn validators(&self) -> &[ValidatorEntry] {
        &self.validators
    }
}

impl Debug for FieldSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldSpec")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("optional", &self.optional)
            .field("checks", &self.checks)
            .field("decodes", &self.decode.is_some())
            .field("validators", &self.validators.len())
            .finish()
    }
}

fn decode_as<V: DeserializeOwned>(value: &Value) -> Result<(), ValidationError> {
    serde_json::from_value::<V>(normalize_number(value.clone()))
        .map(drop)
        .map_err(|error| ValidationError::new(format!("has an unsupported value: {error}")))
}

fn wrap_sync<V>(validator: V) -> SyncFieldValidatorFn
where
    V: FieldValidator + 'static,
{
    let validator = Arc::new(validator);
    Arc::new(move |values: &FormValues, value: &Value| validator.validate(values, value))
}

fn wrap_async<V>(validator: V) -> AsyncFieldValidatorFn
where
    V: AsyncFieldValidator + 'static,
{
    let validator = Arc::new(validator);
    Arc::new(
        move |values: Arc<FormValues>, value: Value| -> BoxedValidationFuture<'static> {
            let validator = validator.clone();
            Box::pin(async move { validator.validate(&values, &value).await })
        },
    )
}

/// Ordered, immutable set of field specs shared by every controller of a form.
#[derive(Clone, Debug, Default)]
pub struct FormModel {
    fields: Vec<FieldSpec>,
}

impl FormModel {
    pub fn builder() -> FormModelBuilder {
        FormModelBuilder::default()
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, key: FieldKey) -> Option<&FieldSpec> {
        self.fields.iter().find(|spec| spec.key == key)
    }

    pub fn contains(&self, key: FieldKey) -> bool {
        self.field(key).is_some()
    }

    /// Resolves a runtime field name to the model's key.
    pub fn lookup(&self, name: &str) -> Option<FieldKey> {
        self.fields
            .iter()
            .map(|spec| spec.key)
            .find(|key| key.as_str() == name)
    }

    pub fn keys(&self) -> impl Iterator<Item = FieldKey> + '_ {
        self.fields.iter().map(|spec| spec.key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Default)]
pub struct FormModelBuilder {
    fields: Vec<FieldSpec>,
    error: Option<FormError>,
}

impl FormModelBuilder {
    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    pub fn validator<V>(self, key: impl Into<FieldKey>, validator: V) -> Self
    where
        V: FieldValidator + 'static,
    {
        self.update(key.into(), |spec| spec.validator(validator))
    }

    pub fn async_validator<V>(self, key: impl Into<FieldKey>, validator: V) -> Self
    where
        V: AsyncFieldValidator + 'static,
    {
        self.update(key.into(), |spec| spec.async_validator(validator))
    }

    pub fn build(self) -> FormResult<FormModel> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let mut seen = BTreeSet::new();
        for spec in &self.fields {
            if !seen.insert(spec.key) {
                return Err(FormError::DuplicateField(spec.key));
            }
        }
        Ok(FormModel {
            fields: self.fields,
        })
    }

    fn update(mut self, key: FieldKey, f: impl FnOnce(FieldSpec) -> FieldSpec) -> Self {
        match self.fields.iter().position(|spec| spec.key == key) {
            Some(index) => {
                let spec = self.fields.remove(index);
                self.fields.insert(index, f(spec));
            }
            None => {
                self.error
                    .get_or_insert(FormError::UnknownField(key.to_string()));
            }
        }
        self
    }
}

/// Rust types usable as a strict field of a derived schema.
pub trait FieldType: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn field_spec(key: FieldKey) -> FieldSpec;
}

impl FieldType for String {
    fn field_spec(key: FieldKey) -> FieldSpec {
        FieldSpec::new(key, ValueKind::String)
    }
}

impl FieldType for bool {
    fn field_spec(key: FieldKey) -> FieldSpec {
        FieldSpec::new(key, ValueKind::Boolean)
    }
}

impl FieldType for Value {
    fn field_spec(key: FieldKey) -> FieldSpec {
        FieldSpec::new(key, ValueKind::Any)
    }
}

impl<T: FieldType> FieldType for Option<T> {
    fn field_spec(key: FieldKey) -> FieldSpec {
        T::field_spec(key).optional()
    }
}

impl<T: FieldType> FieldType for Vec<T> {
    fn field_spec(key: FieldKey) -> FieldSpec {
        let item = T::field_spec(key);
        FieldSpec::new(key, ValueKind::Array).check(Check::Items {
            kind: item.kind,
            nullable: item.optional,
            checks: item.checks,
        })
    }
}

macro_rules! float_field_type {
    ($($ty:ty),*) => {$(
        impl FieldType for $ty {
            fn field_spec(key: FieldKey) -> FieldSpec {
                FieldSpec::new(key, ValueKind::Number)
            }
        }
    )*};
}

macro_rules! signed_field_type {
    ($($ty:ty),*) => {$(
        impl FieldType for $ty {
            fn field_spec(key: FieldKey) -> FieldSpec {
                FieldSpec::new(key, ValueKind::Number)
                    .integer()
                    .min(<$ty>::MIN as f64)
                    .max(<$ty>::MAX as f64)
            }
        }
    )*};
}

macro_rules! unsigned_field_type {
    ($($ty:ty),*) => {$(
        impl FieldType for $ty {
            fn field_spec(key: FieldKey) -> FieldSpec {
                FieldSpec::new(key, ValueKind::Number)
                    .integer()
                    .min(0.0)
                    .max(<$ty>::MAX as f64)
            }
        }
    )*};
}

float_field_type!(f32, f64);
signed_field_type!(i8, i16, i32, i64, isize);
unsigned_field_type!(u8, u16, u32, u64, usize);

pub trait FieldLens<T>: Copy + Send + Sync + 'static {
    type Value: FieldType;

    fn key(self) -> FieldKey;
}

/// A strict form shape. Usually derived with `#[derive(FormSchema)]`.
pub trait FormSchema: Sized + 'static {
    type Fields;

    fn fields() -> Self::Fields;

    fn model_builder() -> FormModelBuilder;

    fn model() -> FormResult<FormModel> {
        Self::model_builder().build()
    }
}

/// Integral floats become integers so they deserialize into integer types.
pub(crate) fn normalize_number(value: Value) -> Value {
    match value {
        Value::Number(number) if !number.is_i64() && !number.is_u64() => {
            match number.as_f64() {
                Some(float) if float.fract() == 0.0 && float.abs() < 9.0e15 => {
                    Value::from(float as i64)
                }
                _ => Value::Number(number),
            }
        }
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_number).collect()),
        other => other,
    }
}
